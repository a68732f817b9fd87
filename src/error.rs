//! Error types and handling for the timestamping library

use thiserror::Error;

/// Error codes for programmatic error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Input validation error codes (1000-1999)
    InvalidPdf = 1001,
    UnsupportedAlgorithm = 1002,

    // TSA protocol error codes (2000-2999)
    InvalidResponse = 2001,
    TsaRejected = 2002,
    TsaNetwork = 2003,

    // Embedding error codes (3000-3999)
    HashMismatch = 3001,
    PlaceholderOverflow = 3002,

    // LTV error codes (4000-4999)
    LtvFetchFailed = 4001,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl ErrorCode {
    /// Get the numeric error code
    pub fn code(&self) -> u32 {
        *self as u32
    }

    /// Get the error category name
    pub fn category(&self) -> &'static str {
        match self {
            ErrorCode::InvalidPdf | ErrorCode::UnsupportedAlgorithm => "Input Validation",
            ErrorCode::InvalidResponse | ErrorCode::TsaRejected | ErrorCode::TsaNetwork => {
                "TSA Protocol"
            }
            ErrorCode::HashMismatch | ErrorCode::PlaceholderOverflow => "Embedding",
            ErrorCode::LtvFetchFailed => "Long-Term Validation",
        }
    }
}

/// Main error type for the timestamping library
#[derive(Error, Debug)]
pub enum TimestampError {
    #[error("Invalid PDF document (Code: {code}): {message}")]
    InvalidPdf { message: String, code: ErrorCode },

    #[error("Unsupported hash algorithm (Code: {code}): {algorithm}")]
    UnsupportedAlgorithm { algorithm: String, code: ErrorCode },

    /// The TSA response (or an embedded DER structure) is malformed.
    /// `offset` points at the byte where decoding gave up.
    #[error("Malformed response (Code: {code}): {message} at offset {offset}")]
    InvalidResponse {
        message: String,
        offset: usize,
        code: ErrorCode,
    },

    /// The TSA answered with a status other than granted or
    /// grantedWithMods. `fail_info` and `status_text` are passed
    /// through unchanged from the PKIStatusInfo.
    #[error("TSA rejected the request (Code: {code}, status {status}): {status_text}")]
    TsaRejected {
        status: i32,
        fail_info: Option<crate::tsa::FailInfo>,
        status_text: String,
        code: ErrorCode,
    },

    #[error("TSA transport failure (Code: {code}): {message}")]
    TsaNetwork { message: String, code: ErrorCode },

    #[error("Message imprint mismatch (Code: {code}): computed {expected}, token carries {actual}")]
    HashMismatch {
        expected: String,
        actual: String,
        code: ErrorCode,
    },

    /// The token does not fit the reserved `/Contents` window.
    /// `required_size` is the smallest `signature_size` that would.
    #[error(
        "Timestamp token of {token_size} bytes exceeds the {placeholder_size} byte placeholder \
         (Code: {code}); retry with signature_size >= {required_size}"
    )]
    PlaceholderOverflow {
        token_size: usize,
        placeholder_size: usize,
        required_size: usize,
        code: ErrorCode,
    },

    #[error("LTV material fetch failed (Code: {code}): {message}")]
    LtvFetchFailed { message: String, code: ErrorCode },
}

impl TimestampError {
    /// Get the error code for programmatic handling
    pub fn error_code(&self) -> ErrorCode {
        match self {
            TimestampError::InvalidPdf { code, .. } => *code,
            TimestampError::UnsupportedAlgorithm { code, .. } => *code,
            TimestampError::InvalidResponse { code, .. } => *code,
            TimestampError::TsaRejected { code, .. } => *code,
            TimestampError::TsaNetwork { code, .. } => *code,
            TimestampError::HashMismatch { code, .. } => *code,
            TimestampError::PlaceholderOverflow { code, .. } => *code,
            TimestampError::LtvFetchFailed { code, .. } => *code,
        }
    }

    /// Get the error category
    pub fn category(&self) -> &'static str {
        self.error_code().category()
    }

    /// Get the numeric error code
    pub fn code(&self) -> u32 {
        self.error_code().code()
    }

    /// Create a new InvalidPdf error with context
    pub fn invalid_pdf<S: Into<String>>(message: S) -> Self {
        TimestampError::InvalidPdf {
            message: message.into(),
            code: ErrorCode::InvalidPdf,
        }
    }

    /// Create a new UnsupportedAlgorithm error with context
    pub fn unsupported_algorithm<S: Into<String>>(algorithm: S) -> Self {
        TimestampError::UnsupportedAlgorithm {
            algorithm: algorithm.into(),
            code: ErrorCode::UnsupportedAlgorithm,
        }
    }

    /// Create a new InvalidResponse error with an offset diagnostic
    pub fn invalid_response<S: Into<String>>(message: S, offset: usize) -> Self {
        TimestampError::InvalidResponse {
            message: message.into(),
            offset,
            code: ErrorCode::InvalidResponse,
        }
    }

    /// Create a new TsaRejected error carrying the PKIStatusInfo details
    pub fn tsa_rejected(
        status: i32,
        fail_info: Option<crate::tsa::FailInfo>,
        status_text: impl Into<String>,
    ) -> Self {
        TimestampError::TsaRejected {
            status,
            fail_info,
            status_text: status_text.into(),
            code: ErrorCode::TsaRejected,
        }
    }

    /// Create a new TsaNetwork error with context
    pub fn tsa_network<S: Into<String>>(message: S) -> Self {
        TimestampError::TsaNetwork {
            message: message.into(),
            code: ErrorCode::TsaNetwork,
        }
    }

    /// Create a new HashMismatch error from the two digests
    pub fn hash_mismatch(expected: &[u8], actual: &[u8]) -> Self {
        TimestampError::HashMismatch {
            expected: hex::encode(expected),
            actual: hex::encode(actual),
            code: ErrorCode::HashMismatch,
        }
    }

    /// Create a new PlaceholderOverflow error, computing the suggested
    /// minimum signature size (token length plus a ten percent reserve)
    pub fn placeholder_overflow(token_size: usize, placeholder_size: usize) -> Self {
        TimestampError::PlaceholderOverflow {
            token_size,
            placeholder_size,
            required_size: (token_size * 11 + 9) / 10,
            code: ErrorCode::PlaceholderOverflow,
        }
    }

    /// Create a new LtvFetchFailed error with context
    pub fn ltv_fetch_failed<S: Into<String>>(message: S) -> Self {
        TimestampError::LtvFetchFailed {
            message: message.into(),
            code: ErrorCode::LtvFetchFailed,
        }
    }
}

/// Result type alias for the timestamping library
pub type Result<T> = std::result::Result<T, TimestampError>;

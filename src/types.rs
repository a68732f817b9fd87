//! Core data types for the timestamping library

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::HashAlgorithm;

/// Default `/Contents` reservation in bytes
pub const DEFAULT_SIGNATURE_SIZE: usize = 8192;

/// Reservation used when the token will travel with LTV material or
/// covers a document security store
pub const LTV_SIGNATURE_SIZE: usize = 16384;

/// A Time-Stamping Authority endpoint and its transport policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TsaConfig {
    /// HTTP(S) URL of the RFC 3161 endpoint
    pub url: String,
    /// Requested policy OID, if the TSA should honour a specific one
    pub policy: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
    /// Total attempts for transport-level failures and HTTP 5xx
    pub retries: u32,
    /// Pause between attempts
    pub retry_delay: Duration,
}

impl TsaConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            policy: None,
            timeout: Duration::from_secs(30),
            retries: 3,
            retry_delay: Duration::from_millis(1000),
        }
    }

    pub fn with_policy(mut self, policy: impl Into<String>) -> Self {
        self.policy = Some(policy.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32, retry_delay: Duration) -> Self {
        self.retries = retries;
        self.retry_delay = retry_delay;
        self
    }
}

/// Options controlling a single timestamp operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampOptions {
    /// Message imprint algorithm
    pub hash_algorithm: HashAlgorithm,
    /// Override for the `/Contents` reservation in bytes; when unset the
    /// default (or the larger LTV default) applies
    pub signature_size: Option<usize>,
    /// Fetch and embed revocation material after the token is in place
    pub enable_ltv: bool,
    /// Send (and require the echo of) a random 8-byte nonce
    pub use_nonce: bool,
    /// Explicit signature field name; auto-numbered when unset
    pub field_name: Option<String>,
    /// Wall-clock ceiling for all LTV network activity combined
    pub ltv_budget: Duration,
}

impl Default for TimestampOptions {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::Sha256,
            signature_size: None,
            enable_ltv: false,
            use_nonce: true,
            field_name: None,
            ltv_budget: Duration::from_secs(30),
        }
    }
}

impl TimestampOptions {
    /// The `/Contents` reservation this operation will use
    pub fn effective_signature_size(&self) -> usize {
        self.signature_size.unwrap_or(if self.enable_ltv {
            LTV_SIGNATURE_SIZE
        } else {
            DEFAULT_SIGNATURE_SIZE
        })
    }
}

/// Accuracy claimed by the TSA for its genTime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Accuracy {
    pub seconds: Option<u32>,
    pub millis: Option<u16>,
    pub micros: Option<u16>,
}

/// Information extracted from a validated timestamp token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampInfo {
    /// The time attested by the TSA
    pub gen_time: DateTime<Utc>,
    /// Policy under which the token was issued
    pub policy: String,
    /// Token serial number, lowercase hex
    pub serial_number: String,
    /// Imprint algorithm of the token
    pub hash_algorithm: HashAlgorithm,
    /// The hashed message from the imprint, hex encoded
    pub message_digest: String,
    /// Whether the SignedData carried the TSA certificate chain
    pub has_certificate: bool,
    pub accuracy: Option<Accuracy>,
    pub ordering: bool,
}

/// Non-fatal problem collected while an operation proceeded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub message: String,
    /// The endpoint involved, when the warning came from a fetch
    pub url: Option<String>,
}

impl Warning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            url: None,
        }
    }

    pub fn for_url(message: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            url: Some(url.into()),
        }
    }
}

/// Validation material destined for a document security store.
/// Every collection is deduplicated by raw DER bytes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LtvData {
    pub certificates: Vec<Vec<u8>>,
    pub crls: Vec<Vec<u8>>,
    pub ocsps: Vec<Vec<u8>>,
}

impl LtvData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_certificate(&mut self, der: Vec<u8>) -> bool {
        push_unique(&mut self.certificates, der)
    }

    pub fn add_crl(&mut self, der: Vec<u8>) -> bool {
        push_unique(&mut self.crls, der)
    }

    pub fn add_ocsp(&mut self, der: Vec<u8>) -> bool {
        push_unique(&mut self.ocsps, der)
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty() && self.crls.is_empty() && self.ocsps.is_empty()
    }

    /// Fold another collection in, keeping deduplication
    pub fn merge(&mut self, other: &LtvData) {
        for cert in &other.certificates {
            self.add_certificate(cert.clone());
        }
        for crl in &other.crls {
            self.add_crl(crl.clone());
        }
        for ocsp in &other.ocsps {
            self.add_ocsp(ocsp.clone());
        }
    }
}

fn push_unique(items: &mut Vec<Vec<u8>>, der: Vec<u8>) -> bool {
    if items.iter().any(|existing| *existing == der) {
        return false;
    }
    items.push(der);
    true
}

/// Result of a completed timestamp operation
#[derive(Debug, Clone)]
pub struct TimestampResult {
    /// The finished document
    pub pdf: Vec<u8>,
    /// Raw DER of the embedded timestamp token
    pub token: Vec<u8>,
    /// Parsed and validated token details
    pub info: TimestampInfo,
    /// Material written to the security store, when LTV ran
    pub ltv: Option<LtvData>,
    /// Non-fatal problems, LTV fetch failures mostly
    pub warnings: Vec<Warning>,
}

/// Result of applying several timestamps in sequence
#[derive(Debug, Clone)]
pub struct MultiTimestampResult {
    pub pdf: Vec<u8>,
    pub timestamps: Vec<TimestampInfo>,
    pub warnings: Vec<Warning>,
}

/// One embedded timestamp located during verification
#[derive(Debug, Clone)]
pub struct VerifiedTimestamp {
    pub field_name: String,
    pub info: TimestampInfo,
}

/// Collect the distinct signature field names already present, used for
/// auto-numbering new timestamp fields
pub(crate) fn next_field_name(existing: &HashSet<String>) -> String {
    let mut index = 1usize;
    loop {
        let candidate = format!("Timestamp{index}");
        if !existing.contains(&candidate) {
            return candidate;
        }
        index += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ltv_data_deduplicates_by_der() {
        let mut ltv = LtvData::new();
        assert!(ltv.add_certificate(vec![1, 2, 3]));
        assert!(!ltv.add_certificate(vec![1, 2, 3]));
        assert!(ltv.add_certificate(vec![1, 2, 4]));
        assert_eq!(ltv.certificates.len(), 2);
    }

    #[test]
    fn merge_keeps_uniqueness() {
        let mut a = LtvData::new();
        a.add_crl(vec![9]);
        let mut b = LtvData::new();
        b.add_crl(vec![9]);
        b.add_ocsp(vec![7]);
        a.merge(&b);
        assert_eq!(a.crls.len(), 1);
        assert_eq!(a.ocsps.len(), 1);
    }

    #[test]
    fn signature_size_defaults() {
        let mut options = TimestampOptions::default();
        assert_eq!(options.effective_signature_size(), DEFAULT_SIGNATURE_SIZE);
        options.enable_ltv = true;
        assert_eq!(options.effective_signature_size(), LTV_SIGNATURE_SIZE);
        options.signature_size = Some(4096);
        assert_eq!(options.effective_signature_size(), 4096);
    }

    #[test]
    fn field_names_skip_taken_slots() {
        let mut taken = HashSet::new();
        assert_eq!(next_field_name(&taken), "Timestamp1");
        taken.insert("Timestamp1".to_string());
        taken.insert("Timestamp2".to_string());
        assert_eq!(next_field_name(&taken), "Timestamp3");
    }
}

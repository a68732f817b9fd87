//! Parsing of the `TimeStampResp` and its PKIStatusInfo.

use crate::asn1::{tag, DerReader};
use crate::error::{Result, TimestampError};

/// PKIStatus values defined by RFC 3161
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PkiStatus {
    Granted = 0,
    GrantedWithMods = 1,
    Rejection = 2,
    Waiting = 3,
    RevocationWarning = 4,
    RevocationNotification = 5,
}

impl PkiStatus {
    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            0 => Some(PkiStatus::Granted),
            1 => Some(PkiStatus::GrantedWithMods),
            2 => Some(PkiStatus::Rejection),
            3 => Some(PkiStatus::Waiting),
            4 => Some(PkiStatus::RevocationWarning),
            5 => Some(PkiStatus::RevocationNotification),
            _ => None,
        }
    }
}

/// Reasons a TSA gives for refusing a request. Discriminants are this
/// library's own stable values; [`FailInfo::bit`] maps back to the
/// PKIFailureInfo bit positions on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailInfo {
    BadAlgorithm = 0,
    BadRequest = 1,
    BadDataFormat = 2,
    TimeNotAvailable = 3,
    UnacceptedPolicy = 4,
    UnacceptedExtension = 5,
    AddInfoNotAvailable = 6,
    SystemFailure = 7,
    Unrecognized = 8,
}

impl FailInfo {
    /// The PKIFailureInfo bit position, when the reason is a defined one
    pub fn bit(&self) -> Option<u8> {
        match self {
            FailInfo::BadAlgorithm => Some(0),
            FailInfo::BadRequest => Some(2),
            FailInfo::BadDataFormat => Some(5),
            FailInfo::TimeNotAvailable => Some(14),
            FailInfo::UnacceptedPolicy => Some(15),
            FailInfo::UnacceptedExtension => Some(16),
            FailInfo::AddInfoNotAvailable => Some(17),
            FailInfo::SystemFailure => Some(25),
            FailInfo::Unrecognized => None,
        }
    }

    fn from_bit(bit: u8) -> Self {
        match bit {
            0 => FailInfo::BadAlgorithm,
            2 => FailInfo::BadRequest,
            5 => FailInfo::BadDataFormat,
            14 => FailInfo::TimeNotAvailable,
            15 => FailInfo::UnacceptedPolicy,
            16 => FailInfo::UnacceptedExtension,
            17 => FailInfo::AddInfoNotAvailable,
            25 => FailInfo::SystemFailure,
            _ => FailInfo::Unrecognized,
        }
    }

    /// Decode the first set bit of a PKIFailureInfo BIT STRING.
    /// `content` includes the unused-bits octet.
    pub(crate) fn from_bit_string(content: &[u8]) -> Option<Self> {
        let bits = content.get(1..)?;
        for (byte_index, byte) in bits.iter().enumerate() {
            if *byte == 0 {
                continue;
            }
            for bit_in_byte in 0..8u8 {
                if byte & (0x80 >> bit_in_byte) != 0 {
                    return Some(Self::from_bit(byte_index as u8 * 8 + bit_in_byte));
                }
            }
        }
        None
    }
}

impl std::fmt::Display for FailInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailInfo::BadAlgorithm => "badAlg",
            FailInfo::BadRequest => "badRequest",
            FailInfo::BadDataFormat => "badDataFormat",
            FailInfo::TimeNotAvailable => "timeNotAvailable",
            FailInfo::UnacceptedPolicy => "unacceptedPolicy",
            FailInfo::UnacceptedExtension => "unacceptedExtension",
            FailInfo::AddInfoNotAvailable => "addInfoNotAvailable",
            FailInfo::SystemFailure => "systemFailure",
            FailInfo::Unrecognized => "unrecognized",
        };
        f.write_str(name)
    }
}

/// A decoded `TimeStampResp`
#[derive(Debug, Clone)]
pub struct TimestampResponse {
    /// Raw PKIStatus value
    pub status: i64,
    /// Joined PKIFreeText lines, when the TSA said anything
    pub status_text: Option<String>,
    pub fail_info: Option<FailInfo>,
    /// Raw DER of the TimeStampToken ContentInfo, when granted
    pub token: Option<Vec<u8>>,
}

impl TimestampResponse {
    /// Parse a complete `TimeStampResp`.
    pub fn parse(der: &[u8]) -> Result<Self> {
        if der.is_empty() {
            return Err(TimestampError::invalid_response("empty TSA response", 0));
        }
        let mut reader = DerReader::new(der);
        let mut resp = reader.read_sequence("TimeStampResp")?;
        let mut status_info = resp.read_sequence("PKIStatusInfo")?;
        let status = status_info.read_integer_i64()?;

        let mut status_text = None;
        if status_info.peek_tag() == Some(tag::SEQUENCE) {
            let mut free_text = status_info.read_sequence("PKIFreeText")?;
            let mut lines = Vec::new();
            while !free_text.is_empty() {
                let line = free_text.read_tlv()?;
                if let Ok(text) = std::str::from_utf8(line.content) {
                    lines.push(text.to_string());
                }
            }
            if !lines.is_empty() {
                status_text = Some(lines.join("; "));
            }
        }

        let mut fail_info = None;
        if status_info.peek_tag() == Some(tag::BIT_STRING) {
            let bits = status_info.read_expected(tag::BIT_STRING, "PKIFailureInfo")?;
            fail_info = FailInfo::from_bit_string(bits.content);
        }

        let token = if resp.is_empty() {
            None
        } else {
            let content_info =
                resp.read_expected(tag::SEQUENCE, "TimeStampToken ContentInfo")?;
            Some(content_info.raw.to_vec())
        };

        Ok(Self {
            status,
            status_text,
            fail_info,
            token,
        })
    }

    pub fn is_granted(&self) -> bool {
        matches!(
            PkiStatus::from_value(self.status),
            Some(PkiStatus::Granted) | Some(PkiStatus::GrantedWithMods)
        )
    }

    /// Extract the token, turning any refusal into the protocol error.
    pub fn into_token(self) -> Result<Vec<u8>> {
        if !self.is_granted() {
            let text = self
                .status_text
                .unwrap_or_else(|| "no status text supplied".to_string());
            return Err(TimestampError::tsa_rejected(
                self.status as i32,
                self.fail_info,
                text,
            ));
        }
        self.token.ok_or_else(|| {
            TimestampError::invalid_response("granted response without a TimeStampToken", 0)
        })
    }
}

//! DER codec used for the RFC 3161, CMS, X.509 and OCSP structures.
//!
//! The reader and writer are pure and deterministic; every decode failure
//! carries the absolute byte offset of the offending byte. Callers at the
//! protocol boundary convert [`Asn1Error`] into the library error type.

pub mod oid;
pub mod reader;
pub mod writer;

pub use reader::{DerReader, Tlv};
pub use writer::DerWriter;

use crate::error::TimestampError;

/// Decode (or encode) failure with the offset of the offending byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asn1Error {
    pub offset: usize,
    pub message: String,
}

impl Asn1Error {
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Asn1Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at offset {}", self.message, self.offset)
    }
}

impl std::error::Error for Asn1Error {}

impl From<Asn1Error> for TimestampError {
    fn from(err: Asn1Error) -> Self {
        TimestampError::invalid_response(err.message, err.offset)
    }
}

/// ASN.1 tag numbers as they appear on the wire (class and constructed
/// bits included).
pub mod tag {
    pub const BOOLEAN: u8 = 0x01;
    pub const INTEGER: u8 = 0x02;
    pub const BIT_STRING: u8 = 0x03;
    pub const OCTET_STRING: u8 = 0x04;
    pub const NULL: u8 = 0x05;
    pub const OBJECT_IDENTIFIER: u8 = 0x06;
    pub const ENUMERATED: u8 = 0x0a;
    pub const UTF8_STRING: u8 = 0x0c;
    pub const PRINTABLE_STRING: u8 = 0x13;
    pub const IA5_STRING: u8 = 0x16;
    pub const UTC_TIME: u8 = 0x17;
    pub const GENERALIZED_TIME: u8 = 0x18;
    pub const SEQUENCE: u8 = 0x30;
    pub const SET: u8 = 0x31;

    /// Context-specific primitive tag `[n]`
    pub const fn context(n: u8) -> u8 {
        0x80 | n
    }

    /// Context-specific constructed tag `[n]`
    pub const fn context_constructed(n: u8) -> u8 {
        0xa0 | n
    }
}

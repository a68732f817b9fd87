//! Hash algorithm selection and streaming digest computation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::asn1::oid;
use crate::error::{Result, TimestampError};

/// Supported message imprint algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Get the algorithm identifier string
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "SHA-256",
            HashAlgorithm::Sha384 => "SHA-384",
            HashAlgorithm::Sha512 => "SHA-512",
        }
    }

    /// Get the dotted object identifier
    pub fn oid(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => oid::SHA256,
            HashAlgorithm::Sha384 => oid::SHA384,
            HashAlgorithm::Sha512 => oid::SHA512,
        }
    }

    /// Get the hash output size in bytes
    pub fn digest_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }

    /// Resolve a symbolic name such as `SHA-256`
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_uppercase().as_str() {
            "SHA-256" | "SHA256" => Ok(HashAlgorithm::Sha256),
            "SHA-384" | "SHA384" => Ok(HashAlgorithm::Sha384),
            "SHA-512" | "SHA512" => Ok(HashAlgorithm::Sha512),
            _ => Err(TimestampError::unsupported_algorithm(name)),
        }
    }

    /// Resolve a dotted OID string
    pub fn from_oid(dotted: &str) -> Result<Self> {
        match dotted {
            oid::SHA256 => Ok(HashAlgorithm::Sha256),
            oid::SHA384 => Ok(HashAlgorithm::Sha384),
            oid::SHA512 => Ok(HashAlgorithm::Sha512),
            _ => Err(TimestampError::unsupported_algorithm(dotted)),
        }
    }

    /// Digest a contiguous buffer
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        let mut hash = StreamingHash::new(*self);
        hash.update(data);
        hash.finalize()
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Incremental digest so large documents are hashed without copying
pub enum StreamingHash {
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

impl StreamingHash {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => StreamingHash::Sha256(Sha256::new()),
            HashAlgorithm::Sha384 => StreamingHash::Sha384(Sha384::new()),
            HashAlgorithm::Sha512 => StreamingHash::Sha512(Sha512::new()),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            StreamingHash::Sha256(h) => h.update(data),
            StreamingHash::Sha384(h) => h.update(data),
            StreamingHash::Sha512(h) => h.update(data),
        }
    }

    pub fn finalize(self) -> Vec<u8> {
        match self {
            StreamingHash::Sha256(h) => h.finalize().to_vec(),
            StreamingHash::Sha384(h) => h.finalize().to_vec(),
            StreamingHash::Sha512(h) => h.finalize().to_vec(),
        }
    }
}

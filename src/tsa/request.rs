//! DER construction of the `TimeStampReq`.

use crate::asn1::{Asn1Error, DerWriter};
use crate::crypto::HashAlgorithm;
use crate::error::Result;

/// A built request, keeping the pieces the response must echo.
#[derive(Debug, Clone)]
pub struct TimestampRequest {
    /// DER `TimeStampReq` ready for the wire
    pub der: Vec<u8>,
    /// The imprint the TSA must sign over
    pub digest: Vec<u8>,
    pub hash_algorithm: HashAlgorithm,
    /// Nonce magnitude bytes, when one was sent
    pub nonce: Option<Vec<u8>>,
}

impl TimestampRequest {
    /// Build a version 1 request over an already computed digest.
    /// `cert_req` is always set so the TSA ships its signing chain.
    pub fn build(
        hash_algorithm: HashAlgorithm,
        digest: &[u8],
        policy: Option<&str>,
        nonce: Option<[u8; 8]>,
    ) -> Result<Self> {
        let der = encode(hash_algorithm, digest, policy, nonce.as_ref())?;
        Ok(Self {
            der,
            digest: digest.to_vec(),
            hash_algorithm,
            nonce: nonce.map(|bytes| strip_leading_zeros(&bytes)),
        })
    }
}

fn encode(
    hash_algorithm: HashAlgorithm,
    digest: &[u8],
    policy: Option<&str>,
    nonce: Option<&[u8; 8]>,
) -> Result<Vec<u8>> {
    let mut writer = DerWriter::new();
    build_request(&mut writer, hash_algorithm, digest, policy, nonce)?;
    Ok(writer.into_bytes())
}

fn build_request(
    writer: &mut DerWriter,
    hash_algorithm: HashAlgorithm,
    digest: &[u8],
    policy: Option<&str>,
    nonce: Option<&[u8; 8]>,
) -> std::result::Result<(), Asn1Error> {
    writer.write_sequence(|req| {
        req.write_integer_i64(1);
        req.write_sequence(|imprint| {
            imprint.write_sequence(|alg| {
                alg.write_oid(hash_algorithm.oid())?;
                alg.write_null();
                Ok(())
            })?;
            imprint.write_octet_string(digest);
            Ok(())
        })?;
        if let Some(policy) = policy {
            req.write_oid(policy)?;
        }
        if let Some(nonce) = nonce {
            req.write_integer_unsigned(nonce);
        }
        req.write_boolean(true);
        Ok(())
    })
}

/// Normalise a nonce to its magnitude for later comparison against
/// whatever minimal INTEGER the TSA echoes back.
pub(crate) fn strip_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let first_nonzero = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    if first_nonzero == bytes.len() {
        vec![0]
    } else {
        bytes[first_nonzero..].to_vec()
    }
}

//! Validation of a parsed token against the request that produced it.

use log::warn;

use crate::cert::{parse_certificate, ParsedCert};
use crate::crypto::{verify, HashAlgorithm};
use crate::error::{Result, TimestampError};
use crate::tsa::request::strip_leading_zeros;
use crate::types::TimestampInfo;

use super::parser::{ParsedToken, SignerIdentifier};

/// Outcome of a successful validation
#[derive(Debug, Clone)]
pub struct ValidatedToken {
    pub info: TimestampInfo,
    /// The located TSA signing certificate, when the token carried one
    pub signing_cert: Option<Vec<u8>>,
}

/// Check a token against the digest it must commit to, the requested
/// algorithm and the nonce that was sent (if any), then verify the TSA
/// signature over the signed attributes.
pub fn validate_token(
    token: &ParsedToken,
    expected_digest: &[u8],
    expected_algorithm: HashAlgorithm,
    expected_nonce: Option<&[u8]>,
) -> Result<ValidatedToken> {
    let imprint = &token.tst_info.message_imprint;

    let token_algorithm = HashAlgorithm::from_oid(&imprint.hash_algorithm_oid)?;
    if token_algorithm != expected_algorithm || imprint.hashed_message != expected_digest {
        return Err(TimestampError::hash_mismatch(
            expected_digest,
            &imprint.hashed_message,
        ));
    }

    if let Some(sent) = expected_nonce {
        let sent = strip_leading_zeros(sent);
        match &token.tst_info.nonce {
            Some(echoed) if *echoed == sent => {}
            Some(_) => {
                return Err(TimestampError::invalid_response(
                    "TSA echoed a different nonce",
                    0,
                ))
            }
            None => {
                return Err(TimestampError::invalid_response(
                    "TSA dropped the request nonce",
                    0,
                ))
            }
        }
    }

    check_message_digest_attribute(token)?;
    let signing_cert = verify_token_signature(token)?;

    let info = TimestampInfo {
        gen_time: token.tst_info.gen_time,
        policy: token.tst_info.policy.clone(),
        serial_number: hex::encode(strip_leading_zeros(&token.tst_info.serial)),
        hash_algorithm: token_algorithm,
        message_digest: hex::encode(&imprint.hashed_message),
        has_certificate: !token.certificates.is_empty(),
        accuracy: token.tst_info.accuracy,
        ordering: token.tst_info.ordering,
    };

    Ok(ValidatedToken {
        info,
        signing_cert: signing_cert.map(|cert| cert.der),
    })
}

/// The message-digest signed attribute must commit to the TSTInfo bytes.
fn check_message_digest_attribute(token: &ParsedToken) -> Result<()> {
    let Some(attrs) = &token.signer.signed_attrs else {
        return Ok(());
    };
    let Some(claimed) = &attrs.message_digest else {
        return Err(TimestampError::invalid_response(
            "signed attributes without a message-digest",
            0,
        ));
    };
    let digest_algorithm = HashAlgorithm::from_oid(&token.signer.digest_algorithm)?;
    let actual = digest_algorithm.digest(&token.tst_info_der);
    if actual != *claimed {
        return Err(TimestampError::invalid_response(
            "message-digest attribute does not match the TSTInfo",
            0,
        ));
    }
    Ok(())
}

/// Verify the CMS signature with the signer certificate shipped in the
/// token. Tokens without certificates (certReq=false responses) cannot
/// be checked here; trust decisions stay with the consumer either way.
fn verify_token_signature(token: &ParsedToken) -> Result<Option<ParsedCert>> {
    if token.certificates.is_empty() {
        warn!("token carries no certificates, skipping signature verification");
        return Ok(None);
    }

    let signer_cert = locate_signer(token)?;

    let message: &[u8] = match &token.signer.signed_attrs {
        Some(attrs) => &attrs.der_for_verification,
        None => &token.tst_info_der,
    };

    verify::verify_signature(
        &signer_cert.spki_algorithm,
        &signer_cert.key_bytes,
        &token.signer.signature_algorithm,
        &token.signer.digest_algorithm,
        message,
        &token.signer.signature,
    )?;

    Ok(Some(signer_cert))
}

fn locate_signer(token: &ParsedToken) -> Result<ParsedCert> {
    for der in &token.certificates {
        let Ok(cert) = parse_certificate(der) else {
            continue;
        };
        let matches = match &token.signer.sid {
            SignerIdentifier::IssuerAndSerial { issuer_der, serial } => {
                cert.issuer_der == *issuer_der
                    && strip_leading_zeros(&cert.serial) == strip_leading_zeros(serial)
            }
            SignerIdentifier::SubjectKeyIdentifier(ski) => {
                cert.ski.as_deref() == Some(ski.as_slice())
            }
        };
        if matches {
            return Ok(cert);
        }
    }
    Err(TimestampError::invalid_response(
        "no certificate in the token matches the SignerInfo identifier",
        0,
    ))
}

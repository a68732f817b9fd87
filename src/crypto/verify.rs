//! Public-key verification of the TSA signature over the token.

use ring::signature::{self, VerificationAlgorithm};

use crate::asn1::oid;
use crate::error::{Result, TimestampError};

/// Verify `signature` over `message` with the signer certificate's
/// subject public key.
///
/// `key_bytes` is the content of the SubjectPublicKeyInfo BIT STRING:
/// the DER RSAPublicKey for RSA keys, the uncompressed curve point for
/// EC keys, which is exactly the form ring consumes.
pub fn verify_signature(
    spki_algorithm: &str,
    key_bytes: &[u8],
    signature_algorithm: &str,
    digest_algorithm: &str,
    message: &[u8],
    signature: &[u8],
) -> Result<()> {
    let algorithm = select_algorithm(spki_algorithm, signature_algorithm, digest_algorithm)?;
    signature::UnparsedPublicKey::new(algorithm, key_bytes)
        .verify(message, signature)
        .map_err(|_| {
            TimestampError::invalid_response("timestamp token signature does not verify", 0)
        })
}

fn select_algorithm(
    spki_algorithm: &str,
    signature_algorithm: &str,
    digest_algorithm: &str,
) -> Result<&'static dyn VerificationAlgorithm> {
    match signature_algorithm {
        oid::SHA256_WITH_RSA => Ok(&signature::RSA_PKCS1_2048_8192_SHA256),
        oid::SHA384_WITH_RSA => Ok(&signature::RSA_PKCS1_2048_8192_SHA384),
        oid::SHA512_WITH_RSA => Ok(&signature::RSA_PKCS1_2048_8192_SHA512),
        // Bare rsaEncryption leaves the digest to the digestAlgorithm field.
        oid::RSA_ENCRYPTION => match digest_algorithm {
            oid::SHA256 => Ok(&signature::RSA_PKCS1_2048_8192_SHA256),
            oid::SHA384 => Ok(&signature::RSA_PKCS1_2048_8192_SHA384),
            oid::SHA512 => Ok(&signature::RSA_PKCS1_2048_8192_SHA512),
            other => Err(TimestampError::unsupported_algorithm(other)),
        },
        oid::ECDSA_WITH_SHA256 => Ok(&signature::ECDSA_P256_SHA256_ASN1),
        oid::ECDSA_WITH_SHA384 => Ok(&signature::ECDSA_P384_SHA384_ASN1),
        other => {
            // EC certificates sometimes restate the key OID here.
            if other == oid::EC_PUBLIC_KEY && spki_algorithm == oid::EC_PUBLIC_KEY {
                return match digest_algorithm {
                    oid::SHA256 => Ok(&signature::ECDSA_P256_SHA256_ASN1),
                    oid::SHA384 => Ok(&signature::ECDSA_P384_SHA384_ASN1),
                    digest => Err(TimestampError::unsupported_algorithm(digest)),
                };
            }
            Err(TimestampError::unsupported_algorithm(other))
        }
    }
}

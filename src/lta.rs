//! PAdES-LTA archive timestamping.
//!
//! Existing document timestamps are verified and their validation
//! material pooled, completed over the network, written into one DSS
//! with per-signature VRI entries, then a final timestamp covers the
//! document including the store.

use crate::crypto::HashAlgorithm;
use crate::error::Result;
use crate::ltv::{extract_ltv, write_dss, LtvFetcher, VriEntry};
use crate::pdf::extract::extract_timestamps;
use crate::token::{parse_token, validate_token};
use crate::types::{LtvData, TimestampOptions, VerifiedTimestamp, Warning, LTV_SIGNATURE_SIZE};

/// Verify every embedded document timestamp against the bytes its
/// `/ByteRange` covers.
pub fn verify_timestamps(pdf: &[u8]) -> Result<Vec<VerifiedTimestamp>> {
    let mut verified = Vec::new();
    for embedded in extract_timestamps(pdf)? {
        let token = parse_token(&embedded.token)?;
        let algorithm =
            HashAlgorithm::from_oid(&token.tst_info.message_imprint.hash_algorithm_oid)?;
        let digest = digest_byte_range(pdf, embedded.byte_range, algorithm);
        let validated = validate_token(&token, &digest, algorithm, None)?;
        verified.push(VerifiedTimestamp {
            field_name: embedded.field_name,
            info: validated.info,
        });
    }
    Ok(verified)
}

/// Collected state of the pre-archive pass: pooled material, per
/// signature VRI entries and the fetch warnings.
pub(crate) struct ArchivePreparation {
    pub pooled: LtvData,
    pub vri: Vec<VriEntry>,
    pub warnings: Vec<Warning>,
}

/// Verify existing timestamps, pool their material and complete it over
/// the network.
pub(crate) async fn collect_archive_material(
    pdf: &[u8],
    transport: &dyn crate::traits::HttpTransport,
    options: &TimestampOptions,
) -> Result<ArchivePreparation> {
    let mut pooled = LtvData::new();
    let mut vri = Vec::new();

    for embedded in extract_timestamps(pdf)? {
        let token = parse_token(&embedded.token)?;
        let algorithm =
            HashAlgorithm::from_oid(&token.tst_info.message_imprint.hash_algorithm_oid)?;
        let digest = digest_byte_range(pdf, embedded.byte_range, algorithm);
        let validated = validate_token(&token, &digest, algorithm, None)?;

        let data = extract_ltv(&token);
        if let Some(signing_cert) = validated.signing_cert {
            vri.push(VriEntry {
                signing_cert,
                data: data.clone(),
            });
        }
        pooled.merge(&data);
    }

    let fetcher = LtvFetcher::new(transport, options.ltv_budget, options.ltv_budget);
    let warnings = fetcher.complete(&mut pooled).await;

    Ok(ArchivePreparation {
        pooled,
        vri,
        warnings,
    })
}

/// Append the covering DSS; a document without material passes through
/// unchanged.
pub(crate) fn write_archive_dss(
    pdf: &[u8],
    preparation: &ArchivePreparation,
) -> Result<Vec<u8>> {
    write_dss(pdf, &preparation.pooled, &preparation.vri)
}

/// Options for the final covering timestamp: same algorithm and TSA
/// policy, LTV off so no second store is appended, and the larger
/// reservation unless the caller pinned one.
pub(crate) fn archive_round_options(options: &TimestampOptions) -> TimestampOptions {
    TimestampOptions {
        hash_algorithm: options.hash_algorithm,
        signature_size: Some(options.signature_size.unwrap_or(LTV_SIGNATURE_SIZE)),
        enable_ltv: false,
        use_nonce: options.use_nonce,
        field_name: None,
        ltv_budget: options.ltv_budget,
    }
}

fn digest_byte_range(pdf: &[u8], range: [usize; 4], algorithm: HashAlgorithm) -> Vec<u8> {
    let mut hash = crate::crypto::StreamingHash::new(algorithm);
    hash.update(&pdf[range[0]..range[0] + range[1]]);
    hash.update(&pdf[range[2]..range[2] + range[3]]);
    hash.finalize()
}

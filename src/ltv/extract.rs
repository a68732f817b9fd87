//! Validation material carried inside a token.

use crate::token::parser::ParsedToken;
use crate::types::LtvData;

/// Pull certificates and archived revocation data out of a parsed token.
/// Everything is deduplicated by raw DER.
pub fn extract_ltv(token: &ParsedToken) -> LtvData {
    let mut data = LtvData::new();
    for cert in &token.certificates {
        data.add_certificate(cert.clone());
    }
    for crl in &token.revocation.crls {
        data.add_crl(crl.clone());
    }
    for ocsp in &token.revocation.ocsps {
        data.add_ocsp(ocsp.clone());
    }
    data
}

//! Object identifier constants and dotted-string conversion.

use super::Asn1Error;

// Hash algorithms
pub const SHA1: &str = "1.3.14.3.2.26";
pub const SHA256: &str = "2.16.840.1.101.3.4.2.1";
pub const SHA384: &str = "2.16.840.1.101.3.4.2.2";
pub const SHA512: &str = "2.16.840.1.101.3.4.2.3";

// Signature algorithms
pub const RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";
pub const SHA256_WITH_RSA: &str = "1.2.840.113549.1.1.11";
pub const SHA384_WITH_RSA: &str = "1.2.840.113549.1.1.12";
pub const SHA512_WITH_RSA: &str = "1.2.840.113549.1.1.13";
pub const EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";
pub const ECDSA_WITH_SHA256: &str = "1.2.840.10045.4.3.2";
pub const ECDSA_WITH_SHA384: &str = "1.2.840.10045.4.3.3";
pub const ECDSA_WITH_SHA512: &str = "1.2.840.10045.4.3.4";

// CMS
pub const SIGNED_DATA: &str = "1.2.840.113549.1.7.2";
pub const TST_INFO: &str = "1.2.840.113549.1.9.16.1.4";
pub const ATTR_CONTENT_TYPE: &str = "1.2.840.113549.1.9.3";
pub const ATTR_MESSAGE_DIGEST: &str = "1.2.840.113549.1.9.4";
pub const ATTR_SIGNING_TIME: &str = "1.2.840.113549.1.9.5";

// Adobe revocation archival attribute carried by some TSAs
pub const REVOCATION_INFO_ARCHIVAL: &str = "1.2.840.113583.1.1.8";

// X.509 extensions
pub const SUBJECT_KEY_IDENTIFIER: &str = "2.5.29.14";
pub const CRL_DISTRIBUTION_POINTS: &str = "2.5.29.31";
pub const AUTHORITY_KEY_IDENTIFIER: &str = "2.5.29.35";
pub const AUTHORITY_INFO_ACCESS: &str = "1.3.6.1.5.5.7.1.1";

// PKIX access methods
pub const ACCESS_OCSP: &str = "1.3.6.1.5.5.7.48.1";
pub const ACCESS_CA_ISSUERS: &str = "1.3.6.1.5.5.7.48.2";

/// Encode a dotted OID string into its DER content bytes.
pub fn encode(dotted: &str) -> Result<Vec<u8>, Asn1Error> {
    let mut arcs = dotted.split('.').map(|part| {
        part.parse::<u64>()
            .map_err(|_| Asn1Error::new(0, format!("invalid OID component in '{dotted}'")))
    });

    let first = arcs
        .next()
        .ok_or_else(|| Asn1Error::new(0, "empty OID"))??;
    let second = arcs
        .next()
        .ok_or_else(|| Asn1Error::new(0, format!("OID '{dotted}' needs at least two arcs")))??;
    if first > 2 || (first < 2 && second > 39) {
        return Err(Asn1Error::new(0, format!("invalid OID prefix in '{dotted}'")));
    }

    let mut out = Vec::new();
    push_base128(&mut out, first * 40 + second);
    for arc in arcs {
        push_base128(&mut out, arc?);
    }
    Ok(out)
}

/// Decode DER OID content bytes into the dotted string form.
pub fn decode(content: &[u8], offset: usize) -> Result<String, Asn1Error> {
    if content.is_empty() {
        return Err(Asn1Error::new(offset, "empty OID"));
    }
    let mut arcs: Vec<u64> = Vec::new();
    let mut value: u64 = 0;
    for (i, byte) in content.iter().enumerate() {
        if value > u64::MAX >> 7 {
            return Err(Asn1Error::new(offset + i, "OID arc overflow"));
        }
        value = (value << 7) | u64::from(byte & 0x7f);
        if byte & 0x80 == 0 {
            arcs.push(value);
            value = 0;
        } else if i + 1 == content.len() {
            return Err(Asn1Error::new(offset + i, "truncated OID arc"));
        }
    }

    let first = arcs[0];
    let (a, b) = if first < 40 {
        (0, first)
    } else if first < 80 {
        (1, first - 40)
    } else {
        (2, first - 80)
    };

    let mut dotted = format!("{a}.{b}");
    for arc in &arcs[1..] {
        dotted.push('.');
        dotted.push_str(&arc.to_string());
    }
    Ok(dotted)
}

fn push_base128(out: &mut Vec<u8>, value: u64) {
    if value == 0 {
        out.push(0);
        return;
    }
    let mut shift = (63 - value.leading_zeros() as usize) / 7 * 7;
    loop {
        let septet = ((value >> shift) & 0x7f) as u8;
        if shift == 0 {
            out.push(septet);
            break;
        }
        out.push(septet | 0x80);
        shift -= 7;
    }
}

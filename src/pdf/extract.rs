//! Discovery of document timestamps already embedded in a PDF.

use crate::error::{Result, TimestampError};
use crate::token::parser::token_der_length;

use super::lexer::{Document, PdfValue};

/// One `/ETSI.RFC3161` signature found in the document
#[derive(Debug, Clone)]
pub struct EmbeddedTimestamp {
    pub field_name: String,
    /// Token DER with the window's zero padding stripped
    pub token: Vec<u8>,
    pub byte_range: [usize; 4],
}

/// Walk the AcroForm and collect every document timestamp.
pub fn extract_timestamps(pdf: &[u8]) -> Result<Vec<EmbeddedTimestamp>> {
    let doc = Document::load(pdf)?;
    let catalog = doc.catalog()?;

    let mut found = Vec::new();
    let Some(form_value) = catalog.get("AcroForm") else {
        return Ok(found);
    };
    let form = doc.resolve(form_value)?;
    let Some(form) = form.as_dict() else {
        return Ok(found);
    };
    let Some(fields_value) = form.get("Fields") else {
        return Ok(found);
    };
    let fields = doc.resolve(fields_value)?;
    let Some(items) = fields.as_array() else {
        return Ok(found);
    };

    for item in items {
        let field = doc.resolve(item)?;
        let Some(field) = field.as_dict() else {
            continue;
        };
        if field.get("FT").and_then(PdfValue::as_name) != Some("Sig") {
            continue;
        }
        let Some(value) = field.get("V") else {
            continue;
        };
        let sig = doc.resolve(value)?;
        let Some(sig) = sig.as_dict() else {
            continue;
        };
        if sig.get("SubFilter").and_then(PdfValue::as_name) != Some("ETSI.RFC3161") {
            continue;
        }

        let field_name = field
            .get("T")
            .and_then(PdfValue::as_string_bytes)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default();

        let padded = sig
            .get("Contents")
            .and_then(PdfValue::as_string_bytes)
            .ok_or_else(|| {
                TimestampError::invalid_pdf(format!(
                    "signature '{field_name}' has no /Contents"
                ))
            })?;
        let token_len = token_der_length(padded).map_err(|_| {
            TimestampError::invalid_pdf(format!(
                "signature '{field_name}' holds an unparseable token"
            ))
        })?;
        if token_len > padded.len() {
            return Err(TimestampError::invalid_pdf(format!(
                "signature '{field_name}' token is truncated"
            )));
        }

        let byte_range = parse_byte_range(sig.get("ByteRange"), &field_name, pdf.len())?;

        found.push(EmbeddedTimestamp {
            field_name,
            token: padded[..token_len].to_vec(),
            byte_range,
        });
    }

    Ok(found)
}

fn parse_byte_range(
    value: Option<&PdfValue>,
    field_name: &str,
    total_len: usize,
) -> Result<[usize; 4]> {
    let items = value.and_then(PdfValue::as_array).ok_or_else(|| {
        TimestampError::invalid_pdf(format!("signature '{field_name}' has no /ByteRange"))
    })?;
    if items.len() != 4 {
        return Err(TimestampError::invalid_pdf(format!(
            "signature '{field_name}' ByteRange has {} entries",
            items.len()
        )));
    }
    let mut range = [0usize; 4];
    for (slot, item) in items.iter().enumerate() {
        let number = item.as_integer().ok_or_else(|| {
            TimestampError::invalid_pdf(format!(
                "signature '{field_name}' ByteRange is not numeric"
            ))
        })?;
        if number < 0 {
            return Err(TimestampError::invalid_pdf(format!(
                "signature '{field_name}' ByteRange is negative"
            )));
        }
        range[slot] = number as usize;
    }
    if range[0] + range[1] > total_len || range[2] + range[3] > total_len {
        return Err(TimestampError::invalid_pdf(format!(
            "signature '{field_name}' ByteRange exceeds the document"
        )));
    }
    Ok(range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::embed::embed_token;
    use crate::pdf::prepare::{prepare, PrepareOptions};
    use crate::pdf::testutil::minimal_pdf;
    use crate::token::parser::testutil::{build_token, TokenSpec};
    use chrono::{TimeZone, Utc};

    fn prepare_options() -> PrepareOptions {
        PrepareOptions {
            signature_size: 2048,
            field_name: None,
            signing_time: Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn no_acroform_means_no_timestamps() {
        assert!(extract_timestamps(&minimal_pdf()).unwrap().is_empty());
    }

    #[test]
    fn embedded_token_comes_back_trimmed() {
        let pdf = minimal_pdf();
        let prepared = prepare(&pdf, &prepare_options()).unwrap();
        let token = build_token(&TokenSpec::minimal(
            prepared.digest(crate::crypto::HashAlgorithm::Sha256),
        ));
        let byte_range = prepared.byte_range();
        let out = embed_token(&prepared, &token).unwrap();

        let found = extract_timestamps(&out).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].field_name, "Timestamp1");
        assert_eq!(found[0].token, token);
        assert_eq!(found[0].byte_range, byte_range);
    }

    #[test]
    fn two_rounds_yield_two_timestamps() {
        let pdf = minimal_pdf();
        let first = prepare(&pdf, &prepare_options()).unwrap();
        let token1 = build_token(&TokenSpec::minimal(
            first.digest(crate::crypto::HashAlgorithm::Sha256),
        ));
        let once = embed_token(&first, &token1).unwrap();

        let second = prepare(&once, &prepare_options()).unwrap();
        let token2 = build_token(&TokenSpec::minimal(
            second.digest(crate::crypto::HashAlgorithm::Sha256),
        ));
        let twice = embed_token(&second, &token2).unwrap();

        let found = extract_timestamps(&twice).unwrap();
        assert_eq!(found.len(), 2);
        let names: Vec<&str> = found.iter().map(|f| f.field_name.as_str()).collect();
        assert!(names.contains(&"Timestamp1"));
        assert!(names.contains(&"Timestamp2"));
    }
}

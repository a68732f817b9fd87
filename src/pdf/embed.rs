//! Splicing a timestamp token into the prepared placeholder window.

use crate::error::{Result, TimestampError};

use super::prepare::PreparedPdf;

/// Write the token hex into the window of a copy of the prepared buffer.
/// Bytes outside the window are never touched, so the `/ByteRange`
/// stays valid by construction.
pub fn embed_token(prepared: &PreparedPdf, token: &[u8]) -> Result<Vec<u8>> {
    let placeholder_len = prepared.placeholder_len();
    let token_hex = hex::encode(token);
    if token_hex.len() > placeholder_len {
        return Err(TimestampError::placeholder_overflow(
            token.len(),
            placeholder_len / 2,
        ));
    }

    let mut out = prepared.bytes().to_vec();
    let start = prepared.contents_offset();
    out[start..start + token_hex.len()].copy_from_slice(token_hex.as_bytes());
    // The remainder of the window keeps its zero padding.
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::prepare::{prepare, PrepareOptions};
    use crate::pdf::testutil::minimal_pdf;
    use chrono::{TimeZone, Utc};

    fn prepared(signature_size: usize) -> PreparedPdf {
        prepare(
            &minimal_pdf(),
            &PrepareOptions {
                signature_size,
                field_name: None,
                signing_time: Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap(),
            },
        )
        .unwrap()
    }

    #[test]
    fn token_lands_in_the_window_with_zero_padding() {
        let prepared = prepared(8);
        let out = embed_token(&prepared, &[0xab, 0xcd]).unwrap();

        assert_eq!(out.len(), prepared.bytes().len());
        let start = prepared.contents_offset();
        assert_eq!(&out[start..start + 4], b"abcd");
        assert!(out[start + 4..start + 16].iter().all(|b| *b == b'0'));

        // Everything outside the window is bit-identical.
        assert_eq!(&out[..start], &prepared.bytes()[..start]);
        assert_eq!(&out[start + 16..], &prepared.bytes()[start + 16..]);
    }

    #[test]
    fn token_filling_the_window_exactly_is_accepted() {
        let prepared = prepared(8);
        let out = embed_token(&prepared, &[0x55u8; 8]).unwrap();
        let start = prepared.contents_offset();
        assert_eq!(&out[start..start + 16], "55".repeat(8).as_bytes());
    }

    #[test]
    fn oversized_token_names_the_size_that_would_fit() {
        // A 300 byte token against a 100 byte reservation needs 330.
        let prepared = prepared(100);
        let err = embed_token(&prepared, &[0x42u8; 300]).unwrap_err();
        match err {
            TimestampError::PlaceholderOverflow { required_size, .. } => {
                assert_eq!(required_size, 330);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn one_byte_too_many_overflows_with_suggestion() {
        let prepared = prepared(8);
        let err = embed_token(&prepared, &[0x55u8; 9]).unwrap_err();
        match err {
            TimestampError::PlaceholderOverflow {
                token_size,
                placeholder_size,
                required_size,
                ..
            } => {
                assert_eq!(token_size, 9);
                assert_eq!(placeholder_size, 8);
                assert_eq!(required_size, 10);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

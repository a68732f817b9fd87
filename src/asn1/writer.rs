//! DER emitter, the complement of [`super::reader::DerReader`].

use chrono::{DateTime, Utc};

use super::{oid, tag, Asn1Error};

/// Append-only DER writer. Constructed values are built through closures
/// so length fields are always definite and minimal.
#[derive(Debug, Default)]
pub struct DerWriter {
    buf: Vec<u8>,
}

impl DerWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Append pre-encoded DER verbatim.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Write a complete TLV with the given tag byte.
    pub fn write_tlv(&mut self, tag_byte: u8, content: &[u8]) {
        self.buf.push(tag_byte);
        write_length(&mut self.buf, content.len());
        self.buf.extend_from_slice(content);
    }

    pub fn write_boolean(&mut self, value: bool) {
        self.write_tlv(tag::BOOLEAN, &[if value { 0xff } else { 0x00 }]);
    }

    pub fn write_null(&mut self) {
        self.write_tlv(tag::NULL, &[]);
    }

    pub fn write_integer_i64(&mut self, value: i64) {
        let bytes = value.to_be_bytes();
        // Trim redundant sign-extension octets down to the minimal form.
        let mut start = 0;
        while start < 7 {
            let cur = bytes[start];
            let next = bytes[start + 1];
            let redundant = (cur == 0x00 && next & 0x80 == 0) || (cur == 0xff && next & 0x80 != 0);
            if !redundant {
                break;
            }
            start += 1;
        }
        self.write_tlv(tag::INTEGER, &bytes[start..]);
    }

    /// Write an INTEGER from unsigned big-endian magnitude bytes,
    /// inserting the leading zero DER needs for high-bit values.
    pub fn write_integer_unsigned(&mut self, magnitude: &[u8]) {
        let trimmed: &[u8] = {
            let mut m = magnitude;
            while m.len() > 1 && m[0] == 0 {
                m = &m[1..];
            }
            m
        };
        if trimmed.is_empty() {
            self.write_tlv(tag::INTEGER, &[0]);
        } else if trimmed[0] & 0x80 != 0 {
            let mut content = Vec::with_capacity(trimmed.len() + 1);
            content.push(0);
            content.extend_from_slice(trimmed);
            self.write_tlv(tag::INTEGER, &content);
        } else {
            self.write_tlv(tag::INTEGER, trimmed);
        }
    }

    pub fn write_oid(&mut self, dotted: &str) -> Result<(), Asn1Error> {
        let content = oid::encode(dotted)?;
        self.write_tlv(tag::OBJECT_IDENTIFIER, &content);
        Ok(())
    }

    pub fn write_octet_string(&mut self, content: &[u8]) {
        self.write_tlv(tag::OCTET_STRING, content);
    }

    /// BIT STRING with zero unused bits.
    pub fn write_bit_string(&mut self, content: &[u8]) {
        let mut body = Vec::with_capacity(content.len() + 1);
        body.push(0);
        body.extend_from_slice(content);
        self.write_tlv(tag::BIT_STRING, &body);
    }

    pub fn write_generalized_time(&mut self, time: DateTime<Utc>) {
        let text = time.format("%Y%m%d%H%M%SZ").to_string();
        self.write_tlv(tag::GENERALIZED_TIME, text.as_bytes());
    }

    fn write_constructed<F>(&mut self, tag_byte: u8, build: F) -> Result<(), Asn1Error>
    where
        F: FnOnce(&mut DerWriter) -> Result<(), Asn1Error>,
    {
        let mut inner = DerWriter::new();
        build(&mut inner)?;
        self.write_tlv(tag_byte, &inner.buf);
        Ok(())
    }

    pub fn write_sequence<F>(&mut self, build: F) -> Result<(), Asn1Error>
    where
        F: FnOnce(&mut DerWriter) -> Result<(), Asn1Error>,
    {
        self.write_constructed(tag::SEQUENCE, build)
    }

    pub fn write_set<F>(&mut self, build: F) -> Result<(), Asn1Error>
    where
        F: FnOnce(&mut DerWriter) -> Result<(), Asn1Error>,
    {
        self.write_constructed(tag::SET, build)
    }

    /// Context-specific constructed tag `[n]` (the EXPLICIT wrapper form).
    pub fn write_context<F>(&mut self, n: u8, build: F) -> Result<(), Asn1Error>
    where
        F: FnOnce(&mut DerWriter) -> Result<(), Asn1Error>,
    {
        self.write_constructed(tag::context_constructed(n), build)
    }
}

fn write_length(buf: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        buf.push(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    buf.push(0x80 | (bytes.len() - skip) as u8);
    buf.extend_from_slice(&bytes[skip..]);
}

#[cfg(test)]
mod tests {
    use super::super::reader::DerReader;
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn integer_minimal_forms() {
        let cases: [(i64, &[u8]); 6] = [
            (0, &[0x02, 0x01, 0x00]),
            (1, &[0x02, 0x01, 0x01]),
            (127, &[0x02, 0x01, 0x7f]),
            (128, &[0x02, 0x02, 0x00, 0x80]),
            (256, &[0x02, 0x02, 0x01, 0x00]),
            (-1, &[0x02, 0x01, 0xff]),
        ];
        for (value, expected) in cases {
            let mut w = DerWriter::new();
            w.write_integer_i64(value);
            assert_eq!(w.into_bytes(), expected, "value {value}");
        }
    }

    #[test]
    fn unsigned_integer_gets_leading_zero() {
        let mut w = DerWriter::new();
        w.write_integer_unsigned(&[0x8f, 0x01]);
        assert_eq!(w.into_bytes(), [0x02, 0x03, 0x00, 0x8f, 0x01]);
    }

    #[test]
    fn long_form_length_emitted() {
        let mut w = DerWriter::new();
        w.write_octet_string(&[0u8; 200]);
        let bytes = w.into_bytes();
        assert_eq!(&bytes[..3], &[0x04, 0x81, 200]);
    }

    #[test]
    fn writer_reader_round_trip() {
        let mut w = DerWriter::new();
        w.write_sequence(|seq| {
            seq.write_integer_i64(1);
            seq.write_sequence(|alg| {
                alg.write_oid(oid::SHA256)?;
                alg.write_null();
                Ok(())
            })?;
            seq.write_octet_string(&[0xde, 0xad, 0xbe, 0xef]);
            seq.write_boolean(true);
            seq.write_generalized_time(Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap());
            Ok(())
        })
        .unwrap();
        let bytes = w.into_bytes();

        let mut reader = DerReader::new(&bytes);
        let mut seq = reader.read_sequence("test").unwrap();
        assert_eq!(seq.read_integer_i64().unwrap(), 1);
        let mut alg = seq.read_sequence("alg").unwrap();
        assert_eq!(alg.read_oid().unwrap(), oid::SHA256);
        alg.read_null().unwrap();
        assert_eq!(seq.read_octet_string().unwrap(), &[0xde, 0xad, 0xbe, 0xef]);
        assert!(seq.read_boolean().unwrap());
        assert_eq!(
            seq.read_time().unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap()
        );
        assert!(seq.is_empty());
    }
}

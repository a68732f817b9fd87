//! Streaming DER reader.
//!
//! A [`DerReader`] walks a byte slice one TLV at a time. Nested readers
//! created for constructed values keep the absolute offset of the outermost
//! buffer, so diagnostics always point into the original response bytes.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use super::{oid, tag, Asn1Error};

/// One decoded tag-length-value element.
#[derive(Debug, Clone, Copy)]
pub struct Tlv<'a> {
    /// The full tag byte, class and constructed bits included
    pub tag: u8,
    /// Content bytes (after the length field)
    pub content: &'a [u8],
    /// The complete encoding including the header
    pub raw: &'a [u8],
    /// Absolute offset of the tag byte
    pub offset: usize,
}

impl<'a> Tlv<'a> {
    /// Whether the constructed bit is set
    pub fn is_constructed(&self) -> bool {
        self.tag & 0x20 != 0
    }

    /// Whether this is the context-specific tag `[n]` (either form)
    pub fn is_context(&self, n: u8) -> bool {
        self.tag & 0xc0 == 0x80 && self.tag & 0x1f == n
    }

    /// Reader over the content bytes, offsets preserved
    pub fn reader(&self) -> DerReader<'a> {
        DerReader {
            data: self.content,
            pos: 0,
            base: self.offset + (self.raw.len() - self.content.len()),
        }
    }
}

/// Cursor over DER-encoded bytes.
#[derive(Debug, Clone)]
pub struct DerReader<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> DerReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            base: 0,
        }
    }

    /// Absolute offset of the next unread byte
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn err(&self, message: impl Into<String>) -> Asn1Error {
        Asn1Error::new(self.offset(), message)
    }

    /// Tag byte of the next element without consuming it
    pub fn peek_tag(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Read the next complete TLV element.
    pub fn read_tlv(&mut self) -> Result<Tlv<'a>, Asn1Error> {
        let start = self.pos;
        let tag_byte = *self
            .data
            .get(self.pos)
            .ok_or_else(|| self.err("unexpected end of input"))?;
        if tag_byte & 0x1f == 0x1f {
            return Err(self.err("multi-byte tags are not used by DER here"));
        }
        self.pos += 1;

        let len = self.read_length()?;
        if self.data.len() - self.pos < len {
            let err = self.err(format!(
                "length {len} exceeds the {} remaining bytes",
                self.remaining()
            ));
            self.pos = start;
            return Err(err);
        }
        let content = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(Tlv {
            tag: tag_byte,
            content,
            raw: &self.data[start..self.pos],
            offset: self.base + start,
        })
    }

    fn read_length(&mut self) -> Result<usize, Asn1Error> {
        let first = *self
            .data
            .get(self.pos)
            .ok_or_else(|| self.err("truncated length"))?;
        self.pos += 1;
        if first & 0x80 == 0 {
            return Ok(first as usize);
        }
        let count = (first & 0x7f) as usize;
        if count == 0 {
            return Err(self.err("indefinite length is not valid DER"));
        }
        if count > std::mem::size_of::<usize>() {
            return Err(self.err("length field too large"));
        }
        let mut len: usize = 0;
        for _ in 0..count {
            let byte = *self
                .data
                .get(self.pos)
                .ok_or_else(|| self.err("truncated length"))?;
            self.pos += 1;
            len = (len << 8) | byte as usize;
        }
        Ok(len)
    }

    /// Read the next element, requiring an exact tag.
    pub fn read_expected(&mut self, expected: u8, what: &str) -> Result<Tlv<'a>, Asn1Error> {
        let offset = self.offset();
        let tlv = self.read_tlv()?;
        if tlv.tag != expected {
            return Err(Asn1Error::new(
                offset,
                format!("expected {what} (tag 0x{expected:02x}), found tag 0x{:02x}", tlv.tag),
            ));
        }
        Ok(tlv)
    }

    /// Enter a SEQUENCE, returning a reader over its content.
    pub fn read_sequence(&mut self, what: &str) -> Result<DerReader<'a>, Asn1Error> {
        Ok(self.read_expected(tag::SEQUENCE, what)?.reader())
    }

    /// Enter a SET, returning a reader over its content.
    pub fn read_set(&mut self, what: &str) -> Result<DerReader<'a>, Asn1Error> {
        Ok(self.read_expected(tag::SET, what)?.reader())
    }

    /// Consume a context-specific element `[n]` if it is next.
    pub fn read_optional_context(&mut self, n: u8) -> Result<Option<Tlv<'a>>, Asn1Error> {
        match self.peek_tag() {
            Some(t) if t & 0xc0 == 0x80 && t & 0x1f == n => Ok(Some(self.read_tlv()?)),
            _ => Ok(None),
        }
    }

    /// INTEGER content bytes, two's complement as encoded.
    pub fn read_integer_bytes(&mut self) -> Result<&'a [u8], Asn1Error> {
        let tlv = self.read_expected(tag::INTEGER, "INTEGER")?;
        if tlv.content.is_empty() {
            return Err(Asn1Error::new(tlv.offset, "empty INTEGER"));
        }
        Ok(tlv.content)
    }

    /// INTEGER as i64; errors on values that do not fit.
    pub fn read_integer_i64(&mut self) -> Result<i64, Asn1Error> {
        let offset = self.offset();
        let bytes = self.read_integer_bytes()?;
        if bytes.len() > 8 {
            return Err(Asn1Error::new(offset, "INTEGER does not fit in 64 bits"));
        }
        let negative = bytes[0] & 0x80 != 0;
        let mut value: i64 = if negative { -1 } else { 0 };
        for &byte in bytes {
            value = (value << 8) | i64::from(byte);
        }
        Ok(value)
    }

    pub fn read_oid(&mut self) -> Result<String, Asn1Error> {
        let tlv = self.read_expected(tag::OBJECT_IDENTIFIER, "OBJECT IDENTIFIER")?;
        oid::decode(tlv.content, tlv.offset)
    }

    pub fn read_octet_string(&mut self) -> Result<&'a [u8], Asn1Error> {
        Ok(self.read_expected(tag::OCTET_STRING, "OCTET STRING")?.content)
    }

    /// BIT STRING content with the leading unused-bits count stripped.
    pub fn read_bit_string(&mut self) -> Result<&'a [u8], Asn1Error> {
        let tlv = self.read_expected(tag::BIT_STRING, "BIT STRING")?;
        match tlv.content.split_first() {
            Some((0, rest)) => Ok(rest),
            Some((unused, _)) => Err(Asn1Error::new(
                tlv.offset,
                format!("BIT STRING with {unused} unused bits not supported"),
            )),
            None => Err(Asn1Error::new(tlv.offset, "empty BIT STRING")),
        }
    }

    pub fn read_boolean(&mut self) -> Result<bool, Asn1Error> {
        let tlv = self.read_expected(tag::BOOLEAN, "BOOLEAN")?;
        match tlv.content {
            [0x00] => Ok(false),
            [_] => Ok(true),
            _ => Err(Asn1Error::new(tlv.offset, "BOOLEAN must be one byte")),
        }
    }

    pub fn read_null(&mut self) -> Result<(), Asn1Error> {
        let tlv = self.read_expected(tag::NULL, "NULL")?;
        if !tlv.content.is_empty() {
            return Err(Asn1Error::new(tlv.offset, "NULL with content"));
        }
        Ok(())
    }

    /// UTCTime or GeneralizedTime, normalised to UTC. Fractional seconds
    /// are truncated.
    pub fn read_time(&mut self) -> Result<DateTime<Utc>, Asn1Error> {
        let offset = self.offset();
        let tlv = self.read_tlv()?;
        let text = std::str::from_utf8(tlv.content)
            .map_err(|_| Asn1Error::new(tlv.offset, "time value is not ASCII"))?;
        match tlv.tag {
            tag::UTC_TIME | tag::GENERALIZED_TIME => parse_time(text, tlv.offset),
            other => Err(Asn1Error::new(
                offset,
                format!("expected a time value, found tag 0x{other:02x}"),
            )),
        }
    }
}

fn parse_time(text: &str, offset: usize) -> Result<DateTime<Utc>, Asn1Error> {
    let bad = || Asn1Error::new(offset, format!("unparseable time '{text}'"));
    let stripped = text.strip_suffix('Z').ok_or_else(bad)?;
    // DER keeps everything in Zulu; a fraction may precede the Z.
    let whole = stripped.split('.').next().ok_or_else(bad)?;
    let naive = match whole.len() {
        14 => NaiveDateTime::parse_from_str(whole, "%Y%m%d%H%M%S"),
        12 => NaiveDateTime::parse_from_str(whole, "%y%m%d%H%M%S"),
        10 => NaiveDateTime::parse_from_str(whole, "%y%m%d%H%M"),
        _ => return Err(bad()),
    }
    .map_err(|_| bad())?;
    Ok(Utc.from_utc_datetime(&naive))
}

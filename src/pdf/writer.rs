//! Incremental update serialisation.
//!
//! An update never rewrites an existing byte: the original buffer is
//! copied, new and revised objects are appended, then an xref section,
//! a trailer chained via `/Prev`, `startxref` and `%%EOF` follow. All
//! separators are `\n`.

use super::lexer::{PdfDict, PdfValue};

/// Collects objects for one incremental update and renders it.
pub struct IncrementalUpdate<'a> {
    original: &'a [u8],
    objects: Vec<(u32, u16, PdfValue)>,
}

impl<'a> IncrementalUpdate<'a> {
    pub fn new(original: &'a [u8]) -> Self {
        Self {
            original,
            objects: Vec::new(),
        }
    }

    /// Queue a new or revised object. Revised objects keep their number
    /// and generation so their identity survives the update.
    pub fn add_object(&mut self, number: u32, generation: u16, value: PdfValue) {
        self.objects.push((number, generation, value));
    }

    /// Render the update. `previous_trailer` supplies `/Root`, `/Info`
    /// and `/ID`; `size` is the next free object number after this
    /// update; `prev_startxref` chains to the superseded xref section.
    pub fn render(
        mut self,
        previous_trailer: &PdfDict,
        size: u32,
        prev_startxref: usize,
    ) -> Vec<u8> {
        let mut out = self.original.to_vec();
        if out.last() != Some(&b'\n') {
            out.push(b'\n');
        }

        self.objects.sort_by_key(|(number, _, _)| *number);
        let mut xref_rows: Vec<(u32, u16, usize)> = Vec::with_capacity(self.objects.len());
        for (number, generation, value) in &self.objects {
            xref_rows.push((*number, *generation, out.len()));
            out.extend_from_slice(format!("{number} {generation} obj\n").as_bytes());
            serialize_value(&mut out, value);
            out.extend_from_slice(b"\nendobj\n");
        }

        let xref_offset = out.len();
        out.extend_from_slice(b"xref\n");
        for run in consecutive_runs(&xref_rows) {
            out.extend_from_slice(
                format!("{} {}\n", run[0].0, run.len()).as_bytes(),
            );
            for (_, generation, offset) in run {
                out.extend_from_slice(format!("{offset:010} {generation:05} n \n").as_bytes());
            }
        }

        let mut trailer = PdfDict::new();
        trailer.set("Size", PdfValue::Integer(size as i64));
        for key in ["Root", "Info", "ID"] {
            if let Some(value) = previous_trailer.get(key) {
                trailer.set(key, value.clone());
            }
        }
        trailer.set("Prev", PdfValue::Integer(prev_startxref as i64));

        out.extend_from_slice(b"trailer\n");
        serialize_value(&mut out, &PdfValue::Dictionary(trailer));
        out.extend_from_slice(format!("\nstartxref\n{xref_offset}\n%%EOF\n").as_bytes());
        out
    }
}

/// Split sorted xref rows into maximal consecutive-number runs, one
/// subsection each.
fn consecutive_runs(rows: &[(u32, u16, usize)]) -> Vec<&[(u32, u16, usize)]> {
    let mut runs = Vec::new();
    let mut start = 0;
    for index in 1..=rows.len() {
        let broken = index == rows.len() || rows[index].0 != rows[index - 1].0 + 1;
        if broken {
            runs.push(&rows[start..index]);
            start = index;
        }
    }
    runs
}

/// Serialise a direct object.
pub fn serialize_value(out: &mut Vec<u8>, value: &PdfValue) {
    match value {
        PdfValue::Null => out.extend_from_slice(b"null"),
        PdfValue::Boolean(true) => out.extend_from_slice(b"true"),
        PdfValue::Boolean(false) => out.extend_from_slice(b"false"),
        PdfValue::Integer(value) => out.extend_from_slice(value.to_string().as_bytes()),
        PdfValue::Real(value) => {
            let mut text = format!("{value:.6}");
            while text.ends_with('0') {
                text.pop();
            }
            if text.ends_with('.') {
                text.pop();
            }
            out.extend_from_slice(text.as_bytes());
        }
        PdfValue::LiteralString(bytes) => {
            out.push(b'(');
            for byte in bytes {
                match byte {
                    b'(' | b')' | b'\\' => {
                        out.push(b'\\');
                        out.push(*byte);
                    }
                    b'\n' => out.extend_from_slice(b"\\n"),
                    b'\r' => out.extend_from_slice(b"\\r"),
                    other => out.push(*other),
                }
            }
            out.push(b')');
        }
        PdfValue::HexString(bytes) => {
            out.push(b'<');
            out.extend_from_slice(hex::encode(bytes).as_bytes());
            out.push(b'>');
        }
        PdfValue::Name(name) => {
            out.push(b'/');
            for byte in name.bytes() {
                let needs_escape = byte == b'#'
                    || byte <= b' '
                    || matches!(
                        byte,
                        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
                    );
                if needs_escape {
                    out.extend_from_slice(format!("#{byte:02X}").as_bytes());
                } else {
                    out.push(byte);
                }
            }
        }
        PdfValue::Array(items) => {
            out.push(b'[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(b' ');
                }
                serialize_value(out, item);
            }
            out.push(b']');
        }
        PdfValue::Dictionary(dict) => serialize_dict(out, dict),
        PdfValue::Stream { dict, data } => {
            let mut with_length = dict.clone();
            with_length.set("Length", PdfValue::Integer(data.len() as i64));
            serialize_dict(out, &with_length);
            out.extend_from_slice(b"\nstream\n");
            out.extend_from_slice(data);
            out.extend_from_slice(b"\nendstream");
        }
        PdfValue::Reference(reference) => {
            out.extend_from_slice(
                format!("{} {} R", reference.number, reference.generation).as_bytes(),
            );
        }
        PdfValue::Raw(bytes) => out.extend_from_slice(bytes),
    }
}

fn serialize_dict(out: &mut Vec<u8>, dict: &PdfDict) {
    out.extend_from_slice(b"<< ");
    for (key, value) in &dict.0 {
        serialize_value(out, &PdfValue::Name(key.clone()));
        out.push(b' ');
        serialize_value(out, value);
        out.push(b' ');
    }
    out.extend_from_slice(b">>");
}

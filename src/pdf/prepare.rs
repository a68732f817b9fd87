//! Signature placeholder preparation.
//!
//! One incremental update adds an invisible signature widget whose value
//! is a document-timestamp dictionary with an all-zero `/Contents` hex
//! window. The update is serialised once, then the four `/ByteRange`
//! numbers are patched in place; every offset in the buffer stays fixed
//! from that point on.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::crypto::{HashAlgorithm, StreamingHash};
use crate::error::{Result, TimestampError};
use crate::types;

use super::lexer::{Document, ObjRef, PdfDict, PdfValue};
use super::writer::IncrementalUpdate;

/// Inputs for the placeholder update
#[derive(Debug, Clone)]
pub struct PrepareOptions {
    /// Bytes reserved for the DER token; the hex window is twice this
    pub signature_size: usize,
    /// Explicit field name; auto-numbered `TimestampN` when unset
    pub field_name: Option<String>,
    /// Value of the signature dictionary `/M` entry
    pub signing_time: DateTime<Utc>,
}

/// A document with a pending placeholder window.
///
/// The buffer is immutable from construction on: embedding writes hex
/// digits inside the window and touches nothing else.
#[derive(Debug, Clone)]
pub struct PreparedPdf {
    bytes: Vec<u8>,
    contents_offset: usize,
    placeholder_len: usize,
    byte_range: [usize; 4],
    field_name: String,
}

impl PreparedPdf {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Byte index of the first hex digit, just past the `<`
    pub fn contents_offset(&self) -> usize {
        self.contents_offset
    }

    /// Width of the hex window in digits
    pub fn placeholder_len(&self) -> usize {
        self.placeholder_len
    }

    pub fn byte_range(&self) -> [usize; 4] {
        self.byte_range
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// Hash the two covered ranges without copying them.
    pub fn digest(&self, algorithm: HashAlgorithm) -> Vec<u8> {
        let [offset1, length1, offset2, length2] = self.byte_range;
        let mut hash = StreamingHash::new(algorithm);
        hash.update(&self.bytes[offset1..offset1 + length1]);
        hash.update(&self.bytes[offset2..offset2 + length2]);
        hash.finalize()
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Append the placeholder update to `pdf`.
pub fn prepare(pdf: &[u8], options: &PrepareOptions) -> Result<PreparedPdf> {
    if options.signature_size == 0 {
        return Err(TimestampError::invalid_pdf(
            "signature_size must be at least one byte",
        ));
    }
    let doc = Document::load(pdf)?;
    let catalog_ref = doc.catalog_ref()?;
    let catalog = doc.catalog()?;

    let existing = collect_field_names(&doc, &catalog)?;
    let field_name = match &options.field_name {
        Some(name) => {
            if existing.contains(name) {
                return Err(TimestampError::invalid_pdf(format!(
                    "signature field '{name}' already exists"
                )));
            }
            name.clone()
        }
        None => types::next_field_name(&existing),
    };

    let (page_ref, page) = doc.first_page()?;

    let mut next_number = doc.next_object_number();
    let mut allocate = || {
        let number = next_number;
        next_number += 1;
        number
    };

    let sig_number = allocate();
    let widget_number = allocate();
    let widget_ref = PdfValue::Reference(ObjRef::new(widget_number, 0));

    let mut update = IncrementalUpdate::new(pdf);
    update.add_object(
        sig_number,
        0,
        signature_dictionary(options.signature_size, options.signing_time),
    );
    update.add_object(
        widget_number,
        0,
        widget_annotation(&field_name, sig_number, page_ref),
    );

    add_widget_to_page(&doc, &mut update, page_ref, page, &widget_ref)?;
    add_field_to_acroform(&doc, &mut update, catalog_ref, catalog, &widget_ref)?;

    let rendered = update.render(&doc.trailer, next_number, doc.startxref);
    finalize(rendered, pdf.len(), options.signature_size, field_name)
}

fn signature_dictionary(signature_size: usize, signing_time: DateTime<Utc>) -> PdfValue {
    let placeholder_len = signature_size * 2;
    let mut contents = Vec::with_capacity(placeholder_len + 2);
    contents.push(b'<');
    contents.resize(placeholder_len + 1, b'0');
    contents.push(b'>');

    let mut dict = PdfDict::new();
    dict.set("Type", PdfValue::Name("Sig".into()));
    dict.set("Filter", PdfValue::Name("Adobe.PPKLite".into()));
    dict.set("SubFilter", PdfValue::Name("ETSI.RFC3161".into()));
    dict.set("Contents", PdfValue::Raw(contents));
    dict.set(
        "ByteRange",
        PdfValue::Raw(b"[0 0000000000 0000000000 0000000000]".to_vec()),
    );
    let date = signing_time.format("D:%Y%m%d%H%M%S+00'00'").to_string();
    dict.set("M", PdfValue::LiteralString(date.into_bytes()));
    PdfValue::Dictionary(dict)
}

fn widget_annotation(field_name: &str, sig_number: u32, page_ref: ObjRef) -> PdfValue {
    let mut dict = PdfDict::new();
    dict.set("Type", PdfValue::Name("Annot".into()));
    dict.set("Subtype", PdfValue::Name("Widget".into()));
    dict.set("FT", PdfValue::Name("Sig".into()));
    // Invisible: zero-area rectangle, hidden-independent print flag
    dict.set(
        "Rect",
        PdfValue::Array(vec![
            PdfValue::Integer(0),
            PdfValue::Integer(0),
            PdfValue::Integer(0),
            PdfValue::Integer(0),
        ]),
    );
    dict.set("F", PdfValue::Integer(132));
    dict.set("T", PdfValue::LiteralString(field_name.as_bytes().to_vec()));
    dict.set("V", PdfValue::Reference(ObjRef::new(sig_number, 0)));
    dict.set("P", PdfValue::Reference(page_ref));
    PdfValue::Dictionary(dict)
}

/// Attach the widget to page 1. When `/Annots` is an indirect array only
/// that array object is revised; otherwise the page itself is.
fn add_widget_to_page(
    doc: &Document<'_>,
    update: &mut IncrementalUpdate<'_>,
    page_ref: ObjRef,
    mut page: PdfDict,
    widget_ref: &PdfValue,
) -> Result<()> {
    match page.get("Annots").cloned() {
        Some(PdfValue::Reference(annots_ref)) => {
            let annots = doc.object(annots_ref.number)?;
            let mut items = annots
                .as_array()
                .ok_or_else(|| TimestampError::invalid_pdf("/Annots is not an array"))?
                .to_vec();
            items.push(widget_ref.clone());
            update.add_object(
                annots_ref.number,
                doc.generation_of(annots_ref.number),
                PdfValue::Array(items),
            );
        }
        Some(PdfValue::Array(mut items)) => {
            items.push(widget_ref.clone());
            page.set("Annots", PdfValue::Array(items));
            update.add_object(
                page_ref.number,
                doc.generation_of(page_ref.number),
                PdfValue::Dictionary(page),
            );
        }
        _ => {
            page.set("Annots", PdfValue::Array(vec![widget_ref.clone()]));
            update.add_object(
                page_ref.number,
                doc.generation_of(page_ref.number),
                PdfValue::Dictionary(page),
            );
        }
    }
    Ok(())
}

/// Register the field in the AcroForm, creating the form dictionary with
/// `/SigFlags 3` when the document has none.
fn add_field_to_acroform(
    doc: &Document<'_>,
    update: &mut IncrementalUpdate<'_>,
    catalog_ref: ObjRef,
    mut catalog: PdfDict,
    widget_ref: &PdfValue,
) -> Result<()> {
    match catalog.get("AcroForm").cloned() {
        Some(PdfValue::Reference(form_ref)) => {
            let form = doc.object(form_ref.number)?;
            let mut form = form
                .as_dict()
                .ok_or_else(|| TimestampError::invalid_pdf("/AcroForm is not a dictionary"))?
                .clone();
            append_field(doc, &mut form, widget_ref)?;
            update.add_object(
                form_ref.number,
                doc.generation_of(form_ref.number),
                PdfValue::Dictionary(form),
            );
        }
        Some(PdfValue::Dictionary(mut form)) => {
            append_field(doc, &mut form, widget_ref)?;
            catalog.set("AcroForm", PdfValue::Dictionary(form));
            update.add_object(
                catalog_ref.number,
                doc.generation_of(catalog_ref.number),
                PdfValue::Dictionary(catalog),
            );
        }
        _ => {
            let mut form = PdfDict::new();
            form.set("Fields", PdfValue::Array(vec![widget_ref.clone()]));
            form.set("SigFlags", PdfValue::Integer(3));
            catalog.set("AcroForm", PdfValue::Dictionary(form));
            update.add_object(
                catalog_ref.number,
                doc.generation_of(catalog_ref.number),
                PdfValue::Dictionary(catalog),
            );
        }
    }
    Ok(())
}

fn append_field(doc: &Document<'_>, form: &mut PdfDict, widget_ref: &PdfValue) -> Result<()> {
    let mut fields = match form.get("Fields") {
        Some(value) => doc
            .resolve(value)?
            .as_array()
            .ok_or_else(|| TimestampError::invalid_pdf("/Fields is not an array"))?
            .to_vec(),
        None => Vec::new(),
    };
    fields.push(widget_ref.clone());
    form.set("Fields", PdfValue::Array(fields));
    form.set("SigFlags", PdfValue::Integer(3));
    Ok(())
}

/// All `/T` values reachable through the AcroForm.
fn collect_field_names(doc: &Document<'_>, catalog: &PdfDict) -> Result<HashSet<String>> {
    let mut names = HashSet::new();
    let Some(form_value) = catalog.get("AcroForm") else {
        return Ok(names);
    };
    let form = doc.resolve(form_value)?;
    let Some(form) = form.as_dict() else {
        return Ok(names);
    };
    let Some(fields_value) = form.get("Fields") else {
        return Ok(names);
    };
    let fields = doc.resolve(fields_value)?;
    if let Some(items) = fields.as_array() {
        for item in items {
            let field = doc.resolve(item)?;
            if let Some(name) = field
                .as_dict()
                .and_then(|dict| dict.get("T"))
                .and_then(PdfValue::as_string_bytes)
            {
                names.insert(String::from_utf8_lossy(name).into_owned());
            }
        }
    }
    Ok(names)
}

/// Locate the window in the rendered update and patch the `/ByteRange`.
fn finalize(
    mut bytes: Vec<u8>,
    original_len: usize,
    signature_size: usize,
    field_name: String,
) -> Result<PreparedPdf> {
    let placeholder_len = signature_size * 2;

    let marker = b"/Contents <";
    let marker_pos = find_from(&bytes, original_len, marker)
        .ok_or_else(|| TimestampError::invalid_pdf("placeholder window not found"))?;
    let lt = marker_pos + marker.len() - 1;
    let contents_offset = lt + 1;
    let gt = contents_offset + placeholder_len;
    if bytes.get(gt) != Some(&b'>')
        || !bytes[contents_offset..gt].iter().all(|b| *b == b'0')
    {
        return Err(TimestampError::invalid_pdf(
            "placeholder window has unexpected shape",
        ));
    }

    let total = bytes.len();
    let byte_range = [0, lt, gt + 1, total - (gt + 1)];

    let range_marker = b"/ByteRange [";
    let range_pos = find_from(&bytes, original_len, range_marker)
        .ok_or_else(|| TimestampError::invalid_pdf("ByteRange placeholder not found"))?;
    // The serialised form is `[0 ` followed by three ten-digit fields.
    let first = range_pos + range_marker.len() + 2;
    for (slot, value) in [byte_range[1], byte_range[2], byte_range[3]]
        .into_iter()
        .enumerate()
    {
        if value > 9_999_999_999 {
            return Err(TimestampError::invalid_pdf(
                "document too large for a ten-digit ByteRange",
            ));
        }
        let field = first + slot * 11;
        bytes[field..field + 10].copy_from_slice(format!("{value:010}").as_bytes());
    }

    Ok(PreparedPdf {
        bytes,
        contents_offset,
        placeholder_len,
        byte_range,
        field_name,
    })
}

fn find_from(haystack: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|position| from + position)
}

//! Document security store serialisation.
//!
//! One incremental update adds a stream object per unique DER blob, the
//! `/DSS` dictionary with its `/Certs`, `/CRLs` and `/OCSPs` arrays, the
//! optional per-signature `/VRI` entries, and a revised catalog pointing
//! at the store.

use sha1::{Digest, Sha1};

use crate::error::Result;
use crate::pdf::lexer::{Document, ObjRef, PdfDict, PdfValue};
use crate::pdf::writer::IncrementalUpdate;
use crate::types::LtvData;

/// Validation material scoped to one signature for its `/VRI` entry
#[derive(Debug, Clone)]
pub struct VriEntry {
    /// DER of the certificate that signed the covered signature; the
    /// entry key is the uppercase SHA-1 of these bytes
    pub signing_cert: Vec<u8>,
    pub data: LtvData,
}

impl VriEntry {
    /// The `/VRI` dictionary key for this entry
    pub fn key(&self) -> String {
        hex::encode_upper(Sha1::digest(&self.signing_cert))
    }
}

/// Append a DSS update carrying `data` plus the per-signature entries.
/// When there is nothing to store the input is returned unchanged.
pub fn write_dss(pdf: &[u8], data: &LtvData, vri: &[VriEntry]) -> Result<Vec<u8>> {
    let mut pooled = data.clone();
    for entry in vri {
        pooled.merge(&entry.data);
    }
    if pooled.is_empty() {
        return Ok(pdf.to_vec());
    }

    let doc = Document::load(pdf)?;
    let catalog_ref = doc.catalog_ref()?;
    let mut catalog = doc.catalog()?;

    let mut next_number = doc.next_object_number();
    let mut update = IncrementalUpdate::new(pdf);

    // One stream object per unique blob, shared between the global
    // arrays and every VRI entry that references it.
    let mut blob_refs: Vec<(Vec<u8>, ObjRef)> = Vec::new();
    let mut reference = |blob: &[u8], update: &mut IncrementalUpdate<'_>| -> ObjRef {
        if let Some((_, existing)) = blob_refs.iter().find(|(known, _)| known == blob) {
            return *existing;
        }
        let obj_ref = ObjRef::new(next_number, 0);
        next_number += 1;
        update.add_object(
            obj_ref.number,
            0,
            PdfValue::Stream {
                dict: PdfDict::new(),
                data: blob.to_vec(),
            },
        );
        blob_refs.push((blob.to_vec(), obj_ref));
        obj_ref
    };

    let mut dss = PdfDict::new();
    for (key, blobs) in [
        ("Certs", &pooled.certificates),
        ("CRLs", &pooled.crls),
        ("OCSPs", &pooled.ocsps),
    ] {
        if blobs.is_empty() {
            continue;
        }
        let refs = blobs
            .iter()
            .map(|blob| PdfValue::Reference(reference(blob, &mut update)))
            .collect();
        dss.set(key, PdfValue::Array(refs));
    }

    let mut vri_dict = PdfDict::new();
    for entry in vri {
        if entry.data.is_empty() {
            continue;
        }
        let mut value = PdfDict::new();
        for (key, blobs) in [
            ("Cert", &entry.data.certificates),
            ("CRL", &entry.data.crls),
            ("OCSP", &entry.data.ocsps),
        ] {
            if blobs.is_empty() {
                continue;
            }
            let refs = blobs
                .iter()
                .map(|blob| PdfValue::Reference(reference(blob, &mut update)))
                .collect();
            value.set(key, PdfValue::Array(refs));
        }
        vri_dict.set(entry.key(), PdfValue::Dictionary(value));
    }
    if !vri_dict.0.is_empty() {
        dss.set("VRI", PdfValue::Dictionary(vri_dict));
    }

    let dss_ref = ObjRef::new(next_number, 0);
    next_number += 1;
    update.add_object(dss_ref.number, 0, PdfValue::Dictionary(dss));

    catalog.set("DSS", PdfValue::Reference(dss_ref));
    update.add_object(
        catalog_ref.number,
        doc.generation_of(catalog_ref.number),
        PdfValue::Dictionary(catalog),
    );

    Ok(update.render(&doc.trailer, next_number, doc.startxref))
}

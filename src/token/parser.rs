//! CMS `ContentInfo` / `SignedData` / `TSTInfo` parsing.
//!
//! A token that fails to parse is rejected outright; unverifiable bytes
//! must never end up inside a document.

use chrono::{DateTime, Utc};

use crate::asn1::{oid, tag, Asn1Error, DerReader, Tlv};
use crate::error::{Result, TimestampError};
use crate::types::Accuracy;

/// The message imprint the TSA signed over
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageImprint {
    pub hash_algorithm_oid: String,
    pub hashed_message: Vec<u8>,
}

/// The inner signed payload of a timestamp token
#[derive(Debug, Clone)]
pub struct TstInfo {
    pub version: i64,
    pub policy: String,
    pub message_imprint: MessageImprint,
    /// Raw INTEGER content of the serial number
    pub serial: Vec<u8>,
    pub gen_time: DateTime<Utc>,
    pub accuracy: Option<Accuracy>,
    pub ordering: bool,
    /// Echoed nonce magnitude, when the TSA included one
    pub nonce: Option<Vec<u8>>,
}

/// How the SignerInfo points at its certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerIdentifier {
    IssuerAndSerial {
        issuer_der: Vec<u8>,
        serial: Vec<u8>,
    },
    SubjectKeyIdentifier(Vec<u8>),
}

/// Signed attributes in both their parsed and verification forms
#[derive(Debug, Clone)]
pub struct SignedAttributes {
    /// The attribute set re-encoded as SET OF, the form the signature
    /// is computed over
    pub der_for_verification: Vec<u8>,
    pub message_digest: Option<Vec<u8>>,
    pub content_type: Option<String>,
}

/// The single SignerInfo of a timestamp token
#[derive(Debug, Clone)]
pub struct SignerInfo {
    pub sid: SignerIdentifier,
    pub digest_algorithm: String,
    pub signed_attrs: Option<SignedAttributes>,
    pub signature_algorithm: String,
    pub signature: Vec<u8>,
}

/// CRL and OCSP blobs from the Adobe RevocationInfoArchival attribute
#[derive(Debug, Clone, Default)]
pub struct RevocationArchival {
    pub crls: Vec<Vec<u8>>,
    pub ocsps: Vec<Vec<u8>>,
}

/// A fully parsed timestamp token
#[derive(Debug, Clone)]
pub struct ParsedToken {
    /// The ContentInfo exactly as received
    pub der: Vec<u8>,
    pub tst_info: TstInfo,
    /// Raw DER of the TSTInfo, the bytes the message-digest attribute
    /// commits to
    pub tst_info_der: Vec<u8>,
    /// DER certificates shipped inside the SignedData
    pub certificates: Vec<Vec<u8>>,
    pub signer: SignerInfo,
    pub revocation: RevocationArchival,
}

/// Parse a DER `ContentInfo` holding a `SignedData` with a `TSTInfo`
/// payload.
pub fn parse_token(der: &[u8]) -> Result<ParsedToken> {
    Ok(parse_inner(der)?)
}

fn parse_inner(der: &[u8]) -> std::result::Result<ParsedToken, Asn1Error> {
    let mut top = DerReader::new(der);
    let mut content_info = top.read_sequence("ContentInfo")?;
    let content_type = content_info.read_oid()?;
    if content_type != oid::SIGNED_DATA {
        return Err(Asn1Error::new(
            0,
            format!("token is not a SignedData ContentInfo (found {content_type})"),
        ));
    }
    let content = content_info
        .read_optional_context(0)?
        .ok_or_else(|| Asn1Error::new(content_info.offset(), "ContentInfo without content"))?;

    let mut signed_data = content.reader().read_sequence("SignedData")?;
    signed_data.read_integer_i64()?;
    signed_data.read_set("digestAlgorithms")?;

    let mut encap = signed_data.read_sequence("EncapsulatedContentInfo")?;
    let econtent_type = encap.read_oid()?;
    if econtent_type != oid::TST_INFO {
        return Err(Asn1Error::new(
            0,
            format!("encapsulated content is not a TSTInfo (found {econtent_type})"),
        ));
    }
    let econtent = encap
        .read_optional_context(0)?
        .ok_or_else(|| Asn1Error::new(encap.offset(), "SignedData without eContent"))?;
    let tst_info_der = econtent.reader().read_octet_string()?.to_vec();

    let mut certificates = Vec::new();
    if let Some(cert_set) = signed_data.read_optional_context(0)? {
        let mut certs = cert_set.reader();
        while !certs.is_empty() {
            let choice = certs.read_tlv()?;
            // Only plain Certificate choices matter here; the tagged
            // alternatives (attribute certs, other formats) are skipped.
            if choice.tag == tag::SEQUENCE {
                certificates.push(choice.raw.to_vec());
            }
        }
    }
    // crls [1], unused at this level
    signed_data.read_optional_context(1)?;

    let mut signer_infos = signed_data.read_set("signerInfos")?;
    if signer_infos.is_empty() {
        return Err(Asn1Error::new(
            signer_infos.offset(),
            "SignedData without a SignerInfo",
        ));
    }
    let (signer, revocation) = parse_signer_info(&mut signer_infos)?;

    let tst_info = parse_tst_info(&tst_info_der)?;

    Ok(ParsedToken {
        der: der.to_vec(),
        tst_info,
        tst_info_der,
        certificates,
        signer,
        revocation,
    })
}

fn parse_signer_info(
    signer_infos: &mut DerReader<'_>,
) -> std::result::Result<(SignerInfo, RevocationArchival), Asn1Error> {
    let mut info = signer_infos.read_sequence("SignerInfo")?;
    info.read_integer_i64()?;

    let sid = if let Some(ski) = info.read_optional_context(0)? {
        SignerIdentifier::SubjectKeyIdentifier(ski.content.to_vec())
    } else {
        let mut ias = info.read_sequence("IssuerAndSerialNumber")?;
        let issuer = ias.read_expected(tag::SEQUENCE, "issuer Name")?;
        let serial = ias.read_integer_bytes()?;
        SignerIdentifier::IssuerAndSerial {
            issuer_der: issuer.raw.to_vec(),
            serial: serial.to_vec(),
        }
    };

    let mut digest_alg = info.read_sequence("digestAlgorithm")?;
    let digest_algorithm = digest_alg.read_oid()?;

    let mut revocation = RevocationArchival::default();
    let signed_attrs = match info.read_optional_context(0)? {
        Some(attrs) => Some(parse_signed_attributes(&attrs, &mut revocation)?),
        None => None,
    };

    let mut signature_alg = info.read_sequence("signatureAlgorithm")?;
    let signature_algorithm = signature_alg.read_oid()?;
    let signature = info.read_octet_string()?.to_vec();

    if let Some(unsigned) = info.read_optional_context(1)? {
        collect_revocation_archival(&unsigned, &mut revocation)?;
    }

    Ok((
        SignerInfo {
            sid,
            digest_algorithm,
            signed_attrs,
            signature_algorithm,
            signature,
        },
        revocation,
    ))
}

fn parse_signed_attributes(
    attrs: &Tlv<'_>,
    revocation: &mut RevocationArchival,
) -> std::result::Result<SignedAttributes, Asn1Error> {
    // The signature covers the attributes re-tagged as SET OF.
    let mut der_for_verification = attrs.raw.to_vec();
    der_for_verification[0] = tag::SET;

    let mut message_digest = None;
    let mut content_type = None;

    let mut reader = attrs.reader();
    while !reader.is_empty() {
        let mut attribute = reader.read_sequence("Attribute")?;
        let attr_type = attribute.read_oid()?;
        let values = attribute.read_set("attrValues")?;
        match attr_type.as_str() {
            oid::ATTR_MESSAGE_DIGEST => {
                message_digest = Some(values.clone().read_octet_string()?.to_vec());
            }
            oid::ATTR_CONTENT_TYPE => {
                content_type = Some(values.clone().read_oid()?);
            }
            oid::REVOCATION_INFO_ARCHIVAL => {
                parse_revocation_archival(values, revocation)?;
            }
            _ => {}
        }
    }

    Ok(SignedAttributes {
        der_for_verification,
        message_digest,
        content_type,
    })
}

fn collect_revocation_archival(
    unsigned: &Tlv<'_>,
    revocation: &mut RevocationArchival,
) -> std::result::Result<(), Asn1Error> {
    let mut reader = unsigned.reader();
    while !reader.is_empty() {
        let mut attribute = reader.read_sequence("Attribute")?;
        let attr_type = attribute.read_oid()?;
        let values = attribute.read_set("attrValues")?;
        if attr_type == oid::REVOCATION_INFO_ARCHIVAL {
            parse_revocation_archival(values, revocation)?;
        }
    }
    Ok(())
}

fn parse_revocation_archival(
    mut values: DerReader<'_>,
    revocation: &mut RevocationArchival,
) -> std::result::Result<(), Asn1Error> {
    while !values.is_empty() {
        let mut archival = values.read_sequence("RevocationInfoArchival")?;
        if let Some(crls) = archival.read_optional_context(0)? {
            let mut list = crls.reader().read_sequence("crl list")?;
            while !list.is_empty() {
                let crl = list.read_expected(tag::SEQUENCE, "CertificateList")?;
                revocation.crls.push(crl.raw.to_vec());
            }
        }
        if let Some(ocsps) = archival.read_optional_context(1)? {
            let mut list = ocsps.reader().read_sequence("ocsp list")?;
            while !list.is_empty() {
                let ocsp = list.read_expected(tag::SEQUENCE, "OCSPResponse")?;
                revocation.ocsps.push(ocsp.raw.to_vec());
            }
        }
        // otherRevInfo [2] is ignored
        archival.read_optional_context(2)?;
    }
    Ok(())
}

fn parse_tst_info(der: &[u8]) -> std::result::Result<TstInfo, Asn1Error> {
    let mut top = DerReader::new(der);
    let mut info = top.read_sequence("TSTInfo")?;
    let version = info.read_integer_i64()?;
    let policy = info.read_oid()?;

    let mut imprint = info.read_sequence("MessageImprint")?;
    let mut imprint_alg = imprint.read_sequence("hashAlgorithm")?;
    let hash_algorithm_oid = imprint_alg.read_oid()?;
    let hashed_message = imprint.read_octet_string()?.to_vec();

    let serial = info.read_integer_bytes()?.to_vec();
    let gen_time = info.read_time()?;

    let mut accuracy = None;
    if info.peek_tag() == Some(tag::SEQUENCE) {
        accuracy = Some(parse_accuracy(&mut info)?);
    }

    let mut ordering = false;
    if info.peek_tag() == Some(tag::BOOLEAN) {
        ordering = info.read_boolean()?;
    }

    let mut nonce = None;
    if info.peek_tag() == Some(tag::INTEGER) {
        nonce = Some(crate::tsa::request::strip_leading_zeros(
            info.read_integer_bytes()?,
        ));
    }

    // tsa [0] and extensions [1] are retained by the document, not here
    info.read_optional_context(0)?;
    info.read_optional_context(1)?;

    Ok(TstInfo {
        version,
        policy,
        message_imprint: MessageImprint {
            hash_algorithm_oid,
            hashed_message,
        },
        serial,
        gen_time,
        accuracy,
        ordering,
        nonce,
    })
}

fn parse_accuracy(info: &mut DerReader<'_>) -> std::result::Result<Accuracy, Asn1Error> {
    let mut accuracy = Accuracy::default();
    let mut fields = info.read_sequence("Accuracy")?;
    if fields.peek_tag() == Some(tag::INTEGER) {
        accuracy.seconds = Some(fields.read_integer_i64()? as u32);
    }
    if let Some(millis) = fields.read_optional_context(0)? {
        accuracy.millis = Some(integer_content_u16(millis.content));
    }
    if let Some(micros) = fields.read_optional_context(1)? {
        accuracy.micros = Some(integer_content_u16(micros.content));
    }
    Ok(accuracy)
}

fn integer_content_u16(content: &[u8]) -> u16 {
    content
        .iter()
        .fold(0u16, |acc, byte| acc.wrapping_shl(8) | u16::from(*byte))
}

/// Decide the true DER length of a token pulled out of a `/Contents`
/// hex window, which is right-padded with zero bytes.
pub fn token_der_length(padded: &[u8]) -> Result<usize> {
    let mut reader = DerReader::new(padded);
    let tlv = reader
        .read_tlv()
        .map_err(|err| TimestampError::invalid_response(err.message, err.offset))?;
    Ok(tlv.raw.len())
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::asn1::DerWriter;
    use crate::crypto::HashAlgorithm;

    /// Everything needed to fabricate a syntactically complete token.
    pub(crate) struct TokenSpec {
        pub hash_algorithm: HashAlgorithm,
        pub hashed_message: Vec<u8>,
        pub policy: String,
        pub serial: Vec<u8>,
        pub gen_time: DateTime<Utc>,
        pub nonce: Option<Vec<u8>>,
        pub certificates: Vec<Vec<u8>>,
        pub crls: Vec<Vec<u8>>,
        pub ocsps: Vec<Vec<u8>>,
        /// Signature bytes to place in the SignerInfo (tests that skip
        /// cryptographic verification use garbage here)
        pub signature: Vec<u8>,
        pub signature_algorithm: String,
        pub issuer_der: Vec<u8>,
        pub issuer_serial: Vec<u8>,
    }

    impl TokenSpec {
        pub(crate) fn minimal(hashed_message: Vec<u8>) -> Self {
            use chrono::TimeZone;
            Self {
                hash_algorithm: HashAlgorithm::Sha256,
                hashed_message,
                policy: "1.2.3.4.1".to_string(),
                serial: vec![0x07, 0x5b],
                gen_time: Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap(),
                nonce: None,
                certificates: Vec::new(),
                crls: Vec::new(),
                ocsps: Vec::new(),
                signature: vec![0xde; 64],
                signature_algorithm: oid::SHA256_WITH_RSA.to_string(),
                issuer_der: encode_name("Fake TSA CA"),
                issuer_serial: vec![0x11],
            }
        }
    }

    pub(crate) fn encode_name(cn: &str) -> Vec<u8> {
        let mut writer = DerWriter::new();
        writer
            .write_sequence(|name| {
                name.write_set(|rdn| {
                    rdn.write_sequence(|attr| {
                        attr.write_oid("2.5.4.3")?;
                        attr.write_tlv(tag::UTF8_STRING, cn.as_bytes());
                        Ok(())
                    })
                })
            })
            .unwrap();
        writer.into_bytes()
    }

    pub(crate) fn encode_tst_info(spec: &TokenSpec) -> Vec<u8> {
        let mut writer = DerWriter::new();
        writer
            .write_sequence(|info| {
                info.write_integer_i64(1);
                info.write_oid(&spec.policy)?;
                info.write_sequence(|imprint| {
                    imprint.write_sequence(|alg| {
                        alg.write_oid(spec.hash_algorithm.oid())?;
                        alg.write_null();
                        Ok(())
                    })?;
                    imprint.write_octet_string(&spec.hashed_message);
                    Ok(())
                })?;
                info.write_integer_unsigned(&spec.serial);
                info.write_generalized_time(spec.gen_time);
                if let Some(nonce) = &spec.nonce {
                    info.write_integer_unsigned(nonce);
                }
                Ok(())
            })
            .unwrap();
        writer.into_bytes()
    }

    /// The `[0]`-tagged signed attributes for the spec, carrying a
    /// correct message-digest over the TSTInfo.
    pub(crate) fn encode_signed_attrs(spec: &TokenSpec) -> Vec<u8> {
        let tst_info = encode_tst_info(spec);
        let tst_digest = spec.hash_algorithm.digest(&tst_info);

        let mut attrs_writer = DerWriter::new();
        attrs_writer
            .write_context(0, |attrs| {
                attrs.write_sequence(|attr| {
                    attr.write_oid(oid::ATTR_CONTENT_TYPE)?;
                    attr.write_set(|set| {
                        set.write_oid(oid::TST_INFO)?;
                        Ok(())
                    })
                })?;
                attrs.write_sequence(|attr| {
                    attr.write_oid(oid::ATTR_MESSAGE_DIGEST)?;
                    attr.write_set(|set| {
                        set.write_octet_string(&tst_digest);
                        Ok(())
                    })
                })?;
                if !spec.crls.is_empty() || !spec.ocsps.is_empty() {
                    attrs.write_sequence(|attr| {
                        attr.write_oid(oid::REVOCATION_INFO_ARCHIVAL)?;
                        attr.write_set(|set| {
                            set.write_sequence(|archival| {
                                if !spec.crls.is_empty() {
                                    archival.write_context(0, |list| {
                                        list.write_sequence(|crls| {
                                            for crl in &spec.crls {
                                                crls.write_raw(crl);
                                            }
                                            Ok(())
                                        })
                                    })?;
                                }
                                if !spec.ocsps.is_empty() {
                                    archival.write_context(1, |list| {
                                        list.write_sequence(|ocsps| {
                                            for ocsp in &spec.ocsps {
                                                ocsps.write_raw(ocsp);
                                            }
                                            Ok(())
                                        })
                                    })?;
                                }
                                Ok(())
                            })
                        })
                    })?;
                }
                Ok(())
            })
            .unwrap();
        attrs_writer.into_bytes()
    }

    /// The exact bytes the token signature must cover: the signed
    /// attributes re-tagged as SET OF.
    pub(crate) fn signing_input(spec: &TokenSpec) -> Vec<u8> {
        let mut attrs = encode_signed_attrs(spec);
        attrs[0] = tag::SET;
        attrs
    }

    /// Build a complete ContentInfo token around the spec.
    pub(crate) fn build_token(spec: &TokenSpec) -> Vec<u8> {
        let tst_info = encode_tst_info(spec);
        let signed_attrs = encode_signed_attrs(spec);

        let mut writer = DerWriter::new();
        writer
            .write_sequence(|content_info| {
                content_info.write_oid(oid::SIGNED_DATA)?;
                content_info.write_context(0, |content| {
                    content.write_sequence(|signed_data| {
                        signed_data.write_integer_i64(3);
                        signed_data.write_set(|algs| {
                            algs.write_sequence(|alg| {
                                alg.write_oid(spec.hash_algorithm.oid())?;
                                alg.write_null();
                                Ok(())
                            })
                        })?;
                        signed_data.write_sequence(|encap| {
                            encap.write_oid(oid::TST_INFO)?;
                            encap.write_context(0, |econtent| {
                                econtent.write_octet_string(&tst_info);
                                Ok(())
                            })
                        })?;
                        if !spec.certificates.is_empty() {
                            signed_data.write_context(0, |certs| {
                                for cert in &spec.certificates {
                                    certs.write_raw(cert);
                                }
                                Ok(())
                            })?;
                        }
                        signed_data.write_set(|signer_infos| {
                            signer_infos.write_sequence(|signer| {
                                signer.write_integer_i64(1);
                                signer.write_sequence(|ias| {
                                    ias.write_raw(&spec.issuer_der);
                                    ias.write_integer_unsigned(&spec.issuer_serial);
                                    Ok(())
                                })?;
                                signer.write_sequence(|alg| {
                                    alg.write_oid(spec.hash_algorithm.oid())?;
                                    alg.write_null();
                                    Ok(())
                                })?;
                                signer.write_raw(&signed_attrs);
                                signer.write_sequence(|alg| {
                                    alg.write_oid(&spec.signature_algorithm)?;
                                    Ok(())
                                })?;
                                signer.write_octet_string(&spec.signature);
                                Ok(())
                            })
                        })?;
                        Ok(())
                    })
                })
            })
            .unwrap();
        writer.into_bytes()
    }
}

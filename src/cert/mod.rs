//! Minimal X.509 certificate reader.
//!
//! Only the fields the pipeline needs are pulled out: identity material
//! for locating the token signer, the public key for verification, and
//! the AIA / CRL distribution point URLs for LTV completion. Trust-anchor
//! policy is deliberately left to the consumer.

use chrono::{DateTime, Utc};
use log::debug;

use crate::asn1::{oid, tag, Asn1Error, DerReader};
use crate::error::Result;

/// Parsed view over a DER certificate
#[derive(Debug, Clone)]
pub struct ParsedCert {
    /// The certificate exactly as given
    pub der: Vec<u8>,
    /// Raw INTEGER content of the serial number
    pub serial: Vec<u8>,
    /// Complete DER of the issuer Name
    pub issuer_der: Vec<u8>,
    /// Complete DER of the subject Name
    pub subject_der: Vec<u8>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// Algorithm OID from the SubjectPublicKeyInfo
    pub spki_algorithm: String,
    /// Content of the SubjectPublicKeyInfo BIT STRING
    pub key_bytes: Vec<u8>,
    /// SubjectKeyIdentifier extension value, when present
    pub ski: Option<Vec<u8>>,
    /// AuthorityKeyIdentifier keyIdentifier, when present
    pub aki: Option<Vec<u8>>,
    pub ocsp_urls: Vec<String>,
    pub ca_issuer_urls: Vec<String>,
    pub crl_urls: Vec<String>,
}

impl ParsedCert {
    /// Whether `issuer` plausibly issued this certificate, judged by key
    /// identifiers first and name chaining otherwise
    pub fn is_issued_by(&self, issuer: &ParsedCert) -> bool {
        if let (Some(aki), Some(ski)) = (&self.aki, &issuer.ski) {
            return aki == ski;
        }
        self.issuer_der == issuer.subject_der
    }

    /// Whether this certificate is self-issued
    pub fn is_self_issued(&self) -> bool {
        self.issuer_der == self.subject_der
    }
}

/// Parse a DER certificate into the fields the pipeline uses.
pub fn parse_certificate(der: &[u8]) -> Result<ParsedCert> {
    Ok(parse_inner(der)?)
}

fn parse_inner(der: &[u8]) -> std::result::Result<ParsedCert, Asn1Error> {
    let mut top = DerReader::new(der);
    let mut cert = top.read_sequence("Certificate")?;
    let tbs = cert.read_expected(tag::SEQUENCE, "TBSCertificate")?;
    let mut fields = tbs.reader();

    // [0] EXPLICIT version, defaulted to v1 when absent
    fields.read_optional_context(0)?;

    let serial = fields.read_integer_bytes()?.to_vec();
    // signature AlgorithmIdentifier, unused here
    fields.read_expected(tag::SEQUENCE, "signature algorithm")?;

    let issuer = fields.read_expected(tag::SEQUENCE, "issuer Name")?;
    let mut validity = fields.read_sequence("Validity")?;
    let not_before = validity.read_time()?;
    let not_after = validity.read_time()?;
    let subject = fields.read_expected(tag::SEQUENCE, "subject Name")?;

    let spki = fields.read_expected(tag::SEQUENCE, "SubjectPublicKeyInfo")?;
    let mut spki_fields = spki.reader();
    let mut spki_alg = spki_fields.read_sequence("SPKI algorithm")?;
    let spki_algorithm = spki_alg.read_oid()?;
    let key_bytes = spki_fields.read_bit_string()?.to_vec();

    // issuerUniqueID / subjectUniqueID, rarely present
    fields.read_optional_context(1)?;
    fields.read_optional_context(2)?;

    let mut parsed = ParsedCert {
        der: der.to_vec(),
        serial,
        issuer_der: issuer.raw.to_vec(),
        subject_der: subject.raw.to_vec(),
        not_before,
        not_after,
        spki_algorithm,
        key_bytes,
        ski: None,
        aki: None,
        ocsp_urls: Vec::new(),
        ca_issuer_urls: Vec::new(),
        crl_urls: Vec::new(),
    };

    if let Some(wrapper) = fields.read_optional_context(3)? {
        let mut extensions = wrapper.reader().read_sequence("Extensions")?;
        while !extensions.is_empty() {
            let mut extension = extensions.read_sequence("Extension")?;
            let extn_id = extension.read_oid()?;
            if extension.peek_tag() == Some(tag::BOOLEAN) {
                extension.read_boolean()?;
            }
            let value = extension.read_octet_string()?;
            // A single undecodable extension should not reject the
            // certificate; LTV completion just works with less.
            if let Err(err) = apply_extension(&mut parsed, &extn_id, value) {
                debug!("skipping extension {extn_id}: {err}");
            }
        }
    }

    Ok(parsed)
}

fn apply_extension(
    parsed: &mut ParsedCert,
    extn_id: &str,
    value: &[u8],
) -> std::result::Result<(), Asn1Error> {
    match extn_id {
        oid::SUBJECT_KEY_IDENTIFIER => {
            parsed.ski = Some(DerReader::new(value).read_octet_string()?.to_vec());
        }
        oid::AUTHORITY_KEY_IDENTIFIER => {
            let mut aki = DerReader::new(value).read_sequence("AuthorityKeyIdentifier")?;
            if let Some(key_id) = aki.read_optional_context(0)? {
                parsed.aki = Some(key_id.content.to_vec());
            }
        }
        oid::AUTHORITY_INFO_ACCESS => {
            let mut access = DerReader::new(value).read_sequence("AuthorityInfoAccess")?;
            while !access.is_empty() {
                let mut description = access.read_sequence("AccessDescription")?;
                let method = description.read_oid()?;
                let location = description.read_tlv()?;
                if let Some(url) = general_name_url(&location) {
                    match method.as_str() {
                        oid::ACCESS_OCSP => parsed.ocsp_urls.push(url),
                        oid::ACCESS_CA_ISSUERS => parsed.ca_issuer_urls.push(url),
                        _ => {}
                    }
                }
            }
        }
        oid::CRL_DISTRIBUTION_POINTS => {
            let mut points = DerReader::new(value).read_sequence("CRLDistributionPoints")?;
            while !points.is_empty() {
                let mut point = points.read_sequence("DistributionPoint")?;
                if let Some(name) = point.read_optional_context(0)? {
                    let mut name_fields = name.reader();
                    if let Some(full_name) = name_fields.read_optional_context(0)? {
                        let mut names = full_name.reader();
                        while !names.is_empty() {
                            let general_name = names.read_tlv()?;
                            if let Some(url) = general_name_url(&general_name) {
                                parsed.crl_urls.push(url);
                            }
                        }
                    }
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// GeneralName `[6] uniformResourceIdentifier`, when that is what it is
fn general_name_url(tlv: &crate::asn1::Tlv<'_>) -> Option<String> {
    if tlv.is_context(6) && !tlv.is_constructed() {
        std::str::from_utf8(tlv.content).ok().map(str::to_string)
    } else {
        None
    }
}

/// Certificate construction helpers shared by tests across the crate.
#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::asn1::DerWriter;
    use chrono::TimeZone;

    /// Inputs for a fabricated certificate
    pub(crate) struct CertSpec<'a> {
        pub serial: &'a [u8],
        pub issuer_cn: &'a str,
        pub subject_cn: &'a str,
        pub ski: Option<&'a [u8]>,
        pub aki: Option<&'a [u8]>,
        pub ocsp_url: Option<&'a str>,
        pub ca_issuer_url: Option<&'a str>,
        pub crl_url: Option<&'a str>,
        pub spki_algorithm: &'a str,
        pub key_bytes: &'a [u8],
    }

    impl<'a> CertSpec<'a> {
        pub(crate) fn new(serial: &'a [u8], issuer_cn: &'a str, subject_cn: &'a str) -> Self {
            Self {
                serial,
                issuer_cn,
                subject_cn,
                ski: None,
                aki: None,
                ocsp_url: None,
                ca_issuer_url: None,
                crl_url: None,
                spki_algorithm: oid::RSA_ENCRYPTION,
                key_bytes: &[0x30, 0x03, 0x02, 0x01, 0x03],
            }
        }
    }

    /// The issuer/subject Name encoding the builder uses, exposed so
    /// other tests can match SignerInfo identifiers against it.
    pub(crate) fn encode_name(cn: &str) -> Vec<u8> {
        let mut writer = DerWriter::new();
        write_name(&mut writer, cn).unwrap();
        writer.into_bytes()
    }

    /// Build a syntactically valid certificate with the extensions under
    /// test; signature bytes are garbage since parsing ignores them.
    pub(crate) fn build_test_certificate(spec: &CertSpec<'_>) -> Vec<u8> {
        let mut writer = DerWriter::new();
        writer
            .write_sequence(|cert| {
                cert.write_sequence(|tbs| {
                    tbs.write_integer_unsigned(spec.serial);
                    tbs.write_sequence(|alg| {
                        alg.write_oid(oid::SHA256_WITH_RSA)?;
                        alg.write_null();
                        Ok(())
                    })?;
                    write_name(tbs, spec.issuer_cn)?;
                    tbs.write_sequence(|validity| {
                        validity.write_generalized_time(
                            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
                        );
                        validity.write_generalized_time(
                            Utc.with_ymd_and_hms(2040, 1, 1, 0, 0, 0).unwrap(),
                        );
                        Ok(())
                    })?;
                    write_name(tbs, spec.subject_cn)?;
                    tbs.write_sequence(|spki| {
                        spki.write_sequence(|alg| {
                            alg.write_oid(spec.spki_algorithm)?;
                            if spec.spki_algorithm == oid::RSA_ENCRYPTION {
                                alg.write_null();
                            } else if spec.spki_algorithm == oid::EC_PUBLIC_KEY {
                                // P-256 named curve parameter
                                alg.write_oid("1.2.840.10045.3.1.7")?;
                            }
                            Ok(())
                        })?;
                        spki.write_bit_string(spec.key_bytes);
                        Ok(())
                    })?;
                    tbs.write_context(3, |wrapper| {
                        wrapper.write_sequence(|extensions| {
                            if let Some(ski) = spec.ski {
                                write_extension(extensions, oid::SUBJECT_KEY_IDENTIFIER, |v| {
                                    v.write_octet_string(ski);
                                    Ok(())
                                })?;
                            }
                            if let Some(aki) = spec.aki {
                                write_extension(extensions, oid::AUTHORITY_KEY_IDENTIFIER, |v| {
                                    v.write_sequence(|inner| {
                                        inner.write_tlv(tag::context(0), aki);
                                        Ok(())
                                    })
                                })?;
                            }
                            if spec.ocsp_url.is_some() || spec.ca_issuer_url.is_some() {
                                write_extension(extensions, oid::AUTHORITY_INFO_ACCESS, |v| {
                                    v.write_sequence(|aia| {
                                        if let Some(url) = spec.ocsp_url {
                                            aia.write_sequence(|access| {
                                                access.write_oid(oid::ACCESS_OCSP)?;
                                                access.write_tlv(
                                                    tag::context(6),
                                                    url.as_bytes(),
                                                );
                                                Ok(())
                                            })?;
                                        }
                                        if let Some(url) = spec.ca_issuer_url {
                                            aia.write_sequence(|access| {
                                                access.write_oid(oid::ACCESS_CA_ISSUERS)?;
                                                access.write_tlv(
                                                    tag::context(6),
                                                    url.as_bytes(),
                                                );
                                                Ok(())
                                            })?;
                                        }
                                        Ok(())
                                    })
                                })?;
                            }
                            if let Some(url) = spec.crl_url {
                                write_extension(extensions, oid::CRL_DISTRIBUTION_POINTS, |v| {
                                    v.write_sequence(|points| {
                                        points.write_sequence(|point| {
                                            point.write_context(0, |name| {
                                                name.write_context(0, |full| {
                                                    full.write_tlv(
                                                        tag::context(6),
                                                        url.as_bytes(),
                                                    );
                                                    Ok(())
                                                })
                                            })
                                        })
                                    })
                                })?;
                            }
                            Ok(())
                        })
                    })?;
                    Ok(())
                })?;
                cert.write_sequence(|alg| {
                    alg.write_oid(oid::SHA256_WITH_RSA)?;
                    alg.write_null();
                    Ok(())
                })?;
                cert.write_bit_string(&[0xab; 16]);
                Ok(())
            })
            .unwrap();
        writer.into_bytes()
    }

    fn write_name(writer: &mut DerWriter, cn: &str) -> std::result::Result<(), Asn1Error> {
        writer.write_sequence(|name| {
            name.write_set(|rdn| {
                rdn.write_sequence(|attr| {
                    attr.write_oid("2.5.4.3")?;
                    attr.write_tlv(tag::UTF8_STRING, cn.as_bytes());
                    Ok(())
                })
            })
        })
    }

    fn write_extension(
        writer: &mut DerWriter,
        extn_id: &str,
        build_value: impl FnOnce(&mut DerWriter) -> std::result::Result<(), Asn1Error>,
    ) -> std::result::Result<(), Asn1Error> {
        writer.write_sequence(|extension| {
            extension.write_oid(extn_id)?;
            let mut value = DerWriter::new();
            build_value(&mut value)?;
            extension.write_octet_string(&value.into_bytes());
            Ok(())
        })
    }
}

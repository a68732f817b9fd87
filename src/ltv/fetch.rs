//! Best-effort completion of validation material over the network.
//!
//! Every failure is demoted to a warning; the caller proceeds with
//! whatever material was obtained. All activity shares one wall-clock
//! budget so a slow responder cannot stall the pipeline.

use std::time::{Duration, Instant};

use log::{debug, warn};
use sha1::{Digest, Sha1};

use crate::asn1::{oid, tag, Asn1Error, DerReader, DerWriter};
use crate::cert::{parse_certificate, ParsedCert};
use crate::traits::HttpTransport;
use crate::types::{LtvData, Warning};

const OCSP_REQUEST_CONTENT_TYPE: &str = "application/ocsp-request";

/// How many issuer-fetch passes may extend the chain before giving up
const MAX_CHAIN_PASSES: usize = 4;

/// Fetches missing OCSP responses, CRLs and issuer certificates.
pub struct LtvFetcher<'a> {
    transport: &'a dyn HttpTransport,
    timeout: Duration,
    budget: Duration,
}

impl<'a> LtvFetcher<'a> {
    pub fn new(transport: &'a dyn HttpTransport, timeout: Duration, budget: Duration) -> Self {
        Self {
            transport,
            timeout,
            budget,
        }
    }

    /// Complete `data` in place and return the collected warnings.
    pub async fn complete(&self, data: &mut LtvData) -> Vec<Warning> {
        let started = Instant::now();
        let mut warnings = Vec::new();

        self.extend_chain(data, started, &mut warnings).await;

        let certs = parse_all(&data.certificates, &mut warnings);
        for cert in &certs {
            if cert.is_self_issued() {
                continue;
            }
            if started.elapsed() >= self.budget {
                warnings.push(Warning::new("LTV time budget exhausted"));
                break;
            }
            let issuer = certs.iter().find(|candidate| cert.is_issued_by(candidate));
            self.fetch_revocation(cert, issuer, data, &mut warnings)
                .await;
        }

        warnings
    }

    /// Follow caIssuers pointers until every certificate has its issuer
    /// in the pool or nothing new can be fetched.
    async fn extend_chain(
        &self,
        data: &mut LtvData,
        started: Instant,
        warnings: &mut Vec<Warning>,
    ) {
        for _ in 0..MAX_CHAIN_PASSES {
            let certs = parse_all(&data.certificates, &mut Vec::new());
            let missing: Vec<String> = certs
                .iter()
                .filter(|cert| {
                    !cert.is_self_issued()
                        && !certs.iter().any(|candidate| cert.is_issued_by(candidate))
                })
                .flat_map(|cert| cert.ca_issuer_urls.iter().cloned())
                .collect();
            if missing.is_empty() {
                return;
            }

            let mut grew = false;
            for url in missing {
                if started.elapsed() >= self.budget {
                    warnings.push(Warning::new("LTV time budget exhausted"));
                    return;
                }
                match self.transport.get(&url, self.timeout).await {
                    Ok(response) if response.is_success() => {
                        if parse_certificate(&response.body).is_ok() {
                            grew |= data.add_certificate(response.body);
                        } else {
                            warnings.push(Warning::for_url(
                                "issuer fetch returned undecodable data",
                                url,
                            ));
                        }
                    }
                    Ok(response) => {
                        warnings.push(Warning::for_url(
                            format!("issuer fetch answered HTTP {}", response.status),
                            url,
                        ));
                    }
                    Err(err) => {
                        warnings.push(Warning::for_url(err.to_string(), url));
                    }
                }
            }
            if !grew {
                return;
            }
        }
    }

    /// OCSP when an AIA responder and the issuer are at hand, CRL
    /// distribution points otherwise.
    async fn fetch_revocation(
        &self,
        cert: &ParsedCert,
        issuer: Option<&ParsedCert>,
        data: &mut LtvData,
        warnings: &mut Vec<Warning>,
    ) {
        if let (Some(issuer), Some(url)) = (issuer, cert.ocsp_urls.first()) {
            match self.fetch_ocsp(cert, issuer, url).await {
                Ok(response) => {
                    data.add_ocsp(response);
                    return;
                }
                Err(warning) => warnings.push(warning),
            }
        }

        for url in &cert.crl_urls {
            match self.transport.get(url, self.timeout).await {
                Ok(response) if response.is_success() => {
                    if response.body.first() == Some(&0x30) {
                        data.add_crl(response.body);
                        return;
                    }
                    warnings.push(Warning::for_url(
                        "CRL fetch returned non-DER data",
                        url.as_str(),
                    ));
                }
                Ok(response) => {
                    warnings.push(Warning::for_url(
                        format!("CRL fetch answered HTTP {}", response.status),
                        url.as_str(),
                    ));
                }
                Err(err) => {
                    warnings.push(Warning::for_url(err.to_string(), url.as_str()))
                }
            }
        }

        if !cert.ocsp_urls.is_empty() || !cert.crl_urls.is_empty() {
            debug!("no revocation material obtained for one certificate");
        }
    }

    async fn fetch_ocsp(
        &self,
        cert: &ParsedCert,
        issuer: &ParsedCert,
        url: &str,
    ) -> Result<Vec<u8>, Warning> {
        let request = build_ocsp_request(cert, issuer)
            .map_err(|err| Warning::for_url(format!("OCSP request build failed: {err}"), url))?;
        let response = self
            .transport
            .post(url, OCSP_REQUEST_CONTENT_TYPE, &request, self.timeout)
            .await
            .map_err(|err| Warning::for_url(err.to_string(), url))?;
        if !response.is_success() {
            return Err(Warning::for_url(
                format!("OCSP responder answered HTTP {}", response.status),
                url,
            ));
        }
        if !ocsp_response_is_successful(&response.body) {
            return Err(Warning::for_url(
                "OCSP responder refused the request",
                url,
            ));
        }
        Ok(response.body)
    }
}

/// Build an unsigned OCSPRequest for one certificate, hashed with SHA-1
/// as the baseline every responder accepts.
fn build_ocsp_request(cert: &ParsedCert, issuer: &ParsedCert) -> Result<Vec<u8>, Asn1Error> {
    let issuer_name_hash = Sha1::digest(&issuer.subject_der);
    let issuer_key_hash = Sha1::digest(&issuer.key_bytes);

    let mut writer = DerWriter::new();
    writer.write_sequence(|request| {
        request.write_sequence(|tbs| {
            tbs.write_sequence(|request_list| {
                request_list.write_sequence(|single| {
                    single.write_sequence(|cert_id| {
                        cert_id.write_sequence(|alg| {
                            alg.write_oid(oid::SHA1)?;
                            alg.write_null();
                            Ok(())
                        })?;
                        cert_id.write_octet_string(&issuer_name_hash);
                        cert_id.write_octet_string(&issuer_key_hash);
                        cert_id.write_integer_unsigned(&cert.serial);
                        Ok(())
                    })
                })
            })
        })
    })?;
    Ok(writer.into_bytes())
}

/// `OCSPResponse.responseStatus == successful`
fn ocsp_response_is_successful(der: &[u8]) -> bool {
    let mut reader = DerReader::new(der);
    let Ok(mut response) = reader.read_sequence("OCSPResponse") else {
        return false;
    };
    let Ok(status) = response.read_expected(tag::ENUMERATED, "responseStatus") else {
        return false;
    };
    status.content == [0]
}

fn parse_all(ders: &[Vec<u8>], warnings: &mut Vec<Warning>) -> Vec<ParsedCert> {
    let mut certs = Vec::new();
    for der in ders {
        match parse_certificate(der) {
            Ok(cert) => certs.push(cert),
            Err(err) => {
                warn!("skipping undecodable certificate: {err}");
                warnings.push(Warning::new(format!("undecodable certificate: {err}")));
            }
        }
    }
    certs
}

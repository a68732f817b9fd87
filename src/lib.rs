//! RFC 3161 document timestamps and PAdES long-term validation for PDF
//! files.
//!
//! The crate appends a document timestamp (`/SubFilter /ETSI.RFC3161`)
//! to a classic cross-reference PDF through an incremental update,
//! validates the returned token against the hashed `/ByteRange`, and can
//! enrich the result with a document security store (PAdES B-LT) and an
//! archive timestamp (B-LTA). Private-key signing is out of scope; only
//! TSA-issued tokens are embedded.
//!
//! ```no_run
//! # async fn demo() -> pdf_timestamp::Result<()> {
//! use pdf_timestamp::{timestamp_pdf, TimestampOptions, TsaConfig};
//!
//! let pdf = std::fs::read("contract.pdf").expect("read input");
//! let tsa = TsaConfig::new("http://timestamp.digicert.com");
//! let result = timestamp_pdf(&pdf, &tsa, &TimestampOptions::default()).await?;
//! std::fs::write("contract-timestamped.pdf", &result.pdf).expect("write output");
//! # Ok(())
//! # }
//! ```

pub mod asn1;
pub mod cert;
pub mod crypto;
pub mod error;
pub mod ltv;
pub mod pdf;
pub mod session;
pub mod token;
pub mod traits;
pub mod tsa;
pub mod types;
pub mod util;

mod lta;

use std::sync::Arc;

use log::info;

pub use crate::crypto::HashAlgorithm;
pub use crate::error::{ErrorCode, Result, TimestampError};
pub use crate::lta::verify_timestamps;
pub use crate::pdf::prepare::PreparedPdf;
pub use crate::session::TimestampSession;
pub use crate::traits::{Clock, HttpTransport, NonceSource};
pub use crate::tsa::{FailInfo, TsaEndpoint};
pub use crate::types::{
    Accuracy, LtvData, MultiTimestampResult, TimestampInfo, TimestampOptions, TimestampResult,
    TsaConfig, VerifiedTimestamp, Warning,
};
pub use crate::util::generate_output_filename;

use crate::ltv::{extract_ltv, write_dss, LtvFetcher, VriEntry};
use crate::pdf::embed_token;
use crate::pdf::prepare::{prepare, PrepareOptions};
use crate::token::{parse_token, validate_token};
use crate::traits::{RandomNonce, ReqwestTransport, SystemClock};
use crate::tsa::request::TimestampRequest;
use crate::tsa::response::TimestampResponse;
use crate::tsa::TsaClient;

/// The timestamping pipeline with its injectable capabilities.
///
/// Construction is cheap; one instance may serve any number of
/// concurrent operations since every operation owns its own state.
pub struct Timestamper {
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
    nonces: Arc<dyn NonceSource>,
}

impl Timestamper {
    pub fn new() -> Self {
        Self {
            transport: Arc::new(ReqwestTransport::new()),
            clock: Arc::new(SystemClock),
            nonces: Arc::new(RandomNonce),
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_nonce_source(mut self, nonces: Arc<dyn NonceSource>) -> Self {
        self.nonces = nonces;
        self
    }

    /// One-shot: prepare, request, validate, embed, optionally enrich
    /// with LTV material.
    pub async fn timestamp(
        &self,
        pdf: &[u8],
        tsa: &TsaConfig,
        options: &TimestampOptions,
    ) -> Result<TimestampResult> {
        let prepared = prepare(
            pdf,
            &PrepareOptions {
                signature_size: options.effective_signature_size(),
                field_name: options.field_name.clone(),
                signing_time: self.clock.now(),
            },
        )?;
        let digest = prepared.digest(options.hash_algorithm);
        let nonce = options.use_nonce.then(|| self.nonces.nonce());
        let request = TimestampRequest::build(
            options.hash_algorithm,
            &digest,
            tsa.policy.as_deref(),
            nonce,
        )?;

        let client = TsaClient::with_transport(self.transport.clone());
        let response_der = client.send_request(tsa, &request.der).await?;
        let token_der = TimestampResponse::parse(&response_der)?.into_token()?;

        let token = parse_token(&token_der)?;
        let validated = validate_token(
            &token,
            &digest,
            options.hash_algorithm,
            request.nonce.as_deref(),
        )?;
        let embedded = embed_token(&prepared, &token_der)?;
        info!(
            "timestamped '{}' at {} under policy {}",
            prepared.field_name(),
            validated.info.gen_time,
            validated.info.policy
        );

        let (final_pdf, ltv, warnings) = if options.enable_ltv {
            let mut data = extract_ltv(&token);
            let fetcher = LtvFetcher::new(
                self.transport.as_ref(),
                options.ltv_budget,
                options.ltv_budget,
            );
            let warnings = fetcher.complete(&mut data).await;
            let vri: Vec<VriEntry> = validated
                .signing_cert
                .as_ref()
                .map(|cert| {
                    vec![VriEntry {
                        signing_cert: cert.clone(),
                        data: data.clone(),
                    }]
                })
                .unwrap_or_default();
            let with_dss = write_dss(&embedded, &data, &vri)?;
            (with_dss, Some(data), warnings)
        } else {
            (embedded, None, Vec::new())
        };

        Ok(TimestampResult {
            pdf: final_pdf,
            token: token_der,
            info: validated.info,
            ltv,
            warnings,
        })
    }

    /// Apply one timestamp per TSA in sequence. Each round reloads the
    /// previous round's output, so every signature gets its own
    /// auto-numbered field and incremental update.
    pub async fn timestamp_multiple(
        &self,
        pdf: &[u8],
        tsas: &[TsaConfig],
        options: &TimestampOptions,
    ) -> Result<MultiTimestampResult> {
        let mut current = pdf.to_vec();
        let mut timestamps = Vec::with_capacity(tsas.len());
        let mut warnings = Vec::new();

        let round_options = TimestampOptions {
            field_name: None,
            ..options.clone()
        };
        for tsa in tsas {
            let result = self.timestamp(&current, tsa, &round_options).await?;
            current = result.pdf;
            timestamps.push(result.info);
            warnings.extend(result.warnings);
        }

        Ok(MultiTimestampResult {
            pdf: current,
            timestamps,
            warnings,
        })
    }

    /// PAdES-LTA: verify what is already there, append one DSS covering
    /// all of it, then add a final archive timestamp over document and
    /// store together.
    pub async fn timestamp_lta(
        &self,
        pdf: &[u8],
        tsa: &TsaConfig,
        options: &TimestampOptions,
    ) -> Result<TimestampResult> {
        let preparation =
            lta::collect_archive_material(pdf, self.transport.as_ref(), options).await?;
        let with_dss = lta::write_archive_dss(pdf, &preparation)?;

        let mut result = self
            .timestamp(&with_dss, tsa, &lta::archive_round_options(options))
            .await?;
        result.ltv = Some(preparation.pooled);
        result.warnings.extend(preparation.warnings);
        Ok(result)
    }

    /// A stateful session sharing this pipeline's capabilities.
    pub fn session(&self, pdf: Vec<u8>, options: TimestampOptions) -> TimestampSession {
        TimestampSession::new(pdf, options)
            .with_transport(self.transport.clone())
            .with_clock(self.clock.clone())
            .with_nonce_source(self.nonces.clone())
    }
}

impl Default for Timestamper {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot timestamp with the default transport, clock and RNG.
pub async fn timestamp_pdf(
    pdf: &[u8],
    tsa: &TsaConfig,
    options: &TimestampOptions,
) -> Result<TimestampResult> {
    Timestamper::new().timestamp(pdf, tsa, options).await
}

/// Sequential timestamps from several TSAs.
pub async fn timestamp_pdf_multiple(
    pdf: &[u8],
    tsas: &[TsaConfig],
    options: &TimestampOptions,
) -> Result<MultiTimestampResult> {
    Timestamper::new().timestamp_multiple(pdf, tsas, options).await
}

/// Archive timestamp (PAdES-LTA) with the default capabilities.
pub async fn timestamp_pdf_lta(
    pdf: &[u8],
    tsa: &TsaConfig,
    options: &TimestampOptions,
) -> Result<TimestampResult> {
    Timestamper::new().timestamp_lta(pdf, tsa, options).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::testutil::minimal_pdf;
    use crate::token::parser::testutil::{build_token, TokenSpec};
    use crate::traits::HttpResponse;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    struct FixedNonce([u8; 8]);

    impl NonceSource for FixedNonce {
        fn nonce(&self) -> [u8; 8] {
            self.0
        }
    }

    /// A TSA that digs the imprint and nonce out of the request and
    /// answers with a freshly built granted response.
    struct MockTsa {
        gen_time: DateTime<Utc>,
        status: i64,
        posts: AtomicUsize,
        gets: AtomicUsize,
    }

    impl MockTsa {
        fn granted(gen_time: DateTime<Utc>) -> Self {
            Self {
                gen_time,
                status: 0,
                posts: AtomicUsize::new(0),
                gets: AtomicUsize::new(0),
            }
        }

        fn rejecting() -> Self {
            Self {
                gen_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                status: 2,
                posts: AtomicUsize::new(0),
                gets: AtomicUsize::new(0),
            }
        }

        fn network_calls(&self) -> usize {
            self.posts.load(Ordering::SeqCst) + self.gets.load(Ordering::SeqCst)
        }

        fn respond(&self, request: &[u8]) -> Vec<u8> {
            use crate::asn1::DerReader;
            let mut reader = DerReader::new(request);
            let mut req = reader.read_sequence("TimeStampReq").unwrap();
            req.read_integer_i64().unwrap();
            let mut imprint = req.read_sequence("MessageImprint").unwrap();
            imprint.read_sequence("alg").unwrap();
            let digest = imprint.read_octet_string().unwrap().to_vec();
            let nonce = if req.peek_tag() == Some(crate::asn1::tag::INTEGER) {
                Some(req.read_integer_bytes().unwrap().to_vec())
            } else {
                None
            };

            let mut writer = crate::asn1::DerWriter::new();
            writer
                .write_sequence(|resp| {
                    resp.write_sequence(|status| {
                        status.write_integer_i64(self.status);
                        Ok(())
                    })?;
                    if self.status == 0 {
                        let mut spec = TokenSpec::minimal(digest.clone());
                        spec.gen_time = self.gen_time;
                        spec.nonce = nonce
                            .map(|bytes| crate::tsa::request::strip_leading_zeros(&bytes));
                        resp.write_raw(&build_token(&spec));
                    }
                    Ok(())
                })
                .unwrap();
            writer.into_bytes()
        }
    }

    #[async_trait]
    impl HttpTransport for MockTsa {
        async fn post(
            &self,
            _url: &str,
            content_type: &str,
            body: &[u8],
            _timeout: Duration,
        ) -> Result<HttpResponse> {
            assert_eq!(content_type, "application/timestamp-query");
            self.posts.fetch_add(1, Ordering::SeqCst);
            Ok(HttpResponse {
                status: 200,
                content_type: Some("application/timestamp-reply".to_string()),
                body: self.respond(body),
            })
        }

        async fn get(&self, _url: &str, _timeout: Duration) -> Result<HttpResponse> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            Err(TimestampError::tsa_network("unrouted GET in test"))
        }
    }

    fn pipeline(transport: Arc<dyn HttpTransport>) -> Timestamper {
        Timestamper::new()
            .with_transport(transport)
            .with_clock(Arc::new(FixedClock(
                Utc.with_ymd_and_hms(2024, 7, 1, 9, 0, 0).unwrap(),
            )))
            .with_nonce_source(Arc::new(FixedNonce([9, 8, 7, 6, 5, 4, 3, 2])))
    }

    fn config() -> TsaConfig {
        TsaConfig::new("http://tsa.example/rfc3161")
    }

    #[tokio::test]
    async fn one_shot_produces_a_verifiable_document() {
        let pdf = minimal_pdf();
        let gen_time = Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap();
        let tsa = Arc::new(MockTsa::granted(gen_time));
        let pipeline = pipeline(tsa.clone());

        let result = pipeline
            .timestamp(&pdf, &config(), &TimestampOptions::default())
            .await
            .unwrap();

        // The input prefix is preserved bit for bit.
        assert_eq!(&result.pdf[..pdf.len()], &pdf[..]);
        assert_eq!(result.info.gen_time, gen_time);
        assert!(result.ltv.is_none());

        let verified = verify_timestamps(&result.pdf).unwrap();
        assert_eq!(verified.len(), 1);
        assert_eq!(verified[0].info.gen_time, gen_time);
        assert_eq!(tsa.network_calls(), 1);
    }

    #[tokio::test]
    async fn rejection_yields_no_pdf_bytes() {
        let pdf = minimal_pdf();
        let tsa = Arc::new(MockTsa::rejecting());
        let pipeline = pipeline(tsa.clone());

        let err = pipeline
            .timestamp(&pdf, &config(), &TimestampOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TimestampError::TsaRejected { .. }));
    }

    #[tokio::test]
    async fn ltv_disabled_means_zero_extra_network_traffic() {
        let pdf = minimal_pdf();
        let tsa = Arc::new(MockTsa::granted(
            Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap(),
        ));
        let pipeline = pipeline(tsa.clone());

        pipeline
            .timestamp(&pdf, &config(), &TimestampOptions::default())
            .await
            .unwrap();
        // Exactly the TSA POST, nothing for CRL or OCSP.
        assert_eq!(tsa.network_calls(), 1);
        assert_eq!(tsa.gets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn two_tsas_give_two_distinct_fields() {
        let pdf = minimal_pdf();
        let tsa = Arc::new(MockTsa::granted(
            Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap(),
        ));
        let pipeline = pipeline(tsa.clone());

        let result = pipeline
            .timestamp_multiple(
                &pdf,
                &[config(), config()],
                &TimestampOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(result.timestamps.len(), 2);
        let verified = verify_timestamps(&result.pdf).unwrap();
        let mut names: Vec<String> =
            verified.into_iter().map(|v| v.field_name).collect();
        names.sort();
        assert_eq!(names, ["Timestamp1", "Timestamp2"]);

        // Dropping the newest update must leave the first timestamp valid:
        // truncate to the first round's length by replaying round one.
        let round_one = pipeline
            .timestamp(&pdf, &config(), &TimestampOptions::default())
            .await
            .unwrap();
        assert_eq!(&result.pdf[..round_one.pdf.len()], &round_one.pdf[..]);
        assert_eq!(verify_timestamps(&round_one.pdf).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn lta_adds_dss_and_final_covering_timestamp() {
        let pdf = minimal_pdf();
        let gen_time = Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap();
        let tsa = Arc::new(MockTsa::granted(gen_time));
        let pipeline = pipeline(tsa.clone());

        // First a plain timestamp, then the archive pass over it.
        let first = pipeline
            .timestamp(&pdf, &config(), &TimestampOptions::default())
            .await
            .unwrap();
        let archived = pipeline
            .timestamp_lta(&first.pdf, &config(), &TimestampOptions::default())
            .await
            .unwrap();

        assert_eq!(&archived.pdf[..first.pdf.len()], &first.pdf[..]);
        assert!(archived.ltv.is_some());

        // Both the original and the archive timestamp verify.
        let verified = verify_timestamps(&archived.pdf).unwrap();
        assert_eq!(verified.len(), 2);
    }

    /// Exercises a real endpoint; enabled only by LIVE_TSA_TESTS=1.
    #[tokio::test]
    async fn live_tsa_round_trip() {
        if std::env::var("LIVE_TSA_TESTS").ok().as_deref() != Some("1") {
            return;
        }
        let pdf = minimal_pdf();
        let result = timestamp_pdf(
            &pdf,
            &TsaEndpoint::DigiCert.config(),
            &TimestampOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(verify_timestamps(&result.pdf).unwrap().len(), 1);
        assert!(result.info.has_certificate);
    }

    #[tokio::test]
    async fn session_uses_the_shared_capabilities() {
        let pdf = minimal_pdf();
        let tsa = Arc::new(MockTsa::granted(
            Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap(),
        ));
        let pipeline = pipeline(tsa.clone());

        let mut session = pipeline.session(pdf, TimestampOptions::default());
        let request = session.create_timestamp_request().unwrap();
        let response = tsa.respond(&request);
        let result = session.embed_timestamp_token(&response).await.unwrap();
        assert_eq!(verify_timestamps(&result.pdf).unwrap().len(), 1);
        // The manual exchange itself went through no transport call.
        assert_eq!(tsa.network_calls(), 0);
    }
}

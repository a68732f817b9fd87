//! Stateful timestamping session for the offline TSA workflow: the
//! caller takes the request bytes away, obtains the response through
//! whatever channel, and feeds it back in.

use std::sync::Arc;

use log::debug;

use crate::asn1::{tag, DerReader};
use crate::error::{Result, TimestampError};
use crate::ltv::{extract_ltv, write_dss, LtvFetcher, VriEntry};
use crate::pdf::prepare::{prepare, PrepareOptions, PreparedPdf};
use crate::pdf::embed_token;
use crate::token::{parse_token, validate_token};
use crate::traits::{Clock, HttpTransport, NonceSource, RandomNonce, ReqwestTransport, SystemClock};
use crate::tsa::request::TimestampRequest;
use crate::tsa::response::TimestampResponse;
use crate::types::{TimestampOptions, TimestampResult};

enum SessionState {
    Fresh,
    RequestIssued {
        prepared: PreparedPdf,
        request: TimestampRequest,
    },
    Embedded,
}

impl SessionState {
    fn name(&self) -> &'static str {
        match self {
            SessionState::Fresh => "Fresh",
            SessionState::RequestIssued { .. } => "RequestIssued",
            SessionState::Embedded => "Embedded",
        }
    }
}

/// One timestamp operation split into its request and embed halves.
///
/// States move `Fresh -> RequestIssued -> Embedded`; a failed embed
/// leaves the session in `RequestIssued` so the caller can retry with a
/// fresh response. The input buffer is never mutated.
pub struct TimestampSession {
    pdf: Vec<u8>,
    options: TimestampOptions,
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
    nonces: Arc<dyn NonceSource>,
    state: SessionState,
}

impl TimestampSession {
    pub fn new(pdf: Vec<u8>, options: TimestampOptions) -> Self {
        Self {
            pdf,
            options,
            transport: Arc::new(ReqwestTransport::new()),
            clock: Arc::new(SystemClock),
            nonces: Arc::new(RandomNonce),
            state: SessionState::Fresh,
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

    fn wrong_state(&self, operation: &str) -> TimestampError {
        TimestampError::invalid_pdf(format!(
            "{operation} is not valid in the {} state",
            self.state.name()
        ))
    }

    /// Prepare the placeholder and return the DER `TimeStampReq` to be
    /// delivered to a TSA out of band.
    pub fn create_timestamp_request(&mut self) -> Result<Vec<u8>> {
        if !matches!(self.state, SessionState::Fresh) {
            return Err(self.wrong_state("create_timestamp_request"));
        }

        let prepared = prepare(
            &self.pdf,
            &PrepareOptions {
                signature_size: self.options.effective_signature_size(),
                field_name: self.options.field_name.clone(),
                signing_time: self.clock.now(),
            },
        )?;
        let digest = prepared.digest(self.options.hash_algorithm);
        let nonce = self.options.use_nonce.then(|| self.nonces.nonce());
        let request =
            TimestampRequest::build(self.options.hash_algorithm, &digest, None, nonce)?;
        let der = request.der.clone();

        debug!(
            "issued timestamp request for field '{}'",
            prepared.field_name()
        );
        self.state = SessionState::RequestIssued { prepared, request };
        Ok(der)
    }

    /// The request bytes issued earlier, for callers that saved nothing
    pub fn request_bytes(&self) -> Option<&[u8]> {
        match &self.state {
            SessionState::RequestIssued { request, .. } => Some(&request.der),
            _ => None,
        }
    }

    /// Consume a DER `TimeStampResp` or a bare `TimeStampToken` and
    /// produce the finished document.
    pub async fn embed_timestamp_token(&mut self, der: &[u8]) -> Result<TimestampResult> {
        let SessionState::RequestIssued { prepared, request } = &self.state else {
            return Err(self.wrong_state("embed_timestamp_token"));
        };

        let token_der = normalize_token_input(der)?;
        let parsed = parse_token(&token_der)?;
        let validated = validate_token(
            &parsed,
            &request.digest,
            request.hash_algorithm,
            request.nonce.as_deref(),
        )?;
        let embedded = embed_token(prepared, &token_der)?;

        let (pdf, ltv, warnings) = if self.options.enable_ltv {
            let mut data = extract_ltv(&parsed);
            let fetcher = LtvFetcher::new(
                self.transport.as_ref(),
                self.options.ltv_budget,
                self.options.ltv_budget,
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

        self.state = SessionState::Embedded;
        Ok(TimestampResult {
            pdf,
            token: token_der,
            info: validated.info,
            ltv,
            warnings,
        })
    }
}

/// Accept either a full `TimeStampResp` or a bare token. The two are
/// told apart by the first element of the outer SEQUENCE: a response
/// starts with the PKIStatusInfo SEQUENCE, a ContentInfo with an OID.
pub(crate) fn normalize_token_input(der: &[u8]) -> Result<Vec<u8>> {
    let mut reader = DerReader::new(der);
    let outer = reader
        .read_sequence("TimeStampResp or TimeStampToken")
        .map_err(TimestampError::from)?;
    match outer.peek_tag() {
        Some(tag::OBJECT_IDENTIFIER) => Ok(der.to_vec()),
        Some(tag::SEQUENCE) | Some(tag::INTEGER) => {
            TimestampResponse::parse(der)?.into_token()
        }
        _ => Err(TimestampError::invalid_response(
            "neither a TimeStampResp nor a TimeStampToken",
            0,
        )),
    }
}

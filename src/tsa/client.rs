//! HTTP client for the TSA exchange.

use std::sync::Arc;

use log::{debug, warn};

use crate::error::{Result, TimestampError};
use crate::traits::{HttpTransport, ReqwestTransport};
use crate::types::TsaConfig;

const REQUEST_CONTENT_TYPE: &str = "application/timestamp-query";
const REPLY_CONTENT_TYPE: &str = "application/timestamp-reply";
/// Some servers spell the reply type this way instead.
const REPLY_CONTENT_TYPE_ALT: &str = "application/timestamp-response";

/// RFC 3161 client. Transport failures and HTTP 5xx are retried within
/// the configured budget; protocol-level refusals are surfaced at once.
pub struct TsaClient {
    transport: Arc<dyn HttpTransport>,
}

impl TsaClient {
    pub fn new() -> Self {
        Self {
            transport: Arc::new(ReqwestTransport::new()),
        }
    }

    pub fn with_transport(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// POST the DER request and return the raw `TimeStampResp` bytes.
    pub async fn send_request(&self, config: &TsaConfig, request: &[u8]) -> Result<Vec<u8>> {
        let attempts = config.retries.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(config.retry_delay).await;
            }
            debug!(
                "timestamp request to {} (attempt {attempt}/{attempts})",
                config.url
            );
            match self
                .transport
                .post(&config.url, REQUEST_CONTENT_TYPE, request, config.timeout)
                .await
            {
                Ok(response) if response.is_server_error() => {
                    warn!(
                        "TSA {} answered HTTP {} on attempt {attempt}",
                        config.url, response.status
                    );
                    last_error = Some(TimestampError::tsa_network(format!(
                        "TSA returned HTTP {}",
                        response.status
                    )));
                }
                Ok(response) if !response.is_success() => {
                    return Err(TimestampError::tsa_network(format!(
                        "TSA returned HTTP {}",
                        response.status
                    )));
                }
                Ok(response) => {
                    check_content_type(&config.url, response.content_type.as_deref());
                    return Ok(response.body);
                }
                Err(err @ TimestampError::TsaNetwork { .. }) => {
                    warn!("transport failure on attempt {attempt}: {err}");
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error
            .unwrap_or_else(|| TimestampError::tsa_network("no attempt was made")))
    }
}

impl Default for TsaClient {
    fn default() -> Self {
        Self::new()
    }
}

fn check_content_type(url: &str, content_type: Option<&str>) {
    let Some(content_type) = content_type else {
        warn!("TSA {url} sent no Content-Type header");
        return;
    };
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim();
    if essence != REPLY_CONTENT_TYPE && essence != REPLY_CONTENT_TYPE_ALT {
        warn!("TSA {url} sent unexpected Content-Type '{content_type}', parsing body anyway");
    }
}

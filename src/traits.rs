//! Capability seams: transport, time and randomness are injected so the
//! pipeline can run deterministically under test.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::RngCore;

use crate::error::{Result, TimestampError};

/// A minimal HTTP response as the pipeline needs it
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}

/// Abstraction over the HTTP client. The TSA exchange uses `post`; LTV
/// completion additionally uses `get` for CRLs and issuer certificates.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post(
        &self,
        url: &str,
        content_type: &str,
        body: &[u8],
        timeout: Duration,
    ) -> Result<HttpResponse>;

    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse>;
}

/// Time source for signing dates, injectable for deterministic tests
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Nonce source for TSA requests
pub trait NonceSource: Send + Sync {
    fn nonce(&self) -> [u8; 8];
}

/// Production transport backed by reqwest
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(
        &self,
        url: &str,
        content_type: &str,
        body: &[u8],
        timeout: Duration,
    ) -> Result<HttpResponse> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", content_type)
            .timeout(timeout)
            .body(body.to_vec())
            .send()
            .await
            .map_err(|e| TimestampError::tsa_network(format!("POST {url} failed: {e}")))?;
        read_response(response).await
    }

    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| TimestampError::tsa_network(format!("GET {url} failed: {e}")))?;
        read_response(response).await
    }
}

async fn read_response(response: reqwest::Response) -> Result<HttpResponse> {
    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());
    let body = response
        .bytes()
        .await
        .map_err(|e| TimestampError::tsa_network(format!("failed to read response body: {e}")))?
        .to_vec();
    Ok(HttpResponse {
        status,
        content_type,
        body,
    })
}

/// Wall-clock time source
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Nonces from the thread-local CSPRNG
pub struct RandomNonce;

impl NonceSource for RandomNonce {
    fn nonce(&self) -> [u8; 8] {
        let mut bytes = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        let ok = HttpResponse {
            status: 200,
            content_type: None,
            body: Vec::new(),
        };
        assert!(ok.is_success());
        assert!(!ok.is_server_error());

        let unavailable = HttpResponse {
            status: 503,
            content_type: None,
            body: Vec::new(),
        };
        assert!(!unavailable.is_success());
        assert!(unavailable.is_server_error());
    }

    #[test]
    fn random_nonces_vary() {
        let source = RandomNonce;
        // Eight bytes colliding across three draws would mean a broken RNG.
        let draws = [source.nonce(), source.nonce(), source.nonce()];
        assert!(draws[0] != draws[1] || draws[1] != draws[2]);
    }
}

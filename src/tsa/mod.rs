//! RFC 3161 Time-Stamping Authority protocol: request construction,
//! response parsing and the HTTP client.

pub mod client;
pub mod endpoints;
pub mod request;
pub mod response;

pub use client::TsaClient;
pub use endpoints::TsaEndpoint;
pub use request::TimestampRequest;
pub use response::{FailInfo, PkiStatus, TimestampResponse};

//! Well-known public TSA endpoints and their quirks.
//!
//! Offered as convenient defaults only; any RFC 3161 endpoint works.

use std::time::Duration;

use crate::types::TsaConfig;

/// A well-known public Time-Stamping Authority
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TsaEndpoint {
    DigiCert,
    Sectigo,
    Comodo,
    QuoVadis,
    GlobalSign,
    Entrust,
    FreeTsa,
}

impl TsaEndpoint {
    pub const ALL: [TsaEndpoint; 7] = [
        TsaEndpoint::DigiCert,
        TsaEndpoint::Sectigo,
        TsaEndpoint::Comodo,
        TsaEndpoint::QuoVadis,
        TsaEndpoint::GlobalSign,
        TsaEndpoint::Entrust,
        TsaEndpoint::FreeTsa,
    ];

    pub fn url(&self) -> &'static str {
        match self {
            TsaEndpoint::DigiCert => "http://timestamp.digicert.com",
            TsaEndpoint::Sectigo => "http://timestamp.sectigo.com",
            TsaEndpoint::Comodo => "http://timestamp.comodoca.com",
            TsaEndpoint::QuoVadis => "http://ts.quovadisglobal.com/eu",
            TsaEndpoint::GlobalSign => "http://timestamp.globalsign.com/tsa/r6advanced1",
            TsaEndpoint::Entrust => "http://timestamp.entrust.net/TSS/RFC3161sha2TS",
            TsaEndpoint::FreeTsa => "https://freetsa.org/tsr",
        }
    }

    /// Operational notes gathered from running against the endpoint
    pub fn quirks(&self) -> &'static str {
        match self {
            TsaEndpoint::DigiCert => "fast, no registration, generous rate limits",
            TsaEndpoint::Sectigo => "15 second cool-down per source address",
            TsaEndpoint::Comodo => "same infrastructure as Sectigo, same cool-down",
            TsaEndpoint::QuoVadis => "requires the eu path suffix, rejects bare host",
            TsaEndpoint::GlobalSign => {
                "replies with Content-Type application/timestamp-response"
            }
            TsaEndpoint::Entrust => "slowest of the set, allow a full 30 second timeout",
            TsaEndpoint::FreeTsa => "community service, HTTPS only, sha1 policy default",
        }
    }

    /// Endpoints known to need a pause between consecutive requests
    pub fn cool_down(&self) -> Option<Duration> {
        match self {
            TsaEndpoint::Sectigo | TsaEndpoint::Comodo => Some(Duration::from_secs(15)),
            _ => None,
        }
    }

    /// A ready-to-use configuration for this endpoint
    pub fn config(&self) -> TsaConfig {
        TsaConfig::new(self.url())
    }
}

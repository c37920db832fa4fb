//! Upstream tariff service abstraction
//!
//! The catalog core only ever talks to the tariff service through
//! [`TariffUpstream`], so the page loop can be driven by the real
//! HTTP client or by a scripted fixture in tests.

mod http;

#[cfg(test)]
pub(crate) mod mock;

pub use http::HttpUpstream;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Query for one page of the nomenclature codes listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodesQuery {
    pub date: String,
    pub language: String,
    pub page: u32,
}

/// Query for the measures attached to one nomenclature code
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeasuresQuery {
    #[serde(rename = "nomenclatureCode")]
    pub code: String,
    pub date: String,
    pub language: String,
}

/// Errors raised while talking to the tariff service
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The service answered with a non-success status
    #[error("upstream returned HTTP {status} for {url}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    /// The request never produced a response (connect, timeout, TLS)
    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The response body was not valid JSON
    #[error("response from {url} is not valid JSON")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// The configured base URL cannot be joined with an endpoint path
    #[error("invalid upstream URL {url}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

impl UpstreamError {
    /// HTTP status returned by the service, if it answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Trait for tariff data sources
///
/// Implementations perform exactly one request per call and never retry;
/// pagination policy lives in the page fetcher.
#[async_trait]
pub trait TariffUpstream: Send + Sync {
    /// Fetch one raw page of the codes listing
    async fn fetch_codes_page(&self, query: &CodesQuery) -> Result<Value, UpstreamError>;

    /// Fetch the measures payload for a code, passed through verbatim
    async fn fetch_measures(&self, query: &MeasuresQuery) -> Result<Value, UpstreamError>;

    /// Upstream identifier for logging/debugging
    fn name(&self) -> &str;
}

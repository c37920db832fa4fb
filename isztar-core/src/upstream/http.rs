//! reqwest backend for the ISZTAR tariff REST API
//!
//! Simple HTTP GETs against `{base_url}/codes` and `{base_url}/measures`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::{CodesQuery, MeasuresQuery, TariffUpstream, UpstreamError};
use crate::config::UpstreamConfig;

/// Upper bound on how much of an error body is kept for diagnostics
const MAX_ERROR_BODY_CHARS: usize = 512;

/// HTTP client for the tariff service
pub struct HttpUpstream {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpUpstream {
    /// Create a new client from upstream configuration
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        // Url::join drops the last path segment unless the base ends with '/'
        let base = format!("{}/", config.base_url.trim_end_matches('/'));
        let base_url = Url::parse(&base)
            .with_context(|| format!("Invalid upstream base URL: {}", config.base_url))?;

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        debug!(
            "Upstream client ready: base_url={}, timeout={}s",
            base_url, config.timeout_seconds
        );

        Ok(Self { client, base_url })
    }

    /// Base URL every endpoint is resolved against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, UpstreamError> {
        self.base_url
            .join(path)
            .map_err(|source| UpstreamError::InvalidUrl {
                url: format!("{}{}", self.base_url, path),
                source,
            })
    }

    async fn get_json<Q>(&self, path: &str, query: &Q) -> Result<Value, UpstreamError>
    where
        Q: Serialize + ?Sized + Sync,
    {
        let url = self.endpoint(path)?;

        let response = self
            .client
            .get(url.clone())
            .query(query)
            .send()
            .await
            .map_err(|source| UpstreamError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|source| UpstreamError::Transport {
                url: final_url.clone(),
                source,
            })?;

        if !status.is_success() {
            warn!("Upstream error: {} from {}", status, final_url);
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                url: final_url,
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body).map_err(|source| UpstreamError::Decode {
            url: final_url,
            source,
        })
    }
}

#[async_trait]
impl TariffUpstream for HttpUpstream {
    async fn fetch_codes_page(&self, query: &CodesQuery) -> Result<Value, UpstreamError> {
        debug!(
            "Fetching codes page {} (date={}, language={})",
            query.page, query.date, query.language
        );
        self.get_json("codes", query).await
    }

    async fn fetch_measures(&self, query: &MeasuresQuery) -> Result<Value, UpstreamError> {
        debug!(
            "Fetching measures for {} (date={}, language={})",
            query.code, query.date, query.language
        );
        self.get_json("measures", query).await
    }

    fn name(&self) -> &str {
        self.base_url.as_str()
    }
}

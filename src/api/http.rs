use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::debug;

use crate::error::ScrapeError;

const USER_AGENT: &str = concat!("squares-engine/", env!("CARGO_PKG_VERSION"));

/// Shared GET client that classifies failures as transient or permanent
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client })
    }

    /// Fetch a URL body as text
    pub async fn get_text(&self, url: &str) -> Result<String, ScrapeError> {
        let host = host_of(url);
        debug!("Fetching {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify(e, &host))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ScrapeError::transient(format!(
                "HTTP {} from {}",
                status.as_u16(),
                host
            )));
        }
        if !status.is_success() {
            return Err(ScrapeError::permanent(format!(
                "HTTP {} from {}",
                status.as_u16(),
                host
            )));
        }

        let body = response.text().await.map_err(|e| classify(e, &host))?;
        if body.trim().is_empty() {
            return Err(ScrapeError::permanent(format!(
                "{} returned an empty response",
                host
            )));
        }

        Ok(body)
    }
}

/// Timeouts and connection-level failures are worth retrying; anything else is not
fn classify(err: reqwest::Error, host: &str) -> ScrapeError {
    if err.is_timeout() {
        ScrapeError::transient(format!("Timeout fetching {}: {}", host, err))
    } else if err.is_connect() || err.is_request() || err.is_body() {
        ScrapeError::transient(format!("Network error fetching {}: {}", host, err))
    } else {
        ScrapeError::permanent(format!("Request to {} failed: {}", host, err))
    }
}

fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

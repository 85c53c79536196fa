use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, PRAGMA};

use super::worker_client::validators_from_headers;
use super::{BaseSiteProbe, CacheValidators};

/// Origin probe issuing `HEAD` requests for cache validators.
///
/// The response status is not inspected: an origin answering with an error
/// page simply carries no validators and is never flagged.
pub struct HttpSiteProbe {
    client: reqwest::Client,
}

impl HttpSiteProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl BaseSiteProbe for HttpSiteProbe {
    async fn head(&self, url: &str) -> Result<CacheValidators> {
        let response = self
            .client
            .head(url)
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .send()
            .await
            .with_context(|| format!("Failed to probe {}", url))?;

        Ok(validators_from_headers(response.headers()))
    }
}

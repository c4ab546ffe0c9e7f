//! HTTP downloader implementing the engine's [`UrlFetcher`] contract.

use std::time::Duration;

use anyhow::{Context, Result, ensure};
use async_trait::async_trait;
use clipflow_engine::collab::UrlFetcher;
use reqwest::Client;
use tracing::debug;
use url::Url;

/// Downloads URLs into byte buffers with a bounded request timeout.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("build http client")?;
        Ok(Self { http })
    }
}

#[async_trait]
impl UrlFetcher for HttpFetcher {
    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let parsed = Url::parse(url).with_context(|| format!("'{url}' is not a valid URL"))?;
        debug!(%parsed, "downloading media");

        let response = self
            .http
            .get(parsed)
            .send()
            .await
            .with_context(|| format!("failed to download {url}"))?;
        ensure!(response.status().is_success(), "download of {url} returned {}", response.status());

        let bytes = response.bytes().await.with_context(|| format!("failed to read body of {url}"))?;
        Ok(bytes.to_vec())
    }
}

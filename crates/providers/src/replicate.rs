//! Replicate predictions client.
//!
//! A prediction is created against the latest version of a model (the
//! version lookup is cached per client), then polled on a bounded
//! interval until it reaches a terminal status. Successful predictions
//! resolve to the URL of the stored output.

use std::{collections::HashMap, env, time::Duration};

use anyhow::{Context, Result, anyhow, bail, ensure};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map as JsonMap, Value, json};
use tokio::sync::Mutex;
use tracing::debug;

/// Model identifier for bytedance/seedance-1.
pub const SEEDANCE_1_MODEL: &str = "bytedance/seedance-1";
/// Model identifier for bytedance/seedance-1-lite.
pub const SEEDANCE_1_LITE_MODEL: &str = "bytedance/seedance-1-lite";

const DEFAULT_BASE_URL: &str = "https://api.replicate.com/v1";
const POLL_INTERVAL: Duration = Duration::from_secs(2);
const MAX_POLL_ATTEMPTS: u32 = 300;

/// HTTP client for the Replicate predictions API.
#[derive(Debug)]
pub struct ReplicateClient {
    http: Client,
    token: String,
    base_url: String,
    versions: Mutex<HashMap<String, String>>,
    poll_interval: Duration,
    max_polls: u32,
}

impl ReplicateClient {
    /// Construct a client from the `REPLICATE_API_TOKEN` environment variable.
    pub fn from_env() -> Result<Self> {
        let token = env::var("REPLICATE_API_TOKEN").map_err(|_| anyhow!("REPLICATE_API_TOKEN is not set"))?;
        Self::new(token, DEFAULT_BASE_URL)
    }

    pub fn new(token: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let token = token.into();
        ensure!(!token.is_empty(), "replicate token is required");
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            token,
            base_url: base_url.into(),
            versions: Mutex::new(HashMap::new()),
            poll_interval: POLL_INTERVAL,
            max_polls: MAX_POLL_ATTEMPTS,
        })
    }

    #[cfg(test)]
    fn with_polling(mut self, poll_interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = poll_interval;
        self.max_polls = max_polls;
        self
    }

    /// Run a model prediction and wait for completion.
    ///
    /// `options` is merged into the prediction input next to the prompt.
    /// Returns the URL of the prediction output.
    pub async fn run(&self, model: &str, prompt: &str, options: JsonMap<String, Value>) -> Result<String> {
        let version = self.latest_version(model).await?;

        let mut input = JsonMap::new();
        input.insert("prompt".to_string(), Value::String(prompt.to_string()));
        input.extend(options);

        let response = self
            .http
            .post(format!("{}/predictions", self.base_url))
            .header("Authorization", format!("Token {}", self.token))
            .json(&json!({ "version": version, "input": input }))
            .send()
            .await
            .context("create prediction")?;
        if !response.status().is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("prediction create failed: {detail}");
        }

        let mut prediction: Prediction = response.json().await.context("decode prediction")?;
        let mut polls = 0;
        loop {
            // Every fetched status is inspected here, including the one
            // from the final allowed poll.
            match prediction.status.as_str() {
                "succeeded" => {
                    return extract_output_url(&prediction.output)
                        .ok_or_else(|| anyhow!("prediction for {model} returned no downloadable output"));
                }
                "failed" | "canceled" => bail!("prediction {}", prediction.status),
                _ => {}
            }

            polls += 1;
            ensure!(
                polls <= self.max_polls,
                "prediction for {model} did not complete after {} polls",
                self.max_polls
            );
            debug!(model, id = %prediction.id, attempt = polls, status = %prediction.status, "polling prediction");
            tokio::time::sleep(self.poll_interval).await;
            prediction = self.get_prediction(&prediction.id).await?;
        }
    }

    async fn get_prediction(&self, id: &str) -> Result<Prediction> {
        let response = self
            .http
            .get(format!("{}/predictions/{}", self.base_url, id))
            .header("Authorization", format!("Token {}", self.token))
            .send()
            .await
            .context("fetch prediction")?;
        if !response.status().is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("prediction fetch failed: {detail}");
        }
        response.json().await.context("decode prediction")
    }

    /// Resolve the model's current version id, caching the result.
    async fn latest_version(&self, model: &str) -> Result<String> {
        if let Some(version) = self.versions.lock().await.get(model) {
            return Ok(version.clone());
        }

        let response = self
            .http
            .get(format!("{}/models/{}", self.base_url, model))
            .header("Authorization", format!("Token {}", self.token))
            .send()
            .await
            .context("fetch model")?;
        if !response.status().is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("fetch model failed: {detail}");
        }

        let info: ModelInfo = response.json().await.context("decode model info")?;
        let version = info
            .default_version
            .map(|v| v.id)
            .filter(|id| !id.is_empty())
            .or_else(|| info.latest_version.map(|v| v.id).filter(|id| !id.is_empty()))
            .ok_or_else(|| anyhow!("model version not found for {model}"))?;

        self.versions.lock().await.insert(model.to_string(), version.clone());
        Ok(version)
    }
}

/// Pull the output URL from a prediction payload.
///
/// Outputs are either an array whose first entry is a URL, or an object
/// with a `url` field.
fn extract_output_url(output: &Value) -> Option<String> {
    match output {
        Value::String(url) if url.starts_with("http") => Some(url.clone()),
        Value::Array(items) => items
            .first()
            .and_then(Value::as_str)
            .filter(|url| url.starts_with("http"))
            .map(str::to_string),
        Value::Object(map) => map.get("url").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(default)]
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    output: Value,
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    #[serde(default)]
    latest_version: Option<ModelVersion>,
    #[serde(default)]
    default_version: Option<ModelVersion>,
}

#[derive(Debug, Deserialize)]
struct ModelVersion {
    #[serde(default)]
    id: String,
}

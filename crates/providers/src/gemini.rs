//! Google generative-media client: Imagen image generation and Veo video
//! generation over the REST API.
//!
//! Veo jobs are long-running operations: the create call returns an
//! operation name which is polled on a bounded interval until done. The
//! poll loop lives entirely inside this client so the engine sees a single
//! blocking call; dropping the future cancels the wait.

use std::{env, time::Duration};

use anyhow::{Context, Result, anyhow, bail, ensure};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

/// Model identifier for Veo preview video generation.
pub const VEO_3_PREVIEW_MODEL: &str = "veo-3.0-generate-preview";
/// Model identifier for Imagen 3 image generation.
pub const IMAGEN_3_MODEL: &str = "imagen-3.0-generate-002";
/// Model identifier for Gemini Flash experimental image generation.
pub const GEMINI_FLASH_IMAGE_MODEL: &str = "gemini-2.0-flash-exp-image-generation";

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Upper bound on operation polls to prevent an unbounded wait.
const MAX_POLL_ATTEMPTS: u32 = 300;

/// REST client for the Google generative-media endpoints.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    /// Construct a client from the `GEMINI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("GEMINI_API_KEY").map_err(|_| anyhow!("GEMINI_API_KEY is not set"))?;
        Self::new(api_key, DEFAULT_BASE_URL)
    }

    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into(),
        })
    }

    /// Generate an image and return its raw bytes.
    pub async fn generate_image(&self, model: &str, prompt: &str) -> Result<Vec<u8>> {
        let url = format!("{}/models/{}:predict", self.base_url, model);
        let body = json!({
            "instances": [{ "prompt": prompt }],
            "parameters": { "sampleCount": 1 },
        });

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("image generation request to {model} failed"))?;
        ensure!(
            response.status().is_success(),
            "image generation with {model} returned {}",
            response.status()
        );

        let payload: ImagePredictions = response.json().await.context("decode image prediction response")?;
        let encoded = payload
            .predictions
            .first()
            .map(|prediction| prediction.bytes_base64_encoded.as_str())
            .ok_or_else(|| anyhow!("image generation with {model} returned no predictions"))?;
        BASE64.decode(encoded).context("decode image payload")
    }

    /// Generate a video from a prompt and a start frame, optionally guided
    /// by an end frame, and return its raw bytes.
    pub async fn generate_video(&self, model: &str, prompt: &str, first_frame: &[u8], last_frame: Option<&[u8]>) -> Result<Vec<u8>> {
        let mut instance = json!({
            "prompt": prompt,
            "image": frame_payload(first_frame),
        });
        if let Some(last_frame) = last_frame {
            instance["lastFrame"] = frame_payload(last_frame);
        }

        let url = format!("{}/models/{}:predictLongRunning", self.base_url, model);
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&json!({ "instances": [instance] }))
            .send()
            .await
            .with_context(|| format!("video generation request to {model} failed"))?;
        ensure!(
            response.status().is_success(),
            "video generation with {model} returned {}",
            response.status()
        );

        let operation: Operation = response.json().await.context("decode operation response")?;
        let video_uri = self.wait_for_video(&operation.name).await?;

        let download = self
            .http
            .get(&video_uri)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .context("download generated video")?;
        ensure!(download.status().is_success(), "video download returned {}", download.status());
        Ok(download.bytes().await.context("read generated video")?.to_vec())
    }

    /// Poll the operation until it completes and return the video URI.
    async fn wait_for_video(&self, operation_name: &str) -> Result<String> {
        let url = format!("{}/{}", self.base_url, operation_name);
        for attempt in 1..=MAX_POLL_ATTEMPTS {
            tokio::time::sleep(POLL_INTERVAL).await;
            debug!(operation = operation_name, attempt, "polling video operation");

            let response = self
                .http
                .get(&url)
                .header("x-goog-api-key", &self.api_key)
                .send()
                .await
                .context("poll video operation")?;
            ensure!(response.status().is_success(), "operation poll returned {}", response.status());

            let operation: Operation = response.json().await.context("decode operation poll")?;
            if !operation.done {
                continue;
            }
            if let Some(error) = operation.error {
                bail!("video generation failed: {error}");
            }
            return extract_video_uri(&operation.response).ok_or_else(|| anyhow!("video generation did not return a result"));
        }
        bail!("video operation did not complete after {MAX_POLL_ATTEMPTS} polls");
    }
}

fn frame_payload(frame: &[u8]) -> Value {
    json!({
        "bytesBase64Encoded": BASE64.encode(frame),
        "mimeType": "image/png",
    })
}

fn extract_video_uri(response: &Value) -> Option<String> {
    response
        .pointer("/generateVideoResponse/generatedSamples/0/video/uri")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[derive(Debug, Deserialize)]
struct ImagePredictions {
    #[serde(default)]
    predictions: Vec<ImagePrediction>,
}

#[derive(Debug, Deserialize)]
struct ImagePrediction {
    #[serde(rename = "bytesBase64Encoded")]
    bytes_base64_encoded: String,
}

#[derive(Debug, Deserialize)]
struct Operation {
    #[serde(default)]
    name: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    response: Value,
    #[serde(default)]
    error: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_uri_is_extracted_from_a_completed_operation() {
        let response = json!({
            "generateVideoResponse": {
                "generatedSamples": [
                    { "video": { "uri": "https://files.example/video/abc" } }
                ]
            }
        });
        assert_eq!(extract_video_uri(&response).as_deref(), Some("https://files.example/video/abc"));
    }

    #[test]
    fn missing_samples_yield_no_uri() {
        assert_eq!(extract_video_uri(&json!({})), None);
        assert_eq!(extract_video_uri(&json!({"generateVideoResponse": {"generatedSamples": []}})), None);
    }

    #[test]
    fn from_env_requires_the_api_key() {
        temp_env::with_var_unset("GEMINI_API_KEY", || {
            assert!(GeminiClient::from_env().is_err());
        });
    }
}

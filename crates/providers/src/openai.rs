//! OpenAI client: image generation and editing, moderation checks, and
//! chat-completion helpers used for prompt sanitization.

use std::{env, time::Duration};

use anyhow::{Context, Result, anyhow, bail, ensure};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{Value, json};

/// Model identifier for gpt-image-1.
pub const GPT_IMAGE_1_MODEL: &str = "gpt-image-1";
/// Model identifier for DALL-E 3.
pub const DALL_E_3_MODEL: &str = "dall-e-3";
/// Model used for moderation checks.
pub const MODERATION_MODEL: &str = "omni-moderation-latest";
/// Chat model used for free-form responses.
pub const CHAT_MODEL: &str = "gpt-4o-mini";
/// Chat model used for prompt sanitization.
pub const SANITIZE_MODEL: &str = "gpt-4.1-mini";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const SANITIZE_SYSTEM_PROMPT: &str = "You are a prompt sanitization assistant. \
Your task is to rewrite image generation prompts to be safe and appropriate \
while maintaining the creative intent. Always respond with just the sanitized \
prompt, no explanations or additional text.";

/// HTTP client for the OpenAI images API.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    /// Construct a client from the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY").map_err(|_| anyhow!("OPENAI_API_KEY is not set"))?;
        Self::new(api_key, DEFAULT_BASE_URL)
    }

    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
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
        let mut body = json!({
            "model": model,
            "prompt": prompt,
            "n": 1,
            "size": "1024x1024",
        });
        // gpt-image-1 always returns base64 and rejects the parameter.
        if model != GPT_IMAGE_1_MODEL {
            body["response_format"] = json!("b64_json");
        }

        let response = self
            .http
            .post(format!("{}/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("image generation request to {model} failed"))?;
        if !response.status().is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("image generation with {model} failed: {detail}");
        }

        let payload: ImageResponse = response.json().await.context("decode image response")?;
        let encoded = payload
            .data
            .first()
            .and_then(|item| item.b64_json.as_deref())
            .ok_or_else(|| anyhow!("image generation with {model} returned an empty response"))?;
        BASE64.decode(encoded).context("decode image payload")
    }

    /// Edit an image guided by a prompt and return the edited bytes.
    pub async fn edit_image(&self, model: &str, prompt: &str, image: Vec<u8>) -> Result<Vec<u8>> {
        ensure!(!image.is_empty(), "image input is empty");

        let form = Form::new()
            .text("model", model.to_string())
            .text("prompt", prompt.to_string())
            .part("image", Part::bytes(image).file_name("image.png").mime_str("image/png")?);

        let response = self
            .http
            .post(format!("{}/images/edits", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("image edit request to {model} failed"))?;
        if !response.status().is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("image edit with {model} failed: {detail}");
        }

        let payload: ImageResponse = response.json().await.context("decode image response")?;
        let encoded = payload
            .data
            .first()
            .and_then(|item| item.b64_json.as_deref())
            .ok_or_else(|| anyhow!("image edit with {model} returned an empty response"))?;
        BASE64.decode(encoded).context("decode image payload")
    }

    /// Check `text` against the moderation endpoint.
    ///
    /// Returns whether the input was flagged; an empty result list counts
    /// as not flagged.
    pub async fn moderate(&self, text: &str) -> Result<bool> {
        let response = self
            .http
            .post(format!("{}/moderations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": MODERATION_MODEL, "input": text }))
            .send()
            .await
            .context("moderation request failed")?;
        if !response.status().is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("moderation check failed: {detail}");
        }

        let payload: ModerationResponse = response.json().await.context("decode moderation response")?;
        Ok(payload.results.first().map(|result| result.flagged).unwrap_or(false))
    }

    /// Answer free-form `content` with a single chat completion.
    pub async fn respond(&self, content: &str) -> Result<String> {
        self.chat(CHAT_MODEL, json!([{ "role": "user", "content": content }])).await
    }

    /// Rewrite an image prompt so it stays within content policy while
    /// keeping the creative intent.
    pub async fn sanitize_prompt(&self, prompt: &str) -> Result<String> {
        let instructions = format!(
            "Please rewrite the following image generation prompt to be safe and \
appropriate while maintaining the core creative intent. Follow these rules:\n\
1. Replace any specific brand names, IP, or copyrighted content with generic descriptions\n\
2. Remove or replace any potentially offensive, sexual, or violent content\n\
3. Keep the artistic style and main subject matter intact\n\
4. Make the description more general while preserving the creative vision\n\
5. Ensure the prompt follows content policy guidelines\n\
6. Keep the response concise and focused on visual elements\n\n\
Original prompt: {prompt}"
        );

        self.chat(
            SANITIZE_MODEL,
            json!([
                { "role": "system", "content": SANITIZE_SYSTEM_PROMPT },
                { "role": "user", "content": instructions },
            ]),
        )
        .await
    }

    async fn chat(&self, model: &str, messages: Value) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": model, "messages": messages }))
            .send()
            .await
            .with_context(|| format!("chat completion request to {model} failed"))?;
        if !response.status().is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("chat completion with {model} failed: {detail}");
        }

        let payload: ChatResponse = response.json().await.context("decode chat response")?;
        payload
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("chat completion with {model} returned no choices"))
    }
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    #[serde(default)]
    b64_json: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModerationResponse {
    #[serde(default)]
    results: Vec<ModerationResult>,
}

#[derive(Debug, Deserialize)]
struct ModerationResult {
    #[serde(default)]
    flagged: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn from_env_requires_the_api_key() {
        temp_env::with_var_unset("OPENAI_API_KEY", || {
            assert!(OpenAiClient::from_env().is_err());
        });
    }

    #[tokio::test]
    async fn moderation_reports_the_flagged_verdict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/moderations"))
            .and(body_partial_json(json!({ "model": MODERATION_MODEL })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [{ "flagged": true }] })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new("key", server.uri()).unwrap();
        assert!(client.moderate("a grim prompt").await.unwrap());
    }

    #[tokio::test]
    async fn empty_moderation_results_count_as_clean() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/moderations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new("key", server.uri()).unwrap();
        assert!(!client.moderate("a calm prompt").await.unwrap());
    }

    #[tokio::test]
    async fn sanitize_prompt_returns_the_rewritten_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({ "model": SANITIZE_MODEL })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "choices": [{ "message": { "content": "a generic soda can" } }] })),
            )
            .mount(&server)
            .await;

        let client = OpenAiClient::new("key", server.uri()).unwrap();
        let sanitized = client.sanitize_prompt("a famous-brand soda can").await.unwrap();
        assert_eq!(sanitized, "a generic soda can");
    }

    #[tokio::test]
    async fn chat_without_choices_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new("key", server.uri()).unwrap();
        assert!(client.respond("hello").await.is_err());
    }
}

//! Wires concrete provider clients into the engine's capability registry.
//!
//! Each adapter implements one engine trait on top of a client; the
//! [`Gateway`] builds whichever adapters the process has credentials for
//! and registers them under their provider identifiers.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clipflow_engine::collab::{ImageGenerator, MediaArtifact, ObjectStore, UrlFetcher, VideoGenerator};
use clipflow_engine::provider::{ProviderRegistry, ids};
use serde_json::{Map as JsonMap, Value};
use tracing::warn;

use crate::fetch::HttpFetcher;
use crate::gemini::{GeminiClient, VEO_3_PREVIEW_MODEL};
use crate::openai::OpenAiClient;
use crate::replicate::ReplicateClient;
use crate::storage::{GcsStore, S3Store};

/// Replicate-hosted image backends: provider identifier to model slug.
const REPLICATE_IMAGE_MODELS: &[(&str, &str)] = &[
    (ids::FLUX_SCHNELL, "black-forest-labs/flux-schnell"),
    (ids::SANA, "nvidia/sana"),
    (ids::STABILITY_SD3, "stability-ai/stable-diffusion-3"),
    (ids::LUMA_PHOTON, "luma/photon"),
    (ids::LUMA_PHOTON_FLASH, "luma/photon-flash"),
    (ids::LEONARDO_KINO_XL, "leonardoai/leonardo-kino-xl"),
    (ids::LEONARDO_DIFFUSION_XL, "leonardoai/leonardo-diffusion-xl"),
    (ids::LEONARDO_ANIME_XL, "leonardoai/leonardo-anime-xl"),
    (ids::LEONARDO_LIGHTNING, "leonardoai/leonardo-lightning"),
];

/// Provider registry plus shared collaborators, built from the process
/// environment.
pub struct Gateway {
    /// Capabilities keyed by provider identifier.
    pub registry: ProviderRegistry,
    /// Shared downloader for media references.
    pub fetcher: Arc<HttpFetcher>,
    /// Object storage, when configured. GCS is preferred; S3 is the
    /// fallback backend.
    pub store: Option<Arc<dyn ObjectStore>>,
}

impl Gateway {
    /// Build a gateway from environment credentials.
    ///
    /// Provider families without credentials are skipped with a warning;
    /// a step naming one of their providers then fails with
    /// `UnsupportedProvider`.
    pub fn from_env() -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new()?);
        let mut registry = ProviderRegistry::new();

        match GeminiClient::from_env() {
            Ok(client) => {
                let client = Arc::new(client);
                registry.register_image(
                    ids::IMAGEN_3,
                    Arc::new(GeminiImageProvider {
                        client: client.clone(),
                        model: ids::IMAGEN_3.to_string(),
                    }),
                );
                registry.register_image(
                    ids::GEMINI_FLASH_IMAGE,
                    Arc::new(GeminiImageProvider {
                        client: client.clone(),
                        model: ids::GEMINI_FLASH_IMAGE.to_string(),
                    }),
                );
                registry.register_video(
                    ids::VEO_3_PREVIEW,
                    Arc::new(GeminiVideoProvider {
                        client,
                        fetcher: fetcher.clone(),
                    }),
                );
            }
            Err(error) => warn!(%error, "gemini providers unavailable"),
        }

        match OpenAiClient::from_env() {
            Ok(client) => {
                let client = Arc::new(client);
                for model in [ids::GPT_IMAGE_1, ids::DALL_E_3] {
                    registry.register_image(
                        model,
                        Arc::new(OpenAiImageProvider {
                            client: client.clone(),
                            model: model.to_string(),
                            fetcher: fetcher.clone(),
                        }),
                    );
                }
            }
            Err(error) => warn!(%error, "openai providers unavailable"),
        }

        match ReplicateClient::from_env() {
            Ok(client) => {
                let client = Arc::new(client);
                for (id, slug) in REPLICATE_IMAGE_MODELS {
                    registry.register_image(
                        *id,
                        Arc::new(ReplicateImageProvider {
                            client: client.clone(),
                            model: slug.to_string(),
                        }),
                    );
                }
                for model in [ids::SEEDANCE_1, ids::SEEDANCE_1_LITE] {
                    registry.register_video(
                        model,
                        Arc::new(ReplicateVideoProvider {
                            client: client.clone(),
                            model: model.to_string(),
                        }),
                    );
                }
            }
            Err(error) => warn!(%error, "replicate providers unavailable"),
        }

        let store: Option<Arc<dyn ObjectStore>> = match GcsStore::from_env() {
            Ok(store) => Some(Arc::new(store)),
            Err(gcs_error) => match S3Store::from_env() {
                Ok(store) => Some(Arc::new(store)),
                Err(s3_error) => {
                    warn!(%gcs_error, %s3_error, "object storage unavailable");
                    None
                }
            },
        };

        Ok(Self {
            registry,
            fetcher,
            store,
        })
    }
}

struct GeminiImageProvider {
    client: Arc<GeminiClient>,
    model: String,
}

#[async_trait]
impl ImageGenerator for GeminiImageProvider {
    async fn generate(&self, prompt: &str) -> Result<MediaArtifact> {
        let bytes = self.client.generate_image(&self.model, prompt).await?;
        Ok(MediaArtifact::Bytes(bytes))
    }

    async fn edit(&self, _prompt: &str, _image: &str) -> Result<MediaArtifact> {
        anyhow::bail!("image editing is not supported by {}", self.model)
    }
}

struct GeminiVideoProvider {
    client: Arc<GeminiClient>,
    fetcher: Arc<HttpFetcher>,
}

#[async_trait]
impl VideoGenerator for GeminiVideoProvider {
    async fn generate(&self, prompt: &str, first_frame: &str, last_frame: Option<&str>) -> Result<MediaArtifact> {
        let first = self.fetcher.download(first_frame).await?;
        let last = match last_frame {
            Some(url) => Some(self.fetcher.download(url).await?),
            None => None,
        };
        let bytes = self
            .client
            .generate_video(VEO_3_PREVIEW_MODEL, prompt, &first, last.as_deref())
            .await?;
        Ok(MediaArtifact::Bytes(bytes))
    }
}

struct OpenAiImageProvider {
    client: Arc<OpenAiClient>,
    model: String,
    fetcher: Arc<HttpFetcher>,
}

#[async_trait]
impl ImageGenerator for OpenAiImageProvider {
    async fn generate(&self, prompt: &str) -> Result<MediaArtifact> {
        // Flagged prompts are rewritten rather than rejected outright.
        let prompt = if self.client.moderate(prompt).await? {
            warn!(model = %self.model, "prompt flagged by moderation, sanitizing");
            self.client.sanitize_prompt(prompt).await?
        } else {
            prompt.to_string()
        };
        let bytes = self.client.generate_image(&self.model, &prompt).await?;
        Ok(MediaArtifact::Bytes(bytes))
    }

    async fn edit(&self, prompt: &str, image: &str) -> Result<MediaArtifact> {
        let source = self.fetcher.download(image).await?;
        let bytes = self.client.edit_image(&self.model, prompt, source).await?;
        Ok(MediaArtifact::Bytes(bytes))
    }
}

struct ReplicateImageProvider {
    client: Arc<ReplicateClient>,
    model: String,
}

#[async_trait]
impl ImageGenerator for ReplicateImageProvider {
    async fn generate(&self, prompt: &str) -> Result<MediaArtifact> {
        let url = self.client.run(&self.model, prompt, JsonMap::new()).await?;
        Ok(MediaArtifact::Url(url))
    }

    async fn edit(&self, prompt: &str, image: &str) -> Result<MediaArtifact> {
        let mut options = JsonMap::new();
        options.insert("image".to_string(), Value::String(image.to_string()));
        let url = self.client.run(&self.model, prompt, options).await?;
        Ok(MediaArtifact::Url(url))
    }
}

struct ReplicateVideoProvider {
    client: Arc<ReplicateClient>,
    model: String,
}

#[async_trait]
impl VideoGenerator for ReplicateVideoProvider {
    async fn generate(&self, prompt: &str, first_frame: &str, last_frame: Option<&str>) -> Result<MediaArtifact> {
        let mut options = JsonMap::new();
        options.insert("image".to_string(), Value::String(first_frame.to_string()));
        if let Some(last_frame) = last_frame {
            options.insert("last_frame_image".to_string(), Value::String(last_frame.to_string()));
        }
        let url = self.client.run(&self.model, prompt, options).await?;
        Ok(MediaArtifact::Url(url))
    }
}

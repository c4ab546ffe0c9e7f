//! Provider identifiers and the capability registry.
//!
//! Function types are a closed enumeration, but providers are an open set:
//! new backends are added by registering a capability under an identifier
//! string, not by editing the dispatcher. Each capability kind carries a
//! default identifier used when a step names no provider.

use std::{collections::HashMap, sync::Arc};

use crate::collab::{ImageGenerator, VideoGenerator};
use crate::error::StepError;

/// Identifiers for the provider backends wired by default.
///
/// Not exhaustive; any string registered with the registry is a valid
/// provider identifier.
pub mod ids {
    pub const GPT_IMAGE_1: &str = "gpt-image-1";
    pub const IMAGEN_3: &str = "imagen-3.0-generate-002";
    pub const GEMINI_FLASH_IMAGE: &str = "gemini-2.0-flash-exp-image-generation";
    pub const DALL_E_3: &str = "dall-e-3";
    pub const LEONARDO_KINO_XL: &str = "leonardo-kino-xl";
    pub const LEONARDO_DIFFUSION_XL: &str = "leonardo-diffusion-xl";
    pub const LEONARDO_ANIME_XL: &str = "leonardo-anime-xl";
    pub const LEONARDO_LIGHTNING: &str = "leonardo-lightning";
    pub const LUMA_PHOTON: &str = "luma/photon";
    pub const LUMA_PHOTON_FLASH: &str = "luma/photon-flash";
    pub const STABILITY_SD3: &str = "stability-sd3";
    pub const FLUX_SCHNELL: &str = "flux-schnell";
    pub const SANA: &str = "sana";
    pub const SEEDANCE_1: &str = "bytedance/seedance-1";
    pub const SEEDANCE_1_LITE: &str = "bytedance/seedance-1-lite";
    pub const VEO_3_PREVIEW: &str = "veo-3.0-generate-preview";
}

/// Default image backend when a step names none.
pub const DEFAULT_IMAGE_PROVIDER: &str = ids::IMAGEN_3;
/// Default video backend when a step names none.
pub const DEFAULT_VIDEO_PROVIDER: &str = ids::VEO_3_PREVIEW;

/// Open mapping from provider identifier to capability implementation.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    image: HashMap<String, Arc<dyn ImageGenerator>>,
    video: HashMap<String, Arc<dyn VideoGenerator>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an image capability under `id`, replacing any previous one.
    pub fn register_image(&mut self, id: impl Into<String>, capability: Arc<dyn ImageGenerator>) {
        self.image.insert(id.into(), capability);
    }

    /// Register a video capability under `id`, replacing any previous one.
    pub fn register_video(&mut self, id: impl Into<String>, capability: Arc<dyn VideoGenerator>) {
        self.video.insert(id.into(), capability);
    }

    /// Identifiers with a registered image capability.
    pub fn image_provider_ids(&self) -> impl Iterator<Item = &str> {
        self.image.keys().map(String::as_str)
    }

    /// Identifiers with a registered video capability.
    pub fn video_provider_ids(&self) -> impl Iterator<Item = &str> {
        self.video.keys().map(String::as_str)
    }

    /// Select the image capability for a step's provider field.
    ///
    /// `None` or an empty string selects [`DEFAULT_IMAGE_PROVIDER`].
    pub fn image_for(&self, provider: Option<&str>) -> Result<Arc<dyn ImageGenerator>, StepError> {
        let id = effective_id(provider, DEFAULT_IMAGE_PROVIDER);
        self.image
            .get(id)
            .cloned()
            .ok_or_else(|| StepError::UnsupportedProvider(id.to_string()))
    }

    /// Select the video capability for a step's provider field.
    ///
    /// `None` or an empty string selects [`DEFAULT_VIDEO_PROVIDER`].
    pub fn video_for(&self, provider: Option<&str>) -> Result<Arc<dyn VideoGenerator>, StepError> {
        let id = effective_id(provider, DEFAULT_VIDEO_PROVIDER);
        self.video
            .get(id)
            .cloned()
            .ok_or_else(|| StepError::UnsupportedProvider(id.to_string()))
    }
}

fn effective_id<'a>(provider: Option<&'a str>, default: &'a str) -> &'a str {
    match provider {
        Some(id) if !id.is_empty() => id,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::MediaArtifact;
    use anyhow::Result;
    use async_trait::async_trait;

    struct FixedVideo;

    #[async_trait]
    impl VideoGenerator for FixedVideo {
        async fn generate(&self, _prompt: &str, _first_frame: &str, _last_frame: Option<&str>) -> Result<MediaArtifact> {
            Ok(MediaArtifact::Url("https://cdn.example/clip.mp4".into()))
        }
    }

    #[test]
    fn empty_provider_selects_the_default() {
        let mut registry = ProviderRegistry::new();
        registry.register_video(DEFAULT_VIDEO_PROVIDER, Arc::new(FixedVideo));
        assert!(registry.video_for(None).is_ok());
        assert!(registry.video_for(Some("")).is_ok());
    }

    #[test]
    fn unknown_provider_is_rejected_with_its_identifier() {
        let registry = ProviderRegistry::new();
        let err = registry.video_for(Some("betamax-9000")).expect_err("must fail");
        match err {
            StepError::UnsupportedProvider(id) => assert_eq!(id, "betamax-9000"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_default_reports_the_default_identifier() {
        let registry = ProviderRegistry::new();
        let err = registry.video_for(None).expect_err("must fail");
        match err {
            StepError::UnsupportedProvider(id) => assert_eq!(id, DEFAULT_VIDEO_PROVIDER),
            other => panic!("unexpected error: {other}"),
        }
    }
}

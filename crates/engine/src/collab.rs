//! Collaborator contracts the engine consumes.
//!
//! The dispatcher never talks to a provider SDK, object store, or media
//! tool directly; it goes through these narrow async traits. Concrete
//! implementations live in the `clipflow-providers` and `clipflow-media`
//! crates, and tests substitute in-memory fakes.

use anyhow::Result;
use async_trait::async_trait;

use crate::value::StepValue;

/// Output of a generation call: either raw bytes or a URL the provider
/// stored the media at.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaArtifact {
    /// The media content itself.
    Bytes(Vec<u8>),
    /// A URL pointing at the stored media.
    Url(String),
}

impl From<MediaArtifact> for StepValue {
    fn from(artifact: MediaArtifact) -> Self {
        match artifact {
            MediaArtifact::Bytes(bytes) => StepValue::Bytes(bytes),
            MediaArtifact::Url(url) => StepValue::Url(url),
        }
    }
}

/// Generates and edits images from prompts.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generate an image from a prompt.
    async fn generate(&self, prompt: &str) -> Result<MediaArtifact>;

    /// Edit the image at `image` (a URL) guided by a prompt.
    async fn edit(&self, prompt: &str, image: &str) -> Result<MediaArtifact>;
}

/// Generates video clips from a prompt and one or two frames.
///
/// Providers that run long jobs poll internally and return only once the
/// clip is ready; the engine waits synchronously on the call. Dropping the
/// future cancels any in-flight polling.
#[async_trait]
pub trait VideoGenerator: Send + Sync {
    /// Generate a clip. When `last_frame` is `None` only the start frame is
    /// supplied and the provider infers the remainder of the clip.
    async fn generate(&self, prompt: &str, first_frame: &str, last_frame: Option<&str>) -> Result<MediaArtifact>;
}

impl std::fmt::Debug for dyn VideoGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn VideoGenerator")
    }
}

/// Combines media buffers using a local tool.
#[async_trait]
pub trait MediaCombiner: Send + Sync {
    /// Concatenate the clips in order into one video buffer.
    async fn combine(&self, clips: &[Vec<u8>]) -> Result<Vec<u8>>;

    /// Overlay `audio` onto `video`. Audio shorter than the video loops to
    /// cover the full duration; longer audio is truncated.
    async fn overlay_audio(&self, video: &[u8], audio: &[u8]) -> Result<Vec<u8>>;
}

/// Downloads a URL into a byte buffer.
#[async_trait]
pub trait UrlFetcher: Send + Sync {
    async fn download(&self, url: &str) -> Result<Vec<u8>>;
}

/// Stores a byte buffer and returns a public URL for it.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload `data`, optionally under `object_name`; a name is generated
    /// when none is given.
    async fn upload(&self, data: &[u8], object_name: Option<&str>) -> Result<String>;
}

//! # Clipflow Providers
//!
//! Generative-media provider clients and the gateway that wires them into
//! the engine's capability registry.
//!
//! - **`gemini`**: Imagen image generation and Veo video generation, with
//!   long-running-operation polling
//! - **`replicate`**: Replicate predictions (Seedance video, hosted image
//!   models) with version lookup and polling
//! - **`openai`**: gpt-image-1 / DALL-E 3 image generation and editing,
//!   moderation checks, and prompt sanitization
//! - **`storage`**: GCS and S3 object uploads returning public URLs
//! - **`fetch`**: plain HTTP downloader for media references
//! - **`gateway`**: environment-driven registry construction
//!
//! Credentials are discovered from environment variables at gateway
//! construction; provider families without credentials are simply not
//! registered.

pub mod fetch;
pub mod gateway;
pub mod gemini;
pub mod openai;
pub mod replicate;
pub mod storage;

pub use fetch::HttpFetcher;
pub use gateway::Gateway;
pub use gemini::GeminiClient;
pub use openai::OpenAiClient;
pub use replicate::ReplicateClient;
pub use storage::{GcsStore, S3Store};

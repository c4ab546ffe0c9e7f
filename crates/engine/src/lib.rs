//! # Clipflow Engine
//!
//! Step-execution engine for generative-media workflows. A workflow is an
//! ordered list of typed steps; the engine resolves `${name}` variable
//! references between steps and caller-supplied inputs, dispatches each
//! step to a provider capability selected by its function-type tag, and
//! accumulates intermediate results keyed by step identifier.
//!
//! ## Architecture
//!
//! - **`model`**: workflow and step data structures
//! - **`value`**: the typed values flowing through a run
//! - **`resolve`**: `${name}` template interpolation
//! - **`provider`**: provider identifiers and the capability registry
//! - **`collab`**: collaborator contracts (providers, media tool, storage)
//! - **`runner`**: the sequential workflow runner
//! - **`error`**: the error taxonomy
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use clipflow_engine::{ProviderRegistry, Workflow, WorkflowEngine};
//! use clipflow_engine::value::ValueMap;
//! # use clipflow_engine::collab::{MediaCombiner, UrlFetcher};
//! # async fn demo(combiner: Arc<dyn MediaCombiner>, fetcher: Arc<dyn UrlFetcher>) -> anyhow::Result<()> {
//! let workflow: Workflow = serde_yaml::from_str(r#"
//! steps:
//!   - id: caption
//!     function_type: texts_to_text
//!     prompt: "a short film about ${topic}"
//! "#)?;
//!
//! let engine = WorkflowEngine::new(ProviderRegistry::new(), combiner, fetcher);
//! let inputs = ValueMap::new();
//! let outcome = engine.generate(Some(&workflow), &inputs).await?;
//! # Ok(())
//! # }
//! ```

use std::{fs, path::Path};

use anyhow::{Context, Result};

pub mod collab;
pub mod error;
pub mod model;
pub mod provider;
pub mod resolve;
pub mod runner;
pub mod value;

pub use collab::{ImageGenerator, MediaArtifact, MediaCombiner, ObjectStore, UrlFetcher, VideoGenerator};
pub use error::{EngineError, StepError};
pub use model::{FunctionType, Workflow, WorkflowStep};
pub use provider::{DEFAULT_IMAGE_PROVIDER, DEFAULT_VIDEO_PROVIDER, ProviderRegistry};
pub use runner::{RunOutcome, WorkflowEngine, validate_steps};
pub use value::{StepValue, ValueMap};

/// Load a workflow definition from a YAML or JSON file.
///
/// YAML parsing accepts JSON documents as well, so no extension sniffing
/// is needed.
pub fn parse_workflow_file(file_path: impl AsRef<Path>) -> Result<Workflow> {
    let file_path = file_path.as_ref();
    let content = fs::read_to_string(file_path).with_context(|| format!("failed to read workflow file: {}", file_path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("failed to parse workflow file: {}", file_path.display()))
}

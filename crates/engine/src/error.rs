//! Error taxonomy for workflow execution.
//!
//! Step-level failures are wrapped in [`EngineError::Step`] carrying the
//! failing step's identifier; the underlying cause is preserved as the
//! error source. The engine performs no retries and no local recovery;
//! everything surfaces to the caller of `generate`.

use thiserror::Error;

/// A failure raised while processing a single workflow step.
#[derive(Debug, Error)]
pub enum StepError {
    /// A field the step's function type requires is empty or absent.
    #[error("missing required field '{0}' in step configuration")]
    MissingField(&'static str),

    /// A media reference resolved in neither the results nor inputs scope.
    #[error("reference '{0}' not found in step results or inputs")]
    ReferenceNotFound(String),

    /// A resolved media reference is neither a byte buffer nor a URL string.
    #[error("reference '{0}' is neither a byte buffer nor a URL")]
    TypeMismatch(String),

    /// The step's function type tag is not recognized.
    #[error("unsupported function type: {0}")]
    UnsupportedFunctionType(String),

    /// The step names a provider no capability is registered for.
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// A provider call, download, upload, or media subprocess failed.
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

/// A failure raised by the workflow runner.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No workflow was supplied.
    #[error("no workflow supplied")]
    MissingWorkflow,

    /// A step has an empty identifier.
    #[error("workflow contains a step with an empty id")]
    EmptyStepId,

    /// Two steps share an identifier; a later result would silently
    /// overwrite an earlier one, so this is rejected before execution.
    #[error("duplicate step id '{0}' in workflow")]
    DuplicateStepId(String),

    /// A step failed; the whole run is aborted.
    #[error("processing workflow step '{step_id}'")]
    Step {
        /// Identifier of the failing step.
        step_id: String,
        /// Underlying cause.
        #[source]
        source: StepError,
    },
}

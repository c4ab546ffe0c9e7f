//! # Workflow Model Definitions
//!
//! Core data structures describing generative-media workflows: a [`Workflow`]
//! is an ordered list of [`WorkflowStep`]s, each tagged with a
//! [`FunctionType`] that selects which transformation the step performs.
//! All structures deserialize from both YAML and JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The category of transformation a workflow step performs.
///
/// Wire tags use snake_case (`texts_to_text`, `videos_to_video`, ...).
/// Unrecognized tags are preserved as [`FunctionType::Unknown`] so the
/// dispatcher can report the offending value instead of failing at parse
/// time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FunctionType {
    /// Pure template resolution: the interpolated prompt is the result.
    TextsToText,
    /// Generate an image from a prompt.
    TextToImage,
    /// Edit an existing image guided by a prompt.
    TextAndImageToImage,
    /// Generate a video from a prompt plus first and last frames.
    TextAndImagesToVideo,
    /// Generate a video from a prompt plus a start frame only.
    TextAndImageToVideo,
    /// Concatenate previously produced video buffers in order.
    VideosToVideo,
    /// Overlay an audio track onto a video.
    VideoAndAudioToVideo,
    /// Any tag this engine does not recognize.
    Unknown(String),
}

impl FunctionType {
    /// The snake_case wire tag for this function type.
    pub fn as_tag(&self) -> &str {
        match self {
            FunctionType::TextsToText => "texts_to_text",
            FunctionType::TextToImage => "text_to_image",
            FunctionType::TextAndImageToImage => "text_and_image_to_image",
            FunctionType::TextAndImagesToVideo => "text_and_images_to_video",
            FunctionType::TextAndImageToVideo => "text_and_image_to_video",
            FunctionType::VideosToVideo => "videos_to_video",
            FunctionType::VideoAndAudioToVideo => "video_and_audio_to_video",
            FunctionType::Unknown(tag) => tag,
        }
    }
}

impl Default for FunctionType {
    fn default() -> Self {
        FunctionType::TextsToText
    }
}

impl From<String> for FunctionType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "texts_to_text" => FunctionType::TextsToText,
            "text_to_image" => FunctionType::TextToImage,
            "text_and_image_to_image" => FunctionType::TextAndImageToImage,
            "text_and_images_to_video" => FunctionType::TextAndImagesToVideo,
            "text_and_image_to_video" => FunctionType::TextAndImageToVideo,
            "videos_to_video" => FunctionType::VideosToVideo,
            "video_and_audio_to_video" => FunctionType::VideoAndAudioToVideo,
            _ => FunctionType::Unknown(tag),
        }
    }
}

impl From<FunctionType> for String {
    fn from(function_type: FunctionType) -> Self {
        match function_type {
            FunctionType::Unknown(tag) => tag,
            other => other.as_tag().to_string(),
        }
    }
}

/// A single unit of work within a workflow.
///
/// Which optional fields are required is determined by `function_type`.
/// String fields may be literal values or templates containing `${name}`
/// placeholders resolved against caller inputs and earlier step results.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkflowStep {
    /// Unique identifier within the workflow; the step's result is stored
    /// under this name and later steps may reference it.
    pub id: String,

    /// Selects the handler for this step.
    pub function_type: FunctionType,

    /// Backend implementing the function type; `None` selects the
    /// function type's default provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Prompt template for generation steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    /// Source image reference for image-edit steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Start frame reference for video generation steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_image: Option<String>,

    /// End frame reference for video generation steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_image: Option<String>,

    /// Video reference for audio-overlay steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,

    /// Audio reference for audio-overlay steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,

    /// Ordered references to video buffers to concatenate; merge order
    /// follows list order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub videos: Vec<String>,
}

/// An ordered sequence of steps for content generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Optional human-readable workflow name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Steps executed strictly in order.
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,

    /// Creation timestamp.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// Free-form output label, passed through to the run outcome verbatim.
    /// It is not resolved against step results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl Workflow {
    /// Construct an unnamed workflow from a list of steps.
    pub fn new(steps: Vec<WorkflowStep>) -> Self {
        Self {
            name: None,
            steps,
            created_at: Utc::now(),
            output: None,
        }
    }
}

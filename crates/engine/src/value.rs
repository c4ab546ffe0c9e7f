//! Typed values flowing through a workflow run.
//!
//! Caller inputs and step results share one sum type, [`StepValue`], so a
//! step consuming a prior result can reject an unusable value at the
//! boundary rather than deep inside a collaborator call.

use indexmap::IndexMap;
use serde_json::Value;

/// A value produced by a step or supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum StepValue {
    /// Plain text, e.g. a resolved prompt.
    Text(String),
    /// Raw media bytes.
    Bytes(Vec<u8>),
    /// A URL pointing at remotely stored media.
    Url(String),
    /// Structured provider output that is neither text nor media.
    Json(Value),
}

/// Order-preserving mapping used for both caller inputs and step results.
pub type ValueMap = IndexMap<String, StepValue>;

impl StepValue {
    /// Render the value as a string for template interpolation.
    ///
    /// Text and URLs render verbatim. Byte buffers render as a short
    /// descriptor since splicing raw media into a prompt is never useful.
    /// JSON renders compactly.
    pub fn render(&self) -> String {
        match self {
            StepValue::Text(text) => text.clone(),
            StepValue::Url(url) => url.clone(),
            StepValue::Bytes(bytes) => format!("[{} bytes]", bytes.len()),
            StepValue::Json(value) => value.to_string(),
        }
    }

    /// Borrow the underlying bytes, if this value is a byte buffer.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            StepValue::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Borrow the underlying text, for both plain text and URL values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            StepValue::Text(text) => Some(text),
            StepValue::Url(url) => Some(url),
            _ => None,
        }
    }
}

impl From<String> for StepValue {
    fn from(text: String) -> Self {
        StepValue::Text(text)
    }
}

impl From<&str> for StepValue {
    fn from(text: &str) -> Self {
        StepValue::Text(text.to_string())
    }
}

impl From<Vec<u8>> for StepValue {
    fn from(bytes: Vec<u8>) -> Self {
        StepValue::Bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn render_is_verbatim_for_text_and_urls() {
        assert_eq!(StepValue::Text("hello".into()).render(), "hello");
        assert_eq!(StepValue::Url("https://cdn.example/v.mp4".into()).render(), "https://cdn.example/v.mp4");
    }

    #[test]
    fn render_describes_bytes_instead_of_dumping_them() {
        assert_eq!(StepValue::Bytes(vec![0u8; 16]).render(), "[16 bytes]");
    }

    #[test]
    fn render_serializes_json_compactly() {
        assert_eq!(StepValue::Json(json!({"id": 7})).render(), r#"{"id":7}"#);
    }
}

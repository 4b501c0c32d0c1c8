//! Type definitions for the assistant dialect (Anthropic Messages shape).
//!
//! Every inbound field is optional with an explicit default, so any JSON object
//! that decodes is a valid request and translation never fails.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Request types (what the caller sends TO us)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
    Other(serde_json::Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub content: Option<MessageContent>,
}

fn default_role() -> String {
    "user".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
    Other(serde_json::Value),
}

/// Only text survives translation. Images, tool_use, tool_result, untyped
/// entries and bare strings inside the array land in `Other` and are dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentBlock {
    Text(TextBlock),
    Other(serde_json::Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBlock {
    #[serde(rename = "type")]
    pub kind: TextKind,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextKind {
    #[serde(rename = "text")]
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Response types (what we send BACK to the caller)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub response_type: String, // "message"
    pub role: String,          // "assistant"
    pub content: Vec<ResponseContentBlock>,
    pub model: String,
    pub stop_reason: Option<String>,
    pub stop_sequence: Option<String>,
    pub usage: Usage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResponseContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

// ---------------------------------------------------------------------------
// Streaming event types (SSE frames we send back to the caller)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "message_start")]
    MessageStart { message: AssistantResponse },
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { index: usize, delta: Delta },
    #[serde(rename = "error")]
    Error { error: ErrorBody },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Delta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
}

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error_type: &str, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                error_type: error_type.to_string(),
                message: message.into(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn concat_text(blocks: &[ContentBlock], separator: &str) -> String {
    blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text(block) => block.text.as_deref(),
            ContentBlock::Other(_) => None,
        })
        .collect::<Vec<_>>()
        .join(separator)
}

impl SystemContent {
    pub fn as_text(&self) -> String {
        match self {
            SystemContent::Text(t) => t.clone(),
            SystemContent::Blocks(blocks) => concat_text(blocks, "\n"),
            SystemContent::Other(_) => String::new(),
        }
    }
}

impl MessageContent {
    /// Flatten to the text the provider dialect can carry.
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Blocks(blocks) => concat_text(blocks, ""),
            MessageContent::Other(_) => String::new(),
        }
    }
}

impl AssistantRequest {
    pub fn is_streaming(&self) -> bool {
        self.stream.unwrap_or(false)
    }
}

impl AssistantResponse {
    /// The skeleton announced by `message_start` before any text arrives.
    pub fn started(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            response_type: "message".to_string(),
            role: "assistant".to_string(),
            content: Vec::new(),
            model: model.into(),
            stop_reason: None,
            stop_sequence: None,
            usage: Usage::default(),
        }
    }
}

impl StreamEvent {
    pub fn text_delta(text: impl Into<String>) -> Self {
        StreamEvent::ContentBlockDelta {
            index: 0,
            delta: Delta::TextDelta { text: text.into() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_decodes() {
        let req: AssistantRequest = serde_json::from_str("{}").unwrap();
        assert!(req.model.is_none());
        assert!(req.messages.is_empty());
        assert!(!req.is_streaming());
    }

    #[test]
    fn test_unknown_blocks_are_kept_as_other() {
        let content: MessageContent = serde_json::from_value(serde_json::json!([
            {"type": "text", "text": "a"},
            {"type": "image", "source": {"type": "base64", "media_type": "image/png", "data": "AAAA"}},
            {"type": "tool_result", "tool_use_id": "t1", "content": "x"},
            {"type": "text", "text": "b"}
        ]))
        .unwrap();

        match &content {
            MessageContent::Blocks(blocks) => {
                assert_eq!(blocks.len(), 4);
                assert!(matches!(blocks[1], ContentBlock::Other(_)));
            }
            other => panic!("Expected blocks, got {other:?}"),
        }
        assert_eq!(content.as_text(), "ab");
    }

    #[test]
    fn test_system_blocks_join_with_newline() {
        let system: SystemContent = serde_json::from_value(serde_json::json!([
            {"type": "text", "text": "one"},
            {"type": "text", "text": "two"}
        ]))
        .unwrap();
        assert_eq!(system.as_text(), "one\ntwo");
    }

    #[test]
    fn test_delta_event_shape() {
        let json = serde_json::to_value(StreamEvent::text_delta("Hi")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "content_block_delta",
                "index": 0,
                "delta": {"type": "text_delta", "text": "Hi"}
            })
        );
    }
}

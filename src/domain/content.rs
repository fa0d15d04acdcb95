//! Content items and call results carried inside JSON-RPC `result` payloads

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_TOOL_ERROR: &str = "An error occurred during tool execution";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Audio {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Resource {
        resource: Value,
    },
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<Content>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_error: bool,
}

impl CallToolResult {
    pub fn success(content: Content) -> Self {
        Self {
            content: vec![content],
            is_error: false,
        }
    }

    /// A tool that ran but reports failure. Empty messages fall back to a generic text.
    pub fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        let text = if message.trim().is_empty() {
            DEFAULT_TOOL_ERROR.to_string()
        } else {
            message
        };
        Self {
            content: vec![Content::text(text)],
            is_error: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[default]
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: Content,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetPromptResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub messages: Vec<PromptMessage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Text,
    Blob,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    pub uri: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
}

impl ResourceContents {
    pub fn new(uri: &str, mime_type: &str, payload: String, kind: PayloadKind) -> Self {
        let (text, blob) = match kind {
            PayloadKind::Text => (Some(payload), None),
            PayloadKind::Blob => (None, Some(payload)),
        };
        Self {
            uri: uri.to_string(),
            mime_type: mime_type.to_string(),
            text,
            blob,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadResourceResult {
    pub contents: Vec<ResourceContents>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn successful_result_omits_error_flag() {
        let value = serde_json::to_value(CallToolResult::success(Content::text("ok")))
            .expect("serializes");
        assert_eq!(value, json!({ "content": [{ "type": "text", "text": "ok" }] }));
    }

    #[test]
    fn failure_with_empty_message_uses_default_text() {
        let result = CallToolResult::failure("  ");
        assert!(result.is_error);
        assert_eq!(result.content[0].as_text(), Some(DEFAULT_TOOL_ERROR));
    }

    #[test]
    fn image_content_uses_camel_case_mime_type() {
        let value = serde_json::to_value(Content::Image {
            data: "abc".to_string(),
            mime_type: "image/png".to_string(),
        })
        .expect("serializes");
        assert_eq!(
            value,
            json!({ "type": "image", "data": "abc", "mimeType": "image/png" })
        );
    }

    #[test]
    fn resource_contents_pick_text_or_blob_field() {
        let text = ResourceContents::new("res://a", "text/csv", "a,b".to_string(), PayloadKind::Text);
        let blob = ResourceContents::new("res://b", "image/png", "data:".to_string(), PayloadKind::Blob);
        assert_eq!(text.text.as_deref(), Some("a,b"));
        assert!(text.blob.is_none());
        assert_eq!(blob.blob.as_deref(), Some("data:"));
        assert!(blob.text.is_none());
    }
}

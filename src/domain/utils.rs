//! Shared helpers for capability handlers: payload encoding, input validation,
//! and failure normalization.

use std::{any::Any, fmt::Debug};

use base64::Engine as _;
use serde::Serialize;
use serde_json::{json, Value};

use crate::domain::content::{Content, DEFAULT_TOOL_ERROR};
use crate::mcp::rpc::McpError;
use crate::schema::Schema;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobData {
    Text(String),
    Bytes(Vec<u8>),
}

impl From<String> for BlobData {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for BlobData {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for BlobData {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<&[u8]> for BlobData {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

pub fn is_text_mime(mime_type: &str) -> bool {
    mime_type.trim().to_ascii_lowercase().starts_with("text/")
}

/// Strings and `text/*` bytes pass through verbatim, other bytes become a base64 data URL.
pub fn to_data_url(data: BlobData, mime_type: &str) -> String {
    match data {
        BlobData::Text(text) => text,
        BlobData::Bytes(bytes) if is_text_mime(mime_type) => {
            String::from_utf8_lossy(&bytes).into_owned()
        }
        BlobData::Bytes(bytes) => format!(
            "data:{mime_type};base64,{}",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        ),
    }
}

pub fn blob_content(data: BlobData, mime_type: &str) -> Content {
    let data = to_data_url(data, mime_type);
    if mime_type.starts_with("audio/") {
        Content::Audio {
            data,
            mime_type: mime_type.to_string(),
        }
    } else {
        Content::Image {
            data,
            mime_type: mime_type.to_string(),
        }
    }
}

/// JSON text of `value`, or its `Debug` rendering when serialization fails.
pub fn safe_stringify<T: Serialize + Debug + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("{value:?}"))
}

pub fn validate_input(schema: Option<&dyn Schema>, raw: Option<Value>) -> Result<Value, McpError> {
    let Some(schema) = schema else {
        return Ok(raw.unwrap_or(Value::Null));
    };

    let input = raw.unwrap_or_else(|| json!({}));
    schema
        .validate(&input)
        .map_err(|errors| McpError::invalid_params().with_data(json!({ "errors": errors })))
}

pub fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = panic.downcast_ref::<String>() {
        return message.clone();
    }
    DEFAULT_TOOL_ERROR.to_string()
}

/// Accepts `type/subtype` with token characters on both sides.
pub fn is_valid_mime_type(mime_type: &str) -> bool {
    let Some((kind, subtype)) = mime_type.split_once('/') else {
        return false;
    };
    let is_token = |part: &str| {
        !part.is_empty()
            && part.chars().all(|character| {
                character.is_ascii_alphanumeric() || "!#$&-^_.+".contains(character)
            })
    };
    is_token(kind) && is_token(subtype)
}

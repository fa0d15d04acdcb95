//! JSON-RPC protocol representations and formatting utilities
//!
//! Holds the fixed error taxonomy and maps [`McpError`] values onto JSON-RPC envelopes.

use rust_mcp_sdk::schema::{
    JsonrpcErrorResponse, JsonrpcResultResponse, RequestId, Result as McpResult, RpcError,
};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    ResourceNotFound,
}

impl ErrorCode {
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ResourceNotFound => -32002,
        }
    }

    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid parameters",
            Self::InternalError => "Internal error",
            Self::ResourceNotFound => "Resource not found",
        }
    }
}

/// A protocol-level failure: the method itself did not produce a result.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} ({})", .kind.code())]
pub struct McpError {
    pub kind: ErrorCode,
    pub message: String,
    pub data: Option<Value>,
}

impl McpError {
    pub fn new(kind: ErrorCode) -> Self {
        Self {
            kind,
            message: kind.default_message().to_string(),
            data: None,
        }
    }

    pub fn with_message(kind: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            return Self::new(kind);
        }
        Self {
            kind,
            message,
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn method_not_found() -> Self {
        Self::new(ErrorCode::MethodNotFound)
    }

    pub fn invalid_params() -> Self {
        Self::new(ErrorCode::InvalidParams)
    }

    pub fn internal() -> Self {
        Self::new(ErrorCode::InternalError)
    }

    pub fn resource_not_found(uri: &str) -> Self {
        Self::new(ErrorCode::ResourceNotFound).with_data(json!({ "uri": uri }))
    }

    pub fn code(&self) -> i32 {
        self.kind.code()
    }
}

/// Incoming envelope. `id` presence is checked on the raw value before decoding,
/// since `Option<Value>` cannot tell a missing id from `null`.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

pub fn is_json_rpc_error(value: &Value) -> bool {
    value.get("error").is_some()
}

pub fn mcp_error_to_json_rpc(id: Option<Value>, err: &McpError) -> Value {
    json_rpc_error_with_data(id, err.code(), &err.message, err.data.clone())
}

pub fn json_rpc_error(id: Option<Value>, kind: ErrorCode) -> Value {
    json_rpc_error_with_data(id, kind.code(), kind.default_message(), None)
}

pub fn json_rpc_error_with_data(
    id: Option<Value>,
    code: i32,
    message: &str,
    data: Option<Value>,
) -> Value {
    // The SDK envelope drops a missing id, but a null id must still be written.
    let Some(request_id) = id.as_ref().and_then(value_to_request_id) else {
        return plain_error(id, code, message, data);
    };

    let response = JsonrpcErrorResponse::new(
        RpcError {
            code: i64::from(code),
            data: data.clone(),
            message: message.to_string(),
        },
        Some(request_id),
    );
    serde_json::to_value(response).unwrap_or_else(|_| plain_error(id, code, message, data))
}

pub fn json_rpc_result(id: Option<Value>, result: Value) -> Value {
    if let (Some(request_id), Some(extra)) = (
        id.as_ref().and_then(value_to_request_id),
        result.as_object().cloned(),
    ) {
        let response = JsonrpcResultResponse::new(
            request_id,
            McpResult {
                meta: None,
                extra: Some(extra),
            },
        );
        if let Ok(value) = serde_json::to_value(response) {
            return value;
        }
    }

    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "result": result
    })
}

fn plain_error(id: Option<Value>, code: i32, message: &str, data: Option<Value>) -> Value {
    let mut error = json!({ "code": code, "message": message });
    if let Some(data) = data {
        error["data"] = data;
    }
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": error
    })
}

pub fn value_to_request_id(value: &Value) -> Option<RequestId> {
    if let Some(string_id) = value.as_str() {
        return Some(RequestId::String(string_id.to_string()));
    }

    value.as_i64().map(RequestId::Integer)
}

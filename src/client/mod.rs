//! Client-side aggregation of remote capabilities
//!
//! Fetches a plug manifest through a [`transport::Transport`], filters tools by the
//! constants available locally and exposes the rest under collision-free names.

pub mod aggregator;
pub mod constants;
pub mod transport;

use serde_json::Value;
use thiserror::Error;

pub use aggregator::{AggregatedTool, Aggregator, ToolOutcome, ToolSet};
pub use transport::{HttpTransport, HttpTransportOptions, Transport};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode server response: {0}")]
    Decode(String),
    #[error("rpc error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<Value>,
    },
    #[error("unknown capability `{0}`")]
    UnknownCapability(String),
    #[error("arguments must be a JSON object")]
    InvalidArguments,
}

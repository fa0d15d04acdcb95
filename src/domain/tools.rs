//! Tool capabilities
//!
//! A [`ToolDraft`] collects the description, schemas and cost; attaching a handler
//! with [`ToolDraft::handle`] produces the immutable [`Tool`] the registry serves.

use std::{fmt, future::Future, panic::AssertUnwindSafe, sync::Arc};

use futures_util::{future::BoxFuture, FutureExt};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{error, warn};

use crate::domain::content::{CallToolResult, Content};
use crate::domain::listing::ToolDescriptor;
use crate::domain::utils::{blob_content, panic_message, safe_stringify, validate_input, BlobData};
use crate::mcp::{rpc::McpError, session::RequestContext};
use crate::schema::{empty_object_schema, Schema};

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

type ToolHandler =
    Arc<dyn Fn(ToolPayload) -> BoxFuture<'static, Result<ToolReturn, HandlerError>> + Send + Sync>;

/// What a tool handler hands back before normalization into a [`CallToolResult`].
#[derive(Debug, Clone, PartialEq)]
pub enum ToolReturn {
    Text(String),
    Content(Content),
    Failure(CallToolResult),
}

impl ToolReturn {
    pub fn json<T: Serialize + fmt::Debug + ?Sized>(value: &T) -> Self {
        Self::Text(safe_stringify(value))
    }

    fn into_result(self) -> CallToolResult {
        match self {
            Self::Text(text) => CallToolResult::success(Content::text(text)),
            Self::Content(content) => CallToolResult::success(content),
            Self::Failure(result) => result,
        }
    }
}

impl From<String> for ToolReturn {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for ToolReturn {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Value> for ToolReturn {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Self::Text(text),
            other => Self::Text(other.to_string()),
        }
    }
}

impl From<Content> for ToolReturn {
    fn from(value: Content) -> Self {
        Self::Content(value)
    }
}

pub struct ToolPayload {
    pub input: Value,
    pub context: RequestContext,
}

impl ToolPayload {
    pub fn session_id(&self) -> &str {
        &self.context.session_id
    }

    pub fn user_id(&self) -> &str {
        &self.context.user_id
    }

    pub fn input_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.input.clone())
    }

    /// A recoverable failure reported inside a successful RPC response.
    pub fn error(&self, message: impl Into<String>) -> ToolReturn {
        ToolReturn::Failure(CallToolResult::failure(message))
    }

    pub fn blob(&self, data: impl Into<BlobData>, mime_type: &str) -> ToolReturn {
        ToolReturn::Content(blob_content(data.into(), mime_type))
    }
}

pub fn tool(description: impl Into<String>) -> ToolDraft {
    ToolDraft {
        description: description.into(),
        input: None,
        output: None,
        cost: None,
    }
}

pub struct ToolDraft {
    description: String,
    input: Option<Arc<dyn Schema>>,
    output: Option<Arc<dyn Schema>>,
    cost: Option<u32>,
}

impl ToolDraft {
    pub fn input(mut self, schema: impl Schema + 'static) -> Self {
        self.input = Some(Arc::new(schema));
        self
    }

    pub fn output(mut self, schema: impl Schema + 'static) -> Self {
        self.output = Some(Arc::new(schema));
        self
    }

    pub fn cost(mut self, cost: u32) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn handle<F, Fut, R, E>(self, handler: F) -> Tool
    where
        F: Fn(ToolPayload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: Into<ToolReturn>,
        E: Into<HandlerError>,
    {
        let handler: ToolHandler = Arc::new(move |payload: ToolPayload| {
            let call = handler(payload);
            async move {
                let result: Result<ToolReturn, HandlerError> =
                    call.await.map(Into::into).map_err(Into::into);
                result
            }
            .boxed()
        });

        Tool {
            description: self.description,
            input: self.input,
            output: self.output,
            cost: self.cost,
            handler,
        }
    }
}

pub struct Tool {
    description: String,
    input: Option<Arc<dyn Schema>>,
    output: Option<Arc<dyn Schema>>,
    cost: Option<u32>,
    handler: ToolHandler,
}

impl Tool {
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_schema(&self) -> Value {
        self.input
            .as_ref()
            .map(|schema| schema.to_json_schema())
            .unwrap_or_else(empty_object_schema)
    }

    pub fn describe(&self, name: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: self.description.clone(),
            input_schema: self.input_schema(),
            output_schema: None,
            cost: None,
        }
    }

    /// Listing entry for `tools/io`, including output schema and cost.
    pub fn describe_io(&self, name: &str) -> ToolDescriptor {
        ToolDescriptor {
            output_schema: self.output.as_ref().map(|schema| schema.to_json_schema()),
            cost: self.cost,
            ..self.describe(name)
        }
    }

    /// Validation failures are protocol errors. Handler errors, panics and
    /// `error(..)` returns all become an error-flagged [`CallToolResult`].
    pub async fn invoke(
        &self,
        raw_input: Option<Value>,
        context: RequestContext,
    ) -> Result<CallToolResult, McpError> {
        let input = validate_input(self.input.as_deref(), raw_input)?;
        let handler = Arc::clone(&self.handler);
        let payload = ToolPayload { input, context };

        let outcome = AssertUnwindSafe(async move { handler(payload).await })
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(value)) => value.into_result(),
            Ok(Err(err)) => {
                warn!(error = %err, "tool handler returned an error");
                CallToolResult::failure(err.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(error = %message, "tool handler panicked");
                CallToolResult::failure(message)
            }
        };
        Ok(result)
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("description", &self.description)
            .field("cost", &self.cost)
            .finish_non_exhaustive()
    }
}

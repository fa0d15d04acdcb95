//! Prompt capabilities

use std::{fmt, future::Future, sync::Arc};

use futures_util::{future::BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::domain::content::{Content, GetPromptResult, PromptMessage, Role};
use crate::domain::listing::{PromptArgument, PromptDescriptor};
use crate::domain::utils::validate_input;
use crate::mcp::{
    rpc::{ErrorCode, McpError},
    session::RequestContext,
};
use crate::schema::{schema_properties, schema_required, Schema};

type PromptHandler =
    Arc<dyn Fn(PromptPayload) -> BoxFuture<'static, Result<PromptReply, McpError>> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct PromptReply {
    pub description: Option<String>,
    pub role: Option<Role>,
    pub text: String,
}

impl PromptReply {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            description: None,
            role: None,
            text: text.into(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }
}

impl From<String> for PromptReply {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for PromptReply {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

pub struct PromptPayload {
    pub input: Value,
    pub context: RequestContext,
}

impl PromptPayload {
    pub fn session_id(&self) -> &str {
        &self.context.session_id
    }

    pub fn user_id(&self) -> &str {
        &self.context.user_id
    }

    pub fn input_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.input.clone())
    }

    pub fn invalid_params(&self, message: impl Into<String>) -> McpError {
        McpError::with_message(ErrorCode::InvalidParams, message)
    }

    pub fn internal(&self, message: impl Into<String>) -> McpError {
        McpError::with_message(ErrorCode::InternalError, message)
    }
}

pub fn prompt(description: impl Into<String>) -> PromptDraft {
    PromptDraft {
        description: description.into(),
        input: None,
    }
}

pub struct PromptDraft {
    description: String,
    input: Option<Arc<dyn Schema>>,
}

impl PromptDraft {
    pub fn input(mut self, schema: impl Schema + 'static) -> Self {
        self.input = Some(Arc::new(schema));
        self
    }

    pub fn handle<F, Fut, R>(self, handler: F) -> Prompt
    where
        F: Fn(PromptPayload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, McpError>> + Send + 'static,
        R: Into<PromptReply>,
    {
        let handler: PromptHandler = Arc::new(move |payload: PromptPayload| {
            let call = handler(payload);
            async move {
                let reply: Result<PromptReply, McpError> = call.await.map(Into::into);
                reply
            }
            .boxed()
        });

        Prompt {
            description: self.description,
            input: self.input,
            handler,
        }
    }
}

pub struct Prompt {
    description: String,
    input: Option<Arc<dyn Schema>>,
    handler: PromptHandler,
}

impl Prompt {
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_schema(&self) -> Option<Value> {
        self.input.as_ref().map(|schema| schema.to_json_schema())
    }

    /// Arguments are read off the input schema's properties.
    pub fn describe(&self, name: &str) -> PromptDescriptor {
        let arguments = self
            .input_schema()
            .map(|document| {
                let required = schema_required(&document);
                schema_properties(&document)
                    .into_iter()
                    .map(|(key, property)| PromptArgument {
                        description: property
                            .get("description")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        required: required.contains(&key),
                        name: key,
                    })
                    .collect()
            })
            .unwrap_or_default();

        PromptDescriptor {
            name: name.to_string(),
            description: self.description.clone(),
            arguments,
        }
    }

    pub async fn invoke(
        &self,
        raw_input: Option<Value>,
        context: RequestContext,
    ) -> Result<GetPromptResult, McpError> {
        let input = validate_input(self.input.as_deref(), raw_input)?;
        let reply = (self.handler)(PromptPayload { input, context }).await?;

        Ok(GetPromptResult {
            description: reply.description,
            messages: vec![PromptMessage {
                role: reply.role.unwrap_or_default(),
                content: Content::text(reply.text),
            }],
        })
    }
}

impl fmt::Debug for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prompt")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;
    use crate::mcp::session::SessionIds;
    use crate::schema::JsonSchema;

    fn context() -> RequestContext {
        RequestContext::new(
            "1.0.0",
            SessionIds {
                session_id: "s".to_string(),
                user_id: "u".to_string(),
            },
            Arc::new(BTreeMap::new()),
            None,
        )
    }

    fn greeting() -> Prompt {
        prompt("Greet someone")
            .input(
                JsonSchema::new(json!({
                    "type": "object",
                    "properties": {
                        "name": { "type": "string", "description": "Who to greet" },
                        "tone": { "type": "string" }
                    },
                    "required": ["name"]
                }))
                .expect("schema compiles"),
            )
            .handle(|payload: PromptPayload| async move {
                let name = payload.input["name"].as_str().unwrap_or_default().to_string();
                if name == "nobody" {
                    return Err(payload.invalid_params("cannot greet nobody"));
                }
                Ok(PromptReply::new(format!("Say hello to {name}")).role(Role::User))
            })
    }

    #[test]
    fn describe_lists_schema_arguments() {
        let listing = greeting().describe("greet");
        assert_eq!(listing.name, "greet");
        assert_eq!(listing.arguments.len(), 2);

        let name = listing
            .arguments
            .iter()
            .find(|argument| argument.name == "name")
            .expect("name argument");
        assert!(name.required);
        assert_eq!(name.description, "Who to greet");

        let tone = listing
            .arguments
            .iter()
            .find(|argument| argument.name == "tone")
            .expect("tone argument");
        assert!(!tone.required);
        assert_eq!(tone.description, "");
    }

    #[tokio::test]
    async fn renders_single_message() {
        let result = greeting()
            .invoke(Some(json!({ "name": "Ada" })), context())
            .await
            .expect("renders");
        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.messages[0].role, Role::User);
        assert_eq!(result.messages[0].content.as_text(), Some("Say hello to Ada"));
    }

    #[tokio::test]
    async fn role_defaults_to_assistant() {
        let plain = prompt("plain").handle(|_payload: PromptPayload| async move {
            Ok::<_, McpError>("hello")
        });
        let result = plain.invoke(None, context()).await.expect("renders");
        assert_eq!(result.messages[0].role, Role::Assistant);
    }

    #[tokio::test]
    async fn handler_errors_are_protocol_errors() {
        let error = greeting()
            .invoke(Some(json!({ "name": "nobody" })), context())
            .await
            .expect_err("rejected");
        assert_eq!(error.kind, ErrorCode::InvalidParams);
        assert_eq!(error.message, "cannot greet nobody");
    }

    #[tokio::test]
    async fn missing_required_argument_is_invalid_params() {
        let error = greeting()
            .invoke(Some(json!({})), context())
            .await
            .expect_err("rejected");
        assert_eq!(error.kind, ErrorCode::InvalidParams);
        assert_eq!(error.message, "Invalid parameters");
    }
}

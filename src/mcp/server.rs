//! The central Model Context Protocol engine
//!
//! Decodes one JSON-RPC member, resolves its method through [`Method`], runs it
//! against a registry [`Version`] and wraps the outcome in a response envelope.

use std::{fmt, panic::AssertUnwindSafe, str::FromStr};

use futures_util::FutureExt;
use rust_mcp_sdk::schema::{
    Implementation, InitializeResult, ServerCapabilities, ServerCapabilitiesPrompts,
    ServerCapabilitiesResources, ServerCapabilitiesTools,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::client::constants::CONSTANT_MARKER;
use crate::domain::{
    content::{ReadResourceResult, ResourceContents},
    utils::panic_message,
};
use crate::mcp::{
    rpc::{
        is_json_rpc_error, json_rpc_error, json_rpc_result, mcp_error_to_json_rpc, ErrorCode,
        McpError, RpcRequest, JSONRPC_VERSION,
    },
    session::RequestContext,
};
use crate::registry::Version;

pub const PROTOCOL_VERSION: &str = "2025-03-26";
pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 2] = [PROTOCOL_VERSION, "2024-11-05"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Initialize,
    Ping,
    Initialized,
    ToolsList,
    ToolsCall,
    ToolsIo,
    PromptsList,
    PromptsGet,
    ResourcesList,
    ResourcesRead,
    ResourceTemplatesList,
    CompletionComplete,
    LoggingSetLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capability {
    Tools,
    Prompts,
    Resources,
}

impl Method {
    pub const ALL: [Method; 13] = [
        Method::Initialize,
        Method::Ping,
        Method::Initialized,
        Method::ToolsList,
        Method::ToolsCall,
        Method::ToolsIo,
        Method::PromptsList,
        Method::PromptsGet,
        Method::ResourcesList,
        Method::ResourcesRead,
        Method::ResourceTemplatesList,
        Method::CompletionComplete,
        Method::LoggingSetLevel,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Ping => "ping",
            Self::Initialized => "notifications/initialized",
            Self::ToolsList => "tools/list",
            Self::ToolsCall => "tools/call",
            Self::ToolsIo => "tools/io",
            Self::PromptsList => "prompts/list",
            Self::PromptsGet => "prompts/get",
            Self::ResourcesList => "resources/list",
            Self::ResourcesRead => "resources/read",
            Self::ResourceTemplatesList => "resources/templates/list",
            Self::CompletionComplete => "completion/complete",
            Self::LoggingSetLevel => "logging/setLevel",
        }
    }

    const fn capability(self) -> Option<Capability> {
        match self {
            Self::ToolsList | Self::ToolsCall | Self::ToolsIo => Some(Capability::Tools),
            Self::PromptsList | Self::PromptsGet => Some(Capability::Prompts),
            Self::ResourcesList | Self::ResourcesRead | Self::ResourceTemplatesList => {
                Some(Capability::Resources)
            }
            _ => None,
        }
    }
}

impl FromStr for Method {
    type Err = McpError;

    fn from_str(method: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == method)
            .ok_or_else(McpError::method_not_found)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ReadParams {
    uri: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LogLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

#[derive(Debug, Deserialize)]
struct SetLevelParams {
    level: LogLevel,
}

/// Handles one JSON-RPC member. Returns `None` for notifications.
pub async fn handle_json_rpc_value(
    version: &Version,
    context: &RequestContext,
    payload: Value,
) -> Option<Value> {
    let Some(object) = payload.as_object() else {
        return Some(json_rpc_error(None, ErrorCode::InvalidRequest));
    };

    // A missing `id` member marks a notification; an explicit `null` id does not.
    let is_notification = !object.contains_key("id");
    let id = object.get("id").cloned();

    let request: RpcRequest = match serde_json::from_value(payload) {
        Ok(request) => request,
        Err(_) if is_notification => return None,
        Err(_) => return Some(json_rpc_error(id, ErrorCode::InvalidRequest)),
    };

    if request.jsonrpc != JSONRPC_VERSION || request.method.trim().is_empty() {
        if is_notification {
            return None;
        }
        return Some(json_rpc_error(id, ErrorCode::InvalidRequest));
    }

    let response = handle_json_rpc_request(version, context, id, request.method, request.params).await;
    (!is_notification).then_some(response)
}

pub async fn handle_json_rpc_request(
    version: &Version,
    context: &RequestContext,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
) -> Value {
    let audit_params = redact_audit_params(params.as_ref());

    let outcome = AssertUnwindSafe(dispatch(version, context, &method, params))
        .catch_unwind()
        .await;

    let response = match outcome {
        Ok(Ok(result)) => json_rpc_result(id, result),
        Ok(Err(err)) => mcp_error_to_json_rpc(id, &err),
        Err(panic) => {
            error!(
                method = %method,
                error = %panic_message(panic.as_ref()),
                "capability dispatch panicked"
            );
            json_rpc_error(id, ErrorCode::InternalError)
        }
    };

    info!(
        version = %version.id(),
        session_id = %context.session_id,
        method = %method,
        params = %audit_params,
        outcome = if is_json_rpc_error(&response) { "failure" } else { "success" },
        "capability call audited"
    );

    response
}

pub async fn dispatch(
    version: &Version,
    context: &RequestContext,
    method: &str,
    params: Option<Value>,
) -> Result<Value, McpError> {
    let method = Method::from_str(method)?;

    let advertised = match method.capability() {
        Some(Capability::Tools) => version.has_tools(),
        Some(Capability::Prompts) => version.has_prompts(),
        Some(Capability::Resources) => version.has_resources(),
        None => true,
    };
    if !advertised {
        return Err(McpError::method_not_found());
    }

    match method {
        Method::Initialize => initialize(version, params.as_ref()),
        Method::Ping | Method::Initialized => Ok(json!({})),
        Method::ToolsList => Ok(json!({ "tools": version.tools_list() })),
        Method::ToolsIo => Ok(json!({ "tools": version.tools_io() })),
        Method::ToolsCall => {
            let call: CallParams = parse_params(params)?;
            let tool = version
                .tool(&call.name)
                .ok_or_else(McpError::method_not_found)?;
            let result = tool.invoke(call.arguments, context.clone()).await?;
            to_result_value(&result)
        }
        Method::PromptsList => Ok(json!({ "prompts": version.prompts_list() })),
        Method::PromptsGet => {
            let call: CallParams = parse_params(params)?;
            let prompt = version
                .prompt(&call.name)
                .ok_or_else(McpError::method_not_found)?;
            let result = prompt.invoke(call.arguments, context.clone()).await?;
            to_result_value(&result)
        }
        Method::ResourcesList => Ok(json!({ "resources": version.resources_list() })),
        Method::ResourceTemplatesList => Ok(json!({ "resourceTemplates": [] })),
        Method::ResourcesRead => {
            let read: ReadParams = parse_params(params)?;
            let entry = version
                .resource_by_uri(&read.uri)
                .ok_or_else(|| McpError::resource_not_found(&read.uri))?;
            let (payload, kind) = entry.def.invoke(&read.uri, context.clone()).await?;
            to_result_value(&ReadResourceResult {
                contents: vec![ResourceContents::new(
                    &read.uri,
                    entry.def.mime_type(),
                    payload,
                    kind,
                )],
            })
        }
        Method::CompletionComplete => Ok(json!({
            "completion": { "values": [], "hasMore": false }
        })),
        Method::LoggingSetLevel => {
            let SetLevelParams { level } = parse_params(params)?;
            info!(level = ?level, "client requested log level");
            Ok(json!({}))
        }
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, McpError> {
    let raw = params.ok_or_else(McpError::invalid_params)?;
    serde_json::from_value(raw).map_err(|_| McpError::invalid_params())
}

fn to_result_value<T: serde::Serialize>(result: &T) -> Result<Value, McpError> {
    serde_json::to_value(result).map_err(|err| {
        error!(error = %err, "result serialization failed");
        McpError::internal()
    })
}

fn initialize(version: &Version, params: Option<&Value>) -> Result<Value, McpError> {
    let initialize_result = InitializeResult {
        server_info: Implementation {
            name: version.display_name().to_string(),
            version: version.id().to_string(),
            title: None,
            description: None,
            icons: vec![],
            website_url: None,
        },
        capabilities: ServerCapabilities {
            tools: version
                .has_tools()
                .then_some(ServerCapabilitiesTools { list_changed: None }),
            resources: version.has_resources().then_some(ServerCapabilitiesResources {
                subscribe: None,
                list_changed: None,
            }),
            prompts: version
                .has_prompts()
                .then_some(ServerCapabilitiesPrompts { list_changed: None }),
            ..Default::default()
        },
        protocol_version: negotiate_protocol_version(params).to_string(),
        instructions: None,
        meta: None,
    };

    to_result_value(&initialize_result)
}

/// Echoes a supported offered version, otherwise answers with the latest one.
pub fn negotiate_protocol_version(params: Option<&Value>) -> &'static str {
    let offered = params
        .and_then(|params| params.get("protocolVersion"))
        .and_then(Value::as_str)
        .map(str::trim);

    offered
        .and_then(|offered| {
            SUPPORTED_PROTOCOL_VERSIONS
                .into_iter()
                .find(|supported| *supported == offered)
        })
        .unwrap_or(PROTOCOL_VERSION)
}

pub fn redact_audit_params(params: Option<&Value>) -> Value {
    params.map(redact_audit_value).unwrap_or(Value::Null)
}

pub fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

/// Constant-marked keys carry injected configuration and are always redacted.
pub fn is_sensitive_key(key: &str) -> bool {
    if key.starts_with(CONSTANT_MARKER) {
        return true;
    }

    let normalized = key.trim().to_ascii_lowercase();
    matches!(
        normalized.as_str(),
        "authorization" | "bearer" | "credentials" | "credential" | "api_key" | "apikey"
    ) || normalized.contains("token")
        || normalized.contains("secret")
        || normalized.contains("password")
        || normalized.contains("credential")
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, sync::Arc};

    use serde_json::json;

    use super::*;
    use crate::domain::{
        prompts::{prompt, PromptPayload},
        resources::{resource, ResourcePayload},
        tools::{tool, HandlerError, ToolPayload},
    };
    use crate::mcp::session::SessionIds;

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

    fn tools_only() -> Version {
        Version::builder("1.0.0")
            .tool(
                "echo",
                tool("Echo").handle(|payload: ToolPayload| async move {
                    Ok::<_, HandlerError>(payload.input.to_string())
                }),
            )
            .tool(
                "explode",
                tool("Explodes").handle(|_payload: ToolPayload| async move {
                    if true {
                        panic!("tool exploded");
                    }
                    Ok::<_, HandlerError>("unreachable")
                }),
            )
            .build()
            .expect("valid version")
    }

    fn everything() -> Version {
        Version::builder("2.0.0")
            .name("Everything")
            .tool(
                "echo",
                tool("Echo").handle(|_payload: ToolPayload| async move { Ok::<_, HandlerError>("ok") }),
            )
            .prompt(
                "hello",
                prompt("Hello").handle(|_payload: PromptPayload| async move { Ok::<_, McpError>("hi") }),
            )
            .resource(
                "notes",
                resource("Notes").handle(|_payload: ResourcePayload| async move {
                    Ok::<_, McpError>("some notes")
                }),
            )
            .build()
            .expect("valid version")
    }

    #[test]
    fn parses_every_method_from_its_path() {
        for method in Method::ALL {
            assert_eq!(Method::from_str(method.as_str()), Ok(method));
        }
        let error = Method::from_str("tools/unknown").expect_err("not in table");
        assert_eq!(error.kind, ErrorCode::MethodNotFound);
        assert!(Method::from_str("resources/subscribe").is_err());
        assert!(Method::from_str("tools").is_err());
    }

    #[tokio::test]
    async fn notification_produces_no_response() {
        let response = handle_json_rpc_value(
            &tools_only(),
            &context(),
            json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
        )
        .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn null_id_is_still_a_request() {
        let response = handle_json_rpc_value(
            &tools_only(),
            &context(),
            json!({ "jsonrpc": "2.0", "id": null, "method": "ping" }),
        )
        .await
        .expect("response");
        assert_eq!(response["id"], Value::Null);
        assert_eq!(response["result"], json!({}));

        let response = handle_json_rpc_value(
            &tools_only(),
            &context(),
            json!({ "jsonrpc": "2.0", "id": null, "method": "nope" }),
        )
        .await
        .expect("response");
        assert_eq!(response.get("id"), Some(&Value::Null));
        assert_eq!(response["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn rejects_wrong_envelope() {
        let response = handle_json_rpc_value(
            &tools_only(),
            &context(),
            json!({ "jsonrpc": "1.0", "id": 4, "method": "ping" }),
        )
        .await
        .expect("response");
        assert_eq!(response["error"]["code"], -32600);
        assert_eq!(response["id"], 4);

        let response = handle_json_rpc_value(&tools_only(), &context(), json!([1]))
            .await
            .expect("response");
        assert_eq!(response["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn panicking_tool_yields_error_result_not_protocol_error() {
        let response = handle_json_rpc_value(
            &tools_only(),
            &context(),
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "tools/call",
                "params": { "name": "explode" }
            }),
        )
        .await
        .expect("response");
        assert!(response.get("error").is_none());
        assert_eq!(response["result"]["isError"], true);
        assert_eq!(response["result"]["content"][0]["text"], "tool exploded");
    }

    #[tokio::test]
    async fn gates_methods_for_missing_capabilities() {
        let version = tools_only();
        let error = dispatch(&version, &context(), "prompts/list", None)
            .await
            .expect_err("no prompts");
        assert_eq!(error.kind, ErrorCode::MethodNotFound);

        let error = dispatch(&version, &context(), "resources/templates/list", None)
            .await
            .expect_err("no resources");
        assert_eq!(error.kind, ErrorCode::MethodNotFound);
    }

    #[tokio::test]
    async fn initialize_advertises_only_populated_capabilities() {
        let result = dispatch(&tools_only(), &context(), "initialize", None)
            .await
            .expect("initializes");
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], "1.0.0");
        assert!(result["capabilities"].get("tools").is_some());
        assert!(result["capabilities"].get("prompts").is_none());
        assert!(result["capabilities"].get("resources").is_none());

        let result = dispatch(&everything(), &context(), "initialize", None)
            .await
            .expect("initializes");
        assert_eq!(result["serverInfo"]["name"], "Everything");
        assert_eq!(result["serverInfo"]["version"], "2.0.0");
        assert!(result["capabilities"].get("prompts").is_some());
        assert!(result["capabilities"].get("resources").is_some());
    }

    #[tokio::test]
    async fn reads_resources_and_reports_unknown_uris() {
        let version = everything();
        let result = dispatch(
            &version,
            &context(),
            "resources/read",
            Some(json!({ "uri": "resource://notes" })),
        )
        .await
        .expect("reads");
        assert_eq!(result["contents"][0]["text"], "some notes");
        assert_eq!(result["contents"][0]["mimeType"], "text/plain");
        assert_eq!(result["contents"][0]["uri"], "resource://notes");

        let error = dispatch(
            &version,
            &context(),
            "resources/read",
            Some(json!({ "uri": "resource://nope" })),
        )
        .await
        .expect_err("unknown uri");
        assert_eq!(error.kind, ErrorCode::ResourceNotFound);
        assert_eq!(error.data, Some(json!({ "uri": "resource://nope" })));
    }

    #[tokio::test]
    async fn set_level_validates_level() {
        let version = tools_only();
        let ok = dispatch(
            &version,
            &context(),
            "logging/setLevel",
            Some(json!({ "level": "warning" })),
        )
        .await
        .expect("valid level");
        assert_eq!(ok, json!({}));

        let error = dispatch(
            &version,
            &context(),
            "logging/setLevel",
            Some(json!({ "level": "loud" })),
        )
        .await
        .expect_err("invalid level");
        assert_eq!(error.kind, ErrorCode::InvalidParams);
    }

    #[tokio::test]
    async fn call_without_params_is_invalid_params() {
        let error = dispatch(&tools_only(), &context(), "tools/call", None)
            .await
            .expect_err("missing params");
        assert_eq!(error.kind, ErrorCode::InvalidParams);
    }

    #[test]
    fn redacts_sensitive_fields_in_audit_params() {
        let params = json!({
            "name": "search_web",
            "arguments": {
                "query": "rust",
                "token": "should-not-appear",
                "api_key": "should-not-appear",
                "_GOOGLE_API_KEY": "should-not-appear",
                "nested": {
                    "secret": "should-not-appear"
                }
            }
        });

        let redacted = redact_audit_params(Some(&params));

        assert_eq!(redacted["name"], json!("search_web"));
        assert_eq!(redacted["arguments"]["query"], json!("rust"));
        assert_eq!(redacted["arguments"]["token"], json!("[REDACTED]"));
        assert_eq!(redacted["arguments"]["api_key"], json!("[REDACTED]"));
        assert_eq!(redacted["arguments"]["_GOOGLE_API_KEY"], json!("[REDACTED]"));
        assert_eq!(
            redacted["arguments"]["nested"]["secret"],
            json!("[REDACTED]")
        );
    }

    #[test]
    fn negotiates_protocol_version() {
        let params = json!({ "protocolVersion": "2024-11-05" });
        assert_eq!(negotiate_protocol_version(Some(&params)), "2024-11-05");

        let params = json!({ "protocolVersion": "2026-01-01" });
        assert_eq!(negotiate_protocol_version(Some(&params)), PROTOCOL_VERSION);
        assert_eq!(negotiate_protocol_version(None), PROTOCOL_VERSION);
    }
}

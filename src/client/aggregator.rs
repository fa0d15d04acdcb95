//! Aggregates every version of a plug into one agent-facing namespace
//!
//! Tools are scanned in version order, then declaration order. A tool whose required
//! constants are not all configured is left out. Names that collide get `_1`, `_2`, ...
//! appended until free. Calling an aggregated tool re-injects the configured constants
//! and routes the call to the version that declared it under its original name.

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    sync::Arc,
};

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::client::{
    constants::{merge_constants, ConstantPartition},
    transport::Transport,
    ClientError,
};
use crate::domain::{
    content::{GetPromptResult, ReadResourceResult},
    listing::{PlugManifest, PromptArgument},
};

#[derive(Debug, Default)]
struct DedupTable {
    taken: HashSet<String>,
}

impl DedupTable {
    fn allocate(&mut self, name: &str) -> String {
        if self.taken.insert(name.to_string()) {
            return name.to_string();
        }

        let mut suffix = 1_u32;
        loop {
            let candidate = format!("{name}_{suffix}");
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            suffix += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub version_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub value: Value,
    pub is_error: bool,
}

/// Collapses a `tools/call` result into a single value for the agent.
pub fn unwrap_call_result(result: &Value) -> ToolOutcome {
    let is_error = result
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let items = result
        .get("content")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let value = match items.as_slice() {
        [] => Value::Null,
        [item] => match text_of(item) {
            Some(text) => parse_lenient(text),
            None => item.clone(),
        },
        _ => Value::Array(
            items
                .into_iter()
                .map(|mut item| {
                    let parsed = text_of(&item).map(parse_lenient);
                    if let Some(parsed) = parsed {
                        item["text"] = parsed;
                    }
                    item
                })
                .collect(),
        ),
    };

    ToolOutcome { value, is_error }
}

fn text_of(item: &Value) -> Option<&str> {
    if item.get("type").and_then(Value::as_str) != Some("text") {
        return None;
    }
    item.get("text").and_then(Value::as_str)
}

fn parse_lenient(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ClientError> {
    serde_json::from_value(value).map_err(|err| ClientError::Decode(err.to_string()))
}

pub struct AggregatedTool {
    pub name: String,
    pub description: String,
    /// Agent-facing parameters schema with constant properties removed.
    pub parameters: Value,
    route: Route,
    partition: ConstantPartition,
    transport: Arc<dyn Transport>,
}

impl AggregatedTool {
    pub fn route(&self) -> &Route {
        &self.route
    }

    pub async fn execute(&self, arguments: Value) -> Result<ToolOutcome, ClientError> {
        let arguments = match arguments {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            _ => return Err(ClientError::InvalidArguments),
        };

        let arguments = self.partition.merge_into(arguments);
        let result = self
            .transport
            .call(
                &self.route.version_id,
                "tools/call",
                json!({ "name": self.route.name, "arguments": arguments }),
            )
            .await?;

        Ok(unwrap_call_result(&result))
    }
}

impl fmt::Debug for AggregatedTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregatedTool")
            .field("name", &self.name)
            .field("route", &self.route)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedPrompt {
    pub name: String,
    pub description: String,
    pub arguments: Vec<PromptArgument>,
    pub route: Route,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedResource {
    pub name: String,
    pub uri: String,
    pub description: String,
    pub mime_type: String,
    pub route: Route,
}

pub struct ToolSet {
    tools: Vec<AggregatedTool>,
    prompts: Vec<AggregatedPrompt>,
    resources: Vec<AggregatedResource>,
    transport: Arc<dyn Transport>,
}

impl ToolSet {
    pub fn tools(&self) -> &[AggregatedTool] {
        &self.tools
    }

    pub fn tool(&self, name: &str) -> Option<&AggregatedTool> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name.as_str()).collect()
    }

    pub fn prompts(&self) -> &[AggregatedPrompt] {
        &self.prompts
    }

    pub fn resources(&self) -> &[AggregatedResource] {
        &self.resources
    }

    pub async fn execute(&self, name: &str, arguments: Value) -> Result<ToolOutcome, ClientError> {
        self.tool(name)
            .ok_or_else(|| ClientError::UnknownCapability(name.to_string()))?
            .execute(arguments)
            .await
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<GetPromptResult, ClientError> {
        let prompt = self
            .prompts
            .iter()
            .find(|prompt| prompt.name == name)
            .ok_or_else(|| ClientError::UnknownCapability(name.to_string()))?;
        if !(arguments.is_object() || arguments.is_null()) {
            return Err(ClientError::InvalidArguments);
        }

        let result = self
            .transport
            .call(
                &prompt.route.version_id,
                "prompts/get",
                json!({ "name": prompt.route.name, "arguments": arguments }),
            )
            .await?;
        decode(result)
    }

    /// Reads a resource by its exposed name. Versions may share a URI, so the
    /// name is what picks the owning version.
    pub async fn read_resource(&self, name: &str) -> Result<ReadResourceResult, ClientError> {
        let resource = self
            .resources
            .iter()
            .find(|resource| resource.name == name)
            .ok_or_else(|| ClientError::UnknownCapability(name.to_string()))?;

        let result = self
            .transport
            .call(
                &resource.route.version_id,
                "resources/read",
                json!({ "uri": resource.uri }),
            )
            .await?;
        decode(result)
    }
}

impl fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSet")
            .field("tools", &self.names())
            .field("prompts", &self.prompts.len())
            .field("resources", &self.resources.len())
            .finish_non_exhaustive()
    }
}

pub struct Aggregator {
    transport: Arc<dyn Transport>,
    constants: BTreeMap<String, String>,
}

impl Aggregator {
    pub fn new(transport: Arc<dyn Transport>, constants: BTreeMap<String, String>) -> Self {
        Self {
            transport,
            constants,
        }
    }

    pub fn constants(&self) -> &BTreeMap<String, String> {
        &self.constants
    }

    pub fn set_constant(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.constants.insert(key.into(), value.into());
    }

    pub fn remove_constant(&mut self, key: &str) -> Option<String> {
        self.constants.remove(key)
    }

    /// Fetches the manifest and aggregates it with the current constants.
    pub async fn connect(&self) -> Result<ToolSet, ClientError> {
        let manifest = self.transport.manifest().await?;
        Ok(self.aggregate(&manifest))
    }

    pub fn aggregate(&self, manifest: &PlugManifest) -> ToolSet {
        let constants = merge_constants(&manifest.constants, &self.constants);
        let mut tool_names = DedupTable::default();
        let mut prompt_names = DedupTable::default();
        let mut resource_names = DedupTable::default();

        let mut tools = Vec::new();
        let mut prompts = Vec::new();
        let mut resources = Vec::new();

        for version in &manifest.versions {
            for tool in &version.tools {
                let partition = ConstantPartition::from_schema(&tool.input_schema, &constants);
                if !partition.is_exposed() {
                    debug!(
                        version = %version.version_id,
                        tool = %tool.name,
                        missing = ?partition.required_constants,
                        "tool hidden until its constants are configured"
                    );
                    continue;
                }

                tools.push(AggregatedTool {
                    name: tool_names.allocate(&tool.name),
                    description: tool.description.clone(),
                    parameters: partition.agent_schema(),
                    route: Route {
                        version_id: version.version_id.clone(),
                        name: tool.name.clone(),
                    },
                    partition,
                    transport: Arc::clone(&self.transport),
                });
            }

            for prompt in &version.prompts {
                prompts.push(AggregatedPrompt {
                    name: prompt_names.allocate(&prompt.name),
                    description: prompt.description.clone(),
                    arguments: prompt.arguments.clone(),
                    route: Route {
                        version_id: version.version_id.clone(),
                        name: prompt.name.clone(),
                    },
                });
            }

            for resource in &version.resources {
                resources.push(AggregatedResource {
                    name: resource_names.allocate(&resource.name),
                    uri: resource.uri.clone(),
                    description: resource.description.clone(),
                    mime_type: resource.mime_type.clone(),
                    route: Route {
                        version_id: version.version_id.clone(),
                        name: resource.name.clone(),
                    },
                });
            }
        }

        ToolSet {
            tools,
            prompts,
            resources,
            transport: Arc::clone(&self.transport),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::domain::listing::{ResourceDescriptor, ToolDescriptor, VersionListing};

    #[derive(Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<(String, String, Value)>>,
        reply: Value,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn manifest(&self) -> Result<PlugManifest, ClientError> {
            Ok(manifest())
        }

        async fn call(
            &self,
            version_id: &str,
            method: &str,
            params: Value,
        ) -> Result<Value, ClientError> {
            self.calls
                .lock()
                .expect("lock")
                .push((version_id.to_string(), method.to_string(), params));
            Ok(self.reply.clone())
        }
    }

    fn descriptor(name: &str, schema: Value) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: format!("{name} tool"),
            input_schema: schema,
            output_schema: None,
            cost: None,
        }
    }

    fn open_schema() -> Value {
        json!({ "type": "object", "properties": { "query": { "type": "string" } } })
    }

    fn manifest() -> PlugManifest {
        PlugManifest {
            id: "plug".to_string(),
            constants: BTreeMap::new(),
            versions: vec![
                VersionListing {
                    version_id: "1.0.0".to_string(),
                    name: None,
                    tools: vec![
                        descriptor("search", open_schema()),
                        descriptor(
                            "weather",
                            json!({
                                "type": "object",
                                "properties": {
                                    "city": { "type": "string" },
                                    "_API_KEY": { "type": "string" }
                                },
                                "required": ["city", "_API_KEY"]
                            }),
                        ),
                    ],
                    prompts: vec![],
                    resources: vec![],
                },
                VersionListing {
                    version_id: "2.0.0".to_string(),
                    name: None,
                    tools: vec![descriptor("search", open_schema())],
                    prompts: vec![],
                    resources: vec![],
                },
            ],
        }
    }

    fn text_reply(text: &str) -> Value {
        json!({ "content": [{ "type": "text", "text": text }] })
    }

    #[test]
    fn dedup_appends_first_free_suffix() {
        let mut table = DedupTable::default();
        assert_eq!(table.allocate("search"), "search");
        assert_eq!(table.allocate("search_1"), "search_1");
        assert_eq!(table.allocate("search"), "search_2");
        assert_eq!(table.allocate("search"), "search_3");
    }

    #[test]
    fn colliding_names_across_versions_get_suffixes() {
        let aggregator = Aggregator::new(Arc::new(RecordingTransport::default()), BTreeMap::new());
        let set = aggregator.aggregate(&manifest());

        assert_eq!(set.names(), vec!["search", "search_1"]);
        assert_eq!(set.tool("search_1").expect("renamed").route().version_id, "2.0.0");
        assert_eq!(set.tool("search_1").expect("renamed").route().name, "search");
    }

    #[test]
    fn exposure_follows_configured_constants() {
        let mut aggregator =
            Aggregator::new(Arc::new(RecordingTransport::default()), BTreeMap::new());
        assert!(aggregator.aggregate(&manifest()).tool("weather").is_none());

        aggregator.set_constant("API_KEY", "k");
        let set = aggregator.aggregate(&manifest());
        let weather = set.tool("weather").expect("now exposed");
        assert!(weather.parameters["properties"].get("_API_KEY").is_none());
        assert_eq!(weather.parameters["required"], json!(["city"]));

        aggregator.remove_constant("API_KEY");
        assert!(aggregator.aggregate(&manifest()).tool("weather").is_none());
    }

    #[test]
    fn remote_constants_act_as_defaults() {
        let aggregator = Aggregator::new(Arc::new(RecordingTransport::default()), BTreeMap::new());
        let mut with_defaults = manifest();
        with_defaults
            .constants
            .insert("API_KEY".to_string(), "remote".to_string());
        assert!(aggregator.aggregate(&with_defaults).tool("weather").is_some());

        let blanked = Aggregator::new(
            Arc::new(RecordingTransport::default()),
            BTreeMap::from([("API_KEY".to_string(), String::new())]),
        );
        assert!(blanked.aggregate(&with_defaults).tool("weather").is_none());
    }

    #[tokio::test]
    async fn execute_merges_constants_under_marked_names() {
        let transport = Arc::new(RecordingTransport {
            reply: text_reply(r#"{"temperature":21}"#),
            ..RecordingTransport::default()
        });
        let aggregator = Aggregator::new(
            transport.clone(),
            BTreeMap::from([("API_KEY".to_string(), "k".to_string())]),
        );

        let set = aggregator.connect().await.expect("connects");
        let outcome = set
            .execute("weather", json!({ "city": "X" }))
            .await
            .expect("executes");
        assert_eq!(outcome.value, json!({ "temperature": 21 }));
        assert!(!outcome.is_error);

        let calls = transport.calls.lock().expect("lock");
        let (version_id, method, params) = &calls[0];
        assert_eq!(version_id, "1.0.0");
        assert_eq!(method, "tools/call");
        assert_eq!(
            params,
            &json!({ "name": "weather", "arguments": { "city": "X", "_API_KEY": "k" } })
        );
    }

    #[tokio::test]
    async fn execute_rejects_non_object_arguments() {
        let aggregator = Aggregator::new(Arc::new(RecordingTransport::default()), BTreeMap::new());
        let set = aggregator.aggregate(&manifest());
        let error = set
            .execute("search", json!(["query"]))
            .await
            .expect_err("array arguments");
        assert!(matches!(error, ClientError::InvalidArguments));

        let error = set.execute("nope", json!({})).await.expect_err("unknown");
        assert!(matches!(error, ClientError::UnknownCapability(name) if name == "nope"));
    }

    fn notes_resource() -> ResourceDescriptor {
        ResourceDescriptor {
            name: "notes".to_string(),
            uri: "resource://notes".to_string(),
            description: "notes".to_string(),
            mime_type: "text/plain".to_string(),
        }
    }

    #[tokio::test]
    async fn colliding_resources_route_by_exposed_name() {
        let transport = Arc::new(RecordingTransport {
            reply: json!({ "contents": [] }),
            ..RecordingTransport::default()
        });
        let aggregator = Aggregator::new(transport.clone(), BTreeMap::new());
        let mut shared = manifest();
        for version in &mut shared.versions {
            version.resources.push(notes_resource());
        }

        let set = aggregator.aggregate(&shared);
        let names: Vec<&str> = set.resources().iter().map(|resource| resource.name.as_str()).collect();
        assert_eq!(names, vec!["notes", "notes_1"]);

        set.read_resource("notes_1").await.expect("reads");
        set.read_resource("notes").await.expect("reads");
        let error = set
            .read_resource("resource://notes")
            .await
            .expect_err("uri is not an exposed name");
        assert!(matches!(error, ClientError::UnknownCapability(_)));

        let calls = transport.calls.lock().expect("lock");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "2.0.0");
        assert_eq!(calls[0].1, "resources/read");
        assert_eq!(calls[0].2, json!({ "uri": "resource://notes" }));
        assert_eq!(calls[1].0, "1.0.0");
    }

    #[test]
    fn unwraps_call_results() {
        assert_eq!(unwrap_call_result(&text_reply("plain words")).value, json!("plain words"));
        assert_eq!(unwrap_call_result(&text_reply("[1,2]")).value, json!([1, 2]));
        assert_eq!(unwrap_call_result(&json!({ "content": [] })).value, Value::Null);

        let image = json!({ "type": "image", "data": "abc", "mimeType": "image/png" });
        assert_eq!(unwrap_call_result(&json!({ "content": [image.clone()] })).value, image);

        let several = unwrap_call_result(&json!({
            "content": [{ "type": "text", "text": "1" }, image.clone()]
        }));
        assert_eq!(several.value, json!([{ "type": "text", "text": 1 }, image]));

        let failed = unwrap_call_result(&json!({
            "content": [{ "type": "text", "text": "boom" }],
            "isError": true
        }));
        assert!(failed.is_error);
        assert_eq!(failed.value, json!("boom"));
    }
}

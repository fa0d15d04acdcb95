//! Capability registry
//!
//! A [`Server`] owns one or more [`Version`]s. Each version is addressed by id at
//! `/mcp/{version}` and keeps its tools, prompts and resources in declaration order.
//! Everything is validated once at build time and shared read-only afterwards.

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    sync::{Arc, LazyLock},
};

use regex::Regex;
use thiserror::Error;

use crate::domain::{
    listing::{PlugManifest, PromptDescriptor, ResourceDescriptor, ToolDescriptor, VersionListing},
    prompts::Prompt,
    resources::Resource,
    tools::Tool,
    utils::is_valid_mime_type,
};
use crate::mcp::session::{AppContext, RequestContext, SessionIds};
use crate::schema::is_object_schema;

static NAME_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]{1,64}$").ok());

pub type ContextFactory =
    Arc<dyn Fn(&SessionIds, &BTreeMap<String, String>) -> Option<AppContext> + Send + Sync>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("invalid {kind} name `{name}`")]
    InvalidName { kind: &'static str, name: String },
    #[error("duplicate {kind} `{name}` in version `{version}`")]
    Duplicate {
        kind: &'static str,
        name: String,
        version: String,
    },
    #[error("{kind} `{name}` input schema must be a JSON object schema")]
    NonObjectSchema { kind: &'static str, name: String },
    #[error("resource `{name}` has invalid mime type `{mime_type}`")]
    InvalidMimeType { name: String, mime_type: String },
    #[error("resource uri `{uri}` is registered twice in version `{version}`")]
    DuplicateUri { uri: String, version: String },
    #[error("invalid version id `{0}`")]
    InvalidVersionId(String),
    #[error("version `{0}` is registered twice")]
    DuplicateVersion(String),
    #[error("server secret must not be empty")]
    EmptySecret,
}

fn is_valid_name(name: &str) -> bool {
    NAME_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(name))
}

#[derive(Debug)]
pub struct Named<T> {
    pub name: String,
    pub def: Arc<T>,
}

#[derive(Debug)]
pub struct RegisteredResource {
    pub name: String,
    pub uri: String,
    pub def: Arc<Resource>,
}

#[derive(Debug)]
pub struct Version {
    id: String,
    name: Option<String>,
    tools: Vec<Named<Tool>>,
    prompts: Vec<Named<Prompt>>,
    resources: Vec<RegisteredResource>,
}

impl Version {
    pub fn builder(id: impl Into<String>) -> VersionBuilder {
        VersionBuilder {
            id: id.into(),
            name: None,
            tools: Vec::new(),
            prompts: Vec::new(),
            resources: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn tool(&self, name: &str) -> Option<&Arc<Tool>> {
        self.tools
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| &entry.def)
    }

    pub fn prompt(&self, name: &str) -> Option<&Arc<Prompt>> {
        self.prompts
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| &entry.def)
    }

    /// Matches the registered URI first, then falls back to the resource name.
    pub fn resource_by_uri(&self, uri: &str) -> Option<&RegisteredResource> {
        self.resources
            .iter()
            .find(|entry| entry.uri == uri)
            .or_else(|| self.resources.iter().find(|entry| entry.name == uri))
    }

    pub fn has_tools(&self) -> bool {
        !self.tools.is_empty()
    }

    pub fn has_prompts(&self) -> bool {
        !self.prompts.is_empty()
    }

    pub fn has_resources(&self) -> bool {
        !self.resources.is_empty()
    }

    pub fn tools_list(&self) -> Vec<ToolDescriptor> {
        self.tools
            .iter()
            .map(|entry| entry.def.describe(&entry.name))
            .collect()
    }

    pub fn tools_io(&self) -> Vec<ToolDescriptor> {
        self.tools
            .iter()
            .map(|entry| entry.def.describe_io(&entry.name))
            .collect()
    }

    pub fn prompts_list(&self) -> Vec<PromptDescriptor> {
        self.prompts
            .iter()
            .map(|entry| entry.def.describe(&entry.name))
            .collect()
    }

    pub fn resources_list(&self) -> Vec<ResourceDescriptor> {
        self.resources
            .iter()
            .map(|entry| entry.def.describe(&entry.name))
            .collect()
    }

    pub fn listing(&self) -> VersionListing {
        VersionListing {
            version_id: self.id.clone(),
            name: self.name.clone(),
            tools: self.tools_io(),
            prompts: self.prompts_list(),
            resources: self.resources_list(),
        }
    }
}

pub struct VersionBuilder {
    id: String,
    name: Option<String>,
    tools: Vec<(String, Tool)>,
    prompts: Vec<(String, Prompt)>,
    resources: Vec<(String, Resource)>,
}

impl VersionBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn tool(mut self, name: impl Into<String>, tool: Tool) -> Self {
        self.tools.push((name.into(), tool));
        self
    }

    pub fn prompt(mut self, name: impl Into<String>, prompt: Prompt) -> Self {
        self.prompts.push((name.into(), prompt));
        self
    }

    pub fn resource(mut self, name: impl Into<String>, resource: Resource) -> Self {
        self.resources.push((name.into(), resource));
        self
    }

    pub fn build(self) -> Result<Version, RegistryError> {
        if !is_valid_name(&self.id) {
            return Err(RegistryError::InvalidVersionId(self.id));
        }

        let version = self.id;
        check_names("tool", &version, self.tools.iter().map(|(name, _)| name))?;
        check_names("prompt", &version, self.prompts.iter().map(|(name, _)| name))?;
        check_names("resource", &version, self.resources.iter().map(|(name, _)| name))?;

        for (name, tool) in &self.tools {
            if !is_object_schema(&tool.input_schema()) {
                return Err(RegistryError::NonObjectSchema {
                    kind: "tool",
                    name: name.clone(),
                });
            }
        }

        for (name, prompt) in &self.prompts {
            if prompt
                .input_schema()
                .is_some_and(|document| !is_object_schema(&document))
            {
                return Err(RegistryError::NonObjectSchema {
                    kind: "prompt",
                    name: name.clone(),
                });
            }
        }

        let mut uris = HashSet::new();
        let mut resources = Vec::with_capacity(self.resources.len());
        for (name, resource) in self.resources {
            if !is_valid_mime_type(resource.mime_type()) {
                return Err(RegistryError::InvalidMimeType {
                    mime_type: resource.mime_type().to_string(),
                    name,
                });
            }

            let uri = resource.uri_for(&name);
            if !uris.insert(uri.clone()) {
                return Err(RegistryError::DuplicateUri { uri, version });
            }
            resources.push(RegisteredResource {
                name,
                uri,
                def: Arc::new(resource),
            });
        }

        Ok(Version {
            tools: self
                .tools
                .into_iter()
                .map(|(name, def)| Named {
                    name,
                    def: Arc::new(def),
                })
                .collect(),
            prompts: self
                .prompts
                .into_iter()
                .map(|(name, def)| Named {
                    name,
                    def: Arc::new(def),
                })
                .collect(),
            resources,
            name: self.name,
            id: version,
        })
    }
}

fn check_names<'a>(
    kind: &'static str,
    version: &str,
    names: impl Iterator<Item = &'a String>,
) -> Result<(), RegistryError> {
    let mut seen = HashSet::new();
    for name in names {
        if !is_valid_name(name) {
            return Err(RegistryError::InvalidName {
                kind,
                name: name.clone(),
            });
        }
        if !seen.insert(name.as_str()) {
            return Err(RegistryError::Duplicate {
                kind,
                name: name.clone(),
                version: version.to_string(),
            });
        }
    }
    Ok(())
}

pub struct Server {
    id: String,
    secret: Arc<str>,
    versions: Vec<Arc<Version>>,
    env: Arc<BTreeMap<String, String>>,
    constants: BTreeMap<String, String>,
    context: Option<ContextFactory>,
}

impl Server {
    pub fn builder(secret: impl Into<String>) -> ServerBuilder {
        ServerBuilder {
            id: env!("CARGO_PKG_NAME").to_string(),
            secret: secret.into(),
            versions: Vec::new(),
            env: BTreeMap::new(),
            constants: BTreeMap::new(),
            context: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn version(&self, id: &str) -> Option<Arc<Version>> {
        self.versions
            .iter()
            .find(|version| version.id() == id)
            .cloned()
    }

    pub fn version_ids(&self) -> Vec<String> {
        self.versions
            .iter()
            .map(|version| version.id().to_string())
            .collect()
    }

    pub fn manifest(&self) -> PlugManifest {
        PlugManifest {
            id: self.id.clone(),
            constants: self.constants.clone(),
            versions: self.versions.iter().map(|version| version.listing()).collect(),
        }
    }

    pub fn request_context(&self, version_id: &str, ids: SessionIds) -> RequestContext {
        let app = self
            .context
            .as_ref()
            .and_then(|factory| factory(&ids, &self.env));
        RequestContext::new(version_id, ids, Arc::clone(&self.env), app)
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("id", &self.id)
            .field("versions", &self.version_ids())
            .field("constants", &self.constants.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

pub struct ServerBuilder {
    id: String,
    secret: String,
    versions: Vec<Version>,
    env: BTreeMap<String, String>,
    constants: BTreeMap<String, String>,
    context: Option<ContextFactory>,
}

impl ServerBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.versions.push(version);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn constant(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.constants.insert(key.into(), value.into());
        self
    }

    pub fn constants(mut self, constants: impl IntoIterator<Item = (String, String)>) -> Self {
        self.constants.extend(constants);
        self
    }

    pub fn context<F>(mut self, factory: F) -> Self
    where
        F: Fn(&SessionIds, &BTreeMap<String, String>) -> Option<AppContext> + Send + Sync + 'static,
    {
        self.context = Some(Arc::new(factory));
        self
    }

    pub fn build(self) -> Result<Server, RegistryError> {
        if self.secret.trim().is_empty() {
            return Err(RegistryError::EmptySecret);
        }

        let mut seen = HashSet::new();
        for version in &self.versions {
            if !seen.insert(version.id().to_string()) {
                return Err(RegistryError::DuplicateVersion(version.id().to_string()));
            }
        }

        Ok(Server {
            id: self.id,
            secret: Arc::from(self.secret),
            versions: self.versions.into_iter().map(Arc::new).collect(),
            env: Arc::new(self.env),
            constants: self.constants,
            context: self.context,
        })
    }
}

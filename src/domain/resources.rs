//! Resource capabilities
//!
//! Resources are addressed by URI. A handler returns text or bytes; bytes are
//! served as base64 data URLs unless the mime type is textual.

use std::{fmt, future::Future, sync::Arc};

use futures_util::{future::BoxFuture, FutureExt};

use crate::domain::content::PayloadKind;
use crate::domain::listing::ResourceDescriptor;
use crate::domain::utils::{is_text_mime, to_data_url, BlobData};
use crate::mcp::{
    rpc::{ErrorCode, McpError},
    session::RequestContext,
};

pub const DEFAULT_RESOURCE_MIME: &str = "text/plain";

type ResourceHandler = Arc<
    dyn Fn(ResourcePayload) -> BoxFuture<'static, Result<ResourceBody, McpError>> + Send + Sync,
>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceBody {
    Text(String),
    Bytes(Vec<u8>),
}

impl From<String> for ResourceBody {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for ResourceBody {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for ResourceBody {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<&[u8]> for ResourceBody {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

pub struct ResourcePayload {
    pub uri: String,
    pub context: RequestContext,
}

impl ResourcePayload {
    pub fn session_id(&self) -> &str {
        &self.context.session_id
    }

    pub fn user_id(&self) -> &str {
        &self.context.user_id
    }

    pub fn not_found(&self) -> McpError {
        McpError::resource_not_found(&self.uri)
    }

    pub fn internal(&self, message: impl Into<String>) -> McpError {
        McpError::with_message(ErrorCode::InternalError, message)
    }
}

pub fn resource(description: impl Into<String>) -> ResourceDraft {
    ResourceDraft {
        description: description.into(),
        uri: None,
        mime_type: DEFAULT_RESOURCE_MIME.to_string(),
    }
}

pub struct ResourceDraft {
    description: String,
    uri: Option<String>,
    mime_type: String,
}

impl ResourceDraft {
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn handle<F, Fut, R>(self, handler: F) -> Resource
    where
        F: Fn(ResourcePayload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, McpError>> + Send + 'static,
        R: Into<ResourceBody>,
    {
        let handler: ResourceHandler = Arc::new(move |payload: ResourcePayload| {
            let call = handler(payload);
            async move {
                let body: Result<ResourceBody, McpError> = call.await.map(Into::into);
                body
            }
            .boxed()
        });

        Resource {
            description: self.description,
            uri: self.uri,
            mime_type: self.mime_type,
            handler,
        }
    }
}

pub struct Resource {
    description: String,
    pub(crate) uri: Option<String>,
    mime_type: String,
    handler: ResourceHandler,
}

impl Resource {
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// The explicit URI, or `resource://{name}` when none was set.
    pub fn uri_for(&self, name: &str) -> String {
        self.uri
            .clone()
            .unwrap_or_else(|| format!("resource://{name}"))
    }

    pub fn describe(&self, name: &str) -> ResourceDescriptor {
        ResourceDescriptor {
            name: name.to_string(),
            uri: self.uri_for(name),
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
        }
    }

    pub async fn invoke(
        &self,
        uri: &str,
        context: RequestContext,
    ) -> Result<(String, PayloadKind), McpError> {
        let payload = ResourcePayload {
            uri: uri.to_string(),
            context,
        };

        match (self.handler)(payload).await? {
            ResourceBody::Text(text) => Ok((text, PayloadKind::Text)),
            ResourceBody::Bytes(bytes) if is_text_mime(&self.mime_type) => Ok((
                to_data_url(BlobData::Bytes(bytes), &self.mime_type),
                PayloadKind::Text,
            )),
            ResourceBody::Bytes(bytes) => Ok((
                to_data_url(BlobData::Bytes(bytes), &self.mime_type),
                PayloadKind::Blob,
            )),
        }
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("description", &self.description)
            .field("uri", &self.uri)
            .field("mime_type", &self.mime_type)
            .finish_non_exhaustive()
    }
}

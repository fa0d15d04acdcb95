//! Per-request session, user and application context

use std::{any::Any, collections::BTreeMap, fmt, sync::Arc};

use axum::http::HeaderMap;
use uuid::Uuid;

pub const SESSION_HEADER: &str = "mcp-session-id";
pub const USER_HEADER: &str = "mcp-user-id";

pub type AppContext = Arc<dyn Any + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIds {
    pub session_id: String,
    pub user_id: String,
}

impl SessionIds {
    /// Ids missing from the headers are freshly generated, so a caller that never
    /// sends them lands in a new session on every request.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            session_id: header_or_random(headers, SESSION_HEADER),
            user_id: header_or_random(headers, USER_HEADER),
        }
    }
}

fn header_or_random(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

#[derive(Clone)]
pub struct RequestContext {
    pub session_id: String,
    pub user_id: String,
    pub version_id: String,
    env: Arc<BTreeMap<String, String>>,
    app: Option<AppContext>,
}

impl RequestContext {
    pub fn new(
        version_id: impl Into<String>,
        ids: SessionIds,
        env: Arc<BTreeMap<String, String>>,
        app: Option<AppContext>,
    ) -> Self {
        Self {
            session_id: ids.session_id,
            user_id: ids.user_id,
            version_id: version_id.into(),
            env,
            app,
        }
    }

    pub fn env(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    pub fn app<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.app.as_deref().and_then(|app| app.downcast_ref::<T>())
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("session_id", &self.session_id)
            .field("user_id", &self.user_id)
            .field("version_id", &self.version_id)
            .field("has_app_context", &self.app.is_some())
            .finish_non_exhaustive()
    }
}

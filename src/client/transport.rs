//! Transport used by the aggregator to reach a toolplug server

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        RwLock,
    },
    time::Duration,
};

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde_json::{json, Value};
use tracing::debug;

use crate::client::ClientError;
use crate::domain::listing::PlugManifest;
use crate::mcp::{
    rpc::JSONRPC_VERSION,
    session::{SESSION_HEADER, USER_HEADER},
};

#[async_trait]
pub trait Transport: Send + Sync {
    async fn manifest(&self) -> Result<PlugManifest, ClientError>;

    /// Sends one JSON-RPC request to `version_id` and returns its `result` member.
    async fn call(&self, version_id: &str, method: &str, params: Value)
        -> Result<Value, ClientError>;
}

/// Splits a decoded JSON-RPC response into its result or an [`ClientError::Rpc`].
pub fn rpc_result(response: Value) -> Result<Value, ClientError> {
    if let Some(error) = response.get("error") {
        return Err(ClientError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            data: error.get("data").cloned(),
        });
    }

    response
        .get("result")
        .cloned()
        .ok_or_else(|| ClientError::Decode("response has neither result nor error".to_string()))
}

#[derive(Debug, Clone)]
pub struct HttpTransportOptions {
    pub base_url: String,
    pub token: String,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub timeout: Duration,
}

impl HttpTransportOptions {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            session_id: None,
            user_id: None,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    token: String,
    user_id: Option<String>,
    session_id: RwLock<Option<String>>,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(opts: HttpTransportOptions) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(opts.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            http,
            base_url: opts.base_url.trim_end_matches('/').to_string(),
            token: opts.token,
            user_id: opts.user_id,
            session_id: RwLock::new(opts.session_id),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().ok().and_then(|guard| guard.clone())
    }

    fn decorate(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let mut request = request.header(AUTHORIZATION, format!("Bearer {}", self.token));
        if let Some(session_id) = self.session_id() {
            request = request.header(SESSION_HEADER, session_id);
        }
        if let Some(user_id) = &self.user_id {
            request = request.header(USER_HEADER, user_id);
        }
        request
    }

    /// Keeps the first session id the server assigns when none was configured.
    fn adopt_session(&self, response: &reqwest::Response) {
        let Some(assigned) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
        else {
            return;
        };

        if let Ok(mut session_id) = self.session_id.write() {
            if session_id.is_none() {
                debug!(session_id = %assigned, "adopted server session id");
                *session_id = Some(assigned.to_string());
            }
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, ClientError> {
        let response = self.decorate(request).send().await?;
        self.adopt_session(&response);

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|err| ClientError::Decode(err.to_string()))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn manifest(&self) -> Result<PlugManifest, ClientError> {
        let url = format!("{}/mcp", self.base_url);
        let body = self.send(self.http.get(url)).await?;
        serde_json::from_value(body).map_err(|err| ClientError::Decode(err.to_string()))
    }

    async fn call(
        &self,
        version_id: &str,
        method: &str,
        params: Value,
    ) -> Result<Value, ClientError> {
        let url = format!("{}/mcp/{version_id}", self.base_url);
        let request = json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        let response = self.send(self.http.post(url).json(&request)).await?;
        rpc_result(response)
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{
        matchers::{body_partial_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    fn transport(server: &MockServer) -> HttpTransport {
        HttpTransport::new(HttpTransportOptions {
            user_id: Some("user-1".to_string()),
            ..HttpTransportOptions::new(server.uri(), "test-token")
        })
        .expect("client builds")
    }

    #[tokio::test]
    async fn fetches_manifest_and_adopts_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mcp"))
            .and(header("authorization", "Bearer test-token"))
            .and(header("mcp-user-id", "user-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("mcp-session-id", "assigned-session")
                    .set_body_json(json!({
                        "id": "weather",
                        "constants": { "REGION": "eu" },
                        "versions": [{ "versionId": "1.0.0", "tools": [] }]
                    })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let transport = transport(&server);
        let manifest = transport.manifest().await.expect("manifest");
        assert_eq!(manifest.id, "weather");
        assert_eq!(manifest.versions[0].version_id, "1.0.0");
        assert_eq!(transport.session_id().as_deref(), Some("assigned-session"));
    }

    #[tokio::test]
    async fn sends_adopted_session_on_later_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp/1.0.0"))
            .and(header("mcp-session-id", "fixed"))
            .and(body_partial_json(json!({ "method": "tools/call" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": { "content": [{ "type": "text", "text": "ok" }] }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(HttpTransportOptions {
            session_id: Some("fixed".to_string()),
            ..HttpTransportOptions::new(format!("{}/", server.uri()), "test-token")
        })
        .expect("client builds");

        let result = transport
            .call("1.0.0", "tools/call", json!({ "name": "echo" }))
            .await
            .expect("result");
        assert_eq!(result["content"][0]["text"], "ok");
    }

    #[tokio::test]
    async fn surfaces_rpc_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp/1.0.0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": -32601, "message": "Method not found" }
            })))
            .mount(&server)
            .await;

        let error = transport(&server)
            .call("1.0.0", "tools/call", json!({ "name": "missing" }))
            .await
            .expect_err("rpc error");
        assert!(matches!(error, ClientError::Rpc { code: -32601, .. }));
    }

    #[tokio::test]
    async fn surfaces_http_status_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mcp"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let error = transport(&server).manifest().await.expect_err("401");
        match error {
            ClientError::Status { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "unauthorized");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

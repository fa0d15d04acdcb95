//! Axum HTTP handlers for the web server
//!
//! Provides the per-version JSON-RPC endpoint, the plug manifest and listings,
//! and general metadata endpoints.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;

use crate::domain::listing::{PlugManifest, VersionListing};
use crate::errors::AppError;
use crate::mcp::{
    rpc::{json_rpc_error, ErrorCode},
    server::handle_json_rpc_value,
    session::{SessionIds, SESSION_HEADER, USER_HEADER},
};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryResponse {
    pub name: String,
    pub version: &'static str,
    pub mcp_endpoint: &'static str,
    pub versions: Vec<String>,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn discovery(State(state): State<AppState>) -> Json<DiscoveryResponse> {
    Json(DiscoveryResponse {
        name: state.server.id().to_string(),
        version: env!("CARGO_PKG_VERSION"),
        mcp_endpoint: "/mcp/{version}",
        versions: state.server.version_ids(),
    })
}

pub async fn manifest(State(state): State<AppState>) -> Json<PlugManifest> {
    Json(state.server.manifest())
}

pub async fn version_listing(
    State(state): State<AppState>,
    Path(version_id): Path<String>,
) -> Result<Json<VersionListing>, AppError> {
    let version = state
        .server
        .version(&version_id)
        .ok_or_else(|| AppError::unknown_version(&version_id))?;
    Ok(Json(version.listing()))
}

/// Batch members run concurrently; responses keep the order of the request array.
pub async fn mcp_endpoint(
    State(state): State<AppState>,
    Path(version_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let version = state
        .server
        .version(&version_id)
        .ok_or_else(|| AppError::unknown_version(&version_id))?;

    let ids = SessionIds::from_headers(&headers);
    let context = state.server.request_context(version.id(), ids.clone());

    let reply = match serde_json::from_slice::<Value>(&body) {
        Err(_) => Some(json_rpc_error(None, ErrorCode::ParseError)),
        Ok(Value::Array(batch)) if batch.is_empty() => {
            Some(json_rpc_error(None, ErrorCode::InvalidRequest))
        }
        Ok(Value::Array(batch)) => {
            let responses: Vec<Value> = join_all(
                batch
                    .into_iter()
                    .map(|item| handle_json_rpc_value(&version, &context, item)),
            )
            .await
            .into_iter()
            .flatten()
            .collect();
            (!responses.is_empty()).then_some(Value::Array(responses))
        }
        Ok(payload) => handle_json_rpc_value(&version, &context, payload).await,
    };

    let mut response = match reply {
        Some(body) => (StatusCode::OK, Json(body)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    };
    attach_session_headers(response.headers_mut(), &ids);
    Ok(response)
}

fn attach_session_headers(headers: &mut HeaderMap, ids: &SessionIds) {
    for (name, value) in [(SESSION_HEADER, &ids.session_id), (USER_HEADER, &ids.user_id)] {
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
}

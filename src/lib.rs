use std::sync::Arc;

use axum::{middleware, routing::get, Router};

pub mod auth;
pub mod client;
pub mod config;
pub mod demo;
pub mod domain;
pub mod errors;
pub mod http;
pub mod logging;
pub mod mcp;
pub mod registry;
pub mod schema;

use registry::Server;

#[derive(Clone)]
pub struct AppState {
    pub server: Arc<Server>,
}

impl AppState {
    pub fn new(server: Server) -> Self {
        Self {
            server: Arc::new(server),
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/mcp", get(http::handlers::manifest))
        .route(
            "/mcp/{version}",
            get(http::handlers::version_listing).post(http::handlers::mcp_endpoint),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer_token,
        ));

    Router::new()
        .route("/health", get(http::handlers::health))
        .route("/.well-known/mcp", get(http::handlers::discovery))
        .merge(protected)
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}

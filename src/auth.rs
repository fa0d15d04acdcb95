//! Bearer-token gate in front of the manifest and the versioned endpoints

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    typed_header::TypedHeaderRejection,
    TypedHeader,
};
use tracing::warn;

use crate::{errors::AppError, AppState};

fn token_matches(presented: &str, secret: &str) -> bool {
    presented.as_bytes() == secret.as_bytes()
}

pub async fn require_bearer_token(
    State(state): State<AppState>,
    auth_header: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let path = request.uri().path().to_string();

    let auth = match auth_header {
        Ok(TypedHeader(auth)) => auth,
        Err(rejection) if rejection.is_missing() => {
            warn!(path = %path, "request without bearer token rejected");
            return Err(AppError::unauthorized(
                "missing_token",
                "missing authorization header",
            ));
        }
        Err(_) => {
            warn!(path = %path, "request with malformed authorization header rejected");
            return Err(AppError::unauthorized(
                "invalid_token",
                "invalid bearer token",
            ));
        }
    };

    if !token_matches(auth.token(), state.server.secret()) {
        warn!(path = %path, "request with wrong bearer token rejected");
        return Err(AppError::unauthorized(
            "invalid_token",
            "invalid bearer token",
        ));
    }

    Ok(next.run(request).await)
}

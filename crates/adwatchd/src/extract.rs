//! Caller identity from request headers

use adwatch_core::Viewer;
use axum::{extract::FromRequestParts, http::request::Parts};

use crate::ApiError;

/// Opaque user identity supplied by the fronting auth layer
pub const USER_ID_HEADER: &str = "x-user-id";

/// Per-client key for ephemeral sessions
pub const CLIENT_TOKEN_HEADER: &str = "x-client-token";

/// The acting user. Rejects with `401` when no identity is present.
#[derive(Debug, Clone)]
pub struct Actor(pub Viewer);

fn header_value(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)?
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header_value(parts, USER_ID_HEADER).ok_or(ApiError::Unauthenticated)?;

        let mut viewer = Viewer::new(user_id);
        if let Some(token) = header_value(parts, CLIENT_TOKEN_HEADER) {
            viewer = viewer.with_client_token(token);
        }

        Ok(Actor(viewer))
    }
}

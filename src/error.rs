use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::time::Duration;
use thiserror::Error;

use crate::manager::LoadState;

/// RouteError
///
/// Raised at the boundary when a caller-supplied route string cannot be
/// normalized into a `RoutePath`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("route is empty")]
    Empty,
    #[error("route must start with '/': {0:?}")]
    MissingLeadingSlash(String),
    #[error("route contains invalid character {1:?}: {0:?}")]
    InvalidCharacter(String, char),
    #[error("route contains a '.' or '..' segment: {0:?}")]
    DotSegment(String),
}

/// UnknownRoleError
///
/// A role identifier outside the closed `Role` enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role: {0:?}")]
pub struct UnknownRoleError(pub String);

/// StoreError
///
/// Failures reported by a `PermissionStore` backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or refused the operation.
    #[error("permission store unavailable: {0}")]
    Unavailable(String),
    /// The stored snapshot exists but cannot be decoded.
    #[error("stored snapshot is malformed: {0}")]
    Malformed(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Malformed(e.to_string())
    }
}

/// ConfigLoadError
///
/// Fatal to the access-control subsystem: the process must not serve
/// protected routes without authorization data.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("could not read permission snapshot: {0}")]
    Store(#[source] StoreError),
    #[error("permission snapshot is malformed: {0}")]
    Malformed(String),
    #[error("loading permissions timed out after {0:?}")]
    Timeout(Duration),
}

impl From<StoreError> for ConfigLoadError {
    fn from(e: StoreError) -> Self {
        match e {
            // Decoding failures are reported as malformed regardless of backend.
            StoreError::Malformed(msg) => ConfigLoadError::Malformed(msg),
            other => ConfigLoadError::Store(other),
        }
    }
}

/// PersistenceError
///
/// `save_permissions()` failed. Recoverable: in-memory edits are retained.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("could not write permission snapshot: {0}")]
    Store(#[from] StoreError),
    #[error("saving permissions timed out after {0:?}")]
    Timeout(Duration),
    #[error("nothing to save: permissions are {0}")]
    NotReady(LoadState),
}

/// AccessError
///
/// The error type surfaced by `AccessManager` to callers and HTTP handlers.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("access control is not ready (state: {0})")]
    NotReady(LoadState),
    #[error("invalid route: {0}")]
    InvalidRoute(#[from] RouteError),
    #[error("no rule configured for route {0}")]
    UnknownRoute(String),
    #[error(transparent)]
    Load(#[from] ConfigLoadError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl AccessError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AccessError::InvalidRoute(_) => StatusCode::BAD_REQUEST,
            AccessError::UnknownRoute(_) => StatusCode::NOT_FOUND,
            // Authorization data is unavailable: fail closed.
            AccessError::NotReady(_) | AccessError::Load(_) | AccessError::Persistence(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }
}

impl IntoResponse for AccessError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("access control error: {}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// ApiError
///
/// Handler-level failures: the engine's own errors plus an authorization
/// refusal for the admin surface.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("role {0} may not manage route permissions")]
    Forbidden(crate::models::Role),
    #[error(transparent)]
    Access(#[from] AccessError),
}

impl From<PersistenceError> for ApiError {
    fn from(e: PersistenceError) -> Self {
        ApiError::Access(AccessError::Persistence(e))
    }
}

impl From<ConfigLoadError> for ApiError {
    fn from(e: ConfigLoadError) -> Self {
        ApiError::Access(AccessError::Load(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Forbidden(_) => (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({ "error": self.to_string() })),
            )
                .into_response(),
            ApiError::Access(e) => e.into_response(),
        }
    }
}

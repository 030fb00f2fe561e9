use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Read-only decision endpoints for the routing layer and monitoring.
/// Each answer reflects the live configuration, unsaved edits included.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness only; does not report whether permissions are loaded.
        .route("/health", get(|| async { "ok" }))
        // GET /access/check?route=...&role=...
        // Allow/deny decision plus the reason, for callers that already know the role.
        .route("/access/check", get(handlers::check_access))
        // GET /access/public?route=...
        .route("/access/public", get(handlers::route_is_public))
        // GET /access/roles/{role}/routes
        // Derived listing of every configured route a role can reach.
        .route("/access/roles/{role}/routes", get(handlers::get_role_routes))
}

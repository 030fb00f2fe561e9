use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Admin Router Module
///
/// The permission editor. Nested under `/admin`, so these paths are
/// themselves administrative routes governed by `adminRoutes`: each handler
/// requires the caller's role to be granted `/admin/permissions`.
///
/// Edits are in-memory until `POST /permissions/save`.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/permissions
        // The full live configuration in snapshot form.
        .route("/permissions", get(handlers::get_permissions))
        // GET /admin/permissions/status
        .route("/permissions/status", get(handlers::get_permissions_status))
        // GET/PUT/DELETE /admin/permissions/rule
        // Read, replace (wholesale) or remove the rule for one route.
        .route(
            "/permissions/rule",
            get(handlers::get_rule)
                .put(handlers::update_rule)
                .delete(handlers::delete_rule),
        )
        // POST /admin/permissions/save
        // One atomic write of both namespaces to the durable store.
        .route("/permissions/save", post(handlers::save_permissions))
        // POST /admin/permissions/reload
        .route("/permissions/reload", post(handlers::reload_permissions))
}

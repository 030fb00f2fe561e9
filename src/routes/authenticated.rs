use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Authenticated Router Module
///
/// Decisions for the signed-in caller. Every handler receives the
/// `AuthUser` resolved by the layer in `create_router`, so the role comes
/// from the validated token rather than from the request.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /me/access?route=...
        .route("/me/access", get(handlers::get_my_access))
        // GET /me/routes
        // Navigation helper: every route the caller's role can reach.
        .route("/me/routes", get(handlers::get_my_routes))
}

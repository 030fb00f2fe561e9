use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Route access control engine.
pub mod defaults;
pub mod engine;
pub mod error;
pub mod manager;
pub mod models;
pub mod resolver;

// Persistence collaborators.
pub mod repository;
pub mod storage;

// HTTP surface and ambient services.
pub mod auth;
pub mod config;
pub mod handlers;
pub mod routes;

use auth::AuthUser;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use engine::{DefaultPolicy, Decision, DecisionReason};
pub use error::{AccessError, ConfigLoadError, PersistenceError};
pub use manager::{AccessManager, AccessState, ConfigEvent, LoadState, ManagerSettings};
pub use models::{AccessControlConfig, AccessControlSnapshot, PermissionRule, Role, RoutePath};
pub use repository::{InMemoryPermissionStore, PermissionStore, PostgresPermissionStore, StoreState};
pub use storage::S3PermissionStore;

/// ApiDoc
///
/// OpenAPI document for the access control API, served at
/// `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::check_access, handlers::route_is_public, handlers::get_role_routes,
        handlers::get_my_access, handlers::get_my_routes,
        handlers::get_permissions, handlers::get_permissions_status, handlers::get_rule,
        handlers::update_rule, handlers::delete_rule, handlers::save_permissions,
        handlers::reload_permissions
    ),
    components(
        schemas(
            models::Role, models::PermissionRule, models::AccessControlSnapshot,
            models::UpdateRuleRequest, models::AccessDecisionResponse,
            models::RoutePublicResponse, models::RouteRuleResponse,
            engine::DefaultPolicy, engine::DecisionReason, engine::AccessibleRoute,
            resolver::Namespace, manager::AccessStatus, manager::LoadSource,
        )
    ),
    tags(
        (name = "route-access", description = "Route Access Control API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single container of shared services handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// The access control engine and its live configuration.
    pub access: AccessState,
    /// Configuration: the loaded, immutable environment configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for AccessState {
    fn from_ref(app_state: &AppState) -> AccessState {
        app_state.access.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Rejects the request with 401 unless `AuthUser` can be extracted.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routers, scoped middleware, observability layers and state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        // Admin handlers authenticate via `AuthUser` and then ask the engine
        // whether the caller's role is granted `/admin/permissions`.
        .nest("/admin", admin::admin_routes())
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Puts the `x-request-id` into every request span so all log lines of one
/// request correlate.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}

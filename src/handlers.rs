use crate::{
    AppState,
    auth::AuthUser,
    engine::AccessibleRoute,
    error::{AccessError, ApiError},
    manager::{AccessState, AccessStatus},
    models::{
        AccessControlSnapshot, AccessDecisionResponse, AccessQuery, PermissionRule, Role,
        RoutePublicResponse, RouteQuery, RouteRuleResponse, UpdateRuleRequest,
    },
    resolver::ResolvedRoute,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

/// The admin route that guards the permission editor itself. Callers of the
/// `/admin/permissions/*` endpoints must be granted this route by the engine.
pub const PERMISSIONS_EDITOR_ROUTE: &str = "/admin/permissions";

/// require_permissions_editor
///
/// Evaluates the caller's role against `PERMISSIONS_EDITOR_ROUTE` with the
/// live configuration. Fails closed when the engine is not ready.
fn require_permissions_editor(state: &AppState, user: &AuthUser) -> Result<(), ApiError> {
    if state.access.has_access(PERMISSIONS_EDITOR_ROUTE, user.role)? {
        Ok(())
    } else {
        tracing::warn!("User {} ({}) denied permission editor access", user.id, user.role);
        Err(ApiError::Forbidden(user.role))
    }
}

fn rule_response(resolved: ResolvedRoute, rule: PermissionRule) -> RouteRuleResponse {
    RouteRuleResponse {
        route: resolved.full_path(),
        namespace: resolved.namespace,
        key: resolved.key.as_str().to_string(),
        rule,
    }
}

// --- Public Handlers ---

/// check_access
///
/// [Public Route] Decides whether `role` may view `route`. Consumed by the
/// routing layer, which supplies the role it already resolved.
#[utoipa::path(
    get,
    path = "/access/check",
    params(AccessQuery),
    responses(
        (status = 200, description = "Decision", body = AccessDecisionResponse),
        (status = 503, description = "Permissions not loaded")
    )
)]
pub async fn check_access(
    State(access): State<AccessState>,
    Query(query): Query<AccessQuery>,
) -> Result<Json<AccessDecisionResponse>, AccessError> {
    let decision = access.evaluate(&query.route, query.role)?;
    Ok(Json(AccessDecisionResponse {
        route: query.route,
        role: query.role,
        allowed: decision.allowed,
        reason: decision.reason,
    }))
}

/// route_is_public
///
/// [Public Route] True only when the route has a rule and that rule is public.
#[utoipa::path(
    get,
    path = "/access/public",
    params(RouteQuery),
    responses((status = 200, description = "Public flag", body = RoutePublicResponse))
)]
pub async fn route_is_public(
    State(access): State<AccessState>,
    Query(query): Query<RouteQuery>,
) -> Result<Json<RoutePublicResponse>, AccessError> {
    let is_public = access.is_route_public(&query.route)?;
    Ok(Json(RoutePublicResponse {
        route: query.route,
        is_public,
    }))
}

/// get_role_routes
///
/// [Public Route] Every configured route the given role can reach.
#[utoipa::path(
    get,
    path = "/access/roles/{role}/routes",
    params(("role" = Role, Path, description = "Role identifier")),
    responses((status = 200, description = "Reachable routes", body = [AccessibleRoute]))
)]
pub async fn get_role_routes(
    State(access): State<AccessState>,
    Path(role): Path<Role>,
) -> Result<Json<Vec<AccessibleRoute>>, AccessError> {
    Ok(Json(access.rules_for_role(role)?))
}

// --- Authenticated Handlers ---

/// get_my_access
///
/// [Authenticated Route] Decision for the caller's own role.
#[utoipa::path(
    get,
    path = "/me/access",
    params(RouteQuery),
    responses((status = 200, description = "Decision", body = AccessDecisionResponse))
)]
pub async fn get_my_access(
    AuthUser { role, .. }: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<RouteQuery>,
) -> Result<Json<AccessDecisionResponse>, AccessError> {
    let decision = state.access.evaluate(&query.route, role)?;
    Ok(Json(AccessDecisionResponse {
        route: query.route,
        role,
        allowed: decision.allowed,
        reason: decision.reason,
    }))
}

/// get_my_routes
///
/// [Authenticated Route] Routes the caller's role can reach, e.g. to build navigation.
#[utoipa::path(
    get,
    path = "/me/routes",
    responses((status = 200, description = "Reachable routes", body = [AccessibleRoute]))
)]
pub async fn get_my_routes(
    AuthUser { role, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<AccessibleRoute>>, AccessError> {
    Ok(Json(state.access.rules_for_role(role)?))
}

// --- Admin Handlers ---

/// get_permissions
///
/// [Admin Route] The full live configuration, including unsaved edits.
#[utoipa::path(
    get,
    path = "/admin/permissions",
    responses(
        (status = 200, description = "Live configuration", body = AccessControlSnapshot),
        (status = 403, description = "Not a permissions editor")
    )
)]
pub async fn get_permissions(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<AccessControlSnapshot>, ApiError> {
    require_permissions_editor(&state, &user)?;
    Ok(Json(state.access.snapshot()?.to_snapshot()))
}

/// get_permissions_status
///
/// [Admin Route] Load state, dirty flag and counts.
#[utoipa::path(
    get,
    path = "/admin/permissions/status",
    responses((status = 200, description = "Status", body = AccessStatus))
)]
pub async fn get_permissions_status(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<AccessStatus>, ApiError> {
    require_permissions_editor(&state, &user)?;
    Ok(Json(state.access.status()))
}

/// get_rule
///
/// [Admin Route] The stored rule for one route. 404 distinguishes a route
/// with no rule from one whose rule denies everyone.
#[utoipa::path(
    get,
    path = "/admin/permissions/rule",
    params(RouteQuery),
    responses(
        (status = 200, description = "Rule", body = RouteRuleResponse),
        (status = 404, description = "No rule for route")
    )
)]
pub async fn get_rule(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<RouteQuery>,
) -> Result<Json<RouteRuleResponse>, ApiError> {
    require_permissions_editor(&state, &user)?;
    let (resolved, rule) = state.access.rule_for(&query.route)?;
    Ok(Json(rule_response(resolved, rule)))
}

/// update_rule
///
/// [Admin Route] Replaces one rule in memory. Not durable until
/// `POST /admin/permissions/save`.
#[utoipa::path(
    put,
    path = "/admin/permissions/rule",
    request_body = UpdateRuleRequest,
    responses(
        (status = 200, description = "Updated", body = RouteRuleResponse),
        (status = 400, description = "Malformed route")
    )
)]
pub async fn update_rule(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdateRuleRequest>,
) -> Result<Json<RouteRuleResponse>, ApiError> {
    require_permissions_editor(&state, &user)?;
    let resolved = state
        .access
        .update_route_access(&payload.route, payload.rule.clone())?;
    tracing::info!("User {} updated rule for {}", user.id, resolved.full_path());
    Ok(Json(rule_response(resolved, payload.rule)))
}

/// delete_rule
///
/// [Admin Route] Removes a stale rule in memory.
#[utoipa::path(
    delete,
    path = "/admin/permissions/rule",
    params(RouteQuery),
    responses(
        (status = 200, description = "Removed", body = RouteRuleResponse),
        (status = 404, description = "No rule for route")
    )
)]
pub async fn delete_rule(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<RouteQuery>,
) -> Result<Json<RouteRuleResponse>, ApiError> {
    require_permissions_editor(&state, &user)?;
    let (resolved, rule) = state.access.remove_route_access(&query.route)?;
    tracing::info!("User {} removed rule for {}", user.id, resolved.full_path());
    Ok(Json(rule_response(resolved, rule)))
}

/// save_permissions
///
/// [Admin Route] Flushes the whole configuration to the durable store.
/// On failure the edits stay in memory and the client may retry.
#[utoipa::path(
    post,
    path = "/admin/permissions/save",
    responses(
        (status = 204, description = "Saved"),
        (status = 503, description = "Store unavailable; edits retained")
    )
)]
pub async fn save_permissions(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    require_permissions_editor(&state, &user)?;
    state.access.save_permissions().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// reload_permissions
///
/// [Admin Route] Re-reads the durable snapshot, discarding unsaved edits.
/// A failed reload keeps the current rules in service.
#[utoipa::path(
    post,
    path = "/admin/permissions/reload",
    responses(
        (status = 200, description = "Reloaded", body = AccessStatus),
        (status = 503, description = "Store unavailable or snapshot malformed")
    )
)]
pub async fn reload_permissions(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<AccessStatus>, ApiError> {
    require_permissions_editor(&state, &user)?;
    state.access.load().await?;
    Ok(Json(state.access.status()))
}

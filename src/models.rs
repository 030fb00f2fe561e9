use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{
    engine::DecisionReason,
    error::{RouteError, UnknownRoleError},
    resolver::{self, Namespace},
};

// --- Role Registry ---

/// Role
///
/// The closed set of authorization classes recognized by the engine.
/// Roles carry no hierarchy: `super_admin` does not imply `manager`. Any
/// such relationship must be spelled out in a rule's allow-list.
///
/// The derived ordering exists only so allow-lists serialize deterministically.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Role {
    /// Unauthenticated or anonymous caller.
    Visitor,
    ClientStandard,
    ClientPremium,
    Contributor,
    Manager,
    BusinessAdmin,
    SuperAdmin,
}

impl Role {
    /// Every registered role, in registry order.
    pub const ALL: [Role; 7] = [
        Role::Visitor,
        Role::ClientStandard,
        Role::ClientPremium,
        Role::Contributor,
        Role::Manager,
        Role::BusinessAdmin,
        Role::SuperAdmin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Visitor => "visitor",
            Role::ClientStandard => "client_standard",
            Role::ClientPremium => "client_premium",
            Role::Contributor => "contributor",
            Role::Manager => "manager",
            Role::BusinessAdmin => "business_admin",
            Role::SuperAdmin => "super_admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRoleError;

    /// Exact match only; no case folding or aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownRoleError(s.to_string()))
    }
}

// --- Permission Rule ---

/// PermissionRule
///
/// The atomic authorization unit for one route. A pure value: equality is
/// structural and no rule references another.
///
/// `is_public = false` with an empty `allowed_roles` is a valid rule that
/// denies every role.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PermissionRule {
    /// When true every role is granted access, regardless of `allowed_roles`.
    pub is_public: bool,
    /// Roles granted access when the rule is not public.
    #[serde(default)]
    pub allowed_roles: BTreeSet<Role>,
    /// Documentation only. Never consulted during evaluation.
    #[serde(default)]
    pub description: Option<String>,
}

impl PermissionRule {
    pub fn public() -> Self {
        Self {
            is_public: true,
            ..Self::default()
        }
    }

    pub fn restricted<I>(roles: I) -> Self
    where
        I: IntoIterator<Item = Role>,
    {
        Self {
            is_public: false,
            allowed_roles: roles.into_iter().collect(),
            description: None,
        }
    }

    /// A rule that no role satisfies.
    pub fn deny_all() -> Self {
        Self::default()
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The rule's own verdict for `role`, independent of any route lookup.
    pub fn permits(&self, role: Role) -> bool {
        self.is_public || self.allowed_roles.contains(&role)
    }
}

// --- Route Path ---

/// RoutePath
///
/// A normalized lookup key. Ordinary routes are stored as full paths
/// (`/services`); administrative routes are stored as the remainder after
/// the admin prefix (`services`, or `""` for the admin root).
///
/// Normalization: must start with `/`; whitespace, control characters, `?`,
/// `#` and `%` are rejected, as are `.` and `..` segments; ASCII is
/// lowercased; repeated slashes collapse; a trailing slash is dropped except
/// for the root. Every accepted route therefore has exactly one spelling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoutePath(String);

impl RoutePath {
    /// Normalizes a caller-supplied route string.
    pub fn parse(raw: &str) -> Result<Self, RouteError> {
        if raw.is_empty() {
            return Err(RouteError::Empty);
        }
        if !raw.starts_with('/') {
            return Err(RouteError::MissingLeadingSlash(raw.to_string()));
        }
        // Percent-escapes are not decoded: `/%61dmin` would otherwise name
        // `/admin` under a second spelling.
        if let Some(c) = raw
            .chars()
            .find(|c| c.is_whitespace() || c.is_control() || matches!(c, '?' | '#' | '%'))
        {
            return Err(RouteError::InvalidCharacter(raw.to_string(), c));
        }

        let segments: Vec<String> = raw
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| match segment {
                "." | ".." => Err(RouteError::DotSegment(raw.to_string())),
                _ => Ok(segment.to_ascii_lowercase()),
            })
            .collect::<Result<_, _>>()?;

        Ok(RoutePath(format!("/{}", segments.join("/"))))
    }

    /// Wraps an already-normalized key. Only the resolver builds keys this way.
    pub(crate) fn from_normalized(key: String) -> Self {
        RoutePath(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoutePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoutePath {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RoutePath::parse(s)
    }
}

// --- Access Control Config ---

/// AccessControlConfig
///
/// The complete rule set for both namespaces. Keys are validated
/// `RoutePath`s; the evaluation operations live in `engine`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccessControlConfig {
    pub(crate) routes: BTreeMap<RoutePath, PermissionRule>,
    pub(crate) admin_routes: BTreeMap<RoutePath, PermissionRule>,
}

impl AccessControlConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ordinary application routes, keyed by full path.
    pub fn routes(&self) -> &BTreeMap<RoutePath, PermissionRule> {
        &self.routes
    }

    /// Administrative routes, keyed without the admin prefix.
    pub fn admin_routes(&self) -> &BTreeMap<RoutePath, PermissionRule> {
        &self.admin_routes
    }

    pub(crate) fn namespace(&self, namespace: Namespace) -> &BTreeMap<RoutePath, PermissionRule> {
        match namespace {
            Namespace::Routes => &self.routes,
            Namespace::AdminRoutes => &self.admin_routes,
        }
    }

    pub(crate) fn namespace_mut(
        &mut self,
        namespace: Namespace,
    ) -> &mut BTreeMap<RoutePath, PermissionRule> {
        match namespace {
            Namespace::Routes => &mut self.routes,
            Namespace::AdminRoutes => &mut self.admin_routes,
        }
    }

    /// Serializable view of both namespaces.
    pub fn to_snapshot(&self) -> AccessControlSnapshot {
        let collect = |map: &BTreeMap<RoutePath, PermissionRule>| {
            map.iter()
                .map(|(key, rule)| (key.as_str().to_string(), rule.clone()))
                .collect()
        };
        AccessControlSnapshot {
            routes: collect(&self.routes),
            admin_routes: collect(&self.admin_routes),
        }
    }
}

/// AccessControlSnapshot
///
/// The durable JSON shape shared with every `PermissionStore`:
///
/// ```json
/// {
///   "routes": {
///     "/path": { "isPublic": false, "allowedRoles": ["manager"], "description": null }
///   },
///   "adminRoutes": { "services": { ... } }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AccessControlSnapshot {
    #[serde(default)]
    pub routes: BTreeMap<String, PermissionRule>,
    #[serde(default)]
    pub admin_routes: BTreeMap<String, PermissionRule>,
}

impl TryFrom<AccessControlSnapshot> for AccessControlConfig {
    type Error = String;

    /// Adopts a snapshot verbatim, rejecting keys that are not already in
    /// normalized form or that the resolver would route to the other namespace.
    fn try_from(snapshot: AccessControlSnapshot) -> Result<Self, Self::Error> {
        let mut config = AccessControlConfig::new();

        for (key, rule) in snapshot.routes {
            let resolved = resolver::resolve(&key).map_err(|e| format!("routes[{key:?}]: {e}"))?;
            if resolved.namespace != Namespace::Routes || resolved.key.as_str() != key {
                return Err(format!(
                    "routes[{key:?}] is not a normalized ordinary route (resolves to {})",
                    resolved
                ));
            }
            config.routes.insert(resolved.key, rule);
        }

        for (key, rule) in snapshot.admin_routes {
            let resolved = resolver::resolve(&resolver::full_path(Namespace::AdminRoutes, &key))
                .map_err(|e| format!("adminRoutes[{key:?}]: {e}"))?;
            if resolved.namespace != Namespace::AdminRoutes || resolved.key.as_str() != key {
                return Err(format!(
                    "adminRoutes[{key:?}] is not a normalized admin key (resolves to {})",
                    resolved
                ));
            }
            config.admin_routes.insert(resolved.key, rule);
        }

        Ok(config)
    }
}

// --- Request Payloads (Input Schemas) ---

/// AccessQuery
///
/// Query parameters for the explicit-role decision endpoint.
#[derive(Debug, Clone, Deserialize, utoipa::IntoParams)]
pub struct AccessQuery {
    pub route: String,
    pub role: Role,
}

/// RouteQuery
#[derive(Debug, Clone, Deserialize, utoipa::IntoParams)]
pub struct RouteQuery {
    pub route: String,
}

/// UpdateRuleRequest
///
/// Body of `PUT /admin/permissions/rule`. The rule replaces whatever is
/// stored for `route`; fields are never merged.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateRuleRequest {
    #[schema(example = "/admin/services")]
    pub route: String,
    pub rule: PermissionRule,
}

// --- Responses (Output Schemas) ---

/// AccessDecisionResponse
///
/// A single decision, including the reason so callers can log it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AccessDecisionResponse {
    pub route: String,
    pub role: Role,
    pub allowed: bool,
    pub reason: DecisionReason,
}

/// RoutePublicResponse
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RoutePublicResponse {
    pub route: String,
    pub is_public: bool,
}

/// RouteRuleResponse
///
/// A stored rule together with where the resolver placed it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RouteRuleResponse {
    pub route: String,
    pub namespace: Namespace,
    pub key: String,
    pub rule: PermissionRule,
}

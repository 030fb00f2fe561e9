use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{
    error::{AccessError, RouteError},
    models::{AccessControlConfig, PermissionRule, Role},
    resolver::{self, Namespace, ResolvedRoute},
};

/// DefaultPolicy
///
/// The decision for a well-formed route that has no rule in either
/// namespace. Deployments choose it explicitly; `Deny` is the default.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum DefaultPolicy {
    Allow,
    #[default]
    Deny,
}

impl DefaultPolicy {
    fn allows(self) -> bool {
        matches!(self, DefaultPolicy::Allow)
    }
}

impl fmt::Display for DefaultPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultPolicy::Allow => f.write_str("allow"),
            DefaultPolicy::Deny => f.write_str("deny"),
        }
    }
}

impl FromStr for DefaultPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(DefaultPolicy::Allow),
            "deny" => Ok(DefaultPolicy::Deny),
            other => Err(format!("unknown default policy {other:?} (expected allow|deny)")),
        }
    }
}

/// DecisionReason
///
/// Why `evaluate` reached its verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[ts(export)]
pub enum DecisionReason {
    /// The rule is public.
    Public,
    /// The role is in the rule's allow-list.
    RoleAllowed,
    /// The rule exists and the role is not in its allow-list.
    RoleNotAllowed,
    /// No rule is configured; the default policy decided.
    NoRule { policy: DefaultPolicy },
    /// The route string could not be normalized. Always denied.
    InvalidRoute,
}

/// Decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub reason: DecisionReason,
}

impl Decision {
    fn new(allowed: bool, reason: DecisionReason) -> Self {
        Self { allowed, reason }
    }
}

/// AccessibleRoute
///
/// One entry of `rules_for_role`: a reachable route and the rule that grants it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AccessibleRoute {
    /// Caller-facing path (admin routes carry the `/admin` prefix).
    pub path: String,
    pub namespace: Namespace,
    pub rule: PermissionRule,
}

// --- Evaluation Engine ---
//
// Everything below is a pure function of one config snapshot: no I/O, no
// interior mutability. Concurrent readers share an `Arc<AccessControlConfig>`.

impl AccessControlConfig {
    /// The rule stored at an already-resolved location.
    pub fn lookup(&self, resolved: &ResolvedRoute) -> Option<&PermissionRule> {
        self.namespace(resolved.namespace).get(&resolved.key)
    }

    /// evaluate
    ///
    /// Resolves `route` and applies, in order: public flag, allow-list
    /// membership, then `policy` when no rule exists. Malformed routes are
    /// denied. Unknown roles cannot be expressed (`Role` is closed), so the
    /// function is total.
    pub fn evaluate(&self, route: &str, role: Role, policy: DefaultPolicy) -> Decision {
        let resolved = match resolver::resolve(route) {
            Ok(resolved) => resolved,
            Err(_) => return Decision::new(false, DecisionReason::InvalidRoute),
        };

        match self.lookup(&resolved) {
            None => Decision::new(policy.allows(), DecisionReason::NoRule { policy }),
            Some(rule) if rule.is_public => Decision::new(true, DecisionReason::Public),
            Some(rule) if rule.allowed_roles.contains(&role) => {
                Decision::new(true, DecisionReason::RoleAllowed)
            }
            Some(_) => Decision::new(false, DecisionReason::RoleNotAllowed),
        }
    }

    pub fn has_access(&self, route: &str, role: Role, policy: DefaultPolicy) -> bool {
        self.evaluate(route, role, policy).allowed
    }

    /// True only when a rule exists for `route` and it is public.
    pub fn is_route_public(&self, route: &str) -> bool {
        resolver::resolve(route)
            .ok()
            .and_then(|resolved| self.lookup(&resolved))
            .is_some_and(|rule| rule.is_public)
    }

    /// rules_for_role
    ///
    /// Every configured route `role` can reach, ordinary routes first, each
    /// namespace in key order. Routes reachable only through the default
    /// policy are not listed since they have no rule.
    pub fn rules_for_role(&self, role: Role) -> Vec<AccessibleRoute> {
        [Namespace::Routes, Namespace::AdminRoutes]
            .into_iter()
            .flat_map(|namespace| {
                self.namespace(namespace)
                    .iter()
                    .filter(move |(_, rule)| rule.permits(role))
                    .map(move |(key, rule)| AccessibleRoute {
                        path: resolver::full_path(namespace, key.as_str()),
                        namespace,
                        rule: rule.clone(),
                    })
            })
            .collect()
    }

    /// The stored rule for `route`, distinguishing "no rule" from "denies everyone".
    pub fn rule_for(&self, route: &str) -> Result<(ResolvedRoute, &PermissionRule), AccessError> {
        let resolved = resolver::resolve(route)?;
        match self.namespace(resolved.namespace).get(&resolved.key) {
            Some(rule) => Ok((resolved, rule)),
            None => Err(AccessError::UnknownRoute(resolved.full_path())),
        }
    }

    /// Replaces the rule for `route` wholesale. Returns where it was stored.
    pub fn set_rule(
        &mut self,
        route: &str,
        rule: PermissionRule,
    ) -> Result<ResolvedRoute, RouteError> {
        let resolved = resolver::resolve(route)?;
        self.namespace_mut(resolved.namespace)
            .insert(resolved.key.clone(), rule);
        Ok(resolved)
    }

    /// Removes the rule for `route`, returning it.
    pub fn remove_rule(
        &mut self,
        route: &str,
    ) -> Result<(ResolvedRoute, PermissionRule), AccessError> {
        let resolved = resolver::resolve(route)?;
        match self.namespace_mut(resolved.namespace).remove(&resolved.key) {
            Some(rule) => Ok((resolved, rule)),
            None => Err(AccessError::UnknownRoute(resolved.full_path())),
        }
    }

    /// Builder form of `set_rule`, for seeding configs.
    pub fn with_rule(mut self, route: &str, rule: PermissionRule) -> Result<Self, RouteError> {
        self.set_rule(route, rule)?;
        Ok(self)
    }
}

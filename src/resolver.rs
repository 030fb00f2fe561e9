use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{error::RouteError, models::RoutePath};

/// Literal prefix marking an administrative route.
pub const ADMIN_PREFIX: &str = "/admin/";

/// The bare admin route. It resolves to the admin key `""`.
pub const ADMIN_ROOT: &str = "/admin";

/// Namespace
///
/// Which of the two rule maps a route lives in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Namespace {
    Routes,
    AdminRoutes,
}

/// ResolvedRoute
///
/// The `(namespace, key)` pair a caller-supplied route maps to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedRoute {
    pub namespace: Namespace,
    pub key: RoutePath,
}

impl ResolvedRoute {
    /// The caller-facing path, with the admin prefix restored.
    pub fn full_path(&self) -> String {
        full_path(self.namespace, self.key.as_str())
    }
}

impl fmt::Display for ResolvedRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.namespace {
            Namespace::Routes => write!(f, "routes[{:?}]", self.key.as_str()),
            Namespace::AdminRoutes => write!(f, "adminRoutes[{:?}]", self.key.as_str()),
        }
    }
}

/// resolve
///
/// Normalizes `raw` and places it in a namespace. Paths under `/admin/`
/// lose the prefix and are looked up in `adminRoutes`; `/admin` and
/// `/admin/` both resolve to the admin key `""`. Everything else is an
/// ordinary route keyed by its full normalized path.
///
/// This and `full_path` are the only places the admin prefix is added or
/// removed.
pub fn resolve(raw: &str) -> Result<ResolvedRoute, RouteError> {
    let path = RoutePath::parse(raw)?;

    let admin_key = if path.as_str() == ADMIN_ROOT {
        Some(String::new())
    } else {
        path.as_str().strip_prefix(ADMIN_PREFIX).map(str::to_string)
    };

    Ok(match admin_key {
        Some(key) => ResolvedRoute {
            namespace: Namespace::AdminRoutes,
            key: RoutePath::from_normalized(key),
        },
        None => ResolvedRoute {
            namespace: Namespace::Routes,
            key: path,
        },
    })
}

/// full_path
///
/// Inverse of `resolve` for stored keys.
pub fn full_path(namespace: Namespace, key: &str) -> String {
    match namespace {
        Namespace::Routes => key.to_string(),
        Namespace::AdminRoutes if key.is_empty() => ADMIN_ROOT.to_string(),
        Namespace::AdminRoutes => format!("{ADMIN_PREFIX}{key}"),
    }
}

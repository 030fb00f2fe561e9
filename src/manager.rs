use arc_swap::{ArcSwap, ArcSwapOption};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::sync::{Mutex as AsyncMutex, broadcast};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{
    defaults,
    engine::{AccessibleRoute, Decision, DefaultPolicy},
    error::{AccessError, ConfigLoadError, PersistenceError},
    models::{AccessControlConfig, PermissionRule, Role},
    repository::StoreState,
    resolver::ResolvedRoute,
};

/// Capacity of the change notification channel. Slow subscribers lag
/// rather than block the manager.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// LoadState
///
/// `Unloaded → Loading → {Ready | LoadFailed}`. Evaluation and mutation
/// require `Ready`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loading,
    Ready,
    LoadFailed(String),
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadState::Unloaded => f.write_str("unloaded"),
            LoadState::Loading => f.write_str("loading"),
            LoadState::Ready => f.write_str("ready"),
            LoadState::LoadFailed(reason) => write!(f, "load failed: {reason}"),
        }
    }
}

/// LoadSource
///
/// Where the live configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum LoadSource {
    Store,
    BuiltinDefaults,
}

/// ConfigEvent
///
/// Published on every change to the live configuration. The manager does
/// not know or care what subscribers do with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigEvent {
    Loaded { source: LoadSource },
    RuleUpdated { route: String },
    RuleRemoved { route: String },
    Saved,
}

/// AccessStatus
///
/// Operator-facing summary of the manager.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AccessStatus {
    pub state: String,
    pub dirty: bool,
    pub source: Option<LoadSource>,
    pub default_policy: DefaultPolicy,
    pub store: String,
    pub route_count: usize,
    pub admin_route_count: usize,
    #[ts(type = "string | null")]
    pub loaded_at: Option<DateTime<Utc>>,
    #[ts(type = "string | null")]
    pub last_saved_at: Option<DateTime<Utc>>,
}

/// ManagerSettings
#[derive(Debug, Clone, Copy)]
pub struct ManagerSettings {
    /// Decision for routes with no rule.
    pub default_policy: DefaultPolicy,
    /// Upper bound for one load or one save.
    pub io_timeout: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            default_policy: DefaultPolicy::Deny,
            io_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Default)]
struct Timestamps {
    source: Option<LoadSource>,
    loaded_at: Option<DateTime<Utc>>,
    last_saved_at: Option<DateTime<Utc>>,
}

/// AccessManager
///
/// Owns the single live `AccessControlConfig` for a process.
///
/// Readers take an `Arc` of the current config from an `ArcSwapOption` and
/// never wait on writers. Edits clone the config under a short synchronous
/// lock and swap the result in, so a reader always sees a whole config.
/// Loads and saves hold an async lock so they never interleave.
///
/// Across processes the policy is last-write-wins on the whole config: two
/// admins saving concurrently do not merge, the later save replaces the
/// earlier one.
pub struct AccessManager {
    store: StoreState,
    settings: ManagerSettings,
    state: ArcSwap<LoadState>,
    config: ArcSwapOption<AccessControlConfig>,
    edit_lock: Mutex<()>,
    io_lock: AsyncMutex<()>,
    edit_generation: AtomicU64,
    saved_generation: AtomicU64,
    timestamps: Mutex<Timestamps>,
    events: broadcast::Sender<ConfigEvent>,
}

/// AccessState
///
/// The shared handle placed in the application state.
pub type AccessState = Arc<AccessManager>;

impl AccessManager {
    /// Creates an `Unloaded` manager. Call `load` before serving.
    pub fn new(store: StoreState, settings: ManagerSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            settings,
            state: ArcSwap::from_pointee(LoadState::Unloaded),
            config: ArcSwapOption::empty(),
            edit_lock: Mutex::new(()),
            io_lock: AsyncMutex::new(()),
            edit_generation: AtomicU64::new(0),
            saved_generation: AtomicU64::new(0),
            timestamps: Mutex::new(Timestamps::default()),
            events,
        }
    }

    /// Creates a manager and performs the initial load.
    pub async fn bootstrap(
        store: StoreState,
        settings: ManagerSettings,
    ) -> Result<AccessState, ConfigLoadError> {
        let manager = Arc::new(Self::new(store, settings));
        manager.load().await?;
        Ok(manager)
    }

    pub fn state(&self) -> LoadState {
        (**self.state.load()).clone()
    }

    pub fn default_policy(&self) -> DefaultPolicy {
        self.settings.default_policy
    }

    /// Subscribes to configuration change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigEvent> {
        self.events.subscribe()
    }

    /// True while edits exist that no successful save has covered.
    pub fn is_dirty(&self) -> bool {
        self.edit_generation.load(Ordering::SeqCst) > self.saved_generation.load(Ordering::SeqCst)
    }

    // --- Load / Bootstrap ---

    /// load
    ///
    /// Reads the durable snapshot and adopts it wholesale:
    /// - a well-formed snapshot is adopted verbatim;
    /// - a missing snapshot adopts `defaults::default_config()`;
    /// - an unreachable store, a malformed snapshot or a timeout fail with
    ///   `ConfigLoadError`. Defaults are never substituted for a bad snapshot.
    ///
    /// A failed reload of an already-ready manager keeps the previous
    /// configuration in service. A successful reload discards unsaved edits.
    pub async fn load(&self) -> Result<LoadSource, ConfigLoadError> {
        let _io = self.io_lock.lock().await;

        let was_ready = self.config.load().is_some();
        if !was_ready {
            self.state.store(Arc::new(LoadState::Loading));
        }
        tracing::info!("Loading route permissions from {} store", self.store.name());

        let timeout = self.settings.io_timeout;
        let outcome = match tokio::time::timeout(timeout, self.store.load()).await {
            Err(_) => Err(ConfigLoadError::Timeout(timeout)),
            Ok(Err(e)) => Err(ConfigLoadError::from(e)),
            Ok(Ok(None)) => Ok((defaults::default_config(), LoadSource::BuiltinDefaults)),
            Ok(Ok(Some(snapshot))) => AccessControlConfig::try_from(snapshot)
                .map(|config| (config, LoadSource::Store))
                .map_err(ConfigLoadError::Malformed),
        };

        match outcome {
            Ok((config, source)) => {
                {
                    let _edit = self.edit_guard();
                    if self.is_dirty() {
                        tracing::warn!("Reload discards unsaved permission edits");
                    }
                    self.config.store(Some(Arc::new(config)));
                    self.saved_generation
                        .store(self.edit_generation.load(Ordering::SeqCst), Ordering::SeqCst);
                }
                {
                    let mut ts = self.timestamps();
                    ts.source = Some(source);
                    ts.loaded_at = Some(Utc::now());
                }
                self.state.store(Arc::new(LoadState::Ready));

                match source {
                    LoadSource::Store => tracing::info!("Route permissions loaded from store"),
                    LoadSource::BuiltinDefaults => tracing::info!(
                        "No stored permissions found; adopted built-in defaults v{}",
                        defaults::DEFAULT_CONFIG_VERSION
                    ),
                }
                let _ = self.events.send(ConfigEvent::Loaded { source });
                Ok(source)
            }
            Err(e) => {
                if was_ready {
                    tracing::error!("Permission reload failed, keeping current rules: {}", e);
                } else {
                    tracing::error!("Permission load failed: {}", e);
                    self.state.store(Arc::new(LoadState::LoadFailed(e.to_string())));
                }
                Err(e)
            }
        }
    }

    // --- Reads ---

    /// The current config snapshot. Fails closed until the first successful load.
    pub fn snapshot(&self) -> Result<Arc<AccessControlConfig>, AccessError> {
        self.config
            .load_full()
            .ok_or_else(|| AccessError::NotReady(self.state()))
    }

    pub fn evaluate(&self, route: &str, role: Role) -> Result<Decision, AccessError> {
        let decision = self
            .snapshot()?
            .evaluate(route, role, self.settings.default_policy);
        tracing::debug!(
            route,
            role = %role,
            allowed = decision.allowed,
            reason = ?decision.reason,
            "route access decision"
        );
        Ok(decision)
    }

    pub fn has_access(&self, route: &str, role: Role) -> Result<bool, AccessError> {
        Ok(self.evaluate(route, role)?.allowed)
    }

    pub fn is_route_public(&self, route: &str) -> Result<bool, AccessError> {
        Ok(self.snapshot()?.is_route_public(route))
    }

    pub fn rules_for_role(&self, role: Role) -> Result<Vec<AccessibleRoute>, AccessError> {
        Ok(self.snapshot()?.rules_for_role(role))
    }

    pub fn rule_for(&self, route: &str) -> Result<(ResolvedRoute, PermissionRule), AccessError> {
        let config = self.snapshot()?;
        let (resolved, rule) = config.rule_for(route)?;
        Ok((resolved, rule.clone()))
    }

    // --- Mutations (in-memory only) ---

    /// update_route_access
    ///
    /// Replaces the rule for `route` wholesale and marks the config dirty.
    /// Visible to the next read immediately; durable only after
    /// `save_permissions`.
    pub fn update_route_access(
        &self,
        route: &str,
        rule: PermissionRule,
    ) -> Result<ResolvedRoute, AccessError> {
        let resolved = {
            let _edit = self.edit_guard();
            let mut next = (*self.snapshot()?).clone();
            let resolved = next.set_rule(route, rule)?;
            self.config.store(Some(Arc::new(next)));
            self.edit_generation.fetch_add(1, Ordering::SeqCst);
            resolved
        };

        tracing::info!("Updated access rule for {}", resolved);
        let _ = self.events.send(ConfigEvent::RuleUpdated {
            route: resolved.full_path(),
        });
        Ok(resolved)
    }

    /// remove_route_access
    ///
    /// Deletes the rule for `route`. Afterwards the route falls under the
    /// default policy.
    pub fn remove_route_access(
        &self,
        route: &str,
    ) -> Result<(ResolvedRoute, PermissionRule), AccessError> {
        let removed = {
            let _edit = self.edit_guard();
            let mut next = (*self.snapshot()?).clone();
            let removed = next.remove_rule(route)?;
            self.config.store(Some(Arc::new(next)));
            self.edit_generation.fetch_add(1, Ordering::SeqCst);
            removed
        };

        tracing::info!("Removed access rule for {}", removed.0);
        let _ = self.events.send(ConfigEvent::RuleRemoved {
            route: removed.0.full_path(),
        });
        Ok(removed)
    }

    // --- Persistence ---

    /// save_permissions
    ///
    /// Writes the whole config in one store call. On success the edits that
    /// existed when the save began are marked clean; edits made while the
    /// write was in flight stay dirty. On failure nothing is rolled back and
    /// the caller decides whether to retry.
    pub async fn save_permissions(&self) -> Result<(), PersistenceError> {
        let _io = self.io_lock.lock().await;

        let (config, generation) = {
            let _edit = self.edit_guard();
            match self.config.load_full() {
                Some(config) => (config, self.edit_generation.load(Ordering::SeqCst)),
                None => return Err(PersistenceError::NotReady(self.state())),
            }
        };

        let snapshot = config.to_snapshot();
        let timeout = self.settings.io_timeout;
        match tokio::time::timeout(timeout, self.store.save(&snapshot)).await {
            Err(_) => {
                tracing::error!("Saving permissions timed out after {:?}", timeout);
                Err(PersistenceError::Timeout(timeout))
            }
            Ok(Err(e)) => {
                tracing::error!("Saving permissions failed: {}", e);
                Err(PersistenceError::Store(e))
            }
            Ok(Ok(())) => {
                self.saved_generation.fetch_max(generation, Ordering::SeqCst);
                self.timestamps().last_saved_at = Some(Utc::now());
                tracing::info!(
                    "Saved {} route and {} admin route permissions to {} store",
                    snapshot.routes.len(),
                    snapshot.admin_routes.len(),
                    self.store.name()
                );
                let _ = self.events.send(ConfigEvent::Saved);
                Ok(())
            }
        }
    }

    pub fn status(&self) -> AccessStatus {
        let config = self.config.load_full();
        let ts = self.timestamps();
        AccessStatus {
            state: self.state().to_string(),
            dirty: self.is_dirty(),
            source: ts.source,
            default_policy: self.settings.default_policy,
            store: self.store.name().to_string(),
            route_count: config.as_ref().map_or(0, |c| c.routes().len()),
            admin_route_count: config.as_ref().map_or(0, |c| c.admin_routes().len()),
            loaded_at: ts.loaded_at,
            last_saved_at: ts.last_saved_at,
        }
    }

    fn edit_guard(&self) -> MutexGuard<'_, ()> {
        self.edit_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn timestamps(&self) -> MutexGuard<'_, Timestamps> {
        self.timestamps.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

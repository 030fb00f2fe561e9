use crate::{error::StoreError, models::AccessControlSnapshot};
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
};
use std::time::Duration;

/// PermissionStore Trait
///
/// The persistence collaborator for the access control engine. The engine
/// never talks to a database or bucket directly; it only loads and saves
/// whole snapshots through this contract.
///
/// Implementations must make `save` all-or-nothing: a later `load` returns
/// either the previous snapshot or the new one, never a mix.
///
/// **Send + Sync + async_trait** make `Arc<dyn PermissionStore>` shareable
/// across tasks.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    /// Returns `Ok(None)` when no snapshot has ever been saved.
    async fn load(&self) -> Result<Option<AccessControlSnapshot>, StoreError>;

    /// Atomically replaces the stored snapshot.
    async fn save(&self, snapshot: &AccessControlSnapshot) -> Result<(), StoreError>;
}

/// StoreState
///
/// The concrete type used to share the permission store.
pub type StoreState = Arc<dyn PermissionStore>;

/// The single row that holds the live snapshot.
const SNAPSHOT_ROW_ID: i16 = 1;

/// PostgresPermissionStore
///
/// Keeps the snapshot as one JSONB row in `access_control_snapshots`.
/// Replacing a single row in one statement is atomic for concurrent readers.
pub struct PostgresPermissionStore {
    pool: PgPool,
}

impl PostgresPermissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the bundled migrations (creates the snapshot table).
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("migration failed: {e}")))
    }
}

#[async_trait]
impl PermissionStore for PostgresPermissionStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    /// load
    ///
    /// Reads the JSON text rather than a typed column so that a corrupt
    /// document surfaces as `StoreError::Malformed`, not as a driver error.
    async fn load(&self) -> Result<Option<AccessControlSnapshot>, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT snapshot::text FROM access_control_snapshots WHERE id = $1")
                .bind(SNAPSHOT_ROW_ID)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            None => Ok(None),
            Some((raw,)) => Ok(Some(serde_json::from_str(&raw)?)),
        }
    }

    /// save
    ///
    /// Upserts the snapshot row inside a transaction; `version` counts saves.
    async fn save(&self, snapshot: &AccessControlSnapshot) -> Result<(), StoreError> {
        let body = serde_json::to_string(snapshot)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO access_control_snapshots (id, snapshot, version, updated_at)
            VALUES ($1, $2::jsonb, 1, NOW())
            ON CONFLICT (id) DO UPDATE
            SET snapshot = EXCLUDED.snapshot,
                version = access_control_snapshots.version + 1,
                updated_at = NOW()
            "#,
        )
        .bind(SNAPSHOT_ROW_ID)
        .bind(body)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(())
    }
}

/// InMemoryPermissionStore
///
/// Holds the snapshot as serialized bytes, the way a durable store would, so
/// tests exercise the real encode/decode path. Failure and latency can be
/// injected to simulate an unreachable or slow backend.
#[derive(Default)]
pub struct InMemoryPermissionStore {
    slot: Mutex<Option<Vec<u8>>>,
    fail_loads: AtomicBool,
    fail_saves: AtomicBool,
    delay_ms: AtomicU64,
    saves: AtomicUsize,
    saves_in_flight: AtomicUsize,
    peak_saves_in_flight: AtomicUsize,
}

impl InMemoryPermissionStore {
    /// An empty store: `load` reports "not found".
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: &AccessControlSnapshot) -> Self {
        let store = Self::new();
        // Serializing plain maps of strings and rules cannot fail.
        let bytes = serde_json::to_vec(snapshot).unwrap_or_default();
        store.put_raw(bytes);
        store
    }

    /// Seeds the store with arbitrary bytes, e.g. a corrupt document.
    pub fn with_raw(bytes: impl Into<Vec<u8>>) -> Self {
        let store = Self::new();
        store.put_raw(bytes.into());
        store
    }

    /// The bytes currently "on disk".
    pub fn raw(&self) -> Option<Vec<u8>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Makes every save fail after encoding but before the write commits.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of saves that committed.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Highest number of `save` calls that were ever running at once.
    pub fn peak_concurrent_saves(&self) -> usize {
        self.peak_saves_in_flight.load(Ordering::SeqCst)
    }

    fn put_raw(&self, bytes: Vec<u8>) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(bytes);
    }

    async fn simulate_latency(&self) {
        let ms = self.delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

#[async_trait]
impl PermissionStore for InMemoryPermissionStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn load(&self) -> Result<Option<AccessControlSnapshot>, StoreError> {
        self.simulate_latency().await;
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "in-memory store: simulated load failure".to_string(),
            ));
        }

        match self.raw() {
            None => Ok(None),
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        }
    }

    async fn save(&self, snapshot: &AccessControlSnapshot) -> Result<(), StoreError> {
        let _in_flight = InFlight::enter(&self.saves_in_flight, &self.peak_saves_in_flight);

        // Encode the whole document first; the slot is only touched on commit.
        let bytes = serde_json::to_vec(snapshot)?;
        self.simulate_latency().await;

        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "in-memory store: simulated write failure".to_string(),
            ));
        }

        self.put_raw(bytes);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Counts one running `save` for as long as it lives, including when the
/// future is dropped by a timeout.
struct InFlight<'a> {
    current: &'a AtomicUsize,
}

impl<'a> InFlight<'a> {
    fn enter(current: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self { current }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

use route_access_portal::{
    AccessManager, ConfigEvent, LoadState, ManagerSettings,
    defaults::default_config,
    engine::DefaultPolicy,
    error::{AccessError, ConfigLoadError, PersistenceError},
    manager::LoadSource,
    models::{AccessControlConfig, AccessControlSnapshot, PermissionRule, Role},
    repository::{InMemoryPermissionStore, PermissionStore},
};
use std::{sync::Arc, time::Duration};

// --- Helpers ---

fn settings() -> ManagerSettings {
    ManagerSettings {
        default_policy: DefaultPolicy::Deny,
        io_timeout: Duration::from_secs(2),
    }
}

fn pricing_snapshot() -> AccessControlSnapshot {
    AccessControlConfig::new()
        .with_rule(
            "/pricing",
            PermissionRule::restricted([Role::ClientPremium, Role::Manager]),
        )
        .unwrap()
        .with_rule("/admin/services", PermissionRule::restricted([Role::Manager]))
        .unwrap()
        .to_snapshot()
}

async fn ready_manager(store: Arc<InMemoryPermissionStore>) -> AccessManager {
    let manager = AccessManager::new(store, settings());
    manager.load().await.expect("load should succeed");
    manager
}

fn stored_snapshot(store: &InMemoryPermissionStore) -> AccessControlSnapshot {
    serde_json::from_slice(&store.raw().expect("store should hold a snapshot")).unwrap()
}

// --- Load / Bootstrap ---

#[tokio::test]
async fn test_reads_and_writes_fail_closed_before_load() {
    let manager = AccessManager::new(Arc::new(InMemoryPermissionStore::new()), settings());

    assert_eq!(manager.state(), LoadState::Unloaded);
    assert!(matches!(
        manager.has_access("/", Role::Visitor),
        Err(AccessError::NotReady(LoadState::Unloaded))
    ));
    assert!(matches!(
        manager.update_route_access("/", PermissionRule::public()),
        Err(AccessError::NotReady(_))
    ));
    assert!(matches!(
        manager.save_permissions().await,
        Err(PersistenceError::NotReady(LoadState::Unloaded))
    ));
}

#[tokio::test]
async fn test_missing_snapshot_adopts_builtin_defaults() {
    let manager = AccessManager::new(Arc::new(InMemoryPermissionStore::new()), settings());

    let source = manager.load().await.unwrap();

    assert_eq!(source, LoadSource::BuiltinDefaults);
    assert_eq!(manager.state(), LoadState::Ready);
    assert_eq!(*manager.snapshot().unwrap(), default_config());
    assert!(!manager.is_dirty());
}

#[tokio::test]
async fn test_stored_snapshot_is_adopted_verbatim() {
    let store = Arc::new(InMemoryPermissionStore::with_snapshot(&pricing_snapshot()));
    let manager = AccessManager::new(store, settings());

    assert_eq!(manager.load().await.unwrap(), LoadSource::Store);
    assert_eq!(manager.snapshot().unwrap().to_snapshot(), pricing_snapshot());
}

#[tokio::test]
async fn test_corrupt_snapshot_fails_loudly_without_defaults() {
    let store = Arc::new(InMemoryPermissionStore::with_raw(r#"{"routes": {"/x": 42}}"#));
    let manager = AccessManager::new(store, settings());

    let err = manager.load().await.unwrap_err();

    assert!(matches!(err, ConfigLoadError::Malformed(_)));
    assert!(matches!(manager.state(), LoadState::LoadFailed(_)));
    assert!(matches!(
        manager.has_access("/", Role::Visitor),
        Err(AccessError::NotReady(LoadState::LoadFailed(_)))
    ));
}

#[tokio::test]
async fn test_snapshot_with_unknown_role_is_malformed() {
    let raw = r#"{
        "routes": { "/x": { "isPublic": false, "allowedRoles": ["root"] } },
        "adminRoutes": {}
    }"#;
    let manager = AccessManager::new(Arc::new(InMemoryPermissionStore::with_raw(raw)), settings());

    assert!(matches!(
        manager.load().await,
        Err(ConfigLoadError::Malformed(_))
    ));
}

#[tokio::test]
async fn test_snapshot_with_unnormalized_key_is_malformed() {
    let raw = r#"{
        "routes": { "/Pricing/": { "isPublic": true, "allowedRoles": [] } },
        "adminRoutes": {}
    }"#;
    let manager = AccessManager::new(Arc::new(InMemoryPermissionStore::with_raw(raw)), settings());

    assert!(matches!(
        manager.load().await,
        Err(ConfigLoadError::Malformed(_))
    ));
}

#[tokio::test]
async fn test_unreachable_store_reports_config_load_error() {
    let store = Arc::new(InMemoryPermissionStore::new());
    store.set_fail_loads(true);
    let manager = AccessManager::new(store, settings());

    assert!(matches!(
        manager.load().await,
        Err(ConfigLoadError::Store(_))
    ));
    assert!(matches!(manager.state(), LoadState::LoadFailed(_)));
}

#[tokio::test]
async fn test_load_times_out() {
    let store = Arc::new(InMemoryPermissionStore::new());
    store.set_delay(Duration::from_millis(500));
    let manager = AccessManager::new(
        store,
        ManagerSettings {
            default_policy: DefaultPolicy::Deny,
            io_timeout: Duration::from_millis(20),
        },
    );

    assert!(matches!(
        manager.load().await,
        Err(ConfigLoadError::Timeout(_))
    ));
    assert!(matches!(manager.state(), LoadState::LoadFailed(_)));
}

#[tokio::test]
async fn test_failed_reload_keeps_serving_previous_rules() {
    let store = Arc::new(InMemoryPermissionStore::with_snapshot(&pricing_snapshot()));
    let manager = ready_manager(store.clone()).await;

    store.set_fail_loads(true);
    assert!(manager.load().await.is_err());

    assert_eq!(manager.state(), LoadState::Ready);
    assert!(manager.has_access("/pricing", Role::Manager).unwrap());
}

// --- Evaluation through the manager ---

#[tokio::test]
async fn test_pricing_scenario() {
    let store = Arc::new(InMemoryPermissionStore::with_snapshot(&pricing_snapshot()));
    let manager = ready_manager(store).await;

    assert!(!manager.has_access("/pricing", Role::ClientStandard).unwrap());
    assert!(manager.has_access("/pricing", Role::ClientPremium).unwrap());

    manager
        .update_route_access("/pricing", PermissionRule::public())
        .unwrap();

    assert!(manager.has_access("/pricing", Role::Visitor).unwrap());
}

#[tokio::test]
async fn test_default_policy_is_configurable() {
    let store = Arc::new(InMemoryPermissionStore::with_snapshot(&pricing_snapshot()));
    let manager = AccessManager::new(
        store,
        ManagerSettings {
            default_policy: DefaultPolicy::Allow,
            io_timeout: Duration::from_secs(2),
        },
    );
    manager.load().await.unwrap();

    assert!(manager.has_access("/unlisted", Role::Visitor).unwrap());
    assert!(!manager.has_access("/pricing", Role::Visitor).unwrap());
}

#[tokio::test]
async fn test_rules_for_role_and_public_flag() {
    let store = Arc::new(InMemoryPermissionStore::with_snapshot(&pricing_snapshot()));
    let manager = ready_manager(store).await;

    let paths: Vec<String> = manager
        .rules_for_role(Role::Manager)
        .unwrap()
        .into_iter()
        .map(|r| r.path)
        .collect();
    assert_eq!(paths, vec!["/pricing".to_string(), "/admin/services".to_string()]);

    assert!(!manager.is_route_public("/pricing").unwrap());
    manager
        .update_route_access("/pricing", PermissionRule::public())
        .unwrap();
    assert!(manager.is_route_public("/pricing").unwrap());
}

// --- Mutation ---

#[tokio::test]
async fn test_mutation_is_visible_before_save_and_marks_dirty() {
    let store = Arc::new(InMemoryPermissionStore::with_snapshot(&pricing_snapshot()));
    let manager = ready_manager(store.clone()).await;

    let resolved = manager
        .update_route_access("/admin/services", PermissionRule::restricted([Role::Contributor]))
        .unwrap();

    assert_eq!(resolved.full_path(), "/admin/services");
    assert!(manager.has_access("/admin/services", Role::Contributor).unwrap());
    assert!(!manager.has_access("/admin/services", Role::Manager).unwrap());
    assert!(manager.is_dirty());
    // Nothing reached durable storage yet.
    assert_eq!(stored_snapshot(&store), pricing_snapshot());
    assert_eq!(store.save_count(), 0);
}

#[tokio::test]
async fn test_update_replaces_rule_wholesale() {
    let store = Arc::new(InMemoryPermissionStore::with_snapshot(&pricing_snapshot()));
    let manager = ready_manager(store).await;

    manager
        .update_route_access(
            "/pricing",
            PermissionRule::restricted([Role::Contributor]).with_description("contributors only"),
        )
        .unwrap();

    let (_, rule) = manager.rule_for("/pricing").unwrap();
    assert_eq!(
        rule,
        PermissionRule::restricted([Role::Contributor]).with_description("contributors only")
    );
    assert!(!manager.has_access("/pricing", Role::Manager).unwrap());
}

#[tokio::test]
async fn test_update_rejects_malformed_route() {
    let manager = ready_manager(Arc::new(InMemoryPermissionStore::new())).await;

    assert!(matches!(
        manager.update_route_access("pricing", PermissionRule::public()),
        Err(AccessError::InvalidRoute(_))
    ));
    assert!(!manager.is_dirty());
}

#[tokio::test]
async fn test_remove_route_access() {
    let store = Arc::new(InMemoryPermissionStore::with_snapshot(&pricing_snapshot()));
    let manager = ready_manager(store).await;

    let (resolved, _) = manager.remove_route_access("/admin/services").unwrap();
    assert_eq!(resolved.full_path(), "/admin/services");
    assert!(!manager.has_access("/admin/services", Role::Manager).unwrap());
    assert!(matches!(
        manager.remove_route_access("/admin/services"),
        Err(AccessError::UnknownRoute(_))
    ));
}

#[tokio::test]
async fn test_updates_apply_in_call_order() {
    let manager = ready_manager(Arc::new(InMemoryPermissionStore::new())).await;

    manager
        .update_route_access("/beta", PermissionRule::restricted([Role::Manager]))
        .unwrap();
    manager
        .update_route_access("/beta", PermissionRule::restricted([Role::Contributor]))
        .unwrap();
    manager
        .update_route_access("/beta", PermissionRule::deny_all())
        .unwrap();

    let (_, rule) = manager.rule_for("/beta").unwrap();
    assert_eq!(rule, PermissionRule::deny_all());
}

#[tokio::test]
async fn test_readers_keep_their_snapshot_during_edits() {
    let store = Arc::new(InMemoryPermissionStore::with_snapshot(&pricing_snapshot()));
    let manager = ready_manager(store).await;

    let before = manager.snapshot().unwrap();
    manager
        .update_route_access("/pricing", PermissionRule::public())
        .unwrap();

    assert!(!before.has_access("/pricing", Role::Visitor, DefaultPolicy::Deny));
    assert!(manager.has_access("/pricing", Role::Visitor).unwrap());
}

// --- Persistence ---

#[tokio::test]
async fn test_save_round_trip() {
    let store = Arc::new(InMemoryPermissionStore::new());
    let manager = ready_manager(store.clone()).await;

    manager
        .update_route_access("/pricing", PermissionRule::restricted([Role::ClientPremium]))
        .unwrap();
    manager
        .update_route_access("/admin", PermissionRule::deny_all())
        .unwrap();
    manager.save_permissions().await.unwrap();

    assert!(!manager.is_dirty());
    assert_eq!(store.save_count(), 1);

    let reloaded = ready_manager(store).await;
    assert_eq!(*reloaded.snapshot().unwrap(), *manager.snapshot().unwrap());
}

#[tokio::test]
async fn test_failed_save_retains_edits_and_leaves_store_unchanged() {
    let store = Arc::new(InMemoryPermissionStore::with_snapshot(&pricing_snapshot()));
    let manager = ready_manager(store.clone()).await;
    let before = store.raw();

    manager
        .update_route_access("/pricing", PermissionRule::public())
        .unwrap();
    manager
        .update_route_access("/admin/services", PermissionRule::deny_all())
        .unwrap();

    store.set_fail_saves(true);
    assert!(matches!(
        manager.save_permissions().await,
        Err(PersistenceError::Store(_))
    ));

    // Durable state is the fully-old snapshot.
    assert_eq!(store.raw(), before);
    assert_eq!(stored_snapshot(&store), pricing_snapshot());
    // In-memory edits survive for a retry.
    assert!(manager.is_dirty());
    assert!(manager.has_access("/pricing", Role::Visitor).unwrap());

    store.set_fail_saves(false);
    manager.save_permissions().await.unwrap();
    assert!(!manager.is_dirty());

    let reloaded = ready_manager(store).await;
    assert!(reloaded.has_access("/pricing", Role::Visitor).unwrap());
    assert!(!reloaded.has_access("/admin/services", Role::Manager).unwrap());
}

#[tokio::test]
async fn test_save_times_out() {
    let store = Arc::new(InMemoryPermissionStore::new());
    let manager = AccessManager::new(
        store.clone(),
        ManagerSettings {
            default_policy: DefaultPolicy::Deny,
            io_timeout: Duration::from_millis(50),
        },
    );
    manager.load().await.unwrap();
    manager
        .update_route_access("/pricing", PermissionRule::public())
        .unwrap();

    store.set_delay(Duration::from_millis(500));
    assert!(matches!(
        manager.save_permissions().await,
        Err(PersistenceError::Timeout(_))
    ));
    assert!(manager.is_dirty());
    assert!(store.raw().is_none());
}

#[tokio::test]
async fn test_concurrent_saves_are_serialized() {
    let store = Arc::new(InMemoryPermissionStore::new());
    let manager = Arc::new(ready_manager(store.clone()).await);
    store.set_delay(Duration::from_millis(30));

    let saves: Vec<_> = ["/pricing", "/contact", "/about", "/login"]
        .into_iter()
        .map(|route| {
            manager
                .update_route_access(route, PermissionRule::deny_all())
                .unwrap();
            let manager = manager.clone();
            tokio::spawn(async move { manager.save_permissions().await })
        })
        .collect();

    for save in saves {
        assert!(save.await.unwrap().is_ok());
    }

    // Each write reached the store alone, never overlapping another.
    assert_eq!(store.save_count(), 4);
    assert_eq!(store.peak_concurrent_saves(), 1);
    assert!(!manager.is_dirty());
    assert_eq!(
        stored_snapshot(&store),
        manager.snapshot().unwrap().to_snapshot()
    );
}

#[tokio::test]
async fn test_last_save_wins_across_sessions() {
    let store = Arc::new(InMemoryPermissionStore::new());
    let first = ready_manager(store.clone()).await;
    let second = ready_manager(store.clone()).await;

    first
        .update_route_access("/pricing", PermissionRule::public())
        .unwrap();
    second
        .update_route_access("/contact", PermissionRule::deny_all())
        .unwrap();

    first.save_permissions().await.unwrap();
    second.save_permissions().await.unwrap();

    // The whole config of the later save replaces the earlier one; no merge.
    let stored = stored_snapshot(&store);
    assert_eq!(stored, second.snapshot().unwrap().to_snapshot());
    assert_eq!(stored.routes["/pricing"], default_config().to_snapshot().routes["/pricing"]);
}

// --- Notifications ---

#[tokio::test]
async fn test_change_events_are_published() {
    let manager = AccessManager::new(Arc::new(InMemoryPermissionStore::new()), settings());
    let mut events = manager.subscribe();

    manager.load().await.unwrap();
    manager
        .update_route_access("/admin/hero", PermissionRule::deny_all())
        .unwrap();
    manager.remove_route_access("/admin/hero").unwrap();
    manager.save_permissions().await.unwrap();

    assert_eq!(
        events.recv().await.unwrap(),
        ConfigEvent::Loaded {
            source: LoadSource::BuiltinDefaults
        }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        ConfigEvent::RuleUpdated {
            route: "/admin/hero".to_string()
        }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        ConfigEvent::RuleRemoved {
            route: "/admin/hero".to_string()
        }
    );
    assert_eq!(events.recv().await.unwrap(), ConfigEvent::Saved);
}

#[tokio::test]
async fn test_status_reports_state_and_counts() {
    let store = Arc::new(InMemoryPermissionStore::with_snapshot(&pricing_snapshot()));
    let manager = AccessManager::new(store.clone(), settings());

    let status = manager.status();
    assert_eq!(status.state, "unloaded");
    assert_eq!(status.route_count, 0);

    manager.load().await.unwrap();
    manager
        .update_route_access("/about", PermissionRule::public())
        .unwrap();

    let status = manager.status();
    assert_eq!(status.state, "ready");
    assert!(status.dirty);
    assert_eq!(status.source, Some(LoadSource::Store));
    assert_eq!(status.store, store.name());
    assert_eq!(status.route_count, 2);
    assert_eq!(status.admin_route_count, 1);
    assert!(status.loaded_at.is_some());
    assert!(status.last_saved_at.is_none());
}

#[tokio::test]
async fn test_bootstrap_returns_ready_manager() {
    let access = AccessManager::bootstrap(Arc::new(InMemoryPermissionStore::new()), settings())
        .await
        .unwrap();
    assert_eq!(access.state(), LoadState::Ready);

    let store = Arc::new(InMemoryPermissionStore::with_raw("not json"));
    assert!(AccessManager::bootstrap(store, settings()).await.is_err());
}

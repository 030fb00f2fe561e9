use route_access_portal::{
    AccessManager, AppState, ConfigEvent,
    config::{AppConfig, Env, StoreBackend},
    create_router,
    repository::{InMemoryPermissionStore, PostgresPermissionStore, StoreState},
    storage::S3PermissionStore,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::{net::TcpListener, sync::broadcast};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Initializes configuration, logging, the permission store and the access
/// engine, then serves HTTP. Startup aborts if permissions cannot be loaded:
/// the service never runs without authorization data.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins, otherwise sensible local defaults.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "route_access_portal=debug,tower_http=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // JSON lines for log aggregation.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!(
        "Application starting in {:?} mode with {:?} permission store (default policy: {})",
        config.env,
        config.store,
        config.default_policy
    );

    // 3. Permission store
    let store = build_store(&config).await;

    // 4. Access engine: load before binding so no request sees an unloaded engine.
    let access = match AccessManager::bootstrap(store, config.manager_settings()).await {
        Ok(access) => access,
        Err(e) => {
            tracing::error!("FATAL: could not load route permissions: {}", e);
            std::process::exit(1);
        }
    };

    spawn_change_logger(access.subscribe());

    // 5. Router and server
    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState { access, config });

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: failed to bind HTTP listener. Check BIND_ADDR.");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly");
}

/// build_store
///
/// Instantiates the configured persistence backend.
async fn build_store(config: &AppConfig) -> StoreState {
    match config.store {
        StoreBackend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(&config.db_url)
                .await
                .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");
            let store = PostgresPermissionStore::new(pool);
            store
                .migrate()
                .await
                .expect("FATAL: Failed to apply permission store migrations.");
            Arc::new(store)
        }
        StoreBackend::S3 => {
            let store = S3PermissionStore::new(
                &config.s3_endpoint,
                &config.s3_region,
                &config.s3_key,
                &config.s3_secret,
                &config.s3_bucket,
                &config.s3_object_key,
            );
            // LOCAL-ONLY: provision the MinIO bucket.
            if config.env == Env::Local {
                store.ensure_bucket_exists().await;
            }
            Arc::new(store)
        }
        StoreBackend::Memory => {
            tracing::warn!("In-memory permission store: edits will not survive a restart");
            Arc::new(InMemoryPermissionStore::new())
        }
    }
}

/// Logs every configuration change published by the engine.
fn spawn_change_logger(mut events: broadcast::Receiver<ConfigEvent>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::info!("Permission config changed: {:?}", event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Permission change logger skipped {} events", skipped)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

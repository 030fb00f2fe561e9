use std::{env, time::Duration};

use crate::{engine::DefaultPolicy, manager::ManagerSettings, storage::DEFAULT_OBJECT_KEY};

/// AppConfig
///
/// Holds the application's entire configuration state. Immutable once loaded
/// and pulled into handlers via `FromRef`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls the local auth bypass and log format.
    pub env: Env,
    // Socket address the HTTP server binds to.
    pub bind_addr: String,
    // Which backend persists the permission snapshot.
    pub store: StoreBackend,
    // Database connection string (Postgres). Empty unless the Postgres store is used.
    pub db_url: String,
    // S3-compatible storage endpoint URL (MinIO in local, Supabase in prod).
    pub s3_endpoint: String,
    pub s3_region: String,
    pub s3_key: String,
    pub s3_secret: String,
    pub s3_bucket: String,
    // Object key of the snapshot document inside the bucket.
    pub s3_object_key: String,
    // Secret key used to decode and validate incoming JWTs (Supabase-managed).
    pub jwt_secret: String,
    // Decision for routes that have no rule.
    pub default_policy: DefaultPolicy,
    // Upper bound for one snapshot load or save.
    pub io_timeout: Duration,
}

/// Env
///
/// Defines the runtime context, used to switch between development
/// conveniences and production-grade infrastructure.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Env {
    Local,
    Production,
}

/// StoreBackend
///
/// Durable home of the permission snapshot.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StoreBackend {
    Postgres,
    S3,
    /// Process-local; edits are lost on restart. Refused in production.
    Memory,
}

impl StoreBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" => Some(StoreBackend::Postgres),
            "s3" => Some(StoreBackend::S3),
            "memory" => Some(StoreBackend::Memory),
            _ => None,
        }
    }
}

const DEFAULT_IO_TIMEOUT_MS: u64 = 5_000;
const LOCAL_JWT_SECRET: &str = "super-secure-test-secret-value-local";

impl Default for AppConfig {
    /// default
    ///
    /// A safe, non-panicking configuration for tests: local env, in-memory
    /// store, deny-by-default.
    fn default() -> Self {
        Self {
            env: Env::Local,
            bind_addr: "127.0.0.1:3000".to_string(),
            store: StoreBackend::Memory,
            db_url: String::new(),
            s3_endpoint: "http://localhost:9000".to_string(),
            s3_region: "us-east-1".to_string(),
            s3_key: "admin".to_string(),
            s3_secret: "password".to_string(),
            s3_bucket: "route-access-test".to_string(),
            s3_object_key: DEFAULT_OBJECT_KEY.to_string(),
            jwt_secret: LOCAL_JWT_SECRET.to_string(),
            default_policy: DefaultPolicy::Deny,
            io_timeout: Duration::from_millis(DEFAULT_IO_TIMEOUT_MS),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads every parameter from the environment and fails fast.
    ///
    /// # Panics
    /// Panics when a variable required for the current environment is
    /// missing or unparseable, so the service never starts with an
    /// incomplete or insecure configuration.
    pub fn load() -> Self {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let jwt_secret = match env {
            Env::Production => env::var("SUPABASE_JWT_SECRET")
                .expect("FATAL: SUPABASE_JWT_SECRET must be set in production."),
            Env::Local => {
                env::var("SUPABASE_JWT_SECRET").unwrap_or_else(|_| LOCAL_JWT_SECRET.to_string())
            }
        };

        let store = match env::var("ACCESS_STORE") {
            Ok(value) => StoreBackend::parse(&value).unwrap_or_else(|| {
                panic!("FATAL: ACCESS_STORE must be postgres|s3|memory, got {value:?}")
            }),
            Err(_) if env == Env::Production => StoreBackend::Postgres,
            Err(_) => StoreBackend::Memory,
        };
        if env == Env::Production && store == StoreBackend::Memory {
            panic!("FATAL: ACCESS_STORE=memory is not durable and is refused in production.");
        }

        let db_url = match store {
            StoreBackend::Postgres => env::var("DATABASE_URL")
                .expect("FATAL: DATABASE_URL required for the postgres permission store"),
            _ => env::var("DATABASE_URL").unwrap_or_default(),
        };

        let default_policy = match env::var("ACCESS_DEFAULT_POLICY") {
            Ok(value) => value
                .parse()
                .unwrap_or_else(|e| panic!("FATAL: ACCESS_DEFAULT_POLICY: {e}")),
            Err(_) => DefaultPolicy::Deny,
        };

        let io_timeout = match env::var("ACCESS_IO_TIMEOUT_MS") {
            Ok(value) => Duration::from_millis(value.parse().unwrap_or_else(|_| {
                panic!("FATAL: ACCESS_IO_TIMEOUT_MS must be an integer, got {value:?}")
            })),
            Err(_) => Duration::from_millis(DEFAULT_IO_TIMEOUT_MS),
        };

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let s3_object_key =
            env::var("S3_OBJECT_KEY").unwrap_or_else(|_| DEFAULT_OBJECT_KEY.to_string());

        match (env, store) {
            (Env::Production, StoreBackend::S3) => {
                let project_url =
                    env::var("SUPABASE_URL").expect("FATAL: SUPABASE_URL required in prod");
                Self {
                    env,
                    bind_addr,
                    store,
                    db_url,
                    // Supabase's Storage API gateway.
                    s3_endpoint: format!("{}/storage/v1/s3", project_url),
                    s3_region: "stub".to_string(),
                    s3_key: env::var("S3_ACCESS_KEY")
                        .expect("FATAL: S3_ACCESS_KEY required in prod"),
                    s3_secret: env::var("S3_SECRET_KEY")
                        .expect("FATAL: S3_SECRET_KEY required in prod"),
                    s3_bucket: env::var("S3_BUCKET_NAME")
                        .unwrap_or_else(|_| "route-access".to_string()),
                    s3_object_key,
                    jwt_secret,
                    default_policy,
                    io_timeout,
                }
            }
            _ => Self {
                env,
                bind_addr,
                store,
                db_url,
                // Local storage (MinIO) uses known default credentials.
                s3_endpoint: "http://localhost:9000".to_string(),
                s3_region: "us-east-1".to_string(),
                s3_key: "admin".to_string(),
                s3_secret: "password".to_string(),
                s3_bucket: "route-access".to_string(),
                s3_object_key,
                jwt_secret,
                default_policy,
                io_timeout,
            },
        }
    }

    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            default_policy: self.default_policy,
            io_timeout: self.io_timeout,
        }
    }
}

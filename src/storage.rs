use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::{error::DisplayErrorContext, primitives::ByteStream};

use crate::{error::StoreError, models::AccessControlSnapshot, repository::PermissionStore};

/// Default object key for the snapshot document.
pub const DEFAULT_OBJECT_KEY: &str = "access-control/permissions.json";

/// S3PermissionStore
///
/// Persists the snapshot as a single JSON object in an S3-compatible bucket:
/// - **Local:** Dockerized MinIO instance.
/// - **Production:** Supabase Storage endpoint.
///
/// A PutObject replaces the whole object atomically, so readers see either
/// the previous document or the new one.
#[derive(Clone)]
pub struct S3PermissionStore {
    client: s3::Client,
    bucket_name: String,
    object_key: String,
}

impl S3PermissionStore {
    /// new
    ///
    /// Builds the client from static credentials. `force_path_style(true)` is
    /// required for MinIO and the Supabase Storage gateway.
    pub fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
        object_key: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket_name: bucket.to_string(),
            object_key: object_key.to_string(),
        }
    }

    pub fn object_key(&self) -> &str {
        &self.object_key
    }

    /// ensure_bucket_exists
    ///
    /// Local convenience for MinIO. CreateBucket on an existing bucket is
    /// harmless, so the result is ignored.
    pub async fn ensure_bucket_exists(&self) {
        if let Err(e) = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            tracing::debug!("create_bucket {}: {}", self.bucket_name, DisplayErrorContext(&e));
        }
    }
}

#[async_trait]
impl PermissionStore for S3PermissionStore {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn load(&self) -> Result<Option<AccessControlSnapshot>, StoreError> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(&self.object_key)
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    return Ok(None);
                }
                return Err(StoreError::Unavailable(
                    DisplayErrorContext(&service_error).to_string(),
                ));
            }
        };

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Unavailable(format!("reading snapshot body: {e}")))?
            .into_bytes();

        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn save(&self, snapshot: &AccessControlSnapshot) -> Result<(), StoreError> {
        let body = serde_json::to_vec(snapshot)?;

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&self.object_key)
            .content_type("application/json")
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }
}

//! S3-based deployment store.
//!
//! This module keeps one object per deployment in AWS S3 (or a compatible
//! service), for brokers running on several machines.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use tracing::debug;

use crate::error::{Result, StateError};

use super::store::DeploymentStore;
use super::types::DeploymentRecord;

/// Object key suffix of a record.
const RECORD_SUFFIX: &str = ".json";

/// S3-based deployment store.
#[derive(Debug)]
pub struct S3DeploymentStore {
    /// S3 client.
    client: Client,
    /// Bucket name.
    bucket: String,
    /// Key prefix, empty or ending with `/`.
    prefix: String,
}

impl S3DeploymentStore {
    /// Creates a new S3 deployment store.
    ///
    /// # Errors
    ///
    /// Returns an error if the S3 client cannot be initialized.
    pub async fn new(bucket: &str, prefix: Option<&str>, region: Option<&str>) -> Result<Self> {
        let config = if let Some(region_str) = region {
            aws_config::from_env()
                .region(aws_config::Region::new(region_str.to_string()))
                .load()
                .await
        } else {
            aws_config::load_from_env().await
        };

        Ok(Self::with_client(Client::new(&config), bucket, prefix))
    }

    /// Creates a new S3 deployment store with an existing client.
    #[must_use]
    pub fn with_client(client: Client, bucket: &str, prefix: Option<&str>) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            prefix: normalize_prefix(prefix),
        }
    }

    /// Gets the full S3 key for a deployment id.
    fn key(&self, id: &str) -> String {
        format!("{}{id}{RECORD_SUFFIX}", self.prefix)
    }

    /// Gets an object from S3.
    async fn get_object(&self, key: &str) -> Result<Option<String>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(response) => {
                let bytes = response
                    .body
                    .collect()
                    .await
                    .map_err(|e| StateError::backend(format!("Failed to read S3 object: {e}")))?;

                let content = String::from_utf8(bytes.to_vec()).map_err(|e| StateError::Corrupted {
                    message: format!("Invalid UTF-8 in S3 object: {e}"),
                })?;

                Ok(Some(content))
            }
            Err(sdk_err) => {
                let service_err = sdk_err.into_service_error();
                if service_err.is_no_such_key() {
                    Ok(None)
                } else {
                    Err(StateError::backend(format!("S3 get error: {service_err}")).into())
                }
            }
        }
    }
}

#[async_trait]
impl DeploymentStore for S3DeploymentStore {
    async fn get(&self, id: &str) -> Result<DeploymentRecord> {
        let key = self.key(id);
        debug!("Loading deployment from s3://{}/{key}", self.bucket);

        let Some(json) = self.get_object(&key).await? else {
            return Err(StateError::not_found(id).into());
        };

        let record: DeploymentRecord = serde_json::from_str(&json).map_err(|e| StateError::Corrupted {
            message: format!("Failed to parse record: {e}"),
        })?;

        Ok(record)
    }

    async fn store(&self, record: &DeploymentRecord) -> Result<()> {
        let key = self.key(&record.id);
        debug!("Saving deployment to s3://{}/{key}", self.bucket);

        let content = serde_json::to_string_pretty(record)
            .map_err(|e| StateError::serialization(format!("Failed to serialize record: {e}")))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(content.into_bytes().into())
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| StateError::backend(format!("S3 put error: {e}")))?;

        Ok(())
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.key(id))
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(sdk_err) => {
                let service_err = sdk_err.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(StateError::backend(format!("S3 head error: {service_err}")).into())
                }
            }
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let key = self.key(id);
        debug!("Deleting deployment from s3://{}/{key}", self.bucket);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StateError::backend(format!("S3 delete error: {e}")))?;

        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&self.prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| StateError::backend(format!("S3 list error: {e}")))?;

            ids.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .filter_map(|key| self.id_from_key(key)),
            );

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        ids.sort();
        Ok(ids)
    }

    fn backend_type(&self) -> &'static str {
        "s3"
    }
}

impl S3DeploymentStore {
    fn id_from_key(&self, key: &str) -> Option<String> {
        key.strip_prefix(&self.prefix)?
            .strip_suffix(RECORD_SUFFIX)
            .filter(|id| !id.contains('/'))
            .map(str::to_string)
    }
}

fn normalize_prefix(prefix: Option<&str>) -> String {
    prefix
        .map(|p| {
            let p = p.trim_matches('/');
            if p.is_empty() {
                String::new()
            } else {
                format!("{p}/")
            }
        })
        .unwrap_or_default()
}

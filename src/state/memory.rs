//! In-memory deployment store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Result, StateError};

use super::store::DeploymentStore;
use super::types::DeploymentRecord;

/// Deployment store kept in process memory.
///
/// Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDeploymentStore {
    records: Arc<RwLock<HashMap<String, DeploymentRecord>>>,
}

impl InMemoryDeploymentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeploymentStore for InMemoryDeploymentStore {
    async fn get(&self, id: &str) -> Result<DeploymentRecord> {
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StateError::not_found(id).into())
    }

    async fn store(&self, record: &DeploymentRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.records.read().await.contains_key(id))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.records.write().await.remove(id);
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.records.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}

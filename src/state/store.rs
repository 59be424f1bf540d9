//! Deployment store trait definition.
//!
//! This module defines the common interface for deployment record backends.

use async_trait::async_trait;

use super::types::DeploymentRecord;
use crate::error::Result;

/// Trait for deployment record backends.
///
/// Each `store` replaces the whole record for its id in one write.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Loads a deployment record.
    ///
    /// Returns a not-found state error if no record exists.
    async fn get(&self, id: &str) -> Result<DeploymentRecord>;

    /// Creates or replaces a deployment record.
    async fn store(&self, record: &DeploymentRecord) -> Result<()>;

    /// Checks if a record exists.
    async fn exists(&self, id: &str) -> Result<bool>;

    /// Deletes a record. Deleting a missing record is not an error.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Lists the ids of all records, sorted.
    async fn list_ids(&self) -> Result<Vec<String>>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}

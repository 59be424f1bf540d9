//! Deployment record storage.
//!
//! This module provides durable storage for deployment records: the serialized
//! workspace of each instance and binding plus the outcome of its last
//! operation.

mod local;
mod memory;
mod s3;
mod store;
mod types;

pub use local::{LocalDeploymentStore, STATE_DIR};
pub use memory::InMemoryDeploymentStore;
pub use s3::S3DeploymentStore;
pub use store::DeploymentStore;
pub use types::{
    DEPLOYMENT_ID_PREFIX, DeploymentRecord, LastOperationState, LastOperationType, deployment_id,
    instance_deployment_id,
};

#[cfg(test)]
pub use store::MockDeploymentStore;

//! Deployment record types.
//!
//! A deployment record tracks one unit of work: a service instance or one of
//! its bindings. It carries the serialized workspace and the outcome of the
//! last operation, which is what clients poll.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix of every deployment id.
pub const DEPLOYMENT_ID_PREFIX: &str = "tf";

/// Returns the deployment id of a binding, `tf:<instance>:<binding>`.
#[must_use]
pub fn deployment_id(instance_id: &str, binding_id: &str) -> String {
    format!("{DEPLOYMENT_ID_PREFIX}:{instance_id}:{binding_id}")
}

/// Returns the deployment id of a service instance, `tf:<instance>:`.
#[must_use]
pub fn instance_deployment_id(instance_id: &str) -> String {
    deployment_id(instance_id, "")
}

/// Durable record of a deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentRecord {
    /// Deployment id.
    pub id: String,
    /// Serialized workspace.
    #[serde(with = "crate::codec::base64_bytes")]
    pub workspace: Vec<u8>,
    /// Kind of the last operation.
    pub last_operation_type: LastOperationType,
    /// Outcome of the last operation.
    pub last_operation_state: LastOperationState,
    /// Message recorded with the outcome.
    #[serde(default)]
    pub last_operation_message: String,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last stored.
    pub updated_at: DateTime<Utc>,
}

impl DeploymentRecord {
    /// Creates a record for a new unit of work.
    ///
    /// The record starts as a succeeded provision with the given workspace.
    #[must_use]
    pub fn new(id: impl Into<String>, workspace: Vec<u8>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            workspace,
            last_operation_type: LastOperationType::Provision,
            last_operation_state: LastOperationState::Succeeded,
            last_operation_message: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Refreshes the update timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Returns true if an operation is running.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.last_operation_state == LastOperationState::InProgress
    }
}

/// Kind of operation recorded on a deployment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LastOperationType {
    /// Provision or bind.
    Provision,
    /// Update, upgrade, or import.
    Update,
    /// Deprovision or unbind.
    Deprovision,
}

impl fmt::Display for LastOperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Provision => "provision",
            Self::Update => "update",
            Self::Deprovision => "deprovision",
        };
        f.write_str(name)
    }
}

/// Outcome of the last operation.
///
/// Stored as `"in progress"`, `"succeeded"`, or `"failed"`. Anything else
/// reads back as [`LastOperationState::Unknown`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum LastOperationState {
    /// The operation is running.
    InProgress,
    /// The operation succeeded.
    Succeeded,
    /// The operation failed.
    Failed,
    /// The stored value is not recognized.
    Unknown,
}

impl LastOperationState {
    /// Stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in progress",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }

    /// Returns true if the outcome is final.
    ///
    /// An unrecognized state is treated as still running.
    #[must_use]
    pub const fn is_done(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl From<String> for LastOperationState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "in progress" => Self::InProgress,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

impl From<LastOperationState> for String {
    fn from(value: LastOperationState) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for LastOperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deployment_ids() {
        assert_eq!(deployment_id("inst", "bind"), "tf:inst:bind");
        assert_eq!(instance_deployment_id("inst"), "tf:inst:");
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&LastOperationState::InProgress).expect("serializable");
        assert_eq!(json, "\"in progress\"");

        let state: LastOperationState = serde_json::from_str("\"succeeded\"").expect("known");
        assert_eq!(state, LastOperationState::Succeeded);

        let state: LastOperationState = serde_json::from_str("\"exploded\"").expect("tolerated");
        assert_eq!(state, LastOperationState::Unknown);
        assert!(!state.is_done());
    }

    #[test]
    fn test_record_json_shape() {
        let record = DeploymentRecord::new("tf:a:", b"{}".to_vec());
        let value = serde_json::to_value(&record).expect("serializable");

        assert_eq!(value["workspace"], "e30=");
        assert_eq!(value["last_operation_type"], "provision");
        assert_eq!(value["last_operation_state"], "succeeded");
        assert!(!record.is_in_progress());
    }
}

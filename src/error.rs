//! Error types for the broker core.
//!
//! This module provides the error hierarchy for every stage of a brokered
//! operation: configuration, deployment storage, request classification,
//! workspace handling, tool invocation, and job execution.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the broker core.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Deployment store errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Update request classification errors.
    #[error(transparent)]
    Decision(#[from] DecisionError),

    /// Workspace document errors.
    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    /// Tool invocation errors.
    #[error(transparent)]
    Invoker(#[from] InvokerError),

    /// Job execution errors.
    #[error(transparent)]
    Job(#[from] JobError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// No terraform version is declared.
    #[error("terraform not found")]
    TerraformNotFound,

    /// Several terraform versions are declared and none is the default.
    #[error("no default terraform found")]
    NoDefaultTerraform,
}

/// Deployment store errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// Deployment record not found.
    #[error("Deployment not found: {id}")]
    NotFound {
        /// Id of the missing deployment.
        id: String,
    },

    /// Stored record is corrupted.
    #[error("Deployment record is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Storage backend failure.
    #[error("State backend error: {message}")]
    Backend {
        /// Description of the backend error.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },
}

/// Update request classification errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecisionError {
    /// The requested plan is not part of the service definition.
    #[error("plan {plan_id} does not exist")]
    PlanNotFound {
        /// Requested plan id.
        plan_id: String,
    },

    /// Request and plan both carry maintenance info, and they differ.
    #[error("passed maintenance_info does not match the catalog maintenance_info")]
    MaintenanceInfoConflict,

    /// Request carries maintenance info but the plan has none.
    #[error("maintenance_info was passed, but the broker catalog contains no maintenance_info")]
    MaintenanceInfoNilConflict,

    /// The instance runs a maintenance info that no longer matches its plan.
    #[error("service instance needs to be upgraded before updating")]
    InstanceMustBeUpgradedFirst,
}

/// Workspace document errors.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// Stored workspace could not be decoded.
    #[error("error deserializing workspace: {message}")]
    Deserialize {
        /// Description of the decode failure.
        message: String,
    },

    /// Workspace could not be encoded.
    #[error("error serializing workspace: {message}")]
    Serialize {
        /// Description of the encode failure.
        message: String,
    },

    /// The workspace has never been applied.
    #[error("workspace has no terraform state")]
    NoState,

    /// The embedded tool state is unreadable.
    #[error("invalid terraform state: {message}")]
    InvalidState {
        /// Description of the state problem.
        message: String,
    },

    /// No module instance with the given name.
    #[error("no module instance named {name}")]
    InstanceNotFound {
        /// Requested instance name.
        name: String,
    },

    /// The workspace declares no module instances.
    #[error("workspace has no module instances")]
    NoInstances,

    /// The workspace declares no modules.
    #[error("workspace has no modules")]
    NoModules,
}

/// Tool invocation errors.
#[derive(Debug, Error)]
pub enum InvokerError {
    /// A terraform command returned an error.
    #[error("terraform {command} failed (version {version}): {message}")]
    CommandFailed {
        /// Command name (apply, destroy, import, show, plan).
        command: String,
        /// Tool version the command ran with.
        version: String,
        /// Error reported by the tool.
        message: String,
    },
}

/// Job execution errors.
#[derive(Debug, Error)]
pub enum JobError {
    /// Upgrades are disabled and the state is older than the default version.
    #[error(
        "apply attempted with a newer version of terraform than the state (state: {state_version}, default: {default_version})"
    )]
    VersionMismatch {
        /// Tool version embedded in the state.
        state_version: String,
        /// Broker default tool version.
        default_version: String,
    },

    /// Upgrades are enabled but no upgrade path is configured.
    #[error("terraform version mismatch and no upgrade path specified")]
    NoUpgradePathConfigured,

    /// An import plan would delete resources.
    #[error("terraform plan shows that resources would be deleted - cancelling import: {}", .addresses.join(", "))]
    ResourceDeletionBlocked {
        /// Addresses of the resources the plan would delete.
        addresses: Vec<String>,
    },

    /// Another operation is still running for the deployment.
    #[error("an operation is already in progress for deployment {id}")]
    OperationInProgress {
        /// Deployment id.
        id: String,
    },

    /// A finished operation failed; carries the recorded message.
    #[error("{message}")]
    OperationFailed {
        /// Message stored on the deployment record.
        message: String,
    },

    /// The job was cancelled before it finished.
    #[error("operation cancelled")]
    Cancelled,

    /// The background task panicked or was aborted.
    #[error("job task failed: {message}")]
    TaskFailed {
        /// Description of the task failure.
        message: String,
    },
}

/// Result type alias for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;

impl BrokerError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::State(StateError::Backend { .. })
                | Self::Job(JobError::OperationInProgress { .. })
        )
    }

    /// Returns true if the error means the deployment record does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::State(StateError::NotFound { .. }))
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl StateError {
    /// Creates a backend error with the given message.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Creates a not-found error for a deployment id.
    #[must_use]
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }
}

impl DecisionError {
    /// HTTP status the broker API answers with for this error.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::PlanNotFound { .. } => 500,
            Self::MaintenanceInfoConflict
            | Self::MaintenanceInfoNilConflict
            | Self::InstanceMustBeUpgradedFirst => 422,
        }
    }

    /// Error key reported in the broker API failure body.
    #[must_use]
    pub const fn error_key(&self) -> Option<&'static str> {
        match self {
            Self::PlanNotFound { .. } => None,
            Self::MaintenanceInfoConflict | Self::MaintenanceInfoNilConflict => {
                Some("MaintenanceInfoConflict")
            }
            Self::InstanceMustBeUpgradedFirst => Some("previous-maintenance-info-check"),
        }
    }
}

impl WorkspaceError {
    /// Creates a deserialization error.
    #[must_use]
    pub fn deserialize(message: impl Into<String>) -> Self {
        Self::Deserialize {
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }
}

impl InvokerError {
    /// Creates a command failure.
    #[must_use]
    pub fn command(
        command: impl Into<String>,
        version: &semver::Version,
        message: impl Into<String>,
    ) -> Self {
        Self::CommandFailed {
            command: command.into(),
            version: version.to_string(),
            message: message.into(),
        }
    }
}

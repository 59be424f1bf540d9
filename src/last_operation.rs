//! Durable record of the last operation on each deployment.
//!
//! Jobs run in the background; clients learn about them only by polling the
//! deployment record. This store owns the two transitions of that record
//! (started and finished) and answers the polls.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{BrokerError, JobError, Result};
use crate::state::{DeploymentRecord, DeploymentStore, LastOperationState, LastOperationType};
use crate::workspace::Workspace;

/// Default interval between polls in [`LastOperationStore::wait`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Output whose value becomes the message of a succeeded operation.
pub const STATUS_OUTPUT: &str = "status";

/// Answer to a status poll.
#[derive(Debug)]
pub struct OperationStatus {
    /// True once the outcome will not change again.
    pub is_done: bool,
    /// Message recorded with the outcome.
    pub message: String,
    /// Set when the operation failed; carries the recorded message.
    pub error: Option<BrokerError>,
}

/// Reads and writes the last-operation fields of deployment records.
#[derive(Clone)]
pub struct LastOperationStore {
    store: Arc<dyn DeploymentStore>,
    poll_interval: Duration,
}

impl fmt::Debug for LastOperationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LastOperationStore")
            .field("backend", &self.store.backend_type())
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl LastOperationStore {
    /// Creates a store polling once per second.
    #[must_use]
    pub fn new(store: Arc<dyn DeploymentStore>) -> Self {
        Self {
            store,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets the interval between polls in [`Self::wait`].
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// The underlying deployment store.
    #[must_use]
    pub fn deployments(&self) -> &Arc<dyn DeploymentStore> {
        &self.store
    }

    /// Marks an operation as running and clears the previous message.
    ///
    /// The record is read again right before the write, so fields changed
    /// since the caller last looked are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be read or stored.
    pub async fn mark_job_started(&self, id: &str, operation: LastOperationType) -> Result<()> {
        debug!("Marking {operation} started for deployment {id}");
        let mut record = self.store.get(id).await?;

        record.last_operation_type = operation;
        record.last_operation_state = LastOperationState::InProgress;
        record.last_operation_message = String::new();
        record.touch();

        self.store.store(&record).await
    }

    /// Records the outcome of an operation together with its workspace.
    ///
    /// On success the message is the `status` output of the first module
    /// instance, or empty if there is none. On failure it is the error text.
    /// Without a workspace the stored one is kept. If the workspace cannot be
    /// serialized the operation is recorded as failed whatever its outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be stored.
    pub async fn operation_finished(
        &self,
        error: Option<&BrokerError>,
        workspace: Option<&dyn Workspace>,
        mut record: DeploymentRecord,
    ) -> Result<()> {
        match error {
            None => {
                record.last_operation_state = LastOperationState::Succeeded;
                record.last_operation_message = workspace.map(status_message).unwrap_or_default();
            }
            Some(e) => {
                record.last_operation_state = LastOperationState::Failed;
                record.last_operation_message = e.to_string();
            }
        }

        if let Some(workspace) = workspace {
            match workspace.to_bytes() {
                Ok(bytes) => record.workspace = bytes,
                Err(e) => {
                    error!("Couldn't serialize workspace of deployment {}: {e}", record.id);
                    record.last_operation_state = LastOperationState::Failed;
                    record.last_operation_message =
                        format!("couldn't serialize workspace, contact your operator for cleanup: {e}");
                    record.workspace = Vec::new();
                }
            }
        }

        info!(
            "Deployment {} {} {}",
            record.id, record.last_operation_type, record.last_operation_state
        );

        record.touch();
        self.store.store(&record).await
    }

    /// Current status of the last operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be read.
    pub async fn status(&self, id: &str) -> Result<OperationStatus> {
        let record = self.store.get(id).await?;
        let message = record.last_operation_message;

        let status = match record.last_operation_state {
            LastOperationState::Succeeded => OperationStatus {
                is_done: true,
                message,
                error: None,
            },
            LastOperationState::Failed => OperationStatus {
                is_done: true,
                error: Some(
                    JobError::OperationFailed {
                        message: message.clone(),
                    }
                    .into(),
                ),
                message,
            },
            LastOperationState::InProgress | LastOperationState::Unknown => OperationStatus {
                is_done: false,
                message,
                error: None,
            },
        };

        Ok(status)
    }

    /// Polls until the operation finishes.
    ///
    /// Returns `Ok(())` when the operation succeeded and also when `cancel`
    /// fires first: cancellation only stops the wait, it says nothing about
    /// the operation.
    ///
    /// # Errors
    ///
    /// Returns the recorded failure of the operation, or the error of a poll
    /// that could not read the record.
    pub async fn wait(&self, cancel: &CancellationToken, id: &str) -> Result<()> {
        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    debug!("Stopped waiting for deployment {id}");
                    return Ok(());
                }

                () = tokio::time::sleep(self.poll_interval) => {
                    let status = self.status(id).await?;
                    if status.is_done {
                        return status.error.map_or(Ok(()), Err);
                    }
                }
            }
        }
    }
}

fn status_message(workspace: &dyn Workspace) -> String {
    let Some(instance) = workspace.module_instances().first() else {
        return String::new();
    };

    match workspace.outputs(&instance.instance_name) {
        Ok(outputs) => match outputs.get(STATUS_OUTPUT) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        },
        Err(e) => {
            debug!("No outputs for status message: {e}");
            String::new()
        }
    }
}

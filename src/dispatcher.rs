//! Background job dispatch.
//!
//! Every entry point checks the deployment synchronously, marks the operation
//! as started, and only then spawns the job, so a poll that arrives right
//! after the call already sees it in progress. The job records its own
//! outcome; the returned [`JobHandle`] lets the caller await or cancel it.
//! A cancelled job still records the workspace it reached.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span};
use uuid::Uuid;

use crate::catalog::Params;
use crate::error::{BrokerError, JobError, Result};
use crate::invoker::ImportResource;
use crate::last_operation::{LastOperationStore, OperationStatus};
use crate::runner::{JobResult, JobRunner};
use crate::state::{LastOperationType, deployment_id, instance_deployment_id};
use crate::workspace::{TerraformWorkspace, Workspace};

/// Kind of dispatched job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOperation {
    /// Create the deployment's resources.
    Provision,
    /// Apply new variables.
    Update,
    /// Destroy the deployment's resources.
    Deprovision,
    /// Bring existing resources under management.
    Import,
    /// Move the state to the default tool version.
    Upgrade,
}

impl JobOperation {
    /// Operation type recorded on the deployment.
    #[must_use]
    pub const fn last_operation_type(self) -> LastOperationType {
        match self {
            Self::Provision => LastOperationType::Provision,
            Self::Update | Self::Import | Self::Upgrade => LastOperationType::Update,
            Self::Deprovision => LastOperationType::Deprovision,
        }
    }
}

impl fmt::Display for JobOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Provision => "provision",
            Self::Update => "update",
            Self::Deprovision => "deprovision",
            Self::Import => "import",
            Self::Upgrade => "upgrade",
        };
        f.write_str(name)
    }
}

/// Variables for upgrading one binding of an instance.
#[derive(Debug, Clone)]
pub struct BindingUpgrade {
    /// Binding id.
    pub binding_id: String,
    /// Variables the binding was created with.
    pub vars: Params,
}

/// Handle to a running job.
#[derive(Debug)]
pub struct JobHandle {
    job_id: Uuid,
    deployment_id: String,
    operation: JobOperation,
    cancel: CancellationToken,
    task: JoinHandle<Result<()>>,
    last_operation: LastOperationStore,
}

impl JobHandle {
    /// Correlation id of the job, also attached to its log span.
    #[must_use]
    pub const fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Deployment the job runs against.
    #[must_use]
    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }

    /// Kind of job.
    #[must_use]
    pub const fn operation(&self) -> JobOperation {
        self.operation
    }

    /// Asks the job to stop.
    ///
    /// The running tool command is abandoned and the job is recorded as
    /// failed with the workspace as of the last completed command.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Polls the deployment record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be read.
    pub async fn status(&self) -> Result<OperationStatus> {
        self.last_operation.status(&self.deployment_id).await
    }

    /// Waits for the job to finish and record its outcome.
    ///
    /// # Errors
    ///
    /// Returns the job's failure, the failure to record it, or
    /// [`JobError::TaskFailed`] if the task panicked.
    pub async fn join(self) -> Result<()> {
        self.task.await.map_err(|e| JobError::TaskFailed {
            message: e.to_string(),
        })?
    }
}

/// Dispatches jobs and records their outcome.
pub struct JobDispatcher {
    runner: Arc<JobRunner>,
    last_operation: LastOperationStore,
}

impl JobDispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(runner: JobRunner, last_operation: LastOperationStore) -> Self {
        Self {
            runner: Arc::new(runner),
            last_operation,
        }
    }

    /// The last-operation store jobs record into.
    #[must_use]
    pub const fn last_operation(&self) -> &LastOperationStore {
        &self.last_operation
    }

    /// Starts a create job.
    ///
    /// # Errors
    ///
    /// Returns pre-flight failures; the job's own outcome is recorded.
    pub async fn provision(&self, id: &str) -> Result<JobHandle> {
        let job_id = id.to_string();
        self.dispatch(id, JobOperation::Provision, move |runner, cancel| async move {
            runner.create(&job_id, &cancel).await
        })
        .await
    }

    /// Starts an update job.
    ///
    /// # Errors
    ///
    /// Returns pre-flight failures; the job's own outcome is recorded.
    pub async fn update(&self, id: &str, vars: Params) -> Result<JobHandle> {
        let job_id = id.to_string();
        self.dispatch(id, JobOperation::Update, move |runner, cancel| async move {
            runner.update(&job_id, vars, &cancel).await
        })
        .await
    }

    /// Starts a destroy job.
    ///
    /// # Errors
    ///
    /// Returns pre-flight failures; the job's own outcome is recorded.
    pub async fn deprovision(&self, id: &str, vars: Params) -> Result<JobHandle> {
        let job_id = id.to_string();
        self.dispatch(id, JobOperation::Deprovision, move |runner, cancel| async move {
            runner.destroy(&job_id, vars, &cancel).await
        })
        .await
    }

    /// Starts an import job.
    ///
    /// # Errors
    ///
    /// Returns pre-flight failures; the job's own outcome is recorded.
    pub async fn import(&self, id: &str, resources: Vec<ImportResource>) -> Result<JobHandle> {
        let job_id = id.to_string();
        self.dispatch(id, JobOperation::Import, move |runner, cancel| async move {
            runner.import(&job_id, &resources, &cancel).await
        })
        .await
    }

    /// Starts an upgrade job: the version walk followed by an apply with
    /// `vars`.
    ///
    /// # Errors
    ///
    /// Returns pre-flight failures; the job's own outcome is recorded.
    pub async fn upgrade(&self, id: &str, vars: Params) -> Result<JobHandle> {
        let job_id = id.to_string();
        self.dispatch(id, JobOperation::Upgrade, move |runner, cancel| async move {
            runner.update(&job_id, vars, &cancel).await
        })
        .await
    }

    /// Upgrades an instance, then each of its bindings in order.
    ///
    /// Each upgrade runs to completion before the next starts. The first
    /// failure stops the walk.
    ///
    /// # Errors
    ///
    /// Returns the first pre-flight or job failure.
    pub async fn upgrade_instance(
        &self,
        instance_id: &str,
        instance_vars: Params,
        bindings: Vec<BindingUpgrade>,
    ) -> Result<()> {
        info!("Upgrading instance {instance_id} and {} binding(s)", bindings.len());

        self.upgrade(&instance_deployment_id(instance_id), instance_vars)
            .await?
            .join()
            .await?;

        for binding in bindings {
            self.upgrade(&deployment_id(instance_id, &binding.binding_id), binding.vars)
                .await?
                .join()
                .await?;
        }

        Ok(())
    }

    async fn dispatch<F, Fut>(&self, id: &str, operation: JobOperation, job: F) -> Result<JobHandle>
    where
        F: FnOnce(Arc<JobRunner>, CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = JobResult> + Send + 'static,
    {
        let record = self.last_operation.deployments().get(id).await?;
        if record.is_in_progress() {
            return Err(JobError::OperationInProgress { id: id.to_string() }.into());
        }
        TerraformWorkspace::from_bytes(&record.workspace)?;

        self.last_operation
            .mark_job_started(id, operation.last_operation_type())
            .await?;

        let job_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let span = info_span!("job", %job_id, deployment_id = %id, %operation);

        let task = {
            let runner = Arc::clone(&self.runner);
            let last_operation = self.last_operation.clone();
            let cancel = cancel.clone();
            let id = id.to_string();

            tokio::spawn(
                async move {
                    info!("Job started");
                    let result = job(runner, cancel).await;
                    record_outcome(&last_operation, &id, result).await
                }
                .instrument(span),
            )
        };

        debug!("Dispatched {operation} job {job_id} for deployment {id}");

        Ok(JobHandle {
            job_id,
            deployment_id: id.to_string(),
            operation,
            cancel,
            task,
            last_operation: self.last_operation.clone(),
        })
    }
}

/// Writes the outcome to a freshly read record and hands the job error back.
async fn record_outcome(last_operation: &LastOperationStore, id: &str, result: JobResult) -> Result<()> {
    let (job_error, workspace): (Option<BrokerError>, Option<TerraformWorkspace>) = match result {
        Ok(workspace) => (None, Some(workspace)),
        Err(failure) => (Some(failure.error), failure.workspace),
    };

    let record = match last_operation.deployments().get(id).await {
        Ok(record) => record,
        Err(e) => {
            error!("Couldn't reload deployment {id} to record the outcome: {e}");
            return Err(e);
        }
    };

    last_operation
        .operation_finished(
            job_error.as_ref(),
            workspace.as_ref().map(|ws| ws as &dyn Workspace),
            record,
        )
        .await?;

    match job_error {
        None => {
            info!("Job finished");
            Ok(())
        }
        Some(e) => {
            info!("Job failed: {e}");
            Err(e)
        }
    }
}

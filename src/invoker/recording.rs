//! In-process invoker that records calls instead of running the tool.
//!
//! Every command is appended to a log shared by all invokers of one builder.
//! Commands that write state stamp the invoker's version into the workspace,
//! so version walks can be observed without a tool binary.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use semver::Version;
use tokio::sync::Mutex;
use tracing::debug;

use crate::catalog::Params;
use crate::error::{InvokerError, Result};
use crate::workspace::{TerraformWorkspace, state_document};

use super::{ImportResource, InvokerBuilder, PlanOutput, TerraformCommand, TerraformInvoker};

/// One recorded command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Command that ran.
    pub command: TerraformCommand,
    /// Version of the invoker that ran it.
    pub version: Version,
}

#[derive(Debug, Clone)]
struct Failure {
    command: TerraformCommand,
    version: Option<Version>,
    message: String,
}

#[derive(Debug, Default)]
struct Recorder {
    calls: Vec<Invocation>,
    failures: Vec<Failure>,
    delays: Vec<(Version, Duration)>,
    outputs: Params,
    show_output: String,
    plan_output: String,
}

impl Recorder {
    fn failure_for(&self, command: TerraformCommand, version: &Version) -> Option<String> {
        self.failures
            .iter()
            .find(|f| f.command == command && f.version.as_ref().is_none_or(|v| v == version))
            .map(|f| f.message.clone())
    }

    fn delay_for(&self, version: &Version) -> Option<Duration> {
        self.delays.iter().find(|(v, _)| v == version).map(|(_, d)| *d)
    }
}

/// Builds [`RecordingInvoker`]s sharing one call log.
#[derive(Debug, Clone, Default)]
pub struct RecordingInvokerBuilder {
    recorder: Arc<Mutex<Recorder>>,
}

impl RecordingInvokerBuilder {
    /// Creates a builder with an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `command` fail, at every version or only at `version`.
    pub async fn fail_on(&self, command: TerraformCommand, version: Option<Version>, message: impl Into<String>) {
        self.recorder.lock().await.failures.push(Failure {
            command,
            version,
            message: message.into(),
        });
    }

    /// Makes every command at `version` take `delay` after it is recorded.
    pub async fn slow_down(&self, version: Version, delay: Duration) {
        self.recorder.lock().await.delays.push((version, delay));
    }

    /// Sets the outputs written into the state by `apply`.
    pub async fn set_outputs(&self, outputs: Params) {
        self.recorder.lock().await.outputs = outputs;
    }

    /// Sets the definition returned by `show`.
    pub async fn set_show_output(&self, output: impl Into<String>) {
        self.recorder.lock().await.show_output = output.into();
    }

    /// Sets the text returned by `plan`.
    pub async fn set_plan_output(&self, output: impl Into<String>) {
        self.recorder.lock().await.plan_output = output.into();
    }

    /// Returns the recorded calls in order.
    pub async fn calls(&self) -> Vec<Invocation> {
        self.recorder.lock().await.calls.clone()
    }

    /// Returns the versions `command` ran at, in order.
    pub async fn versions_for(&self, command: TerraformCommand) -> Vec<Version> {
        self.recorder
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.command == command)
            .map(|c| c.version.clone())
            .collect()
    }
}

impl InvokerBuilder for RecordingInvokerBuilder {
    fn versioned(&self, version: &Version) -> Arc<dyn TerraformInvoker> {
        Arc::new(RecordingInvoker {
            version: version.clone(),
            recorder: Arc::clone(&self.recorder),
        })
    }
}

/// Invoker bound to one version that records its calls.
#[derive(Debug)]
pub struct RecordingInvoker {
    version: Version,
    recorder: Arc<Mutex<Recorder>>,
}

impl RecordingInvoker {
    async fn record(&self, command: TerraformCommand) -> Result<()> {
        let (failure, delay) = {
            let mut recorder = self.recorder.lock().await;
            debug!("Recording terraform {} at {}", command, self.version);
            recorder.calls.push(Invocation {
                command,
                version: self.version.clone(),
            });
            (recorder.failure_for(command, &self.version), recorder.delay_for(&self.version))
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match failure {
            Some(message) => Err(InvokerError::command(command.to_string(), &self.version, message).into()),
            None => Ok(()),
        }
    }

    async fn outputs(&self) -> Params {
        self.recorder.lock().await.outputs.clone()
    }
}

#[async_trait]
impl TerraformInvoker for RecordingInvoker {
    fn version(&self) -> &Version {
        &self.version
    }

    async fn apply(&self, workspace: &mut TerraformWorkspace) -> Result<()> {
        self.record(TerraformCommand::Apply).await?;
        let outputs = self.outputs().await;
        workspace.set_state(state_document(&self.version, &outputs));
        Ok(())
    }

    async fn destroy(&self, workspace: &mut TerraformWorkspace) -> Result<()> {
        self.record(TerraformCommand::Destroy).await?;
        workspace.set_state(state_document(&self.version, &Params::new()));
        Ok(())
    }

    async fn import(&self, workspace: &mut TerraformWorkspace, resources: &[ImportResource]) -> Result<()> {
        self.record(TerraformCommand::Import).await?;
        debug!("Imported {} resource(s)", resources.len());
        workspace.set_state(state_document(&self.version, &Params::new()));
        Ok(())
    }

    async fn show(&self, _workspace: &mut TerraformWorkspace) -> Result<String> {
        self.record(TerraformCommand::Show).await?;
        Ok(self.recorder.lock().await.show_output.clone())
    }

    async fn plan(&self, _workspace: &mut TerraformWorkspace) -> Result<PlanOutput> {
        self.record(TerraformCommand::Plan).await?;
        Ok(PlanOutput::new(self.recorder.lock().await.plan_output.clone()))
    }
}

//! Create, update, destroy, and import jobs.
//!
//! The runner loads the deployment's workspace, runs the tool, and hands the
//! workspace back. It never writes the outcome; the caller passes it to the
//! last-operation store, even when the job failed halfway.
//!
//! Cancellation is checked around every tool command. A cancelled job stops
//! at the next command boundary and returns the workspace as far as it got,
//! so a retry resumes from the version already reached.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::catalog::Params;
use crate::error::{BrokerError, JobError, Result, WorkspaceError};
use crate::invoker::{ImportResource, InvokerBuilder, TerraformInvoker, check_plan_output};
use crate::state::DeploymentStore;
use crate::workspace::{TerraformWorkspace, Workspace};

use super::upgrade::UpgradeSettings;

/// A failed job and the workspace as far as the job got.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct JobFailure {
    /// Why the job failed.
    pub error: BrokerError,
    /// Workspace as mutated before the failure; `None` if it was never loaded.
    pub workspace: Option<TerraformWorkspace>,
}

impl JobFailure {
    /// Failure before the workspace was loaded.
    #[must_use]
    pub fn preflight(error: impl Into<BrokerError>) -> Self {
        Self {
            error: error.into(),
            workspace: None,
        }
    }

    /// Failure after the workspace was loaded.
    #[must_use]
    pub fn with_workspace(error: impl Into<BrokerError>, workspace: TerraformWorkspace) -> Self {
        Self {
            error: error.into(),
            workspace: Some(workspace),
        }
    }
}

/// Outcome of a job.
pub type JobResult = std::result::Result<TerraformWorkspace, JobFailure>;

/// Runs jobs against stored workspaces.
pub struct JobRunner {
    store: Arc<dyn DeploymentStore>,
    invokers: Arc<dyn InvokerBuilder>,
    settings: UpgradeSettings,
}

impl JobRunner {
    /// Creates a runner.
    #[must_use]
    pub fn new(
        store: Arc<dyn DeploymentStore>,
        invokers: Arc<dyn InvokerBuilder>,
        settings: UpgradeSettings,
    ) -> Self {
        Self {
            store,
            invokers,
            settings,
        }
    }

    /// Upgrade configuration in effect.
    #[must_use]
    pub const fn settings(&self) -> &UpgradeSettings {
        &self.settings
    }

    /// Invoker bound to the default tool version.
    #[must_use]
    pub fn default_invoker(&self) -> Arc<dyn TerraformInvoker> {
        self.invokers.versioned(&self.settings.default_version)
    }

    /// Applies the stored workspace at the default version.
    ///
    /// # Errors
    ///
    /// Returns the failure and, once loaded, the workspace.
    pub async fn create(&self, id: &str, cancel: &CancellationToken) -> JobResult {
        info!("Creating deployment {id}");
        let mut workspace = self.load(id).await?;

        let outcome = guarded(cancel, self.default_invoker().apply(&mut workspace)).await;

        finish(id, outcome, workspace)
    }

    /// Upgrades the stored workspace, merges `vars`, and applies it.
    ///
    /// # Errors
    ///
    /// Returns the failure and, once loaded, the workspace.
    pub async fn update(&self, id: &str, vars: Params, cancel: &CancellationToken) -> JobResult {
        info!("Updating deployment {id}");
        let mut workspace = self.load(id).await?;

        let outcome = async {
            self.perform_upgrade(&mut workspace, cancel).await?;
            workspace.update_instance_configuration(vars)?;
            guarded(cancel, self.default_invoker().apply(&mut workspace)).await
        }
        .await;

        finish(id, outcome, workspace)
    }

    /// Upgrades the stored workspace and destroys it.
    ///
    /// The instance configuration is replaced by the declared inputs only,
    /// taken from `vars`; inputs missing from `vars` are set to `null`.
    ///
    /// # Errors
    ///
    /// Returns the failure and, once loaded, the workspace.
    pub async fn destroy(&self, id: &str, vars: Params, cancel: &CancellationToken) -> JobResult {
        info!("Destroying deployment {id}");
        let mut workspace = self.load(id).await?;

        let inputs = workspace.module_inputs().map_err(JobFailure::preflight)?;
        let limited: Params = inputs
            .into_iter()
            .map(|name| {
                let value = vars.get(&name).cloned().unwrap_or(Value::Null);
                (name, value)
            })
            .collect();

        let Some(instance) = workspace.instances.first_mut() else {
            return Err(JobFailure::preflight(WorkspaceError::NoInstances));
        };
        instance.configuration = limited;

        let outcome = async {
            self.perform_upgrade(&mut workspace, cancel).await?;
            guarded(cancel, self.default_invoker().destroy(&mut workspace)).await
        }
        .await;

        finish(id, outcome, workspace)
    }

    /// Imports existing resources and brings them under management.
    ///
    /// The generated definition replaces the main definition, the recovered
    /// values join the instance configuration, and a dry-run plan must show
    /// no deletions before the workspace is applied.
    ///
    /// # Errors
    ///
    /// Returns the failure and, once loaded, the workspace.
    pub async fn import(
        &self,
        id: &str,
        resources: &[ImportResource],
        cancel: &CancellationToken,
    ) -> JobResult {
        info!("Importing {} resource(s) into deployment {id}", resources.len());
        let mut workspace = self.load(id).await?;
        let invoker = self.default_invoker();

        let outcome = async {
            guarded(cancel, invoker.import(&mut workspace, resources)).await?;

            let generated = guarded(cancel, invoker.show(&mut workspace)).await?;
            let (definition, values) = workspace.transform.transform(&generated);
            debug!("Recovered {} parameter(s) from imported definition", values.len());

            workspace.update_instance_configuration(values)?;
            workspace.set_main_definition(definition)?;

            let plan = guarded(cancel, invoker.plan(&mut workspace)).await?;
            check_plan_output(&plan)?;

            guarded(cancel, invoker.apply(&mut workspace)).await
        }
        .await;

        finish(id, outcome, workspace)
    }

    /// Output values of an instance in the stored workspace.
    ///
    /// # Errors
    ///
    /// Returns an error if the record or instance is missing, or the
    /// workspace cannot be decoded.
    pub async fn outputs(&self, id: &str, instance_name: &str) -> Result<Params> {
        let record = self.store.get(id).await?;
        TerraformWorkspace::from_bytes(&record.workspace)?.outputs(instance_name)
    }

    /// Renders the stored workspace with the default invoker.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is missing, the workspace cannot be
    /// decoded, or the tool fails.
    pub async fn show(&self, id: &str) -> Result<String> {
        let record = self.store.get(id).await?;
        let mut workspace = TerraformWorkspace::from_bytes(&record.workspace)?;
        self.default_invoker().show(&mut workspace).await
    }

    async fn load(&self, id: &str) -> std::result::Result<TerraformWorkspace, JobFailure> {
        let record = self.store.get(id).await.map_err(JobFailure::preflight)?;
        TerraformWorkspace::from_bytes(&record.workspace).map_err(JobFailure::preflight)
    }

    /// Walks the workspace up to the default version.
    ///
    /// A failed or cancelled step leaves the workspace at the last version
    /// that applied.
    async fn perform_upgrade(&self, workspace: &mut TerraformWorkspace, cancel: &CancellationToken) -> Result<()> {
        let current = workspace.state_version()?;
        let steps = self.settings.steps_from(&current)?;

        if steps.is_empty() {
            debug!("State version {current} needs no upgrade");
            return Ok(());
        }

        let mut from = current;
        for version in steps {
            info!("Upgrading state from {from} with terraform {version}");
            guarded(cancel, self.invokers.versioned(&version).apply(workspace)).await?;
            from = version;
        }

        Ok(())
    }
}

/// Runs one tool command unless the job is cancelled first.
///
/// A command cancelled while running is dropped before it writes state.
async fn guarded<T>(cancel: &CancellationToken, command: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        biased;

        () = cancel.cancelled() => {
            warn!("Job cancelled before the command finished");
            Err(JobError::Cancelled.into())
        }
        result = command => result,
    }
}

fn finish(id: &str, outcome: Result<()>, workspace: TerraformWorkspace) -> JobResult {
    match outcome {
        Ok(()) => {
            info!("Job for deployment {id} succeeded");
            Ok(workspace)
        }
        Err(e) => {
            error!("Job for deployment {id} failed: {e}");
            Err(JobFailure::with_workspace(e, workspace))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{JobError, StateError};
    use crate::invoker::{RecordingInvokerBuilder, TerraformCommand};
    use crate::state::{DeploymentRecord, InMemoryDeploymentStore};
    use crate::workspace::{ModuleDefinition, ParameterMapping, TfTransformer, state_document};
    use semver::Version;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::time::Duration;

    const ID: &str = "tf:inst:";

    fn v(s: &str) -> Version {
        Version::parse(s).expect("valid version")
    }

    fn workspace(state_version: Option<&str>) -> TerraformWorkspace {
        let module = ModuleDefinition {
            name: String::from("brokertemplate"),
            definitions: BTreeMap::from([(
                String::from("main"),
                String::from("variable \"name\" {}\nvariable \"region\" {}"),
            )]),
        };
        let mut config = Params::new();
        config.insert(String::from("name"), json!("db"));
        config.insert(String::from("stale"), json!(true));

        let mut ws = TerraformWorkspace::new(module, "instance", config);
        if let Some(version) = state_version {
            ws.set_state(state_document(&v(version), &Params::new()));
        }
        ws
    }

    async fn runner(
        settings: UpgradeSettings,
        ws: &TerraformWorkspace,
    ) -> (JobRunner, RecordingInvokerBuilder, InMemoryDeploymentStore) {
        let store = InMemoryDeploymentStore::new();
        store
            .store(&DeploymentRecord::new(ID, ws.to_bytes().expect("serializable")))
            .await
            .expect("stored");
        let invokers = RecordingInvokerBuilder::new();
        let runner = JobRunner::new(Arc::new(store.clone()), Arc::new(invokers.clone()), settings);
        (runner, invokers, store)
    }

    fn upgrading() -> UpgradeSettings {
        UpgradeSettings::enabled(v("1.1.6"), vec![v("1.0.0"), v("1.1.6")])
    }

    #[tokio::test]
    async fn test_create_applies_at_default_version() {
        let (runner, invokers, _) = runner(upgrading(), &workspace(None)).await;

        let ws = runner.create(ID, &CancellationToken::new()).await.expect("create succeeds");

        assert_eq!(invokers.versions_for(TerraformCommand::Apply).await, vec![v("1.1.6")]);
        assert_eq!(ws.state_version().expect("applied"), v("1.1.6"));
    }

    #[tokio::test]
    async fn test_update_walks_upgrade_path() {
        let (runner, invokers, _) = runner(upgrading(), &workspace(Some("0.12.21"))).await;

        let mut vars = Params::new();
        vars.insert(String::from("region"), json!("eu-west-1"));
        let ws = runner.update(ID, vars, &CancellationToken::new()).await.expect("update succeeds");

        // two upgrade steps, then the update itself at the default version
        assert_eq!(
            invokers.versions_for(TerraformCommand::Apply).await,
            vec![v("1.0.0"), v("1.1.6"), v("1.1.6")]
        );
        assert_eq!(ws.module_instances()[0].configuration.get("region"), Some(&json!("eu-west-1")));
    }

    #[tokio::test]
    async fn test_upgrade_is_idempotent() {
        let (runner, invokers, store) = runner(upgrading(), &workspace(Some("0.12.21"))).await;

        let ws = runner.update(ID, Params::new(), &CancellationToken::new()).await.expect("first update");
        let mut record = store.get(ID).await.expect("stored");
        record.workspace = ws.to_bytes().expect("serializable");
        store.store(&record).await.expect("stored");

        runner.update(ID, Params::new(), &CancellationToken::new()).await.expect("second update");

        assert_eq!(
            invokers.versions_for(TerraformCommand::Apply).await,
            vec![v("1.0.0"), v("1.1.6"), v("1.1.6"), v("1.1.6")]
        );
    }

    #[tokio::test]
    async fn test_disabled_upgrade_fails_without_apply() {
        let (runner, invokers, _) =
            runner(UpgradeSettings::disabled(v("1.1.6")), &workspace(Some("0.12.21"))).await;

        let update = runner.update(ID, Params::new(), &CancellationToken::new()).await.expect_err("mismatch");
        assert!(matches!(update.error, BrokerError::Job(JobError::VersionMismatch { .. })));
        assert!(update.workspace.is_some());

        let destroy = runner.destroy(ID, Params::new(), &CancellationToken::new()).await.expect_err("mismatch");
        assert!(matches!(destroy.error, BrokerError::Job(JobError::VersionMismatch { .. })));

        assert!(invokers.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_step_returns_partial_workspace() {
        let (runner, invokers, _) = runner(upgrading(), &workspace(Some("0.12.21"))).await;
        invokers
            .fail_on(TerraformCommand::Apply, Some(v("1.1.6")), "state too new")
            .await;

        let failure = runner.update(ID, Params::new(), &CancellationToken::new()).await.expect_err("step fails");

        let ws = failure.workspace.expect("partially upgraded");
        assert_eq!(ws.state_version().expect("has state"), v("1.0.0"));
        assert_eq!(failure.error.to_string(), "terraform apply failed (version 1.1.6): state too new");
    }

    #[tokio::test]
    async fn test_enabled_without_path_fails() {
        let (runner, invokers, _) = runner(
            UpgradeSettings::enabled(v("1.1.6"), Vec::new()),
            &workspace(Some("0.12.21")),
        )
        .await;

        let failure = runner.update(ID, Params::new(), &CancellationToken::new()).await.expect_err("no path");
        assert_eq!(failure.error.to_string(), "terraform version mismatch and no upgrade path specified");
        assert!(invokers.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_destroy_limits_configuration_to_inputs() {
        let (runner, invokers, _) = runner(upgrading(), &workspace(Some("1.1.6"))).await;

        let mut vars = Params::new();
        vars.insert(String::from("name"), json!("db-2"));
        vars.insert(String::from("extra"), json!(1));
        let ws = runner.destroy(ID, vars, &CancellationToken::new()).await.expect("destroy succeeds");

        let config = &ws.module_instances()[0].configuration;
        assert_eq!(config.len(), 2);
        assert_eq!(config.get("name"), Some(&json!("db-2")));
        assert_eq!(config.get("region"), Some(&Value::Null));
        assert_eq!(invokers.versions_for(TerraformCommand::Destroy).await, vec![v("1.1.6")]);
    }

    #[tokio::test]
    async fn test_destroy_walks_upgrade_path_first() {
        let (runner, invokers, _) = runner(upgrading(), &workspace(Some("0.12.21"))).await;

        let ws = runner
            .destroy(ID, Params::new(), &CancellationToken::new())
            .await
            .expect("destroy succeeds");

        assert_eq!(
            invokers.versions_for(TerraformCommand::Apply).await,
            vec![v("1.0.0"), v("1.1.6")]
        );
        assert_eq!(invokers.versions_for(TerraformCommand::Destroy).await, vec![v("1.1.6")]);
        let commands: Vec<TerraformCommand> = invokers.calls().await.into_iter().map(|c| c.command).collect();
        assert_eq!(commands.last(), Some(&TerraformCommand::Destroy));
        assert_eq!(ws.state_version().expect("has state"), v("1.1.6"));
    }

    #[tokio::test]
    async fn test_cancel_mid_walk_keeps_reached_version() {
        let (runner, invokers, _) = runner(upgrading(), &workspace(Some("0.12.21"))).await;
        invokers.slow_down(v("1.1.6"), Duration::from_secs(30)).await;
        let cancel = CancellationToken::new();

        let cancel_during_second_step = async {
            while invokers.versions_for(TerraformCommand::Apply).await.len() < 2 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            cancel.cancel();
        };
        let (result, ()) = tokio::join!(
            runner.update(ID, Params::new(), &cancel),
            cancel_during_second_step
        );

        let failure = result.expect_err("cancelled");
        assert!(matches!(failure.error, BrokerError::Job(JobError::Cancelled)));
        let ws = failure.workspace.expect("partially upgraded");
        assert_eq!(ws.state_version().expect("has state"), v("1.0.0"));
        assert_eq!(
            invokers.versions_for(TerraformCommand::Apply).await,
            vec![v("1.0.0"), v("1.1.6")]
        );
    }

    #[tokio::test]
    async fn test_cancel_before_start_runs_nothing() {
        let (runner, invokers, _) = runner(upgrading(), &workspace(Some("0.12.21"))).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let failure = runner
            .import(ID, &resources(), &cancel)
            .await
            .expect_err("cancelled");

        assert!(matches!(failure.error, BrokerError::Job(JobError::Cancelled)));
        let ws = failure.workspace.expect("loaded");
        assert_eq!(ws.state_version().expect("has state"), v("0.12.21"));
        assert!(invokers.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_record_is_preflight_failure() {
        let (runner, _, _) = runner(upgrading(), &workspace(None)).await;

        let failure = runner.create("tf:missing:", &CancellationToken::new()).await.expect_err("no record");
        assert!(matches!(failure.error, BrokerError::State(StateError::NotFound { .. })));
        assert!(failure.workspace.is_none());
    }

    #[tokio::test]
    async fn test_undecodable_workspace_is_preflight_failure() {
        let store = InMemoryDeploymentStore::new();
        store
            .store(&DeploymentRecord::new(ID, b"garbage".to_vec()))
            .await
            .expect("stored");
        let runner = JobRunner::new(
            Arc::new(store),
            Arc::new(RecordingInvokerBuilder::new()),
            upgrading(),
        );

        let failure = runner.update(ID, Params::new(), &CancellationToken::new()).await.expect_err("bad bytes");
        assert!(matches!(failure.error, BrokerError::Workspace(WorkspaceError::Deserialize { .. })));
        assert!(failure.workspace.is_none());
    }

    fn importable() -> TerraformWorkspace {
        let mut ws = workspace(None);
        ws.transform = TfTransformer {
            parameter_mappings: vec![ParameterMapping {
                tf_variable: String::from("aws_s3_bucket.bucket.bucket"),
                parameter_name: String::from("name"),
            }],
            ..TfTransformer::default()
        };
        ws
    }

    fn resources() -> Vec<ImportResource> {
        vec![ImportResource {
            tf_resource: String::from("aws_s3_bucket.bucket"),
            iaas_resource: String::from("csb-bucket"),
        }]
    }

    #[tokio::test]
    async fn test_import_rewrites_definition_and_applies() {
        let (runner, invokers, _) = runner(upgrading(), &importable()).await;
        invokers
            .set_show_output("# aws_s3_bucket.bucket:\nresource \"aws_s3_bucket\" \"bucket\" {\n    bucket = \"csb-bucket\"\n    id = \"csb-bucket\"\n}")
            .await;
        invokers.set_plan_output("No changes.").await;

        let ws = runner.import(ID, &resources(), &CancellationToken::new()).await.expect("import succeeds");

        let main = ws.modules[0].definitions.get("main").expect("main definition");
        assert!(main.contains("bucket = var.name"));
        assert!(!main.contains("id ="));
        assert_eq!(ws.module_instances()[0].configuration.get("name"), Some(&json!("csb-bucket")));

        let commands: Vec<TerraformCommand> = invokers.calls().await.into_iter().map(|c| c.command).collect();
        assert_eq!(
            commands,
            vec![
                TerraformCommand::Import,
                TerraformCommand::Show,
                TerraformCommand::Plan,
                TerraformCommand::Apply
            ]
        );
    }

    #[tokio::test]
    async fn test_import_blocked_when_plan_deletes() {
        let (runner, invokers, _) = runner(upgrading(), &importable()).await;
        invokers
            .set_show_output("resource \"aws_s3_bucket\" \"bucket\" {\n    bucket = \"csb-bucket\"\n}")
            .await;
        invokers
            .set_plan_output("  # aws_s3_bucket.logs will be destroyed\nPlan: 0 to add, 0 to change, 1 to destroy.")
            .await;

        let failure = runner.import(ID, &resources(), &CancellationToken::new()).await.expect_err("deletion blocked");

        assert!(matches!(
            failure.error,
            BrokerError::Job(JobError::ResourceDeletionBlocked { ref addresses }) if addresses == &[String::from("aws_s3_bucket.logs")]
        ));
        assert!(invokers.versions_for(TerraformCommand::Apply).await.is_empty());
    }

    #[tokio::test]
    async fn test_outputs_and_show() {
        let mut ws = workspace(None);
        let mut outputs = Params::new();
        outputs.insert(String::from("status"), json!("ready"));
        ws.set_state(state_document(&v("1.1.6"), &outputs));
        let (runner, invokers, _) = runner(upgrading(), &ws).await;
        invokers.set_show_output("resource \"x\" \"y\" {}").await;

        let values = runner.outputs(ID, "instance").await.expect("outputs");
        assert_eq!(values.get("status"), Some(&json!("ready")));
        assert!(runner.outputs(ID, "nope").await.is_err());

        assert_eq!(runner.show(ID).await.expect("show"), "resource \"x\" \"y\" {}");
    }
}

//! End-to-end job lifecycle against the in-memory store.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use semver::Version;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use tfbroker::Params;
use tfbroker::dispatcher::{BindingUpgrade, JobDispatcher};
use tfbroker::invoker::{RecordingInvokerBuilder, TerraformCommand};
use tfbroker::last_operation::LastOperationStore;
use tfbroker::runner::{JobRunner, UpgradeSettings};
use tfbroker::state::{
    DeploymentRecord, DeploymentStore, InMemoryDeploymentStore, LastOperationState, LastOperationType,
    deployment_id, instance_deployment_id,
};
use tfbroker::workspace::{ModuleDefinition, TerraformWorkspace, Workspace, state_document};

fn v(version: &str) -> Version {
    Version::parse(version).expect("valid version")
}

fn params(value: serde_json::Value) -> Params {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

fn workspace_record(id: &str, state_version: Option<&str>) -> DeploymentRecord {
    let mut definitions = BTreeMap::new();
    definitions.insert(
        String::from("main"),
        String::from("variable \"size\" { type = number }\nvariable \"name\" { type = string }\n"),
    );
    let mut ws = TerraformWorkspace::new(
        ModuleDefinition {
            name: String::from("brokertemplate"),
            definitions,
        },
        "instance",
        params(json!({ "size": 1, "name": "db" })),
    );
    if let Some(version) = state_version {
        ws.set_state(state_document(&v(version), &Params::new()));
    }
    DeploymentRecord::new(id, ws.to_bytes().expect("serializable"))
}

async fn setup(
    settings: UpgradeSettings,
    records: &[DeploymentRecord],
) -> (JobDispatcher, RecordingInvokerBuilder, InMemoryDeploymentStore) {
    let store = InMemoryDeploymentStore::new();
    for record in records {
        store.store(record).await.expect("stored");
    }

    let invokers = RecordingInvokerBuilder::new();
    invokers.set_outputs(params(json!({ "status": "all good" }))).await;

    let runner = JobRunner::new(Arc::new(store.clone()), Arc::new(invokers.clone()), settings);
    let last_operation =
        LastOperationStore::new(Arc::new(store.clone())).with_poll_interval(Duration::from_millis(5));

    (JobDispatcher::new(runner, last_operation), invokers, store)
}

fn upgrading() -> UpgradeSettings {
    UpgradeSettings::enabled(v("1.1.6"), vec![v("1.0.0"), v("1.1.6")])
}

#[tokio::test]
async fn test_upgrade_instance_walks_instance_then_bindings() {
    let instance = instance_deployment_id("inst");
    let binding = deployment_id("inst", "bind");
    let (dispatcher, invokers, store) = setup(
        upgrading(),
        &[
            workspace_record(&instance, Some("0.12.21")),
            workspace_record(&binding, Some("0.12.21")),
        ],
    )
    .await;

    dispatcher
        .upgrade_instance(
            "inst",
            params(json!({ "size": 2 })),
            vec![BindingUpgrade {
                binding_id: String::from("bind"),
                vars: Params::new(),
            }],
        )
        .await
        .expect("upgrade succeeds");

    assert_eq!(
        invokers.versions_for(TerraformCommand::Apply).await,
        vec![v("1.0.0"), v("1.1.6"), v("1.1.6"), v("1.0.0"), v("1.1.6"), v("1.1.6")]
    );

    for id in [&instance, &binding] {
        let record = store.get(id).await.expect("record exists");
        assert_eq!(record.last_operation_type, LastOperationType::Update);
        assert_eq!(record.last_operation_state, LastOperationState::Succeeded);
        assert_eq!(record.last_operation_message, "all good");

        let ws = TerraformWorkspace::from_bytes(&record.workspace).expect("decodable");
        assert_eq!(ws.state_version().expect("applied"), v("1.1.6"));
    }

    let ws = TerraformWorkspace::from_bytes(&store.get(&instance).await.expect("record").workspace)
        .expect("decodable");
    assert_eq!(ws.instances[0].configuration["size"], 2);
    assert_eq!(ws.instances[0].configuration["name"], "db");
}

#[tokio::test]
async fn test_upgrade_instance_stops_at_first_failure() {
    let instance = instance_deployment_id("inst");
    let first = deployment_id("inst", "first");
    let (dispatcher, invokers, store) = setup(
        upgrading(),
        &[
            workspace_record(&instance, Some("0.12.21")),
            workspace_record(&first, Some("0.12.21")),
        ],
    )
    .await;

    let bindings = ["first", "missing", "never"]
        .into_iter()
        .map(|binding_id| BindingUpgrade {
            binding_id: binding_id.to_string(),
            vars: Params::new(),
        })
        .collect();

    let err = dispatcher
        .upgrade_instance("inst", Params::new(), bindings)
        .await
        .expect_err("missing binding");
    assert!(err.is_not_found());

    assert_eq!(invokers.versions_for(TerraformCommand::Apply).await.len(), 6);
    assert!(!store.exists(&deployment_id("inst", "never")).await.expect("exists check"));
    let record = store.get(&first).await.expect("record exists");
    assert_eq!(record.last_operation_state, LastOperationState::Succeeded);
}

#[tokio::test]
async fn test_upgrade_failure_is_recorded_and_stops_bindings() {
    let instance = instance_deployment_id("inst");
    let binding = deployment_id("inst", "bind");
    let (dispatcher, invokers, store) = setup(
        upgrading(),
        &[
            workspace_record(&instance, Some("0.12.21")),
            workspace_record(&binding, Some("0.12.21")),
        ],
    )
    .await;
    invokers
        .fail_on(TerraformCommand::Apply, Some(v("1.0.0")), "state too old")
        .await;

    let err = dispatcher
        .upgrade_instance(
            "inst",
            Params::new(),
            vec![BindingUpgrade {
                binding_id: String::from("bind"),
                vars: Params::new(),
            }],
        )
        .await
        .expect_err("first step fails");
    assert!(err.to_string().contains("state too old"));

    let record = store.get(&instance).await.expect("record exists");
    assert_eq!(record.last_operation_state, LastOperationState::Failed);
    assert!(record.last_operation_message.contains("state too old"));

    let untouched = store.get(&binding).await.expect("record exists");
    assert_eq!(untouched.last_operation_type, LastOperationType::Provision);
    assert_eq!(untouched.last_operation_state, LastOperationState::Succeeded);
}

#[tokio::test]
async fn test_provision_wait_then_deprovision() {
    let id = instance_deployment_id("inst");
    let (dispatcher, invokers, store) = setup(
        UpgradeSettings::disabled(v("1.1.6")),
        &[workspace_record(&id, None)],
    )
    .await;

    let handle = dispatcher.provision(&id).await.expect("dispatched");
    assert_eq!(handle.deployment_id(), id);

    let last_operation = dispatcher.last_operation();
    last_operation
        .wait(&CancellationToken::new(), &id)
        .await
        .expect("wait completes");
    handle.join().await.expect("job succeeded");

    let status = last_operation.status(&id).await.expect("status");
    assert!(status.is_done);
    assert!(status.error.is_none());
    assert_eq!(status.message, "all good");

    dispatcher
        .deprovision(&id, params(json!({ "size": 2, "unrelated": true })))
        .await
        .expect("dispatched")
        .join()
        .await
        .expect("destroy succeeded");

    assert_eq!(invokers.versions_for(TerraformCommand::Apply).await, vec![v("1.1.6")]);
    assert_eq!(invokers.versions_for(TerraformCommand::Destroy).await, vec![v("1.1.6")]);

    let record = store.get(&id).await.expect("record exists");
    assert_eq!(record.last_operation_type, LastOperationType::Deprovision);
    assert_eq!(record.last_operation_state, LastOperationState::Succeeded);

    let ws = TerraformWorkspace::from_bytes(&record.workspace).expect("decodable");
    let config = &ws.module_instances()[0].configuration;
    assert_eq!(config["size"], 2);
    assert!(config["name"].is_null());
    assert!(!config.contains_key("unrelated"));
}

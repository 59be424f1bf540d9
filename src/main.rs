//! tfbroker CLI entrypoint.
//!
//! This is the main entrypoint for the tfbroker operator tool.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tfbroker::catalog::{ServiceCatalog, UpdateDetails};
use tfbroker::cli::{Cli, Commands, LogFormat, OutputFormatter, WorkspaceSummary};
use tfbroker::config::{BrokerConfig, ConfigParser, ConfigValidator, StateBackend, find_config_file};
use tfbroker::decider::decide_operation;
use tfbroker::error::{BrokerError, ConfigError, Result};
use tfbroker::last_operation::LastOperationStore;
use tfbroker::state::{
    DeploymentStore, InMemoryDeploymentStore, LocalDeploymentStore, S3DeploymentStore, STATE_DIR,
};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.log_format);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool, format: LogFormat) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Validate { warnings } => cmd_validate(cli.config.as_ref(), warnings, &formatter),
        Commands::Decide { catalog, request } => cmd_decide(&catalog, &request, &formatter),
        Commands::Status { id } => cmd_status(cli.config.as_ref(), &id, &formatter).await,
        Commands::Wait { id, timeout_secs } => {
            cmd_wait(cli.config.as_ref(), &id, timeout_secs, &formatter).await
        }
        Commands::Show { id } => cmd_show(cli.config.as_ref(), &id, &formatter).await,
        Commands::Ids => cmd_ids(cli.config.as_ref(), &formatter).await,
    }
}

/// Validate configuration.
fn cmd_validate(
    config_path: Option<&PathBuf>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config_file = resolve_config_path(config_path)?;
    info!("Validating configuration: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(config_dir(&config_file));
    parser.load_dotenv()?;
    let config = parser.load_with_env(&config_file)?;

    let result = ConfigValidator::new().check(&config);
    println!("{}", formatter.format_validation(&config, &result, show_warnings));

    if let Some(first_error) = result.errors.first() {
        return Err(ConfigError::validation(
            format!("{} error(s), first: {}", result.error_count(), first_error.message),
            first_error.field.clone(),
        )
        .into());
    }

    Ok(())
}

/// Classify an update request against the catalog.
fn cmd_decide(catalog_path: &Path, request_path: &Path, formatter: &OutputFormatter) -> Result<()> {
    let catalog: ServiceCatalog = read_document(catalog_path)?;
    let details: UpdateDetails = read_document(request_path)?;
    debug!(
        "Classifying update of service {} to plan {}",
        details.service_id, details.plan_id
    );

    let service = catalog.service_by_id(&details.service_id).ok_or_else(|| {
        BrokerError::internal(format!("service {} is not in the catalog", details.service_id))
    })?;

    let decision = decide_operation(service, &details);
    println!("{}", formatter.format_decision(&decision));

    decision.map(|_| ()).map_err(Into::into)
}

/// Show the last operation of a deployment.
async fn cmd_status(config_path: Option<&PathBuf>, id: &str, formatter: &OutputFormatter) -> Result<()> {
    let (_config, last_operation) = load_last_operation_store(config_path).await?;

    let status = last_operation.status(id).await?;
    println!("{}", formatter.format_status(id, &status));
    Ok(())
}

/// Block until the last operation of a deployment is done.
async fn cmd_wait(
    config_path: Option<&PathBuf>,
    id: &str,
    timeout_secs: Option<u64>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (_config, last_operation) = load_last_operation_store(config_path).await?;
    let cancel = CancellationToken::new();

    if let Some(secs) = timeout_secs {
        let timeout = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            timeout.cancel();
        });
    }

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    info!("Waiting for the last operation of {id}");
    let waited = last_operation.wait(&cancel, id).await;

    let status = last_operation.status(id).await?;
    if !status.is_done {
        warn!("Stopped waiting for {id} before its operation finished");
    }
    println!("{}", formatter.format_status(id, &status));
    waited
}

/// Show the workspace stored for a deployment.
async fn cmd_show(config_path: Option<&PathBuf>, id: &str, formatter: &OutputFormatter) -> Result<()> {
    let (_config, last_operation) = load_last_operation_store(config_path).await?;

    let record = last_operation.deployments().get(id).await?;
    let summary = WorkspaceSummary::from_record(&record)?;
    println!("{}", formatter.format_workspace(&summary));
    Ok(())
}

/// List every stored deployment.
async fn cmd_ids(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let (_config, last_operation) = load_last_operation_store(config_path).await?;
    let store = last_operation.deployments();

    let mut records = Vec::new();
    for id in store.list_ids().await? {
        match store.get(&id).await {
            Ok(record) => records.push(record),
            Err(e) if e.is_not_found() => debug!("Deployment {id} disappeared while listing"),
            Err(e) => return Err(e),
        }
    }

    println!("{}", formatter.format_records(&records));
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Directory holding the configuration file.
fn config_dir(config_file: &Path) -> &Path {
    config_file.parent().unwrap_or_else(|| Path::new("."))
}

/// Reads a YAML or JSON document.
fn read_document<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&content).map_err(|e| {
        ConfigError::ParseError {
            message: e.to_string(),
            location: Some(path.display().to_string()),
        }
        .into()
    })
}

/// Loads configuration and creates the deployment store it names.
async fn load_last_operation_store(
    config_path: Option<&PathBuf>,
) -> Result<(BrokerConfig, LastOperationStore)> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading configuration from: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(config_dir(&config_file));
    parser.load_dotenv()?;

    let config = parser.load_with_env(&config_file)?;

    // Validate
    let validator = ConfigValidator::new();
    validator.validate(&config)?;

    let store: Arc<dyn DeploymentStore> = match config.state.backend {
        StateBackend::Local => {
            let path = config.state.path.as_ref().map_or_else(
                || config_dir(&config_file).join(STATE_DIR),
                PathBuf::from,
            );
            Arc::new(LocalDeploymentStore::with_base_dir(path))
        }
        StateBackend::S3 => {
            let bucket = config
                .state
                .bucket
                .as_deref()
                .ok_or_else(|| BrokerError::internal("S3 bucket not configured"))?;
            let prefix = config.state.prefix.as_deref();
            let region = config.state.region.as_deref();
            Arc::new(S3DeploymentStore::new(bucket, prefix, region).await?)
        }
        StateBackend::Memory => Arc::new(InMemoryDeploymentStore::new()),
    };
    debug!("Using {} deployment store", store.backend_type());

    let last_operation =
        LastOperationStore::new(store).with_poll_interval(config.jobs.poll_interval());
    Ok((config, last_operation))
}

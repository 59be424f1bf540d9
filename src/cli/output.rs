//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::catalog::Params;
use crate::config::{BrokerConfig, ValidationResult};
use crate::decider::Operation;
use crate::error::{DecisionError, Result};
use crate::last_operation::OperationStatus;
use crate::state::{DeploymentRecord, LastOperationState, LastOperationType};
use crate::workspace::{TerraformWorkspace, Workspace};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Deployment row for table display.
#[derive(Tabled)]
struct DeploymentRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Operation")]
    operation: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Updated")]
    updated: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Output row for table display.
#[derive(Tabled)]
struct OutputRow {
    #[tabled(rename = "Output")]
    name: String,
    #[tabled(rename = "Value")]
    value: String,
}

/// Decoded view of a stored workspace.
#[derive(Debug, Serialize)]
pub struct WorkspaceSummary {
    /// Deployment id.
    pub id: String,
    /// Kind of the last operation.
    pub last_operation_type: LastOperationType,
    /// Outcome of the last operation.
    pub last_operation_state: LastOperationState,
    /// Message recorded with the outcome.
    pub last_operation_message: String,
    /// Module names.
    pub modules: Vec<String>,
    /// Module instance names.
    pub instances: Vec<String>,
    /// Version that last wrote the state, if the workspace was applied.
    pub state_version: Option<String>,
    /// Outputs of the first instance.
    pub outputs: Params,
}

impl WorkspaceSummary {
    /// Decodes the workspace stored in a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record does not hold a workspace document.
    pub fn from_record(record: &DeploymentRecord) -> Result<Self> {
        let workspace = TerraformWorkspace::from_bytes(&record.workspace)?;
        let outputs = workspace
            .instance_names()
            .first()
            .map(|name| workspace.outputs(name).unwrap_or_default())
            .unwrap_or_default();

        Ok(Self {
            id: record.id.clone(),
            last_operation_type: record.last_operation_type,
            last_operation_state: record.last_operation_state,
            last_operation_message: record.last_operation_message.clone(),
            modules: workspace.modules.iter().map(|m| m.name.clone()).collect(),
            instances: workspace.instance_names().iter().map(ToString::to_string).collect(),
            state_version: workspace.state_version().ok().map(|v| v.to_string()),
            outputs,
        })
    }
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a validation result with a configuration summary.
    #[must_use]
    pub fn format_validation(
        &self,
        config: &BrokerConfig,
        result: &ValidationResult,
        show_warnings: bool,
    ) -> String {
        let default_version = config
            .terraform
            .default_version()
            .map_or_else(|_| String::from("unresolved"), |v| v.to_string());

        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "valid": result.is_valid(),
                    "errors": result.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "warnings": result.warnings,
                    "default_version": default_version,
                    "upgrades_enabled": config.terraform.upgrades_enabled,
                    "upgrade_path": config.terraform.upgrade_path.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "backend": format!("{:?}", config.state.backend).to_lowercase(),
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = String::new();

                if result.is_valid() {
                    let _ = writeln!(output, "{} Configuration is valid!", "✓".green());
                } else {
                    let _ = writeln!(output, "{} Configuration is invalid:", "✗".red());
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                }

                if show_warnings && !result.warnings.is_empty() {
                    let _ = writeln!(output, "\n{} Warnings:", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }

                let path = if config.terraform.upgrade_path.is_empty() {
                    String::from("none")
                } else {
                    config
                        .terraform
                        .upgrade_path
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(" -> ")
                };

                output.push_str("\nConfiguration summary:\n");
                let _ = writeln!(output, "   Versions: {}", config.terraform.versions.len());
                let _ = writeln!(output, "   Default version: {default_version}");
                let _ = writeln!(output, "   Upgrades enabled: {}", config.terraform.upgrades_enabled);
                let _ = writeln!(output, "   Upgrade path: {path}");
                let _ = writeln!(output, "   State backend: {:?}", config.state.backend);
                output
            }
        }
    }

    /// Formats the classification of an update request.
    #[must_use]
    pub fn format_decision(&self, decision: &std::result::Result<Operation, DecisionError>) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = match decision {
                    Ok(operation) => serde_json::json!({ "operation": operation.to_string() }),
                    Err(e) => serde_json::json!({
                        "operation": "failed",
                        "status": e.http_status(),
                        "error": e.error_key(),
                        "description": e.to_string(),
                    }),
                };
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => match decision {
                Ok(Operation::Update) => format!("{} update\n", "→".green()),
                Ok(Operation::Upgrade) => format!("{} upgrade\n", "↑".yellow()),
                Err(e) => {
                    let key = e.error_key().map(|k| format!(" [{k}]")).unwrap_or_default();
                    format!("{} failed ({}){key}: {e}\n", "✗".red(), e.http_status())
                }
            },
        }
    }

    /// Formats the answer to a status poll.
    #[must_use]
    pub fn format_status(&self, id: &str, status: &OperationStatus) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "id": id,
                    "done": status.is_done,
                    "message": status.message,
                    "error": status.error.as_ref().map(ToString::to_string),
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let state = match (&status.error, status.is_done) {
                    (Some(_), _) => "failed".red().to_string(),
                    (None, true) => "succeeded".green().to_string(),
                    (None, false) => "in progress".yellow().to_string(),
                };
                let mut output = format!("{id}: {state}\n");
                if !status.message.is_empty() {
                    let _ = writeln!(output, "   {}", status.message);
                }
                output
            }
        }
    }

    /// Formats a list of deployment records.
    #[must_use]
    pub fn format_records(&self, records: &[DeploymentRecord]) -> String {
        match self.format {
            OutputFormat::Json => {
                let json: Vec<_> = records
                    .iter()
                    .map(|r| {
                        serde_json::json!({
                            "id": r.id,
                            "last_operation_type": r.last_operation_type,
                            "last_operation_state": r.last_operation_state,
                            "last_operation_message": r.last_operation_message,
                            "updated_at": r.updated_at,
                        })
                    })
                    .collect();
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                if records.is_empty() {
                    return String::from("No deployments found.\n");
                }

                let rows: Vec<DeploymentRow> = records
                    .iter()
                    .map(|r| DeploymentRow {
                        id: r.id.clone(),
                        operation: r.last_operation_type.to_string(),
                        state: Self::format_state(r.last_operation_state),
                        updated: r.updated_at.format("%Y-%m-%d %H:%M").to_string(),
                        message: Self::truncate(&r.last_operation_message, 40),
                    })
                    .collect();

                let mut output = Table::new(rows).to_string();
                let _ = write!(output, "\n\n{} deployment(s)\n", records.len());
                output
            }
        }
    }

    /// Formats a decoded workspace.
    #[must_use]
    pub fn format_workspace(&self, summary: &WorkspaceSummary) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(summary).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();
                let _ = write!(output, "\nWorkspace: {}\n\n", summary.id);
                let _ = writeln!(
                    output,
                    "   Last operation: {} {}",
                    summary.last_operation_type,
                    Self::format_state(summary.last_operation_state)
                );
                if !summary.last_operation_message.is_empty() {
                    let _ = writeln!(output, "   Message: {}", summary.last_operation_message);
                }
                let _ = writeln!(output, "   Modules: {}", summary.modules.join(", "));
                let _ = writeln!(output, "   Instances: {}", summary.instances.join(", "));
                let _ = writeln!(
                    output,
                    "   State version: {}",
                    summary.state_version.as_deref().unwrap_or("never applied")
                );

                if !summary.outputs.is_empty() {
                    let rows: Vec<OutputRow> = summary
                        .outputs
                        .iter()
                        .map(|(name, value)| OutputRow {
                            name: name.clone(),
                            value: Self::truncate(&value.to_string(), 60),
                        })
                        .collect();
                    output.push('\n');
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }

                output
            }
        }
    }

    /// Formats a last operation state with color.
    fn format_state(state: LastOperationState) -> String {
        match state {
            LastOperationState::Succeeded => state.as_str().green().to_string(),
            LastOperationState::InProgress => state.as_str().yellow().to_string(),
            LastOperationState::Failed => state.as_str().red().to_string(),
            LastOperationState::Unknown => state.as_str().dimmed().to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BrokerError, JobError};
    use crate::workspace::{ModuleDefinition, state_document};
    use semver::Version;
    use serde_json::json;

    fn workspace_record() -> DeploymentRecord {
        let mut ws = TerraformWorkspace::new(
            ModuleDefinition {
                name: String::from("brokertemplate"),
                definitions: std::iter::once((String::from("main"), String::from("variable \"size\" {}")))
                    .collect(),
            },
            "instance",
            Params::new(),
        );
        let outputs = json!({ "status": "created", "port": 5432 });
        let serde_json::Value::Object(outputs) = outputs else {
            unreachable!("object literal");
        };
        ws.set_state(state_document(&Version::new(1, 1, 6), &outputs));
        DeploymentRecord::new("tf:inst:", serde_json::to_vec(&ws).expect("serializable"))
    }

    #[test]
    fn test_workspace_summary() {
        let summary = WorkspaceSummary::from_record(&workspace_record()).expect("decodable");
        assert_eq!(summary.modules, vec!["brokertemplate"]);
        assert_eq!(summary.instances, vec!["instance"]);
        assert_eq!(summary.state_version.as_deref(), Some("1.1.6"));
        assert_eq!(summary.outputs["status"], "created");
        assert_eq!(summary.last_operation_type, LastOperationType::Provision);

        let text = OutputFormatter::new(OutputFormat::Text).format_workspace(&summary);
        assert!(text.contains("State version: 1.1.6"));
    }

    #[test]
    fn test_workspace_summary_rejects_garbage() {
        let record = DeploymentRecord::new("tf:inst:", b"not json".to_vec());
        assert!(WorkspaceSummary::from_record(&record).is_err());
    }

    #[test]
    fn test_format_decision_json() {
        let formatter = OutputFormatter::new(OutputFormat::Json);

        let out = formatter.format_decision(&Ok(Operation::Upgrade));
        let value: serde_json::Value = serde_json::from_str(&out).expect("json");
        assert_eq!(value["operation"], "upgrade");

        let out = formatter.format_decision(&Err(DecisionError::InstanceMustBeUpgradedFirst));
        let value: serde_json::Value = serde_json::from_str(&out).expect("json");
        assert_eq!(value["status"], 422);
        assert_eq!(value["error"], "previous-maintenance-info-check");
    }

    #[test]
    fn test_format_status_json() {
        let status = OperationStatus {
            is_done: true,
            message: String::from("boom"),
            error: Some(BrokerError::Job(JobError::OperationFailed {
                message: String::from("boom"),
            })),
        };
        let out = OutputFormatter::new(OutputFormat::Json).format_status("tf:a:", &status);
        let value: serde_json::Value = serde_json::from_str(&out).expect("json");
        assert_eq!(value["done"], true);
        assert_eq!(value["message"], "boom");
        assert!(value["error"].is_string());
    }

    #[test]
    fn test_format_records_empty() {
        let out = OutputFormatter::new(OutputFormat::Text).format_records(&[]);
        assert_eq!(out, "No deployments found.\n");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(OutputFormatter::truncate("short", 10), "short");
        assert_eq!(OutputFormatter::truncate("a much longer message", 10), "a much ...");
    }
}

//! Read-only view of the tool's JSON state embedded in a workspace.

use semver::Version;
use serde::Deserialize;
use serde_json::Value;

use crate::catalog::Params;
use crate::error::{Result, WorkspaceError};

/// The parts of a terraform state file the broker reads.
#[derive(Debug, Clone, Deserialize)]
pub struct TfState {
    /// Tool version that last wrote the state.
    pub terraform_version: String,
    /// Root module outputs.
    #[serde(default)]
    pub outputs: serde_json::Map<String, Value>,
}

impl TfState {
    /// Parses a state document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is empty or not a terraform state.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(WorkspaceError::NoState.into());
        }

        serde_json::from_slice(bytes)
            .map_err(|e| WorkspaceError::invalid_state(format!("failed to parse state: {e}")).into())
    }

    /// Returns the tool version as a semantic version.
    ///
    /// # Errors
    ///
    /// Returns an error if the recorded version is not a semantic version.
    pub fn version(&self) -> Result<Version> {
        Version::parse(&self.terraform_version).map_err(|e| {
            WorkspaceError::invalid_state(format!(
                "invalid terraform_version {:?}: {e}",
                self.terraform_version
            ))
            .into()
        })
    }

    /// Returns the output values keyed by output name.
    #[must_use]
    pub fn output_values(&self) -> Params {
        self.outputs
            .iter()
            .map(|(name, output)| {
                let value = output.get("value").cloned().unwrap_or(Value::Null);
                (name.clone(), value)
            })
            .collect()
    }
}

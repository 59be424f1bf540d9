//! Concrete workspace document.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::Params;
use crate::error::{Result, WorkspaceError};
use crate::pattern;

use super::tfstate::TfState;
use super::transformer::TfTransformer;
use super::Workspace;

static VARIABLE_DECLARATION: LazyLock<Regex> =
    LazyLock::new(|| pattern::fixed(r#"(?m)^\s*variable\s+"([^"]+)""#));

/// Name of the definition rewritten by an import.
pub const MAIN_DEFINITION: &str = "main";

/// A module and its definition files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModuleDefinition {
    /// Module name.
    pub name: String,
    /// Definition contents keyed by file stem.
    #[serde(default)]
    pub definitions: BTreeMap<String, String>,
}

/// An instantiation of a module with its variable values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleInstance {
    /// Name of the instantiated module.
    pub module_name: String,
    /// Instance name, also used to look up outputs.
    pub instance_name: String,
    /// Variable values passed to the module.
    #[serde(default)]
    pub configuration: Params,
}

/// Serializable workspace: module definitions, instances, and embedded state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TerraformWorkspace {
    /// Module definitions.
    pub modules: Vec<ModuleDefinition>,
    /// Module instances.
    pub instances: Vec<ModuleInstance>,
    /// Pipeline applied to definitions generated by an import.
    #[serde(default)]
    pub transform: TfTransformer,
    /// Raw tool state; empty until the first apply.
    #[serde(default, with = "crate::codec::base64_bytes")]
    pub tfstate: Vec<u8>,
}

impl TerraformWorkspace {
    /// Creates a workspace with a single module and one instance of it.
    #[must_use]
    pub fn new(module: ModuleDefinition, instance_name: impl Into<String>, configuration: Params) -> Self {
        let instance = ModuleInstance {
            module_name: module.name.clone(),
            instance_name: instance_name.into(),
            configuration,
        };

        Self {
            modules: vec![module],
            instances: vec![instance],
            transform: TfTransformer::default(),
            tfstate: Vec::new(),
        }
    }

    /// Decodes a stored workspace.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a workspace document.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| WorkspaceError::deserialize(e.to_string()).into())
    }

    /// Returns true if the workspace has been applied at least once.
    #[must_use]
    pub fn has_state(&self) -> bool {
        !self.tfstate.is_empty()
    }

    /// Replaces the embedded tool state.
    pub fn set_state(&mut self, state: Vec<u8>) {
        self.tfstate = state;
    }

    /// Parses the embedded tool state.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no state or it cannot be parsed.
    pub fn tfstate(&self) -> Result<TfState> {
        TfState::parse(&self.tfstate)
    }

    /// Replaces the main definition of the first module.
    ///
    /// # Errors
    ///
    /// Returns an error if the workspace has no modules.
    pub fn set_main_definition(&mut self, definition: impl Into<String>) -> Result<()> {
        let module = self.modules.first_mut().ok_or(WorkspaceError::NoModules)?;
        module
            .definitions
            .insert(MAIN_DEFINITION.to_string(), definition.into());
        Ok(())
    }

    /// Names of the module instances.
    #[must_use]
    pub fn instance_names(&self) -> Vec<&str> {
        self.instances
            .iter()
            .map(|i| i.instance_name.as_str())
            .collect()
    }
}

impl Workspace for TerraformWorkspace {
    fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            WorkspaceError::Serialize {
                message: e.to_string(),
            }
            .into()
        })
    }

    fn outputs(&self, instance_name: &str) -> Result<Params> {
        if !self.instances.iter().any(|i| i.instance_name == instance_name) {
            return Err(WorkspaceError::InstanceNotFound {
                name: instance_name.to_string(),
            }
            .into());
        }

        Ok(self.tfstate()?.output_values())
    }

    fn module_instances(&self) -> &[ModuleInstance] {
        &self.instances
    }

    fn module_inputs(&self) -> Result<Vec<String>> {
        let module = self.modules.first().ok_or(WorkspaceError::NoModules)?;

        let mut inputs: Vec<String> = module
            .definitions
            .values()
            .flat_map(|definition| declared_variables(definition))
            .collect();
        inputs.sort();
        inputs.dedup();

        Ok(inputs)
    }

    fn state_version(&self) -> Result<Version> {
        self.tfstate()?.version()
    }

    fn update_instance_configuration(&mut self, vars: Params) -> Result<()> {
        let instance = self.instances.first_mut().ok_or(WorkspaceError::NoInstances)?;
        for (key, value) in vars {
            instance.configuration.insert(key, value);
        }
        Ok(())
    }
}

/// Returns the names declared by `variable "<name>"` blocks.
fn declared_variables(definition: &str) -> Vec<String> {
    VARIABLE_DECLARATION
        .captures_iter(definition)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Builds a minimal tool state document for the given version and outputs.
#[must_use]
pub fn state_document(version: &Version, outputs: &Params) -> Vec<u8> {
    let outputs: serde_json::Map<String, Value> = outputs
        .iter()
        .map(|(name, value)| (name.clone(), serde_json::json!({ "value": value })))
        .collect();

    serde_json::json!({
        "version": 4,
        "terraform_version": version.to_string(),
        "outputs": outputs,
    })
    .to_string()
    .into_bytes()
}

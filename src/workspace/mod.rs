//! Workspace documents.
//!
//! A workspace holds the module definitions, the per-instance configuration,
//! and the tool state written by the last command. Deployment records store it
//! serialized; every job decodes it, mutates it, and hands it back.

mod terraform;
mod tfstate;
mod transformer;

pub use terraform::{
    MAIN_DEFINITION, ModuleDefinition, ModuleInstance, TerraformWorkspace, state_document,
};
pub use tfstate::TfState;
pub use transformer::{ParameterMapping, TfTransformer};

use semver::Version;

use crate::catalog::Params;
use crate::error::Result;

/// Accessors the job runner and the last-operation store need from a workspace.
pub trait Workspace: Send + Sync {
    /// Serializes the workspace for storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be encoded.
    fn to_bytes(&self) -> Result<Vec<u8>>;

    /// Output values of the named module instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance is unknown or there is no state.
    fn outputs(&self, instance_name: &str) -> Result<Params>;

    /// Module instances in declaration order.
    fn module_instances(&self) -> &[ModuleInstance];

    /// Input names declared by the first module.
    ///
    /// # Errors
    ///
    /// Returns an error if the workspace has no modules.
    fn module_inputs(&self) -> Result<Vec<String>>;

    /// Tool version that last wrote the embedded state.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no state or its version is malformed.
    fn state_version(&self) -> Result<Version>;

    /// Merges variables into the first instance's configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the workspace has no instances.
    fn update_instance_configuration(&mut self, vars: Params) -> Result<()>;
}

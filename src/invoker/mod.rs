//! Versioned tool invocation.
//!
//! The broker never runs the tool binary itself. An [`InvokerBuilder`] hands
//! out a [`TerraformInvoker`] bound to one tool version; each command reads the
//! workspace and rewrites its embedded state in place.

mod plan_check;
mod recording;

pub use plan_check::check_plan_output;
pub use recording::{Invocation, RecordingInvoker, RecordingInvokerBuilder};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::workspace::TerraformWorkspace;

/// Maps a resource address to the identifier of an existing resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportResource {
    /// Resource address in the module, e.g. `aws_s3_bucket.bucket`.
    pub tf_resource: String,
    /// Identifier of the resource at the provider.
    pub iaas_resource: String,
}

/// Output of a dry-run plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanOutput {
    /// Human-readable plan as printed by the tool.
    pub stdout: String,
}

impl PlanOutput {
    /// Wraps plan text.
    #[must_use]
    pub fn new(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
        }
    }
}

/// Commands an invoker can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerraformCommand {
    /// `terraform apply`
    Apply,
    /// `terraform destroy`
    Destroy,
    /// `terraform import`
    Import,
    /// `terraform show`
    Show,
    /// `terraform plan`
    Plan,
}

impl fmt::Display for TerraformCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Apply => "apply",
            Self::Destroy => "destroy",
            Self::Import => "import",
            Self::Show => "show",
            Self::Plan => "plan",
        };
        f.write_str(name)
    }
}

/// Runs tool commands at a fixed version.
#[async_trait]
pub trait TerraformInvoker: Send + Sync {
    /// Version this invoker runs.
    fn version(&self) -> &Version;

    /// Applies the workspace.
    async fn apply(&self, workspace: &mut TerraformWorkspace) -> Result<()>;

    /// Destroys every resource in the workspace.
    async fn destroy(&self, workspace: &mut TerraformWorkspace) -> Result<()>;

    /// Imports existing resources into the workspace state.
    async fn import(&self, workspace: &mut TerraformWorkspace, resources: &[ImportResource]) -> Result<()>;

    /// Renders the state as a module definition.
    async fn show(&self, workspace: &mut TerraformWorkspace) -> Result<String>;

    /// Runs a dry-run plan.
    async fn plan(&self, workspace: &mut TerraformWorkspace) -> Result<PlanOutput>;
}

/// Hands out invokers bound to a tool version.
pub trait InvokerBuilder: Send + Sync {
    /// Returns an invoker for the given version.
    fn versioned(&self, version: &Version) -> Arc<dyn TerraformInvoker>;
}

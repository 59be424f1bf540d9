//! Job execution.
//!
//! This module runs the tool against stored workspaces:
//! - Create, update, destroy, and import jobs
//! - The version walk that brings old states up to the default tool version

mod job_runner;
mod upgrade;

pub use job_runner::{JobFailure, JobResult, JobRunner};
pub use upgrade::UpgradeSettings;

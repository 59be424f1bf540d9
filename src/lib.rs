// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # tfbroker
//!
//! Core of a Terraform-backed service broker: it decides how an update
//! request is carried out, runs provisioning jobs at the right tool version,
//! and records the outcome of each job durably so clients can poll it.
//!
//! ## Overview
//!
//! - An update request is classified as a data-plane **update**, a
//!   broker-side **upgrade**, or rejected with a client-facing error
//! - Jobs load the stored workspace, walk its state forward through the
//!   configured upgrade path, then apply or destroy at the default version
//! - Every job moves its deployment record to `in progress` when it starts
//!   and to `succeeded` or `failed` when it ends
//!
//! ## Modules
//!
//! - [`catalog`]: Service plans, maintenance info, and update requests
//! - [`decider`]: Update request classification
//! - [`workspace`]: Serializable workspace and embedded tool state
//! - [`invoker`]: Versioned tool invocation
//! - [`runner`]: Job execution and the version upgrade walk
//! - [`state`]: Deployment record backends (local, S3, in-memory)
//! - [`last_operation`]: Last-operation transitions and polling
//! - [`dispatcher`]: Background job lifecycle
//! - [`config`]: Configuration parsing and validation
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! terraform:
//!   upgrades_enabled: true
//!   versions:
//!     - version: 0.12.21
//!     - version: 1.0.0
//!     - version: 1.1.6
//!       default: true
//!   upgrade_path: [1.0.0, 1.1.6]
//!
//! state:
//!   backend: s3
//!   bucket: broker-deployments
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod catalog;
pub mod cli;
pub mod codec;
pub mod config;
pub mod decider;
pub mod dispatcher;
pub mod error;
pub mod invoker;
pub mod last_operation;
mod pattern;
pub mod runner;
pub mod state;
pub mod workspace;

// ============================================================================
// Re-exports
// ============================================================================

pub use catalog::{MaintenanceInfo, Params, ServiceDefinition, UpdateDetails};
pub use config::{BrokerConfig, ConfigParser, ConfigValidator};
pub use decider::{Operation, decide_operation};
pub use dispatcher::{JobDispatcher, JobHandle, JobOperation};
pub use error::{BrokerError, Result};
pub use invoker::{InvokerBuilder, TerraformInvoker};
pub use last_operation::{LastOperationStore, OperationStatus};
pub use runner::{JobRunner, UpgradeSettings};
pub use state::{DeploymentRecord, DeploymentStore, LocalDeploymentStore, S3DeploymentStore};
pub use workspace::{TerraformWorkspace, Workspace};

//! Delete guard for imports.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::{JobError, Result};
use crate::pattern;

use super::PlanOutput;

/// `  # <address> will be destroyed` or `  # <address> must be replaced`
static DELETED_RESOURCE: LazyLock<Regex> =
    LazyLock::new(|| pattern::fixed(r"(?m)^\s*#\s+(\S+)\s+(?:will be destroyed|must be replaced)\s*$"));

/// `Plan: X to add, Y to change, N to destroy.`
static DESTROY_SUMMARY: LazyLock<Regex> =
    LazyLock::new(|| pattern::fixed(r"(?m)^\s*Plan:.*?(\d+) to destroy"));

/// Fails if the plan would delete or replace any resource.
///
/// # Errors
///
/// Returns [`JobError::ResourceDeletionBlocked`] listing the affected
/// addresses.
pub fn check_plan_output(output: &PlanOutput) -> Result<()> {
    let mut addresses: Vec<String> = DELETED_RESOURCE
        .captures_iter(&output.stdout)
        .map(|caps| caps[1].to_string())
        .collect();

    let summary_count = destroy_count(&output.stdout);
    if addresses.is_empty()
        && let Some(count) = summary_count.filter(|c| *c > 0)
    {
        addresses.push(format!("{count} resource(s)"));
    }

    if addresses.is_empty() {
        debug!("Plan deletes no resources");
        return Ok(());
    }

    warn!("Plan would delete resources: {}", addresses.join(", "));
    Err(JobError::ResourceDeletionBlocked { addresses }.into())
}

/// Reads `N` from a `Plan: X to add, Y to change, N to destroy.` summary.
fn destroy_count(stdout: &str) -> Option<u64> {
    DESTROY_SUMMARY
        .captures(stdout)
        .and_then(|caps| caps[1].parse().ok())
}

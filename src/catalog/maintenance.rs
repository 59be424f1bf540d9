//! Maintenance info and its comparator.

use semver::Version;
use serde::{Deserialize, Serialize};

/// Version-tagged metadata attached to a plan.
///
/// A change here that is not accompanied by any parameter change is how a
/// platform asks the broker to upgrade an instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MaintenanceInfo {
    /// Semantic version of the plan's maintenance level.
    pub version: Version,
    /// Free-form description shown to operators.
    #[serde(default)]
    pub description: String,
}

impl MaintenanceInfo {
    /// Creates maintenance info with an empty description.
    #[must_use]
    pub const fn new(version: Version) -> Self {
        Self {
            version,
            description: String::new(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Three-way comparison of optional maintenance info.
///
/// Absent on both sides is no conflict, absent on one side is a conflict,
/// present on both sides conflicts unless version and description are equal.
#[must_use]
pub fn maintenance_info_conflict(a: Option<&MaintenanceInfo>, b: Option<&MaintenanceInfo>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a != b,
        (None, None) => false,
        _ => true,
    }
}

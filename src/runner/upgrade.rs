//! Tool version walk.
//!
//! Each tool version can only read states written by a bounded range of older
//! versions, so a state written long ago is moved forward by applying it at a
//! series of intermediate versions before the default version touches it.

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::{JobError, Result};

/// Upgrade configuration handed to the job runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeSettings {
    /// Whether states older than the default version may be upgraded.
    pub enabled: bool,
    /// Version every job ends up running.
    pub default_version: Version,
    /// Intermediate versions, ascending.
    pub path: Vec<Version>,
}

impl UpgradeSettings {
    /// Settings with upgrades disabled.
    #[must_use]
    pub const fn disabled(default_version: Version) -> Self {
        Self {
            enabled: false,
            default_version,
            path: Vec::new(),
        }
    }

    /// Settings with upgrades enabled along `path`.
    #[must_use]
    pub const fn enabled(default_version: Version, path: Vec<Version>) -> Self {
        Self {
            enabled: true,
            default_version,
            path,
        }
    }

    /// Versions to apply, in order, to bring a state written by `current` up
    /// to the default version.
    ///
    /// Empty when the state is already at or past the default version.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::VersionMismatch`] if the state is older and
    /// upgrades are disabled, or [`JobError::NoUpgradePathConfigured`] if
    /// upgrades are enabled without a path.
    pub fn steps_from(&self, current: &Version) -> Result<Vec<Version>> {
        if *current >= self.default_version {
            return Ok(Vec::new());
        }

        if !self.enabled {
            return Err(JobError::VersionMismatch {
                state_version: current.to_string(),
                default_version: self.default_version.to_string(),
            }
            .into());
        }

        if self.path.is_empty() {
            return Err(JobError::NoUpgradePathConfigured.into());
        }

        Ok(self.path.iter().filter(|v| *v > current).cloned().collect())
    }
}

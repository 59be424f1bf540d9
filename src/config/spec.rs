//! Configuration types for the broker.
//!
//! This module defines the structs that map to the `tfbroker.yaml` file.

use std::time::Duration;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::runner::UpgradeSettings;

/// The root configuration structure of a broker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Tool versions and upgrade behavior.
    pub terraform: TerraformConfig,
    /// Deployment store configuration.
    #[serde(default)]
    pub state: StateConfig,
    /// Background job configuration.
    #[serde(default)]
    pub jobs: JobsConfig,
}

/// Tool versions available to the broker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TerraformConfig {
    /// Whether states written by older versions may be upgraded.
    #[serde(default)]
    pub upgrades_enabled: bool,
    /// Versions the broker has binaries for.
    #[serde(default)]
    pub versions: Vec<TerraformVersion>,
    /// Intermediate versions applied, in order, during an upgrade.
    #[serde(default)]
    pub upgrade_path: Vec<Version>,
}

/// One available tool version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TerraformVersion {
    /// Tool version.
    pub version: Version,
    /// Marks the version every job runs by default.
    #[serde(default)]
    pub default: bool,
}

/// Deployment store configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StateConfig {
    /// Backend type.
    #[serde(default)]
    pub backend: StateBackend,
    /// Record directory (for local backend).
    #[serde(default)]
    pub path: Option<String>,
    /// S3 bucket name (required for s3 backend).
    #[serde(default)]
    pub bucket: Option<String>,
    /// S3 key prefix (optional).
    #[serde(default)]
    pub prefix: Option<String>,
    /// S3 region (optional, uses AWS default if not specified).
    #[serde(default)]
    pub region: Option<String>,
}

/// Deployment store backend types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    /// One file per deployment on the local disk.
    #[default]
    Local,
    /// One object per deployment in AWS S3.
    S3,
    /// Process memory; records are lost on exit.
    Memory,
}

/// Background job configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobsConfig {
    /// Interval between status polls while waiting for a job.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

const fn default_poll_interval_ms() -> u64 {
    1000
}

impl TerraformConfig {
    /// Resolves the default tool version.
    ///
    /// A version flagged `default` wins. Otherwise a single declared version
    /// is the default.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::TerraformNotFound`] if no version is declared,
    /// or [`ConfigError::NoDefaultTerraform`] if several are declared and
    /// none is flagged.
    pub fn default_version(&self) -> Result<Version, ConfigError> {
        if let Some(flagged) = self.versions.iter().find(|v| v.default) {
            return Ok(flagged.version.clone());
        }

        match self.versions.as_slice() {
            [] => Err(ConfigError::TerraformNotFound),
            [only] => Ok(only.version.clone()),
            _ => Err(ConfigError::NoDefaultTerraform),
        }
    }

    /// Returns true if a binary for `version` is declared.
    #[must_use]
    pub fn has_version(&self, version: &Version) -> bool {
        self.versions.iter().any(|v| &v.version == version)
    }

    /// Builds the upgrade settings handed to the job runner.
    ///
    /// # Errors
    ///
    /// Returns an error if the default version cannot be resolved.
    pub fn upgrade_settings(&self) -> Result<UpgradeSettings, ConfigError> {
        Ok(UpgradeSettings {
            enabled: self.upgrades_enabled,
            default_version: self.default_version()?,
            path: self.upgrade_path.clone(),
        })
    }
}

impl JobsConfig {
    /// Poll interval as a duration.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tf(versions: &[(&str, bool)]) -> TerraformConfig {
        TerraformConfig {
            versions: versions
                .iter()
                .map(|(v, default)| TerraformVersion {
                    version: Version::parse(v).expect("valid version"),
                    default: *default,
                })
                .collect(),
            ..TerraformConfig::default()
        }
    }

    #[test]
    fn test_flagged_default_wins() {
        let config = tf(&[("0.12.21", false), ("1.1.6", true), ("1.0.0", false)]);
        assert_eq!(config.default_version().expect("flagged"), Version::new(1, 1, 6));
    }

    #[test]
    fn test_single_version_is_default() {
        let config = tf(&[("1.0.0", false)]);
        assert_eq!(config.default_version().expect("single"), Version::new(1, 0, 0));
    }

    #[test]
    fn test_default_resolution_errors() {
        assert_eq!(tf(&[]).default_version().expect_err("none").to_string(), "terraform not found");
        assert_eq!(
            tf(&[("1.0.0", false), ("1.1.6", false)])
                .default_version()
                .expect_err("ambiguous")
                .to_string(),
            "no default terraform found"
        );
    }

    #[test]
    fn test_upgrade_settings() {
        let mut config = tf(&[("1.0.0", false), ("1.1.6", true)]);
        config.upgrades_enabled = true;
        config.upgrade_path = vec![Version::new(1, 0, 0), Version::new(1, 1, 6)];

        let settings = config.upgrade_settings().expect("resolvable");
        assert!(settings.enabled);
        assert_eq!(settings.default_version, Version::new(1, 1, 6));
        assert_eq!(settings.path.len(), 2);
    }

    #[test]
    fn test_jobs_defaults() {
        assert_eq!(JobsConfig::default().poll_interval(), Duration::from_secs(1));
    }
}

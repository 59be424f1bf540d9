//! Configuration validation for broker configs.
//!
//! Checks that the declared tool versions and the upgrade path are consistent
//! before any job runs against them.

use crate::error::{BrokerError, ConfigError, Result};
use std::collections::HashSet;
use tracing::debug;

use super::spec::{BrokerConfig, JobsConfig, StateBackend, StateConfig, TerraformConfig};

/// Validator for broker configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a broker configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any check fails.
    pub fn validate(&self, config: &BrokerConfig) -> Result<ValidationResult> {
        let result = self.check(config);

        if let Some(first_error) = result.errors.first() {
            return Err(BrokerError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }));
        }

        debug!("Configuration validation passed");
        Ok(result)
    }

    /// Runs every check and collects all errors and warnings.
    #[must_use]
    pub fn check(&self, config: &BrokerConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_terraform(&config.terraform, &mut result);
        Self::validate_state(&config.state, &mut result);
        Self::validate_jobs(&config.jobs, &mut result);

        result
    }

    /// Validates declared versions and the upgrade path.
    fn validate_terraform(terraform: &TerraformConfig, result: &mut ValidationResult) {
        let mut seen = HashSet::new();
        for entry in &terraform.versions {
            if !seen.insert(&entry.version) {
                result.errors.push(ValidationError {
                    field: String::from("terraform.versions"),
                    message: format!("Version {} is declared more than once", entry.version),
                });
            }
        }

        let flagged = terraform.versions.iter().filter(|v| v.default).count();
        if flagged > 1 {
            result.errors.push(ValidationError {
                field: String::from("terraform.versions"),
                message: format!("{flagged} versions are flagged as default, expected at most one"),
            });
        }

        let default_version = match terraform.default_version() {
            Ok(version) => Some(version),
            Err(e) => {
                result.errors.push(ValidationError {
                    field: String::from("terraform.versions"),
                    message: e.to_string(),
                });
                None
            }
        };

        for pair in terraform.upgrade_path.windows(2) {
            if pair[0] >= pair[1] {
                result.errors.push(ValidationError {
                    field: String::from("terraform.upgrade_path"),
                    message: format!(
                        "Upgrade path must be strictly ascending, {} is followed by {}",
                        pair[0], pair[1]
                    ),
                });
            }
        }

        for version in &terraform.upgrade_path {
            if !terraform.has_version(version) {
                result.errors.push(ValidationError {
                    field: String::from("terraform.upgrade_path"),
                    message: format!("Upgrade path version {version} is not a declared version"),
                });
            }
        }

        let Some(default_version) = default_version else {
            return;
        };

        if let Some(beyond) = terraform.upgrade_path.iter().find(|v| **v > default_version) {
            result.errors.push(ValidationError {
                field: String::from("terraform.upgrade_path"),
                message: format!(
                    "Upgrade path version {beyond} is newer than the default version {default_version}"
                ),
            });
        }

        match terraform.upgrade_path.last() {
            Some(last) if *last != default_version => result.warnings.push(format!(
                "Upgrade path ends at {last}, not at the default version {default_version}"
            )),
            None if terraform.upgrades_enabled => result.warnings.push(String::from(
                "Upgrades are enabled but no upgrade path is configured",
            )),
            _ => {}
        }
    }

    /// Validates state configuration.
    fn validate_state(state: &StateConfig, result: &mut ValidationResult) {
        match state.backend {
            StateBackend::S3 => {
                if state.bucket.as_ref().is_none_or(String::is_empty) {
                    result.errors.push(ValidationError {
                        field: String::from("state.bucket"),
                        message: String::from("S3 bucket name is required when using S3 backend"),
                    });
                }
            }
            StateBackend::Memory => {
                result
                    .warnings
                    .push(String::from("Memory backend loses every deployment record on exit"));
            }
            StateBackend::Local => {}
        }
    }

    /// Validates job configuration.
    fn validate_jobs(jobs: &JobsConfig, result: &mut ValidationResult) {
        if jobs.poll_interval_ms == 0 {
            result.errors.push(ValidationError {
                field: String::from("jobs.poll_interval_ms"),
                message: String::from("Poll interval must be greater than zero"),
            });
        }
    }
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;

    fn parse(yaml: &str) -> BrokerConfig {
        ConfigParser::new().parse_yaml(yaml, None).expect("valid yaml")
    }

    const VALID: &str = r"
terraform:
  upgrades_enabled: true
  versions:
    - version: 0.12.21
    - version: 1.0.0
    - version: 1.1.6
      default: true
  upgrade_path: [1.0.0, 1.1.6]
";

    #[test]
    fn test_valid_config() {
        let result = ConfigValidator::new().validate(&parse(VALID)).expect("valid config");
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 0);
    }

    #[test]
    fn test_path_must_ascend() {
        let config = parse(
            r"
terraform:
  versions:
    - version: 1.0.0
    - version: 1.1.6
      default: true
  upgrade_path: [1.1.6, 1.0.0]
",
        );
        let result = ConfigValidator::new().check(&config);
        assert!(result.errors.iter().any(|e| e.message.contains("strictly ascending")));
    }

    #[test]
    fn test_path_versions_must_be_declared_and_not_beyond_default() {
        let config = parse(
            r"
terraform:
  versions:
    - version: 1.0.0
      default: true
    - version: 1.1.6
  upgrade_path: [0.13.7, 1.1.6]
",
        );
        let result = ConfigValidator::new().check(&config);
        assert_eq!(result.error_count(), 2);
        assert!(result.errors[0].message.contains("0.13.7"));
        assert!(result.errors[1].message.contains("newer than the default"));
        assert!(ConfigValidator::new().validate(&config).is_err());
    }

    #[test]
    fn test_multiple_defaults() {
        let config = parse(
            r"
terraform:
  versions:
    - version: 1.0.0
      default: true
    - version: 1.1.6
      default: true
",
        );
        let result = ConfigValidator::new().check(&config);
        assert!(result.errors.iter().any(|e| e.message.contains("flagged as default")));
    }

    #[test]
    fn test_missing_versions() {
        let result = ConfigValidator::new().check(&parse("terraform: {}"));
        assert_eq!(result.error_count(), 1);
        assert_eq!(result.errors[0].to_string(), "terraform.versions: terraform not found");
    }

    #[test]
    fn test_warnings() {
        let config = parse(
            r"
terraform:
  upgrades_enabled: true
  versions:
    - version: 1.1.6
state:
  backend: memory
",
        );
        let result = ConfigValidator::new().validate(&config).expect("only warnings");
        assert_eq!(result.warning_count(), 2);

        let config = parse(
            r"
terraform:
  versions:
    - version: 1.0.0
    - version: 1.1.6
      default: true
  upgrade_path: [1.0.0]
",
        );
        let result = ConfigValidator::new().check(&config);
        assert!(result.is_valid());
        assert!(result.warnings[0].contains("not at the default version"));
    }

    #[test]
    fn test_s3_requires_bucket() {
        let config = parse(
            r"
terraform:
  versions:
    - version: 1.1.6
state:
  backend: s3
",
        );
        let result = ConfigValidator::new().check(&config);
        assert_eq!(result.errors[0].field, "state.bucket");
    }

    #[test]
    fn test_zero_poll_interval() {
        let config = parse(
            r"
terraform:
  versions:
    - version: 1.1.6
jobs:
  poll_interval_ms: 0
",
        );
        assert!(!ConfigValidator::new().check(&config).is_valid());
    }
}

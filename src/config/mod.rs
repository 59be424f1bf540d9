//! Configuration module for the broker.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `tfbroker.yaml`
//! - Environment overrides
//! - Validation of tool versions and the upgrade path

mod parser;
mod spec;
mod validator;

pub use parser::{
    ConfigParser, DEFAULT_CONFIG_FILES, ENV_STATE_BUCKET, ENV_STATE_PATH, ENV_STATE_PREFIX,
    ENV_UPGRADES_ENABLED, find_config_file,
};
pub use spec::{
    BrokerConfig, JobsConfig, StateBackend, StateConfig, TerraformConfig, TerraformVersion,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};

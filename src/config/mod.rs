//! Configuration model for gpu-lock.
//!
//! This module defines the Config struct that represents the optional
//! `config.yaml` shared by every user of a host. It supports
//! forward-compatible YAML parsing (unknown fields are ignored), sensible
//! defaults for every field, and validation of config values.

mod model;
mod operations;
pub mod types;


// Re-export public API
pub use model::Config;
pub use operations::{CONFIG_ENV_VAR, SYSTEM_CONFIG_PATH};

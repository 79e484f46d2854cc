// src/config/mod.rs

//! Configuration loading and validation for qexec.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate and resolve topics (`validate.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    CommonSection, ConfigFile, DefaultSection, RawConfigFile, RawTopicConfig, TopicConfig,
};
pub use validate::{DEFAULT_CHANNEL, validate_config};

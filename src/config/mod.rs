// src/config/mod.rs

//! Configuration loading and validation for cloudref.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate invariants like stage graph acyclicity (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, parse_str};
pub use model::{
    AwsSection, BootstrapSection, BootstrapTimings, ClusterSection, ConfigFile, OverlaySection,
    RawConfigFile, StageConfig, ToolSection, default_stages, names,
};

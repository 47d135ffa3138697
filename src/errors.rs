// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Every failure kind that can abort a provisioning run has its own variant
//! so callers (and tests) can match on it instead of parsing messages.

use std::time::Duration;

use thiserror::Error;

use crate::types::{CommandStatus, StageMode};

#[derive(Error, Debug)]
pub enum CloudrefError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cycle detected in stage graph: {0}")]
    DagCycle(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// `<tool> init` failed for a stage working directory.
    #[error("stage '{stage}': init failed: {message}")]
    InitError { stage: String, message: String },

    /// plan/apply/destroy (or one of the stage hooks) failed.
    #[error("stage '{stage}': {mode} failed: {message}")]
    ExecutionError {
        stage: String,
        mode: StageMode,
        message: String,
    },

    #[error("stage '{stage}': cannot parse tool outputs: {message}")]
    OutputParseError { stage: String, message: String },

    #[error("instance {instance} not ready after {attempts} attempts")]
    NotReady { instance: String, attempts: u32 },

    #[error("remote command {command_id} on {instance} finished with status {status}")]
    RemoteCommandError {
        instance: String,
        command_id: String,
        status: CommandStatus,
    },

    #[error("remote command {command_id} on {instance} still running after {waited:?}")]
    DeadlineExceeded {
        instance: String,
        command_id: String,
        waited: Duration,
    },

    #[error("secret not found: {0}")]
    NotFound(String),

    #[error("secret already exists: {0}")]
    SecretExists(String),

    #[error("secret store error: {0}")]
    SecretStoreError(String),

    #[error("control plane error: {0}")]
    ControlPlaneError(String),

    #[error("cannot resolve bootstrap instance: {0}")]
    ResolutionError(String),

    #[error("inconsistent bootstrap state: {0}")]
    InconsistentState(String),

    /// First error reported by a set of concurrently executed branches.
    #[error("branch '{stage}' failed ({failed} failed branch(es) in wave): {source}")]
    BranchFailed {
        stage: String,
        failed: usize,
        #[source]
        source: Box<CloudrefError>,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CloudrefError {
    /// Innermost error, looking through `BranchFailed` wrappers.
    pub fn root(&self) -> &CloudrefError {
        match self {
            CloudrefError::BranchFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, CloudrefError>;

// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, Subcommand, ValueEnum};

use crate::types::StageMode;

/// Command-line arguments for `cloudref`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "cloudref",
    version,
    about = "Provision, bootstrap and tear down the reference cloud cluster.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Cloudref.toml")]
    pub config: String,

    /// Root directory holding the stage working directories.
    ///
    /// Overrides `[cluster].source` from the config file.
    #[arg(long, value_name = "DIR")]
    pub source: Option<String>,

    /// Extra stage variable, e.g. `compute-cluster.github_branch=main`.
    ///
    /// May be given multiple times. Overrides `[stage.<name>].vars`.
    #[arg(long = "var", value_name = "STAGE.KEY=VALUE")]
    pub vars: Vec<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CLOUDREF_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the stage waves, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Plan every stage in dependency order.
    Plan,
    /// Create all stages and bootstrap the secret store.
    Up,
    /// Drain and destroy all stages in reverse dependency order.
    Down,
    /// Run a single stage.
    Stage {
        /// Stage name as declared in `[stage.<name>]`.
        name: String,

        #[arg(long, value_enum, default_value = "apply")]
        mode: StageMode,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// A parsed `--var STAGE.KEY=VALUE` override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarOverride {
    pub stage: String,
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for VarOverride {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lhs, value) = s
            .split_once('=')
            .ok_or_else(|| format!("invalid --var '{s}': expected STAGE.KEY=VALUE"))?;
        let (stage, key) = lhs
            .split_once('.')
            .ok_or_else(|| format!("invalid --var '{s}': missing STAGE. prefix"))?;
        if stage.is_empty() || key.is_empty() {
            return Err(format!("invalid --var '{s}': empty stage or key"));
        }
        Ok(VarOverride {
            stage: stage.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

// src/lib.rs

pub mod bootstrap;
pub mod cli;
pub mod cloud;
pub mod config;
pub mod dag;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod orchestrator;
pub mod overlay;
pub mod remote;
pub mod secrets;
pub mod stage;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info};

use crate::cli::{CliArgs, Command, VarOverride};
use crate::cloud::{AwsCli, AwsControlPlane};
use crate::config::{ConfigFile, RawConfigFile, default_config_path, load_from_path, parse_str};
use crate::dag::StageGraph;
use crate::exec::TokioProcessRunner;
use crate::orchestrator::Orchestrator;
use crate::secrets::AwsSecretsManager;
use crate::stage::StageRunner;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and `--var` overrides
/// - the stage graph
/// - the AWS-backed control plane and secret store
/// - the orchestrator for the requested command
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_config(&config_path)?;

    let overrides = args
        .vars
        .iter()
        .map(|v| v.parse::<VarOverride>().map_err(|e| anyhow!(e)))
        .collect::<Result<Vec<_>>>()?;

    let source = source_dir(&config_path, args.source.as_deref(), &cfg.cluster.source);
    let graph = StageGraph::from_config(&cfg, &source, &overrides)?;

    if args.dry_run {
        print_dry_run(&cfg, &graph, &args.command);
        return Ok(());
    }

    let processes = Arc::new(TokioProcessRunner::new());
    let aws = AwsCli::from_config(processes.clone(), &cfg.aws, &cfg.cluster.region);
    let control = Arc::new(AwsControlPlane::new(aws.clone()));
    let secrets = Arc::new(AwsSecretsManager::new(aws));

    let orchestrator = Orchestrator::from_config(&cfg, graph, processes, control, secrets)?;

    match args.command {
        Command::Plan => {
            let results = orchestrator.plan().await?;
            println!("Planned {} stage(s).", results.len());
        }
        Command::Up => {
            let report = orchestrator.up().await?;
            print!("{report}");
        }
        Command::Down => {
            let runs = orchestrator.down().await?;
            for run in &runs {
                let status = if run.is_skipped() { "skipped" } else { "destroyed" };
                println!("  {}: {status}", run.stage);
            }
            println!("Teardown complete.");
        }
        Command::Stage { name, mode } => {
            let run = orchestrator.run_stage(&name, mode).await?;
            if run.is_skipped() {
                println!("Stage '{name}' skipped.");
            } else {
                println!("Stage '{name}' {mode} complete.");
            }
            if let Some(outcome) = &run.bootstrap {
                println!(
                    "  secret store initialized by this run: {}",
                    outcome.initialized_now
                );
            }
        }
    }

    Ok(())
}

/// Load and validate the config. A missing default config file means
/// "use the built-in defaults".
fn load_config(path: &Path) -> Result<ConfigFile> {
    let raw: RawConfigFile = if !path.exists() && path == default_config_path().as_path() {
        debug!(path = %path.display(), "config file not found; using defaults");
        parse_str("")?
    } else {
        load_from_path(path).with_context(|| format!("loading config {}", path.display()))?
    };
    let cfg = ConfigFile::try_from(raw)?;
    Ok(cfg)
}

/// Resolve the directory stage `dir` entries are relative to.
///
/// `--source` wins; otherwise `[cluster].source` is taken relative to the
/// config file's directory.
fn source_dir(config_path: &Path, cli_source: Option<&str>, cfg_source: &str) -> PathBuf {
    if let Some(src) = cli_source {
        return PathBuf::from(src);
    }
    let cfg_source = Path::new(cfg_source);
    if cfg_source.is_absolute() {
        return cfg_source.to_path_buf();
    }
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(cfg_source),
        _ => cfg_source.to_path_buf(),
    }
}

/// Print the resolved stage waves and the tool commands, without running anything.
fn print_dry_run(cfg: &ConfigFile, graph: &StageGraph, command: &Command) {
    println!("cloudref dry-run ({command:?})");
    println!("  tool = {}", cfg.tool.binary);
    println!("  region = {}", cfg.cluster.region);
    println!("  secret store = {}", cfg.cluster.secret_store_addr());
    println!();

    let mode = match command {
        Command::Plan => types::StageMode::Plan,
        Command::Up => types::StageMode::Apply,
        Command::Down => types::StageMode::Destroy,
        Command::Stage { mode, .. } => *mode,
    };

    let mut waves = graph.waves();
    if mode == types::StageMode::Destroy {
        waves.reverse();
    }

    for (index, wave) in waves.iter().enumerate() {
        println!("wave {index}:");
        for stage in wave {
            println!("  - {}", stage.name);
            println!("      dir: {}", stage.dir.display());
            println!(
                "      {} {}",
                cfg.tool.binary,
                StageRunner::mode_args(stage, mode, &[]).join(" ")
            );
            if stage.bootstrap {
                println!("      bootstrap: true");
            }
            if !stage.pre_destroy.is_empty() && mode == types::StageMode::Destroy {
                println!("      pre_destroy: {:?}", stage.pre_destroy);
            }
        }
    }

    info!("dry-run complete (no execution)");
}

// tests/cli_and_types.rs

use std::time::Duration;

use clap::Parser;

use cloudref::cli::{CliArgs, Command};
use cloudref::logging::parse_level_str;
use cloudref::types::{parse_duration, CommandStatus, InstanceState, StageMode};

#[test]
fn test_parse_duration_units() {
    assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
    assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
    assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
    assert_eq!(parse_duration(" 2h ").unwrap(), Duration::from_secs(7200));
    assert!(parse_duration("").is_err());
    assert!(parse_duration("10").is_err());
    assert!(parse_duration("3d").is_err());
}

#[test]
fn test_parse_duration_rejects_overflow() {
    let err = parse_duration("307445734561825861m").unwrap_err();
    assert!(err.contains("too large"), "got: {err}");
    assert!(parse_duration("18446744073709551615h").is_err());
    assert_eq!(
        parse_duration("18446744073709551615s").unwrap(),
        Duration::from_secs(u64::MAX)
    );
}

#[test]
fn test_status_and_state_parsing() {
    assert_eq!("InProgress".parse::<CommandStatus>().unwrap(), CommandStatus::InProgress);
    assert_eq!("TimedOut".parse::<CommandStatus>().unwrap(), CommandStatus::TimedOut);
    assert!("Weird".parse::<CommandStatus>().is_err());
    assert!(CommandStatus::Cancelled.is_terminal());
    assert!(!CommandStatus::Delayed.is_terminal());

    assert_eq!(
        "shutting-down".parse::<InstanceState>().unwrap(),
        InstanceState::ShuttingDown
    );
    assert_eq!("running".parse::<InstanceState>().unwrap(), InstanceState::Running);
}

#[test]
fn test_cli_parses_stage_command_and_overrides() {
    let args = CliArgs::try_parse_from([
        "cloudref",
        "--config",
        "infra/Cloudref.toml",
        "--var",
        "compute-cluster.github_branch=main",
        "--dry-run",
        "stage",
        "network",
        "--mode",
        "destroy",
    ])
    .unwrap();

    assert_eq!(args.config, "infra/Cloudref.toml");
    assert_eq!(args.vars, vec!["compute-cluster.github_branch=main"]);
    assert!(args.dry_run);
    match args.command {
        Command::Stage { name, mode } => {
            assert_eq!(name, "network");
            assert_eq!(mode, StageMode::Destroy);
        }
        other => panic!("Expected stage command, got: {:?}", other),
    }
}

#[test]
fn test_cli_defaults() {
    let args = CliArgs::try_parse_from(["cloudref", "up"]).unwrap();
    assert_eq!(args.config, "Cloudref.toml");
    assert!(args.source.is_none());
    assert!(matches!(args.command, Command::Up));

    let args = CliArgs::try_parse_from(["cloudref", "stage", "network"]).unwrap();
    assert!(matches!(args.command, Command::Stage { mode: StageMode::Apply, .. }));
}

#[test]
fn test_log_level_strings() {
    assert_eq!(parse_level_str("WARNING"), Some(tracing::Level::WARN));
    assert_eq!(parse_level_str("debug"), Some(tracing::Level::DEBUG));
    assert_eq!(parse_level_str("loud"), None);
}

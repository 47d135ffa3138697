// tests/config_validation.rs

use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;

use cloudref::config::{load_and_validate, names, parse_str, ConfigFile};
use cloudref::errors::CloudrefError;

fn load(contents: &str) -> Result<ConfigFile, CloudrefError> {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    load_and_validate(file.path())
}

#[test]
fn test_empty_file_yields_reference_graph() {
    let cfg = load("").expect("defaults are valid");

    let stages: Vec<&str> = cfg.stage.keys().map(|s| s.as_str()).collect();
    assert_eq!(
        stages,
        vec![names::COMPUTE_CLUSTER, names::NETWORK, names::SECRET_STORE_CLUSTER]
    );
    assert_eq!(cfg.bootstrap_stage(), Some(names::SECRET_STORE_CLUSTER));
    assert_eq!(cfg.stage[names::COMPUTE_CLUSTER].after, vec![names::NETWORK]);
    assert_eq!(cfg.stage[names::SECRET_STORE_CLUSTER].after, vec![names::NETWORK]);

    assert_eq!(cfg.tool.binary, "tofu");
    assert_eq!(cfg.bootstrap.ready_attempts, 5);
    let timings = cfg.bootstrap.timings().unwrap();
    assert_eq!(timings.ready_interval, Duration::from_secs(60));
    assert_eq!(timings.poll_interval, Duration::from_secs(5));
    assert_eq!(timings.command_timeout, Duration::from_secs(15 * 60));
    assert_eq!(
        cfg.cluster.expand(&cfg.bootstrap.secret_name),
        "openbao/cloud-native-ref/tokens/root"
    );
    assert_eq!(
        cfg.cluster.secret_store_addr(),
        "https://bao.priv.cloud.ogenki.io:8200"
    );
}

#[test]
fn test_sections_override_defaults() {
    let cfg = load(
        r#"
[cluster]
repo_name = "c1"
region = "us-east-1"

[tool]
binary = "terraform"

[bootstrap]
secret_name = "service/{repo_name}/tokens/root"
ready_attempts = 2
ready_interval = "10s"

[stage.only]
dir = "infra"
var_files = ["prod.tfvars"]
vars = { env = "prod" }
bootstrap = true
"#,
    )
    .expect("valid config");

    assert_eq!(cfg.stage.len(), 1);
    assert_eq!(cfg.tool.binary, "terraform");
    assert_eq!(cfg.cluster.region, "us-east-1");
    assert_eq!(
        cfg.cluster.expand(&cfg.bootstrap.secret_name),
        "service/c1/tokens/root"
    );
    assert_eq!(cfg.stage["only"].vars["env"], "prod");
    assert_eq!(cfg.bootstrap_stage(), Some("only"));
}

#[test]
fn test_dag_cycle_returns_structured_error() {
    let result = load(
        r#"
[stage.a]
dir = "a"
after = ["b"]

[stage.b]
dir = "b"
after = ["a"]
"#,
    );

    match result {
        Err(CloudrefError::DagCycle(msg)) => {
            assert!(msg.contains("cycle detected"));
            assert!(msg.contains('a') || msg.contains('b'));
        }
        Err(e) => panic!("Expected DagCycle error, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_unknown_dependency_returns_config_error() {
    let result = load(
        r#"
[stage.a]
dir = "a"
after = ["NonExistent"]
"#,
    );

    match result {
        Err(CloudrefError::ConfigError(msg)) => {
            assert!(msg.contains("unknown dependency"));
            assert!(msg.contains("NonExistent"));
        }
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_self_dependency_is_rejected() {
    let result = load(
        r#"
[stage.a]
dir = "a"
after = ["a"]
"#,
    );
    assert!(matches!(result, Err(CloudrefError::ConfigError(msg)) if msg.contains("itself")));
}

#[test]
fn test_bad_durations_are_rejected() {
    let bad_ready = load(
        r#"
[bootstrap]
ready_interval = "soon"
"#,
    );
    assert!(matches!(bad_ready, Err(CloudrefError::ConfigError(msg)) if msg.contains("ready_interval")));

    let bad_grace = load(
        r#"
[stage.a]
dir = "a"
drain_grace = "60"
"#,
    );
    assert!(matches!(bad_grace, Err(CloudrefError::ConfigError(msg)) if msg.contains("drain_grace")));

    let zero_poll = load(
        r#"
[bootstrap]
poll_interval = "0s"
"#,
    );
    assert!(matches!(zero_poll, Err(CloudrefError::ConfigError(_))));
}

#[test]
fn test_zero_ready_attempts_is_rejected() {
    let result = load(
        r#"
[bootstrap]
ready_attempts = 0
"#,
    );
    assert!(matches!(result, Err(CloudrefError::ConfigError(msg)) if msg.contains("ready_attempts")));
}

#[test]
fn test_at_most_one_bootstrap_stage() {
    let result = load(
        r#"
[stage.a]
dir = "a"
bootstrap = true

[stage.b]
dir = "b"
bootstrap = true
"#,
    );
    assert!(matches!(result, Err(CloudrefError::ConfigError(msg)) if msg.contains("bootstrap")));
}

#[test]
fn test_malformed_toml_is_a_toml_error() {
    let result = parse_str("[stage.a\ndir = ");
    assert!(matches!(result, Err(CloudrefError::TomlError(_))));
}

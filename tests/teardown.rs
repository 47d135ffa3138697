// tests/teardown.rs

mod common;

use std::time::Duration;

use cloudref::config::names;
use cloudref::errors::CloudrefError;
use cloudref::secrets::MemorySecretBackend;
use cloudref::types::StageMode;
use cloudref_test_utils::{ConfigFileBuilder, FakeControlPlane};
use common::Harness;

const SECRET: &str = "openbao/cloud-native-ref/tokens/root";

fn teardown_config() -> ConfigFileBuilder {
    ConfigFileBuilder::reference_graph()
        .modify_stage(names::COMPUTE_CLUSTER, |s| {
            s.exists_check = Some("cluster-exists {cluster_name}".to_string());
            s.pre_destroy = vec!["drain-one".to_string(), "drain-two".to_string()];
            s.drain_grace = Some("60s".to_string());
        })
        .modify_stage(names::SECRET_STORE_CLUSTER, |s| {
            s.pre_destroy = vec!["revoke-leases".to_string()];
        })
}

#[tokio::test(start_paused = true)]
async fn test_down_destroys_dependents_before_dependencies() {
    let cfg = teardown_config().build();
    let h = Harness::new(&cfg, FakeControlPlane::new());
    h.processes.delay("compute: tofu destroy", Duration::from_secs(5));

    let runs = h.orchestrator.down().await.unwrap();

    assert_eq!(runs.len(), 3);
    assert!(runs.iter().all(|r| r.mode == StageMode::Destroy && !r.is_skipped()));
    assert_eq!(runs.last().unwrap().stage, names::NETWORK);

    let network = h.processes.calls_matching("network: tofu destroy").remove(0);
    for dependent in ["compute: tofu destroy", "secrets: tofu destroy"] {
        let call = h.processes.calls_matching(dependent).remove(0);
        assert!(call.finished.unwrap() <= network.started);
    }
    assert!(!h.processes.was_called("tofu apply"));
}

#[tokio::test(start_paused = true)]
async fn test_drain_hooks_then_grace_then_destroy() {
    let cfg = teardown_config().build();
    let h = Harness::new(&cfg, FakeControlPlane::new());

    h.orchestrator
        .run_stage(names::COMPUTE_CLUSTER, StageMode::Destroy)
        .await
        .unwrap();

    let keys: Vec<String> = h
        .processes
        .keys()
        .into_iter()
        .filter(|k| k.starts_with("/src/compute"))
        .collect();
    assert_eq!(
        keys,
        vec![
            "/src/compute: sh -c cluster-exists mycluster-0",
            "/src/compute: sh -c drain-one",
            "/src/compute: sh -c drain-two",
            "/src/compute: tofu init -input=false",
            "/src/compute: tofu destroy -auto-approve -input=false",
        ]
    );

    let last_drain = h.processes.calls_matching("drain-two").remove(0);
    let destroy = h.processes.calls_matching("tofu destroy").remove(0);
    assert!(destroy.started - last_drain.finished.unwrap() >= Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_missing_resources_skip_destroy() {
    let cfg = teardown_config().build();
    let h = Harness::new(&cfg, FakeControlPlane::new());
    h.processes.fail("cluster-exists", 254, "ResourceNotFoundException");

    let runs = h.orchestrator.down().await.unwrap();

    let compute = runs.iter().find(|r| r.stage == names::COMPUTE_CLUSTER).unwrap();
    assert!(compute.is_skipped());
    assert!(!h.processes.was_called("drain-one"));
    assert!(!h.processes.was_called("compute: tofu destroy"));
    assert!(h.processes.was_called("network: tofu destroy"));
}

#[tokio::test(start_paused = true)]
async fn test_stored_credential_is_exported_to_drain_hooks() {
    let cfg = teardown_config().build();
    let secrets = MemorySecretBackend::new();
    secrets.insert(SECRET, r#"{"token":"tok-9"}"#);
    let h = Harness::with_secrets(&cfg, FakeControlPlane::new(), secrets);

    h.orchestrator.down().await.unwrap();

    let hook = h.processes.calls_matching("revoke-leases").remove(0);
    let env = &hook.invocation.env;
    assert!(env.contains(&("VAULT_TOKEN".to_string(), "tok-9".to_string())));
    assert!(env.contains(&(
        "VAULT_ADDR".to_string(),
        "https://bao.priv.cloud.ogenki.io:8200".to_string()
    )));

    // Other stages never see the credential.
    let drain = h.processes.calls_matching("drain-one").remove(0);
    assert!(drain.invocation.env.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_missing_credential_does_not_block_teardown() {
    let cfg = teardown_config().build();
    let h = Harness::new(&cfg, FakeControlPlane::new());

    h.orchestrator.down().await.unwrap();

    let hook = h.processes.calls_matching("revoke-leases").remove(0);
    assert!(hook.invocation.env.is_empty());
    assert!(h.processes.was_called("secrets: tofu destroy"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_destroy_keeps_network() {
    let cfg = teardown_config().build();
    let h = Harness::new(&cfg, FakeControlPlane::new());
    h.processes.fail("secrets: tofu destroy", 1, "dependency violation");

    let err = h.orchestrator.down().await.unwrap_err();

    assert!(matches!(err, CloudrefError::BranchFailed { ref stage, .. } if stage == names::SECRET_STORE_CLUSTER));
    assert!(h.processes.was_called("compute: tofu destroy"));
    assert!(!h.processes.was_called("network: tofu destroy"));
}

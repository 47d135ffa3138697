// tests/bootstrap_protocol.rs

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use cloudref::bootstrap::{
    init_probe_script, BootstrapProtocol, BootstrapSettings, Credential,
};
use cloudref::errors::CloudrefError;
use cloudref::remote::{ReadinessPolicy, RemoteExecutor};
use cloudref::secrets::{MemorySecretBackend, SecretClient};
use cloudref::stage::{OutputValue, StageOutputs};
use cloudref::types::InstanceState;
use cloudref_test_utils::{init_tracing, FakeControlPlane};

const SECRET: &str = "openbao/cloud-native-ref/tokens/root";

fn outputs(value: serde_json::Value) -> StageOutputs {
    let mut outputs = StageOutputs::new();
    outputs.insert(
        "autoscaling_group_id".to_string(),
        OutputValue {
            value,
            sensitive: false,
            kind: json!("string"),
        },
    );
    outputs
}

fn protocol(cloud: Arc<FakeControlPlane>, secrets: &MemorySecretBackend) -> BootstrapProtocol {
    init_tracing();
    let executor = RemoteExecutor::new(cloud.clone())
        .with_poll_interval(Duration::from_millis(1))
        .with_timeout(Duration::from_secs(1));
    BootstrapProtocol::new(
        cloud,
        executor,
        SecretClient::new(Arc::new(secrets.clone())),
        BootstrapSettings {
            output_key: "autoscaling_group_id".to_string(),
            secret_name: SECRET.to_string(),
            service_cli: "bao".to_string(),
            readiness: ReadinessPolicy {
                max_attempts: 3,
                interval: Duration::from_millis(1),
            },
        },
    )
}

#[tokio::test]
async fn test_first_run_initializes_and_persists() {
    let cloud = Arc::new(FakeControlPlane::ready("asg-1", "i-1", "tok-abc"));
    let secrets = MemorySecretBackend::new();

    let outcome = protocol(cloud.clone(), &secrets)
        .run(&outputs(json!("asg-1")))
        .await
        .unwrap();

    assert!(outcome.initialized_now);
    assert_eq!(outcome.credential.expose(), "tok-abc");
    assert_eq!(outcome.instance_id, "i-1");
    assert_eq!(secrets.raw(SECRET).as_deref(), Some(r#"{"token":"tok-abc"}"#));

    let sent = cloud.sent_commands();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "i-1");
    assert_eq!(sent[0].1, init_probe_script("bao"));
}

#[tokio::test]
async fn test_repeated_runs_are_idempotent() {
    let cloud = Arc::new(FakeControlPlane::ready("asg-1", "i-1", "tok-abc"));
    let secrets = MemorySecretBackend::new();
    let protocol = protocol(cloud, &secrets);
    let outs = outputs(json!("asg-1"));

    let mut initialized = 0;
    let mut credentials = Vec::new();
    for _ in 0..5 {
        let outcome = protocol.run(&outs).await.unwrap();
        if outcome.initialized_now {
            initialized += 1;
        }
        credentials.push(outcome.credential);
    }

    assert_eq!(initialized, 1);
    assert!(credentials.iter().all(|c| c == &Credential::new("tok-abc")));
    assert_eq!(secrets.len(), 1);
}

#[tokio::test]
async fn test_initialized_service_without_secret_is_inconsistent() {
    let cloud = Arc::new(FakeControlPlane::ready("asg-1", "i-1", "tok-abc").already_initialized());
    let secrets = MemorySecretBackend::new();

    let err = protocol(cloud, &secrets)
        .run(&outputs(json!("asg-1")))
        .await
        .unwrap_err();

    assert!(matches!(err, CloudrefError::InconsistentState(_)));
    assert!(secrets.is_empty());
}

#[tokio::test]
async fn test_secret_without_token_key_is_inconsistent() {
    let cloud = Arc::new(FakeControlPlane::ready("asg-1", "i-1", "tok-abc").already_initialized());
    let secrets = MemorySecretBackend::new();
    secrets.insert(SECRET, r#"{"password":"x"}"#);

    let err = protocol(cloud, &secrets)
        .run(&outputs(json!("asg-1")))
        .await
        .unwrap_err();

    assert!(matches!(err, CloudrefError::InconsistentState(msg) if msg.contains("token")));
}

#[tokio::test]
async fn test_resolution_failures() {
    let secrets = MemorySecretBackend::new();

    // Missing output key.
    let cloud = Arc::new(FakeControlPlane::ready("asg-1", "i-1", "t"));
    let err = protocol(cloud, &secrets)
        .run(&StageOutputs::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CloudrefError::ResolutionError(_)));

    // Non-string value.
    let cloud = Arc::new(FakeControlPlane::ready("asg-1", "i-1", "t"));
    let err = protocol(cloud, &secrets)
        .run(&outputs(json!(["asg-1"])))
        .await
        .unwrap_err();
    assert!(matches!(err, CloudrefError::ResolutionError(_)));

    // Unknown group.
    let cloud = Arc::new(FakeControlPlane::ready("asg-1", "i-1", "t"));
    let err = protocol(cloud.clone(), &secrets)
        .run(&outputs(json!("asg-2")))
        .await
        .unwrap_err();
    assert!(matches!(err, CloudrefError::ResolutionError(msg) if msg.contains("asg-2")));
    assert!(cloud.sent_commands().is_empty());

    // Empty group.
    let cloud = Arc::new(FakeControlPlane::new().with_group("asg-1", &[]));
    let err = protocol(cloud, &secrets)
        .run(&outputs(json!("asg-1")))
        .await
        .unwrap_err();
    assert!(matches!(err, CloudrefError::ResolutionError(msg) if msg.contains("no members")));
}

#[tokio::test]
async fn test_unready_instance_stops_before_dispatch() {
    let cloud = Arc::new(
        FakeControlPlane::new()
            .with_group("asg-1", &["i-1", "i-2"])
            .with_instance("i-1", vec![InstanceState::Stopped], vec![false])
            .with_token("t"),
    );
    let secrets = MemorySecretBackend::new();

    let err = protocol(cloud.clone(), &secrets)
        .run(&outputs(json!("asg-1")))
        .await
        .unwrap_err();

    assert!(matches!(err, CloudrefError::NotReady { ref instance, attempts: 3 } if instance == "i-1"));
    assert!(cloud.sent_commands().is_empty());
    assert!(!cloud.is_initialized());
}

#[test]
fn test_credential_is_redacted() {
    let credential = Credential::new("s3cr3t");
    assert!(!format!("{credential}").contains("s3cr3t"));
    assert!(!format!("{credential:?}").contains("s3cr3t"));
    assert_eq!(credential.expose(), "s3cr3t");
}

#[test]
fn test_probe_script_uses_service_cli() {
    let script = init_probe_script("vault");
    assert!(script.contains("vault status -format=json"));
    assert!(script.contains(
        "vault operator init -recovery-shares=1 -recovery-threshold=1 -format=json"
    ));
    assert!(script.contains(".root_token"));
}

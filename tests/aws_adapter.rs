// tests/aws_adapter.rs

use std::sync::Arc;

use cloudref::cloud::{AwsCli, AwsControlPlane, ControlPlane};
use cloudref::errors::CloudrefError;
use cloudref::secrets::{AwsSecretsManager, SecretClient, SecretData};
use cloudref::types::{CommandStatus, InstanceState};
use cloudref_test_utils::{init_tracing, FakeProcessRunner};

fn cli(processes: &Arc<FakeProcessRunner>) -> AwsCli {
    init_tracing();
    AwsCli::new(processes.clone(), "aws").with_region("eu-west-3")
}

#[tokio::test]
async fn test_describe_instance_group_picks_members() {
    let processes = Arc::new(FakeProcessRunner::new());
    processes.stdout(
        "autoscaling describe-auto-scaling-groups",
        r#"{"AutoScalingGroups":[{"AutoScalingGroupName":"asg-1","Instances":[{"InstanceId":"i-1"},{"InstanceId":"i-2"}]}]}"#,
    );
    let control = AwsControlPlane::new(cli(&processes));

    let group = control.describe_instance_group("asg-1").await.unwrap().unwrap();
    assert_eq!(group.members, vec!["i-1", "i-2"]);
    assert_eq!(group.representative(), Some("i-1"));

    assert_eq!(
        processes.keys(),
        vec![": aws autoscaling describe-auto-scaling-groups --auto-scaling-group-names asg-1 --output json --region eu-west-3"]
    );
}

#[tokio::test]
async fn test_unknown_group_is_none() {
    let processes = Arc::new(FakeProcessRunner::new());
    processes.stdout("describe-auto-scaling-groups", r#"{"AutoScalingGroups":[]}"#);
    let control = AwsControlPlane::new(cli(&processes));

    assert!(control.describe_instance_group("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn test_instance_state_and_agent_registration() {
    let processes = Arc::new(FakeProcessRunner::new());
    processes.stdout(
        "ec2 describe-instances",
        r#"{"Reservations":[{"Instances":[{"InstanceId":"i-1","State":{"Code":16,"Name":"running"}}]}]}"#,
    );
    processes.stdout(
        "ssm describe-instance-information",
        r#"{"InstanceInformationList":[{"InstanceId":"i-1","PingStatus":"Online"}]}"#,
    );
    let control = AwsControlPlane::new(cli(&processes).with_profile("ops"));

    assert_eq!(control.describe_instance("i-1").await.unwrap(), InstanceState::Running);
    assert!(control.agent_registered("i-1").await.unwrap());
    assert!(processes.was_called("--profile ops"));
    assert!(processes.was_called("--filters Key=InstanceIds,Values=i-1"));
}

#[tokio::test]
async fn test_agent_not_online_is_unregistered() {
    let processes = Arc::new(FakeProcessRunner::new());
    processes.stdout(
        "describe-instance-information",
        r#"{"InstanceInformationList":[{"InstanceId":"i-1","PingStatus":"ConnectionLost"}]}"#,
    );
    let control = AwsControlPlane::new(cli(&processes));

    assert!(!control.agent_registered("i-1").await.unwrap());
}

#[tokio::test]
async fn test_send_command_and_poll_invocation() {
    let processes = Arc::new(FakeProcessRunner::new());
    processes.stdout("ssm send-command", r#"{"Command":{"CommandId":"c-42"}}"#);
    processes.stdout(
        "ssm get-command-invocation",
        r#"{"Status":"Success","StandardOutputContent":"tok\n"}"#,
    );
    let control = AwsControlPlane::new(cli(&processes));

    let id = control.send_command("i-1", "echo tok").await.unwrap();
    assert_eq!(id, "c-42");
    let send = processes.calls_matching("send-command").remove(0);
    assert!(send.key.contains("--document-name AWS-RunShellScript"));
    assert!(send.key.contains(r#"--parameters {"commands":["echo tok"]}"#));

    let invocation = control.command_status("i-1", "c-42").await.unwrap();
    assert_eq!(invocation.status, CommandStatus::Success);
    assert_eq!(invocation.stdout, "tok\n");
    assert!(processes.calls_matching("get-command-invocation")[0].invocation.sensitive);
}

#[tokio::test]
async fn test_invocation_not_visible_yet_is_pending() {
    let processes = Arc::new(FakeProcessRunner::new());
    processes.fail(
        "get-command-invocation",
        254,
        "An error occurred (InvocationDoesNotExist) when calling the GetCommandInvocation operation: ",
    );
    let control = AwsControlPlane::new(cli(&processes));

    let invocation = control.command_status("i-1", "c-1").await.unwrap();
    assert_eq!(invocation.status, CommandStatus::Pending);
}

#[tokio::test]
async fn test_cli_failures_are_control_plane_errors() {
    let processes = Arc::new(FakeProcessRunner::new());
    processes.fail(
        "ec2 describe-instances",
        254,
        "An error occurred (UnauthorizedOperation) when calling the DescribeInstances operation",
    );
    let control = AwsControlPlane::new(cli(&processes));

    let err = control.describe_instance("i-1").await.unwrap_err();
    assert!(matches!(err, CloudrefError::ControlPlaneError(msg) if msg.contains("UnauthorizedOperation")));
}

#[tokio::test]
async fn test_secrets_manager_error_codes() {
    let processes = Arc::new(FakeProcessRunner::new());
    processes.fail(
        "get-secret-value",
        254,
        "An error occurred (ResourceNotFoundException) when calling the GetSecretValue operation: Secrets Manager can't find the specified secret.",
    );
    let client = SecretClient::new(Arc::new(AwsSecretsManager::new(cli(&processes))));

    let err = client.get("openbao/x/tokens/root").await.unwrap_err();
    assert!(matches!(err, CloudrefError::NotFound(name) if name == "openbao/x/tokens/root"));
}

#[tokio::test]
async fn test_put_creates_missing_secret() {
    let processes = Arc::new(FakeProcessRunner::new());
    processes.fail(
        "get-secret-value",
        254,
        "An error occurred (ResourceNotFoundException) when calling the GetSecretValue operation",
    );
    processes.stdout("create-secret", r#"{"ARN":"arn:x","Name":"s"}"#);
    let client = SecretClient::new(Arc::new(AwsSecretsManager::new(cli(&processes))));

    let mut data = SecretData::new();
    data.insert("token".to_string(), "t".to_string());
    client.put("s", &data).await.unwrap();

    let create = processes.calls_matching("create-secret").remove(0);
    assert!(create.invocation.sensitive);
    assert!(create.key.contains("--name s --secret-string file://"));
    assert_eq!(create.file_args, vec![r#"{"token":"t"}"#.to_string()]);
    assert!(!processes.was_called("update-secret"));
}

#[tokio::test]
async fn test_put_updates_existing_secret() {
    let processes = Arc::new(FakeProcessRunner::new());
    processes.stdout("get-secret-value", r#"{"Name":"s","SecretString":"{\"token\":\"old\"}"}"#);
    let client = SecretClient::new(Arc::new(AwsSecretsManager::new(cli(&processes))));

    let mut data = SecretData::new();
    data.insert("token".to_string(), "new".to_string());
    client.put("s", &data).await.unwrap();

    let update = processes.calls_matching("update-secret --secret-id s --secret-string file://").remove(0);
    assert_eq!(update.file_args, vec![r#"{"token":"new"}"#.to_string()]);
    assert!(!processes.was_called("create-secret"));
}

#[tokio::test]
async fn test_secret_value_never_appears_in_arguments() {
    let processes = Arc::new(FakeProcessRunner::new());
    processes.fail(
        "get-secret-value",
        254,
        "An error occurred (ResourceNotFoundException) when calling the GetSecretValue operation",
    );
    let client = SecretClient::new(Arc::new(AwsSecretsManager::new(cli(&processes))));

    let mut data = SecretData::new();
    data.insert("token".to_string(), "hvs.root-credential".to_string());
    client.put("openbao/x/tokens/root", &data).await.unwrap();

    for call in processes.calls() {
        assert!(
            call.invocation.args.iter().all(|a| !a.contains("hvs.root-credential")),
            "credential leaked into argv: {:?}",
            call.invocation.args
        );
    }
    let create = processes.calls_matching("create-secret").remove(0);
    assert!(create.file_args[0].contains("hvs.root-credential"));
}

// src/cloud/aws.rs

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::cloud::{CommandInvocation, ControlPlane, InstanceGroup};
use crate::config::AwsSection;
use crate::errors::{CloudrefError, Result};
use crate::exec::{BoxFuture, Invocation, ProcessRunner};
use crate::types::{CommandStatus, InstanceState};

/// Matches the error code in `An error occurred (Code) when calling ...`.
static ERROR_CODE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"An error occurred \(([A-Za-z0-9.]+)\)").ok());

/// A call the AWS CLI itself reported as failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsFailure {
    /// Service error code, e.g. `ResourceNotFoundException`.
    pub code: Option<String>,
    pub message: String,
}

impl AwsFailure {
    fn from_stderr(stderr: &str, fallback: String) -> Self {
        let code = ERROR_CODE
            .as_ref()
            .and_then(|re| re.captures(stderr))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());
        let message = match stderr.trim() {
            "" => fallback,
            s => s.to_string(),
        };
        Self { code, message }
    }

    pub fn is(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }
}

/// Thin wrapper around the `aws` executable.
#[derive(Clone)]
pub struct AwsCli {
    runner: Arc<dyn ProcessRunner>,
    program: String,
    region: Option<String>,
    profile: Option<String>,
}

impl AwsCli {
    pub fn new(runner: Arc<dyn ProcessRunner>, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
            region: None,
            profile: None,
        }
    }

    pub fn from_config(runner: Arc<dyn ProcessRunner>, aws: &AwsSection, region: &str) -> Self {
        let mut cli = Self::new(runner, aws.cli.clone()).with_region(region);
        cli.profile = aws.profile.clone();
        cli
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    fn invocation(&self, service: &str, operation: &str, args: &[String]) -> Invocation {
        let mut inv = Invocation::new(self.program.clone())
            .arg(service)
            .arg(operation)
            .args(args.iter().cloned())
            .args(["--output", "json"]);
        if let Some(region) = &self.region {
            inv = inv.args(["--region", region.as_str()]);
        }
        if let Some(profile) = &self.profile {
            inv = inv.args(["--profile", profile.as_str()]);
        }
        inv
    }

    /// Run one CLI call.
    ///
    /// The outer `Result` carries failures to run the CLI or parse its JSON;
    /// the inner one carries errors reported by the service.
    pub async fn call<T: DeserializeOwned>(
        &self,
        service: &str,
        operation: &str,
        args: &[String],
        sensitive: bool,
    ) -> Result<std::result::Result<T, AwsFailure>> {
        let mut inv = self.invocation(service, operation, args);
        if sensitive {
            inv = inv.sensitive();
        }

        let out = self.runner.run(&inv).await?;
        if !out.success() {
            let failure = AwsFailure::from_stderr(&out.stderr, out.failure_message());
            debug!(
                service,
                operation,
                code = ?failure.code,
                "aws call failed"
            );
            return Ok(Err(failure));
        }

        // Some operations print nothing on success.
        let body = match out.stdout.trim() {
            "" => "{}",
            s => s,
        };
        let parsed = serde_json::from_str(body)?;
        Ok(Ok(parsed))
    }

    /// Like [`AwsCli::call`], mapping service errors to `ControlPlaneError`.
    pub async fn call_ok<T: DeserializeOwned>(
        &self,
        service: &str,
        operation: &str,
        args: &[String],
    ) -> Result<T> {
        self.call(service, operation, args, false)
            .await?
            .map_err(|f| {
                CloudrefError::ControlPlaneError(format!("{service} {operation}: {}", f.message))
            })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeGroupsResponse {
    #[serde(default)]
    auto_scaling_groups: Vec<AutoScalingGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AutoScalingGroup {
    auto_scaling_group_name: String,
    #[serde(default)]
    instances: Vec<GroupInstance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GroupInstance {
    instance_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstancesResponse {
    #[serde(default)]
    reservations: Vec<Reservation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    #[serde(default)]
    instances: Vec<Ec2Instance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Ec2Instance {
    state: Ec2State,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Ec2State {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceInformationResponse {
    #[serde(default)]
    instance_information_list: Vec<InstanceInformation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceInformation {
    instance_id: String,
    #[serde(default)]
    ping_status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SendCommandResponse {
    command: SentCommand,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SentCommand {
    command_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CommandInvocationResponse {
    status: String,
    #[serde(default)]
    standard_output_content: String,
}

/// [`ControlPlane`] backed by autoscaling, ec2 and ssm through the AWS CLI.
pub struct AwsControlPlane {
    cli: AwsCli,
}

impl AwsControlPlane {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }

    async fn group(&self, name: &str) -> Result<Option<InstanceGroup>> {
        let args = vec!["--auto-scaling-group-names".to_string(), name.to_string()];
        let resp: DescribeGroupsResponse = self
            .cli
            .call_ok("autoscaling", "describe-auto-scaling-groups", &args)
            .await?;

        Ok(resp
            .auto_scaling_groups
            .into_iter()
            .find(|g| g.auto_scaling_group_name == name)
            .map(|g| InstanceGroup {
                name: g.auto_scaling_group_name,
                members: g.instances.into_iter().map(|i| i.instance_id).collect(),
            }))
    }

    async fn instance_state(&self, instance_id: &str) -> Result<InstanceState> {
        let args = vec!["--instance-ids".to_string(), instance_id.to_string()];
        let resp: DescribeInstancesResponse =
            self.cli.call_ok("ec2", "describe-instances", &args).await?;

        let state = resp
            .reservations
            .into_iter()
            .flat_map(|r| r.instances)
            .next()
            .ok_or_else(|| {
                CloudrefError::ControlPlaneError(format!("instance {instance_id} not found"))
            })?;

        state
            .state
            .name
            .parse()
            .map_err(CloudrefError::ControlPlaneError)
    }

    async fn registered(&self, instance_id: &str) -> Result<bool> {
        let args = vec![
            "--filters".to_string(),
            format!("Key=InstanceIds,Values={instance_id}"),
        ];
        let resp: InstanceInformationResponse = self
            .cli
            .call_ok("ssm", "describe-instance-information", &args)
            .await?;

        Ok(resp
            .instance_information_list
            .iter()
            .any(|info| info.instance_id == instance_id && info.ping_status == "Online"))
    }

    async fn send(&self, instance_id: &str, script: &str) -> Result<String> {
        let parameters = serde_json::json!({ "commands": [script] });
        let args = vec![
            "--instance-ids".to_string(),
            instance_id.to_string(),
            "--document-name".to_string(),
            "AWS-RunShellScript".to_string(),
            "--parameters".to_string(),
            parameters.to_string(),
        ];
        let resp: SendCommandResponse = self.cli.call_ok("ssm", "send-command", &args).await?;
        Ok(resp.command.command_id)
    }

    async fn invocation(&self, instance_id: &str, command_id: &str) -> Result<CommandInvocation> {
        let args = vec![
            "--command-id".to_string(),
            command_id.to_string(),
            "--instance-id".to_string(),
            instance_id.to_string(),
        ];
        // Output may hold credentials.
        let resp: CommandInvocationResponse =
            match self.cli.call("ssm", "get-command-invocation", &args, true).await? {
                Ok(resp) => resp,
                // Right after dispatch the invocation may not be visible yet.
                Err(f) if f.is("InvocationDoesNotExist") => {
                    return Ok(CommandInvocation {
                        status: CommandStatus::Pending,
                        stdout: String::new(),
                    });
                }
                Err(f) => {
                    return Err(CloudrefError::ControlPlaneError(format!(
                        "ssm get-command-invocation: {}",
                        f.message
                    )));
                }
            };

        let status = resp
            .status
            .parse()
            .map_err(CloudrefError::ControlPlaneError)?;
        Ok(CommandInvocation {
            status,
            stdout: resp.standard_output_content,
        })
    }
}

impl ControlPlane for AwsControlPlane {
    fn describe_instance_group<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Option<InstanceGroup>>> {
        Box::pin(self.group(name))
    }

    fn describe_instance<'a>(&'a self, instance_id: &'a str) -> BoxFuture<'a, Result<InstanceState>> {
        Box::pin(self.instance_state(instance_id))
    }

    fn agent_registered<'a>(&'a self, instance_id: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(self.registered(instance_id))
    }

    fn send_command<'a>(
        &'a self,
        instance_id: &'a str,
        script: &'a str,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.send(instance_id, script))
    }

    fn command_status<'a>(
        &'a self,
        instance_id: &'a str,
        command_id: &'a str,
    ) -> BoxFuture<'a, Result<CommandInvocation>> {
        Box::pin(self.invocation(instance_id, command_id))
    }
}

// src/remote/executor.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::cloud::ControlPlane;
use crate::errors::{CloudrefError, Result};
use crate::types::CommandStatus;

/// Runs a shell script on an instance and waits for its output.
#[derive(Clone)]
pub struct RemoteExecutor {
    control: Arc<dyn ControlPlane>,
    poll_interval: Duration,
    timeout: Duration,
}

impl RemoteExecutor {
    pub fn new(control: Arc<dyn ControlPlane>) -> Self {
        Self {
            control,
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(15 * 60),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Dispatch `script` and poll until it reaches a terminal status.
    ///
    /// Returns the raw stdout on success. The status is first checked one
    /// `poll_interval` after dispatch.
    pub async fn run(&self, instance_id: &str, script: &str) -> Result<String> {
        let command_id = self.control.send_command(instance_id, script).await?;
        info!(instance = %instance_id, command_id = %command_id, "remote command sent");

        let started = Instant::now();
        loop {
            tokio::time::sleep(self.poll_interval).await;

            let invocation = self
                .control
                .command_status(instance_id, &command_id)
                .await?;

            match invocation.status {
                CommandStatus::Success => {
                    info!(instance = %instance_id, command_id = %command_id, "remote command succeeded");
                    return Ok(invocation.stdout);
                }
                status if status.is_terminal() => {
                    return Err(CloudrefError::RemoteCommandError {
                        instance: instance_id.to_string(),
                        command_id,
                        status,
                    });
                }
                status => {
                    debug!(
                        instance = %instance_id,
                        command_id = %command_id,
                        %status,
                        "remote command still running"
                    );
                }
            }

            let waited = started.elapsed();
            if waited >= self.timeout {
                return Err(CloudrefError::DeadlineExceeded {
                    instance: instance_id.to_string(),
                    command_id,
                    waited,
                });
            }
        }
    }
}

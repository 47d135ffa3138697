// src/remote/readiness.rs

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cloud::ControlPlane;
use crate::errors::{CloudrefError, Result};
use crate::types::InstanceState;

/// How long to wait for an instance to become usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            interval: Duration::from_secs(60),
        }
    }
}

/// Wait until `instance_id` is running and its control-channel agent is
/// registered.
///
/// Both conditions are re-checked on every attempt. Control plane errors are
/// returned immediately. There is no sleep after the last attempt.
pub async fn wait_ready(
    control: &dyn ControlPlane,
    instance_id: &str,
    policy: ReadinessPolicy,
) -> Result<()> {
    for attempt in 1..=policy.max_attempts {
        let state = control.describe_instance(instance_id).await?;

        if state == InstanceState::Running {
            if control.agent_registered(instance_id).await? {
                info!(instance = %instance_id, attempt, "instance ready");
                return Ok(());
            }
            debug!(instance = %instance_id, attempt, "agent not registered yet");
        } else {
            debug!(instance = %instance_id, attempt, %state, "instance not running yet");
        }

        if attempt < policy.max_attempts {
            warn!(
                instance = %instance_id,
                attempt,
                max_attempts = policy.max_attempts,
                "instance not ready, retrying in {:?}",
                policy.interval
            );
            tokio::time::sleep(policy.interval).await;
        }
    }

    Err(CloudrefError::NotReady {
        instance: instance_id.to_string(),
        attempts: policy.max_attempts,
    })
}

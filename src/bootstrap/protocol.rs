// src/bootstrap/protocol.rs

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::bootstrap::probe::init_probe_script;
use crate::cloud::ControlPlane;
use crate::config::ConfigFile;
use crate::errors::{CloudrefError, Result};
use crate::remote::{ReadinessPolicy, RemoteExecutor, wait_ready};
use crate::secrets::{SecretClient, SecretData};
use crate::stage::StageOutputs;

/// Key of the credential inside the stored secret.
pub const TOKEN_KEY: &str = "token";

/// Root credential of the secret service. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapOutcome {
    /// True only for the run that initialized the service.
    pub initialized_now: bool,
    pub credential: Credential,
    pub instance_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    Unresolved,
    InstanceLocated,
    InstanceReady,
    CommandExecuted,
    Persisted,
    Retrieved,
    Done,
}

impl fmt::Display for BootstrapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BootstrapState::Unresolved => "unresolved",
            BootstrapState::InstanceLocated => "instance-located",
            BootstrapState::InstanceReady => "instance-ready",
            BootstrapState::CommandExecuted => "command-executed",
            BootstrapState::Persisted => "persisted",
            BootstrapState::Retrieved => "retrieved",
            BootstrapState::Done => "done",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapSettings {
    /// Stage output holding the instance group name.
    pub output_key: String,
    /// Fully expanded secret name.
    pub secret_name: String,
    pub service_cli: String,
    pub readiness: ReadinessPolicy,
}

impl BootstrapSettings {
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        let timings = cfg
            .bootstrap
            .timings()
            .map_err(CloudrefError::ConfigError)?;
        Ok(Self {
            output_key: cfg.bootstrap.output_key.clone(),
            secret_name: cfg.cluster.expand(&cfg.bootstrap.secret_name),
            service_cli: cfg.bootstrap.service_cli.clone(),
            readiness: ReadinessPolicy {
                max_attempts: cfg.bootstrap.ready_attempts,
                interval: timings.ready_interval,
            },
        })
    }
}

/// Locate the service instance, initialize it once, and persist or recover
/// the root credential.
#[derive(Clone)]
pub struct BootstrapProtocol {
    control: Arc<dyn ControlPlane>,
    executor: RemoteExecutor,
    secrets: SecretClient,
    settings: BootstrapSettings,
}

impl BootstrapProtocol {
    pub fn new(
        control: Arc<dyn ControlPlane>,
        executor: RemoteExecutor,
        secrets: SecretClient,
        settings: BootstrapSettings,
    ) -> Self {
        Self {
            control,
            executor,
            secrets,
            settings,
        }
    }

    pub fn settings(&self) -> &BootstrapSettings {
        &self.settings
    }

    fn advance(state: &mut BootstrapState, next: BootstrapState) {
        debug!(from = %state, to = %next, "bootstrap transition");
        *state = next;
    }

    pub async fn run(&self, outputs: &StageOutputs) -> Result<BootstrapOutcome> {
        let mut state = BootstrapState::Unresolved;

        let group_name = self.group_name(outputs)?;
        let instance_id = self.locate(&group_name).await?;
        Self::advance(&mut state, BootstrapState::InstanceLocated);

        wait_ready(self.control.as_ref(), &instance_id, self.settings.readiness).await?;
        Self::advance(&mut state, BootstrapState::InstanceReady);

        let script = init_probe_script(&self.settings.service_cli);
        let output = self.executor.run(&instance_id, &script).await?;
        Self::advance(&mut state, BootstrapState::CommandExecuted);

        let token = output.trim();
        let (credential, initialized_now) = if !token.is_empty() {
            let mut data = SecretData::new();
            data.insert(TOKEN_KEY.to_string(), token.to_string());
            self.secrets.put(&self.settings.secret_name, &data).await?;
            Self::advance(&mut state, BootstrapState::Persisted);
            info!(instance = %instance_id, secret = %self.settings.secret_name, "service initialized; root credential stored");
            (Credential::new(token), true)
        } else {
            let credential = self.recover().await?;
            Self::advance(&mut state, BootstrapState::Retrieved);
            info!(instance = %instance_id, secret = %self.settings.secret_name, "service already initialized; root credential recovered");
            (credential, false)
        };

        Self::advance(&mut state, BootstrapState::Done);
        Ok(BootstrapOutcome {
            initialized_now,
            credential,
            instance_id,
        })
    }

    fn group_name(&self, outputs: &StageOutputs) -> Result<String> {
        let key = &self.settings.output_key;
        let output = outputs
            .get(key)
            .ok_or_else(|| CloudrefError::ResolutionError(format!("stage output '{key}' is missing")))?;
        output.as_str().map(str::to_string).ok_or_else(|| {
            CloudrefError::ResolutionError(format!("stage output '{key}' is not a string"))
        })
    }

    async fn locate(&self, group_name: &str) -> Result<String> {
        let group = self
            .control
            .describe_instance_group(group_name)
            .await?
            .ok_or_else(|| {
                CloudrefError::ResolutionError(format!("instance group '{group_name}' not found"))
            })?;

        group.representative().map(str::to_string).ok_or_else(|| {
            CloudrefError::ResolutionError(format!("instance group '{group_name}' has no members"))
        })
    }

    /// Fetch the credential persisted by the run that initialized the service.
    pub async fn recover(&self) -> Result<Credential> {
        let name = &self.settings.secret_name;
        let data = match self.secrets.get(name).await {
            Ok(data) => data,
            Err(CloudrefError::NotFound(_)) => {
                return Err(CloudrefError::InconsistentState(format!(
                    "service is initialized but secret '{name}' does not exist"
                )));
            }
            Err(e) => return Err(e),
        };

        data.get(TOKEN_KEY).map(Credential::new).ok_or_else(|| {
            CloudrefError::InconsistentState(format!(
                "secret '{name}' has no '{TOKEN_KEY}' entry"
            ))
        })
    }
}

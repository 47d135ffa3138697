// src/orchestrator/mod.rs

//! Wave-based provisioning and teardown of the stage graph.

use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

use crate::bootstrap::{BootstrapProtocol, BootstrapSettings, Credential};
use crate::cloud::ControlPlane;
use crate::config::{ConfigFile, names};
use crate::dag::{Stage, StageGraph};
use crate::errors::{CloudrefError, Result};
use crate::exec::ProcessRunner;
use crate::overlay::{self, Overlay};
use crate::remote::RemoteExecutor;
use crate::secrets::{SecretBackend, SecretClient};
use crate::stage::{StageResult, StageRunner};
use crate::types::StageMode;

pub mod fanout;
pub mod report;

pub use report::{ProvisionReport, StageRun};

/// Values the orchestrator reports but does not act on.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorSettings {
    pub secret_store_addr: String,
    /// Compute cluster name, when the graph has a compute cluster stage.
    pub compute_cluster: Option<String>,
}

#[derive(Clone)]
pub struct Orchestrator {
    graph: Arc<StageGraph>,
    runner: StageRunner,
    bootstrap: Option<BootstrapProtocol>,
    overlay: Arc<dyn Overlay>,
    settings: Arc<OrchestratorSettings>,
}

impl Orchestrator {
    pub fn new(
        graph: StageGraph,
        runner: StageRunner,
        overlay: Arc<dyn Overlay>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            graph: Arc::new(graph),
            runner,
            bootstrap: None,
            overlay,
            settings: Arc::new(settings),
        }
    }

    pub fn with_bootstrap(mut self, protocol: BootstrapProtocol) -> Self {
        self.bootstrap = Some(protocol);
        self
    }

    /// Wire every collaborator from a validated config.
    pub fn from_config(
        cfg: &ConfigFile,
        graph: StageGraph,
        processes: Arc<dyn ProcessRunner>,
        control: Arc<dyn ControlPlane>,
        secrets: Arc<dyn SecretBackend>,
    ) -> Result<Self> {
        let timings = cfg
            .bootstrap
            .timings()
            .map_err(CloudrefError::ConfigError)?;

        let runner = StageRunner::new(processes.clone(), cfg.tool.binary.clone());
        let overlay = overlay::from_config(processes, cfg.overlay.as_ref())?;
        let settings = OrchestratorSettings {
            secret_store_addr: cfg.cluster.secret_store_addr(),
            compute_cluster: graph
                .get(names::COMPUTE_CLUSTER)
                .map(|_| cfg.cluster.cluster_name.clone()),
        };

        let executor = RemoteExecutor::new(control.clone())
            .with_poll_interval(timings.poll_interval)
            .with_timeout(timings.command_timeout);
        let protocol = BootstrapProtocol::new(
            control,
            executor,
            SecretClient::new(secrets),
            BootstrapSettings::from_config(cfg)?,
        );

        Ok(Self::new(graph, runner, overlay, settings).with_bootstrap(protocol))
    }

    pub fn graph(&self) -> &StageGraph {
        &self.graph
    }

    fn stage(&self, name: &str) -> Result<Stage> {
        self.graph
            .get(name)
            .cloned()
            .ok_or_else(|| CloudrefError::ConfigError(format!("unknown stage '{name}'")))
    }

    /// Create every stage, wave by wave, and bootstrap the secret service.
    pub async fn up(&self) -> Result<ProvisionReport> {
        let secret_name = self
            .bootstrap
            .as_ref()
            .map(|b| b.settings().secret_name.clone())
            .unwrap_or_default();
        let mut report = ProvisionReport::new(
            secret_name,
            self.settings.secret_store_addr.clone(),
            self.settings.compute_cluster.clone(),
        );

        for (index, wave) in self.graph.waves().into_iter().enumerate() {
            let names: Vec<String> = wave.iter().map(|s| s.name.clone()).collect();
            info!(wave = index, stages = ?names, "applying wave");

            let this = self.clone();
            let runs = fanout::run_wave(wave, move |stage| {
                let this = this.clone();
                async move { this.apply_branch(stage).await }
            })
            .await?;

            for run in runs {
                report.record(run);
            }
        }

        Ok(report)
    }

    /// Destroy every stage, dependents before their dependencies.
    pub async fn down(&self) -> Result<Vec<StageRun>> {
        let mut all = Vec::new();

        for (index, wave) in self.graph.waves().into_iter().enumerate().rev() {
            let names: Vec<String> = wave.iter().map(|s| s.name.clone()).collect();
            info!(wave = index, stages = ?names, "destroying wave");

            let this = self.clone();
            let runs = fanout::run_wave(wave, move |stage| {
                let this = this.clone();
                async move { this.destroy_branch(stage).await }
            })
            .await?;
            all.extend(runs);
        }

        Ok(all)
    }

    /// Plan every stage, one at a time, in dependency order.
    pub async fn plan(&self) -> Result<Vec<StageResult>> {
        let mut results = Vec::new();
        for stage in self.graph.topo_order() {
            results.push(self.runner.run(&stage, StageMode::Plan, &[]).await?);
        }
        Ok(results)
    }

    /// Run one stage on its own. Dependencies are not run.
    pub async fn run_stage(&self, name: &str, mode: StageMode) -> Result<StageRun> {
        let stage = self.stage(name)?;
        match mode {
            StageMode::Plan => Ok(StageRun::completed(
                self.runner.run(&stage, StageMode::Plan, &[]).await?,
            )),
            StageMode::Apply => self.apply_branch(stage).await,
            StageMode::Destroy => self.destroy_branch(stage).await,
        }
    }

    fn bootstraps(&self, stage: &Stage) -> Option<&BootstrapProtocol> {
        if stage.bootstrap {
            self.bootstrap.as_ref()
        } else {
            None
        }
    }

    async fn apply_branch(&self, stage: Stage) -> Result<StageRun> {
        let Some(protocol) = self.bootstraps(&stage) else {
            let result = self.runner.run(&stage, StageMode::Apply, &[]).await?;
            return Ok(StageRun::completed(result));
        };

        let (result, bootstrap) = self
            .with_overlay(async {
                let result = self.runner.run(&stage, StageMode::Apply, &[]).await?;
                let bootstrap = protocol.run(&result.outputs).await?;
                Ok::<_, CloudrefError>((result, bootstrap))
            })
            .await?;

        let mut run = StageRun::completed(result);
        run.bootstrap = Some(bootstrap);
        Ok(run)
    }

    async fn destroy_branch(&self, stage: Stage) -> Result<StageRun> {
        if let Some(check) = &stage.exists_check {
            if !self.runner.check(&stage, check).await? {
                info!(stage = %stage.name, "resources already gone; skipping destroy");
                return Ok(StageRun::skipped(stage.name.clone(), StageMode::Destroy));
            }
        }

        let protocol = match self.bootstraps(&stage) {
            Some(protocol) if !stage.pre_destroy.is_empty() => protocol,
            _ => return self.drain_and_destroy(&stage, &[]).await,
        };

        let env = match protocol.recover().await {
            Ok(credential) => self.credential_env(&credential),
            Err(CloudrefError::InconsistentState(reason)) => {
                warn!(stage = %stage.name, %reason, "no stored root credential; draining without it");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        self.with_overlay(self.drain_and_destroy(&stage, &env))
            .await
    }

    /// Run `body` with the overlay up. The overlay is stopped afterwards
    /// whatever happened, including a start that failed halfway; the first
    /// error wins.
    async fn with_overlay<T>(&self, body: impl Future<Output = Result<T>>) -> Result<T> {
        if let Err(e) = self.overlay.start().await {
            if let Err(stop_err) = self.overlay.stop().await {
                warn!(error = %stop_err, "overlay stop after failed start also failed");
            }
            return Err(e);
        }

        let outcome = body.await;
        let stopped = self.overlay.stop().await;
        let value = outcome?;
        stopped?;
        Ok(value)
    }

    fn credential_env(&self, credential: &Credential) -> Vec<(String, String)> {
        vec![
            ("VAULT_ADDR".to_string(), self.settings.secret_store_addr.clone()),
            ("VAULT_SKIP_VERIFY".to_string(), "true".to_string()),
            ("VAULT_TOKEN".to_string(), credential.expose().to_string()),
        ]
    }

    async fn drain_and_destroy(&self, stage: &Stage, env: &[(String, String)]) -> Result<StageRun> {
        for hook in &stage.pre_destroy {
            self.runner
                .run_hook(stage, StageMode::Destroy, hook, env)
                .await?;
        }

        if let Some(grace) = stage.drain_grace {
            info!(stage = %stage.name, ?grace, "waiting for drained resources to go away");
            tokio::time::sleep(grace).await;
        }

        let result = self.runner.run(stage, StageMode::Destroy, &[]).await?;
        Ok(StageRun::completed(result))
    }
}

// src/orchestrator/report.rs

use std::fmt;

use crate::bootstrap::BootstrapOutcome;
use crate::stage::StageResult;
use crate::types::StageMode;

/// What happened to one stage in one run.
#[derive(Debug, Clone, PartialEq)]
pub struct StageRun {
    pub stage: String,
    pub mode: StageMode,
    /// `None` when the stage was skipped (resources already gone).
    pub result: Option<StageResult>,
    pub bootstrap: Option<BootstrapOutcome>,
}

impl StageRun {
    pub fn completed(result: StageResult) -> Self {
        Self {
            stage: result.stage.clone(),
            mode: result.mode,
            result: Some(result),
            bootstrap: None,
        }
    }

    pub fn skipped(stage: impl Into<String>, mode: StageMode) -> Self {
        Self {
            stage: stage.into(),
            mode,
            result: None,
            bootstrap: None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.result.is_none()
    }
}

/// Summary of a successful `up`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionReport {
    /// Stages in the order they completed.
    pub stages: Vec<StageRun>,
    pub bootstrap: Option<BootstrapOutcome>,
    pub secret_name: String,
    pub secret_store_addr: String,
    pub compute_cluster: Option<String>,
}

impl ProvisionReport {
    pub fn new(secret_name: String, secret_store_addr: String, compute_cluster: Option<String>) -> Self {
        Self {
            stages: Vec::new(),
            bootstrap: None,
            secret_name,
            secret_store_addr,
            compute_cluster,
        }
    }

    pub fn record(&mut self, run: StageRun) {
        if run.bootstrap.is_some() {
            self.bootstrap = run.bootstrap.clone();
        }
        self.stages.push(run);
    }

    pub fn stage(&self, name: &str) -> Option<&StageRun> {
        self.stages.iter().find(|s| s.stage == name)
    }
}

impl fmt::Display for ProvisionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Provisioning complete.")?;
        let names: Vec<&str> = self.stages.iter().map(|s| s.stage.as_str()).collect();
        writeln!(f, "  stages: {}", names.join(", "))?;

        if let Some(outcome) = &self.bootstrap {
            let state = if outcome.initialized_now {
                "initialized by this run"
            } else {
                "already initialized"
            };
            writeln!(f, "  secret store: {} ({state})", self.secret_store_addr)?;
            writeln!(f, "  root credential: secret '{}'", self.secret_name)?;
        }

        if let Some(cluster) = &self.compute_cluster {
            writeln!(
                f,
                "  compute cluster credentials: aws eks update-kubeconfig --name {cluster} --alias {cluster}"
            )?;
        }
        Ok(())
    }
}

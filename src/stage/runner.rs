// src/stage/runner.rs

use std::sync::Arc;

use tracing::{info, warn};

use crate::dag::Stage;
use crate::errors::{CloudrefError, Result};
use crate::exec::{Invocation, ProcessRunner, shell};
use crate::stage::outputs::{StageOutputs, StageResult, parse_outputs};
use crate::types::StageMode;

/// Drives `init` / `plan` / `apply` / `destroy` / `output` for a stage.
#[derive(Clone)]
pub struct StageRunner {
    runner: Arc<dyn ProcessRunner>,
    binary: String,
}

impl StageRunner {
    pub fn new(runner: Arc<dyn ProcessRunner>, binary: impl Into<String>) -> Self {
        Self {
            runner,
            binary: binary.into(),
        }
    }

    fn tool(&self, stage: &Stage) -> Invocation {
        Invocation::new(self.binary.clone()).cwd(stage.dir.clone())
    }

    /// Arguments of the main tool call for `mode`, without the binary.
    pub fn mode_args(stage: &Stage, mode: StageMode, extra_args: &[String]) -> Vec<String> {
        let mut args = match mode {
            StageMode::Plan => vec!["plan".to_string(), "-input=false".to_string()],
            StageMode::Apply => vec![
                "apply".to_string(),
                "-auto-approve".to_string(),
                "-input=false".to_string(),
            ],
            StageMode::Destroy => vec![
                "destroy".to_string(),
                "-auto-approve".to_string(),
                "-input=false".to_string(),
            ],
        };
        args.extend(stage.variable_args());
        args.extend(extra_args.iter().cloned());
        args
    }

    pub async fn run(
        &self,
        stage: &Stage,
        mode: StageMode,
        extra_args: &[String],
    ) -> Result<StageResult> {
        info!(stage = %stage.name, %mode, dir = %stage.dir.display(), "running stage");

        self.init(stage).await?;

        if matches!(mode, StageMode::Plan | StageMode::Apply) {
            for hook in &stage.pre_apply {
                self.run_hook(stage, mode, hook, &[]).await?;
            }
        }

        let inv = self
            .tool(stage)
            .args(Self::mode_args(stage, mode, extra_args));
        let out = self.runner.run(&inv).await?;
        if !out.success() {
            return Err(CloudrefError::ExecutionError {
                stage: stage.name.clone(),
                mode,
                message: out.failure_message(),
            });
        }

        let mut result = StageResult::new(stage.name.clone(), mode);
        if mode == StageMode::Apply {
            result.outputs = self.outputs(stage).await?;
        }

        info!(stage = %stage.name, %mode, outputs = result.outputs.len(), "stage finished");
        Ok(result)
    }

    async fn init(&self, stage: &Stage) -> Result<()> {
        let inv = self.tool(stage).args(["init", "-input=false"]);
        let out = self.runner.run(&inv).await?;
        if !out.success() {
            return Err(CloudrefError::InitError {
                stage: stage.name.clone(),
                message: out.failure_message(),
            });
        }
        Ok(())
    }

    async fn outputs(&self, stage: &Stage) -> Result<StageOutputs> {
        // Outputs may include sensitive values.
        let inv = self.tool(stage).args(["output", "-json"]).sensitive();
        let out = self.runner.run(&inv).await?;
        if !out.success() {
            return Err(CloudrefError::OutputParseError {
                stage: stage.name.clone(),
                message: out.failure_message(),
            });
        }
        parse_outputs(&out.stdout).map_err(|e| CloudrefError::OutputParseError {
            stage: stage.name.clone(),
            message: e.to_string(),
        })
    }

    /// Run a shell hook in the stage directory. Failure is an `ExecutionError`
    /// attributed to `mode`.
    pub async fn run_hook(
        &self,
        stage: &Stage,
        mode: StageMode,
        hook: &str,
        env: &[(String, String)],
    ) -> Result<()> {
        let mut inv = shell(hook).cwd(stage.dir.clone());
        for (key, value) in env {
            inv = inv.env(key.clone(), value.clone());
        }

        let out = self.runner.run(&inv).await?;
        if !out.success() {
            warn!(stage = %stage.name, %mode, hook, "hook failed");
            return Err(CloudrefError::ExecutionError {
                stage: stage.name.clone(),
                mode,
                message: format!("hook `{hook}`: {}", out.failure_message()),
            });
        }
        Ok(())
    }

    /// Run a probe command in the stage directory and report whether it
    /// exited successfully.
    pub async fn check(&self, stage: &Stage, cmd: &str) -> Result<bool> {
        let out = self.runner.run(&shell(cmd).cwd(stage.dir.clone())).await?;
        Ok(out.success())
    }
}

// src/dag/stage.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::model::{ClusterSection, StageConfig};
use crate::errors::{CloudrefError, Result};
use crate::types::parse_duration;

/// One unit of infrastructure-as-code work, with templates expanded and the
/// working directory resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub name: String,
    pub dir: PathBuf,
    pub var_files: Vec<String>,
    pub vars: BTreeMap<String, String>,
    /// Direct dependencies (names in `after = [...]`).
    pub deps: Vec<String>,
    pub pre_apply: Vec<String>,
    pub pre_destroy: Vec<String>,
    pub exists_check: Option<String>,
    pub drain_grace: Option<Duration>,
    pub bootstrap: bool,
}

impl Stage {
    pub fn from_config(
        name: &str,
        cfg: &StageConfig,
        cluster: &ClusterSection,
        source: &Path,
    ) -> Result<Self> {
        let drain_grace = cfg
            .drain_grace
            .as_deref()
            .map(parse_duration)
            .transpose()
            .map_err(|e| CloudrefError::ConfigError(format!("stage '{name}' drain_grace: {e}")))?;

        Ok(Self {
            name: name.to_string(),
            dir: source.join(&cfg.dir),
            var_files: cfg.var_files.clone(),
            vars: cfg
                .vars
                .iter()
                .map(|(k, v)| (k.clone(), cluster.expand(v)))
                .collect(),
            deps: cfg.after.clone(),
            pre_apply: cfg.pre_apply.iter().map(|c| cluster.expand(c)).collect(),
            pre_destroy: cfg.pre_destroy.iter().map(|c| cluster.expand(c)).collect(),
            exists_check: cfg.exists_check.as_deref().map(|c| cluster.expand(c)),
            drain_grace,
            bootstrap: cfg.bootstrap,
        })
    }

    /// Variable arguments passed to plan/apply/destroy, in a stable order:
    /// var files first, then `-var` pairs sorted by key.
    pub fn variable_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.var_files.len() + self.vars.len() * 2);
        for file in &self.var_files {
            args.push(format!("-var-file={file}"));
        }
        for (key, value) in &self.vars {
            args.push("-var".to_string());
            args.push(format!("{key}={value}"));
        }
        args
    }
}

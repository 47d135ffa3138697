// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{CloudrefError, Result};
use crate::types::parse_duration;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = CloudrefError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_stages(cfg)?;
    validate_bootstrap(cfg)?;
    validate_overlay(cfg)?;
    validate_stage_settings(cfg)?;
    validate_stage_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_stages(cfg: &RawConfigFile) -> Result<()> {
    if cfg.stage.is_empty() {
        return Err(CloudrefError::ConfigError(
            "config must contain at least one [stage.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_bootstrap(cfg: &RawConfigFile) -> Result<()> {
    if cfg.bootstrap.ready_attempts == 0 {
        return Err(CloudrefError::ConfigError(
            "[bootstrap].ready_attempts must be >= 1 (got 0)".to_string(),
        ));
    }

    let timings = cfg
        .bootstrap
        .timings()
        .map_err(CloudrefError::ConfigError)?;
    if timings.poll_interval.is_zero() {
        return Err(CloudrefError::ConfigError(
            "[bootstrap].poll_interval must be greater than zero".to_string(),
        ));
    }

    if cfg.bootstrap.output_key.trim().is_empty() {
        return Err(CloudrefError::ConfigError(
            "[bootstrap].output_key must not be empty".to_string(),
        ));
    }

    let bootstrap_stages: Vec<&str> = cfg
        .stage
        .iter()
        .filter(|(_, s)| s.bootstrap)
        .map(|(name, _)| name.as_str())
        .collect();
    if bootstrap_stages.len() > 1 {
        return Err(CloudrefError::ConfigError(format!(
            "at most one stage may set `bootstrap = true` (found {:?})",
            bootstrap_stages
        )));
    }

    Ok(())
}

fn validate_overlay(cfg: &RawConfigFile) -> Result<()> {
    if let Some(overlay) = &cfg.overlay {
        parse_duration(&overlay.probe_interval)
            .map_err(|e| CloudrefError::ConfigError(format!("[overlay].probe_interval: {e}")))?;
        if overlay.probe_addr.is_some() && overlay.probe_attempts == 0 {
            return Err(CloudrefError::ConfigError(
                "[overlay].probe_attempts must be >= 1 when probe_addr is set".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_stage_settings(cfg: &RawConfigFile) -> Result<()> {
    for (name, stage) in cfg.stage.iter() {
        if stage.dir.trim().is_empty() {
            return Err(CloudrefError::ConfigError(format!(
                "stage '{}' has an empty `dir`",
                name
            )));
        }
        if let Some(grace) = &stage.drain_grace {
            parse_duration(grace).map_err(|e| {
                CloudrefError::ConfigError(format!("stage '{}' drain_grace: {}", name, e))
            })?;
        }
    }
    Ok(())
}

fn validate_stage_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, stage) in cfg.stage.iter() {
        for dep in stage.after.iter() {
            if !cfg.stage.contains_key(dep) {
                return Err(CloudrefError::ConfigError(format!(
                    "stage '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
            if dep == name {
                return Err(CloudrefError::ConfigError(format!(
                    "stage '{}' cannot depend on itself in `after`",
                    name
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dep -> stage.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.stage.keys() {
        graph.add_node(name.as_str());
    }

    for (name, stage) in cfg.stage.iter() {
        for dep in stage.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(CloudrefError::DagCycle(format!(
                "cycle detected in stage graph involving stage '{}'",
                node
            )))
        }
    }
}

// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use tracing::debug;

use crate::cli::VarOverride;
use crate::config::model::ConfigFile;
use crate::dag::stage::Stage;
use crate::errors::{CloudrefError, Result};

/// Internal node structure: the stage plus its direct dependents.
#[derive(Debug, Clone)]
struct StageNode {
    stage: Stage,
    dependents: Vec<String>,
}

/// In-memory stage graph keyed by stage name.
///
/// Acyclicity is validated in `config::validate`; here we keep adjacency
/// information for scheduling and diagnostics.
#[derive(Debug, Clone)]
pub struct StageGraph {
    nodes: BTreeMap<String, StageNode>,
}

impl StageGraph {
    /// Build the graph from a validated [`ConfigFile`].
    ///
    /// `source` is the root that stage directories are relative to, and
    /// `overrides` are `--var STAGE.KEY=VALUE` pairs from the command line.
    pub fn from_config(cfg: &ConfigFile, source: &Path, overrides: &[VarOverride]) -> Result<Self> {
        let mut nodes: BTreeMap<String, StageNode> = BTreeMap::new();

        for (name, sc) in cfg.stage.iter() {
            let stage = Stage::from_config(name, sc, &cfg.cluster, source)?;
            nodes.insert(
                name.clone(),
                StageNode {
                    stage,
                    dependents: Vec::new(),
                },
            );
        }

        for ov in overrides {
            let node = nodes.get_mut(&ov.stage).ok_or_else(|| {
                CloudrefError::ConfigError(format!(
                    "--var {}.{}: unknown stage '{}'",
                    ov.stage, ov.key, ov.stage
                ))
            })?;
            node.stage.vars.insert(ov.key.clone(), ov.value.clone());
        }

        let edges: Vec<(String, String)> = nodes
            .values()
            .flat_map(|n| {
                n.stage
                    .deps
                    .iter()
                    .map(|dep| (dep.clone(), n.stage.name.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();
        for (dep, dependent) in edges {
            if let Some(dep_node) = nodes.get_mut(&dep) {
                dep_node.dependents.push(dependent);
            }
        }

        Ok(Self { nodes })
    }

    pub fn get(&self, name: &str) -> Option<&Stage> {
        self.nodes.get(name).map(|n| &n.stage)
    }

    /// Immediate dependencies of a stage.
    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.stage.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a stage.
    pub fn dependents_of(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Layer the graph into waves: every stage appears in the first wave
    /// after all of its dependencies. Stages inside a wave are sorted by name.
    pub fn waves(&self) -> Vec<Vec<Stage>> {
        let mut remaining: BTreeMap<&str, usize> = self
            .nodes
            .iter()
            .map(|(name, n)| (name.as_str(), n.stage.deps.len()))
            .collect();
        let mut waves = Vec::new();

        loop {
            let ready: BTreeSet<&str> = remaining
                .iter()
                .filter(|(_, pending)| **pending == 0)
                .map(|(name, _)| *name)
                .collect();
            if ready.is_empty() {
                break;
            }

            for name in &ready {
                remaining.remove(name);
                for dependent in self.dependents_of(name) {
                    if let Some(pending) = remaining.get_mut(dependent.as_str()) {
                        *pending = pending.saturating_sub(1);
                    }
                }
            }

            let wave: Vec<Stage> = ready
                .iter()
                .filter_map(|name| self.get(name).cloned())
                .collect();
            debug!(stages = ?ready, "computed stage wave");
            waves.push(wave);
        }

        // Only reachable with an unvalidated cyclic graph.
        if !remaining.is_empty() {
            debug!(stuck = ?remaining.keys().collect::<Vec<_>>(), "stages left out of waves");
        }

        waves
    }

    /// Stages in a dependency-respecting order.
    pub fn topo_order(&self) -> Vec<Stage> {
        self.waves().into_iter().flatten().collect()
    }
}

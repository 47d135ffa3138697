#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use cloudref::config::ConfigFile;
use cloudref::dag::StageGraph;
use cloudref::orchestrator::Orchestrator;
use cloudref::secrets::MemorySecretBackend;
use cloudref_test_utils::{FakeControlPlane, FakeProcessRunner};

pub use cloudref_test_utils::{init_tracing, with_timeout};

pub const SOURCE: &str = "/src";

/// Orchestrator wired to fakes, plus handles to inspect them.
pub struct Harness {
    pub processes: Arc<FakeProcessRunner>,
    pub cloud: Arc<FakeControlPlane>,
    pub secrets: MemorySecretBackend,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub fn new(cfg: &ConfigFile, cloud: FakeControlPlane) -> Self {
        Self::with_secrets(cfg, cloud, MemorySecretBackend::new())
    }

    pub fn with_secrets(cfg: &ConfigFile, cloud: FakeControlPlane, secrets: MemorySecretBackend) -> Self {
        init_tracing();
        let processes = Arc::new(FakeProcessRunner::new());
        let cloud = Arc::new(cloud);
        let graph = StageGraph::from_config(cfg, Path::new(SOURCE), &[]).expect("graph");
        let orchestrator = Orchestrator::from_config(
            cfg,
            graph,
            processes.clone(),
            cloud.clone(),
            Arc::new(secrets.clone()),
        )
        .expect("orchestrator");

        Self {
            processes,
            cloud,
            secrets,
            orchestrator,
        }
    }

    /// Make `<tool> output -json` in `dir` report the instance group name.
    pub fn group_output(&self, dir: &str, group: &str) {
        let json = format!(
            r#"{{"autoscaling_group_id":{{"sensitive":false,"type":"string","value":"{group}"}}}}"#
        );
        self.processes
            .stdout(&format!("{dir}: tofu output -json"), &json);
    }
}

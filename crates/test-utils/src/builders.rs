#![allow(dead_code)]

use std::collections::BTreeMap;

use cloudref::config::{
    AwsSection, BootstrapSection, ClusterSection, ConfigFile, OverlaySection, RawConfigFile,
    StageConfig, ToolSection, names,
};

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts with no stages; timings default to values small enough for tests.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        let bootstrap = BootstrapSection {
            ready_attempts: 3,
            ready_interval: "1s".to_string(),
            poll_interval: "10ms".to_string(),
            command_timeout: "1s".to_string(),
            ..BootstrapSection::default()
        };

        Self {
            config: RawConfigFile {
                cluster: ClusterSection::default(),
                aws: AwsSection::default(),
                tool: ToolSection::default(),
                bootstrap,
                overlay: None,
                stage: BTreeMap::new(),
            },
        }
    }

    /// network -> (compute-cluster, secret-store-cluster), with stage
    /// directories named `network`, `compute` and `secrets`.
    pub fn reference_graph() -> Self {
        Self::new()
            .with_stage(names::NETWORK, StageConfigBuilder::new("network").build())
            .with_stage(
                names::COMPUTE_CLUSTER,
                StageConfigBuilder::new("compute")
                    .after(names::NETWORK)
                    .build(),
            )
            .with_stage(
                names::SECRET_STORE_CLUSTER,
                StageConfigBuilder::new("secrets")
                    .after(names::NETWORK)
                    .bootstrap()
                    .build(),
            )
    }

    pub fn with_stage(mut self, name: &str, stage: StageConfig) -> Self {
        self.config.stage.insert(name.to_string(), stage);
        self
    }

    pub fn repo_name(mut self, repo: &str) -> Self {
        self.config.cluster.repo_name = repo.to_string();
        self
    }

    pub fn secret_name(mut self, template: &str) -> Self {
        self.config.bootstrap.secret_name = template.to_string();
        self
    }

    pub fn readiness(mut self, attempts: u32, interval: &str) -> Self {
        self.config.bootstrap.ready_attempts = attempts;
        self.config.bootstrap.ready_interval = interval.to_string();
        self
    }

    pub fn polling(mut self, interval: &str, timeout: &str) -> Self {
        self.config.bootstrap.poll_interval = interval.to_string();
        self.config.bootstrap.command_timeout = timeout.to_string();
        self
    }

    pub fn tool(mut self, binary: &str) -> Self {
        self.config.tool.binary = binary.to_string();
        self
    }

    pub fn overlay(mut self, start_cmd: &str, stop_cmd: &str) -> Self {
        self.config.overlay = Some(OverlaySection {
            tailnet: None,
            hostname: None,
            start_cmd: Some(start_cmd.to_string()),
            stop_cmd: Some(stop_cmd.to_string()),
            probe_addr: None,
            probe_attempts: 1,
            probe_interval: "1s".to_string(),
        });
        self
    }

    /// Require the overlay to make `addr` reachable before it counts as up.
    pub fn overlay_probe(mut self, addr: &str) -> Self {
        if let Some(overlay) = self.config.overlay.as_mut() {
            overlay.probe_addr = Some(addr.to_string());
        }
        self
    }

    pub fn modify_stage(mut self, name: &str, f: impl FnOnce(&mut StageConfig)) -> Self {
        if let Some(stage) = self.config.stage.get_mut(name) {
            f(stage);
        }
        self
    }

    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `StageConfig`.
pub struct StageConfigBuilder {
    stage: StageConfig,
}

impl StageConfigBuilder {
    pub fn new(dir: &str) -> Self {
        Self {
            stage: StageConfig::new(dir),
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.stage.after.push(dep.to_string());
        self
    }

    pub fn var_file(mut self, file: &str) -> Self {
        self.stage.var_files.push(file.to_string());
        self
    }

    pub fn var(mut self, key: &str, value: &str) -> Self {
        self.stage.vars.insert(key.to_string(), value.to_string());
        self
    }

    pub fn pre_apply(mut self, cmd: &str) -> Self {
        self.stage.pre_apply.push(cmd.to_string());
        self
    }

    pub fn pre_destroy(mut self, cmd: &str) -> Self {
        self.stage.pre_destroy.push(cmd.to_string());
        self
    }

    pub fn exists_check(mut self, cmd: &str) -> Self {
        self.stage.exists_check = Some(cmd.to_string());
        self
    }

    pub fn drain_grace(mut self, grace: &str) -> Self {
        self.stage.drain_grace = Some(grace.to_string());
        self
    }

    pub fn bootstrap(mut self) -> Self {
        self.stage.bootstrap = true;
        self
    }

    pub fn build(self) -> StageConfig {
        self.stage
    }
}

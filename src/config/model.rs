// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::types::parse_duration;

/// Well-known stage names of the default graph.
pub mod names {
    pub const NETWORK: &str = "network";
    pub const COMPUTE_CLUSTER: &str = "compute-cluster";
    pub const SECRET_STORE_CLUSTER: &str = "secret-store-cluster";
}

/// Configuration exactly as deserialized from TOML, before validation.
///
/// ```toml
/// [cluster]
/// repo_name = "cloud-native-ref"
/// cluster_name = "mycluster-0"
/// region = "eu-west-3"
///
/// [bootstrap]
/// ready_attempts = 5
/// ready_interval = "1m"
///
/// [stage.network]
/// dir = "opentofu/network"
/// var_files = ["variables.tfvars"]
///
/// [stage.compute-cluster]
/// dir = "opentofu/eks"
/// after = ["network"]
/// ```
///
/// Every section is optional. When no `[stage.*]` table is present the
/// built-in network / compute-cluster / secret-store-cluster graph is used.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub cluster: ClusterSection,

    #[serde(default)]
    pub aws: AwsSection,

    #[serde(default)]
    pub tool: ToolSection,

    #[serde(default)]
    pub bootstrap: BootstrapSection,

    #[serde(default)]
    pub overlay: Option<OverlaySection>,

    #[serde(default = "default_stages")]
    pub stage: BTreeMap<String, StageConfig>,
}

/// Validated configuration. Construct through `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub cluster: ClusterSection,
    pub aws: AwsSection,
    pub tool: ToolSection,
    pub bootstrap: BootstrapSection,
    pub overlay: Option<OverlaySection>,
    pub stage: BTreeMap<String, StageConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            cluster: raw.cluster,
            aws: raw.aws,
            tool: raw.tool,
            bootstrap: raw.bootstrap,
            overlay: raw.overlay,
            stage: raw.stage,
        }
    }

    /// Name of the stage whose apply is followed by the bootstrap protocol.
    pub fn bootstrap_stage(&self) -> Option<&str> {
        self.stage
            .iter()
            .find(|(_, s)| s.bootstrap)
            .map(|(name, _)| name.as_str())
    }
}

/// `[cluster]` section: identity of the deployment.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterSection {
    #[serde(default = "default_repo_name")]
    pub repo_name: String,

    /// Managed compute cluster name (used in hooks and the final report).
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,

    #[serde(default = "default_region")]
    pub region: String,

    /// Directory the stage `dir` entries are relative to.
    #[serde(default = "default_source")]
    pub source: String,

    #[serde(default = "default_private_domain")]
    pub private_domain: String,

    /// Address of the secret service; derived from `private_domain` if unset.
    #[serde(default)]
    pub secret_store_addr: Option<String>,
}

fn default_repo_name() -> String {
    "cloud-native-ref".to_string()
}

fn default_cluster_name() -> String {
    "mycluster-0".to_string()
}

fn default_region() -> String {
    "eu-west-3".to_string()
}

fn default_source() -> String {
    ".".to_string()
}

fn default_private_domain() -> String {
    "priv.cloud.ogenki.io".to_string()
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            repo_name: default_repo_name(),
            cluster_name: default_cluster_name(),
            region: default_region(),
            source: default_source(),
            private_domain: default_private_domain(),
            secret_store_addr: None,
        }
    }
}

impl ClusterSection {
    /// Substitute `{repo_name}`, `{cluster_name}`, `{region}` and
    /// `{private_domain}` placeholders.
    pub fn expand(&self, template: &str) -> String {
        template
            .replace("{repo_name}", &self.repo_name)
            .replace("{cluster_name}", &self.cluster_name)
            .replace("{region}", &self.region)
            .replace("{private_domain}", &self.private_domain)
    }

    pub fn secret_store_addr(&self) -> String {
        match &self.secret_store_addr {
            Some(addr) => addr.clone(),
            None => format!("https://bao.{}:8200", self.private_domain),
        }
    }
}

/// `[aws]` section: how to reach the cloud control plane.
#[derive(Debug, Clone, Deserialize)]
pub struct AwsSection {
    /// AWS CLI executable.
    #[serde(default = "default_aws_cli")]
    pub cli: String,

    #[serde(default)]
    pub profile: Option<String>,
}

fn default_aws_cli() -> String {
    "aws".to_string()
}

impl Default for AwsSection {
    fn default() -> Self {
        Self {
            cli: default_aws_cli(),
            profile: None,
        }
    }
}

/// `[tool]` section: the infrastructure-as-code engine.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolSection {
    #[serde(default = "default_tool_binary")]
    pub binary: String,
}

fn default_tool_binary() -> String {
    "tofu".to_string()
}

impl Default for ToolSection {
    fn default() -> Self {
        Self {
            binary: default_tool_binary(),
        }
    }
}

/// `[bootstrap]` section: secret service initialization settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapSection {
    /// Stage output holding the instance group name.
    #[serde(default = "default_output_key")]
    pub output_key: String,

    /// Secret name template for the root credential.
    #[serde(default = "default_secret_name")]
    pub secret_name: String,

    /// CLI of the clustered service on the instance (`bao` or `vault`).
    #[serde(default = "default_service_cli")]
    pub service_cli: String,

    #[serde(default = "default_ready_attempts")]
    pub ready_attempts: u32,

    #[serde(default = "default_ready_interval")]
    pub ready_interval: String,

    /// Interval between remote command status polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,

    /// Upper bound on waiting for a remote command.
    #[serde(default = "default_command_timeout")]
    pub command_timeout: String,
}

fn default_output_key() -> String {
    "autoscaling_group_id".to_string()
}

fn default_secret_name() -> String {
    "openbao/{repo_name}/tokens/root".to_string()
}

fn default_service_cli() -> String {
    "bao".to_string()
}

fn default_ready_attempts() -> u32 {
    5
}

fn default_ready_interval() -> String {
    "1m".to_string()
}

fn default_poll_interval() -> String {
    "5s".to_string()
}

fn default_command_timeout() -> String {
    "15m".to_string()
}

impl Default for BootstrapSection {
    fn default() -> Self {
        Self {
            output_key: default_output_key(),
            secret_name: default_secret_name(),
            service_cli: default_service_cli(),
            ready_attempts: default_ready_attempts(),
            ready_interval: default_ready_interval(),
            poll_interval: default_poll_interval(),
            command_timeout: default_command_timeout(),
        }
    }
}

/// Parsed durations of the `[bootstrap]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapTimings {
    pub ready_interval: Duration,
    pub poll_interval: Duration,
    pub command_timeout: Duration,
}

impl BootstrapSection {
    pub fn timings(&self) -> Result<BootstrapTimings, String> {
        Ok(BootstrapTimings {
            ready_interval: parse_duration(&self.ready_interval)
                .map_err(|e| format!("[bootstrap].ready_interval: {e}"))?,
            poll_interval: parse_duration(&self.poll_interval)
                .map_err(|e| format!("[bootstrap].poll_interval: {e}"))?,
            command_timeout: parse_duration(&self.command_timeout)
                .map_err(|e| format!("[bootstrap].command_timeout: {e}"))?,
        })
    }
}

/// `[overlay]` section: private connectivity needed before reaching
/// instances that are not publicly routable.
#[derive(Debug, Clone, Deserialize)]
pub struct OverlaySection {
    #[serde(default)]
    pub tailnet: Option<String>,

    #[serde(default)]
    pub hostname: Option<String>,

    #[serde(default)]
    pub start_cmd: Option<String>,

    #[serde(default)]
    pub stop_cmd: Option<String>,

    /// `host:port` that must accept TCP connections once the overlay is up.
    #[serde(default)]
    pub probe_addr: Option<String>,

    #[serde(default = "default_probe_attempts")]
    pub probe_attempts: u32,

    #[serde(default = "default_probe_interval")]
    pub probe_interval: String,
}

fn default_probe_attempts() -> u32 {
    10
}

fn default_probe_interval() -> String {
    "6s".to_string()
}

/// `[stage.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StageConfig {
    /// Working directory, relative to `[cluster].source`.
    pub dir: String,

    /// Stages that must complete before this one starts.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub var_files: Vec<String>,

    #[serde(default)]
    pub vars: BTreeMap<String, String>,

    /// Shell commands run in the stage directory after init, before
    /// plan/apply.
    #[serde(default)]
    pub pre_apply: Vec<String>,

    /// Drain commands run before destroy.
    #[serde(default)]
    pub pre_destroy: Vec<String>,

    /// Command that exits non-zero when the stage's resources are already gone;
    /// destroy is skipped in that case.
    #[serde(default)]
    pub exists_check: Option<String>,

    /// Pause between the drain commands and destroy (e.g. `"60s"`).
    #[serde(default)]
    pub drain_grace: Option<String>,

    /// Run the secret store bootstrap protocol after apply.
    #[serde(default)]
    pub bootstrap: bool,
}

impl StageConfig {
    pub fn new(dir: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            after: Vec::new(),
            var_files: Vec::new(),
            vars: BTreeMap::new(),
            pre_apply: Vec::new(),
            pre_destroy: Vec::new(),
            exists_check: None,
            drain_grace: None,
            bootstrap: false,
        }
    }
}

/// Built-in stage graph: network first, then the compute cluster and the
/// secret store cluster side by side.
pub fn default_stages() -> BTreeMap<String, StageConfig> {
    let var_files = vec!["variables.tfvars".to_string()];
    let mut stages = BTreeMap::new();

    let mut network = StageConfig::new("opentofu/network");
    network.var_files = var_files.clone();
    stages.insert(names::NETWORK.to_string(), network);

    let mut compute = StageConfig::new("opentofu/eks");
    compute.after = vec![names::NETWORK.to_string()];
    compute.var_files = var_files.clone();
    compute.exists_check =
        Some("aws eks describe-cluster --name {cluster_name} --region {region}".to_string());
    compute.pre_destroy = vec![
        "aws eks update-kubeconfig --name {cluster_name} --region {region}".to_string(),
        "kubectl scale deployments --all --namespace=flux-system --replicas=0".to_string(),
        "kubectl delete nodepools --all".to_string(),
        "kubectl delete gateways --all".to_string(),
        "kubectl delete epis --all --all-namespaces".to_string(),
    ];
    compute.drain_grace = Some("60s".to_string());
    stages.insert(names::COMPUTE_CLUSTER.to_string(), compute);

    let mut secret_store = StageConfig::new("opentofu/openbao/cluster");
    secret_store.after = vec![names::NETWORK.to_string()];
    secret_store.var_files = var_files;
    secret_store.bootstrap = true;
    stages.insert(names::SECRET_STORE_CLUSTER.to_string(), secret_store);

    stages
}

// src/overlay.rs

//! Private overlay network needed to reach instances that are not publicly
//! routable.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::config::OverlaySection;
use crate::errors::{CloudrefError, Result};
use crate::exec::{BoxFuture, Invocation, ProcessRunner, shell};
use crate::types::parse_duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

pub trait Overlay: Send + Sync {
    fn start(&self) -> BoxFuture<'_, Result<()>>;
    fn stop(&self) -> BoxFuture<'_, Result<()>>;
}

/// Used when no `[overlay]` section is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOverlay;

impl Overlay for NoOverlay {
    fn start(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn stop(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Overlay driven by external start/stop commands.
pub struct CommandOverlay {
    runner: Arc<dyn ProcessRunner>,
    start_cmd: Option<String>,
    stop_cmd: Option<String>,
    env: Vec<(String, String)>,
    probe_addr: Option<String>,
    probe_attempts: u32,
    probe_interval: Duration,
}

impl CommandOverlay {
    pub fn from_config(runner: Arc<dyn ProcessRunner>, cfg: &OverlaySection) -> Result<Self> {
        let probe_interval = parse_duration(&cfg.probe_interval)
            .map_err(|e| CloudrefError::ConfigError(format!("[overlay].probe_interval: {e}")))?;

        let mut env = Vec::new();
        if let Some(tailnet) = &cfg.tailnet {
            env.push(("TS_TAILNET".to_string(), tailnet.clone()));
        }
        if let Some(hostname) = &cfg.hostname {
            env.push(("TS_HOSTNAME".to_string(), hostname.clone()));
        }

        Ok(Self {
            runner,
            start_cmd: cfg.start_cmd.clone(),
            stop_cmd: cfg.stop_cmd.clone(),
            env,
            probe_addr: cfg.probe_addr.clone(),
            probe_attempts: cfg.probe_attempts,
            probe_interval,
        })
    }

    fn invocation(&self, cmd: &str) -> Invocation {
        self.env
            .iter()
            .fold(shell(cmd), |inv, (k, v)| inv.env(k.clone(), v.clone()))
    }

    async fn run_cmd(&self, what: &str, cmd: &str) -> Result<()> {
        let out = self.runner.run(&self.invocation(cmd)).await?;
        if !out.success() {
            return Err(CloudrefError::Other(anyhow::anyhow!(
                "overlay {what} command failed: {}",
                out.failure_message()
            )));
        }
        Ok(())
    }

    async fn wait_reachable(&self, addr: &str) -> Result<()> {
        for attempt in 1..=self.probe_attempts {
            match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
                Ok(Ok(_)) => {
                    info!(%addr, attempt, "overlay reachable");
                    return Ok(());
                }
                Ok(Err(e)) => debug!(%addr, attempt, error = %e, "overlay probe failed"),
                Err(_) => debug!(%addr, attempt, "overlay probe timed out"),
            }
            if attempt < self.probe_attempts {
                tokio::time::sleep(self.probe_interval).await;
            }
        }

        Err(CloudrefError::Other(anyhow::anyhow!(
            "overlay address {addr} unreachable after {} attempts",
            self.probe_attempts
        )))
    }

    async fn start_inner(&self) -> Result<()> {
        if let Some(cmd) = &self.start_cmd {
            info!("starting overlay");
            self.run_cmd("start", cmd).await?;
        }
        if let Some(addr) = &self.probe_addr {
            self.wait_reachable(addr).await?;
        }
        Ok(())
    }

    async fn stop_inner(&self) -> Result<()> {
        if let Some(cmd) = &self.stop_cmd {
            info!("stopping overlay");
            if let Err(e) = self.run_cmd("stop", cmd).await {
                warn!(error = %e, "overlay stop failed");
                return Err(e);
            }
        }
        Ok(())
    }
}

impl Overlay for CommandOverlay {
    fn start(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.start_inner())
    }

    fn stop(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.stop_inner())
    }
}

/// Build the overlay for an optional `[overlay]` section.
pub fn from_config(
    runner: Arc<dyn ProcessRunner>,
    cfg: Option<&OverlaySection>,
) -> Result<Arc<dyn Overlay>> {
    match cfg {
        Some(section) => Ok(Arc::new(CommandOverlay::from_config(runner, section)?)),
        None => Ok(Arc::new(NoOverlay)),
    }
}

// src/cloud/mod.rs

//! Cloud control plane abstraction.
//!
//! The bootstrap protocol only needs a handful of queries: resolve an
//! instance group, check an instance, and run a script over the control
//! channel. [`ControlPlane`] captures exactly that so tests can simulate a
//! cluster without touching a real account.

pub mod aws;

pub use aws::{AwsCli, AwsControlPlane, AwsFailure};

use crate::errors::Result;
use crate::exec::BoxFuture;
use crate::types::{CommandStatus, InstanceState};

/// A named group of instances. The first member is the representative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceGroup {
    pub name: String,
    pub members: Vec<String>,
}

impl InstanceGroup {
    pub fn representative(&self) -> Option<&str> {
        self.members.first().map(|s| s.as_str())
    }
}

/// Status of one command invocation on one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub status: CommandStatus,
    /// Captured stdout, complete once `status` is `Success`.
    pub stdout: String,
}

pub trait ControlPlane: Send + Sync {
    /// `Ok(None)` when no group with that name exists.
    fn describe_instance_group<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Option<InstanceGroup>>>;

    fn describe_instance<'a>(&'a self, instance_id: &'a str) -> BoxFuture<'a, Result<InstanceState>>;

    /// Whether the instance's control-channel agent is registered and online.
    fn agent_registered<'a>(&'a self, instance_id: &'a str) -> BoxFuture<'a, Result<bool>>;

    /// Dispatch a shell script; returns the command id.
    fn send_command<'a>(
        &'a self,
        instance_id: &'a str,
        script: &'a str,
    ) -> BoxFuture<'a, Result<String>>;

    fn command_status<'a>(
        &'a self,
        instance_id: &'a str,
        command_id: &'a str,
    ) -> BoxFuture<'a, Result<CommandInvocation>>;
}

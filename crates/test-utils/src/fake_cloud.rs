use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use cloudref::cloud::{CommandInvocation, ControlPlane, InstanceGroup};
use cloudref::errors::{CloudrefError, Result};
use cloudref::exec::BoxFuture;
use cloudref::types::{CommandStatus, InstanceState};

/// Pops the front until a single value remains, which then repeats.
#[derive(Debug, Clone)]
struct Sequence<T: Clone>(VecDeque<T>);

impl<T: Clone> Sequence<T> {
    fn new(values: Vec<T>) -> Self {
        Self(values.into())
    }

    fn next(&mut self) -> Option<T> {
        if self.0.len() > 1 {
            self.0.pop_front()
        } else {
            self.0.front().cloned()
        }
    }
}

#[derive(Debug, Default)]
struct State {
    groups: BTreeMap<String, Vec<String>>,
    instances: BTreeMap<String, Sequence<InstanceState>>,
    agents: BTreeMap<String, Sequence<bool>>,
    describe_error: Option<String>,

    /// Root token the service hands out on first initialization.
    token: String,
    initialized: bool,
    /// Stdout for scripts that are not the init probe.
    script_output: String,
    statuses: Vec<CommandStatus>,

    commands: BTreeMap<String, (Sequence<CommandStatus>, String)>,
    sent: Vec<(String, String)>,
    describe_calls: usize,
    status_polls: usize,
}

/// Simulated control plane with a clustered secret service.
///
/// The init probe (any script containing `operator init`) prints the token
/// the first time it runs and an empty line afterwards, like the real
/// service does once initialized.
#[derive(Debug, Default)]
pub struct FakeControlPlane {
    state: Mutex<State>,
}

impl FakeControlPlane {
    pub fn new() -> Self {
        let fake = Self::default();
        fake.state.lock().unwrap().statuses = vec![CommandStatus::Success];
        fake
    }

    /// One group with one running, registered instance and an uninitialized
    /// service that will hand out `token`.
    pub fn ready(group: &str, instance: &str, token: &str) -> Self {
        Self::new()
            .with_group(group, &[instance])
            .with_instance(instance, vec![InstanceState::Running], vec![true])
            .with_token(token)
    }

    pub fn with_group(self, name: &str, members: &[&str]) -> Self {
        self.state.lock().unwrap().groups.insert(
            name.to_string(),
            members.iter().map(|m| m.to_string()).collect(),
        );
        self
    }

    /// Successive `describe_instance` / `agent_registered` answers; the last
    /// one repeats.
    pub fn with_instance(self, id: &str, states: Vec<InstanceState>, registered: Vec<bool>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.instances.insert(id.to_string(), Sequence::new(states));
            state.agents.insert(id.to_string(), Sequence::new(registered));
        }
        self
    }

    pub fn with_token(self, token: &str) -> Self {
        self.state.lock().unwrap().token = token.to_string();
        self
    }

    pub fn already_initialized(self) -> Self {
        self.state.lock().unwrap().initialized = true;
        self
    }

    pub fn with_script_output(self, stdout: &str) -> Self {
        self.state.lock().unwrap().script_output = stdout.to_string();
        self
    }

    /// Statuses reported by successive polls of each dispatched command.
    pub fn with_command_statuses(self, statuses: Vec<CommandStatus>) -> Self {
        self.state.lock().unwrap().statuses = statuses;
        self
    }

    pub fn failing_describe(self, message: &str) -> Self {
        self.state.lock().unwrap().describe_error = Some(message.to_string());
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().unwrap().initialized
    }

    pub fn describe_calls(&self) -> usize {
        self.state.lock().unwrap().describe_calls
    }

    pub fn status_polls(&self) -> usize {
        self.state.lock().unwrap().status_polls
    }

    /// `(instance, script)` of every dispatched command.
    pub fn sent_commands(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().sent.clone()
    }

    fn group(&self, name: &str) -> Result<Option<InstanceGroup>> {
        let state = self.state.lock().unwrap();
        Ok(state.groups.get(name).map(|members| InstanceGroup {
            name: name.to_string(),
            members: members.clone(),
        }))
    }

    fn instance(&self, id: &str) -> Result<InstanceState> {
        let mut state = self.state.lock().unwrap();
        state.describe_calls += 1;
        if let Some(msg) = state.describe_error.clone() {
            return Err(CloudrefError::ControlPlaneError(msg));
        }
        state
            .instances
            .get_mut(id)
            .and_then(|seq| seq.next())
            .ok_or_else(|| CloudrefError::ControlPlaneError(format!("instance {id} not found")))
    }

    fn registered(&self, id: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        Ok(state
            .agents
            .get_mut(id)
            .and_then(|seq| seq.next())
            .unwrap_or(false))
    }

    fn send(&self, id: &str, script: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.sent.push((id.to_string(), script.to_string()));

        let stdout = if script.contains("operator init") {
            if state.initialized {
                "\n".to_string()
            } else {
                state.initialized = true;
                format!("{}\n", state.token)
            }
        } else {
            state.script_output.clone()
        };

        let command_id = format!("cmd-{}", state.sent.len());
        let statuses = Sequence::new(state.statuses.clone());
        state.commands.insert(command_id.clone(), (statuses, stdout));
        Ok(command_id)
    }

    fn status(&self, command_id: &str) -> Result<CommandInvocation> {
        let mut state = self.state.lock().unwrap();
        state.status_polls += 1;
        let (statuses, stdout) = state.commands.get_mut(command_id).ok_or_else(|| {
            CloudrefError::ControlPlaneError(format!("unknown command {command_id}"))
        })?;
        let status = statuses.next().unwrap_or(CommandStatus::Success);
        let stdout = if status == CommandStatus::Success {
            stdout.clone()
        } else {
            String::new()
        };
        Ok(CommandInvocation { status, stdout })
    }
}

impl ControlPlane for FakeControlPlane {
    fn describe_instance_group<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Option<InstanceGroup>>> {
        Box::pin(async move { self.group(name) })
    }

    fn describe_instance<'a>(&'a self, instance_id: &'a str) -> BoxFuture<'a, Result<InstanceState>> {
        Box::pin(async move { self.instance(instance_id) })
    }

    fn agent_registered<'a>(&'a self, instance_id: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { self.registered(instance_id) })
    }

    fn send_command<'a>(
        &'a self,
        instance_id: &'a str,
        script: &'a str,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move { self.send(instance_id, script) })
    }

    fn command_status<'a>(
        &'a self,
        _instance_id: &'a str,
        command_id: &'a str,
    ) -> BoxFuture<'a, Result<CommandInvocation>> {
        Box::pin(async move { self.status(command_id) })
    }
}

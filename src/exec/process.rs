// src/exec/process.rs

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::exec::BoxFuture;

/// A fully described process to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Arguments or output may contain credentials; only the program name is logged.
    pub sensitive: bool,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            sensitive: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// The command line, space separated. Used by fakes to match invocations.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sensitive {
            write!(f, "{} <redacted>", self.program)
        } else {
            f.write_str(&self.command_line())
        }
    }
}

/// Build a `sh -c <cmd>` invocation (`cmd /C` on Windows).
pub fn shell(cmd: impl Into<String>) -> Invocation {
    let cmd = cmd.into();
    if cfg!(windows) {
        Invocation::new("cmd").arg("/C").arg(cmd)
    } else {
        Invocation::new("sh").arg("-c").arg(cmd)
    }
}

/// Captured result of a finished process.
///
/// A non-zero exit is not an error here; callers decide what it means.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Short failure description: exit code plus trimmed stderr.
    pub fn failure_message(&self) -> String {
        let code = self
            .code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("exit code {code}")
        } else {
            format!("exit code {code}: {stderr}")
        }
    }
}

/// Runs processes to completion.
pub trait ProcessRunner: Send + Sync {
    fn run<'a>(&'a self, invocation: &'a Invocation) -> BoxFuture<'a, Result<ProcessOutput>>;
}

/// Production runner backed by `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessRunner for TokioProcessRunner {
    fn run<'a>(&'a self, invocation: &'a Invocation) -> BoxFuture<'a, Result<ProcessOutput>> {
        Box::pin(run_invocation(invocation))
    }
}

async fn run_invocation(inv: &Invocation) -> Result<ProcessOutput> {
    info!(cmd = %inv, cwd = ?inv.cwd, "starting process");

    let mut cmd = Command::new(&inv.program);
    cmd.args(&inv.args)
        .envs(inv.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &inv.cwd {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn()?;

    // Drain both pipes concurrently so neither buffer fills up.
    let stdout_task = child.stdout.take().map(read_all);
    let stderr_task = child.stderr.take().map(read_all);

    let status = child.wait().await?;

    let stdout = decode(&inv.program, "stdout", collect(stdout_task).await?, !inv.sensitive);
    let stderr = decode(&inv.program, "stderr", collect(stderr_task).await?, true);

    info!(
        program = %inv.program,
        exit_code = ?status.code(),
        success = status.success(),
        "process exited"
    );

    Ok(ProcessOutput {
        code: status.code(),
        stdout,
        stderr,
    })
}

fn read_all<R>(mut pipe: R) -> JoinHandle<std::io::Result<Vec<u8>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf).await?;
        Ok(buf)
    })
}

async fn collect(task: Option<JoinHandle<std::io::Result<Vec<u8>>>>) -> Result<Vec<u8>> {
    match task {
        Some(handle) => {
            let bytes = handle
                .await
                .map_err(|e| anyhow::anyhow!("output reader task failed: {e}"))??;
            Ok(bytes)
        }
        None => Ok(Vec::new()),
    }
}

/// Decode captured output. Invalid UTF-8 is replaced rather than dropped.
fn decode(program: &str, stream: &str, bytes: Vec<u8>, log_lines: bool) -> String {
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            warn!(program, stream, "output is not valid UTF-8; invalid bytes replaced");
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    };
    if log_lines {
        for line in text.lines() {
            debug!(program, "{stream}: {line}");
        }
    }
    text
}

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use cloudref::errors::Result;
use cloudref::exec::{BoxFuture, Invocation, ProcessOutput, ProcessRunner};

struct Rule {
    pattern: String,
    output: ProcessOutput,
    delay: Duration,
    remaining: Option<usize>,
}

/// One invocation seen by [`FakeProcessRunner`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub invocation: Invocation,
    /// `<cwd>: <command line>`, the string rules match against.
    pub key: String,
    /// Contents of `file://` arguments, read while the call was running.
    pub file_args: Vec<String>,
    pub started: Instant,
    pub finished: Option<Instant>,
}

/// A scripted process runner that:
/// - records every invocation with start/finish instants
/// - answers with the first rule whose pattern is a substring of
///   `<cwd>: <command line>`
/// - succeeds with empty output when no rule matches.
#[derive(Default)]
pub struct FakeProcessRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<RecordedCall>>,
}

pub fn key_of(inv: &Invocation) -> String {
    let cwd = inv
        .cwd
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    format!("{cwd}: {}", inv.command_line())
}

pub fn output(code: i32, stdout: &str, stderr: &str) -> ProcessOutput {
    ProcessOutput {
        code: Some(code),
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    }
}

impl FakeProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&self, pattern: &str, out: ProcessOutput, delay: Duration, remaining: Option<usize>) {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_string(),
            output: out,
            delay,
            remaining,
        });
    }

    pub fn respond(&self, pattern: &str, out: ProcessOutput) -> &Self {
        self.add(pattern, out, Duration::ZERO, None);
        self
    }

    pub fn respond_once(&self, pattern: &str, out: ProcessOutput) -> &Self {
        self.add(pattern, out, Duration::ZERO, Some(1));
        self
    }

    pub fn respond_after(&self, pattern: &str, delay: Duration, out: ProcessOutput) -> &Self {
        self.add(pattern, out, delay, None);
        self
    }

    pub fn stdout(&self, pattern: &str, stdout: &str) -> &Self {
        self.respond(pattern, output(0, stdout, ""))
    }

    pub fn fail(&self, pattern: &str, code: i32, stderr: &str) -> &Self {
        self.respond(pattern, output(code, "", stderr))
    }

    pub fn delay(&self, pattern: &str, delay: Duration) -> &Self {
        self.respond_after(pattern, delay, output(0, "", ""))
    }

    fn pick(&self, key: &str) -> (ProcessOutput, Duration) {
        let mut rules = self.rules.lock().unwrap();
        for rule in rules.iter_mut() {
            if rule.remaining == Some(0) || !key.contains(&rule.pattern) {
                continue;
            }
            if let Some(n) = rule.remaining.as_mut() {
                *n -= 1;
            }
            return (rule.output.clone(), rule.delay);
        }
        (output(0, "", ""), Duration::ZERO)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Keys of all calls, in start order.
    pub fn keys(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.key).collect()
    }

    pub fn calls_matching(&self, pattern: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.key.contains(pattern))
            .collect()
    }

    pub fn was_called(&self, pattern: &str) -> bool {
        !self.calls_matching(pattern).is_empty()
    }

    /// Index of the first call matching `pattern`.
    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.calls().iter().position(|c| c.key.contains(pattern))
    }
}

impl ProcessRunner for FakeProcessRunner {
    fn run<'a>(&'a self, invocation: &'a Invocation) -> BoxFuture<'a, Result<ProcessOutput>> {
        Box::pin(async move {
            let key = key_of(invocation);
            let (out, delay) = self.pick(&key);

            let index = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(RecordedCall {
                    invocation: invocation.clone(),
                    key,
                    file_args: read_file_args(invocation),
                    started: Instant::now(),
                    finished: None,
                });
                calls.len() - 1
            };

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            self.calls.lock().unwrap()[index].finished = Some(Instant::now());
            Ok(out)
        })
    }
}

fn read_file_args(inv: &Invocation) -> Vec<String> {
    inv.args
        .iter()
        .filter_map(|arg| arg.strip_prefix("file://"))
        .filter_map(|path| std::fs::read_to_string(path).ok())
        .collect()
}

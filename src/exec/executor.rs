// src/exec/executor.rs

//! The job executor: render, spawn, forward, wait, classify.
//!
//! ```text
//! Rendering -> Spawning -> Running -> Draining -> Classified
//!     |            |
//!     v            v
//! RenderError  SpawnError
//! ```
//!
//! The executor returns as soon as the process has been waited on. Output
//! forwarders may still be flushing the last lines at that point; they are
//! spawned on the shared [`ForwarderTracker`] so shutdown can wait for them.
//! Returning from [`ProcessExecutor::run`] also tells the forwarders and the
//! stdin writer that the process is gone, so a pipe held open by a
//! backgrounded grandchild cannot keep them alive.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, ChildStderr, ChildStdout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::exec::classify::{ExecutionOutcome, ExitPolicy};
use crate::exec::forward::{
    Diagnostics, LineSink, StderrSink, StdoutSink, StreamKind, TracingDiagnostics, forward_lines,
};
use crate::exec::render::{RenderError, TemplateData, render};
use crate::exec::spawner::{
    OsSpawner, ProcessSpawner, SpawnError, SpawnRequest, SpawnStage, parse_env_entries,
};
use crate::exec::tracker::ForwarderTracker;

/// One job invocation.
#[derive(Debug, Clone, Default)]
pub struct JobRequest {
    pub command_template: String,
    pub line_prefix: String,
    pub template_data: TemplateData,
    /// Written to the child's stdin, followed by a single `\n`.
    pub payload: Vec<u8>,
    /// `KEY=VALUE` entries layered over the dispatcher's environment.
    pub extra_env: Vec<String>,
    pub workdir: Option<PathBuf>,
}

impl JobRequest {
    pub fn new(command_template: impl Into<String>, line_prefix: impl Into<String>) -> Self {
        Self {
            command_template: command_template.into(),
            line_prefix: line_prefix.into(),
            ..Self::default()
        }
    }

    pub fn with_data(mut self, data: TemplateData) -> Self {
        self.template_data = data;
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_env(mut self, entry: impl Into<String>) -> Self {
        self.extra_env.push(entry.into());
        self
    }

    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }
}

/// Runs jobs as child processes.
///
/// Cloning is cheap; clones share sinks, diagnostics and the tracker.
/// Safe to use from many tasks at once.
#[derive(Clone)]
pub struct ProcessExecutor {
    spawner: Arc<dyn ProcessSpawner>,
    stdout_sink: Arc<dyn LineSink>,
    stderr_sink: Arc<dyn LineSink>,
    diagnostics: Arc<dyn Diagnostics>,
    tracker: ForwarderTracker,
    policy: ExitPolicy,
}

impl ProcessExecutor {
    /// Executor wired to real processes and the dispatcher's own stdout/stderr.
    pub fn new(tracker: ForwarderTracker) -> Self {
        Self {
            spawner: Arc::new(OsSpawner),
            stdout_sink: Arc::new(StdoutSink),
            stderr_sink: Arc::new(StderrSink),
            diagnostics: Arc::new(TracingDiagnostics),
            tracker,
            policy: ExitPolicy::default(),
        }
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn ProcessSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn with_sinks(mut self, stdout: Arc<dyn LineSink>, stderr: Arc<dyn LineSink>) -> Self {
        self.stdout_sink = stdout;
        self.stderr_sink = stderr;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_policy(mut self, policy: ExitPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> ExitPolicy {
        self.policy
    }

    pub fn tracker(&self) -> &ForwarderTracker {
        &self.tracker
    }

    /// Run one job to completion and classify how it ended.
    ///
    /// Rendering problems are returned as `Err` and no process is created.
    /// Everything that happens from process setup onwards is an
    /// [`ExecutionOutcome`].
    pub async fn run(&self, job: &JobRequest) -> Result<ExecutionOutcome, RenderError> {
        let command = render(&job.command_template, &job.template_data)?;
        debug!(prefix = %job.line_prefix, command = %command, "rendered job command");

        let env = match parse_env_entries(&job.extra_env) {
            Ok(env) => env,
            Err(e) => return Ok(spawn_failure(SpawnStage::Environment, e)),
        };

        let request = SpawnRequest {
            command: &command,
            env: &env,
            workdir: job.workdir.as_deref(),
        };

        let mut child = match self.spawner.spawn(&request) {
            Ok(child) => child,
            Err(e) => return Ok(spawn_failure(SpawnStage::Start, e)),
        };

        // Without both output pipes the forwarders cannot run; dropping the
        // child here kills it.
        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(out), Some(err)) => (out, err),
            _ => {
                return Ok(spawn_failure(
                    SpawnStage::Pipe,
                    io::Error::other("child output streams were not piped"),
                ));
            }
        };

        // Cancelled on every return path below, including a dropped `run`.
        let exited = CancellationToken::new();
        let _exited_guard = exited.clone().drop_guard();

        self.start_forwarders(&job.line_prefix, stdout, stderr, &exited);

        if let Some(stdin) = child.stdin.take() {
            self.start_stdin_writer(&job.line_prefix, stdin, &job.payload, &exited);
        }

        let status = match child.wait().await {
            Ok(status) => status,
            Err(e) => return Ok(spawn_failure(SpawnStage::Wait, e)),
        };

        let outcome = self.policy.classify(status);
        debug!(
            prefix = %job.line_prefix,
            outcome = outcome.label(),
            "job process exited"
        );
        Ok(outcome)
    }

    fn start_forwarders(
        &self,
        prefix: &str,
        stdout: ChildStdout,
        stderr: ChildStderr,
        exited: &CancellationToken,
    ) {
        {
            let prefix = prefix.to_string();
            let sink = Arc::clone(&self.stdout_sink);
            let diagnostics = Arc::clone(&self.diagnostics);
            let exited = exited.clone();
            self.tracker.spawn(async move {
                let (sink, diagnostics) = (&*sink, &*diagnostics);
                forward_lines(&prefix, StreamKind::Stdout, stdout, sink, diagnostics, &exited)
                    .await
            });
        }

        let prefix = prefix.to_string();
        let sink = Arc::clone(&self.stderr_sink);
        let diagnostics = Arc::clone(&self.diagnostics);
        let exited = exited.clone();
        self.tracker.spawn(async move {
            let (sink, diagnostics) = (&*sink, &*diagnostics);
            forward_lines(&prefix, StreamKind::Stderr, stderr, sink, diagnostics, &exited).await
        });
    }

    /// Feed the payload plus a trailing newline, then close stdin.
    ///
    /// Gives up once the process has exited; nobody is left to read it.
    fn start_stdin_writer(
        &self,
        prefix: &str,
        mut stdin: ChildStdin,
        payload: &[u8],
        exited: &CancellationToken,
    ) {
        let mut input = Vec::with_capacity(payload.len() + 1);
        input.extend_from_slice(payload);
        input.push(b'\n');

        let prefix = prefix.to_string();
        let exited = exited.clone();
        self.tracker.spawn(async move {
            let written = tokio::select! {
                res = stdin.write_all(&input) => res,
                _ = exited.cancelled() => Ok(()),
            };
            if let Err(e) = written {
                // Commands that never read stdin close it early.
                if e.kind() != io::ErrorKind::BrokenPipe {
                    warn!(prefix = %prefix, error = %e, "failed to write payload to job stdin");
                }
            }
        });
    }
}

fn spawn_failure(stage: SpawnStage, source: io::Error) -> ExecutionOutcome {
    ExecutionOutcome::SpawnError(SpawnError::new(stage, source))
}

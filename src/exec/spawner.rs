// src/exec/spawner.rs

//! Process creation.
//!
//! [`ProcessSpawner`] is the seam between the executor and the OS. The
//! production [`OsSpawner`] pipes all three standard streams, applies the
//! job environment on top of the inherited one and asks the kernel to send
//! the child `SIGTERM` if the dispatcher dies first.

use std::fmt;
use std::io;
use std::path::Path;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::{Child, Command};

use crate::exec::render::RenderedCommand;

/// Which step of process setup failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnStage {
    Environment,
    Start,
    Pipe,
    Wait,
}

impl fmt::Display for SpawnStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnStage::Environment => f.write_str("prepare environment for"),
            SpawnStage::Start => f.write_str("start"),
            SpawnStage::Pipe => f.write_str("attach pipes to"),
            SpawnStage::Wait => f.write_str("wait for"),
        }
    }
}

#[derive(Debug, Error)]
#[error("failed to {stage} process: {source}")]
pub struct SpawnError {
    pub stage: SpawnStage,
    #[source]
    pub source: io::Error,
}

impl SpawnError {
    pub fn new(stage: SpawnStage, source: io::Error) -> Self {
        Self { stage, source }
    }
}

/// Everything needed to start one job process.
#[derive(Debug, Clone, Copy)]
pub struct SpawnRequest<'a> {
    pub command: &'a RenderedCommand,
    /// Applied in order on top of the inherited environment; later wins.
    pub env: &'a [(String, String)],
    pub workdir: Option<&'a Path>,
}

/// Starts job processes.
///
/// Implementations must return a child whose stdout and stderr are piped,
/// and should pipe stdin so the payload can be delivered.
pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, request: &SpawnRequest<'_>) -> io::Result<Child>;
}

/// Spawns real OS processes via `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsSpawner;

impl ProcessSpawner for OsSpawner {
    fn spawn(&self, request: &SpawnRequest<'_>) -> io::Result<Child> {
        let mut cmd = Command::new(request.command.program());
        cmd.args(request.command.args())
            .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = request.workdir {
            cmd.current_dir(dir);
        }

        terminate_on_parent_death(&mut cmd);

        cmd.spawn()
    }
}

/// Parse `KEY=VALUE` entries.
///
/// An entry without `=` or with an empty key is rejected.
pub fn parse_env_entries(entries: &[String]) -> io::Result<Vec<(String, String)>> {
    entries
        .iter()
        .map(|entry| match entry.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid environment entry '{entry}' (expected KEY=VALUE)"),
            )),
        })
        .collect()
}

#[cfg(target_os = "linux")]
fn terminate_on_parent_death(cmd: &mut Command) {
    // SAFETY: runs in the forked child before exec; prctl is
    // async-signal-safe and only affects the calling process.
    unsafe {
        cmd.pre_exec(|| {
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM as libc::c_ulong) == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

// No direct equivalent here; `kill_on_drop` covers orderly dispatcher exits only.
#[cfg(not(target_os = "linux"))]
fn terminate_on_parent_death(_cmd: &mut Command) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_entries_split_on_first_equals() {
        let parsed =
            parse_env_entries(&["A=1".to_string(), "B=x=y".to_string(), "C=".to_string()])
                .unwrap();
        assert_eq!(
            parsed,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "x=y".to_string()),
                ("C".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn env_entry_without_equals_is_rejected() {
        let err = parse_env_entries(&["JUSTAKEY".to_string()]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(parse_env_entries(&["=value".to_string()]).is_err());
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let command = RenderedCommand::from_line("/definitely/not/a/real/binary").unwrap();
        let request = SpawnRequest {
            command: &command,
            env: &[],
            workdir: None,
        };
        let err = OsSpawner.spawn(&request).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn child_gets_sigterm_when_its_spawning_thread_exits() {
        let spawning_thread = std::thread::spawn(|| {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let command = RenderedCommand::from_line("sleep 30").unwrap();
                let request = SpawnRequest {
                    command: &command,
                    env: &[],
                    workdir: None,
                };
                let child = OsSpawner.spawn(&request).unwrap();
                let pid = child.id().unwrap() as libc::pid_t;
                // Dropping would SIGKILL it; leave the kill to the kernel.
                std::mem::forget(child);
                pid
            })
        });
        let pid = spawning_thread.join().unwrap();

        let mut status = 0;
        let reaped = unsafe { libc::waitpid(pid, &mut status, 0) };
        assert_eq!(reaped, pid);
        assert!(libc::WIFSIGNALED(status), "child exited normally: {status:#x}");
        assert_eq!(libc::WTERMSIG(status), libc::SIGTERM);
    }
}

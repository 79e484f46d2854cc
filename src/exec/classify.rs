// src/exec/classify.rs

//! Exit status classification.
//!
//! Termination is folded into one numeric space:
//! - normal exit with code `c` -> `c`
//! - killed by signal `s` -> `128 + s`
//!
//! `0` is success, the requeue code (100 unless configured otherwise) asks
//! for the message to be retried, anything else is a failure carrying the
//! code.

use std::process::ExitStatus;

use crate::exec::spawner::SpawnError;

/// Exit code a job uses to ask for its message to be requeued.
pub const REQUEUE_EXIT_CODE: i32 = 100;

/// Offset added to a signal number when a process dies from a signal.
pub const SIGNAL_EXIT_BASE: i32 = 128;

/// Caller-visible result of running one job.
#[derive(Debug)]
pub enum ExecutionOutcome {
    Success,
    Failed { exit_code: i32 },
    Requeue,
    /// The process could not be started (or waited on); never requeued.
    SpawnError(SpawnError),
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success)
    }

    pub fn is_requeue(&self) -> bool {
        matches!(self, ExecutionOutcome::Requeue)
    }

    /// Numeric code when the process actually ran.
    pub fn exit_code(&self, policy: &ExitPolicy) -> Option<i32> {
        match self {
            ExecutionOutcome::Success => Some(0),
            ExecutionOutcome::Failed { exit_code } => Some(*exit_code),
            ExecutionOutcome::Requeue => policy.requeue_code(),
            ExecutionOutcome::SpawnError(_) => None,
        }
    }

    /// Short lowercase name, used in logs and hook environments.
    pub fn label(&self) -> &'static str {
        match self {
            ExecutionOutcome::Success => "success",
            ExecutionOutcome::Failed { .. } => "failed",
            ExecutionOutcome::Requeue => "requeue",
            ExecutionOutcome::SpawnError(_) => "spawn_error",
        }
    }
}

/// Decides which exit code, if any, means "requeue".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitPolicy {
    requeue_code: Option<i32>,
}

impl Default for ExitPolicy {
    fn default() -> Self {
        Self {
            requeue_code: Some(REQUEUE_EXIT_CODE),
        }
    }
}

impl ExitPolicy {
    /// Use `code` as the requeue code; `0` turns the convention off.
    pub fn with_requeue_code(code: i32) -> Self {
        Self {
            requeue_code: (code != 0).then_some(code),
        }
    }

    /// Every non-zero exit is an ordinary failure.
    pub fn without_requeue() -> Self {
        Self { requeue_code: None }
    }

    pub fn requeue_code(&self) -> Option<i32> {
        self.requeue_code
    }

    pub fn classify_code(&self, code: i32) -> ExecutionOutcome {
        if code == 0 {
            ExecutionOutcome::Success
        } else if Some(code) == self.requeue_code {
            ExecutionOutcome::Requeue
        } else {
            ExecutionOutcome::Failed { exit_code: code }
        }
    }

    pub fn classify(&self, status: ExitStatus) -> ExecutionOutcome {
        self.classify_code(exit_code_of(status))
    }
}

/// Fold an exit status into a single number (`128 + signal` for signal deaths).
///
/// Returns `-1` when the status carries neither an exit code nor a signal.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return SIGNAL_EXIT_BASE + signal;
        }
    }

    -1
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    fn exited(code: i32) -> ExitStatus {
        ExitStatus::from_raw(code << 8)
    }

    fn signaled(signal: i32) -> ExitStatus {
        ExitStatus::from_raw(signal)
    }

    #[test]
    fn zero_is_success() {
        assert!(ExitPolicy::default().classify(exited(0)).is_success());
    }

    #[test]
    fn hundred_is_requeue() {
        let outcome = ExitPolicy::default().classify(exited(100));
        assert!(outcome.is_requeue(), "got {outcome:?}");
    }

    #[test]
    fn ordinary_codes_are_failures() {
        let policy = ExitPolicy::default();
        for code in [1, 7, 99, 101, 127] {
            match policy.classify(exited(code)) {
                ExecutionOutcome::Failed { exit_code } => assert_eq!(exit_code, code),
                other => panic!("code {code}: expected Failed, got {other:?}"),
            }
        }
    }

    #[test]
    fn signal_death_is_128_plus_signal() {
        assert_eq!(exit_code_of(signaled(libc::SIGKILL)), 137);
        match ExitPolicy::default().classify(signaled(libc::SIGTERM)) {
            ExecutionOutcome::Failed { exit_code } => assert_eq!(exit_code, 143),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn custom_requeue_code() {
        let policy = ExitPolicy::with_requeue_code(75);
        assert!(policy.classify(exited(75)).is_requeue());
        assert!(matches!(
            policy.classify(exited(100)),
            ExecutionOutcome::Failed { exit_code: 100 }
        ));
    }

    #[test]
    fn disabled_requeue_reports_failure() {
        for policy in [ExitPolicy::without_requeue(), ExitPolicy::with_requeue_code(0)] {
            assert!(matches!(
                policy.classify_code(100),
                ExecutionOutcome::Failed { exit_code: 100 }
            ));
        }
    }

    #[test]
    fn exit_code_reporting() {
        let policy = ExitPolicy::default();
        assert_eq!(ExecutionOutcome::Success.exit_code(&policy), Some(0));
        assert_eq!(ExecutionOutcome::Requeue.exit_code(&policy), Some(100));
        assert_eq!(
            ExecutionOutcome::Failed { exit_code: 3 }.exit_code(&policy),
            Some(3)
        );
    }
}

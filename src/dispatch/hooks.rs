// src/dispatch/hooks.rs

//! Notify hooks: commands run around a job's main command.
//!
//! Hooks go through the same [`ProcessExecutor`] as the job itself. Their
//! outcome is logged and otherwise ignored.

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::TopicConfig;
use crate::exec::{ExecutionOutcome, JobRequest, ProcessExecutor, RenderError, TemplateData};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Start,
    Finish,
    Fault,
}

impl HookKind {
    pub fn label(&self) -> &'static str {
        match self {
            HookKind::Start => "notify-start",
            HookKind::Finish => "notify-finish",
            HookKind::Fault => "notify-fault",
        }
    }

    pub fn template<'a>(&self, topic: &'a TopicConfig) -> Option<&'a str> {
        match self {
            HookKind::Start => topic.notify_start.as_deref(),
            HookKind::Finish => topic.notify_finish.as_deref(),
            HookKind::Fault => topic.notify_fault.as_deref(),
        }
    }
}

/// How the main command ended, in the shape hooks receive it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSummary {
    pub outcome: &'static str,
    /// `-1` when the process never ran.
    pub exit_code: i32,
    succeeded: bool,
}

impl JobSummary {
    pub fn from_result(
        result: &Result<ExecutionOutcome, RenderError>,
        executor: &ProcessExecutor,
    ) -> Self {
        match result {
            Ok(outcome) => Self {
                outcome: outcome.label(),
                exit_code: outcome.exit_code(&executor.policy()).unwrap_or(-1),
                succeeded: outcome.is_success(),
            },
            Err(RenderError::Template(_)) => Self {
                outcome: "template_error",
                exit_code: -1,
                succeeded: false,
            },
            Err(RenderError::EmptyCommand) => Self {
                outcome: "empty_command",
                exit_code: -1,
                succeeded: false,
            },
        }
    }

    pub fn succeeded(&self) -> bool {
        self.succeeded
    }
}

/// Run the `kind` hook of `topic`, if configured.
///
/// `summary` is `None` for the start hook.
pub async fn run_hook(
    executor: &ProcessExecutor,
    kind: HookKind,
    topic: &TopicConfig,
    data: &TemplateData,
    env: &[String],
    payload: &[u8],
    summary: Option<JobSummary>,
) {
    let Some(template) = kind.template(topic) else {
        return;
    };

    let mut data = data.clone();
    let mut env = env.to_vec();
    if let Some(summary) = summary {
        data.insert("ExitCode".into(), Value::from(summary.exit_code));
        data.insert("Outcome".into(), Value::from(summary.outcome));
        env.push(format!("QEXEC_EXIT_CODE={}", summary.exit_code));
        env.push(format!("QEXEC_OUTCOME={}", summary.outcome));
    }

    let job = JobRequest {
        command_template: template.to_string(),
        line_prefix: format!("[{}:{}]", topic.name, kind.label()),
        template_data: data,
        payload: payload.to_vec(),
        extra_env: env,
        workdir: topic.workdir.clone(),
    };

    match executor.run(&job).await {
        Ok(ExecutionOutcome::Success) => {
            debug!(topic = %topic.name, hook = kind.label(), "hook finished");
        }
        Ok(outcome) => {
            warn!(
                topic = %topic.name,
                hook = kind.label(),
                outcome = outcome.label(),
                exit_code = ?outcome.exit_code(&executor.policy()),
                "hook did not succeed"
            );
        }
        Err(e) => {
            warn!(
                topic = %topic.name,
                hook = kind.label(),
                error = %e,
                "hook could not be rendered"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{ExitPolicy, ForwarderTracker};

    fn summarize(result: Result<ExecutionOutcome, RenderError>, policy: ExitPolicy) -> JobSummary {
        let executor = ProcessExecutor::new(ForwarderTracker::new()).with_policy(policy);
        JobSummary::from_result(&result, &executor)
    }

    #[test]
    fn only_a_clean_exit_counts_as_success() {
        let ok = summarize(Ok(ExecutionOutcome::Success), ExitPolicy::default());
        assert!(ok.succeeded());
        assert_eq!(ok.exit_code, 0);

        let failed = summarize(
            Ok(ExecutionOutcome::Failed { exit_code: 3 }),
            ExitPolicy::default(),
        );
        assert!(!failed.succeeded());
        assert_eq!(failed.exit_code, 3);

        let requeued = summarize(Ok(ExecutionOutcome::Requeue), ExitPolicy::default());
        assert!(!requeued.succeeded());
        assert_eq!(requeued.exit_code, 100);
    }

    #[test]
    fn render_failures_never_ran() {
        let summary = summarize(Err(RenderError::EmptyCommand), ExitPolicy::default());
        assert!(!summary.succeeded());
        assert_eq!((summary.outcome, summary.exit_code), ("empty_command", -1));
    }
}

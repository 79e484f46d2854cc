// src/dispatch/handler.rs

//! Per-topic message handling.
//!
//! A [`TopicHandler`] turns a [`Message`] into one job run plus its hooks,
//! and decides the message's [`Disposition`]:
//!
//! | job result                              | hooks         | disposition |
//! |-----------------------------------------|---------------|-------------|
//! | success                                 | finish        | `Finish`    |
//! | requeue, attempts < max_attempts        | none          | `Requeue`   |
//! | requeue, attempts exhausted             | fault         | `Finish`    |
//! | failed / spawn error / render error     | fault         | `Finish`    |
//!
//! The start hook runs before every attempt.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::{ConfigFile, TopicConfig};
use crate::dispatch::hooks::{HookKind, JobSummary, run_hook};
use crate::dispatch::message::{Disposition, Message, job_data, job_env};
use crate::errors::{QexecError, Result};
use crate::exec::{ExecutionOutcome, ForwarderTracker, JobRequest, ProcessExecutor};

/// Result of handling one delivery of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleReport {
    pub disposition: Disposition,
    pub summary: JobSummary,
}

/// Runs messages for a single topic, at most `concurrency` at a time.
#[derive(Clone)]
pub struct TopicHandler {
    topic: Arc<TopicConfig>,
    executor: ProcessExecutor,
    permits: Arc<Semaphore>,
}

impl TopicHandler {
    /// The executor's exit policy is replaced by the topic's.
    pub fn new(topic: TopicConfig, executor: ProcessExecutor) -> Self {
        let executor = executor.with_policy(topic.exit_policy());
        let permits = Arc::new(Semaphore::new(topic.concurrency));
        Self {
            topic: Arc::new(topic),
            executor,
            permits,
        }
    }

    pub fn topic(&self) -> &TopicConfig {
        &self.topic
    }

    pub fn executor(&self) -> &ProcessExecutor {
        &self.executor
    }

    pub async fn handle(&self, msg: &Message) -> HandleReport {
        // The semaphore is never closed, so acquiring only waits.
        let _permit = self.permits.acquire().await;

        let topic = &*self.topic;
        let data = job_data(topic, msg);
        let env = job_env(topic, msg);

        info!(
            topic = %topic.name,
            message_id = %msg.id,
            attempts = msg.attempts,
            "processing message"
        );

        let notify = |kind, summary| {
            run_hook(&self.executor, kind, topic, &data, &env, &msg.body, summary)
        };

        notify(HookKind::Start, None).await;

        let job = JobRequest {
            command_template: topic.cmd.clone(),
            line_prefix: format!("[{}]", topic.name),
            template_data: data.clone(),
            payload: msg.body.clone(),
            extra_env: env.clone(),
            workdir: topic.workdir.clone(),
        };

        let result = self.executor.run(&job).await;
        let summary = JobSummary::from_result(&result, &self.executor);

        match &result {
            Ok(ExecutionOutcome::Success) => {
                info!(topic = %topic.name, message_id = %msg.id, "job finished");
                notify(HookKind::Finish, Some(summary)).await;
                return HandleReport {
                    disposition: Disposition::Finish,
                    summary,
                };
            }
            Ok(ExecutionOutcome::Requeue) if msg.attempts < topic.max_attempts => {
                info!(
                    topic = %topic.name,
                    message_id = %msg.id,
                    attempts = msg.attempts,
                    max_attempts = topic.max_attempts,
                    "job requested requeue"
                );
                return HandleReport {
                    disposition: Disposition::Requeue {
                        delay: topic.requeue_delay,
                    },
                    summary,
                };
            }
            Ok(ExecutionOutcome::Requeue) => {
                warn!(
                    topic = %topic.name,
                    message_id = %msg.id,
                    attempts = msg.attempts,
                    "job requested requeue but max_attempts is reached; giving up"
                );
            }
            Ok(ExecutionOutcome::Failed { exit_code }) => {
                warn!(topic = %topic.name, message_id = %msg.id, exit_code, "job failed");
            }
            Ok(ExecutionOutcome::SpawnError(e)) => {
                error!(
                    topic = %topic.name,
                    message_id = %msg.id,
                    error = %e,
                    "job could not be started"
                );
            }
            Err(e) => {
                error!(
                    topic = %topic.name,
                    message_id = %msg.id,
                    error = %e,
                    "job command could not be rendered"
                );
            }
        }

        notify(HookKind::Fault, Some(summary)).await;
        HandleReport {
            disposition: Disposition::Finish,
            summary,
        }
    }

    /// Handle `msg`, redelivering it locally after each requeue until the
    /// handler finishes it. Stands in for a queue when running from stdin.
    pub async fn handle_until_finished(&self, mut msg: Message) -> HandleReport {
        loop {
            let report = self.handle(&msg).await;
            match report.disposition {
                Disposition::Finish => return report,
                Disposition::Requeue { delay } => {
                    tokio::time::sleep(delay).await;
                    msg = msg.redelivered();
                }
            }
        }
    }
}

/// All topic handlers of a configuration, sharing one executor and tracker.
pub struct Dispatcher {
    handlers: BTreeMap<String, TopicHandler>,
    tracker: ForwarderTracker,
}

impl Dispatcher {
    pub fn from_config(cfg: &ConfigFile, executor: ProcessExecutor) -> Self {
        let tracker = executor.tracker().clone();
        let handlers = cfg
            .topics
            .iter()
            .map(|(name, topic)| {
                (
                    name.clone(),
                    TopicHandler::new(topic.clone(), executor.clone()),
                )
            })
            .collect();
        Self { handlers, tracker }
    }

    pub fn handler(&self, topic: &str) -> Result<&TopicHandler> {
        self.handlers
            .get(topic)
            .ok_or_else(|| QexecError::TopicNotFound(topic.to_string()))
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Wait for every outstanding forwarder of every topic.
    pub async fn shutdown(&self) {
        info!(outstanding = self.tracker.outstanding(), "waiting for job output to drain");
        self.tracker.shutdown().await;
    }
}

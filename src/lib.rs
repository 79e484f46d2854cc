// src/lib.rs

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod exec;
pub mod logging;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::cli::{CliArgs, Command};
use crate::config::{ConfigFile, default_config_path, load_and_validate};
use crate::dispatch::{Dispatcher, Message, TopicHandler};
use crate::exec::{ForwarderTracker, ProcessExecutor};

/// High-level entry point used by `main.rs`.
///
/// Returns `Ok(false)` when at least one message did not finish
/// successfully.
pub async fn run(args: CliArgs) -> Result<bool> {
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let cfg = load_and_validate(&config_path)?;
    debug!(path = %config_path.display(), topics = cfg.topics.len(), "config loaded");

    match args.command {
        Command::Check => {
            print_topics(&cfg);
            Ok(true)
        }
        Command::Run { topic, lines } => {
            let executor = ProcessExecutor::new(ForwarderTracker::new());
            let dispatcher = Dispatcher::from_config(&cfg, executor);
            let handler = dispatcher.handler(&topic)?.clone();

            let all_ok = feed_stdin(&handler, lines).await?;

            dispatcher.shutdown().await;
            Ok(all_ok)
        }
    }
}

/// Read messages from stdin and hand each to `handler`.
///
/// Ctrl-C stops reading; messages already started run to completion.
async fn feed_stdin(handler: &TopicHandler, lines: bool) -> Result<bool> {
    let mut jobs = JoinSet::new();

    let read = async {
        let mut stdin = BufReader::new(tokio::io::stdin());
        if lines {
            let mut reader = stdin.lines();
            let mut seq = 0u64;
            while let Some(line) = reader.next_line().await? {
                if line.trim().is_empty() {
                    continue;
                }
                seq += 1;
                let handler = handler.clone();
                let msg = Message::new(local_id(seq), line);
                jobs.spawn(async move { handler.handle_until_finished(msg).await });
            }
        } else {
            let mut body = Vec::new();
            stdin.read_to_end(&mut body).await?;
            let handler = handler.clone();
            let msg = Message::new(local_id(1), body);
            jobs.spawn(async move { handler.handle_until_finished(msg).await });
        }
        Ok::<(), std::io::Error>(())
    };

    tokio::select! {
        res = read => res?,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted; no further messages will be read");
        }
    }

    let mut all_ok = true;
    let mut handled = 0usize;
    while let Some(joined) = jobs.join_next().await {
        handled += 1;
        match joined {
            Ok(report) => all_ok &= report.summary.succeeded(),
            Err(e) => {
                error!(error = %e, "message task failed");
                all_ok = false;
            }
        }
    }

    info!(topic = %handler.topic().name, handled, all_ok, "all messages handled");
    Ok(all_ok)
}

fn local_id(seq: u64) -> String {
    format!("local-{seq:06}")
}

/// `check` output: every resolved topic.
fn print_topics(cfg: &ConfigFile) {
    println!("qexec config check");
    if let Some(ref id) = cfg.client_id {
        println!("  client_id = {id}");
    }
    println!();

    println!("topics ({}):", cfg.topics.len());
    for (name, topic) in cfg.topics.iter() {
        println!("  - {name}");
        println!("      cmd: {}", topic.cmd);
        println!("      servers: {:?}", topic.servers);
        println!("      channel: {}", topic.channel);
        println!("      concurrency: {}", topic.concurrency);
        println!("      max_attempts: {}", topic.max_attempts);
        println!("      requeue_exit_code: {}", topic.requeue_exit_code);
        if !topic.requeue_delay.is_zero() {
            println!("      requeue_delay: {:?}", topic.requeue_delay);
        }
        if let Some(ref dir) = topic.workdir {
            println!("      workdir: {}", dir.display());
        }
        if let Some(ref s) = topic.notify_start {
            println!("      notify_start: {s}");
        }
        if let Some(ref s) = topic.notify_finish {
            println!("      notify_finish: {s}");
        }
        if let Some(ref s) = topic.notify_fault {
            println!("      notify_fault: {s}");
        }
    }

    debug!("check complete (no execution)");
}

// src/config/validate.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::duration::parse_duration;
use crate::config::model::{ConfigFile, RawConfigFile, RawTopicConfig, TopicConfig};
use crate::errors::{QexecError, Result};

/// Channel used when neither the topic nor `[common]` names one.
pub const DEFAULT_CHANNEL: &str = "qexec";

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::QexecError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_config(&raw)?;

        let mut topics = BTreeMap::new();
        for (name, topic) in raw.topic.iter() {
            topics.insert(name.clone(), resolve_topic(&raw, name, topic)?);
        }

        Ok(ConfigFile::new_unchecked(raw.common.client_id, topics))
    }
}

/// Check the invariants that do not depend on a single topic.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_topics(cfg)?;
    validate_defaults(cfg)?;
    Ok(())
}

fn ensure_has_topics(cfg: &RawConfigFile) -> Result<()> {
    if cfg.topic.is_empty() {
        return Err(QexecError::ConfigError(
            "config must contain at least one [topic.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_defaults(cfg: &RawConfigFile) -> Result<()> {
    let d = &cfg.default;
    check_concurrency("[default]", d.concurrency)?;
    check_max_attempts("[default]", d.max_attempts)?;
    check_requeue_code("[default]", d.requeue_exit_code)?;
    parse_delay("[default]", &d.requeue_delay)?;
    Ok(())
}

fn resolve_topic(cfg: &RawConfigFile, name: &str, raw: &RawTopicConfig) -> Result<TopicConfig> {
    let section = format!("[topic.{name}]");

    let workdir = raw
        .workdir
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from);

    let cmd = raw.cmd.trim();
    if cmd.is_empty() {
        return Err(QexecError::ConfigError(format!(
            "{section}: `cmd` is not defined"
        )));
    }

    let servers = match raw.servers.as_deref() {
        Some(s) if !s.trim().is_empty() => split_servers(s),
        _ => split_servers(&cfg.common.servers),
    };
    if servers.is_empty() {
        return Err(QexecError::ConfigError(format!(
            "{section}: no queue server defined; set `servers` here or in [common]"
        )));
    }

    let channel = raw
        .channel
        .clone()
        .or_else(|| cfg.common.channel.clone())
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CHANNEL.to_string());

    let concurrency = raw.concurrency.unwrap_or(cfg.default.concurrency);
    check_concurrency(&section, concurrency)?;

    let max_attempts = raw.max_attempts.unwrap_or(cfg.default.max_attempts);
    check_max_attempts(&section, max_attempts)?;

    let requeue_exit_code = raw
        .requeue_exit_code
        .unwrap_or(cfg.default.requeue_exit_code);
    check_requeue_code(&section, requeue_exit_code)?;

    let requeue_delay = parse_delay(
        &section,
        raw.requeue_delay
            .as_deref()
            .unwrap_or(cfg.default.requeue_delay.as_str()),
    )?;

    let hook = |h: &Option<String>| {
        h.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| resolve_command_path(workdir.as_deref(), s))
    };

    Ok(TopicConfig {
        name: name.to_string(),
        cmd: resolve_command_path(workdir.as_deref(), cmd),
        notify_start: hook(&raw.notify_start),
        notify_finish: hook(&raw.notify_finish),
        notify_fault: hook(&raw.notify_fault),
        workdir,
        servers,
        channel,
        concurrency,
        max_attempts,
        requeue_exit_code,
        requeue_delay,
    })
}

/// Prefix a relative command template with `workdir`.
///
/// Absolute commands and commands without a workdir are returned as is.
pub fn resolve_command_path(workdir: Option<&Path>, cmd: &str) -> String {
    match workdir {
        Some(dir) if !cmd.starts_with('/') => {
            let cmd = cmd.strip_prefix("./").unwrap_or(cmd);
            dir.join(cmd).to_string_lossy().into_owned()
        }
        _ => cmd.to_string(),
    }
}

fn split_servers(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn check_concurrency(section: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(QexecError::ConfigError(format!(
            "{section}: concurrency must be >= 1 (got 0)"
        )));
    }
    Ok(())
}

fn check_max_attempts(section: &str, value: u16) -> Result<()> {
    if value == 0 {
        return Err(QexecError::ConfigError(format!(
            "{section}: max_attempts must be >= 1 (got 0)"
        )));
    }
    Ok(())
}

fn check_requeue_code(section: &str, value: i32) -> Result<()> {
    if !(0..=255).contains(&value) {
        return Err(QexecError::ConfigError(format!(
            "{section}: requeue_exit_code must be within 0..=255 (got {value})"
        )));
    }
    Ok(())
}

fn parse_delay(section: &str, value: &str) -> Result<std::time::Duration> {
    parse_duration(value).map_err(|e| {
        QexecError::ConfigError(format!("{section}: invalid requeue_delay '{value}': {e}"))
    })
}

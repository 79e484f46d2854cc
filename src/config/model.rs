// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::exec::{ExitPolicy, REQUEUE_EXIT_CODE};

/// Configuration as read from the TOML file, before validation.
///
/// ```toml
/// [common]
/// client_id = "worker-1"
/// servers = "127.0.0.1:4150"
/// channel = "qexec"
///
/// [default]
/// max_attempts = 3
///
/// [topic.resize]
/// cmd = "bin/resize --id {{.ID}}"
/// workdir = "/srv/jobs"
/// concurrency = 4
/// notify_fault = "hooks/alert {{.Topic}} {{.ExitCode}}"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub common: CommonSection,

    /// Defaults applied to every topic that does not override them.
    #[serde(default)]
    pub default: DefaultSection,

    /// Keys are topic names.
    #[serde(default)]
    pub topic: BTreeMap<String, RawTopicConfig>,
}

/// `[common]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommonSection {
    /// Client identifier presented to the queue.
    #[serde(default)]
    pub client_id: Option<String>,

    /// Comma separated queue server addresses.
    #[serde(default)]
    pub servers: String,

    /// Channel to consume from; `"qexec"` when unset.
    #[serde(default)]
    pub channel: Option<String>,
}

/// `[default]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultSection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u16,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Exit code meaning "requeue me"; `0` disables the convention.
    #[serde(default = "default_requeue_exit_code")]
    pub requeue_exit_code: i32,

    /// Delay handed to the queue when a message is requeued (e.g. `"5s"`).
    #[serde(default = "default_requeue_delay")]
    pub requeue_delay: String,
}

fn default_max_attempts() -> u16 {
    1
}

fn default_concurrency() -> usize {
    1
}

fn default_requeue_exit_code() -> i32 {
    REQUEUE_EXIT_CODE
}

fn default_requeue_delay() -> String {
    "0s".to_string()
}

impl Default for DefaultSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            concurrency: default_concurrency(),
            requeue_exit_code: default_requeue_exit_code(),
            requeue_delay: default_requeue_delay(),
        }
    }
}

/// `[topic.<name>]` section as written in the file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTopicConfig {
    /// Command template run for every message.
    pub cmd: String,

    /// Base directory for relative commands and hooks; also the child's cwd.
    #[serde(default)]
    pub workdir: Option<String>,

    #[serde(default)]
    pub servers: Option<String>,

    #[serde(default)]
    pub channel: Option<String>,

    #[serde(default)]
    pub concurrency: Option<usize>,

    #[serde(default)]
    pub max_attempts: Option<u16>,

    #[serde(default)]
    pub requeue_exit_code: Option<i32>,

    #[serde(default)]
    pub requeue_delay: Option<String>,

    #[serde(default)]
    pub notify_start: Option<String>,

    #[serde(default)]
    pub notify_finish: Option<String>,

    #[serde(default)]
    pub notify_fault: Option<String>,
}

/// Validated configuration with every topic fully resolved.
///
/// Only obtainable through `ConfigFile::try_from(RawConfigFile)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub client_id: Option<String>,
    pub topics: BTreeMap<String, TopicConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        client_id: Option<String>,
        topics: BTreeMap<String, TopicConfig>,
    ) -> Self {
        Self { client_id, topics }
    }

    pub fn topic(&self, name: &str) -> Option<&TopicConfig> {
        self.topics.get(name)
    }
}

/// A topic after defaults, fallbacks and path resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicConfig {
    pub name: String,
    pub cmd: String,
    pub workdir: Option<PathBuf>,
    pub servers: Vec<String>,
    pub channel: String,
    pub concurrency: usize,
    pub max_attempts: u16,
    pub requeue_exit_code: i32,
    pub requeue_delay: Duration,
    pub notify_start: Option<String>,
    pub notify_finish: Option<String>,
    pub notify_fault: Option<String>,
}

impl TopicConfig {
    pub fn exit_policy(&self) -> ExitPolicy {
        ExitPolicy::with_requeue_code(self.requeue_exit_code)
    }
}

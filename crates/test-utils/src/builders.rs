#![allow(dead_code)]

use std::collections::BTreeMap;

use qexec::config::{CommonSection, ConfigFile, DefaultSection, RawConfigFile, RawTopicConfig};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                common: CommonSection {
                    client_id: None,
                    servers: "127.0.0.1:4150".to_string(),
                    channel: None,
                },
                default: DefaultSection::default(),
                topic: BTreeMap::new(),
            },
        }
    }

    pub fn with_topic(mut self, name: &str, topic: RawTopicConfig) -> Self {
        self.config.topic.insert(name.to_string(), topic);
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `RawTopicConfig`.
pub struct TopicConfigBuilder {
    topic: RawTopicConfig,
}

impl TopicConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            topic: RawTopicConfig {
                cmd: cmd.to_string(),
                ..RawTopicConfig::default()
            },
        }
    }

    pub fn workdir(mut self, dir: &str) -> Self {
        self.topic.workdir = Some(dir.to_string());
        self
    }

    pub fn concurrency(mut self, val: usize) -> Self {
        self.topic.concurrency = Some(val);
        self
    }

    pub fn max_attempts(mut self, val: u16) -> Self {
        self.topic.max_attempts = Some(val);
        self
    }

    pub fn requeue_exit_code(mut self, val: i32) -> Self {
        self.topic.requeue_exit_code = Some(val);
        self
    }

    pub fn requeue_delay(mut self, val: &str) -> Self {
        self.topic.requeue_delay = Some(val.to_string());
        self
    }

    pub fn notify_start(mut self, cmd: &str) -> Self {
        self.topic.notify_start = Some(cmd.to_string());
        self
    }

    pub fn notify_finish(mut self, cmd: &str) -> Self {
        self.topic.notify_finish = Some(cmd.to_string());
        self
    }

    pub fn notify_fault(mut self, cmd: &str) -> Self {
        self.topic.notify_fault = Some(cmd.to_string());
        self
    }

    pub fn build(self) -> RawTopicConfig {
        self.topic
    }
}

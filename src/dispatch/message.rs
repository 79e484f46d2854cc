// src/dispatch/message.rs

//! What the queue layer hands to a topic handler, and what it gets back.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::Value;

use crate::config::TopicConfig;
use crate::exec::TemplateData;

/// A message delivered by the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub body: Vec<u8>,
    /// Delivery attempt, starting at 1.
    pub attempts: u16,
    /// Nanoseconds since the Unix epoch.
    pub timestamp_ns: i64,
}

impl Message {
    /// A first-attempt message stamped with the current time.
    pub fn new(id: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        let timestamp_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
            .unwrap_or_default();

        Self {
            id: id.into(),
            body: body.into(),
            attempts: 1,
            timestamp_ns,
        }
    }

    /// The same message as it would look on its next delivery.
    pub fn redelivered(&self) -> Self {
        Self {
            attempts: self.attempts.saturating_add(1),
            ..self.clone()
        }
    }
}

/// What the queue layer should do with a handled message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Acknowledge; the message is done (successfully or not).
    Finish,
    /// Put the message back for another attempt after `delay`.
    Requeue { delay: Duration },
}

/// Template data for a message on `topic`.
///
/// `Payload` is only present when the body is valid JSON.
pub fn job_data(topic: &TopicConfig, msg: &Message) -> TemplateData {
    let mut data = TemplateData::new();
    data.insert("ID".into(), Value::from(msg.id.clone()));
    data.insert("Topic".into(), Value::from(topic.name.clone()));
    data.insert("Channel".into(), Value::from(topic.channel.clone()));
    data.insert("Attempts".into(), Value::from(msg.attempts));
    data.insert("MaxAttempts".into(), Value::from(topic.max_attempts));
    data.insert("Timestamp".into(), Value::from(msg.timestamp_ns));

    if let Ok(payload) = serde_json::from_slice::<Value>(&msg.body) {
        data.insert("Payload".into(), payload);
    }

    data
}

/// Extra environment for a job process.
pub fn job_env(topic: &TopicConfig, msg: &Message) -> Vec<String> {
    vec![
        format!("QEXEC_TOPIC={}", topic.name),
        format!("QEXEC_CHANNEL={}", topic.channel),
        format!("QEXEC_MESSAGE_ID={}", msg.id),
        format!("QEXEC_ATTEMPTS={}", msg.attempts),
    ]
}

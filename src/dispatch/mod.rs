// src/dispatch/mod.rs

//! Message handling on top of the execution engine.
//!
//! The queue connection itself lives outside this crate; it hands each
//! delivery to [`TopicHandler::handle`] and applies the returned
//! [`Disposition`].

pub mod handler;
pub mod hooks;
pub mod message;

pub use handler::{Dispatcher, HandleReport, TopicHandler};
pub use hooks::{HookKind, JobSummary};
pub use message::{Disposition, Message, job_data, job_env};

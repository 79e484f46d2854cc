// src/exec/mod.rs

//! Job execution engine.
//!
//! - [`render`] turns a command template and its data into argv.
//! - [`spawner`] starts the child process (the OS seam, swappable in tests).
//! - [`forward`] copies child output to the operator, one prefixed line per write.
//! - [`classify`] folds an exit status into success / failure / requeue.
//! - [`tracker`] counts outstanding forwarders for graceful shutdown.
//! - [`executor`] drives one job through all of the above.

pub mod classify;
pub mod executor;
pub mod forward;
pub mod render;
pub mod spawner;
pub mod tracker;

pub use classify::{ExecutionOutcome, ExitPolicy, REQUEUE_EXIT_CODE};
pub use executor::{JobRequest, ProcessExecutor};
pub use forward::{Diagnostics, LineSink, StreamKind, TracingDiagnostics};
pub use render::{RenderError, RenderedCommand, TemplateData};
pub use spawner::{OsSpawner, ProcessSpawner, SpawnError, SpawnRequest, SpawnStage};
pub use tracker::ForwarderTracker;

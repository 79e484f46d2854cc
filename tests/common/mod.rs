#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Arc;

use qexec::exec::{ForwarderTracker, ProcessExecutor};
pub use qexec_test_utils::builders;
pub use qexec_test_utils::doubles::{MemorySink, RecordingDiagnostics, SpySpawner};
pub use qexec_test_utils::{init_tracing, with_timeout};

/// Executor whose stdout/stderr forwarders write into the given sinks.
pub fn executor_with_sinks(out: &MemorySink, err: &MemorySink) -> ProcessExecutor {
    ProcessExecutor::new(ForwarderTracker::new())
        .with_sinks(Arc::new(out.clone()), Arc::new(err.clone()))
}

/// Write a `sh` script into `dir` and return a command line that runs it.
pub fn sh_script(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, body).expect("write test script");
    format!("sh {}", path.display())
}

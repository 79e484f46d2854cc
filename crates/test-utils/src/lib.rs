//! Shared helpers for qexec's integration tests.

pub mod builders;
pub mod doubles;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

/// Longest a single awaited step in a test may take. Jobs in the suite are
/// short shell commands, so anything slower is a hang.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

static TRACING: Once = Once::new();

/// Install a test-writer subscriber once per test binary.
///
/// Filter directives come from `QEXEC_LOG`, falling back to `qexec=debug`
/// so dispatcher events show up in the output of failing tests.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_env("QEXEC_LOG")
            .unwrap_or_else(|_| EnvFilter::new("qexec=debug"));
        fmt().with_env_filter(filter).with_test_writer().init();
    });
}

/// Await `fut`, failing the test if it outlives [`TEST_TIMEOUT`].
pub async fn with_timeout<F: Future>(fut: F) -> F::Output {
    match tokio::time::timeout(TEST_TIMEOUT, fut).await {
        Ok(output) => output,
        Err(_) => panic!("test step did not finish within {TEST_TIMEOUT:?}"),
    }
}

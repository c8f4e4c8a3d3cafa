pub mod builders;
pub mod fakes;

use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

pub use builders::{ConfigFileBuilder, RequestBuilder};
pub use fakes::{FailingTransferStore, RecordingExecutor};

static INIT: Once = Once::new();

/// Default filter when `RUST_LOG` is unset: crate internals at debug, the
/// rest at warn.
const DEFAULT_TEST_FILTER: &str = "warn,execgate=debug";

/// Install a test-writer subscriber once per test binary.
///
/// Output is captured by the harness and only shown for failing tests
/// (or with `-- --nocapture`). Override the filter with `RUST_LOG`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_TEST_FILTER));

        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Await `f`, failing the test if it takes longer than
/// [`TEST_TIMEOUT`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(TEST_TIMEOUT, f)
        .await
        .expect("test timed out")
}

pub const TEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

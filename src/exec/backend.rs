// src/exec/backend.rs

//! Pluggable executor abstraction.
//!
//! The dispatcher talks to an `ActionExecutor` per action kind instead of the
//! concrete executors. Production wiring uses the real process, task and
//! transfer executors; tests swap in executors that record what they were
//! asked to run and answer with a canned outcome.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::signal::Outcome;

pub type ActionFuture<'a> = Pin<Box<dyn Future<Output = Outcome> + Send + 'a>>;

/// Trait abstracting how one rendered action is executed.
pub trait ActionExecutor: Send + Sync {
    /// Run the already-rendered `command` within `delay` (zero = unbounded).
    ///
    /// Implementations never fail out-of-band: every fault is reported as
    /// `Outcome::Failure`. Cancelling `cancel` must make the future resolve
    /// promptly with `ActionFailure::Cancelled`.
    fn execute(
        &self,
        command: String,
        delay: Duration,
        cancel: CancellationToken,
    ) -> ActionFuture<'_>;
}

/// Executor for `NONE` actions: always succeeds, runs nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpExecutor;

impl ActionExecutor for NoOpExecutor {
    fn execute(
        &self,
        command: String,
        _delay: Duration,
        _cancel: CancellationToken,
    ) -> ActionFuture<'_> {
        Box::pin(async move {
            tracing::debug!(command = %command, "no action to run");
            Outcome::Success
        })
    }
}

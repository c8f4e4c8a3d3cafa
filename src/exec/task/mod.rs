// src/exec/task/mod.rs

//! In-process task execution (`JAVAEXECUTE` actions).
//!
//! The rendered command is `<task name> <args...>`. The name is looked up in
//! a [`TaskRegistry`]; the factory builds the task and [`TaskExecutor`] runs
//! it:
//!
//! - zero delay: inline on the caller's task, no time limit;
//! - delay above [`SHORT_DELAY_LIMIT`]: on a spawned worker, bounded by the
//!   delay; on expiry the worker's token is cancelled and the worker aborted;
//! - a delay of at most [`SHORT_DELAY_LIMIT`]: on a spawned worker, waited
//!   for in [`WAIT_SLICE`] slices until it finishes. The delay does not bound
//!   the wait in this range.

pub mod builtin;
pub mod registry;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::exec::backend::{ActionExecutor, ActionFuture};
use crate::signal::{ActionFailure, Outcome};

pub use registry::{InProcessTask, TaskFactory, TaskFuture, TaskRegistry, TaskSettings};

/// Delays up to this value do not bound a spawned task.
pub const SHORT_DELAY_LIMIT: Duration = Duration::from_millis(100);

/// Wait granularity for tasks with a short delay.
pub const WAIT_SLICE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct TaskExecutor {
    registry: Arc<TaskRegistry>,
    remote_delegation: bool,
}

impl TaskExecutor {
    pub fn new(registry: Arc<TaskRegistry>, remote_delegation: bool) -> Self {
        Self {
            registry,
            remote_delegation,
        }
    }

    pub async fn run(&self, command: &str, delay: Duration, cancel: &CancellationToken) -> Outcome {
        let mut parts = command.split_whitespace();
        let Some(name) = parts.next() else {
            error!("empty task line for JAVAEXECUTE action");
            return Outcome::Failure(ActionFailure::Validation("empty task line".into()));
        };

        let Some(factory) = self.registry.get(name) else {
            error!(task = name, known = ?self.registry.names(), "in-process task not found");
            return Outcome::Failure(ActionFailure::TaskNotFound(name.to_string()));
        };

        let settings = TaskSettings {
            wait_for_completion: true,
            remote_delegation: self.remote_delegation,
            delay,
            task_name: name.to_string(),
            args: parts.map(str::to_string).collect(),
        };
        let task = factory(settings);

        info!(task = name, delay_ms = delay.as_millis() as u64, "starting in-process task");

        let status = if delay.is_zero() {
            tokio::select! {
                status = task.run(cancel.child_token()) => status,
                _ = cancel.cancelled() => {
                    info!(task = name, "in-process task cancelled");
                    return Outcome::Failure(ActionFailure::Cancelled);
                }
            }
        } else {
            match run_on_worker(task, name, delay, cancel).await {
                Ok(status) => status,
                Err(failure) => return Outcome::Failure(failure),
            }
        };

        let outcome = Outcome::from_status(status, ActionFailure::TaskFailed);
        match &outcome {
            Outcome::Success => info!(task = name, "task OK"),
            Outcome::SuccessWithWarning => warn!(task = name, "task in warning"),
            Outcome::Failure(_) => error!(task = name, status, "task in error"),
        }
        outcome
    }
}

async fn run_on_worker(
    task: Box<dyn InProcessTask>,
    name: &str,
    delay: Duration,
    cancel: &CancellationToken,
) -> Result<i32, ActionFailure> {
    let token = cancel.child_token();
    let mut handle = tokio::spawn(task.run(token.clone()));

    let joined = if delay > SHORT_DELAY_LIMIT {
        tokio::select! {
            res = tokio::time::timeout(delay, &mut handle) => match res {
                Ok(joined) => joined,
                Err(_) => {
                    token.cancel();
                    handle.abort();
                    error!(task = name, delay_ms = delay.as_millis() as u64, "task is in time out");
                    return Err(ActionFailure::Timeout(delay));
                }
            },
            _ = cancel.cancelled() => {
                handle.abort();
                info!(task = name, "in-process task cancelled");
                return Err(ActionFailure::Cancelled);
            }
        }
    } else {
        loop {
            tokio::select! {
                res = tokio::time::timeout(WAIT_SLICE, &mut handle) => match res {
                    Ok(joined) => break joined,
                    Err(_) => debug!(task = name, "task still running; waiting another slice"),
                },
                _ = cancel.cancelled() => {
                    handle.abort();
                    info!(task = name, "in-process task cancelled");
                    return Err(ActionFailure::Cancelled);
                }
            }
        }
    };

    joined.map_err(|e| join_failure(name, e))
}

fn join_failure(name: &str, err: JoinError) -> ActionFailure {
    if err.is_panic() {
        error!(task = name, "in-process task panicked");
        ActionFailure::TaskFailed(-1)
    } else {
        ActionFailure::Cancelled
    }
}

impl ActionExecutor for TaskExecutor {
    fn execute(
        &self,
        command: String,
        delay: Duration,
        cancel: CancellationToken,
    ) -> ActionFuture<'_> {
        Box::pin(async move { self.run(&command, delay, &cancel).await })
    }
}

// src/signal.rs

//! Single-resolution completion signal and the dispatch failure taxonomy.
//!
//! Every dispatch ends with exactly one [`Outcome`]. The producer side holds a
//! [`Resolver`], the caller holds the matching [`CompletionSignal`]:
//!
//! - the first [`Resolver::resolve`] delivers the outcome;
//! - any later `resolve` is rejected with [`AlreadyResolved`] and does not
//!   change what the caller sees;
//! - a resolver dropped without resolving yields `Failure(Cancelled)`.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;

/// Why an action failed.
///
/// These are the labels the protocol layer turns into negative replies.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionFailure {
    #[error("operation refused by policy")]
    OperationRefused,

    #[error("invalid action arguments: {0}")]
    Validation(String),

    #[error("command is not executable: {}", .0.display())]
    NotExecutable(PathBuf),

    #[error("in-process task not found: {0}")]
    TaskNotFound(String),

    #[error("transfer rule not found: {0}")]
    RuleNotFound(String),

    #[error("cannot launch command: {0}")]
    LaunchFailed(String),

    #[error("action timed out after {0:?}")]
    Timeout(Duration),

    #[error("command exited with status {0}")]
    NonZeroExit(i32),

    #[error("in-process task ended with status {0}")]
    TaskFailed(i32),

    #[error("remote exec daemon unreachable: {0}")]
    ConnectionFailed(String),

    #[error("transfer submission failed: {0}")]
    SubmissionFailed(String),

    #[error("action cancelled")]
    Cancelled,
}

impl ActionFailure {
    /// Stable taxonomy label for replies and logs.
    pub fn label(&self) -> &'static str {
        match self {
            ActionFailure::OperationRefused => "OperationRefused",
            ActionFailure::Validation(_) => "ValidationError",
            ActionFailure::NotExecutable(_) => "NotExecutable",
            ActionFailure::TaskNotFound(_) => "TaskNotFound",
            ActionFailure::RuleNotFound(_) => "RuleNotFound",
            ActionFailure::LaunchFailed(_) => "LaunchFailed",
            ActionFailure::Timeout(_) => "Timeout",
            ActionFailure::NonZeroExit(_) => "NonZeroExit",
            ActionFailure::TaskFailed(_) => "TaskFailed",
            ActionFailure::ConnectionFailed(_) => "ConnectionFailed",
            ActionFailure::SubmissionFailed(_) => "SubmissionFailed",
            ActionFailure::Cancelled => "Cancelled",
        }
    }
}

/// Terminal state of a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Treated as success by the caller; the action reported a warning.
    SuccessWithWarning,
    Failure(ActionFailure),
}

impl Outcome {
    /// Classify a 0 / 1 / other status code.
    ///
    /// `on_error` builds the failure for any status other than 0 or 1.
    pub fn from_status(status: i32, on_error: impl FnOnce(i32) -> ActionFailure) -> Self {
        match status {
            0 => Outcome::Success,
            1 => Outcome::SuccessWithWarning,
            other => Outcome::Failure(on_error(other)),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Outcome::Failure(_))
    }

    pub fn failure(&self) -> Option<&ActionFailure> {
        match self {
            Outcome::Failure(f) => Some(f),
            _ => None,
        }
    }
}

/// Returned when a signal is resolved a second time.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("completion signal already resolved")]
pub struct AlreadyResolved;

/// Producer half of a completion signal.
#[derive(Debug)]
pub struct Resolver {
    tx: Mutex<Option<oneshot::Sender<Outcome>>>,
}

impl Resolver {
    /// Deliver `outcome`. Only the first call has an effect.
    pub fn resolve(&self, outcome: Outcome) -> Result<(), AlreadyResolved> {
        let sender = self
            .tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        match sender {
            // The caller may have dropped its half already; the outcome is
            // still considered delivered.
            Some(tx) => {
                let _ = tx.send(outcome);
                Ok(())
            }
            None => Err(AlreadyResolved),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }
}

/// Caller half of a completion signal.
#[derive(Debug)]
pub struct CompletionSignal {
    rx: oneshot::Receiver<Outcome>,
}

impl CompletionSignal {
    /// Create a pending signal and its resolver.
    pub fn pending() -> (Resolver, CompletionSignal) {
        let (tx, rx) = oneshot::channel();
        (
            Resolver {
                tx: Mutex::new(Some(tx)),
            },
            CompletionSignal { rx },
        )
    }

    /// Create a signal that is already resolved with `outcome`.
    pub fn resolved(outcome: Outcome) -> Self {
        let (resolver, signal) = Self::pending();
        let _ = resolver.resolve(outcome);
        signal
    }

    /// Wait for the outcome.
    pub async fn wait(self) -> Outcome {
        self.rx
            .await
            .unwrap_or(Outcome::Failure(ActionFailure::Cancelled))
    }

    /// Non-blocking peek: `Some` once the signal has been resolved (or its
    /// resolver dropped).
    pub fn try_outcome(&mut self) -> Option<Outcome> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                Some(Outcome::Failure(ActionFailure::Cancelled))
            }
        }
    }
}

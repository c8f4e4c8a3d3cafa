use std::sync::{Arc, Mutex};
use std::time::Duration;

use execgate::exec::{ActionExecutor, ActionFuture};
use execgate::signal::Outcome;
use execgate::transfer::{StoreError, TransferStore, TransferSubmissionRecord};
use tokio_util::sync::CancellationToken;

/// A fake executor that:
/// - records every rendered command and delay it was given
/// - answers with a fixed outcome.
#[derive(Clone)]
pub struct RecordingExecutor {
    outcome: Outcome,
    calls: Arc<Mutex<Vec<(String, Duration)>>>,
}

impl RecordingExecutor {
    pub fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<(String, Duration)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls().into_iter().map(|(cmd, _)| cmd).collect()
    }
}

impl ActionExecutor for RecordingExecutor {
    fn execute(
        &self,
        command: String,
        delay: Duration,
        _cancel: CancellationToken,
    ) -> ActionFuture<'_> {
        self.calls.lock().unwrap().push((command, delay));
        let outcome = self.outcome.clone();
        Box::pin(async move { outcome })
    }
}

/// Transfer store whose `insert` always fails; `special_submit` fails too
/// unless the store was built with [`FailingTransferStore::insert_only`].
#[derive(Debug, Default)]
pub struct FailingTransferStore {
    special_ok: bool,
    special: Mutex<Vec<TransferSubmissionRecord>>,
}

impl FailingTransferStore {
    /// Every submission path fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only `insert` fails; the fallback succeeds.
    pub fn insert_only() -> Self {
        Self {
            special_ok: true,
            special: Mutex::new(Vec::new()),
        }
    }

    pub fn special_submissions(&self) -> Vec<TransferSubmissionRecord> {
        self.special.lock().unwrap().clone()
    }
}

impl TransferStore for FailingTransferStore {
    fn insert(&self, _record: &TransferSubmissionRecord) -> Result<(), StoreError> {
        Err(StoreError::Rejected("queue unavailable".into()))
    }

    fn special_submit(&self, record: &TransferSubmissionRecord) -> Result<(), StoreError> {
        if self.special_ok {
            self.special.lock().unwrap().push(record.clone());
            Ok(())
        } else {
            Err(StoreError::Rejected("spool unavailable".into()))
        }
    }
}

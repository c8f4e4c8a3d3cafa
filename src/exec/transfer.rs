// src/exec/transfer.rs

//! `R66PREPARETRANSFER` actions: turn the rendered argument line into a
//! queued transfer submission.
//!
//! Success means the record is durably queued, not that anything was
//! transferred.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::exec::backend::{ActionExecutor, ActionFuture};
use crate::fs::FileSystem;
use crate::signal::{ActionFailure, Outcome};
use crate::transfer::{
    RuleStore, StoreError, SubmissionStatus, TransferRequest, TransferStore,
    TransferSubmissionRecord,
};

/// Block size used when the configuration does not set one.
pub const DEFAULT_BLOCK_SIZE: u32 = 65536;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSettings {
    pub default_block_size: u32,
    /// Host alias → actual host id.
    pub aliases: BTreeMap<String, String>,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            default_block_size: DEFAULT_BLOCK_SIZE,
            aliases: BTreeMap::new(),
        }
    }
}

impl TransferSettings {
    /// Translate `host` through the alias table.
    pub fn resolve_host<'a>(&'a self, host: &'a str) -> &'a str {
        self.aliases.get(host).map(String::as_str).unwrap_or(host)
    }
}

#[derive(Debug, Clone)]
pub struct TransferSubmissionExecutor {
    rules: Arc<dyn RuleStore>,
    queue: Arc<dyn TransferStore>,
    fs: Arc<dyn FileSystem>,
    settings: TransferSettings,
}

impl TransferSubmissionExecutor {
    pub fn new(
        rules: Arc<dyn RuleStore>,
        queue: Arc<dyn TransferStore>,
        fs: Arc<dyn FileSystem>,
        settings: TransferSettings,
    ) -> Self {
        Self {
            rules,
            queue,
            fs,
            settings,
        }
    }

    pub fn run(&self, command: &str, cancel: &CancellationToken) -> Outcome {
        if cancel.is_cancelled() {
            return Outcome::Failure(ActionFailure::Cancelled);
        }

        let request = match TransferRequest::parse(command) {
            Ok(req) => req,
            Err(e) => {
                error!(command, error = %e, "invalid transfer arguments");
                return Outcome::Failure(ActionFailure::Validation(e.to_string()));
            }
        };

        let (to, rule_name, file) = match request.mandatory() {
            Ok(parts) => parts,
            Err(e) => {
                error!(command, error = %e, "transfer submission rejected");
                return Outcome::Failure(ActionFailure::Validation(e.to_string()));
            }
        };

        let host = self.settings.resolve_host(to);
        debug!(
            to = host,
            rule = rule_name,
            file,
            no_log = request.no_log,
            md5 = request.md5,
            info = %request.info,
            "preparing transfer submission"
        );

        let rule = match self.rules.get_rule(rule_name) {
            Ok(rule) => rule,
            Err(e) => {
                error!(rule = rule_name, error = %e, "cannot get rule");
                return Outcome::Failure(ActionFailure::RuleNotFound(rule_name.to_string()));
            }
        };

        let mode = if request.md5 {
            rule.mode.with_md5()
        } else {
            rule.mode
        };

        let original_size = if mode.is_send() && !mode.is_through() {
            self.fs
                .file_len(Path::new(file))
                .ok()
                .and_then(|len| i64::try_from(len).ok())
                .unwrap_or(-1)
        } else {
            -1
        };

        let record = TransferSubmissionRecord {
            id: Uuid::new_v4(),
            rule: rule.name.clone(),
            mode,
            requested_host: host.to_string(),
            file_path: file.to_string(),
            block_size: request.effective_block_size(self.settings.default_block_size),
            original_size,
            info: request.info.clone(),
            start_at: request.start_at,
            no_log: request.no_log,
            status: SubmissionStatus::ToSubmit,
            created_at: Utc::now(),
        };

        match self.submit(&record) {
            Ok(()) => {
                info!(
                    id = %record.id,
                    rule = %record.rule,
                    to = %record.requested_host,
                    "transfer prepared"
                );
                Outcome::Success
            }
            Err(e) => {
                error!(id = %record.id, rule = %record.rule, error = %e, "cannot prepare task");
                Outcome::Failure(ActionFailure::SubmissionFailed(e.to_string()))
            }
        }
    }

    /// Insert, falling back to a single `special_submit`.
    fn submit(&self, record: &TransferSubmissionRecord) -> Result<(), StoreError> {
        match self.queue.insert(record) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(id = %record.id, error = %e, "queue insert failed; trying special submit");
                self.queue.special_submit(record)
            }
        }
    }
}

impl ActionExecutor for TransferSubmissionExecutor {
    fn execute(
        &self,
        command: String,
        _delay: Duration,
        cancel: CancellationToken,
    ) -> ActionFuture<'_> {
        Box::pin(async move { self.run(&command, &cancel) })
    }
}

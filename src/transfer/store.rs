// src/transfer/store.rs

//! Rule lookup and submission persistence.
//!
//! Both seams are traits so the gateway can plug in its own storage. The
//! crate ships a config-backed rule store, an in-memory queue, and a
//! JSON-lines queue file with a spool directory used as the fallback path.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::transfer::{TransferRule, TransferSubmissionRecord};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("rule not found: {0}")]
    RuleNotFound(String),

    #[error("store I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("cannot encode submission record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("submission rejected: {0}")]
    Rejected(String),
}

pub trait RuleStore: Send + Sync + Debug {
    fn get_rule(&self, name: &str) -> Result<TransferRule, StoreError>;
}

pub trait TransferStore: Send + Sync + Debug {
    /// Persist a new `ToSubmit` record.
    fn insert(&self, record: &TransferSubmissionRecord) -> Result<(), StoreError>;

    /// Fallback used once when [`TransferStore::insert`] failed.
    fn special_submit(&self, record: &TransferSubmissionRecord) -> Result<(), StoreError>;
}

/// Rules declared in the `[rules.<name>]` configuration sections.
#[derive(Debug, Clone, Default)]
pub struct ConfigRuleStore {
    rules: BTreeMap<String, TransferRule>,
}

impl ConfigRuleStore {
    pub fn new(rules: impl IntoIterator<Item = TransferRule>) -> Self {
        Self {
            rules: rules.into_iter().map(|r| (r.name.clone(), r)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl RuleStore for ConfigRuleStore {
    fn get_rule(&self, name: &str) -> Result<TransferRule, StoreError> {
        self.rules
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::RuleNotFound(name.to_string()))
    }
}

/// Queue kept in memory; mainly for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryTransferStore {
    records: Mutex<Vec<TransferSubmissionRecord>>,
    special: Mutex<Vec<TransferSubmissionRecord>>,
}

impl MemoryTransferStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TransferSubmissionRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn special_submissions(&self) -> Vec<TransferSubmissionRecord> {
        self.special
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl TransferStore for MemoryTransferStore {
    fn insert(&self, record: &TransferSubmissionRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record.clone());
        Ok(())
    }

    fn special_submit(&self, record: &TransferSubmissionRecord) -> Result<(), StoreError> {
        self.special
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record.clone());
        Ok(())
    }
}

/// Queue file handle plus the length covered by complete lines.
#[derive(Debug)]
struct QueueFile {
    file: File,
    committed: u64,
}

impl QueueFile {
    /// Append one newline-terminated line.
    ///
    /// Anything past `committed` is a torn line from an earlier failed
    /// write and is cut off first. A failed write is rolled back the same
    /// way, so the file only ever holds whole lines.
    fn append(&mut self, line: &[u8]) -> io::Result<()> {
        let len = self.file.metadata()?.len();
        if len != self.committed {
            warn!(
                torn_bytes = len.saturating_sub(self.committed),
                "dropping torn queue line"
            );
            self.file.set_len(self.committed)?;
        }

        let written = self.file.write_all(line).and_then(|()| self.file.flush());
        match written {
            Ok(()) => {
                self.committed += line.len() as u64;
                Ok(())
            }
            Err(err) => {
                if let Err(rollback) = self.file.set_len(self.committed) {
                    warn!(error = %rollback, "queue rollback failed; retried on next insert");
                }
                Err(err)
            }
        }
    }
}

/// Append-only JSON-lines queue file.
///
/// Appends are serialised behind a mutex so concurrent inserts never
/// interleave. `special_submit` writes the record as a standalone
/// `<spool_dir>/<id>.json` file instead.
#[derive(Debug)]
pub struct JsonlTransferStore {
    queue_path: PathBuf,
    spool_dir: PathBuf,
    queue: Mutex<QueueFile>,
}

impl JsonlTransferStore {
    /// Open (creating if needed) the queue file and its parent directory.
    ///
    /// A trailing line without its newline is dropped.
    pub fn open(
        queue_path: impl AsRef<Path>,
        spool_dir: impl AsRef<Path>,
    ) -> Result<Self, StoreError> {
        let queue_path = queue_path.as_ref().to_path_buf();
        if let Some(parent) = queue_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&queue_path)?;

        let contents = fs::read(&queue_path)?;
        let committed = contents
            .iter()
            .rposition(|b| *b == b'\n')
            .map_or(0, |pos| pos as u64 + 1);
        if committed != contents.len() as u64 {
            warn!(
                queue = %queue_path.display(),
                torn_bytes = contents.len() as u64 - committed,
                "dropping torn queue line"
            );
            file.set_len(committed)?;
        }
        info!(queue = %queue_path.display(), "transfer queue opened");

        Ok(Self {
            queue_path,
            spool_dir: spool_dir.as_ref().to_path_buf(),
            queue: Mutex::new(QueueFile { file, committed }),
        })
    }

    /// Read back every record in the queue file.
    pub fn load_all(&self) -> Result<Vec<TransferSubmissionRecord>, StoreError> {
        let contents = fs::read_to_string(&self.queue_path)?;
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(StoreError::from))
            .collect()
    }
}

impl TransferStore for JsonlTransferStore {
    fn insert(&self, record: &TransferSubmissionRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .append(line.as_bytes())?;
        debug!(id = %record.id, queue = %self.queue_path.display(), "submission queued");
        Ok(())
    }

    fn special_submit(&self, record: &TransferSubmissionRecord) -> Result<(), StoreError> {
        fs::create_dir_all(&self.spool_dir)?;
        let path = self.spool_dir.join(format!("{}.json", record.id));
        let body = serde_json::to_vec_pretty(record)?;
        fs::write(&path, body)?;
        info!(id = %record.id, path = %path.display(), "submission spooled");
        Ok(())
    }
}

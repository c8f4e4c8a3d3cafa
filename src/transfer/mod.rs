// src/transfer/mod.rs

//! Follow-up transfer submissions.
//!
//! An `R66PREPARETRANSFER` action does not move any bytes: it turns a small
//! argument language ([`request`]) into a [`TransferSubmissionRecord`] with
//! status `ToSubmit` and hands it to a [`store::TransferStore`]. The transfer
//! engine picks queued records up later.

pub mod request;
pub mod store;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use request::{DslError, TransferRequest};
pub use store::{
    ConfigRuleStore, JsonlTransferStore, MemoryTransferStore, RuleStore, StoreError, TransferStore,
};

/// Direction and options of a transfer, seen from the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    Send,
    Recv,
    SendMd5,
    RecvMd5,
    SendThrough,
    RecvThrough,
    SendMd5Through,
    RecvMd5Through,
}

impl TransferMode {
    /// The same mode with a hash computed during the transfer.
    pub fn with_md5(self) -> Self {
        match self {
            TransferMode::Send | TransferMode::SendMd5 => TransferMode::SendMd5,
            TransferMode::Recv | TransferMode::RecvMd5 => TransferMode::RecvMd5,
            TransferMode::SendThrough | TransferMode::SendMd5Through => {
                TransferMode::SendMd5Through
            }
            TransferMode::RecvThrough | TransferMode::RecvMd5Through => {
                TransferMode::RecvMd5Through
            }
        }
    }

    pub fn is_send(self) -> bool {
        matches!(
            self,
            TransferMode::Send
                | TransferMode::SendMd5
                | TransferMode::SendThrough
                | TransferMode::SendMd5Through
        )
    }

    pub fn is_recv(self) -> bool {
        !self.is_send()
    }

    /// Through modes stream data without a local file.
    pub fn is_through(self) -> bool {
        matches!(
            self,
            TransferMode::SendThrough
                | TransferMode::RecvThrough
                | TransferMode::SendMd5Through
                | TransferMode::RecvMd5Through
        )
    }

    pub fn is_md5(self) -> bool {
        matches!(
            self,
            TransferMode::SendMd5
                | TransferMode::RecvMd5
                | TransferMode::SendMd5Through
                | TransferMode::RecvMd5Through
        )
    }
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransferMode::Send => "send",
            TransferMode::Recv => "recv",
            TransferMode::SendMd5 => "send_md5",
            TransferMode::RecvMd5 => "recv_md5",
            TransferMode::SendThrough => "send_through",
            TransferMode::RecvThrough => "recv_through",
            TransferMode::SendMd5Through => "send_md5_through",
            TransferMode::RecvMd5Through => "recv_md5_through",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRule {
    pub name: String,
    pub mode: TransferMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    ToSubmit,
}

/// A transfer waiting to be picked up by the transfer engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSubmissionRecord {
    pub id: Uuid,
    pub rule: String,
    pub mode: TransferMode,
    pub requested_host: String,
    pub file_path: String,
    pub block_size: u32,
    /// -1 when unknown.
    pub original_size: i64,
    pub info: String,
    pub start_at: Option<DateTime<Utc>>,
    pub no_log: bool,
    pub status: SubmissionStatus,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_variants() {
        assert_eq!(TransferMode::Send.with_md5(), TransferMode::SendMd5);
        assert_eq!(TransferMode::RecvMd5.with_md5(), TransferMode::RecvMd5);
        assert_eq!(
            TransferMode::RecvThrough.with_md5(),
            TransferMode::RecvMd5Through
        );
        assert!(TransferMode::SendMd5Through.is_md5());
        assert!(!TransferMode::SendThrough.is_md5());
    }

    #[test]
    fn direction_predicates() {
        assert!(TransferMode::SendThrough.is_send());
        assert!(TransferMode::SendThrough.is_through());
        assert!(TransferMode::RecvMd5.is_recv());
        assert!(!TransferMode::RecvMd5.is_through());
    }

    #[test]
    fn mode_serde_names() {
        let json = serde_json::to_string(&TransferMode::SendMd5Through).unwrap();
        assert_eq!(json, "\"send_md5_through\"");
        assert_eq!(TransferMode::SendMd5Through.to_string(), "send_md5_through");
    }
}

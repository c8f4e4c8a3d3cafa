// src/types.rs

//! Operation descriptors handed to the dispatcher.

use std::fmt;
use std::str::FromStr;

/// Which side of a transfer an operation belongs to.
///
/// - `Store`: the client uploads a file (STOR-like commands).
/// - `Retrieve`: the client downloads a file (RETR-like commands).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Store,
    Retrieve,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Store => "store",
            Direction::Retrieve => "retrieve",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "store" | "stor" => Ok(Direction::Store),
            "retrieve" | "retr" => Ok(Direction::Retrieve),
            other => Err(format!(
                "invalid direction: {other} (expected \"store\" or \"retrieve\")"
            )),
        }
    }
}

/// A store or retrieve operation about to start (or just finished), as
/// reported by the protocol layer.
///
/// The dispatcher takes it by value: one request is consumed by exactly one
/// dispatch. Callers that really want to dispatch the same operation twice
/// have to clone it explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub user: String,
    pub account: String,
    /// Root of the user's file area.
    pub base_path: String,
    /// File path relative to `base_path`.
    pub relative_file: String,
    /// Protocol command issued for the file (e.g. `STOR`, `RETR`, `APPE`).
    pub command_label: String,
    /// Session-local transfer identifier.
    pub transfer_id: u64,
    pub direction: Direction,
}

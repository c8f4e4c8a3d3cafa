// src/remote/protocol.rs

//! Wire format spoken between [`super::RemoteExecClient`] and
//! [`super::RemoteExecServer`].
//!
//! Everything is UTF-8 text, one message per line:
//!
//! ```text
//! client → daemon   "<delayMs> <command>\n"      (delay omitted when 0)
//!                   "-1\n"                        shutdown order
//! daemon → client   "<status> <first output line>\n"
//!                   "<more output lines>\n"...
//!                   "#EXECGATE END OF COMMAND#\n"
//! ```
//!
//! Status 0 is success, 1 a warning, any other positive value is the exit
//! code of the command. Negative values are daemon-side conditions, see
//! [`status`].

use std::path::PathBuf;
use std::time::Duration;

use crate::signal::{ActionFailure, Outcome};

/// Terminates every reply.
pub const END_OF_COMMAND: &str = "#EXECGATE END OF COMMAND#";

pub const DEFAULT_PORT: u16 = 9999;

/// Daemon status codes.
pub mod status {
    pub const NO_STATUS: i32 = -1;
    pub const NOT_EXECUTABLE: i32 = -2;
    pub const BAD_EXECUTION: i32 = -3;
    pub const TIMEOUT: i32 = -4;
    pub const NO_COMMAND: i32 = -5;
    pub const SHUTDOWN_ON_GOING: i32 = -6;
    pub const CONNECTION_REFUSED: i32 = -7;
}

/// One parsed request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonRequest {
    /// Run `command`, with an explicit time limit if one was given.
    Command {
        delay: Option<Duration>,
        command: String,
    },
    /// A negative delay: stop the daemon.
    Shutdown,
    /// Nothing to run.
    Empty,
}

impl DaemonRequest {
    /// Encode a command request; a zero `delay` lets the daemon apply its own
    /// default limit.
    pub fn encode(command: &str, delay: Duration) -> String {
        if delay.is_zero() {
            format!("{command}\n")
        } else {
            format!("{} {command}\n", delay.as_millis())
        }
    }

    pub fn encode_shutdown() -> String {
        "-1\n".to_string()
    }

    /// Parse a request line. A leading integer token is the delay in
    /// milliseconds; anything else starts the command.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return DaemonRequest::Empty;
        }

        let (first, rest) = match line.split_once(char::is_whitespace) {
            Some((first, rest)) => (first, rest.trim_start()),
            None => (line, ""),
        };

        match first.parse::<i64>() {
            Ok(ms) if ms < 0 => DaemonRequest::Shutdown,
            Ok(_) if rest.is_empty() => DaemonRequest::Empty,
            Ok(ms) => DaemonRequest::Command {
                delay: Some(Duration::from_millis(ms as u64)),
                command: rest.to_string(),
            },
            Err(_) => DaemonRequest::Command {
                delay: None,
                command: line.to_string(),
            },
        }
    }
}

/// A complete reply: status plus all output lines joined by `\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonReply {
    pub status: i32,
    pub output: String,
}

impl DaemonReply {
    pub fn new(status: i32, output: impl Into<String>) -> Self {
        Self {
            status,
            output: output.into(),
        }
    }

    /// Serialise the reply including the end marker.
    pub fn encode(&self) -> String {
        let output = self.output.trim_end_matches('\n');
        format!("{} {}\n{END_OF_COMMAND}\n", self.status, output)
    }

    /// Split the first reply line into status and first output fragment.
    /// `None` when the status is not an integer.
    pub fn parse_head(line: &str) -> Option<(i32, &str)> {
        let (code, rest) = match line.split_once(' ') {
            Some((code, rest)) => (code, rest),
            None => (line, ""),
        };
        code.trim().parse::<i32>().ok().map(|status| (status, rest))
    }

    /// Classify the reply for a command whose program was `program`, run
    /// with `delay`.
    pub fn into_outcome(self, program: &str, delay: Duration) -> Outcome {
        match self.status {
            status::NOT_EXECUTABLE => {
                Outcome::Failure(ActionFailure::NotExecutable(PathBuf::from(program)))
            }
            status::TIMEOUT => Outcome::Failure(ActionFailure::Timeout(delay)),
            status::CONNECTION_REFUSED | status::SHUTDOWN_ON_GOING => Outcome::Failure(
                ActionFailure::ConnectionFailed("remote exec daemon is shutting down".into()),
            ),
            code => Outcome::from_status(code, ActionFailure::NonZeroExit),
        }
    }
}

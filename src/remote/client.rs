// src/remote/client.rs

//! Client side of the remote exec daemon link.
//!
//! [`RemoteExecBootstrap`] is created once at startup and shared: it owns the
//! daemon address, the connect policy and a semaphore bounding concurrent
//! sessions. Each [`RemoteExecClient`] opens one session, runs one command,
//! and disconnects; sessions are never shared between callers.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::remote::protocol::{DaemonReply, DaemonRequest, END_OF_COMMAND};
use crate::signal::{ActionFailure, Outcome};

/// Pause between connect attempts, multiplied by the attempt number.
const CONNECT_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteExecSettings {
    /// `host:port` of the daemon.
    pub address: String,
    pub connect_attempts: u32,
    pub connect_timeout: Duration,
    pub max_sessions: usize,
}

#[derive(Error, Debug)]
pub enum RemoteExecError {
    #[error("cannot connect to remote exec daemon at {addr} after {attempts} attempt(s): {source}")]
    Connect {
        addr: String,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    #[error("remote exec client has been shut down")]
    ShutDown,

    #[error("no free remote exec session within {0:?}")]
    SessionsBusy(Duration),

    #[error("remote exec connect cancelled")]
    Cancelled,

    #[error("bad transmission from remote exec daemon: {0}")]
    BadTransmission(String),

    #[error("remote exec daemon closed the connection before replying")]
    ClosedEarly,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Process-wide connection bootstrap.
#[derive(Debug)]
pub struct RemoteExecBootstrap {
    settings: RemoteExecSettings,
    sessions: Arc<Semaphore>,
}

impl RemoteExecBootstrap {
    pub fn new(settings: RemoteExecSettings) -> Self {
        let sessions = Arc::new(Semaphore::new(settings.max_sessions.max(1)));
        info!(address = %settings.address, "remote exec client initialised");
        Self { settings, sessions }
    }

    pub fn settings(&self) -> &RemoteExecSettings {
        &self.settings
    }

    /// Release the bootstrap: every later `connect` fails with
    /// [`RemoteExecError::ShutDown`].
    pub fn shutdown(&self) {
        self.sessions.close();
        info!(address = %self.settings.address, "remote exec client released");
    }
}

struct Session {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    _permit: OwnedSemaphorePermit,
}

/// One-command session with the daemon.
pub struct RemoteExecClient {
    bootstrap: Arc<RemoteExecBootstrap>,
    session: Option<Session>,
}

impl std::fmt::Debug for RemoteExecClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteExecClient")
            .field("address", &self.bootstrap.settings.address)
            .field("connected", &self.session.is_some())
            .finish()
    }
}

impl RemoteExecClient {
    pub fn new(bootstrap: Arc<RemoteExecBootstrap>) -> Self {
        Self {
            bootstrap,
            session: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Open a session, trying up to `connect_attempts` times.
    ///
    /// Waiting for a free session slot is bounded by `wait` (zero = no
    /// bound). Every wait, including the connect attempts, gives up as soon
    /// as `cancel` fires.
    pub async fn connect(
        &mut self,
        wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), RemoteExecError> {
        let sessions = Arc::clone(&self.bootstrap.sessions);
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RemoteExecError::Cancelled),
            permit = wait_bounded(sessions.acquire_owned(), wait) => match permit {
                Some(Ok(permit)) => permit,
                Some(Err(_)) => return Err(RemoteExecError::ShutDown),
                None => {
                    warn!(wait_ms = wait.as_millis() as u64, "no free remote exec session");
                    return Err(RemoteExecError::SessionsBusy(wait));
                }
            },
        };

        let settings = &self.bootstrap.settings;
        let attempts = settings.connect_attempts.max(1);
        let mut last_err = io::Error::other("no connect attempt made");

        for attempt in 1..=attempts {
            let connect = tokio::time::timeout(
                settings.connect_timeout,
                TcpStream::connect(settings.address.as_str()),
            );
            let connected = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RemoteExecError::Cancelled),
                res = connect => res,
            };

            match connected {
                Ok(Ok(stream)) => {
                    let _ = stream.set_nodelay(true);
                    let (read, write) = stream.into_split();
                    self.session = Some(Session {
                        reader: BufReader::new(read),
                        writer: write,
                        _permit: permit,
                    });
                    debug!(address = %settings.address, attempt, "connected to remote exec daemon");
                    return Ok(());
                }
                Ok(Err(e)) => last_err = e,
                Err(_) => last_err = io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
            }

            debug!(
                address = %settings.address,
                attempt,
                error = %last_err,
                "connect attempt failed"
            );
            if attempt < attempts {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(RemoteExecError::Cancelled),
                    _ = tokio::time::sleep(CONNECT_BACKOFF * attempt) => {}
                }
            }
        }

        Err(RemoteExecError::Connect {
            addr: settings.address.clone(),
            attempts,
            source: last_err,
        })
    }

    /// Send `command` with `delay` as its limit and wait up to `2 × delay`
    /// (unbounded when `delay` is zero) for the reply.
    ///
    /// Cancelling drops the socket; the daemon sees the connection close.
    pub async fn run_one_command(
        &mut self,
        command: &str,
        delay: Duration,
        cancel: &CancellationToken,
    ) -> Outcome {
        let program = command.split_whitespace().next().unwrap_or_default().to_string();

        let Some(session) = self.session.as_mut() else {
            return Outcome::Failure(ActionFailure::ConnectionFailed(
                "remote exec client is not connected".into(),
            ));
        };

        let request = DaemonRequest::encode(command.trim(), delay);
        if let Err(e) = session.writer.write_all(request.as_bytes()).await {
            error!(command, error = %e, "cannot send command to remote exec daemon");
            self.session = None;
            return Outcome::Failure(ActionFailure::ConnectionFailed(e.to_string()));
        }

        let bound = delay * 2;
        let result = tokio::select! {
            reply = wait_bounded(read_reply(&mut session.reader), bound) => Some(reply),
            _ = cancel.cancelled() => None,
        };

        match result {
            None => {
                self.session = None;
                info!(command, "remote command cancelled; connection dropped");
                Outcome::Failure(ActionFailure::Cancelled)
            }
            Some(None) => {
                self.session = None;
                error!(command, wait_ms = bound.as_millis() as u64, "remote exec reply timed out");
                Outcome::Failure(ActionFailure::Timeout(bound))
            }
            Some(Some(Err(e))) => {
                self.session = None;
                error!(command, error = %e, "remote exec failed");
                Outcome::Failure(ActionFailure::ConnectionFailed(e.to_string()))
            }
            Some(Some(Ok(reply))) => {
                let status = reply.status;
                let outcome = reply.into_outcome(&program, delay);
                match &outcome {
                    Outcome::Success => info!(command, "remote exec OK"),
                    Outcome::SuccessWithWarning => warn!(command, "remote exec in warning"),
                    Outcome::Failure(_) => error!(command, status, "remote exec in error"),
                }
                outcome
            }
        }
    }

    /// Ask the daemon to shut down. Used by operators, not by dispatch.
    pub async fn send_shutdown(&mut self) -> Result<DaemonReply, RemoteExecError> {
        let session = self.session.as_mut().ok_or(RemoteExecError::ClosedEarly)?;
        session
            .writer
            .write_all(DaemonRequest::encode_shutdown().as_bytes())
            .await?;
        read_reply(&mut session.reader).await
    }

    /// Close the session if one is open.
    pub async fn disconnect(&mut self) {
        if let Some(mut session) = self.session.take() {
            let _ = session.writer.shutdown().await;
        }
    }
}

/// `None` when `bound` elapsed first; a zero bound waits forever.
async fn wait_bounded<F: std::future::Future>(fut: F, bound: Duration) -> Option<F::Output> {
    if bound.is_zero() {
        Some(fut.await)
    } else {
        tokio::time::timeout(bound, fut).await.ok()
    }
}

/// Read one complete reply, up to and including the end marker.
///
/// A connection closed after the first line still yields the output read so
/// far; closed before any line is an error.
async fn read_reply(reader: &mut BufReader<OwnedReadHalf>) -> Result<DaemonReply, RemoteExecError> {
    let mut lines = reader.lines();

    let Some(head) = lines.next_line().await? else {
        return Err(RemoteExecError::ClosedEarly);
    };
    let Some((status, first)) = DaemonReply::parse_head(&head) else {
        return Err(RemoteExecError::BadTransmission(head));
    };

    let mut output = String::new();
    if first.starts_with(END_OF_COMMAND) {
        return Ok(DaemonReply::new(status, output));
    }
    output.push_str(first);

    while let Some(line) = lines.next_line().await? {
        if line.starts_with(END_OF_COMMAND) {
            break;
        }
        output.push('\n');
        output.push_str(&line);
    }

    Ok(DaemonReply::new(status, output))
}

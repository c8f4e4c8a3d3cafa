// src/remote/server.rs

//! The remote exec daemon.
//!
//! One tokio task per connection, one command per request line. Commands run
//! through the same watchdog launcher as local `EXECUTE` actions, with stdout
//! captured and sent back after the status.
//!
//! A shutdown order (negative delay) is acknowledged with
//! `SHUTDOWN_ON_GOING`; the listener then closes and every other open
//! connection receives `CONNECTION_REFUSED` before being closed.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::exec::process::{CommandLine, ProcessEnd, run_with_watchdog};
use crate::fs::{FileSystem, RealFileSystem};
use crate::remote::protocol::{DaemonReply, DaemonRequest, status};

pub struct RemoteExecServer {
    listener: TcpListener,
    default_delay: Duration,
    fs: Arc<dyn FileSystem>,
    shutdown: CancellationToken,
}

impl RemoteExecServer {
    /// Bind the daemon. `default_delay` applies to requests that carry no
    /// delay of their own (zero = no watchdog).
    pub async fn bind(addr: &str, default_delay: Duration) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(address = %listener.local_addr()?, "remote exec daemon listening");
        Ok(Self {
            listener,
            default_delay,
            fs: Arc::new(RealFileSystem),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn with_filesystem(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Token cancelled once a client has ordered a shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Accept connections until `cancel` fires or a shutdown order arrives,
    /// then wait for open connections to wind down.
    pub async fn serve(self, cancel: CancellationToken) -> io::Result<()> {
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!(%peer, "remote exec connection accepted");
                            let conn = Connection {
                                default_delay: self.default_delay,
                                fs: Arc::clone(&self.fs),
                                shutdown: self.shutdown.clone(),
                                cancel: cancel.child_token(),
                            };
                            connections.spawn(conn.handle(stream, peer));
                        }
                        Err(e) => warn!(error = %e, "accept failed"),
                    }
                }
                _ = self.shutdown.cancelled() => {
                    info!("shutdown ordered; remote exec daemon stops accepting");
                    break;
                }
                _ = cancel.cancelled() => {
                    info!("remote exec daemon cancelled");
                    break;
                }
            }
        }

        drop(self.listener);
        while let Some(res) = connections.join_next().await {
            if let Err(e) = res {
                warn!(error = %e, "remote exec connection task failed");
            }
        }
        info!("remote exec daemon stopped");
        Ok(())
    }
}

struct Connection {
    default_delay: Duration,
    fs: Arc<dyn FileSystem>,
    shutdown: CancellationToken,
    cancel: CancellationToken,
}

impl Connection {
    async fn handle(self, stream: TcpStream, peer: SocketAddr) {
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        loop {
            let line = tokio::select! {
                line = lines.next_line() => line,
                _ = self.shutdown.cancelled() => {
                    let reply =
                        DaemonReply::new(status::CONNECTION_REFUSED, "daemon is shutting down");
                    let _ = write.write_all(reply.encode().as_bytes()).await;
                    break;
                }
                _ = self.cancel.cancelled() => break,
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    debug!(%peer, error = %e, "read failed; closing connection");
                    break;
                }
            };

            let (reply, stop) = match DaemonRequest::parse(&line) {
                DaemonRequest::Empty => (DaemonReply::new(status::NO_COMMAND, "no command"), false),
                DaemonRequest::Shutdown => {
                    info!(%peer, "shutdown order received");
                    self.shutdown.cancel();
                    (
                        DaemonReply::new(status::SHUTDOWN_ON_GOING, "shutdown on going"),
                        true,
                    )
                }
                DaemonRequest::Command { delay, command } => {
                    let delay = delay.unwrap_or(self.default_delay);
                    (self.run(&command, delay).await, false)
                }
            };

            if let Err(e) = write.write_all(reply.encode().as_bytes()).await {
                debug!(%peer, error = %e, "write failed; closing connection");
                break;
            }
            if stop {
                break;
            }
        }

        let _ = write.shutdown().await;
        debug!(%peer, "remote exec connection closed");
    }

    async fn run(&self, command: &str, delay: Duration) -> DaemonReply {
        let Some(cmd) = CommandLine::parse(command) else {
            return DaemonReply::new(status::NO_COMMAND, "no command");
        };

        if let Err(path) = cmd.check_executable(self.fs.as_ref()) {
            error!(program = %path.display(), "daemon command is not executable");
            return DaemonReply::new(
                status::NOT_EXECUTABLE,
                format!("not executable: {}", path.display()),
            );
        }

        info!(command = %cmd, delay_ms = delay.as_millis() as u64, "daemon running command");

        match run_with_watchdog(&cmd, delay, true, &self.cancel).await {
            Err(e) => {
                error!(command = %cmd, error = %e, "daemon cannot execute command");
                DaemonReply::new(status::BAD_EXECUTION, e.to_string())
            }
            Ok(run) => match run.end {
                ProcessEnd::Exited(code) => {
                    debug!(command = %cmd, exit_code = code, "daemon command finished");
                    DaemonReply::new(code, run.stdout)
                }
                ProcessEnd::TimedOut => {
                    error!(command = %cmd, "daemon command timed out");
                    DaemonReply::new(status::TIMEOUT, "time out")
                }
                ProcessEnd::Cancelled => DaemonReply::new(status::NO_STATUS, "cancelled"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;
    use tokio::io::AsyncReadExt;

    type Running = (SocketAddr, CancellationToken, tokio::task::JoinHandle<io::Result<()>>);

    async fn start(fs: MockFileSystem) -> Running {
        let server = RemoteExecServer::bind("127.0.0.1:0", Duration::ZERO)
            .await
            .unwrap()
            .with_filesystem(Arc::new(fs));
        let addr = server.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(server.serve(cancel.clone()));
        (addr, cancel, handle)
    }

    async fn exchange(stream: &mut TcpStream, request: &str) -> String {
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut buf = vec![0u8; 4096];
        let mut out = String::new();
        while !out.contains(crate::remote::protocol::END_OF_COMMAND) {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            out.push_str(&String::from_utf8_lossy(&buf[..n]));
        }
        out
    }

    #[tokio::test]
    async fn empty_and_non_executable_requests() {
        let fs = MockFileSystem::new();
        fs.add_file("/opt/data.txt", "x");
        let (addr, cancel, handle) = start(fs).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let reply = exchange(&mut stream, "100 \n").await;
        assert!(reply.starts_with("-5 "), "{reply}");

        let reply = exchange(&mut stream, "100 /opt/data.txt arg\n").await;
        assert!(reply.starts_with("-2 "), "{reply}");

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn shutdown_order_stops_the_daemon() {
        let (addr, _cancel, handle) = start(MockFileSystem::new()).await;

        let mut idle = TcpStream::connect(addr).await.unwrap();
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let reply = exchange(&mut stream, "-1\n").await;
        assert!(reply.starts_with("-6 "), "{reply}");

        let mut refused = String::new();
        idle.read_to_string(&mut refused).await.unwrap();
        assert!(refused.starts_with("-7 "), "{refused}");

        handle.await.unwrap().unwrap();
    }
}

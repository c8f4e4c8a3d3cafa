#![cfg(unix)]

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{init_tracing, with_timeout, write_script};
use execgate::exec::ProcessExecutor;
use execgate::fs::RealFileSystem;
use execgate::remote::protocol::status;
use execgate::remote::{
    RemoteExecBootstrap, RemoteExecClient, RemoteExecError, RemoteExecServer, RemoteExecSettings,
};
use execgate::signal::{ActionFailure, Outcome};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Daemon {
    addr: SocketAddr,
    cancel: CancellationToken,
    handle: JoinHandle<std::io::Result<()>>,
}

impl Daemon {
    async fn start() -> Self {
        let server = RemoteExecServer::bind("127.0.0.1:0", Duration::ZERO)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(server.serve(cancel.clone()));
        Self {
            addr,
            cancel,
            handle,
        }
    }

    async fn stop(self) {
        self.cancel.cancel();
        self.handle.await.unwrap().unwrap();
    }
}

fn bootstrap_with(addr: String, max_sessions: usize) -> Arc<RemoteExecBootstrap> {
    Arc::new(RemoteExecBootstrap::new(RemoteExecSettings {
        address: addr,
        connect_attempts: 2,
        connect_timeout: Duration::from_millis(500),
        max_sessions,
    }))
}

fn bootstrap(addr: String) -> Arc<RemoteExecBootstrap> {
    bootstrap_with(addr, 4)
}

/// An address nothing listens on.
async fn closed_address() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

fn cancel_after(cancel: &CancellationToken, after: Duration) {
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        trigger.cancel();
    });
}

#[tokio::test]
async fn round_trip_statuses() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "status.sh",
        "echo \"ran with $1\"\necho second line\nexit \"$1\"",
    );
    let daemon = Daemon::start().await;
    let boot = bootstrap(daemon.addr.to_string());
    let cancel = CancellationToken::new();

    for (code, expected) in [
        ("0", Outcome::Success),
        ("1", Outcome::SuccessWithWarning),
        ("4", Outcome::Failure(ActionFailure::NonZeroExit(4))),
    ] {
        let mut client = RemoteExecClient::new(Arc::clone(&boot));
        client.connect(Duration::ZERO, &cancel).await.unwrap();
        let outcome = with_timeout(client.run_one_command(
            &format!("{} {code}", script.display()),
            Duration::from_secs(5),
            &cancel,
        ))
        .await;
        client.disconnect().await;
        assert_eq!(outcome, expected, "exit {code}");
    }

    daemon.stop().await;
}

#[tokio::test]
async fn daemon_side_timeout_and_not_executable() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let slow = write_script(dir.path(), "slow.sh", "sleep 5");
    let plain = dir.path().join("plain.sh");
    std::fs::write(&plain, "exit 0\n").unwrap();

    let daemon = Daemon::start().await;
    let boot = bootstrap(daemon.addr.to_string());
    let cancel = CancellationToken::new();

    let delay = Duration::from_millis(200);
    let mut client = RemoteExecClient::new(Arc::clone(&boot));
    client.connect(Duration::ZERO, &cancel).await.unwrap();
    let outcome =
        with_timeout(client.run_one_command(&slow.display().to_string(), delay, &cancel)).await;
    assert_eq!(outcome, Outcome::Failure(ActionFailure::Timeout(delay)));

    let outcome = client
        .run_one_command(&plain.display().to_string(), delay, &cancel)
        .await;
    assert_eq!(
        outcome,
        Outcome::Failure(ActionFailure::NotExecutable(plain.clone()))
    );
    client.disconnect().await;

    daemon.stop().await;
}

#[tokio::test]
async fn process_executor_delegates_and_falls_back() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("ran.txt");
    let script = write_script(
        dir.path(),
        "mark.sh",
        &format!("echo \"$1\" >> {}", marker.display()),
    );
    let cancel = CancellationToken::new();

    let daemon = Daemon::start().await;
    let remote = ProcessExecutor::new(Arc::new(RealFileSystem))
        .with_remote(bootstrap(daemon.addr.to_string()));
    assert!(remote.uses_remote());
    let outcome = remote
        .run(
            &format!("{} remote", script.display()),
            Duration::from_secs(5),
            &cancel,
        )
        .await;
    assert_eq!(outcome, Outcome::Success);
    daemon.stop().await;

    let unreachable = ProcessExecutor::new(Arc::new(RealFileSystem))
        .with_remote(bootstrap(closed_address().await));
    let outcome = unreachable
        .run(
            &format!("{} local", script.display()),
            Duration::from_secs(5),
            &cancel,
        )
        .await;
    assert_eq!(outcome, Outcome::Success);

    let lines = std::fs::read_to_string(&marker).unwrap();
    assert_eq!(lines.lines().collect::<Vec<_>>(), vec!["remote", "local"]);
}

#[tokio::test]
async fn cancel_while_every_session_is_taken() {
    init_tracing();
    let daemon = Daemon::start().await;
    let boot = bootstrap_with(daemon.addr.to_string(), 1);
    let idle = CancellationToken::new();

    let mut busy = RemoteExecClient::new(Arc::clone(&boot));
    busy.connect(Duration::ZERO, &idle).await.unwrap();

    let exec = ProcessExecutor::new(Arc::new(RealFileSystem)).with_remote(Arc::clone(&boot));
    let cancel = CancellationToken::new();
    cancel_after(&cancel, Duration::from_millis(100));

    let started = Instant::now();
    let outcome = with_timeout(exec.run("/bin/true", Duration::ZERO, &cancel)).await;
    assert_eq!(outcome, Outcome::Failure(ActionFailure::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(1));

    busy.disconnect().await;
    daemon.stop().await;
}

#[tokio::test]
async fn session_wait_is_bounded_by_the_delay() {
    init_tracing();
    let daemon = Daemon::start().await;
    let boot = bootstrap_with(daemon.addr.to_string(), 1);
    let cancel = CancellationToken::new();

    let mut busy = RemoteExecClient::new(Arc::clone(&boot));
    busy.connect(Duration::ZERO, &cancel).await.unwrap();

    let exec = ProcessExecutor::new(Arc::new(RealFileSystem)).with_remote(Arc::clone(&boot));
    let delay = Duration::from_millis(200);
    let started = Instant::now();
    let outcome = with_timeout(exec.run("/bin/true", delay, &cancel)).await;
    assert_eq!(outcome, Outcome::Failure(ActionFailure::Timeout(delay)));
    assert!(started.elapsed() < Duration::from_secs(1));

    let mut waiting = RemoteExecClient::new(Arc::clone(&boot));
    assert!(matches!(
        waiting.connect(delay, &cancel).await,
        Err(RemoteExecError::SessionsBusy(d)) if d == delay
    ));

    // Releasing the held session frees the slot again.
    busy.disconnect().await;
    waiting.connect(delay, &cancel).await.unwrap();
    waiting.disconnect().await;

    daemon.stop().await;
}

#[tokio::test]
async fn client_errors() {
    init_tracing();
    let cancel = CancellationToken::new();

    let boot = bootstrap(closed_address().await);
    let mut client = RemoteExecClient::new(Arc::clone(&boot));
    assert!(matches!(
        client.connect(Duration::ZERO, &cancel).await,
        Err(RemoteExecError::Connect { attempts: 2, .. })
    ));

    // Never connected.
    let outcome = client
        .run_one_command("/bin/true", Duration::ZERO, &cancel)
        .await;
    assert!(matches!(
        outcome,
        Outcome::Failure(ActionFailure::ConnectionFailed(_))
    ));

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    assert!(matches!(
        client.connect(Duration::ZERO, &cancelled).await,
        Err(RemoteExecError::Cancelled)
    ));

    boot.shutdown();
    assert!(matches!(
        client.connect(Duration::ZERO, &cancel).await,
        Err(RemoteExecError::ShutDown)
    ));
}

#[tokio::test]
async fn cancelling_a_remote_command() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let slow = write_script(dir.path(), "slow.sh", "sleep 5");
    let daemon = Daemon::start().await;

    let cancel = CancellationToken::new();
    cancel_after(&cancel, Duration::from_millis(100));

    let mut client = RemoteExecClient::new(bootstrap(daemon.addr.to_string()));
    client.connect(Duration::ZERO, &cancel).await.unwrap();
    let outcome = with_timeout(client.run_one_command(
        &slow.display().to_string(),
        Duration::ZERO,
        &cancel,
    ))
    .await;
    assert_eq!(outcome, Outcome::Failure(ActionFailure::Cancelled));
    assert!(!client.is_connected());

    daemon.stop().await;
}

#[tokio::test]
async fn shutdown_order_through_the_client() {
    init_tracing();
    let daemon = Daemon::start().await;
    let cancel = CancellationToken::new();

    let mut client = RemoteExecClient::new(bootstrap(daemon.addr.to_string()));
    client.connect(Duration::ZERO, &cancel).await.unwrap();
    let reply = client.send_shutdown().await.unwrap();
    assert_eq!(reply.status, status::SHUTDOWN_ON_GOING);

    with_timeout(daemon.handle).await.unwrap().unwrap();
}

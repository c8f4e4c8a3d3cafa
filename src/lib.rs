// src/lib.rs

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod policy;
pub mod remote;
pub mod signal;
pub mod template;
pub mod transfer;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cli::{CliArgs, Command, DaemonArgs, FireArgs};
use crate::config::{ConfigFile, config_root_dir, load_and_validate};
use crate::dispatch::{Dispatcher, Executors};
use crate::exec::{TaskRegistry, TransferSubmissionExecutor};
use crate::fs::{FileSystem, RealFileSystem};
use crate::policy::delay_from_millis;
use crate::remote::{RemoteExecBootstrap, RemoteExecServer};
use crate::signal::Outcome;
use crate::transfer::JsonlTransferStore;
use crate::types::ExecutionRequest;

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    match args.command {
        Command::Check => {
            let config_path = PathBuf::from(&args.config);
            let cfg = load_and_validate(&config_path)
                .with_context(|| format!("loading config {:?}", config_path))?;
            let gateway = Gateway::from_config(&cfg, &config_root_dir(&config_path))?;
            print_check(&cfg, &gateway);
            gateway.shutdown();
            Ok(())
        }
        Command::Fire(fire) => {
            let config_path = PathBuf::from(&args.config);
            let cfg = load_and_validate(&config_path)
                .with_context(|| format!("loading config {:?}", config_path))?;
            let gateway = Gateway::from_config(&cfg, &config_root_dir(&config_path))?;
            let res = fire_once(&gateway, fire).await;
            gateway.shutdown();
            res
        }
        Command::Daemon(daemon) => run_daemon(daemon).await,
    }
}

/// A dispatcher wired from a configuration file, plus the process-wide
/// resources it holds.
pub struct Gateway {
    pub dispatcher: Dispatcher,
    pub registry: Arc<TaskRegistry>,
    pub remote: Option<Arc<RemoteExecBootstrap>>,
}

impl Gateway {
    /// Wire the production executors for `cfg`. Relative queue and spool
    /// paths are resolved against `root`.
    pub fn from_config(cfg: &ConfigFile, root: &Path) -> Result<Self> {
        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
        let registry = Arc::new(TaskRegistry::with_builtins(Arc::clone(&fs)));
        let remote = cfg
            .remote_settings()
            .map(|settings| Arc::new(RemoteExecBootstrap::new(settings)));

        let policy = cfg.default_policy();
        let sessions = cfg.session_policies(&policy);

        let needs_queue = policy.requires_transfer_store()
            || sessions.values().any(|p| p.requires_transfer_store());
        let transfer = if needs_queue {
            let store = JsonlTransferStore::open(
                root.join(&cfg.transfer.queue_path),
                root.join(&cfg.transfer.spool_dir),
            )
            .context("opening transfer queue")?;
            Some(TransferSubmissionExecutor::new(
                Arc::new(cfg.rule_store()),
                Arc::new(store),
                Arc::clone(&fs),
                cfg.transfer_settings(),
            ))
        } else {
            None
        };

        let executors = Executors::standard(fs, Arc::clone(&registry), remote.clone(), transfer);
        let dispatcher = Dispatcher::new(policy, sessions, executors, &registry)?;

        Ok(Self {
            dispatcher,
            registry,
            remote,
        })
    }

    /// Release the remote exec client, if any.
    pub fn shutdown(&self) {
        if let Some(remote) = &self.remote {
            remote.shutdown();
        }
    }
}

async fn fire_once(gateway: &Gateway, fire: FireArgs) -> Result<()> {
    let request = ExecutionRequest {
        user: fire.user,
        account: fire.account,
        base_path: fire.base,
        relative_file: fire.file,
        command_label: fire.command_label,
        transfer_id: fire.id,
        direction: fire.direction,
    };
    info!(
        user = %request.user,
        direction = %request.direction,
        file = %request.relative_file,
        "firing action"
    );

    let cancel = CancellationToken::new();
    spawn_ctrl_c(cancel.clone());

    let outcome = gateway
        .dispatcher
        .dispatch_for_user(request, &cancel)
        .await
        .wait()
        .await;

    match outcome {
        Outcome::Success => {
            println!("success");
            Ok(())
        }
        Outcome::SuccessWithWarning => {
            println!("success (warning)");
            Ok(())
        }
        Outcome::Failure(failure) => {
            println!("failure: {} ({})", failure, failure.label());
            Err(anyhow!("action failed: {failure}"))
        }
    }
}

async fn run_daemon(args: DaemonArgs) -> Result<()> {
    let server = RemoteExecServer::bind(&args.listen, delay_from_millis(args.default_delay_ms))
        .await
        .with_context(|| format!("binding remote exec daemon on {}", args.listen))?;

    let cancel = CancellationToken::new();
    spawn_ctrl_c(cancel.clone());

    server.serve(cancel).await?;
    Ok(())
}

/// Ctrl-C → cancel `token`.
fn spawn_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("failed to listen for Ctrl+C: {e}");
            return;
        }
        token.cancel();
    });
}

/// Dry-run output: resolved policies, rules and tasks.
fn print_check(cfg: &ConfigFile, gateway: &Gateway) {
    let dispatcher = &gateway.dispatcher;
    println!("execgate check");
    println!("  default policy: {}", dispatcher.default_policy());
    for (user, policy) in dispatcher.sessions() {
        println!("  user {user}: {policy}");
    }
    println!();

    println!("rules ({}):", cfg.rules.len());
    for (name, rule) in &cfg.rules {
        println!("  - {name}: {}", rule.mode);
    }

    println!("tasks: {}", gateway.registry.names().join(", "));

    if cfg.remote_exec.enabled {
        println!("remote exec: {}", cfg.remote_exec.socket_address());
    } else {
        println!("remote exec: disabled");
    }

    debug!("check complete (no execution)");
}

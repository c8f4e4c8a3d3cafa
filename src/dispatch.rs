// src/dispatch.rs

//! Dispatcher: picks the action for an operation and runs it.
//!
//! For one [`ExecutionRequest`]:
//!
//! 1. the session policy (if any) or the default policy gives the spec for
//!    the request's direction;
//! 2. a `NONE` spec coming from a session override succeeds at once;
//! 3. a refused spec fails with `OperationRefused`, nothing is rendered;
//! 4. otherwise the command template is rendered and handed to the executor
//!    matching the spec's kind, with a child of the caller's cancel token.
//!
//! Dispatch never returns an error: every fault ends up as a resolved
//! `Failure` on the completion signal.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::errors::{ExecGateError, Result};
use crate::exec::{
    ActionExecutor, NoOpExecutor, ProcessExecutor, TaskExecutor, TaskRegistry,
    TransferSubmissionExecutor,
};
use crate::fs::FileSystem;
use crate::policy::{ActionKind, OperationPolicy};
use crate::remote::RemoteExecBootstrap;
use crate::signal::{ActionFailure, CompletionSignal, Outcome};
use crate::template::{self, TemplateValues};
use crate::types::ExecutionRequest;

/// One executor per action kind.
#[derive(Clone)]
pub struct Executors {
    pub noop: Arc<dyn ActionExecutor>,
    pub process: Arc<dyn ActionExecutor>,
    pub task: Arc<dyn ActionExecutor>,
    /// `None` when no transfer store is configured.
    pub transfer: Option<Arc<dyn ActionExecutor>>,
}

impl Executors {
    /// Production wiring.
    pub fn standard(
        fs: Arc<dyn FileSystem>,
        registry: Arc<TaskRegistry>,
        remote: Option<Arc<RemoteExecBootstrap>>,
        transfer: Option<TransferSubmissionExecutor>,
    ) -> Self {
        let remote_delegation = remote.is_some();
        let mut process = ProcessExecutor::new(fs);
        if let Some(bootstrap) = remote {
            process = process.with_remote(bootstrap);
        }

        Self {
            noop: Arc::new(NoOpExecutor),
            process: Arc::new(process),
            task: Arc::new(TaskExecutor::new(registry, remote_delegation)),
            transfer: transfer.map(|t| Arc::new(t) as Arc<dyn ActionExecutor>),
        }
    }
}

pub struct Dispatcher {
    policy: OperationPolicy,
    sessions: BTreeMap<String, OperationPolicy>,
    executors: Executors,
}

impl Dispatcher {
    /// Build a dispatcher, rejecting configurations that can never work:
    /// a `JAVAEXECUTE` action naming a task missing from `registry`, or a
    /// `R66PREPARETRANSFER` action without a transfer executor.
    pub fn new(
        policy: OperationPolicy,
        sessions: BTreeMap<String, OperationPolicy>,
        executors: Executors,
        registry: &TaskRegistry,
    ) -> Result<Self> {
        validate_policy("default", &policy, &executors, registry)?;
        for (user, session) in &sessions {
            validate_policy(user, session, &executors, registry)?;
        }

        info!(policy = %policy, sessions = sessions.len(), "dispatcher ready");
        Ok(Self {
            policy,
            sessions,
            executors,
        })
    }

    pub fn default_policy(&self) -> &OperationPolicy {
        &self.policy
    }

    /// Per-user override policy, if `user` has one.
    pub fn session_policy(&self, user: &str) -> Option<&OperationPolicy> {
        self.sessions.get(user)
    }

    pub fn sessions(&self) -> impl Iterator<Item = (&str, &OperationPolicy)> {
        self.sessions.iter().map(|(user, p)| (user.as_str(), p))
    }

    /// Run the action for `request` and return its resolved signal.
    pub async fn dispatch(
        &self,
        request: ExecutionRequest,
        session: Option<&OperationPolicy>,
        cancel: &CancellationToken,
    ) -> CompletionSignal {
        CompletionSignal::resolved(self.run(request, session, cancel).await)
    }

    /// Like [`Dispatcher::dispatch`], with the session looked up from the
    /// request's user.
    pub async fn dispatch_for_user(
        &self,
        request: ExecutionRequest,
        cancel: &CancellationToken,
    ) -> CompletionSignal {
        let session = self.sessions.get(&request.user);
        self.dispatch(request, session, cancel).await
    }

    /// Run the action on a spawned task; the signal resolves when it ends.
    pub fn spawn(
        self: &Arc<Self>,
        request: ExecutionRequest,
        session: Option<OperationPolicy>,
        cancel: CancellationToken,
    ) -> CompletionSignal {
        let (resolver, signal) = CompletionSignal::pending();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = this.run(request, session.as_ref(), &cancel).await;
            if resolver.resolve(outcome).is_err() {
                error!("completion signal resolved twice");
            }
        });
        signal
    }

    async fn run(
        &self,
        request: ExecutionRequest,
        session: Option<&OperationPolicy>,
        cancel: &CancellationToken,
    ) -> Outcome {
        let policy = self.policy.resolve(session);
        let spec = policy.spec(request.direction);

        if policy.is_override() && spec.kind == ActionKind::NoOp {
            debug!(
                user = %request.user,
                direction = %request.direction,
                "session override: no action"
            );
            return Outcome::Success;
        }

        if spec.refused {
            error!(
                user = %request.user,
                direction = %request.direction,
                file = %request.relative_file,
                "operation refused by policy"
            );
            return Outcome::Failure(ActionFailure::OperationRefused);
        }

        let executor = match spec.kind {
            ActionKind::NoOp => &self.executors.noop,
            ActionKind::Process => &self.executors.process,
            ActionKind::InProcessTask => &self.executors.task,
            ActionKind::TransferSubmission => match &self.executors.transfer {
                Some(transfer) => transfer,
                None => {
                    error!("transfer submission requested but no transfer store is configured");
                    return Outcome::Failure(ActionFailure::SubmissionFailed(
                        "no transfer store configured".into(),
                    ));
                }
            },
            ActionKind::Refused => return Outcome::Failure(ActionFailure::OperationRefused),
        };

        let command = template::render(&spec.command, &TemplateValues::from(&request));
        debug!(
            kind = %spec.kind,
            direction = %request.direction,
            template = %spec.command,
            command = %command,
            "rendered action"
        );

        let outcome = executor
            .execute(command, spec.delay, cancel.child_token())
            .await;
        debug!(kind = %spec.kind, outcome = ?outcome, "action finished");
        outcome
    }
}

fn validate_policy(
    owner: &str,
    policy: &OperationPolicy,
    executors: &Executors,
    registry: &TaskRegistry,
) -> Result<()> {
    for (direction, spec) in policy.specs() {
        if spec.kind == ActionKind::InProcessTask {
            let name = spec.command.split_whitespace().next().unwrap_or_default();
            if !registry.contains(name) {
                error!(owner, %direction, task = name, "unknown in-process task in policy");
                return Err(ExecGateError::TaskNotFound(format!(
                    "{name:?} ({owner} {direction} action); known tasks: {:?}",
                    registry.names()
                )));
            }
        }
    }

    if policy.requires_transfer_store() && executors.transfer.is_none() {
        return Err(ExecGateError::ConfigError(format!(
            "{owner} policy queues transfers but no transfer store is configured"
        )));
    }
    Ok(())
}

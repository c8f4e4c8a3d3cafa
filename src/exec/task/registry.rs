// src/exec/task/registry.rs

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::exec::task::builtin;
use crate::fs::FileSystem;

pub type TaskFuture = Pin<Box<dyn Future<Output = i32> + Send + 'static>>;

/// Parameters handed to a task factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSettings {
    /// Always true for dispatched tasks: the caller waits for the status.
    pub wait_for_completion: bool,
    /// Whether external commands the task launches should go through the
    /// remote exec daemon.
    pub remote_delegation: bool,
    pub delay: Duration,
    pub task_name: String,
    pub args: Vec<String>,
}

/// A unit of in-process work located by name.
///
/// The returned future resolves to a status: 0 success, 1 warning, anything
/// else failure. Long-running tasks should watch `cancel` and stop early when
/// it fires.
pub trait InProcessTask: Send {
    fn run(self: Box<Self>, cancel: CancellationToken) -> TaskFuture;
}

pub type TaskFactory = Arc<dyn Fn(TaskSettings) -> Box<dyn InProcessTask> + Send + Sync>;

/// Explicit name → factory table.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    factories: HashMap<String, TaskFactory>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in `log` and `digest` tasks.
    pub fn with_builtins(fs: Arc<dyn FileSystem>) -> Self {
        let mut registry = Self::new();
        registry.register(builtin::LOG_TASK, |settings| {
            Box::new(builtin::LogTask::new(settings))
        });
        registry.register(builtin::DIGEST_TASK, move |settings| {
            Box::new(builtin::DigestTask::new(settings, Arc::clone(&fs)))
        });
        registry
    }

    /// Register `factory` under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(TaskSettings) -> Box<dyn InProcessTask> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn get(&self, name: &str) -> Option<&TaskFactory> {
        self.factories.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.names())
            .finish()
    }
}

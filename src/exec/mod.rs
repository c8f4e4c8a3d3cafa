// src/exec/mod.rs

//! Action execution layer.
//!
//! Every executor takes an already-rendered command line, a delay and a
//! cancellation token, and reports back an [`Outcome`](crate::signal::Outcome).
//!
//! - [`backend`] provides the `ActionExecutor` trait the dispatcher calls
//!   through, plus the no-op executor.
//! - [`process`] runs subprocesses under a watchdog (`EXECUTE`).
//! - [`task`] runs registered in-process tasks (`JAVAEXECUTE`).
//! - [`transfer`] queues follow-up transfers (`R66PREPARETRANSFER`).

pub mod backend;
pub mod process;
pub mod task;
pub mod transfer;

pub use backend::{ActionExecutor, ActionFuture, NoOpExecutor};
pub use process::ProcessExecutor;
pub use task::{TaskExecutor, TaskRegistry};
pub use transfer::{TransferSettings, TransferSubmissionExecutor};

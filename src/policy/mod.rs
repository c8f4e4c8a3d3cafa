// src/policy/mod.rs

//! Action policy: what runs around a store or retrieve operation.
//!
//! One configuration line per direction selects the action:
//!
//! | prefix               | kind                  | payload                      |
//! |----------------------|-----------------------|------------------------------|
//! | `REFUSED`            | `Refused`             | none, the operation is denied|
//! | `EXECUTE`            | `Process`             | command line                 |
//! | `JAVAEXECUTE`        | `InProcessTask`       | task name + arguments        |
//! | `R66PREPARETRANSFER` | `TransferSubmission`  | transfer DSL                 |
//! | anything else        | `NoOp`                | ignored (`NONE` is stripped) |
//!
//! - [`spec`] holds the parsed [`ActionSpec`].
//! - [`operation`] holds the per-direction [`OperationPolicy`] and the
//!   per-user override derivation.

pub mod operation;
pub mod spec;

pub use operation::{DirectionOverride, OperationPolicy};
pub use spec::{ActionKind, ActionSpec, delay_from_millis};

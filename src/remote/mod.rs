// src/remote/mod.rs

//! Remote exec daemon: a companion process that runs commands on behalf of
//! the gateway.
//!
//! - [`protocol`] is the line-delimited wire format and status codes.
//! - [`client`] is what the process executor uses to delegate a command.
//! - [`server`] is the daemon itself (`execgate daemon`).

pub mod client;
pub mod protocol;
pub mod server;

pub use client::{RemoteExecBootstrap, RemoteExecClient, RemoteExecError, RemoteExecSettings};
pub use protocol::{DaemonReply, DaemonRequest};
pub use server::RemoteExecServer;

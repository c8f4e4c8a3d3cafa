// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! [`ExecGateError`] covers configuration and startup faults. Faults that
//! happen while a dispatch runs never use this type: they are folded into
//! [`crate::signal::ActionFailure`] and delivered through the completion
//! signal instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecGateError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ExecGateError>;

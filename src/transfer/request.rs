// src/transfer/request.rs

//! Transfer submission argument language.
//!
//! ```text
//! -to host -file path -rule rule [-md5] [-block n] [-nolog]
//!     [-start yyyyMMddHHmmss | -delay (+ms|epochMs)] [-info text...]
//! ```
//!
//! Flags match case-insensitively. Unknown tokens are skipped. `-info` takes
//! every remaining token. When both `-start` and `-delay` are given, the last
//! one wins.

use chrono::{DateTime, Local, NaiveDateTime, TimeDelta, TimeZone, Utc};
use thiserror::Error;
use tracing::debug;

/// Info used when `-info` is absent.
pub const DEFAULT_INFO: &str = "noinfo";

/// Smallest accepted `-block` value; anything lower falls back to the default.
pub const MIN_BLOCK_SIZE: u32 = 100;

const START_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DslError {
    #[error("flag {0} needs a value")]
    MissingValue(String),

    #[error("invalid -block value: {0}")]
    InvalidBlock(String),

    #[error("invalid -delay value: {0}")]
    InvalidDelay(String),

    #[error("mandatory argument is missing: -to {to} -rule {rule} -file {file}")]
    MissingMandatory {
        to: String,
        rule: String,
        file: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub to: Option<String>,
    pub file: Option<String>,
    pub rule: Option<String>,
    pub md5: bool,
    /// Raw `-block` value, before the minimum is applied.
    pub block_size: Option<u32>,
    pub no_log: bool,
    pub start_at: Option<DateTime<Utc>>,
    pub info: String,
}

impl Default for TransferRequest {
    fn default() -> Self {
        Self {
            to: None,
            file: None,
            rule: None,
            md5: false,
            block_size: None,
            no_log: false,
            start_at: None,
            info: DEFAULT_INFO.to_string(),
        }
    }
}

impl TransferRequest {
    pub fn parse(command: &str) -> Result<Self, DslError> {
        Self::parse_at(command, Utc::now())
    }

    /// Parse with `now` as the base for relative `-delay +ms` values.
    pub fn parse_at(command: &str, now: DateTime<Utc>) -> Result<Self, DslError> {
        let mut req = TransferRequest::default();
        let mut tokens = command.split_whitespace();

        while let Some(token) = tokens.next() {
            let flag = token.to_ascii_lowercase();
            match flag.as_str() {
                "-to" => req.to = Some(value(&mut tokens, token)?.to_string()),
                "-file" => req.file = Some(value(&mut tokens, token)?.to_string()),
                "-rule" => req.rule = Some(value(&mut tokens, token)?.to_string()),
                "-md5" => req.md5 = true,
                "-nolog" => req.no_log = true,
                "-block" => {
                    let raw = value(&mut tokens, token)?;
                    let size = raw
                        .parse::<u32>()
                        .map_err(|_| DslError::InvalidBlock(raw.to_string()))?;
                    req.block_size = Some(size);
                }
                "-start" => {
                    let raw = value(&mut tokens, token)?;
                    match parse_start(raw) {
                        Some(at) => req.start_at = Some(at),
                        None => debug!(value = raw, "ignoring unparseable -start"),
                    }
                }
                "-delay" => {
                    let raw = value(&mut tokens, token)?;
                    req.start_at = Some(parse_delay(raw, now)?);
                }
                "-info" => {
                    let rest: Vec<&str> = tokens.by_ref().collect();
                    if rest.is_empty() {
                        return Err(DslError::MissingValue(token.to_string()));
                    }
                    req.info = rest.join(" ");
                }
                _ => debug!(token, "ignoring unknown transfer argument"),
            }
        }

        Ok(req)
    }

    /// `(to, rule, file)`, or an error naming what is missing.
    pub fn mandatory(&self) -> Result<(&str, &str, &str), DslError> {
        match (&self.to, &self.rule, &self.file) {
            (Some(to), Some(rule), Some(file)) => Ok((to, rule, file)),
            _ => Err(DslError::MissingMandatory {
                to: self.to.clone().unwrap_or_default(),
                rule: self.rule.clone().unwrap_or_default(),
                file: self.file.clone().unwrap_or_default(),
            }),
        }
    }

    /// `-block` if it is at least [`MIN_BLOCK_SIZE`], `default` otherwise.
    pub fn effective_block_size(&self, default: u32) -> u32 {
        match self.block_size {
            Some(size) if size >= MIN_BLOCK_SIZE => size,
            Some(size) => {
                tracing::warn!(
                    block_size = size,
                    default,
                    "block size too small; using default"
                );
                default
            }
            None => default,
        }
    }
}

fn value<'a>(tokens: &mut impl Iterator<Item = &'a str>, flag: &str) -> Result<&'a str, DslError> {
    tokens
        .next()
        .ok_or_else(|| DslError::MissingValue(flag.to_string()))
}

/// `yyyyMMddHHmmss` in local time.
fn parse_start(raw: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw, START_FORMAT).ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|at| at.with_timezone(&Utc))
}

/// `+ms` relative to `now`, or an absolute epoch in milliseconds.
fn parse_delay(raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, DslError> {
    let invalid = || DslError::InvalidDelay(raw.to_string());

    if let Some(rel) = raw.strip_prefix('+') {
        let ms = rel.parse::<i64>().map_err(|_| invalid())?;
        let delta = TimeDelta::try_milliseconds(ms).ok_or_else(invalid)?;
        return now.checked_add_signed(delta).ok_or_else(invalid);
    }

    let epoch = raw.parse::<i64>().map_err(|_| invalid())?;
    DateTime::from_timestamp_millis(epoch).ok_or_else(invalid)
}

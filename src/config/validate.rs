// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{ExecGateError, Result};
use crate::transfer::request::MIN_BLOCK_SIZE;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::ExecGateError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_transfer(cfg)?;
    validate_remote_exec(cfg)?;
    validate_names(cfg)?;
    Ok(())
}

fn validate_transfer(cfg: &RawConfigFile) -> Result<()> {
    if cfg.transfer.block_size < MIN_BLOCK_SIZE {
        return Err(ExecGateError::ConfigError(format!(
            "[transfer].block_size must be >= {} (got {})",
            MIN_BLOCK_SIZE, cfg.transfer.block_size
        )));
    }
    Ok(())
}

fn validate_remote_exec(cfg: &RawConfigFile) -> Result<()> {
    let remote = &cfg.remote_exec;
    if !remote.enabled {
        return Ok(());
    }

    if remote.address.trim().is_empty() {
        return Err(ExecGateError::ConfigError(
            "[remote_exec].address must not be empty when enabled".to_string(),
        ));
    }
    if remote.port == 0 {
        return Err(ExecGateError::ConfigError(
            "[remote_exec].port must not be 0 when enabled".to_string(),
        ));
    }
    if remote.connect_attempts == 0 {
        return Err(ExecGateError::ConfigError(
            "[remote_exec].connect_attempts must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_names(cfg: &RawConfigFile) -> Result<()> {
    if cfg.rules.keys().any(|name| name.trim().is_empty()) {
        return Err(ExecGateError::ConfigError(
            "rule names in [rules.<name>] must not be empty".to_string(),
        ));
    }
    if cfg.users.keys().any(|name| name.trim().is_empty()) {
        return Err(ExecGateError::ConfigError(
            "user names in [users.<name>] must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<ConfigFile> {
        let raw: RawConfigFile = toml::from_str(toml_src)?;
        ConfigFile::try_from(raw)
    }

    #[test]
    fn empty_config_is_valid() {
        let cfg = parse("").unwrap();
        assert!(!cfg.remote_exec.enabled);
        assert_eq!(cfg.transfer.block_size, 65536);
        assert!(cfg.remote_settings().is_none());
    }

    #[test]
    fn small_block_size_is_rejected() {
        let err = parse("[transfer]\nblock_size = 50\n").unwrap_err();
        assert!(matches!(err, ExecGateError::ConfigError(msg) if msg.contains("block_size")));
    }

    #[test]
    fn remote_checks_only_apply_when_enabled() {
        assert!(parse("[remote_exec]\nport = 0\n").is_ok());

        let err = parse("[remote_exec]\nenabled = true\nport = 0\n").unwrap_err();
        assert!(matches!(err, ExecGateError::ConfigError(msg) if msg.contains("port")));

        let err = parse("[remote_exec]\nenabled = true\nconnect_attempts = 0\n").unwrap_err();
        assert!(matches!(err, ExecGateError::ConfigError(msg) if msg.contains("connect_attempts")));
    }

    #[test]
    fn empty_names_are_rejected() {
        let err = parse("[users.\"\"]\nstore = \"REFUSED\"\n").unwrap_err();
        assert!(matches!(err, ExecGateError::ConfigError(msg) if msg.contains("user names")));

        let err = parse("[rules.\" \"]\nmode = \"send\"\n").unwrap_err();
        assert!(matches!(err, ExecGateError::ConfigError(msg) if msg.contains("rule names")));
    }

    #[test]
    fn unknown_mode_is_a_toml_error() {
        let err = parse("[rules.R]\nmode = \"sideways\"\n").unwrap_err();
        assert!(matches!(err, ExecGateError::TomlError(_)));
    }
}

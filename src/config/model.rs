// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::exec::transfer::{DEFAULT_BLOCK_SIZE, TransferSettings};
use crate::policy::{DirectionOverride, OperationPolicy, delay_from_millis};
use crate::remote::RemoteExecSettings;
use crate::remote::protocol::DEFAULT_PORT;
use crate::transfer::{ConfigRuleStore, TransferMode, TransferRule};

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [actions]
/// retrieve = "NONE"
/// store = "EXECUTE /usr/local/bin/on-store #BASEPATH##FILE#"
/// store_delay_ms = 5000
///
/// [remote_exec]
/// enabled = false
///
/// [transfer]
/// block_size = 65536
///
/// [rules.SENDRULE]
/// mode = "send"
///
/// [users.alice]
/// retrieve = "REFUSED"
/// ```
///
/// All sections are optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub actions: ActionsSection,

    #[serde(default)]
    pub remote_exec: RemoteExecSection,

    #[serde(default)]
    pub transfer: TransferSection,

    /// `[rules.<name>]` sections.
    #[serde(default)]
    pub rules: BTreeMap<String, RuleConfig>,

    /// `[users.<name>]` per-user action overrides.
    #[serde(default)]
    pub users: BTreeMap<String, UserOverride>,
}

/// Validated configuration. Only built through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub actions: ActionsSection,
    pub remote_exec: RemoteExecSection,
    pub transfer: TransferSection,
    pub rules: BTreeMap<String, RuleConfig>,
    pub users: BTreeMap<String, UserOverride>,
}

/// `[actions]` section: the process-wide default policy.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionsSection {
    #[serde(default)]
    pub retrieve: String,
    #[serde(default)]
    pub retrieve_delay_ms: u64,
    #[serde(default)]
    pub store: String,
    #[serde(default)]
    pub store_delay_ms: u64,
}

/// `[remote_exec]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteExecSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_remote_address")]
    pub address: String,
    #[serde(default = "default_remote_port")]
    pub port: u16,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_remote_address() -> String {
    "127.0.0.1".to_string()
}

fn default_remote_port() -> u16 {
    DEFAULT_PORT
}

fn default_connect_attempts() -> u32 {
    3
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

fn default_max_sessions() -> usize {
    16
}

impl Default for RemoteExecSection {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_remote_address(),
            port: default_remote_port(),
            connect_attempts: default_connect_attempts(),
            connect_timeout_ms: default_connect_timeout_ms(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl RemoteExecSection {
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// `[transfer]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferSection {
    #[serde(default = "default_block_size")]
    pub block_size: u32,
    #[serde(default = "default_queue_path")]
    pub queue_path: PathBuf,
    #[serde(default = "default_spool_dir")]
    pub spool_dir: PathBuf,
    /// Host alias → actual host id.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

fn default_block_size() -> u32 {
    DEFAULT_BLOCK_SIZE
}

fn default_queue_path() -> PathBuf {
    PathBuf::from(".execgate/queue.jsonl")
}

fn default_spool_dir() -> PathBuf {
    PathBuf::from(".execgate/spool")
}

impl Default for TransferSection {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
            queue_path: default_queue_path(),
            spool_dir: default_spool_dir(),
            aliases: BTreeMap::new(),
        }
    }
}

/// `[rules.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    pub mode: TransferMode,
}

/// `[users.<name>]` section. Empty strings inherit the default action.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserOverride {
    #[serde(default)]
    pub retrieve: String,
    #[serde(default)]
    pub retrieve_delay_ms: Option<u64>,
    #[serde(default)]
    pub store: String,
    #[serde(default)]
    pub store_delay_ms: Option<u64>,
}

impl UserOverride {
    pub fn store_override(&self) -> DirectionOverride {
        DirectionOverride {
            action: self.store.clone(),
            delay: self.store_delay_ms.map(delay_from_millis),
        }
    }

    pub fn retrieve_override(&self) -> DirectionOverride {
        DirectionOverride {
            action: self.retrieve.clone(),
            delay: self.retrieve_delay_ms.map(delay_from_millis),
        }
    }
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            actions: raw.actions,
            remote_exec: raw.remote_exec,
            transfer: raw.transfer,
            rules: raw.rules,
            users: raw.users,
        }
    }

    /// The process-wide default policy from `[actions]`.
    pub fn default_policy(&self) -> OperationPolicy {
        OperationPolicy::from_config(
            &self.actions.retrieve,
            delay_from_millis(self.actions.retrieve_delay_ms),
            &self.actions.store,
            delay_from_millis(self.actions.store_delay_ms),
        )
    }

    /// One derived policy per `[users.<name>]` section.
    pub fn session_policies(&self, default: &OperationPolicy) -> BTreeMap<String, OperationPolicy> {
        self.users
            .iter()
            .map(|(name, ov)| {
                (
                    name.clone(),
                    default.derive(&ov.store_override(), &ov.retrieve_override()),
                )
            })
            .collect()
    }

    pub fn rule_store(&self) -> ConfigRuleStore {
        ConfigRuleStore::new(self.rules.iter().map(|(name, rule)| TransferRule {
            name: name.clone(),
            mode: rule.mode,
        }))
    }

    pub fn transfer_settings(&self) -> TransferSettings {
        TransferSettings {
            default_block_size: self.transfer.block_size,
            aliases: self.transfer.aliases.clone(),
        }
    }

    /// Client settings when remote delegation is enabled.
    pub fn remote_settings(&self) -> Option<RemoteExecSettings> {
        let section = &self.remote_exec;
        section.enabled.then(|| RemoteExecSettings {
            address: section.socket_address(),
            connect_attempts: section.connect_attempts,
            connect_timeout: Duration::from_millis(section.connect_timeout_ms),
            max_sessions: section.max_sessions,
        })
    }
}

#![allow(dead_code)]

use execgate::config::{ConfigFile, RawConfigFile, RuleConfig, UserOverride};
use execgate::transfer::TransferMode;
use execgate::types::{Direction, ExecutionRequest};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn store(mut self, action: &str, delay_ms: u64) -> Self {
        self.config.actions.store = action.to_string();
        self.config.actions.store_delay_ms = delay_ms;
        self
    }

    pub fn retrieve(mut self, action: &str, delay_ms: u64) -> Self {
        self.config.actions.retrieve = action.to_string();
        self.config.actions.retrieve_delay_ms = delay_ms;
        self
    }

    pub fn with_rule(mut self, name: &str, mode: TransferMode) -> Self {
        self.config.rules.insert(name.to_string(), RuleConfig { mode });
        self
    }

    pub fn with_user(mut self, name: &str, user: UserOverride) -> Self {
        self.config.users.insert(name.to_string(), user);
        self
    }

    pub fn with_alias(mut self, alias: &str, host: &str) -> Self {
        self.config
            .transfer
            .aliases
            .insert(alias.to_string(), host.to_string());
        self
    }

    pub fn block_size(mut self, size: u32) -> Self {
        self.config.transfer.block_size = size;
        self
    }

    pub fn remote_exec(mut self, port: u16) -> Self {
        self.config.remote_exec.enabled = true;
        self.config.remote_exec.port = port;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `ExecutionRequest`.
pub struct RequestBuilder {
    request: ExecutionRequest,
}

impl RequestBuilder {
    pub fn new(direction: Direction) -> Self {
        Self {
            request: ExecutionRequest {
                user: "alice".to_string(),
                account: "acct".to_string(),
                base_path: "/srv/ftp".to_string(),
                relative_file: "/in/data.bin".to_string(),
                command_label: match direction {
                    Direction::Store => "STOR".to_string(),
                    Direction::Retrieve => "RETR".to_string(),
                },
                transfer_id: 1,
                direction,
            },
        }
    }

    pub fn user(mut self, user: &str) -> Self {
        self.request.user = user.to_string();
        self
    }

    pub fn base(mut self, base: &str) -> Self {
        self.request.base_path = base.to_string();
        self
    }

    pub fn file(mut self, file: &str) -> Self {
        self.request.relative_file = file.to_string();
        self
    }

    pub fn id(mut self, id: u64) -> Self {
        self.request.transfer_id = id;
        self
    }

    pub fn build(self) -> ExecutionRequest {
        self.request
    }
}

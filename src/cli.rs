// src/cli.rs

//! CLI argument parsing using `clap` (derive).

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::types::Direction;

/// Command-line arguments for `execgate`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "execgate",
    version,
    about = "Run the configured side-actions around file-transfer operations.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Execgate.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Execgate.toml", global = true)]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `EXECGATE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Parse + validate the config and print the resolved policies without
    /// running anything.
    Check,
    /// Dispatch one operation and print its outcome.
    Fire(FireArgs),
    /// Run the remote exec daemon.
    Daemon(DaemonArgs),
}

#[derive(Debug, Clone, Args)]
pub struct FireArgs {
    /// `store` or `retrieve` (also `stor` / `retr`).
    #[arg(long)]
    pub direction: Direction,

    #[arg(long)]
    pub user: String,

    #[arg(long, default_value = "")]
    pub account: String,

    /// Root of the user's file area.
    #[arg(long, default_value = "")]
    pub base: String,

    /// File path relative to `--base`.
    #[arg(long)]
    pub file: String,

    /// Protocol command label (e.g. `STOR`).
    #[arg(long = "command", default_value = "")]
    pub command_label: String,

    /// Transfer id substituted for `#SPECIALID#`.
    #[arg(long, default_value_t = 0)]
    pub id: u64,
}

#[derive(Debug, Clone, Args)]
pub struct DaemonArgs {
    /// Address to listen on.
    #[arg(long, value_name = "ADDR", default_value = "127.0.0.1:9999")]
    pub listen: String,

    /// Time limit for requests that carry none (0 = unlimited).
    #[arg(long, value_name = "MS", default_value_t = 0)]
    pub default_delay_ms: u64,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fire_arguments() {
        let args = CliArgs::try_parse_from([
            "execgate",
            "--config",
            "gw.toml",
            "fire",
            "--direction",
            "STOR",
            "--user",
            "alice",
            "--file",
            "/in/a.txt",
            "--id",
            "42",
        ])
        .unwrap();
        assert_eq!(args.config, "gw.toml");
        let Command::Fire(fire) = args.command else {
            panic!("expected fire");
        };
        assert_eq!(fire.direction, Direction::Store);
        assert_eq!(fire.id, 42);
        assert_eq!(fire.account, "");
    }

    #[test]
    fn daemon_defaults() {
        let args = CliArgs::try_parse_from(["execgate", "daemon", "--log-level", "debug"]).unwrap();
        let Command::Daemon(daemon) = args.command else {
            panic!("expected daemon");
        };
        assert_eq!(daemon.listen, "127.0.0.1:9999");
        assert_eq!(daemon.default_delay_ms, 0);
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    }
}

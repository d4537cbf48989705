use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error_handling::types::ConfigError;

fn default_poll_interval() -> u64 {
    2
}

fn default_poll_timeout() -> u64 {
    1
}

fn default_heartbeat_cycles() -> u64 {
    10
}

fn default_dashboard_port() -> u16 {
    8080
}

fn default_database_path() -> PathBuf {
    PathBuf::from("vigie.sqlite3")
}

/// Application configuration structure that defines all runtime parameters.
///
/// This structure holds the complete configuration for the monitor, including
/// capture timing, storage location and web UI settings. It uses the `clap`
/// and `toml` derive macros for respectively command-line and file argument
/// parsing.
///
/// # Fields Overview
///
/// The configuration contains the following attributes:
/// - `poll_interval_secs`: how often the OS socket tables are polled
/// - `poll_timeout_secs`: per-poll upper bound before the cycle is skipped
/// - `heartbeat_cycles`: emit a heartbeat event every Nth poll cycle
/// - `dashboard_port`: port of the web UI, also excluded from capture
/// - `web_ui_enabled`: if `true`, will start the web query surface
/// - `database_path`: location of the SQLite connection store
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(name = "vigie")]
pub struct Config {
    /// Interval between two socket-table polls, in seconds.
    ///
    /// # Command Line
    /// Use `--poll-interval-secs <SECONDS>` to set this value from the CLI
    #[arg(long, default_value_t = default_poll_interval())]
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Upper bound for a single poll of the OS socket tables, in seconds.
    ///
    /// When the underlying query does not return within this bound, the
    /// cycle is treated as an empty snapshot and the pipeline moves on to
    /// the next tick.
    ///
    /// # Command Line
    /// Use `--poll-timeout-secs <SECONDS>` to set this value from the CLI
    #[arg(long, default_value_t = default_poll_timeout())]
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,

    /// Emit a heartbeat event every Nth poll cycle.
    ///
    /// Heartbeats carry the active endpoint count so downstream consumers
    /// can detect liveness during quiet periods.
    ///
    /// # Command Line
    /// Use `--heartbeat-cycles <COUNT>` to set this value from the CLI
    #[arg(long, default_value_t = default_heartbeat_cycles())]
    #[serde(default = "default_heartbeat_cycles")]
    pub heartbeat_cycles: u64,

    /// Port number for the web query surface.
    ///
    /// Connections involving this port are the monitor's own dashboard
    /// traffic and are excluded from capture unconditionally, whether or
    /// not the web UI is enabled.
    ///
    /// # Command Line
    /// Use `--dashboard-port <PORT>` to set this value from the CLI
    #[arg(long, default_value_t = default_dashboard_port())]
    #[serde(default = "default_dashboard_port")]
    pub dashboard_port: u16,

    /// Enable or disable the read-only web query surface.
    ///
    /// # Command Line
    /// Use `--web-ui-enabled` flag to enable the web UI. This is a boolean
    /// flag that doesn't take a value - its presence enables the feature
    #[arg(long, action = clap::ArgAction::SetTrue)]
    #[serde(default)]
    pub web_ui_enabled: bool,

    /// File system path of the SQLite connection store.
    ///
    /// # Command Line
    /// Use `--database-path <PATH>` to set this value from the CLI
    #[arg(long, default_value = "vigie.sqlite3")]
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            poll_timeout_secs: default_poll_timeout(),
            heartbeat_cycles: default_heartbeat_cycles(),
            dashboard_port: default_dashboard_port(),
            web_ui_enabled: false,
            database_path: default_database_path(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by parsing command-line arguments.
    ///
    /// Validation is applied after parsing; out-of-range values are
    /// reported as [`ConfigError::NotInRange`].
    pub fn from_args() -> Result<Self, ConfigError> {
        let config = Config::parse();
        config.validate()?;
        Ok(config)
    }

    /// Creates a new `Config` instance from a TOML configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&contents).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::NotInRange(
                "poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.poll_timeout_secs == 0 {
            return Err(ConfigError::NotInRange(
                "poll_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.heartbeat_cycles == 0 {
            return Err(ConfigError::NotInRange(
                "heartbeat_cycles must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

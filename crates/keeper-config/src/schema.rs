//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    #[serde(default)]
    pub daemon: RawDaemonConfig,

    #[serde(default)]
    pub monitor: RawMonitorConfig,

    #[serde(default)]
    pub enforcement: RawEnforcementConfig,

    #[serde(default)]
    pub focus: RawFocusConfig,
}

/// Daemon-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawDaemonConfig {
    /// IPC socket path
    pub socket_path: Option<PathBuf>,

    /// Data directory for the store
    pub data_dir: Option<PathBuf>,
}

/// App monitor settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawMonitorConfig {
    /// Seconds between enforcement polls (default 3)
    pub poll_interval_seconds: Option<u64>,

    /// Terminate blocked processes when found (default true)
    pub auto_kill: Option<bool>,

    /// Start monitoring when the daemon starts (default false)
    pub start_on_launch: Option<bool>,
}

/// Website enforcement settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawEnforcementConfig {
    /// Hosts file to edit (default /etc/hosts)
    pub hosts_path: Option<PathBuf>,

    /// Address blocked domains resolve to (default 127.0.0.1)
    pub redirect_address: Option<String>,

    /// Upper bound on one enforcement call (default 5)
    pub timeout_seconds: Option<u64>,
}

/// Focus session settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawFocusConfig {
    /// Target used by clients that omit one (default 25)
    pub default_target_minutes: Option<u32>,
}

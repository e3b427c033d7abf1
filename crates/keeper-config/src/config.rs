//! Validated configuration structures

use crate::schema::{
    RawConfig, RawDaemonConfig, RawEnforcementConfig, RawFocusConfig, RawMonitorConfig,
};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

/// Validated configuration ready for use by the daemon and the engine
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub daemon: DaemonConfig,
    pub monitor: MonitorConfig,
    pub enforcement: EnforcementConfig,
    pub focus: FocusConfig,
}

impl Config {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            daemon: DaemonConfig::from_raw(raw.daemon),
            monitor: MonitorConfig::from_raw(raw.monitor),
            enforcement: EnforcementConfig::from_raw(raw.enforcement),
            focus: FocusConfig::from_raw(raw.focus),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub socket_path: PathBuf,
    pub data_dir: PathBuf,
}

impl DaemonConfig {
    fn from_raw(raw: RawDaemonConfig) -> Self {
        let defaults = Self::default();
        Self {
            socket_path: raw.socket_path.unwrap_or(defaults.socket_path),
            data_dir: raw.data_dir.unwrap_or(defaults.data_dir),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: keeper_util::socket_path_without_env(),
            data_dir: keeper_util::data_dir_without_env(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    pub auto_kill: bool,
    pub start_on_launch: bool,
}

impl MonitorConfig {
    fn from_raw(raw: RawMonitorConfig) -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: raw
                .poll_interval_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            auto_kill: raw.auto_kill.unwrap_or(defaults.auto_kill),
            start_on_launch: raw.start_on_launch.unwrap_or(defaults.start_on_launch),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            auto_kill: true,
            start_on_launch: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnforcementConfig {
    pub hosts_path: PathBuf,
    pub redirect_address: IpAddr,
    /// Bound on a single block/unblock call
    pub timeout: Duration,
}

impl EnforcementConfig {
    fn from_raw(raw: RawEnforcementConfig) -> Self {
        let defaults = Self::default();
        Self {
            hosts_path: raw.hosts_path.unwrap_or(defaults.hosts_path),
            redirect_address: raw
                .redirect_address
                .and_then(|a| a.parse().ok())
                .unwrap_or(defaults.redirect_address),
            timeout: raw
                .timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            hosts_path: PathBuf::from("/etc/hosts"),
            redirect_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FocusConfig {
    pub default_target_minutes: u32,
}

impl FocusConfig {
    fn from_raw(raw: RawFocusConfig) -> Self {
        Self {
            default_target_minutes: raw
                .default_target_minutes
                .unwrap_or(Self::default().default_target_minutes),
        }
    }
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            default_target_minutes: 25,
        }
    }
}

//! Shared types for the keeperd API

use chrono::{DateTime, Local};
use keeper_util::SessionId;
use serde::{Deserialize, Serialize};

/// Lifecycle phase of the focus session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusPhase {
    #[default]
    Idle,
    Running,
    Paused,
    /// Reached its target; terminal for that session instance
    Completed,
    /// Stopped early; terminal for that session instance
    Stopped,
}

impl FocusPhase {
    /// Whether a fresh session may be started from this phase
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Idle | Self::Completed | Self::Stopped)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }
}

/// Snapshot of the focus session, pushed every tick and returned by every
/// focus command.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FocusState {
    pub session_id: Option<SessionId>,
    pub phase: FocusPhase,
    pub is_running: bool,
    /// Seconds of focus accumulated in this session
    pub elapsed: u64,
    /// Target length in seconds
    pub target: u64,
    pub is_strict_mode: bool,
    pub started_at: Option<DateTime<Local>>,
    pub paused_at: Option<DateTime<Local>>,
}

impl FocusState {
    pub fn remaining(&self) -> u64 {
        self.target.saturating_sub(self.elapsed)
    }
}

/// Password lock status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStateInfo {
    pub is_locked: bool,
    /// Zero when unlocked, never negative
    pub remaining_seconds: u64,
    pub has_password: bool,
    pub lock_end_time: Option<DateTime<Local>>,
}

/// What a block event was counted against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockCategory {
    Website,
    App,
}

impl BlockCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Website => "website",
            Self::App => "app",
        }
    }
}

/// Counters for one calendar day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStats {
    /// Local date, `YYYY-MM-DD`
    pub date: String,
    pub focus_duration_seconds: u64,
    pub block_count: u64,
    pub websites_blocked: u64,
    pub apps_blocked: u64,
}

impl DailyStats {
    pub fn empty(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            focus_duration_seconds: 0,
            block_count: 0,
            websites_blocked: 0,
            apps_blocked: 0,
        }
    }
}

/// Today's counters plus lifetime totals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsData {
    pub today: DailyStats,
    pub total_focus_seconds: u64,
    pub total_blocks: u64,
}

/// A process seen by the process inspector. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningProcess {
    pub name: String,
    pub pid: u32,
    pub exe: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillFailure {
    pub pid: u32,
    pub reason: String,
}

/// Per-pid outcome of a termination request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillReport {
    pub killed: Vec<u32>,
    pub failures: Vec<KillFailure>,
}

impl KillReport {
    pub fn killed_count(&self) -> usize {
        self.killed.len()
    }

    pub fn merge(&mut self, other: KillReport) {
        self.killed.extend(other.killed);
        self.failures.extend(other.failures);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnblockFailure {
    pub domain: String,
    pub reason: String,
}

/// Outcome of clearing the website blocklist. Every listed domain is gone
/// from the store; `failures` still need an enforcement retry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnblockReport {
    pub removed: Vec<String>,
    pub failures: Vec<UnblockFailure>,
}

/// Result of one domain in a batch block request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebsiteOutcome {
    pub domain: String,
    pub error: Option<crate::ErrorInfo>,
}

/// Full daemon state snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStateSnapshot {
    pub api_version: u32,
    pub focus: FocusState,
    pub lock: LockStateInfo,
    pub monitoring: bool,
    pub blocked_websites: Vec<String>,
    pub blocked_apps: Vec<String>,
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
    pub store_ok: bool,
    pub monitoring: bool,
}

//! Audit event types

use chrono::{DateTime, Local};
use keeper_api::BlockCategory;
use keeper_util::SessionId;
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    DaemonStarted,

    DaemonStopped,

    FocusStarted {
        session_id: SessionId,
        target_seconds: u64,
        strict_mode: bool,
    },

    FocusPaused {
        session_id: SessionId,
        elapsed: u64,
    },

    FocusResumed {
        session_id: SessionId,
    },

    FocusCompleted {
        session_id: SessionId,
        duration: u64,
    },

    FocusStopped {
        session_id: SessionId,
        elapsed: u64,
    },

    Blocked {
        category: BlockCategory,
        name: String,
    },

    Unblocked {
        category: BlockCategory,
        name: String,
    },

    /// The monitor or a client terminated a process. `name` is unknown for
    /// kills requested by pid.
    ProcessKilled { name: Option<String>, pid: u32 },

    MonitoringChanged { active: bool },

    PasswordSet,

    PasswordChanged,

    Locked { until: DateTime<Local> },

    /// `manual` is false when the lock expired on its own
    Unlocked { manual: bool },

    /// An unlock attempt with the wrong password
    UnlockRejected,

    StatsReset { day: String },

    ClientConnected {
        client_id: String,
        uid: Option<u32>,
    },

    ClientDisconnected { client_id: String },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Set by the store
    pub id: i64,
    pub timestamp: DateTime<Local>,
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0,
            timestamp: keeper_util::now(),
            event,
        }
    }
}

//! Event types for keeperd -> client streaming

use chrono::{DateTime, Local};
use keeper_util::SessionId;
use serde::{Deserialize, Serialize};

use crate::{FocusState, LockStateInfo, API_VERSION};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Local>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: keeper_util::now(),
            payload,
        }
    }
}

/// All possible events from the daemon to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Per-second snapshot while a session is running
    FocusTick(FocusState),

    /// One-shot: the session reached its target
    FocusCompleted {
        session_id: SessionId,
        /// Session length in seconds
        duration: u64,
    },

    /// Start, pause, resume, or stop
    FocusStateChanged(FocusState),

    /// The monitor terminated a blocked process
    AppTerminated { name: String, pid: u32 },

    MonitoringChanged { active: bool },

    LockChanged(LockStateInfo),

    /// Daemon is shutting down
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FocusPhase;

    #[test]
    fn tick_event_serialization() {
        let event = Event::new(EventPayload::FocusTick(FocusState {
            phase: FocusPhase::Running,
            is_running: true,
            elapsed: 12,
            target: 1500,
            ..Default::default()
        }));

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"focus_tick\""));

        let parsed: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.api_version, API_VERSION);
        match parsed.payload {
            EventPayload::FocusTick(state) => assert_eq!(state.elapsed, 12),
            other => panic!("Expected FocusTick, got {:?}", other),
        }
    }

    #[test]
    fn completion_event_carries_duration() {
        let event = Event::new(EventPayload::FocusCompleted {
            session_id: SessionId::new(),
            duration: 1500,
        });
        let json = serde_json::to_string(&event).unwrap();
        let parsed: Event = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            parsed.payload,
            EventPayload::FocusCompleted { duration: 1500, .. }
        ));
    }
}

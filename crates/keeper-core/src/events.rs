//! Core events emitted by the engine

use keeper_api::{EventPayload, FocusState, LockStateInfo};
use keeper_util::SessionId;
use tokio::sync::broadcast;

/// Capacity of the core event channel. A subscriber that falls further
/// behind than this misses ticks, never state.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Events emitted by the engine
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// Per-second snapshot while a session runs
    FocusTick(FocusState),

    /// Session reached its target. Focus seconds are already credited.
    FocusCompleted { session_id: SessionId, duration: u64 },

    FocusStateChanged(FocusState),

    AppTerminated { name: String, pid: u32 },

    MonitoringChanged { active: bool },

    LockChanged(LockStateInfo),
}

impl From<CoreEvent> for EventPayload {
    fn from(event: CoreEvent) -> Self {
        match event {
            CoreEvent::FocusTick(state) => EventPayload::FocusTick(state),
            CoreEvent::FocusCompleted {
                session_id,
                duration,
            } => EventPayload::FocusCompleted {
                session_id,
                duration,
            },
            CoreEvent::FocusStateChanged(state) => EventPayload::FocusStateChanged(state),
            CoreEvent::AppTerminated { name, pid } => EventPayload::AppTerminated { name, pid },
            CoreEvent::MonitoringChanged { active } => EventPayload::MonitoringChanged { active },
            CoreEvent::LockChanged(info) => EventPayload::LockChanged(info),
        }
    }
}

/// Sending half shared by every component
pub type EventSender = broadcast::Sender<CoreEvent>;

pub(crate) fn emit(events: &EventSender, event: CoreEvent) {
    // No subscribers is not an error
    let _ = events.send(event);
}

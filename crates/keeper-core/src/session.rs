//! Focus session state machine
//!
//! Pure state: no clocks are read here. The caller supplies wall-clock time
//! for the user-facing timestamps and the monotonic tick instant, so every
//! transition is deterministic under test.

use chrono::{DateTime, Local};
use keeper_api::{FocusPhase, FocusState};
use keeper_util::{KeeperError, MonotonicInstant, Result, SessionId};

/// Upper bound on a session target (one day)
pub const MAX_TARGET_MINUTES: u32 = 24 * 60;

/// Result of a single tick
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub state: FocusState,
    /// Set on the tick that reached the target, never on any other
    pub completed: Option<Completion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub session_id: SessionId,
    pub duration: u64,
}

/// The single focus session
#[derive(Debug, Default)]
pub struct FocusSession {
    session_id: Option<SessionId>,
    phase: FocusPhase,
    elapsed: u64,
    target: u64,
    strict: bool,
    started_at: Option<DateTime<Local>>,
    paused_at: Option<DateTime<Local>>,
    last_tick: Option<MonotonicInstant>,
}

impl FocusSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> FocusPhase {
        self.phase
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn last_tick(&self) -> Option<MonotonicInstant> {
        self.last_tick
    }

    pub fn snapshot(&self) -> FocusState {
        FocusState {
            session_id: self.session_id,
            phase: self.phase,
            is_running: self.phase == FocusPhase::Running,
            elapsed: self.elapsed,
            target: self.target,
            is_strict_mode: self.strict,
            started_at: self.started_at,
            paused_at: self.paused_at,
        }
    }

    /// Begin a fresh session. Allowed from Idle, Completed and Stopped.
    pub fn start(
        &mut self,
        target_minutes: u32,
        strict: bool,
        now: DateTime<Local>,
    ) -> Result<FocusState> {
        if !self.phase.can_start() {
            return Err(KeeperError::AlreadyRunning);
        }
        if target_minutes == 0 || target_minutes > MAX_TARGET_MINUTES {
            return Err(KeeperError::InvalidDuration(format!(
                "target must be 1..={} minutes, got {}",
                MAX_TARGET_MINUTES, target_minutes
            )));
        }

        *self = Self {
            session_id: Some(SessionId::new()),
            phase: FocusPhase::Running,
            elapsed: 0,
            target: u64::from(target_minutes) * 60,
            strict,
            started_at: Some(now),
            paused_at: None,
            last_tick: None,
        };
        Ok(self.snapshot())
    }

    /// `lock_active` is whether the password lock currently holds; a strict
    /// session cannot be paused while it does.
    pub fn pause(&mut self, now: DateTime<Local>, lock_active: bool) -> Result<FocusState> {
        if self.phase != FocusPhase::Running {
            return Err(KeeperError::NotRunning);
        }
        if self.strict && lock_active {
            return Err(KeeperError::StrictModeActive);
        }
        self.phase = FocusPhase::Paused;
        self.paused_at = Some(now);
        Ok(self.snapshot())
    }

    pub fn resume(&mut self) -> Result<FocusState> {
        if self.phase != FocusPhase::Paused {
            return Err(KeeperError::NotPaused);
        }
        self.phase = FocusPhase::Running;
        self.paused_at = None;
        Ok(self.snapshot())
    }

    /// End the session early. Elapsed seconds are kept in the snapshot but
    /// are not credited as focus time.
    pub fn stop(&mut self, lock_active: bool) -> Result<FocusState> {
        if !self.phase.is_active() {
            return Err(KeeperError::NotRunning);
        }
        if self.strict && lock_active {
            return Err(KeeperError::StrictModeActive);
        }
        self.phase = FocusPhase::Stopped;
        self.paused_at = None;
        Ok(self.snapshot())
    }

    /// Advance one second. A no-op unless Running.
    pub fn tick(&mut self, now_mono: MonotonicInstant) -> TickOutcome {
        if self.phase != FocusPhase::Running {
            return TickOutcome {
                state: self.snapshot(),
                completed: None,
            };
        }

        self.last_tick = Some(now_mono);
        self.elapsed = (self.elapsed + 1).min(self.target);

        let completed = if self.elapsed >= self.target {
            self.phase = FocusPhase::Completed;
            self.session_id.map(|session_id| Completion {
                session_id,
                duration: self.elapsed,
            })
        } else {
            None
        };

        TickOutcome {
            state: self.snapshot(),
            completed,
        }
    }
}

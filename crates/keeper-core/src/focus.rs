//! Focus timer
//!
//! Drives the [`FocusSession`] once per second from a tokio task. Each
//! spawned timer carries the generation it was started under; pause, stop
//! and completion bump the generation under the session mutex, so a stale
//! timer observes the change on its next tick and exits without touching
//! state.

use chrono::{DateTime, Local};
use keeper_api::{FocusPhase, FocusState};
use keeper_store::{AuditEvent, AuditEventType, Store};
use keeper_util::{KeeperError, MonotonicInstant, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::events::{emit, CoreEvent, EventSender};
use crate::lock::LockManager;
use crate::session::FocusSession;
use crate::stats::StatsAggregator;

const TICK: Duration = Duration::from_secs(1);

struct TimerCell {
    session: FocusSession,
    generation: u64,
    timer_active: bool,
}

struct FocusInner {
    cell: Mutex<TimerCell>,
    lock: Arc<LockManager>,
    stats: Arc<StatsAggregator>,
    store: Arc<dyn Store>,
    events: EventSender,
}

impl FocusInner {
    fn cell(&self) -> Result<MutexGuard<'_, TimerCell>> {
        self.cell
            .lock()
            .map_err(|_| KeeperError::internal("focus session mutex poisoned"))
    }
}

pub struct FocusController {
    inner: Arc<FocusInner>,
}

impl FocusController {
    pub fn new(
        lock: Arc<LockManager>,
        stats: Arc<StatsAggregator>,
        store: Arc<dyn Store>,
        events: EventSender,
    ) -> Self {
        Self {
            inner: Arc::new(FocusInner {
                cell: Mutex::new(TimerCell {
                    session: FocusSession::new(),
                    generation: 0,
                    timer_active: false,
                }),
                lock,
                stats,
                store,
                events,
            }),
        }
    }

    pub fn state(&self) -> Result<FocusState> {
        Ok(self.inner.cell()?.session.snapshot())
    }

    /// Start a fresh session and its timer
    pub fn start(
        &self,
        target_minutes: u32,
        strict: bool,
        now: DateTime<Local>,
    ) -> Result<FocusState> {
        let (state, generation) = {
            let mut cell = self.inner.cell()?;
            let state = cell.session.start(target_minutes, strict, now)?;
            cell.generation += 1;
            cell.timer_active = true;
            (state, cell.generation)
        };
        spawn_timer(self.inner.clone(), generation);

        if let Some(session_id) = state.session_id {
            let _ = self.inner.store.append_audit(AuditEvent::new(
                AuditEventType::FocusStarted {
                    session_id,
                    target_seconds: state.target,
                    strict_mode: strict,
                },
            ));
            info!(session_id = %session_id, target_secs = state.target, strict, "Focus session started");
        }
        emit(&self.inner.events, CoreEvent::FocusStateChanged(state.clone()));
        Ok(state)
    }

    pub fn pause(&self, now: DateTime<Local>) -> Result<FocusState> {
        // Lock state first; the lock manager never calls back into us
        let lock_active = self.inner.lock.is_locked(now)?;
        let state = {
            let mut cell = self.inner.cell()?;
            let state = cell.session.pause(now, lock_active)?;
            cell.generation += 1;
            cell.timer_active = false;
            state
        };

        if let Some(session_id) = state.session_id {
            let _ = self.inner.store.append_audit(AuditEvent::new(
                AuditEventType::FocusPaused {
                    session_id,
                    elapsed: state.elapsed,
                },
            ));
            info!(session_id = %session_id, elapsed = state.elapsed, "Focus session paused");
        }
        emit(&self.inner.events, CoreEvent::FocusStateChanged(state.clone()));
        Ok(state)
    }

    pub fn resume(&self) -> Result<FocusState> {
        let (state, generation) = {
            let mut cell = self.inner.cell()?;
            let state = cell.session.resume()?;
            cell.generation += 1;
            cell.timer_active = true;
            (state, cell.generation)
        };
        spawn_timer(self.inner.clone(), generation);

        if let Some(session_id) = state.session_id {
            let _ = self
                .inner
                .store
                .append_audit(AuditEvent::new(AuditEventType::FocusResumed { session_id }));
            info!(session_id = %session_id, elapsed = state.elapsed, "Focus session resumed");
        }
        emit(&self.inner.events, CoreEvent::FocusStateChanged(state.clone()));
        Ok(state)
    }

    /// Stop early. No tick is applied after this returns and no focus time
    /// is credited.
    pub fn stop(&self, now: DateTime<Local>) -> Result<FocusState> {
        let lock_active = self.inner.lock.is_locked(now)?;
        let state = {
            let mut cell = self.inner.cell()?;
            let state = cell.session.stop(lock_active)?;
            cell.generation += 1;
            cell.timer_active = false;
            state
        };

        if let Some(session_id) = state.session_id {
            let _ = self.inner.store.append_audit(AuditEvent::new(
                AuditEventType::FocusStopped {
                    session_id,
                    elapsed: state.elapsed,
                },
            ));
            info!(session_id = %session_id, elapsed = state.elapsed, "Focus session stopped");
        }
        emit(&self.inner.events, CoreEvent::FocusStateChanged(state.clone()));
        Ok(state)
    }

    /// Ensure the timer task is running for a Running session. Returns
    /// whether a new task was spawned; a second call is a no-op.
    pub fn run_timer(&self) -> Result<bool> {
        let generation = {
            let mut cell = self.inner.cell()?;
            if cell.session.phase() != FocusPhase::Running || cell.timer_active {
                return Ok(false);
            }
            cell.generation += 1;
            cell.timer_active = true;
            cell.generation
        };
        spawn_timer(self.inner.clone(), generation);
        Ok(true)
    }

    /// Retire any running timer without changing the session. Used at
    /// shutdown.
    pub fn halt_timer(&self) -> Result<()> {
        let mut cell = self.inner.cell()?;
        cell.generation += 1;
        cell.timer_active = false;
        Ok(())
    }
}

fn spawn_timer(inner: Arc<FocusInner>, generation: u64) {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + TICK, TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

        loop {
            let at = ticker.tick().await;
            let now_mono = MonotonicInstant::from_std(at.into_std());

            let completion = {
                let Ok(mut cell) = inner.cell() else {
                    warn!("Focus timer exiting, session mutex poisoned");
                    return;
                };
                if cell.generation != generation {
                    debug!(generation, "Stale focus timer exiting");
                    return;
                }

                let outcome = cell.session.tick(now_mono);
                // Inside the critical section, so no tick trails a stop
                emit(&inner.events, CoreEvent::FocusTick(outcome.state.clone()));

                if outcome.completed.is_some() {
                    cell.generation += 1;
                    cell.timer_active = false;
                }
                outcome.completed
            };

            if let Some(done) = completion {
                if let Err(e) = inner.stats.add_focus_seconds(done.duration, keeper_util::now()) {
                    warn!(session_id = %done.session_id, error = %e, "Failed to credit focus time");
                }
                let _ = inner.store.append_audit(AuditEvent::new(
                    AuditEventType::FocusCompleted {
                        session_id: done.session_id,
                        duration: done.duration,
                    },
                ));
                info!(session_id = %done.session_id, duration = done.duration, "Focus session completed");
                emit(
                    &inner.events,
                    CoreEvent::FocusCompleted {
                        session_id: done.session_id,
                        duration: done.duration,
                    },
                );
                return;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_store::SqliteStore;
    use tokio::sync::broadcast;

    struct Fixture {
        focus: FocusController,
        lock: Arc<LockManager>,
        stats: Arc<StatsAggregator>,
        events: broadcast::Receiver<CoreEvent>,
    }

    fn fixture() -> Fixture {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let (tx, rx) = broadcast::channel(4096);
        let lock = Arc::new(LockManager::new(store.clone(), tx.clone()).unwrap());
        let stats = Arc::new(StatsAggregator::new(store.clone()));
        let focus = FocusController::new(lock.clone(), stats.clone(), store, tx);
        Fixture {
            focus,
            lock,
            stats,
            events: rx,
        }
    }

    fn drain(rx: &mut broadcast::Receiver<CoreEvent>) -> Vec<CoreEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn timer_completes_and_credits_focus() {
        let mut f = fixture();
        let now = keeper_util::now();
        f.focus.start(1, false, now).unwrap();

        tokio::time::sleep(Duration::from_millis(60_500)).await;

        let state = f.focus.state().unwrap();
        assert_eq!(state.phase, FocusPhase::Completed);
        assert_eq!(state.elapsed, 60);

        let events = drain(&mut f.events);
        let ticks = events
            .iter()
            .filter(|e| matches!(e, CoreEvent::FocusTick(_)))
            .count();
        let completions: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                CoreEvent::FocusCompleted { duration, .. } => Some(*duration),
                _ => None,
            })
            .collect();
        assert_eq!(ticks, 60);
        assert_eq!(completions, vec![60]);
        assert_eq!(f.stats.focus_duration_today(keeper_util::now()).unwrap(), 60);

        // Timer is gone; nothing more arrives
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(drain(&mut f.events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn no_tick_after_stop() {
        let mut f = fixture();
        let now = keeper_util::now();
        f.focus.start(25, false, now).unwrap();

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        let stopped = f.focus.stop(now).unwrap();
        assert_eq!(stopped.elapsed, 3);
        drain(&mut f.events);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(drain(&mut f.events).is_empty());
        assert_eq!(f.focus.state().unwrap().elapsed, 3);
        assert_eq!(f.stats.focus_duration_today(now).unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_freezes_and_resume_continues() {
        let f = fixture();
        let now = keeper_util::now();
        f.focus.start(25, false, now).unwrap();

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        f.focus.pause(now).unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(f.focus.state().unwrap().elapsed, 2);

        f.focus.resume().unwrap();
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(f.focus.state().unwrap().elapsed, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_pause_resume_keeps_one_timer() {
        let f = fixture();
        let now = keeper_util::now();
        f.focus.start(25, false, now).unwrap();

        for _ in 0..5 {
            f.focus.pause(now).unwrap();
            f.focus.resume().unwrap();
        }
        tokio::time::sleep(Duration::from_millis(4_500)).await;
        assert_eq!(f.focus.state().unwrap().elapsed, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn run_timer_is_idempotent() {
        let f = fixture();
        let now = keeper_util::now();
        assert!(!f.focus.run_timer().unwrap());

        f.focus.start(25, false, now).unwrap();
        assert!(!f.focus.run_timer().unwrap());

        f.focus.halt_timer().unwrap();
        assert!(f.focus.run_timer().unwrap());
        assert!(!f.focus.run_timer().unwrap());

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(f.focus.state().unwrap().elapsed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn strict_session_holds_while_locked() {
        let f = fixture();
        let now = keeper_util::now();
        f.lock.set_password("1234", now).unwrap();
        f.focus.start(25, true, now).unwrap();
        f.lock.lock(30, now).unwrap();

        assert!(matches!(
            f.focus.pause(now),
            Err(KeeperError::StrictModeActive)
        ));
        assert!(matches!(f.focus.stop(now), Err(KeeperError::StrictModeActive)));

        f.lock.unlock("1234", now).unwrap();
        assert_eq!(f.focus.stop(now).unwrap().phase, FocusPhase::Stopped);
    }
}

//! App monitor
//!
//! Polls the process table on a fixed cadence and terminates anything that
//! matches the app blocklist. Also serves one-off process queries and kill
//! requests from clients.

use chrono::{DateTime, Local};
use keeper_api::{BlockCategory, KillFailure, KillReport, RunningProcess};
use keeper_config::MonitorConfig;
use keeper_host_api::{HostError, ProcessInspector};
use keeper_store::{AuditEvent, AuditEventType, Store};
use keeper_util::{KeeperError, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::apps::AppBlocklist;
use crate::events::{emit, CoreEvent, EventSender};
use crate::stats::StatsAggregator;

struct MonitorHandle {
    cancel: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

struct MonitorInner {
    inspector: Arc<dyn ProcessInspector>,
    apps: Arc<AppBlocklist>,
    stats: Arc<StatsAggregator>,
    store: Arc<dyn Store>,
    events: EventSender,
    config: MonitorConfig,
    /// Held for each blocked name a sweep enforces. Stopping takes it after
    /// raising the cancel flag, so no kill lands once stop has returned.
    enforce: tokio::sync::Mutex<()>,
}

pub struct AppMonitor {
    inner: Arc<MonitorInner>,
    handle: Mutex<Option<MonitorHandle>>,
}

impl AppMonitor {
    pub fn new(
        inspector: Arc<dyn ProcessInspector>,
        apps: Arc<AppBlocklist>,
        stats: Arc<StatsAggregator>,
        store: Arc<dyn Store>,
        events: EventSender,
        config: MonitorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                inspector,
                apps,
                stats,
                store,
                events,
                config,
                enforce: tokio::sync::Mutex::new(()),
            }),
            handle: Mutex::new(None),
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.handle
            .lock()
            .ok()
            .and_then(|h| h.as_ref().map(|h| !h.task.is_finished()))
            .unwrap_or(false)
    }

    /// Start the polling loop. Returns `false` if it was already running.
    pub fn start_monitoring(&self) -> Result<bool> {
        let mut handle = self
            .handle
            .lock()
            .map_err(|_| KeeperError::internal("monitor handle mutex poisoned"))?;
        if let Some(existing) = handle.as_ref()
            && !existing.task.is_finished()
        {
            return Ok(false);
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(run_loop(self.inner.clone(), cancel.clone()));
        *handle = Some(MonitorHandle { cancel, task });
        drop(handle);

        let _ = self
            .inner
            .store
            .append_audit(AuditEvent::new(AuditEventType::MonitoringChanged { active: true }));
        info!(
            poll_interval_secs = self.inner.config.poll_interval.as_secs(),
            auto_kill = self.inner.config.auto_kill,
            "App monitoring started"
        );
        emit(&self.inner.events, CoreEvent::MonitoringChanged { active: true });
        Ok(true)
    }

    /// Stop the polling loop. Once this returns no further termination is
    /// issued. Returns `false` if it was not running.
    pub async fn stop_monitoring(&self) -> Result<bool> {
        let handle = self
            .handle
            .lock()
            .map_err(|_| KeeperError::internal("monitor handle mutex poisoned"))?
            .take();
        let Some(handle) = handle else {
            return Ok(false);
        };

        handle.cancel.store(true, Ordering::SeqCst);
        // Waits out a sweep that is mid-kill
        let _enforce = self.inner.enforce.lock().await;
        handle.task.abort();

        let _ = self
            .inner
            .store
            .append_audit(AuditEvent::new(AuditEventType::MonitoringChanged { active: false }));
        info!("App monitoring stopped");
        emit(&self.inner.events, CoreEvent::MonitoringChanged { active: false });
        Ok(true)
    }

    /// Run one enforcement pass now, independent of the polling loop
    pub async fn sweep(&self) -> KillReport {
        let cancel = AtomicBool::new(false);
        self.inner.sweep(&cancel).await
    }

    /// Live processes matching any of `names`, one entry per pid
    pub fn check_running(&self, names: &[String]) -> Result<Vec<RunningProcess>> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for name in names {
            for process in self.find_processes(name)? {
                if seen.insert(process.pid) {
                    found.push(process);
                }
            }
        }
        Ok(found)
    }

    pub fn find_processes(&self, name: &str) -> Result<Vec<RunningProcess>> {
        self.inner.inspector.find(name).map_err(host_error)
    }

    pub fn is_app_running(&self, name: &str) -> Result<bool> {
        Ok(!self.find_processes(name)?.is_empty())
    }

    /// Terminate one pid
    pub fn kill_process(&self, pid: u32, now: DateTime<Local>) -> Result<()> {
        self.inner
            .terminate(pid, None, now)
            .map_err(|e| KeeperError::enforcement(format!("pid {}", pid), e.to_string()))
    }

    /// Terminate each pid independently; a missing pid does not stop the
    /// others.
    pub fn kill_processes(&self, pids: &[u32], now: DateTime<Local>) -> KillReport {
        let mut report = KillReport::default();
        for &pid in pids {
            match self.inner.terminate(pid, None, now) {
                Ok(()) => report.killed.push(pid),
                Err(e) => report.failures.push(KillFailure {
                    pid,
                    reason: e.to_string(),
                }),
            }
        }
        report
    }

    /// Terminate every live process matching `name`
    pub fn kill_app(&self, name: &str, now: DateTime<Local>) -> Result<KillReport> {
        let processes = self.find_processes(name)?;
        let mut report = KillReport::default();
        for process in processes {
            match self.inner.terminate(process.pid, Some(&process.name), now) {
                Ok(()) => report.killed.push(process.pid),
                Err(e) => report.failures.push(KillFailure {
                    pid: process.pid,
                    reason: e.to_string(),
                }),
            }
        }
        Ok(report)
    }
}

impl MonitorInner {
    async fn sweep(&self, cancel: &AtomicBool) -> KillReport {
        let mut report = KillReport::default();

        // Snapshot; the set may change while we iterate
        let names = match self.apps.list() {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Failed to read app blocklist");
                return report;
            }
        };

        for name in names {
            let _enforce = self.enforce.lock().await;
            if cancel.load(Ordering::SeqCst) {
                break;
            }

            let processes = match self.inspector.find(&name) {
                Ok(processes) => processes,
                Err(e) => {
                    warn!(app = %name, error = %e, "Process lookup failed");
                    continue;
                }
            };
            if processes.is_empty() {
                continue;
            }
            if !self.config.auto_kill {
                debug!(app = %name, count = processes.len(), "Blocked app running, auto-kill off");
                continue;
            }

            for process in processes {
                match self.terminate(process.pid, Some(&process.name), keeper_util::now()) {
                    Ok(()) => report.killed.push(process.pid),
                    Err(e) => {
                        // Often the process exited on its own; next sweep retries
                        warn!(app = %name, pid = process.pid, error = %e, "Failed to terminate");
                        report.failures.push(KillFailure {
                            pid: process.pid,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        report
    }

    fn terminate(
        &self,
        pid: u32,
        name: Option<&str>,
        now: DateTime<Local>,
    ) -> std::result::Result<(), HostError> {
        self.inspector.kill(pid)?;

        if let Err(e) = self.stats.add_block_event(BlockCategory::App, now) {
            warn!(pid, error = %e, "Failed to record app block");
        }
        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::ProcessKilled {
            name: name.map(str::to_string),
            pid,
        }));
        info!(pid, name = name.unwrap_or("-"), "Process terminated");

        if let Some(name) = name {
            emit(
                &self.events,
                CoreEvent::AppTerminated {
                    name: name.to_string(),
                    pid,
                },
            );
        }
        Ok(())
    }
}

async fn run_loop(inner: Arc<MonitorInner>, cancel: Arc<AtomicBool>) {
    let mut ticker = tokio::time::interval(inner.config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if cancel.load(Ordering::SeqCst) {
            break;
        }
        let report = inner.sweep(&cancel).await;
        if report.killed_count() > 0 {
            debug!(killed = report.killed_count(), "Monitor sweep");
        }
    }
}

fn host_error(e: HostError) -> KeeperError {
    KeeperError::host(e.to_string())
}

//! Focus keeper: owns every component and wires them together

use chrono::{DateTime, Local};
use keeper_api::{DaemonStateSnapshot, FocusState, HealthStatus, API_VERSION};
use keeper_config::Config;
use keeper_host_api::{NetworkEnforcer, ProcessInspector};
use keeper_store::{AuditEvent, AuditEventType, Store};
use keeper_util::Result;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::apps::AppBlocklist;
use crate::events::{CoreEvent, EventSender, EVENT_CHANNEL_CAPACITY};
use crate::focus::FocusController;
use crate::lock::LockManager;
use crate::monitor::AppMonitor;
use crate::stats::StatsAggregator;
use crate::websites::WebsiteBlocklist;

/// The engine behind keeperd.
///
/// Exactly one of each component exists per daemon. They share one store
/// and one event channel; the daemon reads events through [`subscribe`].
///
/// [`subscribe`]: FocusKeeper::subscribe
pub struct FocusKeeper {
    store: Arc<dyn Store>,
    inspector: Arc<dyn ProcessInspector>,
    events: EventSender,
    default_target_minutes: u32,
    start_monitoring_on_launch: bool,

    stats: Arc<StatsAggregator>,
    lock: Arc<LockManager>,
    websites: WebsiteBlocklist,
    apps: Arc<AppBlocklist>,
    monitor: AppMonitor,
    focus: FocusController,
}

impl FocusKeeper {
    pub fn new(
        config: &Config,
        store: Arc<dyn Store>,
        inspector: Arc<dyn ProcessInspector>,
        enforcer: Arc<dyn NetworkEnforcer>,
    ) -> Result<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let stats = Arc::new(StatsAggregator::new(store.clone()));
        let lock = Arc::new(LockManager::new(store.clone(), events.clone())?);
        let websites = WebsiteBlocklist::new(
            store.clone(),
            enforcer,
            lock.clone(),
            stats.clone(),
            config.enforcement.timeout,
        );
        let apps = Arc::new(AppBlocklist::new(store.clone(), lock.clone()));
        let monitor = AppMonitor::new(
            inspector.clone(),
            apps.clone(),
            stats.clone(),
            store.clone(),
            events.clone(),
            config.monitor.clone(),
        );
        let focus = FocusController::new(lock.clone(), stats.clone(), store.clone(), events.clone());

        Ok(Self {
            store,
            inspector,
            events,
            default_target_minutes: config.focus.default_target_minutes,
            start_monitoring_on_launch: config.monitor.start_on_launch,
            stats,
            lock,
            websites,
            apps,
            monitor,
            focus,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.events.subscribe()
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn stats(&self) -> &StatsAggregator {
        &self.stats
    }

    pub fn lock(&self) -> &LockManager {
        &self.lock
    }

    pub fn websites(&self) -> &WebsiteBlocklist {
        &self.websites
    }

    pub fn apps(&self) -> &AppBlocklist {
        &self.apps
    }

    pub fn monitor(&self) -> &AppMonitor {
        &self.monitor
    }

    pub fn focus(&self) -> &FocusController {
        &self.focus
    }

    /// Start a session, using the configured default target when none is
    /// given
    pub fn start_focus(
        &self,
        target_minutes: Option<u32>,
        strict: bool,
        now: DateTime<Local>,
    ) -> Result<FocusState> {
        let target = target_minutes.unwrap_or(self.default_target_minutes);
        self.focus.start(target, strict, now)
    }

    /// Bring enforcement back in line with persisted state after a restart
    pub async fn startup(&self) -> Result<()> {
        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::DaemonStarted));

        match self.websites.reconcile().await {
            Ok(report) => info!(
                applied = report.applied.len(),
                removed = report.removed.len(),
                failed = report.failed.len(),
                "Website enforcement reconciled"
            ),
            // Keep serving; the next add or remove retries enforcement
            Err(e) => warn!(error = %e, "Website reconcile failed"),
        }

        if self.start_monitoring_on_launch {
            self.monitor.start_monitoring()?;
        }
        Ok(())
    }

    /// Stop background work. The session itself is not persisted.
    pub async fn shutdown(&self) -> Result<()> {
        self.monitor.stop_monitoring().await?;
        self.focus.halt_timer()?;
        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::DaemonStopped));
        info!("Focus keeper shut down");
        Ok(())
    }

    pub fn snapshot(&self, now: DateTime<Local>) -> Result<DaemonStateSnapshot> {
        Ok(DaemonStateSnapshot {
            api_version: API_VERSION,
            focus: self.focus.state()?,
            lock: self.lock.state(now)?,
            monitoring: self.monitor.is_monitoring(),
            blocked_websites: self.websites.list()?,
            blocked_apps: self.apps.list()?,
        })
    }

    pub fn health(&self) -> HealthStatus {
        let store_ok = self.store.is_healthy();
        HealthStatus {
            live: true,
            ready: store_ok && self.inspector.is_healthy(),
            store_ok,
            monitoring: self.monitor.is_monitoring(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_api::FocusPhase;
    use keeper_host_api::{MockEnforcer, MockInspector};
    use keeper_store::SqliteStore;

    fn make_keeper(config: Config) -> (FocusKeeper, Arc<MockInspector>, Arc<MockEnforcer>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let inspector = Arc::new(MockInspector::new());
        let enforcer = Arc::new(MockEnforcer::new());
        let keeper =
            FocusKeeper::new(&config, store, inspector.clone(), enforcer.clone()).unwrap();
        (keeper, inspector, enforcer)
    }

    #[tokio::test]
    async fn start_uses_default_target() {
        let mut config = Config::default();
        config.focus.default_target_minutes = 50;
        let (keeper, _, _) = make_keeper(config);

        let state = keeper.start_focus(None, false, keeper_util::now()).unwrap();
        assert_eq!(state.target, 3000);
        assert_eq!(state.phase, FocusPhase::Running);
        keeper.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn snapshot_reflects_components() {
        let (keeper, _, _) = make_keeper(Config::default());
        let now = keeper_util::now();
        keeper.websites().add("reddit.com", now).await.unwrap();
        keeper.apps().add("Steam", now).unwrap();

        let snapshot = keeper.snapshot(now).unwrap();
        assert_eq!(snapshot.blocked_websites, vec!["reddit.com"]);
        assert_eq!(snapshot.blocked_apps, vec!["steam"]);
        assert_eq!(snapshot.focus.phase, FocusPhase::Idle);
        assert!(!snapshot.lock.is_locked);
        assert!(!snapshot.monitoring);
    }

    #[tokio::test]
    async fn startup_honors_monitor_config() {
        let mut config = Config::default();
        config.monitor.start_on_launch = true;
        let (keeper, _, _) = make_keeper(config);

        keeper.startup().await.unwrap();
        assert!(keeper.health().monitoring);
        assert!(keeper.health().ready);

        keeper.shutdown().await.unwrap();
        assert!(!keeper.monitor().is_monitoring());
    }

    #[tokio::test]
    async fn startup_reapplies_stored_blocks() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        store
            .insert_blocked(keeper_api::BlockCategory::Website, "youtube.com")
            .unwrap();
        let enforcer = Arc::new(MockEnforcer::new());
        let keeper = FocusKeeper::new(
            &Config::default(),
            store,
            Arc::new(MockInspector::new()),
            enforcer.clone(),
        )
        .unwrap();

        keeper.startup().await.unwrap();
        assert!(enforcer.is_enforced("youtube.com"));
    }
}

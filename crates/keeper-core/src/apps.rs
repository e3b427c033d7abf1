//! Blocked application names

use chrono::{DateTime, Local};
use keeper_api::BlockCategory;
use keeper_store::{AuditEvent, AuditEventType, Store};
use keeper_util::{KeeperError, Result};
use std::sync::Arc;
use tracing::info;

use crate::lock::LockManager;

const MAX_APP_NAME_LEN: usize = 255;

/// Canonical form of a blocked app pattern: trimmed and lowercased.
pub fn normalize_app_name(input: &str) -> Result<String> {
    let name = input.trim().to_lowercase();
    if name.is_empty() || name.len() > MAX_APP_NAME_LEN || name.chars().any(char::is_control) {
        return Err(KeeperError::InvalidAppName(input.to_string()));
    }
    Ok(name)
}

/// The persisted set of app name patterns. Patterns match live processes
/// by case-insensitive substring.
pub struct AppBlocklist {
    store: Arc<dyn Store>,
    lock: Arc<LockManager>,
}

impl AppBlocklist {
    pub fn new(store: Arc<dyn Store>, lock: Arc<LockManager>) -> Self {
        Self { store, lock }
    }

    /// Blocked patterns, sorted. Callers get a copy, so the monitor can
    /// iterate while the set changes.
    pub fn list(&self) -> Result<Vec<String>> {
        Ok(self.store.list_blocked(BlockCategory::App)?)
    }

    pub fn add(&self, name: &str, now: DateTime<Local>) -> Result<String> {
        let name = normalize_app_name(name)?;
        self.lock.ensure_unlocked(now)?;

        if !self.store.insert_blocked(BlockCategory::App, &name)? {
            return Err(KeeperError::AlreadyBlocked(name));
        }
        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::Blocked {
            category: BlockCategory::App,
            name: name.clone(),
        }));
        info!(app = %name, "App blocked");
        Ok(name)
    }

    pub fn remove(&self, name: &str, now: DateTime<Local>) -> Result<String> {
        let name = normalize_app_name(name)?;
        self.lock.ensure_unlocked(now)?;

        if !self.store.remove_blocked(BlockCategory::App, &name)? {
            return Err(KeeperError::NotFound(name));
        }
        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::Unblocked {
            category: BlockCategory::App,
            name: name.clone(),
        }));
        info!(app = %name, "App unblocked");
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_store::SqliteStore;
    use tokio::sync::broadcast;

    fn make_apps() -> (AppBlocklist, Arc<LockManager>) {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let (tx, _) = broadcast::channel(16);
        let lock = Arc::new(LockManager::new(store.clone(), tx).unwrap());
        (AppBlocklist::new(store, lock.clone()), lock)
    }

    #[test]
    fn names_are_normalized() {
        let (apps, _) = make_apps();
        let now = keeper_util::now();
        assert_eq!(apps.add("  Discord ", now).unwrap(), "discord");
        assert!(matches!(
            apps.add("DISCORD", now),
            Err(KeeperError::AlreadyBlocked(_))
        ));
        assert_eq!(apps.list().unwrap(), vec!["discord"]);
    }

    #[test]
    fn invalid_names_rejected() {
        assert!(normalize_app_name("   ").is_err());
        assert!(normalize_app_name("bad\nname").is_err());
        assert!(normalize_app_name(&"x".repeat(300)).is_err());
    }

    #[test]
    fn remove_missing_is_not_found() {
        let (apps, _) = make_apps();
        assert!(matches!(
            apps.remove("steam", keeper_util::now()),
            Err(KeeperError::NotFound(_))
        ));
    }

    #[test]
    fn locked_blocklist_is_read_only() {
        let (apps, lock) = make_apps();
        let now = keeper_util::now();
        apps.add("steam", now).unwrap();
        lock.set_password("1234", now).unwrap();
        lock.lock(5, now).unwrap();

        assert!(matches!(
            apps.add("discord", now),
            Err(KeeperError::Locked { .. })
        ));
        assert!(matches!(
            apps.remove("steam", now),
            Err(KeeperError::Locked { .. })
        ));
        assert_eq!(apps.list().unwrap(), vec!["steam"]);
    }
}

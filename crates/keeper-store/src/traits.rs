//! Store trait definitions

use chrono::{DateTime, Local};
use keeper_api::{BlockCategory, DailyStats, StatsData};
use serde::{Deserialize, Serialize};

use crate::{AuditEvent, StoreResult};

/// Main store trait
///
/// Every method is one atomic unit against the backing store; callers that
/// need a read-modify-write across several methods serialize themselves.
pub trait Store: Send + Sync {
    // Audit log

    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Most recent events first
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Blocklists

    /// Entries of one blocklist, sorted
    fn list_blocked(&self, category: BlockCategory) -> StoreResult<Vec<String>>;

    /// Insert an entry. Returns `false` if it was already present.
    fn insert_blocked(&self, category: BlockCategory, name: &str) -> StoreResult<bool>;

    /// Remove an entry. Returns `false` if it was absent.
    fn remove_blocked(&self, category: BlockCategory, name: &str) -> StoreResult<bool>;

    /// Remove every entry of one blocklist and return what was removed
    fn clear_blocked(&self, category: BlockCategory) -> StoreResult<Vec<String>>;

    // Password lock

    fn load_lock(&self) -> StoreResult<LockRecord>;

    fn save_lock(&self, record: &LockRecord) -> StoreResult<()>;

    // Statistics

    /// Credit focus seconds to `day` and to the lifetime total together
    fn add_focus_seconds(&self, day: &str, seconds: u64) -> StoreResult<()>;

    /// Record one block event against `day` and the lifetime total together
    fn add_block(&self, day: &str, category: BlockCategory) -> StoreResult<()>;

    /// Counters for `day` plus lifetime totals, read consistently
    fn stats(&self, day: &str) -> StoreResult<StatsData>;

    /// Up to `limit` days that have any record, most recent first
    fn stats_history(&self, limit: usize) -> StoreResult<Vec<DailyStats>>;

    /// Zero `day` and the lifetime totals; other days are kept
    fn reset_stats(&self, day: &str) -> StoreResult<()>;

    // Health

    fn is_healthy(&self) -> bool;
}

/// Persisted password lock state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Hex SHA-256 of salt followed by password
    pub password_hash: Option<String>,
    /// Hex salt
    pub salt: Option<String>,
    /// Set while locked; may be in the past until the next read clears it
    pub locked_until: Option<DateTime<Local>>,
}

impl LockRecord {
    pub fn has_password(&self) -> bool {
        self.password_hash.is_some() && self.salt.is_some()
    }
}

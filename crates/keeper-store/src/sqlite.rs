//! SQLite-based store implementation

use chrono::{DateTime, Local};
use keeper_api::{BlockCategory, DailyStats, StatsData};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{AuditEvent, LockRecord, Store, StoreError, StoreResult};

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Website and app blocklists
            CREATE TABLE IF NOT EXISTS blocklist (
                category TEXT NOT NULL,
                name TEXT NOT NULL,
                added_at TEXT NOT NULL,
                PRIMARY KEY (category, name)
            );

            -- Password lock (single row)
            CREATE TABLE IF NOT EXISTS lock_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                password_hash TEXT,
                salt TEXT,
                locked_until TEXT
            );

            -- Per-day counters
            CREATE TABLE IF NOT EXISTS daily_stats (
                day TEXT PRIMARY KEY,
                focus_secs INTEGER NOT NULL DEFAULT 0,
                block_count INTEGER NOT NULL DEFAULT 0,
                websites_blocked INTEGER NOT NULL DEFAULT 0,
                apps_blocked INTEGER NOT NULL DEFAULT 0
            );

            -- Lifetime counters (single row)
            CREATE TABLE IF NOT EXISTS lifetime_stats (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                total_focus_secs INTEGER NOT NULL DEFAULT 0,
                total_blocks INTEGER NOT NULL DEFAULT 0
            );
            INSERT OR IGNORE INTO lifetime_stats (id, total_focus_secs, total_blocks)
                VALUES (1, 0, 0);

            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

fn to_u64(value: i64) -> u64 {
    value.max(0) as u64
}

fn parse_timestamp(s: &str) -> Option<DateTime<Local>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Local))
        .ok()
}

fn read_daily(conn: &Connection, day: &str) -> StoreResult<DailyStats> {
    let row = conn
        .query_row(
            "SELECT focus_secs, block_count, websites_blocked, apps_blocked
             FROM daily_stats WHERE day = ?",
            [day],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            },
        )
        .optional()?;

    Ok(match row {
        Some((focus, blocks, websites, apps)) => DailyStats {
            date: day.to_string(),
            focus_duration_seconds: to_u64(focus),
            block_count: to_u64(blocks),
            websites_blocked: to_u64(websites),
            apps_blocked: to_u64(apps),
        },
        None => DailyStats::empty(day),
    })
}

impl Store for SqliteStore {
    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let timestamp = parse_timestamp(&timestamp_str).unwrap_or_else(keeper_util::now);
            let event: crate::AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn list_blocked(&self, category: BlockCategory) -> StoreResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT name FROM blocklist WHERE category = ? ORDER BY name")?;
        let names = stmt
            .query_map([category.as_str()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn insert_blocked(&self, category: BlockCategory, name: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO blocklist (category, name, added_at) VALUES (?, ?, ?)",
            params![category.as_str(), name, keeper_util::now().to_rfc3339()],
        )?;

        debug!(category = category.as_str(), name, inserted, "Blocklist insert");
        Ok(inserted == 1)
    }

    fn remove_blocked(&self, category: BlockCategory, name: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM blocklist WHERE category = ? AND name = ?",
            params![category.as_str(), name],
        )?;

        debug!(category = category.as_str(), name, removed, "Blocklist remove");
        Ok(removed == 1)
    }

    fn clear_blocked(&self, category: BlockCategory) -> StoreResult<Vec<String>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let names = {
            let mut stmt =
                tx.prepare("SELECT name FROM blocklist WHERE category = ? ORDER BY name")?;
            let names = stmt
                .query_map([category.as_str()], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            names
        };
        tx.execute(
            "DELETE FROM blocklist WHERE category = ?",
            [category.as_str()],
        )?;
        tx.commit()?;

        debug!(category = category.as_str(), count = names.len(), "Blocklist cleared");
        Ok(names)
    }

    fn load_lock(&self) -> StoreResult<LockRecord> {
        let conn = self.conn()?;

        let row: Option<(Option<String>, Option<String>, Option<String>)> = conn
            .query_row(
                "SELECT password_hash, salt, locked_until FROM lock_state WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        Ok(match row {
            Some((password_hash, salt, locked_until)) => LockRecord {
                password_hash,
                salt,
                locked_until: locked_until.as_deref().and_then(parse_timestamp),
            },
            None => LockRecord::default(),
        })
    }

    fn save_lock(&self, record: &LockRecord) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO lock_state (id, password_hash, salt, locked_until)
            VALUES (1, ?, ?, ?)
            ON CONFLICT(id)
            DO UPDATE SET password_hash = excluded.password_hash,
                          salt = excluded.salt,
                          locked_until = excluded.locked_until
            "#,
            params![
                record.password_hash,
                record.salt,
                record.locked_until.map(|t| t.to_rfc3339())
            ],
        )?;

        debug!(locked = record.locked_until.is_some(), "Lock record saved");
        Ok(())
    }

    fn add_focus_seconds(&self, day: &str, seconds: u64) -> StoreResult<()> {
        let secs = i64::try_from(seconds)
            .map_err(|_| StoreError::OutOfRange(format!("{} focus seconds", seconds)))?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        // SQLite turns an overflowing integer sum into a REAL; refuse instead
        let day_secs: i64 = tx
            .query_row(
                "SELECT focus_secs FROM daily_stats WHERE day = ?",
                [day],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);
        let total_secs: i64 = tx.query_row(
            "SELECT total_focus_secs FROM lifetime_stats WHERE id = 1",
            [],
            |row| row.get(0),
        )?;
        if day_secs.checked_add(secs).is_none() || total_secs.checked_add(secs).is_none() {
            return Err(StoreError::OutOfRange(format!(
                "adding {} focus seconds overflows the totals",
                seconds
            )));
        }

        tx.execute(
            r#"
            INSERT INTO daily_stats (day, focus_secs)
            VALUES (?, ?)
            ON CONFLICT(day)
            DO UPDATE SET focus_secs = focus_secs + excluded.focus_secs
            "#,
            params![day, secs],
        )?;
        tx.execute(
            "UPDATE lifetime_stats SET total_focus_secs = total_focus_secs + ? WHERE id = 1",
            [secs],
        )?;
        tx.commit()?;

        debug!(day, added_secs = secs, "Focus time added");
        Ok(())
    }

    fn add_block(&self, day: &str, category: BlockCategory) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let (website, app) = match category {
            BlockCategory::Website => (1i64, 0i64),
            BlockCategory::App => (0, 1),
        };

        tx.execute(
            r#"
            INSERT INTO daily_stats (day, block_count, websites_blocked, apps_blocked)
            VALUES (?1, 1, ?2, ?3)
            ON CONFLICT(day)
            DO UPDATE SET block_count = block_count + 1,
                          websites_blocked = websites_blocked + excluded.websites_blocked,
                          apps_blocked = apps_blocked + excluded.apps_blocked
            "#,
            params![day, website, app],
        )?;
        tx.execute(
            "UPDATE lifetime_stats SET total_blocks = total_blocks + 1 WHERE id = 1",
            [],
        )?;
        tx.commit()?;

        debug!(day, category = category.as_str(), "Block event recorded");
        Ok(())
    }

    fn stats(&self, day: &str) -> StoreResult<StatsData> {
        let conn = self.conn()?;
        let today = read_daily(&conn, day)?;
        let (total_focus, total_blocks): (i64, i64) = conn.query_row(
            "SELECT total_focus_secs, total_blocks FROM lifetime_stats WHERE id = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(StatsData {
            today,
            total_focus_seconds: to_u64(total_focus),
            total_blocks: to_u64(total_blocks),
        })
    }

    fn stats_history(&self, limit: usize) -> StoreResult<Vec<DailyStats>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT day, focus_secs, block_count, websites_blocked, apps_blocked
             FROM daily_stats ORDER BY day DESC LIMIT ?",
        )?;

        let days = stmt
            .query_map([limit as i64], |row| {
                Ok(DailyStats {
                    date: row.get(0)?,
                    focus_duration_seconds: to_u64(row.get(1)?),
                    block_count: to_u64(row.get(2)?),
                    websites_blocked: to_u64(row.get(3)?),
                    apps_blocked: to_u64(row.get(4)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(days)
    }

    fn reset_stats(&self, day: &str) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO daily_stats (day) VALUES (?)
            ON CONFLICT(day)
            DO UPDATE SET focus_secs = 0, block_count = 0,
                          websites_blocked = 0, apps_blocked = 0
            "#,
            [day],
        )?;
        tx.execute(
            "UPDATE lifetime_stats SET total_focus_secs = 0, total_blocks = 0 WHERE id = 1",
            [],
        )?;
        tx.commit()?;

        debug!(day, "Statistics reset");
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AuditEventType;
    use chrono::TimeZone;

    #[test]
    fn test_in_memory_store() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.is_healthy());
    }

    #[test]
    fn test_audit_log() {
        let store = SqliteStore::in_memory().unwrap();

        store
            .append_audit(AuditEvent::new(AuditEventType::DaemonStarted))
            .unwrap();
        store
            .append_audit(AuditEvent::new(AuditEventType::PasswordSet))
            .unwrap();

        let events = store.get_recent_audits(10).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0].event, AuditEventType::PasswordSet));
        assert!(matches!(events[1].event, AuditEventType::DaemonStarted));
    }

    #[test]
    fn test_blocklist_set_semantics() {
        let store = SqliteStore::in_memory().unwrap();

        assert!(store.insert_blocked(BlockCategory::Website, "b.com").unwrap());
        assert!(store.insert_blocked(BlockCategory::Website, "a.com").unwrap());
        assert!(!store.insert_blocked(BlockCategory::Website, "a.com").unwrap());

        // Same name in another category is independent
        assert!(store.insert_blocked(BlockCategory::App, "a.com").unwrap());

        assert_eq!(
            store.list_blocked(BlockCategory::Website).unwrap(),
            vec!["a.com", "b.com"]
        );

        assert!(store.remove_blocked(BlockCategory::Website, "a.com").unwrap());
        assert!(!store.remove_blocked(BlockCategory::Website, "a.com").unwrap());
        assert_eq!(
            store.list_blocked(BlockCategory::App).unwrap(),
            vec!["a.com"]
        );
    }

    #[test]
    fn test_clear_blocked_returns_removed() {
        let store = SqliteStore::in_memory().unwrap();
        store.insert_blocked(BlockCategory::Website, "x.com").unwrap();
        store.insert_blocked(BlockCategory::Website, "y.com").unwrap();
        store.insert_blocked(BlockCategory::App, "steam").unwrap();

        let removed = store.clear_blocked(BlockCategory::Website).unwrap();
        assert_eq!(removed, vec!["x.com", "y.com"]);
        assert!(store.list_blocked(BlockCategory::Website).unwrap().is_empty());
        assert_eq!(store.list_blocked(BlockCategory::App).unwrap().len(), 1);
    }

    #[test]
    fn test_lock_record() {
        let store = SqliteStore::in_memory().unwrap();
        assert_eq!(store.load_lock().unwrap(), LockRecord::default());

        let until = Local.with_ymd_and_hms(2025, 6, 1, 12, 30, 0).unwrap();
        let record = LockRecord {
            password_hash: Some("abcd".into()),
            salt: Some("00ff".into()),
            locked_until: Some(until),
        };
        store.save_lock(&record).unwrap();
        assert_eq!(store.load_lock().unwrap(), record);

        let cleared = LockRecord {
            locked_until: None,
            ..record
        };
        store.save_lock(&cleared).unwrap();
        assert!(store.load_lock().unwrap().locked_until.is_none());
        assert!(store.load_lock().unwrap().has_password());
    }

    #[test]
    fn test_stats_accumulate() {
        let store = SqliteStore::in_memory().unwrap();
        let day = "2025-03-10";

        store.add_focus_seconds(day, 1500).unwrap();
        store.add_block(day, BlockCategory::Website).unwrap();
        store.add_block(day, BlockCategory::App).unwrap();
        store.add_block(day, BlockCategory::App).unwrap();

        let stats = store.stats(day).unwrap();
        assert_eq!(stats.today.focus_duration_seconds, 1500);
        assert_eq!(stats.today.block_count, 3);
        assert_eq!(stats.today.websites_blocked, 1);
        assert_eq!(stats.today.apps_blocked, 2);
        assert_eq!(stats.total_focus_seconds, 1500);
        assert_eq!(stats.total_blocks, 3);
    }

    #[test]
    fn test_focus_seconds_beyond_i64_rejected() {
        let store = SqliteStore::in_memory().unwrap();
        store.add_focus_seconds("2025-01-01", 1000).unwrap();

        assert!(matches!(
            store.add_focus_seconds("2025-01-01", u64::MAX),
            Err(StoreError::OutOfRange(_))
        ));
        assert!(matches!(
            store.add_focus_seconds("2025-01-01", i64::MAX as u64),
            Err(StoreError::OutOfRange(_))
        ));

        let stats = store.stats("2025-01-01").unwrap();
        assert_eq!(stats.today.focus_duration_seconds, 1000);
        assert_eq!(stats.total_focus_seconds, 1000);
    }

    #[test]
    fn test_stats_for_untouched_day_are_zero() {
        let store = SqliteStore::in_memory().unwrap();
        store.add_focus_seconds("2025-03-10", 60).unwrap();

        let stats = store.stats("2025-03-11").unwrap();
        assert_eq!(stats.today, DailyStats::empty("2025-03-11"));
        assert_eq!(stats.total_focus_seconds, 60);
    }

    #[test]
    fn test_reset_keeps_other_days() {
        let store = SqliteStore::in_memory().unwrap();
        store.add_focus_seconds("2025-03-09", 600).unwrap();
        store.add_focus_seconds("2025-03-10", 300).unwrap();

        store.reset_stats("2025-03-10").unwrap();
        store.add_focus_seconds("2025-03-10", 90).unwrap();

        let stats = store.stats("2025-03-10").unwrap();
        assert_eq!(stats.today.focus_duration_seconds, 90);
        assert_eq!(stats.total_focus_seconds, 90);

        let history = store.stats_history(10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].date, "2025-03-10");
        assert_eq!(history[1].focus_duration_seconds, 600);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("keeper.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_blocked(BlockCategory::App, "discord").unwrap();
            store.add_block("2025-03-10", BlockCategory::App).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.list_blocked(BlockCategory::App).unwrap(), vec!["discord"]);
        assert_eq!(store.stats("2025-03-10").unwrap().total_blocks, 1);
    }
}

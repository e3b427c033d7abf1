//! Statistics aggregator

use chrono::{DateTime, Local};
use keeper_api::{BlockCategory, DailyStats, StatsData};
use keeper_store::{AuditEvent, AuditEventType, Store};
use keeper_util::{day_key, KeeperError, Result};
use std::sync::Arc;
use tracing::{debug, info};

use crate::session::MAX_TARGET_MINUTES;

/// Largest single focus credit: one session of the longest allowed length
pub const MAX_FOCUS_CREDIT_SECONDS: u64 = MAX_TARGET_MINUTES as u64 * 60;

/// Daily and lifetime counters, written through to the store.
///
/// Every call resolves the day key exactly once from the `now` it is given,
/// so an increment that straddles midnight lands on one day only.
pub struct StatsAggregator {
    store: Arc<dyn Store>,
}

impl StatsAggregator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn add_focus_seconds(&self, seconds: u64, now: DateTime<Local>) -> Result<()> {
        if seconds == 0 {
            return Ok(());
        }
        if seconds > MAX_FOCUS_CREDIT_SECONDS {
            return Err(KeeperError::InvalidDuration(format!(
                "focus credit must be at most {} seconds, got {}",
                MAX_FOCUS_CREDIT_SECONDS, seconds
            )));
        }
        let day = day_key(&now);
        self.store.add_focus_seconds(&day, seconds)?;
        debug!(day = %day, seconds, "Focus seconds credited");
        Ok(())
    }

    pub fn add_block_event(&self, category: BlockCategory, now: DateTime<Local>) -> Result<()> {
        let day = day_key(&now);
        self.store.add_block(&day, category)?;
        debug!(day = %day, category = category.as_str(), "Block event recorded");
        Ok(())
    }

    pub fn get_stats(&self, now: DateTime<Local>) -> Result<StatsData> {
        Ok(self.store.stats(&day_key(&now))?)
    }

    /// Zero today and the lifetime totals, returning the zeroed state
    pub fn reset_stats(&self, now: DateTime<Local>) -> Result<StatsData> {
        let day = day_key(&now);
        self.store.reset_stats(&day)?;
        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::StatsReset {
            day: day.clone(),
        }));
        info!(day = %day, "Statistics reset");
        Ok(self.store.stats(&day)?)
    }

    pub fn focus_duration_today(&self, now: DateTime<Local>) -> Result<u64> {
        Ok(self.get_stats(now)?.today.focus_duration_seconds)
    }

    pub fn block_count_today(&self, now: DateTime<Local>) -> Result<u64> {
        Ok(self.get_stats(now)?.today.block_count)
    }

    /// Most recent `days` days with any activity, newest first
    pub fn history(&self, days: u32) -> Result<Vec<DailyStats>> {
        Ok(self.store.stats_history(days as usize)?)
    }
}

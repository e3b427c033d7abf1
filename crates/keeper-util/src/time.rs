//! Time utilities for keeperd
//!
//! Two clocks are used. Wall-clock time keys statistics by calendar day and
//! stamps lock expiry (it has to survive a restart). Monotonic time drives
//! the focus tick so a clock change never skews elapsed seconds.
//!
//! # Mock Time for Development
//!
//! In debug builds, `KEEPER_MOCK_TIME` overrides the wall clock. The mock
//! time advances at the real rate from the moment it is first read.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-25 23:59:30`)

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "KEEPER_MOCK_TIME";

/// Format used for per-day statistics keys
pub const DAY_KEY_FORMAT: &str = "%Y-%m-%d";

static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // wraps Local::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            let raw = std::env::var(MOCK_TIME_ENV_VAR).ok()?;
            let parsed = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .and_then(|naive| Local.from_local_datetime(&naive).single());
            match parsed {
                Some(mock_dt) => {
                    let offset = mock_dt.signed_duration_since(chrono::Local::now());
                    tracing::info!(
                        mock_time = %raw,
                        offset_secs = offset.num_seconds(),
                        "Mock time enabled"
                    );
                    Some(offset)
                }
                None => {
                    tracing::warn!(
                        mock_time = %raw,
                        expected_format = "%Y-%m-%d %H:%M:%S",
                        "Invalid mock time, using system clock"
                    );
                    None
                }
            }
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Get the current local time, respecting mock time in debug builds.
#[allow(clippy::disallowed_methods)]
pub fn now() -> DateTime<Local> {
    let real_now = chrono::Local::now();
    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Calendar day an event at `dt` belongs to, in the process-local timezone.
pub fn day_key(dt: &DateTime<Local>) -> String {
    dt.format(DAY_KEY_FORMAT).to_string()
}

/// Parse a day key back into a date
pub fn parse_day_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key, DAY_KEY_FORMAT).ok()
}

/// Whole seconds from `now` until `deadline`, rounded up and clamped at
/// zero. Non-zero whenever `deadline` is still in the future.
pub fn seconds_until(deadline: &DateTime<Local>, now: &DateTime<Local>) -> u64 {
    let remaining = deadline.signed_duration_since(*now);
    if remaining <= chrono::Duration::zero() {
        return 0;
    }
    let secs = remaining.num_seconds();
    let partial = remaining > chrono::Duration::seconds(secs);
    secs as u64 + u64::from(partial)
}

/// A point in monotonic time. Immune to wall-clock changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MonotonicInstant(Instant);

impl MonotonicInstant {
    pub fn now() -> Self {
        Self(Instant::now())
    }

    pub fn from_std(instant: Instant) -> Self {
        Self(instant)
    }

    pub fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }

    pub fn duration_since(&self, earlier: MonotonicInstant) -> Duration {
        self.0.saturating_duration_since(earlier.0)
    }
}

impl std::ops::Add<Duration> for MonotonicInstant {
    type Output = MonotonicInstant;

    fn add(self, rhs: Duration) -> Self::Output {
        MonotonicInstant(self.0 + rhs)
    }
}

/// Human-readable duration, e.g. `1h 2m 3s`
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m 1s");
        assert_eq!(format_duration(Duration::from_secs(1500)), "25m 0s");
    }

    #[test]
    fn day_key_uses_local_date() {
        let dt = Local.with_ymd_and_hms(2025, 12, 25, 23, 59, 59).unwrap();
        assert_eq!(day_key(&dt), "2025-12-25");
        let next = dt + chrono::Duration::seconds(1);
        assert_eq!(day_key(&next), "2025-12-26");
    }

    #[test]
    fn day_key_round_trips_through_parse() {
        let dt = Local.with_ymd_and_hms(2024, 2, 29, 8, 0, 0).unwrap();
        let date = parse_day_key(&day_key(&dt)).unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2024, 2, 29));
        assert!(parse_day_key("29/02/2024").is_none());
    }

    #[test]
    fn seconds_until_clamps_at_zero() {
        let now = Local.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let later = now + chrono::Duration::seconds(61);
        assert_eq!(seconds_until(&later, &now), 61);
        assert_eq!(seconds_until(&now, &later), 0);
    }

    #[test]
    fn seconds_until_rounds_partial_seconds_up() {
        let now = Local.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let deadline = now + chrono::Duration::seconds(60);
        let almost = now + chrono::Duration::milliseconds(59_500);
        assert_eq!(seconds_until(&deadline, &almost), 1);
        let just_before = deadline - chrono::Duration::microseconds(1);
        assert_eq!(seconds_until(&deadline, &just_before), 1);
        assert_eq!(seconds_until(&deadline, &deadline), 0);
    }

    #[test]
    fn monotonic_instant_ordering() {
        let t1 = MonotonicInstant::now();
        let t2 = t1 + Duration::from_secs(1);
        assert!(t2 > t1);
        assert_eq!(t2.duration_since(t1), Duration::from_secs(1));
        assert_eq!(t1.duration_since(t2), Duration::ZERO);
    }

    #[test]
    fn now_returns_plausible_year() {
        let t = now();
        assert!(t.year() >= 2020 && t.year() <= 2100);
    }
}

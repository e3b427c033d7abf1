//! Password lock
//!
//! A timed lock that freezes both blocklists. The password is stored as a
//! salted SHA-256 digest; the plaintext is never persisted or logged.

use chrono::{DateTime, Duration as ChronoDuration, Local};
use keeper_api::LockStateInfo;
use keeper_store::{AuditEvent, AuditEventType, LockRecord, Store};
use keeper_util::{seconds_until, KeeperError, Result};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::events::{emit, CoreEvent, EventSender};

/// Shortest accepted password, in characters
pub const MIN_PASSWORD_LEN: usize = 4;

/// Longest accepted lock, in minutes (one week)
pub const MAX_LOCK_MINUTES: u64 = 7 * 24 * 60;

const SALT_LEN: usize = 16;

/// Owns the persisted lock record. Every read-modify-write happens under
/// one mutex and is written through before the mutex is released.
pub struct LockManager {
    store: Arc<dyn Store>,
    events: EventSender,
    record: Mutex<LockRecord>,
}

impl LockManager {
    /// Load the persisted record. A lock that expired while the daemon was
    /// down is cleared on the first read.
    pub fn new(store: Arc<dyn Store>, events: EventSender) -> Result<Self> {
        let record = store.load_lock()?;
        Ok(Self {
            store,
            events,
            record: Mutex::new(record),
        })
    }

    fn record(&self) -> Result<std::sync::MutexGuard<'_, LockRecord>> {
        self.record
            .lock()
            .map_err(|_| KeeperError::internal("lock record mutex poisoned"))
    }

    /// Set or replace the password. Refused while a lock holds, since a new
    /// password would let anyone unlock it.
    pub fn set_password(&self, password: &str, now: DateTime<Local>) -> Result<()> {
        validate_password(password)?;

        let mut record = self.record()?;
        self.expire_if_due(&mut record, now)?;
        if let Some(until) = record.locked_until {
            return Err(KeeperError::Locked {
                remaining_seconds: seconds_until(&until, &now),
            });
        }

        let mut updated = record.clone();
        let salt = new_salt();
        updated.password_hash = Some(hash_password(&salt, password));
        updated.salt = Some(hex::encode(salt));
        self.store.save_lock(&updated)?;
        *record = updated;

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::PasswordSet));
        info!("Password set");
        Ok(())
    }

    pub fn has_password(&self) -> Result<bool> {
        Ok(self.record()?.has_password())
    }

    /// Check a password without changing any state
    pub fn verify_password(&self, password: &str) -> Result<()> {
        let record = self.record()?;
        check_password(&record, password)
    }

    /// Replace the password after proving the old one. Allowed while locked,
    /// since the caller already knows the password.
    pub fn change_password(&self, old_password: &str, new_password: &str) -> Result<()> {
        validate_password(new_password)?;

        let mut record = self.record()?;
        check_password(&record, old_password)?;

        let mut updated = record.clone();
        let salt = new_salt();
        updated.password_hash = Some(hash_password(&salt, new_password));
        updated.salt = Some(hex::encode(salt));
        self.store.save_lock(&updated)?;
        *record = updated;

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::PasswordChanged));
        info!("Password changed");
        Ok(())
    }

    /// Lock for `minutes` from `now`
    pub fn lock(&self, minutes: u64, now: DateTime<Local>) -> Result<LockStateInfo> {
        if minutes == 0 || minutes > MAX_LOCK_MINUTES {
            return Err(KeeperError::InvalidDuration(format!(
                "lock must be 1..={} minutes, got {}",
                MAX_LOCK_MINUTES, minutes
            )));
        }

        let mut record = self.record()?;
        self.expire_if_due(&mut record, now)?;
        if !record.has_password() {
            return Err(KeeperError::NoPasswordSet);
        }
        if record.locked_until.is_some() {
            return Err(KeeperError::AlreadyLocked);
        }

        // Bounded above, so the cast cannot overflow
        let until = now + ChronoDuration::minutes(minutes as i64);
        let mut updated = record.clone();
        updated.locked_until = Some(until);
        self.store.save_lock(&updated)?;
        *record = updated;

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::Locked { until }));
        info!(minutes, until = %until, "Blocklists locked");

        let info = info_for(&record, now);
        emit(&self.events, CoreEvent::LockChanged(info.clone()));
        Ok(info)
    }

    /// Clear the lock with the password. A wrong password leaves the lock in
    /// place and is audited.
    pub fn unlock(&self, password: &str, now: DateTime<Local>) -> Result<LockStateInfo> {
        let mut record = self.record()?;
        self.expire_if_due(&mut record, now)?;
        if record.locked_until.is_none() {
            return Err(KeeperError::NotLocked);
        }

        if let Err(e) = check_password(&record, password) {
            let _ = self
                .store
                .append_audit(AuditEvent::new(AuditEventType::UnlockRejected));
            warn!("Unlock rejected");
            return Err(e);
        }

        let mut updated = record.clone();
        updated.locked_until = None;
        self.store.save_lock(&updated)?;
        *record = updated;

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::Unlocked { manual: true }));
        info!("Blocklists unlocked");

        let info = info_for(&record, now);
        emit(&self.events, CoreEvent::LockChanged(info.clone()));
        Ok(info)
    }

    /// Current lock state. Clears and persists an expired lock.
    pub fn state(&self, now: DateTime<Local>) -> Result<LockStateInfo> {
        let mut record = self.record()?;
        self.expire_if_due(&mut record, now)?;
        Ok(info_for(&record, now))
    }

    pub fn is_locked(&self, now: DateTime<Local>) -> Result<bool> {
        Ok(self.state(now)?.is_locked)
    }

    /// Error with the remaining time if a lock holds
    pub fn ensure_unlocked(&self, now: DateTime<Local>) -> Result<()> {
        let info = self.state(now)?;
        if info.is_locked {
            return Err(KeeperError::Locked {
                remaining_seconds: info.remaining_seconds,
            });
        }
        Ok(())
    }

    fn expire_if_due(&self, record: &mut LockRecord, now: DateTime<Local>) -> Result<()> {
        let Some(until) = record.locked_until else {
            return Ok(());
        };
        if until > now {
            return Ok(());
        }

        let mut updated = record.clone();
        updated.locked_until = None;
        self.store.save_lock(&updated)?;
        *record = updated;

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::Unlocked { manual: false }));
        info!(expired_at = %until, "Lock expired");
        emit(&self.events, CoreEvent::LockChanged(info_for(record, now)));
        Ok(())
    }
}

/// Callers run `expire_if_due` first, so a present deadline is in the future
/// and `remaining_seconds` is at least one.
fn info_for(record: &LockRecord, now: DateTime<Local>) -> LockStateInfo {
    let remaining = record
        .locked_until
        .map(|until| seconds_until(&until, &now))
        .unwrap_or(0);
    LockStateInfo {
        is_locked: record.locked_until.is_some(),
        remaining_seconds: remaining,
        has_password: record.has_password(),
        lock_end_time: record.locked_until,
    }
}

fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(KeeperError::PasswordTooShort {
            min: MIN_PASSWORD_LEN,
        });
    }
    Ok(())
}

fn check_password(record: &LockRecord, password: &str) -> Result<()> {
    let (Some(hash), Some(salt_hex)) = (&record.password_hash, &record.salt) else {
        return Err(KeeperError::NoPasswordSet);
    };
    let salt = hex::decode(salt_hex)
        .map_err(|e| KeeperError::internal(format!("corrupt password salt: {}", e)))?;

    if constant_time_eq(hash_password(&salt, password).as_bytes(), hash.as_bytes()) {
        Ok(())
    } else {
        Err(KeeperError::WrongPassword)
    }
}

fn new_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    salt
}

fn hash_password(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

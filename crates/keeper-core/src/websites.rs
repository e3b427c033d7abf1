//! Website blocklist
//!
//! The persisted set of blocked domains and its enforcement through a
//! [`NetworkEnforcer`]. A domain is only reported as blocked once the
//! enforcer has applied it; a failed or timed-out apply rolls the entry back.

use chrono::{DateTime, Local};
use keeper_api::{BlockCategory, ErrorInfo, UnblockFailure, UnblockReport, WebsiteOutcome};
use keeper_host_api::NetworkEnforcer;
use keeper_store::{AuditEvent, AuditEventType, Store};
use keeper_util::{KeeperError, Result};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::lock::LockManager;
use crate::stats::StatsAggregator;

const MAX_DOMAIN_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Canonical form of a user-supplied domain or URL.
///
/// Lowercases and strips any scheme, credentials, port, path and trailing
/// dot, so `HTTPS://www.Example.com:443/feed` becomes `www.example.com`.
pub fn normalize_domain(input: &str) -> Result<String> {
    let invalid = || KeeperError::InvalidDomain(input.trim().to_string());

    let mut host = input.trim().to_lowercase();
    if let Some(idx) = host.find("://") {
        host = host[idx + 3..].to_string();
    }
    if let Some(idx) = host.find(['/', '?', '#']) {
        host.truncate(idx);
    }
    if let Some(idx) = host.rfind('@') {
        host = host[idx + 1..].to_string();
    }
    if let Some((name, port)) = host.rsplit_once(':')
        && !port.is_empty()
        && port.chars().all(|c| c.is_ascii_digit())
    {
        host = name.to_string();
    }
    let host = host.trim_end_matches('.');

    if host.is_empty() || host.len() > MAX_DOMAIN_LEN || !host.contains('.') {
        return Err(invalid());
    }
    for label in host.split('.') {
        let valid = !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(invalid());
        }
    }

    Ok(host.to_string())
}

/// Domains applied and removed by [`WebsiteBlocklist::reconcile`]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub applied: Vec<String>,
    pub removed: Vec<String>,
    pub failed: Vec<String>,
}

pub struct WebsiteBlocklist {
    store: Arc<dyn Store>,
    enforcer: Arc<dyn NetworkEnforcer>,
    lock: Arc<LockManager>,
    stats: Arc<StatsAggregator>,
    timeout: Duration,
    /// Serializes mutations so the stored set and the enforced set change
    /// in the same order.
    mutation: Mutex<()>,
}

impl WebsiteBlocklist {
    pub fn new(
        store: Arc<dyn Store>,
        enforcer: Arc<dyn NetworkEnforcer>,
        lock: Arc<LockManager>,
        stats: Arc<StatsAggregator>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            enforcer,
            lock,
            stats,
            timeout,
            mutation: Mutex::new(()),
        }
    }

    /// Blocked domains, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        Ok(self.store.list_blocked(BlockCategory::Website)?)
    }

    pub async fn add(&self, domain: &str, now: DateTime<Local>) -> Result<String> {
        let domain = normalize_domain(domain)?;
        let _guard = self.mutation.lock().await;

        self.lock.ensure_unlocked(now)?;
        if !self.store.insert_blocked(BlockCategory::Website, &domain)? {
            return Err(KeeperError::AlreadyBlocked(domain));
        }

        if let Err(e) = self.apply_block(&domain).await {
            // Not enforced, so not blocked
            if let Err(rollback) = self.store.remove_blocked(BlockCategory::Website, &domain) {
                warn!(domain = %domain, error = %rollback, "Failed to roll back website entry");
            }
            warn!(domain = %domain, error = %e, "Website block failed");
            return Err(e);
        }

        if let Err(e) = self.stats.add_block_event(BlockCategory::Website, now) {
            warn!(domain = %domain, error = %e, "Failed to record website block");
        }
        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::Blocked {
            category: BlockCategory::Website,
            name: domain.clone(),
        }));
        info!(domain = %domain, "Website blocked");
        Ok(domain)
    }

    /// Remove a domain. The entry is gone from the set even when the
    /// enforcer fails to lift it; the error tells the caller to retry.
    pub async fn remove(&self, domain: &str, now: DateTime<Local>) -> Result<String> {
        let domain = normalize_domain(domain)?;
        let _guard = self.mutation.lock().await;

        self.lock.ensure_unlocked(now)?;
        if !self.store.remove_blocked(BlockCategory::Website, &domain)? {
            return Err(KeeperError::NotFound(domain));
        }
        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::Unblocked {
            category: BlockCategory::Website,
            name: domain.clone(),
        }));

        self.apply_unblock(&domain).await?;
        info!(domain = %domain, "Website unblocked");
        Ok(domain)
    }

    /// Add several domains. One failure does not stop the rest.
    pub async fn add_many(&self, domains: &[String], now: DateTime<Local>) -> Vec<WebsiteOutcome> {
        let mut outcomes = Vec::with_capacity(domains.len());
        for raw in domains {
            let outcome = match self.add(raw, now).await {
                Ok(domain) => WebsiteOutcome {
                    domain,
                    error: None,
                },
                Err(e) => WebsiteOutcome {
                    domain: raw.trim().to_string(),
                    error: Some(ErrorInfo::from(&e)),
                },
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Empty the blocklist. Every entry leaves the store; enforcement
    /// failures are reported per domain.
    pub async fn unblock_all(&self, now: DateTime<Local>) -> Result<UnblockReport> {
        let _guard = self.mutation.lock().await;
        self.lock.ensure_unlocked(now)?;

        let removed = self.store.clear_blocked(BlockCategory::Website)?;
        let mut failures = Vec::new();
        for domain in &removed {
            let _ = self.store.append_audit(AuditEvent::new(AuditEventType::Unblocked {
                category: BlockCategory::Website,
                name: domain.clone(),
            }));
            if let Err(e) = self.apply_unblock(domain).await {
                warn!(domain = %domain, error = %e, "Website unblock failed");
                failures.push(UnblockFailure {
                    domain: domain.clone(),
                    reason: e.to_string(),
                });
            }
        }

        info!(
            removed = removed.len(),
            failed = failures.len(),
            "Website blocklist cleared"
        );
        Ok(UnblockReport { removed, failures })
    }

    /// Bring the enforcer in line with the stored set: apply missing blocks
    /// and lift blocks nothing records. Run at startup.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let _guard = self.mutation.lock().await;

        let stored: BTreeSet<String> = self.list()?.into_iter().collect();
        let enforced: BTreeSet<String> = tokio::time::timeout(self.timeout, self.enforcer.enforced())
            .await
            .map_err(|_| KeeperError::host("timed out listing enforced domains"))?
            .map_err(|e| KeeperError::host(e.to_string()))?
            .into_iter()
            .collect();

        let mut report = ReconcileReport::default();
        for domain in stored.difference(&enforced) {
            match self.apply_block(domain).await {
                Ok(()) => report.applied.push(domain.clone()),
                Err(e) => {
                    warn!(domain = %domain, error = %e, "Failed to reapply website block");
                    report.failed.push(domain.clone());
                }
            }
        }
        for domain in enforced.difference(&stored) {
            match self.apply_unblock(domain).await {
                Ok(()) => report.removed.push(domain.clone()),
                Err(e) => {
                    warn!(domain = %domain, error = %e, "Failed to lift stale website block");
                    report.failed.push(domain.clone());
                }
            }
        }

        debug!(
            applied = report.applied.len(),
            removed = report.removed.len(),
            failed = report.failed.len(),
            "Website blocklist reconciled"
        );
        Ok(report)
    }

    async fn apply_block(&self, domain: &str) -> Result<()> {
        match tokio::time::timeout(self.timeout, self.enforcer.block(domain)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(KeeperError::enforcement(domain, e.to_string())),
            Err(_) => Err(KeeperError::enforcement(
                domain,
                format!("timed out after {}s", self.timeout.as_secs()),
            )),
        }
    }

    async fn apply_unblock(&self, domain: &str) -> Result<()> {
        match tokio::time::timeout(self.timeout, self.enforcer.unblock(domain)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(KeeperError::enforcement(domain, e.to_string())),
            Err(_) => Err(KeeperError::enforcement(
                domain,
                format!("timed out after {}s", self.timeout.as_secs()),
            )),
        }
    }
}

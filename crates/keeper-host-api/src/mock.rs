//! Mock host collaborators for testing

use async_trait::async_trait;
use keeper_api::RunningProcess;
use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{matches_pattern, HostError, HostResult, NetworkEnforcer, ProcessInspector};

/// In-memory process table
pub struct MockInspector {
    processes: Mutex<Vec<RunningProcess>>,
    kills: Mutex<Vec<u32>>,

    /// Pids whose termination fails with `PermissionDenied`
    pub deny_kill: Arc<Mutex<HashSet<u32>>>,

    /// Configure `find` to fail
    pub fail_find: Arc<Mutex<bool>>,
}

impl MockInspector {
    pub fn new() -> Self {
        Self {
            processes: Mutex::new(Vec::new()),
            kills: Mutex::new(Vec::new()),
            deny_kill: Arc::new(Mutex::new(HashSet::new())),
            fail_find: Arc::new(Mutex::new(false)),
        }
    }

    /// Add a fake running process
    pub fn spawn_process(&self, name: &str, pid: u32) {
        self.processes.lock().unwrap().push(RunningProcess {
            name: name.to_string(),
            pid,
            exe: Some(format!("/usr/bin/{}", name.to_lowercase())),
        });
    }

    pub fn is_running(&self, pid: u32) -> bool {
        self.processes.lock().unwrap().iter().any(|p| p.pid == pid)
    }

    /// Pids successfully terminated, in call order
    pub fn kills(&self) -> Vec<u32> {
        self.kills.lock().unwrap().clone()
    }
}

impl Default for MockInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessInspector for MockInspector {
    fn find(&self, pattern: &str) -> HostResult<Vec<RunningProcess>> {
        if *self.fail_find.lock().unwrap() {
            return Err(HostError::Internal("Mock find failure".into()));
        }

        Ok(self
            .processes
            .lock()
            .unwrap()
            .iter()
            .filter(|p| matches_pattern(&p.name, pattern))
            .cloned()
            .collect())
    }

    fn kill(&self, pid: u32) -> HostResult<()> {
        if self.deny_kill.lock().unwrap().contains(&pid) {
            return Err(HostError::PermissionDenied(format!("pid {}", pid)));
        }

        let mut processes = self.processes.lock().unwrap();
        let before = processes.len();
        processes.retain(|p| p.pid != pid);
        if processes.len() == before {
            return Err(HostError::ProcessNotFound(pid));
        }

        self.kills.lock().unwrap().push(pid);
        Ok(())
    }
}

/// In-memory network blocklist
pub struct MockEnforcer {
    enforced: Mutex<BTreeSet<String>>,

    /// Configure `block` to fail
    pub fail_block: Arc<Mutex<bool>>,

    /// Configure `unblock` to fail for these domains
    pub fail_unblock: Arc<Mutex<HashSet<String>>>,

    /// Artificial latency for every call
    pub delay: Arc<Mutex<Option<Duration>>>,
}

impl MockEnforcer {
    pub fn new() -> Self {
        Self {
            enforced: Mutex::new(BTreeSet::new()),
            fail_block: Arc::new(Mutex::new(false)),
            fail_unblock: Arc::new(Mutex::new(HashSet::new())),
            delay: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_enforced(&self, domain: &str) -> bool {
        self.enforced.lock().unwrap().contains(domain)
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    async fn simulate_latency(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for MockEnforcer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkEnforcer for MockEnforcer {
    async fn block(&self, domain: &str) -> HostResult<()> {
        self.simulate_latency().await;

        if *self.fail_block.lock().unwrap() {
            return Err(HostError::EnforcementFailed("Mock block failure".into()));
        }

        self.enforced.lock().unwrap().insert(domain.to_string());
        Ok(())
    }

    async fn unblock(&self, domain: &str) -> HostResult<()> {
        self.simulate_latency().await;

        if self.fail_unblock.lock().unwrap().contains(domain) {
            return Err(HostError::EnforcementFailed(format!(
                "Mock unblock failure for {}",
                domain
            )));
        }

        self.enforced.lock().unwrap().remove(domain);
        Ok(())
    }

    async fn enforced(&self) -> HostResult<Vec<String>> {
        Ok(self.enforced.lock().unwrap().iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_find_and_kill() {
        let inspector = MockInspector::new();
        inspector.spawn_process("Discord", 100);
        inspector.spawn_process("bash", 200);

        let found = inspector.find("disc").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pid, 100);

        inspector.kill(100).unwrap();
        assert!(!inspector.is_running(100));
        assert_eq!(inspector.kills(), vec![100]);
    }

    #[test]
    fn mock_kill_missing_pid() {
        let inspector = MockInspector::new();
        assert!(matches!(
            inspector.kill(42),
            Err(HostError::ProcessNotFound(42))
        ));
    }

    #[test]
    fn mock_kill_denied() {
        let inspector = MockInspector::new();
        inspector.spawn_process("systemd", 1);
        inspector.deny_kill.lock().unwrap().insert(1);

        assert!(matches!(
            inspector.kill(1),
            Err(HostError::PermissionDenied(_))
        ));
        assert!(inspector.is_running(1));
    }

    #[tokio::test]
    async fn mock_block_is_idempotent() {
        let enforcer = MockEnforcer::new();
        enforcer.block("example.com").await.unwrap();
        enforcer.block("example.com").await.unwrap();
        assert_eq!(enforcer.enforced().await.unwrap(), vec!["example.com"]);

        enforcer.unblock("example.com").await.unwrap();
        enforcer.unblock("example.com").await.unwrap();
        assert!(!enforcer.is_enforced("example.com"));
    }

    #[tokio::test]
    async fn mock_block_failure() {
        let enforcer = MockEnforcer::new();
        *enforcer.fail_block.lock().unwrap() = true;
        assert!(enforcer.block("example.com").await.is_err());
        assert!(!enforcer.is_enforced("example.com"));
    }
}

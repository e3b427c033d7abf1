//! Host collaborator traits

use async_trait::async_trait;
use keeper_api::RunningProcess;
use thiserror::Error;

/// Errors from host operations
#[derive(Debug, Error)]
pub enum HostError {
    /// The process exited before it could be terminated
    #[error("Process {0} not found")]
    ProcessNotFound(u32),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Enforcement failed: {0}")]
    EnforcementFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type HostResult<T> = Result<T, HostError>;

/// Case-insensitive substring match of a blocked-app pattern against a
/// live process name.
pub fn matches_pattern(process_name: &str, pattern: &str) -> bool {
    let pattern = pattern.trim().to_lowercase();
    !pattern.is_empty() && process_name.to_lowercase().contains(&pattern)
}

/// Enumerates and terminates OS processes.
///
/// Calls are short and synchronous; implementations refresh their view of
/// the process table on every `find`.
pub trait ProcessInspector: Send + Sync {
    /// Processes whose name matches `pattern` (see [`matches_pattern`])
    fn find(&self, pattern: &str) -> HostResult<Vec<RunningProcess>>;

    /// Terminate one process. A pid that no longer exists yields
    /// [`HostError::ProcessNotFound`].
    fn kill(&self, pid: u32) -> HostResult<()>;

    fn is_healthy(&self) -> bool {
        true
    }
}

/// Blocks and unblocks domains at the OS or network layer.
///
/// Both operations are idempotent: blocking an already blocked domain or
/// unblocking one that is not blocked succeeds without change.
#[async_trait]
pub trait NetworkEnforcer: Send + Sync {
    async fn block(&self, domain: &str) -> HostResult<()>;

    async fn unblock(&self, domain: &str) -> HostResult<()>;

    /// Domains currently enforced by this mechanism
    async fn enforced(&self) -> HostResult<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_matching_is_case_insensitive_substring() {
        assert!(matches_pattern("Discord", "discord"));
        assert!(matches_pattern("steamwebhelper", "STEAM"));
        assert!(matches_pattern("firefox-bin", " firefox "));
        assert!(!matches_pattern("chrome", "chromium"));
    }

    #[test]
    fn empty_pattern_matches_nothing() {
        assert!(!matches_pattern("bash", ""));
        assert!(!matches_pattern("bash", "   "));
    }
}

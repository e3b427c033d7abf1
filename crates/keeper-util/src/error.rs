//! Error types for keeperd

use thiserror::Error;

/// Broad classes of failure, used to pick a protocol error code and to
/// decide whether a caller may retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed input; the caller must correct it.
    Validation,
    /// Operation not allowed in the current state.
    StateConflict,
    NotFound,
    /// An external collaborator could not apply a change. Retryable.
    Enforcement,
    /// Refused by the password lock.
    Locked,
    /// Password missing or wrong.
    Auth,
    Internal,
}

/// Core error type for focus keeper operations
#[derive(Debug, Error)]
pub enum KeeperError {
    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("Invalid app name: {0:?}")]
    InvalidAppName(String),

    #[error("Password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Already blocked: {0}")]
    AlreadyBlocked(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Enforcement failed for {target}: {reason}")]
    EnforcementFailed { target: String, reason: String },

    #[error("Blocklist is locked for another {remaining_seconds}s")]
    Locked { remaining_seconds: u64 },

    #[error("Already locked")]
    AlreadyLocked,

    #[error("Not locked")]
    NotLocked,

    #[error("No password has been set")]
    NoPasswordSet,

    #[error("Wrong password")]
    WrongPassword,

    #[error("A focus session is already running")]
    AlreadyRunning,

    #[error("No focus session is running")]
    NotRunning,

    #[error("Focus session is not paused")]
    NotPaused,

    #[error("Strict mode is active; unlock first")]
    StrictModeActive,

    #[error("Store error: {0}")]
    Store(String),

    #[error("Host error: {0}")]
    Host(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl KeeperError {
    pub fn enforcement(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnforcementFailed {
            target: target.into(),
            reason: reason.into(),
        }
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn host(msg: impl Into<String>) -> Self {
        Self::Host(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidDomain(_)
            | Self::InvalidAppName(_)
            | Self::PasswordTooShort { .. }
            | Self::InvalidDuration(_) => ErrorCategory::Validation,
            Self::AlreadyBlocked(_)
            | Self::AlreadyLocked
            | Self::NotLocked
            | Self::AlreadyRunning
            | Self::NotRunning
            | Self::NotPaused
            | Self::StrictModeActive => ErrorCategory::StateConflict,
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::EnforcementFailed { .. } => ErrorCategory::Enforcement,
            Self::Locked { .. } => ErrorCategory::Locked,
            Self::NoPasswordSet | Self::WrongPassword => ErrorCategory::Auth,
            Self::Store(_) | Self::Host(_) | Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Whether retrying the same call later may succeed without the caller
    /// changing its input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Enforcement | ErrorCategory::Locked | ErrorCategory::Internal
        )
    }
}

pub type Result<T> = std::result::Result<T, KeeperError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories() {
        assert_eq!(
            KeeperError::InvalidDomain("x".into()).category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            KeeperError::StrictModeActive.category(),
            ErrorCategory::StateConflict
        );
        assert_eq!(
            KeeperError::Locked { remaining_seconds: 3 }.category(),
            ErrorCategory::Locked
        );
        assert_eq!(KeeperError::WrongPassword.category(), ErrorCategory::Auth);
    }

    #[test]
    fn enforcement_is_retryable() {
        assert!(KeeperError::enforcement("a.com", "timeout").is_retryable());
        assert!(!KeeperError::AlreadyBlocked("a.com".into()).is_retryable());
    }

    #[test]
    fn messages() {
        let err = KeeperError::PasswordTooShort { min: 4 };
        assert_eq!(err.to_string(), "Password must be at least 4 characters");
    }
}

//! Command types for the keeperd protocol

use keeper_util::{ClientId, ErrorCategory, KeeperError};
use serde::{Deserialize, Serialize};

use crate::{
    BlockCategory, DailyStats, DaemonStateSnapshot, FocusState, HealthStatus, KillReport,
    LockStateInfo, RunningProcess, StatsData, UnblockReport, WebsiteOutcome, API_VERSION,
};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    pub api_version: u32,
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub request_id: u64,
    pub api_version: u32,
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }

    pub fn from_result(request_id: u64, result: keeper_util::Result<ResponsePayload>) -> Self {
        match result {
            Ok(payload) => Self::success(request_id, payload),
            Err(err) => Self::error(request_id, ErrorInfo::from(&err)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&KeeperError> for ErrorInfo {
    fn from(err: &KeeperError) -> Self {
        let code = match err {
            KeeperError::WrongPassword => ErrorCode::WrongPassword,
            KeeperError::NoPasswordSet => ErrorCode::NoPasswordSet,
            KeeperError::StrictModeActive => ErrorCode::StrictModeActive,
            other => match other.category() {
                ErrorCategory::Validation => ErrorCode::ValidationFailed,
                ErrorCategory::StateConflict => ErrorCode::StateConflict,
                ErrorCategory::NotFound => ErrorCode::NotFound,
                ErrorCategory::Enforcement => ErrorCode::EnforcementFailed,
                ErrorCategory::Locked => ErrorCode::Locked,
                ErrorCategory::Auth => ErrorCode::WrongPassword,
                ErrorCategory::Internal => ErrorCode::InternalError,
            },
        };
        Self::new(code, err.to_string())
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    ValidationFailed,
    StateConflict,
    StrictModeActive,
    NotFound,
    EnforcementFailed,
    Locked,
    WrongPassword,
    NoPasswordSet,
    RateLimited,
    InternalError,
}

/// All possible commands from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Get the full daemon state
    GetState,

    // Focus session
    StartFocus {
        /// Falls back to the configured default when absent
        #[serde(default)]
        target_minutes: Option<u32>,
        #[serde(default)]
        strict_mode: bool,
    },
    PauseFocus,
    ResumeFocus,
    StopFocus,
    GetFocusState,
    /// Ensure the one-second tick loop is running (idempotent)
    RunFocusTimer,

    // Websites
    AddWebsite { domain: String },
    RemoveWebsite { domain: String },
    BlockWebsites { domains: Vec<String> },
    UnblockAll,
    GetBlockedWebsites,

    // Apps
    AddApp { name: String },
    RemoveApp { name: String },
    GetBlockedApps,
    CheckProcesses { names: Vec<String> },
    FindProcesses { name: String },
    IsAppRunning { name: String },
    KillAppProcesses { name: String },
    KillProcess { pid: u32 },
    KillProcesses { pids: Vec<u32> },
    StartMonitoring,
    StopMonitoring,

    // Password lock
    SetPassword { password: String },
    HasPassword,
    VerifyPassword { password: String },
    ChangePassword {
        old_password: String,
        new_password: String,
    },
    LockFocus { minutes: u64 },
    Unlock { password: String },
    GetLockState,

    // Statistics
    /// Manually credit focus seconds. Completed sessions are credited by
    /// the daemon itself, so clients must not echo completions here.
    AddFocusTime { seconds: u64 },
    /// Manually record a block event
    AddBlock { category: BlockCategory },
    GetStats,
    ResetStats,
    GetFocusDuration,
    GetBlockCount,
    GetHistory { days: u32 },

    /// Subscribe to events (returns immediately, events stream separately)
    SubscribeEvents,
    UnsubscribeEvents,
    GetHealth,
    Ping,
}

impl Command {
    /// Whether this command changes persisted state; used for audit logging
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Command::GetState
                | Command::GetFocusState
                | Command::GetBlockedWebsites
                | Command::GetBlockedApps
                | Command::CheckProcesses { .. }
                | Command::FindProcesses { .. }
                | Command::IsAppRunning { .. }
                | Command::HasPassword
                | Command::VerifyPassword { .. }
                | Command::GetLockState
                | Command::GetStats
                | Command::GetFocusDuration
                | Command::GetBlockCount
                | Command::GetHistory { .. }
                | Command::SubscribeEvents
                | Command::UnsubscribeEvents
                | Command::GetHealth
                | Command::Ping
        )
    }
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    State(DaemonStateSnapshot),
    Focus(FocusState),
    TimerRunning {
        /// False when a tick loop was already active
        spawned: bool,
    },
    Websites {
        domains: Vec<String>,
    },
    WebsiteAdded {
        domain: String,
    },
    WebsiteRemoved {
        domain: String,
    },
    WebsitesBlocked {
        outcomes: Vec<WebsiteOutcome>,
    },
    Unblocked(UnblockReport),
    Apps {
        names: Vec<String>,
    },
    AppAdded {
        name: String,
    },
    AppRemoved {
        name: String,
    },
    Processes {
        processes: Vec<RunningProcess>,
    },
    AppRunning {
        name: String,
        running: bool,
    },
    Killed(KillReport),
    Monitoring {
        active: bool,
    },
    PasswordSet,
    HasPassword {
        has_password: bool,
    },
    PasswordVerified,
    PasswordChanged,
    LockState(LockStateInfo),
    Stats(StatsData),
    FocusDuration {
        seconds: u64,
    },
    BlockCount {
        count: u64,
    },
    History {
        days: Vec<DailyStats>,
    },
    Subscribed {
        client_id: ClientId,
    },
    Unsubscribed,
    Health(HealthStatus),
    Pong,
}

/// Client connection info (set by IPC layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: ClientId,
    /// Unix UID if available
    pub uid: Option<u32>,
}

impl ClientInfo {
    pub fn new() -> Self {
        Self {
            client_id: ClientId::new(),
            uid: None,
        }
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serialization() {
        let req = Request::new(
            7,
            Command::StartFocus {
                target_minutes: Some(25),
                strict_mode: true,
            },
        );
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"type\":\"start_focus\""));

        let parsed: Request = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.request_id, 7);
        assert!(matches!(
            parsed.command,
            Command::StartFocus {
                target_minutes: Some(25),
                strict_mode: true
            }
        ));
    }

    #[test]
    fn start_focus_fields_are_optional() {
        let cmd: Command = serde_json::from_str(r#"{"type":"start_focus"}"#).unwrap();
        assert!(matches!(
            cmd,
            Command::StartFocus {
                target_minutes: None,
                strict_mode: false,
            }
        ));
    }

    #[test]
    fn errors_map_to_codes() {
        let info = ErrorInfo::from(&KeeperError::Locked {
            remaining_seconds: 30,
        });
        assert_eq!(info.code, ErrorCode::Locked);

        let info = ErrorInfo::from(&KeeperError::InvalidDomain("a b".into()));
        assert_eq!(info.code, ErrorCode::ValidationFailed);

        let info = ErrorInfo::from(&KeeperError::NoPasswordSet);
        assert_eq!(info.code, ErrorCode::NoPasswordSet);

        let info = ErrorInfo::from(&KeeperError::StrictModeActive);
        assert_eq!(info.code, ErrorCode::StrictModeActive);
    }

    #[test]
    fn from_result_wraps_errors() {
        let resp = Response::from_result(3, Err(KeeperError::NotRunning));
        match resp.result {
            ResponseResult::Err(e) => assert_eq!(e.code, ErrorCode::StateConflict),
            ResponseResult::Ok(_) => panic!("expected error"),
        }
    }

    #[test]
    fn read_commands_are_not_mutations() {
        assert!(!Command::GetStats.is_mutation());
        assert!(Command::ResetStats.is_mutation());
        assert!(Command::AddWebsite {
            domain: "a.com".into()
        }
        .is_mutation());
    }
}

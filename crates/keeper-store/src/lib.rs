//! Persistence layer for keeperd
//!
//! Provides:
//! - Website and app blocklists (set semantics)
//! - The password lock record
//! - Daily and lifetime statistics counters
//! - Audit log (append-only)

mod audit;
mod sqlite;
mod traits;

pub use audit::*;
pub use sqlite::*;
pub use traits::*;

use keeper_util::KeeperError;
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store connection lock poisoned")]
    Poisoned,

    #[error("Counter out of range: {0}")]
    OutOfRange(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<StoreError> for KeeperError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::OutOfRange(msg) => KeeperError::InvalidDuration(msg),
            other => KeeperError::store(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

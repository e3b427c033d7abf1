//! Shared utilities for keeperd
//!
//! This crate provides:
//! - ID types (SessionId, ClientId)
//! - Time utilities (mockable wall clock, monotonic instants, day keys)
//! - The domain error taxonomy
//! - Default paths for socket, data, config, and log directories
//! - Per-client rate limiting

mod error;
mod ids;
mod paths;
mod rate_limit;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use rate_limit::*;
pub use time::*;

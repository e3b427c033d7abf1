//! Protocol types for keeperd IPC
//!
//! This crate defines the stable API between keeperd and its clients:
//! - Commands (requests from clients)
//! - Responses
//! - Events (daemon -> clients)
//! - Versioning
//!
//! Every command answers with `ok(payload)` or `err({code, message})`.
//! A front-end that expects `{success, message, data}` reads `ok` as
//! `success = true` with the payload as `data`, and `err` as
//! `success = false` with the error message.

mod commands;
mod events;
mod types;

pub use commands::*;
pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;

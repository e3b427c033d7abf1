//! Focus engine for keeperd
//!
//! This crate is the heart of keeperd, containing:
//! - The focus session state machine (Idle -> Running <-> Paused -> Completed | Stopped)
//!   and its one-second timer
//! - The app blocklist and the polling monitor that terminates blocked processes
//! - The website blocklist, enforced through a [`keeper_host_api::NetworkEnforcer`]
//! - The password lock that freezes both blocklists for a chosen duration
//! - Daily and lifetime statistics
//!
//! [`FocusKeeper`] owns one instance of each and is the only entry point the
//! daemon needs.

mod apps;
mod events;
mod focus;
mod keeper;
mod lock;
mod monitor;
mod session;
mod stats;
mod websites;

pub use apps::*;
pub use events::*;
pub use focus::*;
pub use keeper::*;
pub use lock::*;
pub use monitor::*;
pub use session::*;
pub use stats::*;
pub use websites::*;

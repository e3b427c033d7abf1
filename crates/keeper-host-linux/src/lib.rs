//! Linux host adapter for keeperd
//!
//! Provides:
//! - Process lookup by name through the process table
//! - Forceful (SIGKILL) termination of single pids
//! - Website blocking through marker-tagged `/etc/hosts` entries

mod hosts;
mod process;

pub use hosts::*;
pub use process::*;

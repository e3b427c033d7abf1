//! Host collaborator interfaces for keeperd
//!
//! This crate defines the boundary between the focus engine and the
//! operating system: enumerating and terminating processes, and blocking
//! domains at the network layer. It contains no platform code itself.

mod mock;
mod traits;

pub use mock::*;
pub use traits::*;

//! Connection management for the companion app service
//!
//! This module handles:
//! - Lazy, single construction of the manager and its connector
//! - The ordered connector/broadcast event stream
//! - Status caching with timestamps and UI notification
//! - Live status probes with explicit degraded results

mod manager;
mod probe;
mod slot;

pub use manager::{
    ConnectionManager, ManagerEvent, MSG_NOT_CONNECTED, MSG_NOT_INSTALLED, MSG_UNKNOWN,
};
pub use probe::{Probe, UnavailableReason};
pub use slot::ManagerSlot;

//! Link State
//!
//! Conceptual lifecycle of the companion link, derived from what a caller can
//! observe: whether the companion is installed, whether a connector exists,
//! whether the service is bound, and the cached device status.

use crate::DeviceStatus;
use std::fmt;

/// Observable lifecycle state of the companion link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Companion app is not installed; no connector will ever be created
    NoCompanion,
    /// Nothing has been initialized yet
    Uninitialized,
    /// Connector exists but the service is not bound
    Binding,
    /// Service is bound; carries the cached device status, if any
    Bound(Option<DeviceStatus>),
}

impl LinkState {
    /// Derive the state from observed facts
    ///
    /// `companion_present` is `None` until presence has been checked.
    pub fn from_observed(
        companion_present: Option<bool>,
        has_connector: bool,
        bound: bool,
        last_status: Option<DeviceStatus>,
    ) -> Self {
        match companion_present {
            Some(false) => LinkState::NoCompanion,
            _ if !has_connector => LinkState::Uninitialized,
            _ if !bound => LinkState::Binding,
            _ => LinkState::Bound(last_status),
        }
    }

    /// Bound and the device itself reports connected
    pub fn is_ready(&self) -> bool {
        matches!(self, LinkState::Bound(Some(DeviceStatus::Connected)))
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::NoCompanion => write!(f, "NO_COMPANION"),
            LinkState::Uninitialized => write!(f, "UNINITIALIZED"),
            LinkState::Binding => write!(f, "BINDING"),
            LinkState::Bound(Some(status)) => write!(f, "BOUND({})", status),
            LinkState::Bound(None) => write!(f, "BOUND(?)"),
        }
    }
}

//! Result of a live status probe

use companion_shared::DeviceStatus;
use std::fmt;

/// Why a live status could not be read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnavailableReason {
    /// Companion app is not installed
    NotInstalled,
    /// No connector, or the service is not bound
    NotBound,
    /// The remote call failed
    Failed(String),
    /// The remote call did not answer in time
    TimedOut,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::NotInstalled => write!(f, "companion app not installed"),
            UnavailableReason::NotBound => write!(f, "not bound to companion service"),
            UnavailableReason::Failed(message) => write!(f, "status probe failed: {}", message),
            UnavailableReason::TimedOut => write!(f, "status probe timed out"),
        }
    }
}

/// Outcome of asking the connector for its live status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Live(DeviceStatus),
    Unavailable(UnavailableReason),
}

impl Probe {
    /// Collapse to a status; anything unavailable reads as disconnected
    pub fn status(&self) -> DeviceStatus {
        match self {
            Probe::Live(status) => *status,
            Probe::Unavailable(_) => DeviceStatus::Disconnected,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Probe::Live(_))
    }
}

//! Configuration for the companion link

use companion_shared::well_known;
use std::time::Duration;

/// Configuration for the connection manager
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Package identifier checked for companion presence
    pub companion_package: String,
    /// Broadcast action the status listener filters on
    pub status_action: String,
    /// Upper bound on a live status probe
    pub probe_timeout: Duration,
    /// Maximum age for the cached status to count as recent (None = no window)
    pub status_max_age: Option<Duration>,
    /// Capacity of the UI notification bus
    pub event_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            companion_package: well_known::COMPANION_APP_PACKAGE.into(),
            status_action: well_known::STATUS_ACTION.into(),
            probe_timeout: Duration::from_secs(2),
            status_max_age: None,
            event_capacity: 64,
        }
    }
}

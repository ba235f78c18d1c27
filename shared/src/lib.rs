//! Companion Link Shared Types
//!
//! This crate provides the device status type, the broadcast intent message
//! and its codec, shared between the connection manager and companion-side
//! tooling.

pub mod codec;
pub mod intent;
pub mod link_state;
pub mod status;

use std::time::{SystemTime, UNIX_EPOCH};

// Re-export commonly used types at crate root
pub use intent::Intent;
pub use link_state::LinkState;
pub use status::{DeviceStatus, ParseStatusError};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Well-known identifiers used by the companion app
pub mod well_known {
    /// Package identifier of the companion app
    pub const COMPANION_APP_PACKAGE: &str = "sugar.free.sightremote";

    /// Broadcast action carrying status pushes
    pub const STATUS_ACTION: &str = "sugar.free.sightparser.handling.StatusCallback";

    /// Intent extra holding the textual status
    pub const STATUS_MESSAGE_EXTRA: &str = "STATUS_MESSAGE";
}

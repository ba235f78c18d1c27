//! Device status reported by the companion app

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Connection status of the device behind the companion app
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceStatus {
    Disconnected,
    Connecting,
    Connected,
    Busy,
    Unknown,
}

impl DeviceStatus {
    /// All known statuses, in declaration order
    pub const ALL: [DeviceStatus; 5] = [
        DeviceStatus::Disconnected,
        DeviceStatus::Connecting,
        DeviceStatus::Connected,
        DeviceStatus::Busy,
        DeviceStatus::Unknown,
    ];

    /// Textual form as sent by the companion app
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Disconnected => "DISCONNECTED",
            DeviceStatus::Connecting => "CONNECTING",
            DeviceStatus::Connected => "CONNECTED",
            DeviceStatus::Busy => "BUSY",
            DeviceStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status text did not name a known status
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unrecognized device status: {0:?}")]
pub struct ParseStatusError(pub String);

impl FromStr for DeviceStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        DeviceStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

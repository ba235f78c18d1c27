//! Broadcast intent message
//!
//! Status pushes from the companion app arrive as intents: an action string
//! naming the channel plus string extras.

use prost::Message;
use std::collections::HashMap;

use crate::{well_known, DeviceStatus};

#[derive(Clone, PartialEq, Message)]
pub struct Intent {
    #[prost(string, tag = "1")]
    pub action: String,

    #[prost(map = "string, string", tag = "2")]
    pub extras: HashMap<String, String>,

    #[prost(uint64, tag = "3")]
    pub timestamp_ms: u64,
}

impl Intent {
    /// Create an intent for the given action with no extras
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            extras: HashMap::new(),
            timestamp_ms: crate::now_ms(),
        }
    }

    /// Create a status push on the given action
    pub fn status(action: impl Into<String>, status: DeviceStatus) -> Self {
        Self::new(action).with_extra(well_known::STATUS_MESSAGE_EXTRA, status.as_str())
    }

    /// Add a string extra
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    /// Get a string extra
    pub fn string_extra(&self, key: &str) -> Option<&str> {
        self.extras.get(key).map(String::as_str)
    }

    /// Raw status text carried by a status push, if any
    pub fn status_message(&self) -> Option<&str> {
        self.string_extra(well_known::STATUS_MESSAGE_EXTRA)
    }
}

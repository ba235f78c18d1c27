//! Companion Link
//!
//! Keeps exactly one connection to the companion app that drives the pump,
//! caches the last reported device status and notifies observers when it
//! changes.

pub mod broadcast;
pub mod config;
pub mod connection;
pub mod connector;
pub mod demo;
pub mod presence;

pub use broadcast::{StatusBroadcasts, StatusListener};
pub use config::LinkConfig;
pub use connection::{ConnectionManager, ManagerEvent, ManagerSlot, Probe, UnavailableReason};
pub use connector::{ConnectorEvent, ConnectorFactory, ServiceConnector, SimulatedCompanion};
pub use presence::{CompanionRegistry, InstalledPackages, StaticRegistry};

pub use companion_shared::{DeviceStatus, LinkState};

//! Connector trait abstraction for the companion service channel

use anyhow::Result;
use async_trait::async_trait;
use companion_shared::DeviceStatus;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Where a status update came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSource {
    /// Pushed directly by the connector
    Connector,
    /// Received on the status broadcast channel
    Broadcast,
    /// Pulled by the manager after the service bound
    Pull,
}

impl fmt::Display for StatusSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusSource::Connector => write!(f, "connector"),
            StatusSource::Broadcast => write!(f, "broadcast"),
            StatusSource::Pull => write!(f, "pull"),
        }
    }
}

/// Lifecycle and status events emitted towards the connection manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorEvent {
    /// The companion service is bound
    ServiceConnected,
    /// The companion service went away
    ServiceDisconnected { reason: String },
    /// A status push arrived
    StatusChanged {
        status: DeviceStatus,
        source: StatusSource,
    },
}

/// Sending half of the manager's single ordered event stream
pub type ConnectorEventSender = mpsc::UnboundedSender<ConnectorEvent>;

/// Handle to a bound (or binding) session with the companion service
#[async_trait]
pub trait ServiceConnector: Send + Sync {
    /// Start binding to the companion service. Returns immediately; the
    /// outcome arrives later as `ServiceConnected`/`ServiceDisconnected`.
    fn connect_to_service(&self);

    /// Start the logical device session over a bound service
    async fn connect(&self) -> Result<()>;

    /// Live status probe; may fail
    async fn get_status(&self) -> Result<DeviceStatus>;

    /// Whether the service channel is currently bound
    fn is_connected_to_service(&self) -> bool;

    /// Human-readable name for this connector
    fn name(&self) -> &'static str;
}

/// Factory for creating connectors
///
/// The event sender handed to `create` is the connector's only way to report
/// lifecycle changes and status pushes.
pub trait ConnectorFactory: Send + Sync {
    fn create(&self, events: ConnectorEventSender) -> Result<Arc<dyn ServiceConnector>>;
}

pub mod simulated;
pub mod traits;

pub use simulated::{SimulatedCompanion, SimulatedConnector};
pub use traits::{
    ConnectorEvent, ConnectorEventSender, ConnectorFactory, ServiceConnector, StatusSource,
};

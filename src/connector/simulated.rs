//! Simulated companion app for development and tests
//!
//! Stands in for the real companion service. Binding completes on a spawned
//! task (or manually), and status pushes can be sent either through the
//! connector's event stream or over the broadcast bus.

use crate::broadcast::StatusBroadcasts;
use crate::connector::traits::{
    ConnectorEvent, ConnectorEventSender, ConnectorFactory, ServiceConnector, StatusSource,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use companion_shared::{DeviceStatus, Intent};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Behaviour of the simulated companion
#[derive(Debug, Clone)]
pub struct SimulatedConfig {
    /// Bind automatically after `bind_delay` when asked to connect
    pub auto_bind: bool,
    /// Delay before an automatic bind completes
    pub bind_delay: Duration,
    /// Device status before any session is started
    pub initial_status: DeviceStatus,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            auto_bind: true,
            bind_delay: Duration::from_millis(50),
            initial_status: DeviceStatus::Disconnected,
        }
    }
}

struct CompanionState {
    config: SimulatedConfig,
    bound: AtomicBool,
    status: Mutex<DeviceStatus>,
    fail_probes: AtomicBool,
    stall_probes: AtomicBool,
    stall_sessions: AtomicBool,
    events: Mutex<Option<ConnectorEventSender>>,
    broadcasts: Mutex<Option<(StatusBroadcasts, String)>>,
    connectors_created: AtomicUsize,
    bind_requests: AtomicUsize,
    session_requests: AtomicUsize,
}

impl CompanionState {
    fn emit(&self, event: ConnectorEvent) {
        if let Some(tx) = self.events.lock().as_ref() {
            let _ = tx.send(event);
        }
    }

    fn complete_binding(&self) {
        self.bound.store(true, Ordering::SeqCst);
        self.emit(ConnectorEvent::ServiceConnected);
    }
}

/// In-process companion app; also acts as the connector factory
#[derive(Clone)]
pub struct SimulatedCompanion {
    state: Arc<CompanionState>,
}

impl SimulatedCompanion {
    pub fn new(config: SimulatedConfig) -> Self {
        let initial_status = config.initial_status;
        Self {
            state: Arc::new(CompanionState {
                config,
                bound: AtomicBool::new(false),
                status: Mutex::new(initial_status),
                fail_probes: AtomicBool::new(false),
                stall_probes: AtomicBool::new(false),
                stall_sessions: AtomicBool::new(false),
                events: Mutex::new(None),
                broadcasts: Mutex::new(None),
                connectors_created: AtomicUsize::new(0),
                bind_requests: AtomicUsize::new(0),
                session_requests: AtomicUsize::new(0),
            }),
        }
    }

    /// Companion that only binds when `complete_binding` is called
    pub fn manual() -> Self {
        Self::new(SimulatedConfig {
            auto_bind: false,
            ..Default::default()
        })
    }

    /// Publish status broadcasts on the given bus and action
    pub fn attach_broadcasts(&self, bus: StatusBroadcasts, action: impl Into<String>) {
        *self.state.broadcasts.lock() = Some((bus, action.into()));
    }

    /// Bind the service and deliver `ServiceConnected`
    pub fn complete_binding(&self) {
        self.state.complete_binding();
    }

    /// Bind the service without delivering the lifecycle event yet
    pub fn mark_bound(&self) {
        self.state.bound.store(true, Ordering::SeqCst);
    }

    /// Unbind the service and deliver `ServiceDisconnected`
    pub fn drop_service(&self, reason: impl Into<String>) {
        self.state.bound.store(false, Ordering::SeqCst);
        self.state.emit(ConnectorEvent::ServiceDisconnected {
            reason: reason.into(),
        });
    }

    /// Change the device status without notifying anyone
    pub fn set_device_status(&self, status: DeviceStatus) {
        *self.state.status.lock() = status;
    }

    /// Change the device status and push it through the connector
    pub fn push_status(&self, status: DeviceStatus) {
        self.set_device_status(status);
        self.state.emit(ConnectorEvent::StatusChanged {
            status,
            source: StatusSource::Connector,
        });
    }

    /// Change the device status and announce it on the broadcast bus
    ///
    /// Returns the number of listeners that received the intent.
    pub fn broadcast_status(&self, status: DeviceStatus) -> Result<usize> {
        self.set_device_status(status);
        let guard = self.state.broadcasts.lock();
        let (bus, action) = guard
            .as_ref()
            .ok_or_else(|| anyhow!("No broadcast bus attached"))?;
        bus.send(&Intent::status(action.clone(), status))
    }

    /// Make live probes fail
    pub fn fail_probes(&self, fail: bool) {
        self.state.fail_probes.store(fail, Ordering::SeqCst);
    }

    /// Make live probes hang
    pub fn stall_probes(&self, stall: bool) {
        self.state.stall_probes.store(stall, Ordering::SeqCst);
    }

    /// Make session start requests hang
    pub fn stall_sessions(&self, stall: bool) {
        self.state.stall_sessions.store(stall, Ordering::SeqCst);
    }

    pub fn is_bound(&self) -> bool {
        self.state.bound.load(Ordering::SeqCst)
    }

    pub fn connectors_created(&self) -> usize {
        self.state.connectors_created.load(Ordering::SeqCst)
    }

    pub fn bind_requests(&self) -> usize {
        self.state.bind_requests.load(Ordering::SeqCst)
    }

    pub fn session_requests(&self) -> usize {
        self.state.session_requests.load(Ordering::SeqCst)
    }
}

impl Default for SimulatedCompanion {
    fn default() -> Self {
        Self::new(SimulatedConfig::default())
    }
}

impl ConnectorFactory for SimulatedCompanion {
    fn create(&self, events: ConnectorEventSender) -> Result<Arc<dyn ServiceConnector>> {
        self.state.connectors_created.fetch_add(1, Ordering::SeqCst);
        *self.state.events.lock() = Some(events);
        Ok(Arc::new(SimulatedConnector {
            state: self.state.clone(),
        }))
    }
}

/// Connector handed out by `SimulatedCompanion`
pub struct SimulatedConnector {
    state: Arc<CompanionState>,
}

#[async_trait]
impl ServiceConnector for SimulatedConnector {
    fn connect_to_service(&self) {
        self.state.bind_requests.fetch_add(1, Ordering::SeqCst);
        if !self.state.config.auto_bind {
            return;
        }

        let state = self.state.clone();
        tokio::spawn(async move {
            tokio::time::sleep(state.config.bind_delay).await;
            debug!("[SIM] Service bound");
            state.complete_binding();
        });
    }

    async fn connect(&self) -> Result<()> {
        self.state.session_requests.fetch_add(1, Ordering::SeqCst);
        if self.state.stall_sessions.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if !self.state.bound.load(Ordering::SeqCst) {
            return Err(anyhow!("Service not bound"));
        }

        let mut status = self.state.status.lock();
        if *status == DeviceStatus::Disconnected {
            *status = DeviceStatus::Connected;
        }
        Ok(())
    }

    async fn get_status(&self) -> Result<DeviceStatus> {
        if self.state.stall_probes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.state.fail_probes.load(Ordering::SeqCst) {
            return Err(anyhow!("Remote exception while reading status"));
        }
        Ok(*self.state.status.lock())
    }

    fn is_connected_to_service(&self) -> bool {
        self.state.bound.load(Ordering::SeqCst)
    }

    fn name(&self) -> &'static str {
        "Simulated"
    }
}

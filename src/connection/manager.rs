//! Connection manager for the companion app service
//!
//! Owns the single connector, consumes its lifecycle/status event stream on a
//! dedicated task, and caches the last known device status for callers.

use crate::broadcast::{StatusBroadcasts, StatusListener};
use crate::config::LinkConfig;
use crate::connection::probe::{Probe, UnavailableReason};
use crate::connector::{ConnectorEvent, ConnectorFactory, ServiceConnector, StatusSource};
use crate::presence::CompanionRegistry;
use companion_shared::{now_ms, DeviceStatus, LinkState};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

pub const MSG_NOT_INSTALLED: &str = "Companion app does not appear to be installed!";
pub const MSG_NOT_CONNECTED: &str = "Not connected to companion app!";
pub const MSG_UNKNOWN: &str = "Unknown";

/// Events emitted to UI observers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerEvent {
    /// The cached status was written; re-query the manager for details
    StatusUpdated,
}

#[derive(Debug, Clone, Copy, Default)]
struct CachedStatus {
    status: Option<DeviceStatus>,
    updated_ms: Option<u64>,
}

/// Cached status plus the UI bus it notifies
struct StatusCache {
    cached: RwLock<CachedStatus>,
    ui_tx: broadcast::Sender<ManagerEvent>,
}

impl StatusCache {
    fn new(capacity: usize) -> Self {
        let (ui_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            cached: RwLock::new(CachedStatus::default()),
            ui_tx,
        }
    }

    /// The only place the cached status is written
    fn record(&self, status: DeviceStatus, source: StatusSource) {
        self.record_at(status, source, now_ms());
    }

    fn record_at(&self, status: DeviceStatus, source: StatusSource, at_ms: u64) {
        let mut cached = self.cached.write();
        info!("Status change via {}: {}", source, status);
        cached.status = Some(status);
        cached.updated_ms = Some(at_ms);
        // Observers may not exist yet
        let _ = self.ui_tx.send(ManagerEvent::StatusUpdated);
    }

    fn snapshot(&self) -> CachedStatus {
        *self.cached.read()
    }
}

/// State guarded by the init lock
#[derive(Default)]
struct Link {
    companion_present: Option<bool>,
    connector: Option<Arc<dyn ServiceConnector>>,
    event_task: Option<JoinHandle<()>>,
}

/// Manages the single connection to the companion app service
pub struct ConnectionManager {
    config: LinkConfig,
    registry: Arc<dyn CompanionRegistry>,
    factory: Arc<dyn ConnectorFactory>,
    broadcasts: StatusBroadcasts,
    link: Mutex<Link>,
    cache: Arc<StatusCache>,
    listener: StatusListener,
}

impl ConnectionManager {
    /// Create a manager; nothing is checked or connected until `init`
    pub fn new(
        config: LinkConfig,
        registry: Arc<dyn CompanionRegistry>,
        factory: Arc<dyn ConnectorFactory>,
        broadcasts: StatusBroadcasts,
    ) -> Self {
        let cache = Arc::new(StatusCache::new(config.event_capacity));
        Self {
            config,
            registry,
            factory,
            broadcasts,
            link: Mutex::new(Link::default()),
            cache,
            listener: StatusListener::new(),
        }
    }

    /// Check for the companion app and start binding to its service
    ///
    /// Idempotent: once a connector exists, or the companion was found
    /// missing, further calls do nothing. Outside a Tokio runtime it logs and
    /// returns without creating anything.
    pub fn init(&self) {
        let mut link = self.link.lock();
        if link.connector.is_some() {
            return;
        }

        let present = *link.companion_present.get_or_insert_with(|| {
            self.registry.is_installed(&self.config.companion_package)
        });
        if !present {
            debug!("Not trying init due to missing companion app");
            return;
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!("Cannot initialize connector outside a Tokio runtime: {}", e);
                return;
            }
        };

        info!("Initializing connector for {}", self.config.companion_package);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let connector = match self.factory.create(event_tx.clone()) {
            Ok(connector) => connector,
            Err(e) => {
                warn!("Failed to create connector: {}", e);
                return;
            }
        };

        self.listener.register(
            &runtime,
            &self.broadcasts,
            self.config.status_action.clone(),
            event_tx,
        );
        link.event_task = Some(runtime.spawn(run_event_loop(
            event_rx,
            connector.clone(),
            self.cache.clone(),
            self.config.probe_timeout,
        )));

        connector.connect_to_service();
        info!("Trying to connect via {} connector", connector.name());
        link.connector = Some(connector);
    }

    /// The connector, after making sure `init` has run
    pub fn get_service_connector(&self) -> Option<Arc<dyn ServiceConnector>> {
        self.init();
        self.link.lock().connector.clone()
    }

    /// Live status in textual form, after making sure `init` has run
    pub async fn get_current(&self) -> String {
        self.init();
        self.safe_get_status().await.to_string()
    }

    /// Live status of the connector
    pub async fn probe(&self) -> Probe {
        let connector = {
            let link = self.link.lock();
            if link.companion_present == Some(false) {
                return Probe::Unavailable(UnavailableReason::NotInstalled);
            }
            link.connector.clone()
        };

        match connector {
            Some(connector) => probe_connector(connector.as_ref(), self.config.probe_timeout).await,
            None => Probe::Unavailable(UnavailableReason::NotBound),
        }
    }

    /// Live status, or `Disconnected` when it cannot be read
    pub async fn safe_get_status(&self) -> DeviceStatus {
        self.probe().await.status()
    }

    /// Start the device session on the connector
    pub async fn connect_to_pump(&self) {
        let Some(connector) = self.get_service_connector() else {
            warn!("Cannot connect to pump: no connector available");
            return;
        };
        start_session(connector.as_ref(), self.config.probe_timeout).await;
    }

    /// Last status seen on the event stream, if any
    pub fn get_last_status(&self) -> Option<DeviceStatus> {
        self.cache.snapshot().status
    }

    /// When the cached status was last written (ms since Unix epoch)
    pub fn last_status_time(&self) -> Option<u64> {
        self.cache.snapshot().updated_ms
    }

    /// Whether the service channel is bound
    pub fn is_connected(&self) -> bool {
        self.link
            .lock()
            .connector
            .as_ref()
            .is_some_and(|connector| connector.is_connected_to_service())
    }

    /// Whether the service is bound and the device reported connected
    pub fn is_pump_connected(&self) -> bool {
        self.is_connected() && self.get_last_status() == Some(DeviceStatus::Connected)
    }

    /// Human-readable summary of the link for display
    pub fn get_last_status_message(&self) -> String {
        let present = self.link.lock().companion_present.unwrap_or(false);
        if !present {
            return MSG_NOT_INSTALLED.into();
        }

        if !self.is_connected() {
            return MSG_NOT_CONNECTED.into();
        }

        match self.get_last_status() {
            Some(status) => status.to_string(),
            None => MSG_UNKNOWN.into(),
        }
    }

    /// Whether the cached status is recent enough to trust
    ///
    /// Without a configured `status_max_age` every status counts as recent.
    pub fn last_status_recent(&self) -> bool {
        let Some(max_age) = self.config.status_max_age else {
            return true;
        };
        self.last_status_time().is_some_and(|updated_ms| {
            now_ms().saturating_sub(updated_ms) <= max_age.as_millis() as u64
        })
    }

    /// Observable lifecycle state
    pub fn link_state(&self) -> LinkState {
        let (present, has_connector) = {
            let link = self.link.lock();
            (link.companion_present, link.connector.is_some())
        };
        LinkState::from_observed(
            present,
            has_connector,
            self.is_connected(),
            self.get_last_status(),
        )
    }

    /// Subscribe to status update notifications
    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.cache.ui_tx.subscribe()
    }

}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(task) = self.link.get_mut().event_task.take() {
            task.abort();
        }
    }
}

async fn probe_connector(connector: &dyn ServiceConnector, probe_timeout: Duration) -> Probe {
    if !connector.is_connected_to_service() {
        return Probe::Unavailable(UnavailableReason::NotBound);
    }

    match timeout(probe_timeout, connector.get_status()).await {
        Ok(Ok(status)) => Probe::Live(status),
        Ok(Err(e)) => {
            warn!("Status probe failed: {}", e);
            Probe::Unavailable(UnavailableReason::Failed(e.to_string()))
        }
        Err(_) => {
            warn!("Status probe timed out after {:?}", probe_timeout);
            Probe::Unavailable(UnavailableReason::TimedOut)
        }
    }
}

/// Ask the connector to start the device session, giving up after `limit`
async fn start_session(connector: &dyn ServiceConnector, limit: Duration) {
    match timeout(limit, connector.connect()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Session start failed: {}", e),
        Err(_) => warn!("Session start timed out after {:?}", limit),
    }
}

/// Consume connector and broadcast events in arrival order
async fn run_event_loop(
    mut event_rx: mpsc::UnboundedReceiver<ConnectorEvent>,
    connector: Arc<dyn ServiceConnector>,
    cache: Arc<StatusCache>,
    probe_timeout: Duration,
) {
    while let Some(event) = event_rx.recv().await {
        match event {
            ConnectorEvent::ServiceConnected => {
                info!("On service connected");
                start_session(connector.as_ref(), probe_timeout).await;
                let status = probe_connector(connector.as_ref(), probe_timeout)
                    .await
                    .status();
                cache.record(status, StatusSource::Pull);
            }
            ConnectorEvent::ServiceDisconnected { reason } => {
                // Cached status is kept as the last known value
                warn!("Disconnected from service: {}", reason);
            }
            ConnectorEvent::StatusChanged { status, source } => {
                cache.record(status, source);
            }
        }
    }
    debug!("Connector event stream closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{ConnectorEventSender, SimulatedCompanion};
    use crate::presence::StaticRegistry;
    use anyhow::anyhow;

    const WAIT: Duration = Duration::from_secs(2);

    fn manager_with(
        registry: StaticRegistry,
        companion: &SimulatedCompanion,
        config: LinkConfig,
    ) -> ConnectionManager {
        let bus = StatusBroadcasts::new(16);
        companion.attach_broadcasts(bus.clone(), config.status_action.clone());
        ConnectionManager::new(config, Arc::new(registry), Arc::new(companion.clone()), bus)
    }

    fn installed(companion: &SimulatedCompanion) -> ConnectionManager {
        manager_with(StaticRegistry::installed(), companion, LinkConfig::default())
    }

    async fn next_update(rx: &mut broadcast::Receiver<ManagerEvent>) {
        let event = timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for status update")
            .expect("ui bus closed");
        assert_eq!(event, ManagerEvent::StatusUpdated);
    }

    #[tokio::test]
    async fn test_absent_companion_short_circuits() {
        let companion = SimulatedCompanion::manual();
        let manager = manager_with(StaticRegistry::missing(), &companion, LinkConfig::default());

        for _ in 0..3 {
            manager.init();
        }

        assert_eq!(companion.connectors_created(), 0);
        assert!(manager.get_service_connector().is_none());
        assert_eq!(manager.get_last_status_message(), MSG_NOT_INSTALLED);
        assert_eq!(
            manager.probe().await,
            Probe::Unavailable(UnavailableReason::NotInstalled)
        );
        assert_eq!(manager.safe_get_status().await, DeviceStatus::Disconnected);
        assert_eq!(manager.get_current().await, "DISCONNECTED");
        assert_eq!(manager.link_state(), LinkState::NoCompanion);
        assert_eq!(manager.get_last_status_message(), MSG_NOT_INSTALLED);
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let companion = SimulatedCompanion::manual();
        let manager = installed(&companion);

        for _ in 0..5 {
            manager.init();
        }
        let _ = manager.get_service_connector();

        assert_eq!(companion.connectors_created(), 1);
        assert_eq!(companion.bind_requests(), 1);
        assert_eq!(manager.link_state(), LinkState::Binding);
    }

    #[tokio::test]
    async fn test_service_connected_starts_session_and_primes_cache() {
        let companion = SimulatedCompanion::manual();
        let manager = installed(&companion);
        let mut updates = manager.subscribe();

        manager.init();
        assert!(manager.get_last_status().is_none());

        companion.complete_binding();
        next_update(&mut updates).await;

        assert_eq!(companion.session_requests(), 1);
        assert_eq!(manager.get_last_status(), Some(DeviceStatus::Connected));
        assert!(manager.last_status_time().is_some());
        assert!(manager.is_pump_connected());
        assert_eq!(manager.get_last_status_message(), "CONNECTED");
        assert!(manager.link_state().is_ready());
    }

    #[tokio::test]
    async fn test_pushes_overwrite_without_dedup() {
        let companion = SimulatedCompanion::manual();
        let manager = installed(&companion);
        manager.init();
        companion.mark_bound();
        let mut updates = manager.subscribe();

        companion.push_status(DeviceStatus::Busy);
        next_update(&mut updates).await;
        companion
            .broadcast_status(DeviceStatus::Busy)
            .expect("broadcast");
        next_update(&mut updates).await;
        companion.push_status(DeviceStatus::Connecting);
        next_update(&mut updates).await;

        assert_eq!(manager.get_last_status(), Some(DeviceStatus::Connecting));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(
            updates.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_connection_loss_keeps_cache_but_reads_disconnected() {
        let companion = SimulatedCompanion::manual();
        let manager = installed(&companion);
        manager.init();
        companion.mark_bound();
        let mut updates = manager.subscribe();

        companion.push_status(DeviceStatus::Connected);
        next_update(&mut updates).await;
        assert!(manager.is_pump_connected());

        companion.drop_service("companion app stopped");

        assert_eq!(manager.safe_get_status().await, DeviceStatus::Disconnected);
        assert_eq!(
            manager.probe().await,
            Probe::Unavailable(UnavailableReason::NotBound)
        );
        assert_eq!(manager.get_last_status(), Some(DeviceStatus::Connected));
        assert!(!manager.is_pump_connected());
        assert_eq!(manager.get_last_status_message(), MSG_NOT_CONNECTED);
        // No automatic rebind
        assert_eq!(companion.bind_requests(), 1);
    }

    #[tokio::test]
    async fn test_bound_but_not_ready() {
        let companion = SimulatedCompanion::manual();
        let manager = installed(&companion);
        manager.init();
        companion.mark_bound();
        let mut updates = manager.subscribe();

        assert!(manager.is_connected());
        assert!(!manager.is_pump_connected());
        assert_eq!(manager.get_last_status_message(), MSG_UNKNOWN);
        assert_eq!(manager.link_state(), LinkState::Bound(None));

        companion.push_status(DeviceStatus::Busy);
        next_update(&mut updates).await;
        assert!(manager.is_connected());
        assert!(!manager.is_pump_connected());
        assert_eq!(manager.get_last_status_message(), "BUSY");

        companion.push_status(DeviceStatus::Connected);
        next_update(&mut updates).await;
        assert!(manager.is_pump_connected());
    }

    #[tokio::test]
    async fn test_message_precedence_end_to_end() {
        let companion = SimulatedCompanion::manual();
        let manager = installed(&companion);
        let mut updates = manager.subscribe();

        manager.init();
        assert_eq!(manager.get_last_status_message(), MSG_NOT_CONNECTED);

        companion.mark_bound();
        assert_eq!(manager.get_last_status_message(), MSG_UNKNOWN);

        companion.push_status(DeviceStatus::Connected);
        next_update(&mut updates).await;
        assert_eq!(
            manager.get_last_status_message(),
            DeviceStatus::Connected.to_string()
        );
    }

    #[tokio::test]
    async fn test_live_status_failures_read_as_disconnected() {
        let companion = SimulatedCompanion::manual();
        let config = LinkConfig {
            probe_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let manager = manager_with(StaticRegistry::installed(), &companion, config);
        manager.init();
        companion.mark_bound();
        companion.set_device_status(DeviceStatus::Busy);

        assert_eq!(manager.probe().await, Probe::Live(DeviceStatus::Busy));

        companion.fail_probes(true);
        assert!(matches!(
            manager.probe().await,
            Probe::Unavailable(UnavailableReason::Failed(_))
        ));
        assert_eq!(manager.safe_get_status().await, DeviceStatus::Disconnected);

        companion.fail_probes(false);
        companion.stall_probes(true);
        assert_eq!(
            manager.probe().await,
            Probe::Unavailable(UnavailableReason::TimedOut)
        );
    }

    #[tokio::test]
    async fn test_get_current_reads_live_not_cache() {
        let companion = SimulatedCompanion::manual();
        let manager = installed(&companion);
        manager.init();
        companion.mark_bound();
        companion.set_device_status(DeviceStatus::Busy);

        assert_eq!(manager.get_current().await, "BUSY");
        assert!(manager.get_last_status().is_none());
    }

    #[tokio::test]
    async fn test_connect_to_pump_requests_session() {
        let companion = SimulatedCompanion::manual();
        let manager = installed(&companion);

        // Not bound yet: the request fails quietly
        manager.connect_to_pump().await;
        assert_eq!(companion.session_requests(), 1);

        companion.mark_bound();
        manager.connect_to_pump().await;
        assert_eq!(companion.session_requests(), 2);
        assert_eq!(manager.safe_get_status().await, DeviceStatus::Connected);
        assert_eq!(companion.connectors_created(), 1);
    }

    #[tokio::test]
    async fn test_last_status_recent_without_window() {
        let companion = SimulatedCompanion::manual();
        let manager = installed(&companion);
        assert!(manager.last_status_recent());
    }

    #[tokio::test]
    async fn test_last_status_recent_with_window() {
        let companion = SimulatedCompanion::manual();
        let config = LinkConfig {
            status_max_age: Some(Duration::from_secs(60)),
            ..Default::default()
        };
        let manager = manager_with(StaticRegistry::installed(), &companion, config);
        assert!(!manager.last_status_recent());

        manager.cache.record(DeviceStatus::Busy, StatusSource::Connector);
        assert!(manager.last_status_recent());

        let old = now_ms() - 61_000;
        manager
            .cache
            .record_at(DeviceStatus::Busy, StatusSource::Connector, old);
        assert!(!manager.last_status_recent());
    }

    #[test]
    fn test_init_outside_runtime_creates_nothing() {
        let companion = SimulatedCompanion::manual();
        let manager = installed(&companion);

        std::thread::scope(|scope| {
            scope.spawn(|| manager.init()).join().expect("init panicked");
        });
        assert_eq!(companion.connectors_created(), 0);
        assert!(!manager.is_connected());

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        runtime.block_on(async { manager.init() });
        assert_eq!(companion.connectors_created(), 1);
        assert_eq!(companion.bind_requests(), 1);
    }

    #[tokio::test]
    async fn test_hung_session_start_does_not_block_pushes() {
        let companion = SimulatedCompanion::manual();
        let config = LinkConfig {
            probe_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let manager = manager_with(StaticRegistry::installed(), &companion, config);
        let mut updates = manager.subscribe();
        manager.init();
        companion.stall_sessions(true);

        companion.complete_binding();
        companion.push_status(DeviceStatus::Busy);

        // Pull after the session timeout, then the push behind it
        next_update(&mut updates).await;
        next_update(&mut updates).await;
        assert_eq!(manager.get_last_status(), Some(DeviceStatus::Busy));
        assert_eq!(companion.session_requests(), 1);
    }

    #[tokio::test]
    async fn test_connect_to_pump_gives_up_on_hung_session() {
        let companion = SimulatedCompanion::manual();
        let config = LinkConfig {
            probe_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let manager = manager_with(StaticRegistry::installed(), &companion, config);
        manager.init();
        companion.mark_bound();
        companion.stall_sessions(true);

        timeout(WAIT, manager.connect_to_pump())
            .await
            .expect("connect_to_pump should not hang");
        assert_eq!(companion.session_requests(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_listener_registered_by_init() {
        let companion = SimulatedCompanion::manual();
        let bus = StatusBroadcasts::new(16);
        companion.attach_broadcasts(bus.clone(), LinkConfig::default().status_action);
        let manager = ConnectionManager::new(
            LinkConfig::default(),
            Arc::new(StaticRegistry::installed()),
            Arc::new(companion.clone()),
            bus.clone(),
        );

        // Broadcasts before init have nobody to deliver to
        assert_eq!(bus.receiver_count(), 0);
        assert_eq!(companion.broadcast_status(DeviceStatus::Busy).expect("broadcast"), 0);

        manager.init();
        assert_eq!(bus.receiver_count(), 1);
        manager.init();
        assert_eq!(bus.receiver_count(), 1);
        assert!(manager.get_last_status().is_none());
    }

    struct FailingFactory;

    impl ConnectorFactory for FailingFactory {
        fn create(&self, _events: ConnectorEventSender) -> anyhow::Result<Arc<dyn ServiceConnector>> {
            Err(anyhow!("service connector unavailable"))
        }
    }

    #[tokio::test]
    async fn test_factory_failure_leaves_manager_degraded() {
        let manager = ConnectionManager::new(
            LinkConfig::default(),
            Arc::new(StaticRegistry::installed()),
            Arc::new(FailingFactory),
            StatusBroadcasts::default(),
        );

        manager.init();
        assert!(manager.get_service_connector().is_none());
        assert!(!manager.is_connected());
        assert_eq!(manager.get_last_status_message(), MSG_NOT_CONNECTED);
        assert_eq!(manager.link_state(), LinkState::Uninitialized);
        assert_eq!(manager.safe_get_status().await, DeviceStatus::Disconnected);
    }
}

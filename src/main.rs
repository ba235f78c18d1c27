use companion_link::connector::simulated::SimulatedConfig;
use companion_link::{
    demo, CompanionRegistry, InstalledPackages, LinkConfig, ManagerSlot, SimulatedCompanion,
    StaticRegistry, StatusBroadcasts,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = LinkConfig {
        status_max_age: Some(Duration::from_secs(30)),
        ..Default::default()
    };

    let registry: Arc<dyn CompanionRegistry> = match std::env::var("COMPANION_REGISTRY_DIR") {
        Ok(dir) => {
            info!("Using package registry at {}", dir);
            Arc::new(InstalledPackages::new(dir))
        }
        Err(_) => Arc::new(StaticRegistry::installed()),
    };

    let bus = StatusBroadcasts::new(16);
    let companion = SimulatedCompanion::new(SimulatedConfig {
        bind_delay: Duration::from_millis(200),
        ..Default::default()
    });
    companion.attach_broadcasts(bus.clone(), config.status_action.clone());

    info!("Companion link starting");
    info!("  Companion package: {}", config.companion_package);
    info!("  Status action: {}", config.status_action);

    let slot = ManagerSlot::new(config, registry, Arc::new(companion.clone()), bus);

    tokio::select! {
        report = demo::run(&slot, companion, Duration::from_millis(500)) => {
            info!("Done after {} status updates", report.status_updates);
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }
}

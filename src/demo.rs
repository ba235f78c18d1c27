//! Scripted run against the simulated companion
//!
//! Drives a `SimulatedCompanion` through a short sequence of status pushes
//! while two observers follow the manager's UI bus, then reports the final
//! state once the companion drops the service.

use crate::connection::{ManagerEvent, ManagerSlot};
use crate::connector::SimulatedCompanion;
use companion_shared::DeviceStatus;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

/// Statuses the companion announces, alternating connector push and broadcast
const SCRIPT: [DeviceStatus; 4] = [
    DeviceStatus::Busy,
    DeviceStatus::Connected,
    DeviceStatus::Connecting,
    DeviceStatus::Connected,
];

/// Final observations after the script has run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoReport {
    pub status_updates: usize,
    pub final_message: String,
    pub live_status: String,
}

/// Run the script, pausing `step` between companion actions
pub async fn run(slot: &ManagerSlot, companion: SimulatedCompanion, step: Duration) -> DemoReport {
    let manager = slot.get();
    let mut updates = manager.subscribe();
    manager.init();

    let mut script = tokio::spawn(async move {
        for (i, status) in SCRIPT.into_iter().enumerate() {
            tokio::time::sleep(step).await;
            if i % 2 == 0 {
                companion.push_status(status);
            } else if let Err(e) = companion.broadcast_status(status) {
                error!("Failed to broadcast status: {}", e);
            }
        }
        tokio::time::sleep(step).await;
        companion.drop_service("simulated companion stopped");
    });

    // Second observer that only reports readiness
    let ready_manager = slot.get();
    let mut ready_updates = ready_manager.subscribe();
    let ready_watch = tokio::spawn(async move {
        loop {
            match ready_updates.recv().await {
                Ok(ManagerEvent::StatusUpdated) => {
                    info!("[READY] pump ready: {}", ready_manager.is_pump_connected());
                }
                Err(RecvError::Lagged(missed)) => warn!("[READY] missed {} updates", missed),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut status_updates = 0;
    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(ManagerEvent::StatusUpdated) => {
                    status_updates += 1;
                    info!(
                        "Status: {} (state {}, recent {})",
                        manager.get_last_status_message(),
                        manager.link_state(),
                        manager.last_status_recent()
                    );
                }
                Err(RecvError::Lagged(missed)) => warn!("Missed {} status updates", missed),
                Err(RecvError::Closed) => {
                    error!("Status bus closed");
                    break;
                }
            },
            result = &mut script => {
                if let Err(e) = result {
                    error!("Companion script failed: {}", e);
                }
                break;
            }
        }
    }

    ready_watch.abort();
    if let Err(e) = ready_watch.await {
        if !e.is_cancelled() {
            error!("Readiness observer failed: {}", e);
        }
    }

    let report = DemoReport {
        status_updates,
        final_message: manager.get_last_status_message(),
        live_status: manager.get_current().await,
    };
    info!("Final status: {}", report.final_message);
    info!("Live probe: {}", report.live_status);
    report
}

//! Status broadcast channel
//!
//! The companion app announces status changes as framed `Intent`s on a
//! broadcast bus. The manager registers one `StatusListener` that filters on
//! the status action and forwards parsed statuses onto its event stream.

use crate::connector::{ConnectorEvent, ConnectorEventSender, StatusSource};
use anyhow::Result;
use bytes::Bytes;
use companion_shared::{codec, DeviceStatus};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Broadcast bus carrying encoded intents
#[derive(Clone)]
pub struct StatusBroadcasts {
    tx: broadcast::Sender<Bytes>,
}

impl StatusBroadcasts {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Encode and publish an intent, returning the number of receivers
    pub fn send(&self, intent: &companion_shared::Intent) -> Result<usize> {
        let frame = codec::encode(intent)?;
        Ok(self.send_raw(frame))
    }

    /// Publish an already-framed intent
    pub fn send_raw(&self, frame: Bytes) -> usize {
        // No receivers is not an error for a broadcast
        self.tx.send(frame).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Bytes> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for StatusBroadcasts {
    fn default() -> Self {
        Self::new(16)
    }
}

/// Translate a received frame into a status, if it is a well-formed status push
pub fn status_from_frame(frame: &[u8], action: &str) -> Option<DeviceStatus> {
    let intent = match codec::decode_frame(frame) {
        Ok(intent) => intent,
        Err(e) => {
            warn!("Dropping malformed broadcast: {}", e);
            return None;
        }
    };

    if intent.action != action {
        return None;
    }

    let Some(text) = intent.status_message() else {
        warn!("Status broadcast without status message");
        return None;
    };

    match text.parse::<DeviceStatus>() {
        Ok(status) => Some(status),
        Err(e) => {
            warn!("{}", e);
            None
        }
    }
}

/// Listener registration on the status broadcast channel
///
/// Registering again replaces the previous registration, so at most one
/// listener task delivers statuses at any time.
#[derive(Default)]
pub struct StatusListener {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StatusListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start listening for `action` on `bus`, forwarding statuses to `events`
    pub fn register(
        &self,
        runtime: &Handle,
        bus: &StatusBroadcasts,
        action: String,
        events: ConnectorEventSender,
    ) {
        let rx = bus.subscribe();
        let mut task = self.task.lock();
        if let Some(previous) = task.take() {
            debug!("Replacing previous status listener");
            previous.abort();
        }
        *task = Some(runtime.spawn(listen(rx, action, events)));
    }

    /// Stop listening; returns whether a listener was registered
    pub fn unregister(&self) -> bool {
        match self.task.lock().take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for StatusListener {
    fn drop(&mut self) {
        self.unregister();
    }
}

async fn listen(
    mut rx: broadcast::Receiver<Bytes>,
    action: String,
    events: ConnectorEventSender,
) {
    loop {
        match rx.recv().await {
            Ok(frame) => {
                debug!("Receiving broadcast ({} bytes)", frame.len());
                let Some(status) = status_from_frame(&frame, &action) else {
                    continue;
                };
                let event = ConnectorEvent::StatusChanged {
                    status,
                    source: StatusSource::Broadcast,
                };
                if events.send(event).is_err() {
                    debug!("Event stream closed, status listener exiting");
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("Status listener lagged, {} broadcasts missed", missed);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

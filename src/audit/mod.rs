pub mod events;

use crate::host::HostStatusObserver;
use crate::protocol::TransportRoute;
use events::HostEvent;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

const AUDIT_CHANNEL_CAPACITY: usize = 10_000;
const RECENT_EVENTS_CAPACITY: usize = 100;

/// Asynchronous audit logger for host lifecycle events.
///
/// Registered as a [`HostStatusObserver`]; callbacks never block. Events
/// are handed to a background writer task that appends one JSON object per
/// line to the audit file.
pub struct AuditLogger {
    sender: mpsc::Sender<HostEvent>,
    dropped_count: AtomicU64,
    recent_events: Mutex<VecDeque<HostEvent>>,
    writer: Option<JoinHandle<()>>,
}

impl AuditLogger {
    /// Spawn the writer task. Must be called from within a tokio runtime.
    pub fn new(log_path: Option<PathBuf>) -> Self {
        Self::with_capacity(log_path, AUDIT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(log_path: Option<PathBuf>, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let writer = tokio::spawn(audit_writer_task(receiver, log_path));
        Self {
            sender,
            dropped_count: AtomicU64::new(0),
            recent_events: Mutex::new(VecDeque::with_capacity(RECENT_EVENTS_CAPACITY)),
            writer: Some(writer),
        }
    }

    /// Create a no-op audit logger for testing (no tokio runtime required).
    /// Events are still kept in the recent-events buffer, then dropped.
    pub fn new_noop() -> Self {
        let (sender, _receiver) = mpsc::channel(1);
        Self {
            sender,
            dropped_count: AtomicU64::new(0),
            recent_events: Mutex::new(VecDeque::with_capacity(RECENT_EVENTS_CAPACITY)),
            writer: None,
        }
    }

    /// Number of audit events dropped due to channel overflow
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    pub fn log_event(&self, event: HostEvent) {
        self.try_send(event);
    }

    /// Return the most recent audit events (up to `max`), newest last.
    pub fn get_recent_events(&self, max: usize) -> Vec<HostEvent> {
        let buf = self.recent();
        let skip = buf.len().saturating_sub(max);
        buf.iter().skip(skip).cloned().collect()
    }

    /// Close the channel and wait for the writer to flush what is queued.
    pub async fn close(mut self) {
        let writer = self.writer.take();
        drop(self);
        if let Some(writer) = writer {
            if let Err(e) = writer.await {
                error!(error = %e, "Audit writer task failed");
            }
        }
    }

    fn recent(&self) -> MutexGuard<'_, VecDeque<HostEvent>> {
        self.recent_events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn try_send(&self, event: HostEvent) {
        {
            let mut buf = self.recent();
            if buf.len() >= RECENT_EVENTS_CAPACITY {
                buf.pop_front();
            }
            buf.push_back(event.clone());
        }

        let event = match self.sender.try_send(event) {
            Ok(()) => return,
            Err(mpsc::error::TrySendError::Full(event)) if event.is_critical() => event,
            Err(_) => {
                self.record_drop();
                return;
            }
        };
        // Critical events get one more attempt at a slot.
        match self.sender.try_reserve() {
            Ok(permit) => permit.send(event),
            Err(_) => self.record_drop(),
        }
    }

    fn record_drop(&self) {
        let dropped = self.dropped_count.fetch_add(1, Ordering::Relaxed) + 1;
        if dropped % 100 == 1 {
            warn!(
                total_dropped = dropped,
                "Audit events being dropped due to channel overflow"
            );
        }
    }
}

impl HostStatusObserver for AuditLogger {
    fn on_start(&self, owner_email: &str) {
        self.log_event(HostEvent::host_started(owner_email));
    }

    fn on_client_authenticated(&self, jid: &str) {
        self.log_event(HostEvent::client_authenticated(jid));
    }

    fn on_client_connected(&self, jid: &str) {
        self.log_event(HostEvent::client_connected(jid));
    }

    fn on_access_denied(&self, jid: &str) {
        self.log_event(HostEvent::client_access_denied(jid));
    }

    fn on_client_disconnected(&self, jid: &str) {
        self.log_event(HostEvent::client_disconnected(jid));
    }

    fn on_client_route_change(&self, jid: &str, channel_name: &str, route: &TransportRoute) {
        self.log_event(HostEvent::client_route_change(jid, channel_name, route));
    }

    fn on_shutdown(&self) {
        self.log_event(HostEvent::host_shutdown());
    }
}

async fn audit_writer_task(mut receiver: mpsc::Receiver<HostEvent>, log_path: Option<PathBuf>) {
    let mut file = match &log_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                let _ = tokio::fs::create_dir_all(parent).await;
            }
            match tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
            {
                Ok(f) => Some(f),
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Failed to open audit log");
                    None
                }
            }
        }
        None => None,
    };

    while let Some(event) = receiver.recv().await {
        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "Failed to serialize audit event");
                continue;
            }
        };
        debug!(event = %json, "Audit event");
        if let Some(ref mut f) = file {
            let line = format!("{}\n", json);
            if let Err(e) = f.write_all(line.as_bytes()).await {
                error!(error = %e, "Failed to write audit log");
                continue;
            }
            if let Err(e) = f.flush().await {
                error!(error = %e, "Failed to flush audit log");
            }
        }
    }
}

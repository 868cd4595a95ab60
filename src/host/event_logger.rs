use super::status::HostStatusObserver;
use super::ChromotingHost;
use crate::protocol::TransportRoute;
use crate::utils::format_duration;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tokio::time::Instant;
use tracing::{info, warn};

/// Writes host lifecycle events to the log, including how long each
/// authenticated client stayed connected.
#[derive(Default)]
pub struct HostEventLogger {
    authenticated_at: RefCell<HashMap<String, Instant>>,
}

impl HostEventLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a logger and register it with `host`. The host holds it
    /// weakly, so logging stops when the returned handle is dropped.
    pub fn attach(host: &ChromotingHost) -> Rc<Self> {
        let logger = Rc::new(Self::new());
        let observer: Rc<dyn HostStatusObserver> = logger.clone();
        host.add_status_observer(observer);
        logger
    }

    /// Clients currently between authentication and disconnection.
    pub fn tracked_clients(&self) -> usize {
        self.authenticated_at.borrow().len()
    }
}

impl HostStatusObserver for HostEventLogger {
    fn on_start(&self, owner_email: &str) {
        info!(owner = %owner_email, "Host started");
    }

    fn on_client_authenticated(&self, jid: &str) {
        self.authenticated_at
            .borrow_mut()
            .insert(jid.to_string(), Instant::now());
        info!(client = %jid, "Client authenticated");
    }

    fn on_client_connected(&self, jid: &str) {
        info!(client = %jid, "Client channels connected");
    }

    fn on_access_denied(&self, jid: &str) {
        warn!(client = %jid, "Access denied for client");
    }

    fn on_client_disconnected(&self, jid: &str) {
        match self.authenticated_at.borrow_mut().remove(jid) {
            Some(since) => info!(
                client = %jid,
                duration = %format_duration(since.elapsed()),
                "Client disconnected"
            ),
            None => info!(client = %jid, "Client disconnected"),
        }
    }

    fn on_client_route_change(&self, jid: &str, channel_name: &str, route: &TransportRoute) {
        info!(
            client = %jid,
            channel = %channel_name,
            route_type = %route.route_type,
            ip = %route.remote_address,
            host_ip = %route.local_address,
            "Channel route changed"
        );
    }

    fn on_shutdown(&self) {
        self.authenticated_at.borrow_mut().clear();
        info!("Host shut down");
    }
}

pub mod collectors;

use crate::host::HostStatusObserver;
use collectors::ReasonLabel;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

/// Well-known admission rejection reasons
pub mod rejection_reasons {
    /// Inbound session turned away by the login backoff.
    pub const OVERLOAD: &str = "overload";
    /// Session disconnected by the login backoff while authenticating.
    pub const HOST_OVERLOAD: &str = "host_overload";
    /// No connection could be built for the negotiated transport.
    pub const INCOMPATIBLE: &str = "incompatible";
}

/// Prometheus metrics for one host.
pub struct HostMetrics {
    registry: Registry,
    pub sessions_incoming_total: Counter,
    pub sessions_rejected_total: Family<ReasonLabel, Counter>,
    pub auth_successes_total: Counter,
    pub access_denied_total: Counter,
    pub client_disconnects_total: Counter,
    pub clients_authenticated: Gauge,
}

impl HostMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let sessions_incoming_total = Counter::default();
        registry.register(
            "chromoting_sessions_incoming",
            "Inbound sessions accepted for authentication",
            sessions_incoming_total.clone(),
        );

        let sessions_rejected_total = Family::<ReasonLabel, Counter>::default();
        registry.register(
            "chromoting_sessions_rejected",
            "Sessions rejected by admission control",
            sessions_rejected_total.clone(),
        );

        let auth_successes_total = Counter::default();
        registry.register(
            "chromoting_auth_successes",
            "Clients that completed authentication",
            auth_successes_total.clone(),
        );

        let access_denied_total = Counter::default();
        registry.register(
            "chromoting_access_denied",
            "Sessions that closed without authenticating",
            access_denied_total.clone(),
        );

        let client_disconnects_total = Counter::default();
        registry.register(
            "chromoting_client_disconnects",
            "Authenticated clients that disconnected",
            client_disconnects_total.clone(),
        );

        let clients_authenticated = Gauge::default();
        registry.register(
            "chromoting_clients_authenticated",
            "Authenticated clients currently connected",
            clients_authenticated.clone(),
        );

        Self {
            registry,
            sessions_incoming_total,
            sessions_rejected_total,
            auth_successes_total,
            access_denied_total,
            client_disconnects_total,
            clients_authenticated,
        }
    }

    pub fn record_incoming_session(&self) {
        self.sessions_incoming_total.inc();
    }

    pub fn record_rejection(&self, reason: &str) {
        self.sessions_rejected_total
            .get_or_create(&ReasonLabel {
                reason: reason.to_string(),
            })
            .inc();
    }

    pub fn rejections(&self, reason: &str) -> u64 {
        self.sessions_rejected_total
            .get_or_create(&ReasonLabel {
                reason: reason.to_string(),
            })
            .get()
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::warn!("Failed to encode host metrics");
        }
        buffer
    }
}

impl Default for HostMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl HostStatusObserver for HostMetrics {
    fn on_client_authenticated(&self, _jid: &str) {
        self.auth_successes_total.inc();
        self.clients_authenticated.inc();
    }

    fn on_access_denied(&self, _jid: &str) {
        self.access_denied_total.inc();
    }

    fn on_client_disconnected(&self, _jid: &str) {
        self.client_disconnects_total.inc();
        self.clients_authenticated.dec();
    }
}

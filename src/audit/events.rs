use crate::protocol::TransportRoute;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type")]
pub enum HostEvent {
    #[serde(rename = "host.started")]
    HostStarted {
        timestamp: DateTime<Utc>,
        owner_email: String,
    },
    #[serde(rename = "client.authenticated")]
    ClientAuthenticated {
        timestamp: DateTime<Utc>,
        client: String,
    },
    #[serde(rename = "client.connected")]
    ClientConnected {
        timestamp: DateTime<Utc>,
        client: String,
    },
    #[serde(rename = "client.access_denied")]
    ClientAccessDenied {
        timestamp: DateTime<Utc>,
        client: String,
    },
    #[serde(rename = "client.disconnected")]
    ClientDisconnected {
        timestamp: DateTime<Utc>,
        client: String,
    },
    #[serde(rename = "client.route_change")]
    ClientRouteChange {
        timestamp: DateTime<Utc>,
        client: String,
        channel: String,
        route_type: String,
        remote_address: String,
        local_address: String,
    },
    #[serde(rename = "host.shutdown")]
    HostShutdown { timestamp: DateTime<Utc> },
}

impl HostEvent {
    pub fn host_started(owner_email: &str) -> Self {
        Self::HostStarted {
            timestamp: Utc::now(),
            owner_email: owner_email.to_string(),
        }
    }

    pub fn client_authenticated(client: &str) -> Self {
        Self::ClientAuthenticated {
            timestamp: Utc::now(),
            client: client.to_string(),
        }
    }

    pub fn client_connected(client: &str) -> Self {
        Self::ClientConnected {
            timestamp: Utc::now(),
            client: client.to_string(),
        }
    }

    pub fn client_access_denied(client: &str) -> Self {
        Self::ClientAccessDenied {
            timestamp: Utc::now(),
            client: client.to_string(),
        }
    }

    pub fn client_disconnected(client: &str) -> Self {
        Self::ClientDisconnected {
            timestamp: Utc::now(),
            client: client.to_string(),
        }
    }

    pub fn client_route_change(client: &str, channel: &str, route: &TransportRoute) -> Self {
        Self::ClientRouteChange {
            timestamp: Utc::now(),
            client: client.to_string(),
            channel: channel.to_string(),
            route_type: route.route_type.to_string(),
            remote_address: route.remote_address.to_string(),
            local_address: route.local_address.to_string(),
        }
    }

    pub fn host_shutdown() -> Self {
        Self::HostShutdown {
            timestamp: Utc::now(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::HostStarted { .. } => "host.started",
            Self::ClientAuthenticated { .. } => "client.authenticated",
            Self::ClientConnected { .. } => "client.connected",
            Self::ClientAccessDenied { .. } => "client.access_denied",
            Self::ClientDisconnected { .. } => "client.disconnected",
            Self::ClientRouteChange { .. } => "client.route_change",
            Self::HostShutdown { .. } => "host.shutdown",
        }
    }

    /// Security-relevant events that must not be lost to channel pressure.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::ClientAuthenticated { .. } | Self::ClientAccessDenied { .. }
        )
    }
}

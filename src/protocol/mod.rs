//! Interfaces of the transport layer the host drives.
//!
//! Session negotiation, encryption and the media channels all live behind
//! these traits. The host only needs a client identity, the negotiated
//! transport variant, a way to disconnect and a way to hear about state
//! changes (through [`ClientSessionHandle`]).

use crate::host::ClientSessionHandle;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

/// Transport variant negotiated for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    Ice,
    Webrtc,
}

impl TransportProtocol {
    pub const ALL: [TransportProtocol; 2] = [TransportProtocol::Ice, TransportProtocol::Webrtc];
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportProtocol::Ice => write!(f, "ice"),
            TransportProtocol::Webrtc => write!(f, "webrtc"),
        }
    }
}

/// Negotiated configuration of an inbound session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    protocol: TransportProtocol,
}

impl SessionConfig {
    pub fn new(protocol: TransportProtocol) -> Self {
        Self { protocol }
    }

    pub fn protocol(&self) -> TransportProtocol {
        self.protocol
    }
}

/// An inbound session handed over by the [`SessionManager`].
pub trait Session {
    /// Identity of the remote client.
    fn jid(&self) -> &str;

    fn config(&self) -> &SessionConfig;
}

/// Answer given to the session manager for an inbound session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncomingSessionResponse {
    Accept,
    Incompatible,
    Overload,
    Decline,
}

impl fmt::Display for IncomingSessionResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IncomingSessionResponse::Accept => write!(f, "accept"),
            IncomingSessionResponse::Incompatible => write!(f, "incompatible"),
            IncomingSessionResponse::Overload => write!(f, "overload"),
            IncomingSessionResponse::Decline => write!(f, "decline"),
        }
    }
}

/// Reason attached to a disconnect, or reported by the transport on close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Ok,
    AuthenticationFailed,
    ChannelConnectionError,
    IncompatibleProtocol,
    SessionRejected,
    HostOverload,
    MaxSessionLength,
    HostConfigurationError,
    UnknownError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Ok => "ok",
            ErrorCode::AuthenticationFailed => "authentication_failed",
            ErrorCode::ChannelConnectionError => "channel_connection_error",
            ErrorCode::IncompatibleProtocol => "incompatible_protocol",
            ErrorCode::SessionRejected => "session_rejected",
            ErrorCode::HostOverload => "host_overload",
            ErrorCode::MaxSessionLength => "max_session_length",
            ErrorCode::HostConfigurationError => "host_configuration_error",
            ErrorCode::UnknownError => "unknown_error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a channel's packets travel between host and client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteType {
    Direct,
    Stun,
    Relay,
}

impl fmt::Display for RouteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteType::Direct => write!(f, "direct"),
            RouteType::Stun => write!(f, "stun"),
            RouteType::Relay => write!(f, "relay"),
        }
    }
}

/// Routing diagnostics for one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransportRoute {
    pub route_type: RouteType,
    pub remote_address: SocketAddr,
    pub local_address: SocketAddr,
}

/// Transport-specific connection wrapping an accepted [`Session`].
pub trait ConnectionToClient {
    /// Identity of the client on the other end.
    fn session_jid(&self) -> &str;

    /// Called once, when the owning client session is created. The transport
    /// reports authentication progress, channel state and closure through it.
    fn set_event_handler(&mut self, handle: ClientSessionHandle);

    /// Tear the connection down. The transport must eventually report the
    /// close through [`ClientSessionHandle::on_connection_closed`], either
    /// from inside this call or later.
    fn disconnect(&mut self, reason: ErrorCode);
}

/// Builds connections for accepted sessions. Owns whatever shared transport
/// context (port allocators, network settings) the variants need.
///
/// A factory that cannot serve a variant returns `None`; the session is then
/// answered with [`IncomingSessionResponse::Incompatible`].
pub trait ConnectionFactory {
    fn create_ice_connection(
        &self,
        session: Box<dyn Session>,
    ) -> Option<Box<dyn ConnectionToClient>>;

    fn create_webrtc_connection(
        &self,
        session: Box<dyn Session>,
    ) -> Option<Box<dyn ConnectionToClient>>;
}

/// Admission callback registered with the session manager.
pub type IncomingSessionHandler = Box<dyn FnMut(Box<dyn Session>) -> IncomingSessionResponse>;

/// Source of inbound sessions.
pub trait SessionManager {
    /// Register the sole admission callback. Called once, from `start`.
    fn accept_incoming(&mut self, handler: IncomingSessionHandler);
}

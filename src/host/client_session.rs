use super::environment::{DesktopEnvironment, DesktopEnvironmentFactory, PairingRegistry};
use super::extension::{HostExtension, HostExtensionSession};
use crate::protocol::{ConnectionToClient, ErrorCode, TransportProtocol, TransportRoute};
use crate::utils::generate_correlation_id;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Lifecycle of a client session as seen by the host. Transitions only move
/// forward through this list (Closing may be skipped).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Accepted,
    Authenticating,
    Authenticated,
    ChannelsConnected,
    Closing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Accepted => "accepted",
            SessionState::Authenticating => "authenticating",
            SessionState::Authenticated => "authenticated",
            SessionState::ChannelsConnected => "channels_connected",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Receiver of client session events; implemented by the host.
pub trait ClientSessionEventHandler {
    fn on_session_authenticating(&self, session: &Rc<ClientSession>);
    fn on_session_authenticated(&self, session: &Rc<ClientSession>);
    fn on_session_channels_connected(&self, session: &Rc<ClientSession>);
    fn on_session_authentication_failed(&self, session: &Rc<ClientSession>);
    fn on_session_closed(&self, session: &Rc<ClientSession>);
    fn on_session_route_change(
        &self,
        session: &Rc<ClientSession>,
        channel_name: &str,
        route: &TransportRoute,
    );
}

/// Everything a client session is built from.
pub struct ClientSessionParams {
    pub connection: Box<dyn ConnectionToClient>,
    pub protocol: TransportProtocol,
    pub desktop_environment_factory: Rc<dyn DesktopEnvironmentFactory>,
    /// Zero disables the limit.
    pub max_duration: Duration,
    pub extensions: Vec<Rc<dyn HostExtension>>,
    pub pairing_registry: Option<Rc<dyn PairingRegistry>>,
}

/// One connected client, owned by the host's client list.
pub struct ClientSession {
    conn_id: String,
    client_jid: String,
    protocol: TransportProtocol,
    state: Cell<SessionState>,
    was_authenticated: Cell<bool>,
    announced: Cell<bool>,
    event_handler: RefCell<Option<Weak<dyn ClientSessionEventHandler>>>,
    connection: RefCell<Box<dyn ConnectionToClient>>,
    desktop_environment_factory: Rc<dyn DesktopEnvironmentFactory>,
    desktop_environment: RefCell<Option<Box<dyn DesktopEnvironment>>>,
    host_capabilities: RefCell<String>,
    client_capabilities: RefCell<Option<String>>,
    max_duration: Duration,
    max_duration_timer: RefCell<Option<JoinHandle<()>>>,
    extensions: Vec<Rc<dyn HostExtension>>,
    extension_sessions: RefCell<Vec<Box<dyn HostExtensionSession>>>,
    pairing_registry: Option<Rc<dyn PairingRegistry>>,
    connected_at: Instant,
}

impl ClientSession {
    /// Wrap `params.connection` and register the new session as its event
    /// handler.
    pub fn new(
        params: ClientSessionParams,
        event_handler: Weak<dyn ClientSessionEventHandler>,
    ) -> Rc<Self> {
        let client_jid = params.connection.session_jid().to_string();
        let session = Rc::new(Self {
            conn_id: generate_correlation_id(),
            client_jid,
            protocol: params.protocol,
            state: Cell::new(SessionState::Accepted),
            was_authenticated: Cell::new(false),
            announced: Cell::new(false),
            client_capabilities: RefCell::new(None),
            event_handler: RefCell::new(Some(event_handler)),
            connection: RefCell::new(params.connection),
            desktop_environment_factory: params.desktop_environment_factory,
            desktop_environment: RefCell::new(None),
            host_capabilities: RefCell::new(String::new()),
            max_duration: params.max_duration,
            max_duration_timer: RefCell::new(None),
            extensions: params.extensions,
            extension_sessions: RefCell::new(Vec::new()),
            pairing_registry: params.pairing_registry,
            connected_at: Instant::now(),
        });
        let handle = ClientSessionHandle {
            session: Rc::downgrade(&session),
        };
        session.connection.borrow_mut().set_event_handler(handle);
        session
    }

    pub fn conn_id(&self) -> &str {
        &self.conn_id
    }

    pub fn client_jid(&self) -> &str {
        &self.client_jid
    }

    pub fn protocol(&self) -> TransportProtocol {
        self.protocol
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// True between successful authentication and the start of teardown.
    pub fn is_authenticated(&self) -> bool {
        matches!(
            self.state.get(),
            SessionState::Authenticated | SessionState::ChannelsConnected
        )
    }

    /// Whether the session ever reached `Authenticated`.
    pub fn was_authenticated(&self) -> bool {
        self.was_authenticated.get()
    }

    /// Whether observers were told this client authenticated. Only such
    /// clients are later reported as disconnected.
    pub fn was_announced(&self) -> bool {
        self.announced.get()
    }

    pub(crate) fn mark_announced(&self) {
        self.announced.set(true);
    }

    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    pub fn pairing_registry(&self) -> Option<&Rc<dyn PairingRegistry>> {
        self.pairing_registry.as_ref()
    }

    /// Capabilities offered to the client, available once authenticated.
    pub fn host_capabilities(&self) -> String {
        self.host_capabilities.borrow().clone()
    }

    /// Capabilities the client reported, once it has.
    pub fn client_capabilities(&self) -> Option<String> {
        self.client_capabilities.borrow().clone()
    }

    pub fn has_desktop_environment(&self) -> bool {
        self.desktop_environment.borrow().is_some()
    }

    pub fn extension_session_count(&self) -> usize {
        self.extension_sessions.borrow().len()
    }

    /// Ask the transport to tear the connection down. The session leaves the
    /// host's list once the transport reports the close.
    pub fn disconnect_session(&self, reason: ErrorCode) {
        if matches!(
            self.state.get(),
            SessionState::Closing | SessionState::Closed
        ) {
            return;
        }
        self.state.set(SessionState::Closing);
        info!(
            conn_id = %self.conn_id,
            client = %self.client_jid,
            reason = %reason,
            "Disconnecting client"
        );
        self.cancel_max_duration_timer();
        self.connection.borrow_mut().disconnect(reason);
    }

    /// Offer an extension message to each extension session in turn.
    pub fn deliver_extension_message(&self, message_type: &str, data: &str) -> bool {
        let mut sessions = std::mem::take(&mut *self.extension_sessions.borrow_mut());
        let handled = sessions
            .iter_mut()
            .any(|s| s.on_extension_message(message_type, data));
        if self.state.get() == SessionState::ChannelsConnected {
            *self.extension_sessions.borrow_mut() = sessions;
        }
        handled
    }

    /// Stop forwarding events to the host.
    pub(crate) fn detach(&self) {
        self.event_handler.borrow_mut().take();
    }

    fn event_handler(&self) -> Option<Rc<dyn ClientSessionEventHandler>> {
        self.event_handler.borrow().as_ref().and_then(Weak::upgrade)
    }

    fn on_connection_authenticating(self: &Rc<Self>) {
        if self.state.get() != SessionState::Accepted {
            debug!(conn_id = %self.conn_id, state = %self.state.get(), "Ignoring late authenticating event");
            return;
        }
        self.state.set(SessionState::Authenticating);
        debug!(conn_id = %self.conn_id, client = %self.client_jid, "Client authenticating");
        if let Some(handler) = self.event_handler() {
            handler.on_session_authenticating(self);
        }
    }

    fn on_connection_authenticated(self: &Rc<Self>) {
        if !matches!(
            self.state.get(),
            SessionState::Accepted | SessionState::Authenticating
        ) {
            debug!(conn_id = %self.conn_id, state = %self.state.get(), "Ignoring late authenticated event");
            return;
        }
        self.state.set(SessionState::Authenticated);
        self.was_authenticated.set(true);

        if let Some(handler) = self.event_handler() {
            handler.on_session_authenticated(self);
        }

        // The host may have disconnected this session, or been destroyed.
        if self.state.get() != SessionState::Authenticated {
            return;
        }

        let Some(environment) = self.desktop_environment_factory.create(&self.client_jid) else {
            warn!(
                conn_id = %self.conn_id,
                client = %self.client_jid,
                "Failed to create desktop environment"
            );
            self.disconnect_session(ErrorCode::HostConfigurationError);
            return;
        };

        let mut capabilities: Vec<String> = Vec::new();
        let env_caps = environment.capabilities();
        if !env_caps.is_empty() {
            capabilities.push(env_caps);
        }
        capabilities.extend(
            self.extensions
                .iter()
                .map(|e| e.capability())
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        );
        *self.host_capabilities.borrow_mut() = capabilities.join(" ");
        *self.desktop_environment.borrow_mut() = Some(environment);

        if !self.max_duration.is_zero() {
            self.start_max_duration_timer();
        }
    }

    fn on_connection_channels_connected(self: &Rc<Self>) {
        if self.state.get() != SessionState::Authenticated {
            debug!(conn_id = %self.conn_id, state = %self.state.get(), "Ignoring channels-connected event");
            return;
        }
        self.state.set(SessionState::ChannelsConnected);
        if self.client_capabilities.borrow().is_some() {
            self.create_extension_sessions();
        }

        if let Some(handler) = self.event_handler() {
            handler.on_session_channels_connected(self);
        }
    }

    fn on_client_capabilities(self: &Rc<Self>, capabilities: &str) {
        if !self.is_authenticated() {
            debug!(conn_id = %self.conn_id, state = %self.state.get(), "Ignoring client capabilities");
            return;
        }
        // Only the first report counts.
        if self.client_capabilities.borrow().is_some() {
            debug!(conn_id = %self.conn_id, "Ignoring repeated client capabilities");
            return;
        }
        debug!(conn_id = %self.conn_id, capabilities = %capabilities, "Client capabilities received");
        *self.client_capabilities.borrow_mut() = Some(capabilities.to_string());

        if self.state.get() == SessionState::ChannelsConnected {
            self.create_extension_sessions();
        }
    }

    /// Instantiate the extensions the client can use: those without a
    /// capability, and those whose capability the client also reported.
    fn create_extension_sessions(&self) {
        let client_capabilities = self.client_capabilities.borrow().clone().unwrap_or_default();
        let sessions: Vec<Box<dyn HostExtensionSession>> = self
            .extensions
            .iter()
            .filter(|e| {
                let capability = e.capability();
                capability.is_empty()
                    || client_capabilities
                        .split_whitespace()
                        .any(|c| c == capability)
            })
            .filter_map(|e| e.create_extension_session(&self.client_jid))
            .collect();
        debug!(conn_id = %self.conn_id, count = sessions.len(), "Extension sessions created");
        *self.extension_sessions.borrow_mut() = sessions;
    }

    fn on_route_change(self: &Rc<Self>, channel_name: &str, route: &TransportRoute) {
        if self.state.get() == SessionState::Closed {
            return;
        }
        if let Some(handler) = self.event_handler() {
            handler.on_session_route_change(self, channel_name, route);
        }
    }

    fn on_connection_closed(self: &Rc<Self>, error: ErrorCode) {
        if self.state.get() == SessionState::Closed {
            return;
        }
        self.state.set(SessionState::Closed);
        info!(
            conn_id = %self.conn_id,
            client = %self.client_jid,
            error = %error,
            "Client connection closed"
        );

        self.cancel_max_duration_timer();
        self.extension_sessions.borrow_mut().clear();
        self.desktop_environment.borrow_mut().take();

        if !self.was_authenticated.get() {
            if let Some(handler) = self.event_handler() {
                handler.on_session_authentication_failed(self);
            }
        }
        // Re-resolve: the previous callback may have destroyed the host.
        if let Some(handler) = self.event_handler() {
            handler.on_session_closed(self);
        }
    }

    fn start_max_duration_timer(self: &Rc<Self>) {
        if tokio::runtime::Handle::try_current().is_err() {
            warn!(
                conn_id = %self.conn_id,
                max_duration_secs = self.max_duration.as_secs(),
                "No async runtime, maximum session duration not enforced"
            );
            return;
        }
        let session = Rc::downgrade(self);
        let max_duration = self.max_duration;
        let timer = tokio::task::spawn_local(async move {
            tokio::time::sleep(max_duration).await;
            if let Some(session) = session.upgrade() {
                info!(
                    conn_id = %session.conn_id,
                    client = %session.client_jid,
                    max_duration_secs = max_duration.as_secs(),
                    "Maximum session duration reached"
                );
                session.disconnect_session(ErrorCode::MaxSessionLength);
            }
        });
        if let Some(previous) = self.max_duration_timer.borrow_mut().replace(timer) {
            previous.abort();
        }
    }

    fn cancel_max_duration_timer(&self) {
        if let Some(timer) = self.max_duration_timer.borrow_mut().take() {
            timer.abort();
        }
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        if let Some(timer) = self.max_duration_timer.get_mut().take() {
            timer.abort();
        }
    }
}

impl fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSession")
            .field("conn_id", &self.conn_id)
            .field("client_jid", &self.client_jid)
            .field("protocol", &self.protocol)
            .field("state", &self.state.get())
            .finish()
    }
}

/// Back-reference a transport uses to report connection events.
///
/// Holds the session weakly; events for a session that no longer exists are
/// dropped.
#[derive(Clone)]
pub struct ClientSessionHandle {
    session: Weak<ClientSession>,
}

impl ClientSessionHandle {
    pub fn on_connection_authenticating(&self) {
        if let Some(session) = self.session.upgrade() {
            session.on_connection_authenticating();
        }
    }

    pub fn on_connection_authenticated(&self) {
        if let Some(session) = self.session.upgrade() {
            session.on_connection_authenticated();
        }
    }

    pub fn on_connection_channels_connected(&self) {
        if let Some(session) = self.session.upgrade() {
            session.on_connection_channels_connected();
        }
    }

    /// The client's space-separated capability list. Only the first report
    /// after authentication is used.
    pub fn on_client_capabilities(&self, capabilities: &str) {
        if let Some(session) = self.session.upgrade() {
            session.on_client_capabilities(capabilities);
        }
    }

    pub fn on_route_change(&self, channel_name: &str, route: &TransportRoute) {
        if let Some(session) = self.session.upgrade() {
            session.on_route_change(channel_name, route);
        }
    }

    pub fn on_connection_closed(&self, error: ErrorCode) {
        if let Some(session) = self.session.upgrade() {
            session.on_connection_closed(error);
        }
    }

    /// Whether the session this handle points at still exists.
    pub fn is_alive(&self) -> bool {
        self.session.strong_count() > 0
    }

    pub fn session(&self) -> Option<Rc<ClientSession>> {
        self.session.upgrade()
    }
}

impl fmt::Debug for ClientSessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSessionHandle")
            .field("alive", &self.is_alive())
            .finish()
    }
}

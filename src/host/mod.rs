//! Host orchestrator: admission control, single-client policy and teardown.
//!
//! # Threading
//!
//! Everything here runs on one designated sequence. The types are built on
//! `Rc`/`RefCell` and are therefore `!Send`; handing them to another thread
//! does not compile. Session duration timers are spawned with
//! `tokio::task::spawn_local`, so a host that limits session duration must be
//! driven from inside a `tokio::task::LocalSet`.
//!
//! # Re-entrancy
//!
//! Disconnecting a client and notifying observers both call out into code
//! that may call straight back into the host, including closing sessions and
//! destroying the host. The rules that keep this sound:
//!
//! - No `RefCell` borrow is held across a callout.
//! - Loops over clients walk a snapshot, and after every disconnect they
//!   check the host's liveness token before continuing.
//! - Dropping [`ChromotingHost`] cancels the liveness token, drains clients
//!   and detaches every session from the host.

pub mod client_session;
pub mod environment;
pub mod event_logger;
pub mod extension;
pub mod status;

pub use client_session::{
    ClientSession, ClientSessionEventHandler, ClientSessionHandle, ClientSessionParams,
    SessionState,
};
pub use environment::{DesktopEnvironment, DesktopEnvironmentFactory, PairingRegistry};
pub use event_logger::HostEventLogger;
pub use extension::{HostExtension, HostExtensionSession};
pub use status::{HostStatusObserver, StatusObserverList};

use crate::context::HostContext;
use crate::metrics::{rejection_reasons, HostMetrics};
use crate::protocol::{
    ConnectionFactory, ErrorCode, IncomingSessionResponse, Session, SessionManager,
    TransportProtocol, TransportRoute,
};
use crate::security::{login_backoff, LoginBackoff};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The remote-desktop host.
///
/// Owns every client session and all extensions. Dropping it disconnects the
/// remaining clients, reports shutdown to observers (if it was started) and
/// releases the session manager.
pub struct ChromotingHost {
    core: Rc<HostCore>,
}

impl ChromotingHost {
    pub fn new(context: HostContext) -> Self {
        let HostContext {
            session_manager,
            connection_factory,
            desktop_environment_factory,
        } = context;

        let core = Rc::new_cyclic(|self_weak| HostCore {
            self_weak: self_weak.clone(),
            started: Cell::new(false),
            shutdown: CancellationToken::new(),
            clients: RefCell::new(Vec::new()),
            status_observers: StatusObserverList::new(),
            extensions: RefCell::new(Vec::new()),
            login_backoff: RefCell::new(login_backoff()),
            enable_curtaining: Cell::new(false),
            max_session_duration: Cell::new(Duration::ZERO),
            allowed_protocols: RefCell::new(TransportProtocol::ALL.to_vec()),
            pairing_registry: RefCell::new(None),
            desktop_environment_factory,
            connection_factory,
            session_manager: RefCell::new(Some(session_manager)),
            metrics: RefCell::new(None),
        });
        Self { core }
    }

    /// Begin accepting sessions on behalf of `owner_email`.
    ///
    /// # Panics
    ///
    /// If the host was already started.
    pub fn start(&self, owner_email: &str) {
        self.core.start(owner_email);
    }

    pub fn is_started(&self) -> bool {
        self.core.started.get()
    }

    /// Admission decision for one inbound session. The session manager
    /// reaches this through the callback registered by [`Self::start`].
    pub fn on_incoming_session(&self, session: Box<dyn Session>) -> IncomingSessionResponse {
        self.core.on_incoming_session(session)
    }

    /// Toggle curtain mode. Turning it on disconnects every current client,
    /// since their sessions were set up uncurtained.
    pub fn set_enable_curtaining(&self, enable: bool) {
        self.core.set_enable_curtaining(enable);
    }

    pub fn enable_curtaining(&self) -> bool {
        self.core.enable_curtaining.get()
    }

    /// Limit the length of sessions created from now on. Zero removes the
    /// limit. Sessions that already exist keep the limit they started with.
    ///
    /// # Panics
    ///
    /// A non-zero limit arms a `spawn_local` timer when a client
    /// authenticates, which panics on a tokio runtime outside a
    /// `tokio::task::LocalSet`. With no runtime at all the limit is logged
    /// and not enforced.
    pub fn set_maximum_session_duration(&self, max_duration: Duration) {
        debug!(
            max_duration_secs = max_duration.as_secs(),
            "Maximum session duration updated"
        );
        self.core.max_session_duration.set(max_duration);
    }

    pub fn max_session_duration(&self) -> Duration {
        self.core.max_session_duration.get()
    }

    /// Restrict the transports new sessions may use. Sessions offered over
    /// any other transport are answered `Incompatible`. Both are allowed
    /// until this is called.
    pub fn set_allowed_protocols(&self, protocols: &[TransportProtocol]) {
        debug!(protocols = ?protocols, "Allowed transports updated");
        *self.core.allowed_protocols.borrow_mut() = protocols.to_vec();
    }

    pub fn allowed_protocols(&self) -> Vec<TransportProtocol> {
        self.core.allowed_protocols.borrow().clone()
    }

    /// Take ownership of an extension. Every session created afterwards is
    /// offered it.
    pub fn add_extension(&self, extension: Box<dyn HostExtension>) {
        let extension: Rc<dyn HostExtension> = Rc::from(extension);
        debug!(capability = %extension.capability(), "Host extension added");
        self.core.extensions.borrow_mut().push(extension);
    }

    pub fn extension_count(&self) -> usize {
        self.core.extensions.borrow().len()
    }

    /// Register an observer. The host holds it weakly; the caller keeps it
    /// alive.
    pub fn add_status_observer(&self, observer: Rc<dyn HostStatusObserver>) {
        self.core.status_observers.add(&observer);
    }

    pub fn remove_status_observer(&self, observer: Rc<dyn HostStatusObserver>) {
        self.core.status_observers.remove(&observer);
    }

    pub fn set_pairing_registry(&self, registry: Option<Rc<dyn PairingRegistry>>) {
        *self.core.pairing_registry.borrow_mut() = registry;
    }

    /// Attach a metrics registry. It observes host events and also counts
    /// admission rejections.
    pub fn set_metrics(&self, metrics: Rc<HostMetrics>) {
        let observer: Rc<dyn HostStatusObserver> = metrics.clone();
        self.core.status_observers.add(&observer);
        *self.core.metrics.borrow_mut() = Some(metrics);
    }

    pub fn client_count(&self) -> usize {
        self.core.clients.borrow().len()
    }

    /// Snapshot of the tracked client sessions, oldest first.
    pub fn clients(&self) -> Vec<Rc<ClientSession>> {
        self.core.clients.borrow().clone()
    }

    /// The client that currently holds the session, if any.
    pub fn authenticated_client(&self) -> Option<Rc<ClientSession>> {
        self.core
            .clients
            .borrow()
            .iter()
            .find(|c| c.is_authenticated())
            .cloned()
    }

    /// Whether the login backoff would currently turn a new attempt away.
    pub fn is_login_backoff_active(&self) -> bool {
        self.core.login_backoff.borrow().should_reject_request()
    }

    /// Copy of the login backoff state, for diagnostics.
    pub fn login_backoff(&self) -> LoginBackoff {
        self.core.login_backoff.borrow().clone()
    }
}

impl Drop for ChromotingHost {
    fn drop(&mut self) {
        self.core.shut_down();
    }
}

/// Shared state behind [`ChromotingHost`]. Client sessions and the session
/// manager's admission callback reach it through weak references.
struct HostCore {
    self_weak: Weak<HostCore>,
    started: Cell<bool>,
    /// Liveness token; cancelled once the owning handle is dropped.
    shutdown: CancellationToken,
    clients: RefCell<Vec<Rc<ClientSession>>>,
    status_observers: StatusObserverList,
    extensions: RefCell<Vec<Rc<dyn HostExtension>>>,
    login_backoff: RefCell<LoginBackoff>,
    enable_curtaining: Cell<bool>,
    max_session_duration: Cell<Duration>,
    allowed_protocols: RefCell<Vec<TransportProtocol>>,
    pairing_registry: RefCell<Option<Rc<dyn PairingRegistry>>>,
    desktop_environment_factory: Rc<dyn DesktopEnvironmentFactory>,
    connection_factory: Rc<dyn ConnectionFactory>,
    session_manager: RefCell<Option<Box<dyn SessionManager>>>,
    metrics: RefCell<Option<Rc<HostMetrics>>>,
}

impl HostCore {
    fn start(&self, owner_email: &str) {
        assert!(!self.started.get(), "ChromotingHost::start called twice");
        info!(owner = %owner_email, "Starting host");
        self.started.set(true);
        self.status_observers.notify(|o| o.on_start(owner_email));

        let core = self.self_weak.clone();
        if let Some(manager) = self.session_manager.borrow_mut().as_mut() {
            manager.accept_incoming(Box::new(move |session: Box<dyn Session>| {
                match core.upgrade() {
                    Some(core) => core.on_incoming_session(session),
                    None => IncomingSessionResponse::Decline,
                }
            }));
        }
    }

    fn on_incoming_session(&self, session: Box<dyn Session>) -> IncomingSessionResponse {
        if !self.started.get() || self.shutdown.is_cancelled() {
            warn!(client = %session.jid(), "Incoming session rejected: host is not running");
            return IncomingSessionResponse::Decline;
        }

        // Checked before any per-session work so that a flood of attempts
        // costs as little as possible.
        let overloaded = self.login_backoff.borrow().should_reject_request();
        if overloaded {
            warn!(
                client = %session.jid(),
                "Incoming session rejected: overload of failed login attempts"
            );
            self.record_rejection(rejection_reasons::OVERLOAD);
            return IncomingSessionResponse::Overload;
        }

        let protocol = session.config().protocol();
        let jid = session.jid().to_string();
        if !self.allowed_protocols.borrow().contains(&protocol) {
            warn!(client = %jid, protocol = %protocol, "Incoming session rejected: transport disabled by policy");
            self.record_rejection(rejection_reasons::INCOMPATIBLE);
            return IncomingSessionResponse::Incompatible;
        }
        let connection = match protocol {
            TransportProtocol::Ice => self.connection_factory.create_ice_connection(session),
            TransportProtocol::Webrtc => self.connection_factory.create_webrtc_connection(session),
        };
        let Some(connection) = connection else {
            warn!(client = %jid, protocol = %protocol, "Incoming session rejected: transport not supported");
            self.record_rejection(rejection_reasons::INCOMPATIBLE);
            return IncomingSessionResponse::Incompatible;
        };

        let handler: Weak<dyn ClientSessionEventHandler> = self.self_weak.clone();
        let client = ClientSession::new(
            ClientSessionParams {
                connection,
                protocol,
                desktop_environment_factory: self.desktop_environment_factory.clone(),
                max_duration: self.max_session_duration.get(),
                extensions: self.extensions.borrow().clone(),
                pairing_registry: self.pairing_registry.borrow().clone(),
            },
            handler,
        );
        info!(
            conn_id = %client.conn_id(),
            client = %jid,
            protocol = %protocol,
            "Client connected"
        );
        self.clients.borrow_mut().push(client);
        if let Some(metrics) = self.metrics() {
            metrics.record_incoming_session();
        }
        IncomingSessionResponse::Accept
    }

    fn set_enable_curtaining(&self, enable: bool) {
        if self.enable_curtaining.get() == enable {
            return;
        }
        info!(enabled = enable, "Curtain mode changed");
        self.enable_curtaining.set(enable);
        self.desktop_environment_factory.set_enable_curtaining(enable);

        // Current clients were set up uncurtained and cannot be switched over.
        if enable {
            self.disconnect_all_clients(ErrorCode::Ok);
        }
    }

    /// Disconnect a snapshot of the current clients, stopping early if a
    /// callout destroys the host.
    fn disconnect_all_clients(&self, reason: ErrorCode) {
        let clients = self.clients.borrow().clone();
        for client in clients {
            client.disconnect_session(reason);
            if self.shutdown.is_cancelled() {
                return;
            }
        }
    }

    fn shut_down(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        info!(clients = self.clients.borrow().len(), "Shutting down host");

        let clients = self.clients.borrow().clone();
        for client in clients {
            client.disconnect_session(ErrorCode::Ok);
        }
        // Sessions whose transport closes asynchronously are released here;
        // their late close events no longer reach the host.
        let remaining = std::mem::take(&mut *self.clients.borrow_mut());
        if !remaining.is_empty() {
            debug!(count = remaining.len(), "Releasing clients still closing");
        }
        for client in &remaining {
            client.detach();
        }
        drop(remaining);

        if self.started.get() {
            self.status_observers.notify(|o| o.on_shutdown());
        }
        self.session_manager.borrow_mut().take();
    }

    fn metrics(&self) -> Option<Rc<HostMetrics>> {
        self.metrics.borrow().clone()
    }

    fn record_rejection(&self, reason: &str) {
        if let Some(metrics) = self.metrics() {
            metrics.record_rejection(reason);
        }
    }
}

impl ClientSessionEventHandler for HostCore {
    fn on_session_authenticating(&self, session: &Rc<ClientSession>) {
        let overloaded = self.login_backoff.borrow().should_reject_request();
        if overloaded {
            warn!(
                conn_id = %session.conn_id(),
                client = %session.client_jid(),
                "Authentication rejected: overload of failed login attempts"
            );
            self.record_rejection(rejection_reasons::HOST_OVERLOAD);
            session.disconnect_session(ErrorCode::HostOverload);
            return;
        }
        // Counted as a failure until the client proves otherwise, so that
        // abandoned handshakes still feed the backoff.
        self.login_backoff.borrow_mut().inform_of_request(false);
    }

    fn on_session_authenticated(&self, session: &Rc<ClientSession>) {
        self.login_backoff.borrow_mut().reset();

        // The newest client wins: everyone else is disconnected.
        let others: Vec<Rc<ClientSession>> = self
            .clients
            .borrow()
            .iter()
            .filter(|c| !Rc::ptr_eq(c, session))
            .cloned()
            .collect();
        for other in others {
            other.disconnect_session(ErrorCode::Ok);
            if self.shutdown.is_cancelled() {
                debug!("Host destroyed while disconnecting superseded clients");
                return;
            }
        }
        debug_assert!(
            self.clients
                .borrow()
                .iter()
                .filter(|c| c.is_authenticated())
                .count()
                <= 1
        );

        info!(
            conn_id = %session.conn_id(),
            client = %session.client_jid(),
            "Client authenticated"
        );
        session.mark_announced();
        let jid = session.client_jid();
        self.status_observers
            .notify(|o| o.on_client_authenticated(jid));
    }

    fn on_session_channels_connected(&self, session: &Rc<ClientSession>) {
        debug!(conn_id = %session.conn_id(), client = %session.client_jid(), "Client channels connected");
        let jid = session.client_jid();
        self.status_observers.notify(|o| o.on_client_connected(jid));
    }

    fn on_session_authentication_failed(&self, session: &Rc<ClientSession>) {
        warn!(
            conn_id = %session.conn_id(),
            client = %session.client_jid(),
            "Access denied"
        );
        let jid = session.client_jid();
        self.status_observers.notify(|o| o.on_access_denied(jid));
    }

    fn on_session_closed(&self, session: &Rc<ClientSession>) {
        let removed = {
            let mut clients = self.clients.borrow_mut();
            clients
                .iter()
                .position(|c| Rc::ptr_eq(c, session))
                .map(|index| clients.remove(index))
        };
        let Some(client) = removed else {
            panic!(
                "session close reported for untracked client {} ({})",
                session.client_jid(),
                session.conn_id()
            );
        };

        debug!(
            conn_id = %client.conn_id(),
            remaining = self.clients.borrow().len(),
            "Client removed"
        );
        if client.was_announced() {
            let jid = client.client_jid();
            self.status_observers
                .notify(|o| o.on_client_disconnected(jid));
        }
    }

    fn on_session_route_change(
        &self,
        session: &Rc<ClientSession>,
        channel_name: &str,
        route: &TransportRoute,
    ) {
        let jid = session.client_jid();
        self.status_observers
            .notify(|o| o.on_client_route_change(jid, channel_name, route));
    }
}

/// Optional host feature negotiated with clients through capabilities.
///
/// The host keeps extensions for its whole lifetime and hands the current
/// list to every new client session.
pub trait HostExtension {
    /// Capability advertised to clients. Empty when none.
    fn capability(&self) -> &str;

    /// Called once a client's channels are connected. Returning `None`
    /// means the extension does not take part in this session.
    fn create_extension_session(&self, client_jid: &str) -> Option<Box<dyn HostExtensionSession>>;
}

/// Per-client state of a [`HostExtension`].
pub trait HostExtensionSession {
    /// Handle an extension message. Returns true if it was consumed.
    fn on_extension_message(&mut self, message_type: &str, data: &str) -> bool;
}

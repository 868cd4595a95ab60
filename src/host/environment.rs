/// Per-session desktop capture and input injection environment.
pub trait DesktopEnvironment {
    /// Space-separated capabilities this environment offers to the client.
    fn capabilities(&self) -> String {
        String::new()
    }
}

/// Creates desktop environments for authenticated clients.
pub trait DesktopEnvironmentFactory {
    /// `None` means the environment could not be created; the session is
    /// then disconnected with a configuration error.
    fn create(&self, client_jid: &str) -> Option<Box<dyn DesktopEnvironment>>;

    /// Blank and lock the local console while a client is connected.
    fn set_enable_curtaining(&self, enable: bool);
}

/// Store of previously trusted client pairings. Passed through to client
/// sessions untouched.
pub trait PairingRegistry {
    fn is_paired(&self, client_id: &str) -> bool;
}

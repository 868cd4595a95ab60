use crate::host::DesktopEnvironmentFactory;
use crate::protocol::{ConnectionFactory, SessionManager};
use std::rc::Rc;

/// Collaborators a host is built from, replacing scattered constructor
/// parameters.
pub struct HostContext {
    pub session_manager: Box<dyn SessionManager>,
    pub connection_factory: Rc<dyn ConnectionFactory>,
    pub desktop_environment_factory: Rc<dyn DesktopEnvironmentFactory>,
}

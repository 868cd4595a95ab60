use crate::protocol::TransportRoute;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Listener for host and client lifecycle events.
///
/// Every method has an empty default so observers implement only what they
/// need. Callbacks may re-enter the host, including adding or removing
/// observers and destroying the host itself.
pub trait HostStatusObserver {
    /// The host started accepting sessions on behalf of `owner_email`.
    fn on_start(&self, _owner_email: &str) {}

    /// `jid` authenticated and is now the host's only active client.
    fn on_client_authenticated(&self, _jid: &str) {}

    /// All channels of `jid` are up.
    fn on_client_connected(&self, _jid: &str) {}

    /// `jid` closed without ever authenticating.
    fn on_access_denied(&self, _jid: &str) {}

    /// An authenticated client went away.
    fn on_client_disconnected(&self, _jid: &str) {}

    fn on_client_route_change(&self, _jid: &str, _channel_name: &str, _route: &TransportRoute) {}

    fn on_shutdown(&self) {}
}

/// Ordered set of weakly held observers.
///
/// Notification walks a snapshot of the list. Before each callout the
/// observer is checked against the live list, so one removed by an earlier
/// callback in the same pass is skipped, and one added during the pass is
/// only reached from the next notification on.
#[derive(Default)]
pub struct StatusObserverList {
    observers: RefCell<Vec<Weak<dyn HostStatusObserver>>>,
}

impl StatusObserverList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `observer`. The list does not keep it alive.
    pub fn add(&self, observer: &Rc<dyn HostStatusObserver>) {
        let mut observers = self.observers.borrow_mut();
        observers.retain(|w| w.strong_count() > 0);
        let weak = Rc::downgrade(observer);
        if !observers.iter().any(|w| w.ptr_eq(&weak)) {
            observers.push(weak);
        }
    }

    pub fn remove(&self, observer: &Rc<dyn HostStatusObserver>) {
        let weak = Rc::downgrade(observer);
        self.observers.borrow_mut().retain(|w| !w.ptr_eq(&weak));
    }

    /// Number of registered observers still alive.
    pub fn len(&self) -> usize {
        self.observers
            .borrow()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call `f` on every observer registered when the pass started and still
    /// registered when its turn comes.
    pub fn notify(&self, mut f: impl FnMut(&dyn HostStatusObserver)) {
        let snapshot: Vec<Weak<dyn HostStatusObserver>> = self.observers.borrow().clone();
        for weak in snapshot {
            if !self.contains(&weak) {
                continue;
            }
            if let Some(observer) = weak.upgrade() {
                f(observer.as_ref());
            }
        }
    }

    fn contains(&self, weak: &Weak<dyn HostStatusObserver>) -> bool {
        self.observers.borrow().iter().any(|w| w.ptr_eq(weak))
    }
}

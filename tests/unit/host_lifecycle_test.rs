mod test_support;

use chromoting_host::host::{HostStatusObserver, PairingRegistry};
use chromoting_host::protocol::ErrorCode;
use std::rc::Rc;
use test_support::{client, CloseMode, RecordingObserver, TestHost, OWNER};

// ===========================================================================
// Curtain mode
// ===========================================================================

#[test]
fn enabling_curtain_disconnects_authenticated_client() {
    let t = TestHost::started();
    t.transport.connect(&client("alice"));
    t.transport.authenticate(0);

    t.host().set_enable_curtaining(true);

    assert!(t.host().enable_curtaining());
    assert_eq!(t.transport.disconnects(0), vec![ErrorCode::Ok]);
    assert_eq!(t.host().client_count(), 0);
    assert_eq!(*t.desktop.curtain_calls.borrow(), vec![true]);
}

#[test]
fn enabling_curtain_twice_disconnects_once() {
    let t = TestHost::started();
    t.transport.connect(&client("alice"));
    t.transport.authenticate(0);
    t.host().set_enable_curtaining(true);

    t.transport.connect(&client("bob"));
    t.transport.authenticate(1);
    t.host().set_enable_curtaining(true);

    assert_eq!(t.transport.disconnects(0), vec![ErrorCode::Ok]);
    assert!(t.transport.disconnects(1).is_empty());
    assert_eq!(t.host().authenticated_client().unwrap().client_jid(), client("bob"));
    assert_eq!(*t.desktop.curtain_calls.borrow(), vec![true]);
}

#[test]
fn disabling_curtain_keeps_clients() {
    let t = TestHost::started();
    t.host().set_enable_curtaining(true);
    t.transport.connect(&client("alice"));
    t.transport.authenticate(0);

    t.host().set_enable_curtaining(false);

    assert!(!t.host().enable_curtaining());
    assert!(t.transport.disconnects(0).is_empty());
    assert_eq!(*t.desktop.curtain_calls.borrow(), vec![true, false]);
}

#[test]
fn enabling_curtain_with_deferred_closes_disconnects_each_client_once() {
    let t = TestHost::started();
    t.transport.set_close_mode(CloseMode::Deferred);
    t.transport.connect(&client("alice"));
    t.transport.connect(&client("bob"));

    t.host().set_enable_curtaining(true);
    t.host().set_enable_curtaining(false);
    t.host().set_enable_curtaining(true);

    assert_eq!(t.transport.disconnects(0), vec![ErrorCode::Ok]);
    assert_eq!(t.transport.disconnects(1), vec![ErrorCode::Ok]);
    t.transport.flush_closes();
    assert_eq!(t.host().client_count(), 0);
}

// ===========================================================================
// Shutdown
// ===========================================================================

#[test]
fn shutdown_disconnects_every_client() {
    let mut t = TestHost::started();
    t.transport.connect(&client("alice"));
    t.transport.authenticate(0);
    t.transport.connect(&client("bob"));
    t.transport.connect(&client("carol"));

    t.destroy();

    assert_eq!(t.transport.total_disconnects(), 3);
    for index in 0..3 {
        assert_eq!(t.transport.disconnects(index), vec![ErrorCode::Ok]);
        assert!(!t.transport.handle(index).is_alive());
    }
    let events = t.observer.events();
    assert_eq!(events.last().unwrap(), "shutdown");
    assert_eq!(t.observer.count(&format!("disconnected:{}", client("alice"))), 1);
    assert_eq!(t.observer.count("access_denied:"), 2);
}

#[test]
fn shutdown_releases_clients_whose_close_is_deferred() {
    let mut t = TestHost::started();
    t.transport.set_close_mode(CloseMode::Deferred);
    t.transport.connect(&client("alice"));
    t.transport.authenticate(0);
    t.transport.connect(&client("bob"));

    t.destroy();

    assert_eq!(t.transport.total_disconnects(), 2);
    assert!(!t.transport.handle(0).is_alive());
    assert!(!t.transport.handle(1).is_alive());

    // Closes reported after the host is gone go nowhere.
    t.transport.flush_closes();
    assert_eq!(t.observer.count("disconnected:"), 0);
    assert_eq!(t.observer.events().last().unwrap(), "shutdown");
}

#[test]
fn unstarted_host_does_not_report_shutdown() {
    let mut t = TestHost::new();
    t.destroy();
    assert!(t.observer.events().is_empty());
}

#[test]
fn shutdown_with_no_clients_reports_start_and_shutdown() {
    let mut t = TestHost::started();
    t.destroy();
    assert_eq!(
        t.observer.events(),
        vec![format!("start:{OWNER}"), "shutdown".to_string()]
    );
}

// ===========================================================================
// Access denied and disconnects
// ===========================================================================

#[test]
fn failed_authentication_reports_access_denied() {
    let t = TestHost::started();
    t.transport.connect(&client("mallory"));
    t.transport.authenticating(0);

    t.transport.close(0, ErrorCode::AuthenticationFailed);

    assert_eq!(t.host().client_count(), 0);
    assert_eq!(
        t.observer.events()[1..],
        [format!("access_denied:{}", client("mallory"))]
    );
    // The attempt was already counted when it began.
    assert_eq!(t.host().login_backoff().failure_count(), 1);
}

#[test]
fn authenticated_client_closing_reports_disconnect() {
    let t = TestHost::started();
    t.transport.connect(&client("alice"));
    t.transport.authenticate(0);
    t.transport.channels_connected(0);

    t.transport.close(0, ErrorCode::Ok);

    assert_eq!(
        t.observer.events()[1..],
        [
            format!("authenticated:{}", client("alice")),
            format!("connected:{}", client("alice")),
            format!("disconnected:{}", client("alice")),
        ]
    );
    assert!(!t.transport.handle(0).is_alive());
}

#[test]
fn repeated_close_reports_once() {
    let t = TestHost::started();
    t.transport.connect(&client("alice"));
    t.transport.authenticate(0);
    let handle = t.transport.handle(0);
    let session = handle.session().unwrap();

    handle.on_connection_closed(ErrorCode::Ok);
    handle.on_connection_closed(ErrorCode::Ok);

    assert_eq!(t.observer.count("disconnected:"), 1);
    drop(session);
    assert!(!handle.is_alive());
}

// ===========================================================================
// Observers
// ===========================================================================

#[test]
fn removed_observer_is_not_notified() {
    let t = TestHost::started();
    let extra = RecordingObserver::new();
    let as_dyn: Rc<dyn HostStatusObserver> = extra.clone();
    t.host().add_status_observer(as_dyn.clone());
    t.transport.connect(&client("alice"));
    t.transport.authenticate(0);

    t.host().remove_status_observer(as_dyn);
    t.transport.close(0, ErrorCode::Ok);

    assert_eq!(extra.events(), vec![format!("authenticated:{}", client("alice"))]);
    assert_eq!(t.observer.count("disconnected:"), 1);
}

#[test]
fn dropped_observer_is_skipped() {
    let t = TestHost::started();
    let extra = RecordingObserver::new();
    t.host().add_status_observer(extra.clone());
    drop(extra);

    t.transport.connect(&client("alice"));
    t.transport.authenticate(0);

    assert_eq!(t.observer.count("authenticated:"), 1);
}

// ===========================================================================
// Configuration passed to new sessions
// ===========================================================================

struct AlwaysPaired;

impl PairingRegistry for AlwaysPaired {
    fn is_paired(&self, _client_id: &str) -> bool {
        true
    }
}

#[test]
fn pairing_registry_reaches_new_sessions() {
    let t = TestHost::started();
    t.transport.connect(&client("alice"));
    t.host().set_pairing_registry(Some(Rc::new(AlwaysPaired)));
    t.transport.connect(&client("bob"));

    let clients = t.host().clients();
    assert!(clients[0].pairing_registry().is_none());
    assert!(clients[1]
        .pairing_registry()
        .is_some_and(|r| r.is_paired("bob-client-id")));
}

#[test]
fn extensions_are_owned_by_host() {
    let t = TestHost::started();
    assert_eq!(t.host().extension_count(), 0);
    t.host().add_extension(Box::new(test_support::FakeExtension {
        capability: "sendAttentionSequence".to_string(),
        message_type: "sas".to_string(),
    }));
    assert_eq!(t.host().extension_count(), 1);
}

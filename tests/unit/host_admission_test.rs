mod test_support;

use chromoting_host::protocol::{ErrorCode, IncomingSessionResponse, TransportProtocol};
use std::time::Duration;
use test_support::{client, CloseMode, FakeSession, TestHost, OWNER};

// ===========================================================================
// Start
// ===========================================================================

#[test]
fn start_registers_admission_callback_and_notifies() {
    let t = TestHost::new();
    assert!(!t.transport.has_handler());
    assert!(!t.host().is_started());

    t.host().start(OWNER);

    assert!(t.host().is_started());
    assert!(t.transport.has_handler());
    assert_eq!(t.observer.events(), vec![format!("start:{OWNER}")]);
}

#[test]
#[should_panic(expected = "start called twice")]
fn start_twice_panics() {
    let t = TestHost::started();
    t.host().start(OWNER);
}

#[test]
fn incoming_session_before_start_is_declined() {
    let t = TestHost::new();
    let response = t
        .host()
        .on_incoming_session(FakeSession::boxed(&client("alice"), TransportProtocol::Ice));
    assert_eq!(response, IncomingSessionResponse::Decline);
    assert_eq!(t.host().client_count(), 0);
    assert_eq!(t.transport.connection_count(), 0);
}

// ===========================================================================
// Accept
// ===========================================================================

#[test]
fn incoming_session_is_accepted() {
    let t = TestHost::started();

    assert_eq!(t.transport.connect(&client("alice")), IncomingSessionResponse::Accept);

    assert_eq!(t.host().client_count(), 1);
    let clients = t.host().clients();
    assert_eq!(clients[0].client_jid(), client("alice"));
    assert_eq!(clients[0].protocol(), TransportProtocol::Ice);
    assert!(!clients[0].is_authenticated());
    assert_eq!(clients[0].conn_id().len(), 8);
}

#[test]
fn webrtc_session_uses_webrtc_connection() {
    let t = TestHost::started();
    t.transport.ice_supported.set(false);

    let response = t.transport.offer(&client("alice"), TransportProtocol::Webrtc);

    assert_eq!(response, IncomingSessionResponse::Accept);
    assert_eq!(t.host().clients()[0].protocol(), TransportProtocol::Webrtc);
}

#[test]
fn unsupported_transport_is_incompatible() {
    let t = TestHost::started();
    t.transport.webrtc_supported.set(false);

    let response = t.transport.offer(&client("alice"), TransportProtocol::Webrtc);

    assert_eq!(response, IncomingSessionResponse::Incompatible);
    assert_eq!(t.host().client_count(), 0);
}

#[test]
fn transport_outside_allowed_set_is_incompatible() {
    let t = TestHost::started();
    t.host().set_allowed_protocols(&[TransportProtocol::Ice]);

    let webrtc = t.transport.offer(&client("alice"), TransportProtocol::Webrtc);
    let ice = t.transport.offer(&client("bob"), TransportProtocol::Ice);

    assert_eq!(webrtc, IncomingSessionResponse::Incompatible);
    assert_eq!(ice, IncomingSessionResponse::Accept);
    assert_eq!(t.host().client_count(), 1);
    assert_eq!(t.host().clients()[0].client_jid(), client("bob"));
}

#[test]
fn accepting_touches_no_backoff_state() {
    let t = TestHost::started();
    for name in ["alice", "bob", "carol"] {
        assert_eq!(t.transport.connect(&client(name)), IncomingSessionResponse::Accept);
    }
    assert_eq!(t.host().login_backoff().failure_count(), 0);
    assert!(!t.host().is_login_backoff_active());
}

// ===========================================================================
// Backoff rejections
// ===========================================================================

#[test]
fn incoming_session_during_backoff_is_overload() {
    let t = TestHost::started();
    t.transport.connect(&client("alice"));
    t.transport.authenticating(0);
    t.transport.close(0, ErrorCode::AuthenticationFailed);
    assert!(t.host().is_login_backoff_active());

    let response = t.transport.connect(&client("bob"));

    assert_eq!(response, IncomingSessionResponse::Overload);
    assert_eq!(t.host().client_count(), 0);
    assert_eq!(t.transport.connection_count(), 1);
}

#[test]
fn authenticating_during_backoff_is_disconnected_with_host_overload() {
    let t = TestHost::started();
    t.transport.connect(&client("alice"));
    t.transport.connect(&client("bob"));

    t.transport.authenticating(0);
    t.transport.authenticating(1);

    assert_eq!(t.transport.disconnects(1), vec![ErrorCode::HostOverload]);
    assert!(t.transport.disconnects(0).is_empty());
    // The rejected attempt is not counted on top of the first one.
    assert_eq!(t.host().login_backoff().failure_count(), 1);
    assert_eq!(t.host().client_count(), 1);
}

/// Ten failed attempts spaced past each backoff window, then an eleventh
/// from a different client inside the window.
#[tokio::test(start_paused = true)]
async fn eleventh_attempt_within_window_is_host_overload() {
    let t = TestHost::started();
    assert_eq!(t.transport.connect(&client("mallory")), IncomingSessionResponse::Accept);

    for attempt in 0..10 {
        let index = t.transport.connection_count();
        assert_eq!(
            t.transport.connect(&client(&format!("guess{attempt}"))),
            IncomingSessionResponse::Accept,
            "attempt {attempt} should be admitted once the window has passed"
        );
        t.transport.authenticating(index);
        t.transport.close(index, ErrorCode::AuthenticationFailed);
        assert!(t.host().is_login_backoff_active());

        let wait = t.host().login_backoff().time_until_release();
        tokio::time::advance(wait + Duration::from_millis(1)).await;
    }
    assert_eq!(t.host().login_backoff().failure_count(), 10);

    // Re-open the window with one more failure, then let mallory try.
    let index = t.transport.connection_count();
    t.transport.connect(&client("eve"));
    t.transport.authenticating(index);
    assert!(t.host().is_login_backoff_active());

    t.transport.authenticating(0);

    assert_eq!(t.transport.disconnects(0), vec![ErrorCode::HostOverload]);
    assert_eq!(
        t.transport.connect(&client("trudy")),
        IncomingSessionResponse::Overload
    );
}

#[tokio::test(start_paused = true)]
async fn sessions_admitted_again_after_window_elapses() {
    let t = TestHost::started();
    t.transport.connect(&client("alice"));
    t.transport.authenticating(0);
    t.transport.close(0, ErrorCode::AuthenticationFailed);
    assert_eq!(t.transport.connect(&client("bob")), IncomingSessionResponse::Overload);

    tokio::time::advance(Duration::from_millis(2001)).await;

    assert_eq!(t.transport.connect(&client("bob")), IncomingSessionResponse::Accept);
}

// ===========================================================================
// Destroyed host
// ===========================================================================

#[test]
fn admission_callback_declines_after_host_destroyed() {
    let mut t = TestHost::started();
    t.destroy();

    assert!(t.transport.has_handler());
    assert_eq!(t.transport.connect(&client("alice")), IncomingSessionResponse::Decline);
    assert_eq!(t.transport.connection_count(), 0);
}

#[test]
fn deferred_close_mode_keeps_session_tracked_until_reported() {
    let t = TestHost::started();
    t.transport.set_close_mode(CloseMode::Deferred);
    t.transport.connect(&client("alice"));

    t.host().clients()[0].disconnect_session(ErrorCode::Ok);
    assert_eq!(t.host().client_count(), 1);

    t.transport.flush_closes();
    assert_eq!(t.host().client_count(), 0);
}

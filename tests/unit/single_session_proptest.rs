mod test_support;

use chromoting_host::protocol::ErrorCode;
use proptest::prelude::*;
use test_support::{client, CloseMode, TestHost};

#[derive(Debug, Clone)]
enum Op {
    Connect(u8),
    Authenticating(usize),
    Authenticated(usize),
    ChannelsConnected(usize),
    Close(usize),
    Flush,
    Curtain(bool),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..4).prop_map(Op::Connect),
        (0usize..16).prop_map(Op::Authenticating),
        (0usize..16).prop_map(Op::Authenticated),
        (0usize..16).prop_map(Op::ChannelsConnected),
        (0usize..16).prop_map(Op::Close),
        Just(Op::Flush),
        any::<bool>().prop_map(Op::Curtain),
    ]
}

fn run(ops: &[Op], close_mode: CloseMode) -> Result<(), TestCaseError> {
    let t = TestHost::started();
    t.transport.set_close_mode(close_mode);

    for op in ops {
        let connections = t.transport.connection_count();
        match *op {
            Op::Connect(n) => {
                t.transport.connect(&client(&format!("user{n}")));
            }
            Op::Authenticating(i) if i < connections => t.transport.authenticating(i),
            Op::Authenticated(i) if i < connections => {
                t.transport.handle(i).on_connection_authenticated()
            }
            Op::ChannelsConnected(i) if i < connections => t.transport.channels_connected(i),
            Op::Close(i) if i < connections => t.transport.close(i, ErrorCode::Ok),
            Op::Flush => t.transport.flush_closes(),
            Op::Curtain(enable) => t.host().set_enable_curtaining(enable),
            _ => {}
        }
        prop_assert!(
            t.authenticated_count() <= 1,
            "more than one authenticated client after {:?}",
            op
        );
    }

    t.transport.flush_closes();
    prop_assert!(t.authenticated_count() <= 1);
    prop_assert!(t.observer.count("disconnected:") <= t.observer.count("authenticated:"));
    Ok(())
}

proptest! {
    #[test]
    fn at_most_one_authenticated_client_sync_close(
        ops in prop::collection::vec(op_strategy(), 1..60)
    ) {
        run(&ops, CloseMode::Sync)?;
    }

    #[test]
    fn at_most_one_authenticated_client_deferred_close(
        ops in prop::collection::vec(op_strategy(), 1..60)
    ) {
        run(&ops, CloseMode::Deferred)?;
    }

    #[test]
    fn shutdown_drains_all_clients(
        ops in prop::collection::vec(op_strategy(), 1..40)
    ) {
        let mut t = TestHost::started();
        t.transport.set_close_mode(CloseMode::Deferred);
        for op in &ops {
            if let Op::Connect(n) = op {
                t.transport.connect(&client(&format!("user{n}")));
            }
        }
        let connections = t.transport.connection_count();
        t.destroy();
        for i in 0..connections {
            prop_assert!(!t.transport.handle(i).is_alive());
        }
    }
}

//! Engine attachment: wiring cognitive engines to the relay.

pub mod local;

use std::thread::JoinHandle;

pub use local::{AttachError, LocalEngineTransport};

use crate::relay::Relay;
use crate::traits::CognitiveEngine;

/// Attaches `engine` for `filter` and announces the filter to the relay.
///
/// Connected clients gain a counter for the filter; clients connecting
/// afterwards see it in their welcome.
///
/// # Errors
///
/// See [`LocalEngineTransport::attach`]. The relay is not touched on error.
pub fn attach_engine<E>(
    relay: &Relay,
    transport: &LocalEngineTransport,
    filter: &str,
    engine: E,
) -> Result<JoinHandle<()>, AttachError>
where
    E: CognitiveEngine,
{
    let handle = transport.attach(filter, engine)?;
    relay.add_filter_consumed(filter);
    Ok(handle)
}

/// Withdraws `filter` from the relay, then stops its engine.
///
/// Returns `false` if no engine was attached. Results still in flight are
/// dispatched, but no token is refunded for them.
pub fn detach_engine(relay: &Relay, transport: &LocalEngineTransport, filter: &str) -> bool {
    relay.remove_filter_consumed(filter);
    transport.detach(filter)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use gabriel_core::{codec, FromClient, ResultWrapper, Status, ToClient};

    use super::*;
    use crate::network::ConnectionConfig;
    use crate::relay::testing::{identity, next_message};
    use crate::relay::{FrameOutcome, RelayConfig};
    use crate::traits::EngineTransport;

    fn setup() -> (Arc<Relay>, Arc<LocalEngineTransport>) {
        let transport = Arc::new(LocalEngineTransport::new(2));
        let relay = Arc::new(Relay::new(
            RelayConfig::default(),
            ConnectionConfig::default(),
            Arc::clone(&transport) as Arc<dyn EngineTransport>,
        ));
        (relay, transport)
    }

    fn ok(input: FromClient) -> ResultWrapper {
        ResultWrapper::success(input.frame_id, input.filter_passed, Vec::new())
    }

    #[tokio::test]
    async fn frame_round_trips_through_attached_engine() {
        let (relay, transport) = setup();
        attach_engine(&relay, &transport, "faces", ok).unwrap();
        assert_eq!(relay.filters_consumed(), vec!["faces"]);

        let (session, mut rx) = relay.connect(identity(1)).unwrap();
        next_message(&mut rx);

        let raw = codec::encode(&FromClient::new(1, "faces", vec![0])).unwrap();
        assert_eq!(relay.handle_frame(&session, &raw).await, FrameOutcome::Forwarded);
        assert_eq!(session.tokens("faces"), Some(1));

        let from_engine = tokio::time::timeout(Duration::from_secs(5), transport.recv_from_engine())
            .await
            .unwrap()
            .unwrap();
        relay.dispatch_result(from_engine).await;

        assert_eq!(session.tokens("faces"), Some(2));
        match next_message(&mut rx) {
            Some(ToClient::Result(wrapper)) => {
                assert_eq!(wrapper.frame_id, 1);
                assert_eq!(wrapper.status, Status::SUCCESS);
            }
            other => panic!("expected result, got {other:?}"),
        }
        transport.close();
    }

    #[tokio::test]
    async fn failed_attach_leaves_relay_untouched() {
        let (relay, transport) = setup();
        attach_engine(&relay, &transport, "faces", ok).unwrap();
        relay.remove_filter_consumed("faces");

        assert!(attach_engine(&relay, &transport, "faces", ok).is_err());
        assert!(relay.filters_consumed().is_empty());
        transport.close();
    }

    #[tokio::test]
    async fn detach_withdraws_filter_from_clients() {
        let (relay, transport) = setup();
        attach_engine(&relay, &transport, "faces", ok).unwrap();
        let (session, _rx) = relay.connect(identity(1)).unwrap();

        assert!(detach_engine(&relay, &transport, "faces"));
        assert_eq!(session.tokens("faces"), None);
        assert!(relay.filters_consumed().is_empty());
        assert!(!detach_engine(&relay, &transport, "faces"));
        transport.close();
    }
}

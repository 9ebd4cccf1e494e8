//! Client -> engine path.

use gabriel_core::{codec, recover_frame_id, FromClient, ResultWrapper, Status, ToEngine};
use tracing::{debug, error, warn};

use super::ledger::AcquireError;
use super::session::ClientSession;
use super::Relay;
use crate::traits::SubmitError;

/// What happened to one client frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Handed to the engine transport; one token is now outstanding.
    Forwarded,
    /// Refused; the wrapper is the error reply owed to the client.
    Rejected(ResultWrapper),
    /// Unreadable, with no frame id to address a reply to.
    Dropped,
}

impl Relay {
    /// Processes one raw frame received from `session`'s connection.
    ///
    /// A frame is forwarded only if it decodes, its filter is consumed, and
    /// the client holds a token on that filter. A token is consumed only by
    /// a frame the engine transport accepted: when submission fails the
    /// token is refunded before returning.
    pub async fn handle_frame(&self, session: &ClientSession, raw: &[u8]) -> FrameOutcome {
        let identity = session.identity();

        let from_client: FromClient = match codec::decode(raw) {
            Ok(from_client) => from_client,
            Err(err) => {
                return match recover_frame_id(raw) {
                    Some(frame_id) => {
                        warn!(%identity, frame_id, error = %err, "Malformed frame");
                        FrameOutcome::Rejected(ResultWrapper::error(
                            frame_id,
                            String::new(),
                            Status::WRONG_INPUT_FORMAT,
                        ))
                    }
                    None => {
                        warn!(%identity, error = %err, "Dropping undecodable frame");
                        FrameOutcome::Dropped
                    }
                };
            }
        };

        let frame_id = from_client.frame_id;
        let filter = from_client.filter_passed.clone();
        debug!(%identity, frame_id, filter = %filter, "Received input");

        let acquired = session.ledger().try_acquire(&filter);
        if let Err(err) = acquired {
            let status = match err {
                AcquireError::NoEngineForFilter => {
                    error!(%identity, frame_id, "No engines consume frames from {filter}");
                    Status::NO_ENGINE_FOR_FILTER_PASSED
                }
                AcquireError::NoTokens => {
                    error!(%identity, frame_id, "Client sending output of filter {filter} without tokens");
                    Status::NO_TOKENS
                }
            };
            return FrameOutcome::Rejected(ResultWrapper::error(frame_id, filter, status));
        }

        let to_engine = ToEngine {
            origin: identity,
            from_client,
        };
        match self.transport.send_to_engine(to_engine).await {
            Ok(()) => FrameOutcome::Forwarded,
            Err(err) => {
                session.ledger().refund(&filter);
                error!(%identity, frame_id, error = %err, "Send to engine(s) that consume {filter} failed");
                let status = match err {
                    SubmitError::Full => Status::QUEUE_FULL,
                    SubmitError::NoEngine(_) | SubmitError::Closed => Status::SERVER_DROPPED_FRAME,
                };
                FrameOutcome::Rejected(ResultWrapper::error(frame_id, filter, status))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use gabriel_core::{codec, FromClient};
    use serde::Serialize;

    use super::*;
    use crate::relay::testing::{identity, relay_with, RecordingTransport};

    fn frame(frame_id: u64, filter: &str) -> Vec<u8> {
        codec::encode(&FromClient::new(frame_id, filter, vec![1, 2, 3])).unwrap()
    }

    fn rejected_status(outcome: &FrameOutcome) -> Option<Status> {
        match outcome {
            FrameOutcome::Rejected(reply) => Some(reply.status),
            _ => None,
        }
    }

    #[tokio::test]
    async fn tokens_exhausted_after_allotment() {
        let transport = Arc::new(RecordingTransport::default());
        let relay = relay_with(Arc::clone(&transport), 2);
        relay.add_filter_consumed("faces");
        let (session, _rx) = relay.connect(identity(1)).unwrap();

        assert_eq!(relay.handle_frame(&session, &frame(1, "faces")).await, FrameOutcome::Forwarded);
        assert_eq!(session.tokens("faces"), Some(1));
        assert_eq!(relay.handle_frame(&session, &frame(2, "faces")).await, FrameOutcome::Forwarded);
        assert_eq!(session.tokens("faces"), Some(0));

        let third = relay.handle_frame(&session, &frame(3, "faces")).await;
        assert_eq!(
            third,
            FrameOutcome::Rejected(ResultWrapper::error(3, "faces", Status::NO_TOKENS))
        );
        assert_eq!(session.tokens("faces"), Some(0));
        assert_eq!(transport.submitted_count(), 2);
    }

    #[tokio::test]
    async fn full_queue_leaves_tokens_unchanged() {
        let transport = Arc::new(RecordingTransport::with_capacity(2));
        let relay = relay_with(Arc::clone(&transport), 5);
        relay.add_filter_consumed("faces");
        let (session, _rx) = relay.connect(identity(1)).unwrap();

        relay.handle_frame(&session, &frame(1, "faces")).await;
        relay.handle_frame(&session, &frame(2, "faces")).await;
        assert_eq!(session.tokens("faces"), Some(3));

        let third = relay.handle_frame(&session, &frame(3, "faces")).await;
        assert_eq!(rejected_status(&third), Some(Status::QUEUE_FULL));
        assert_eq!(session.tokens("faces"), Some(3));
        assert_eq!(session.ledger().outstanding("faces"), Some(2));
    }

    #[tokio::test]
    async fn unconsumed_filter_rejected_without_token() {
        let transport = Arc::new(RecordingTransport::default());
        let relay = relay_with(Arc::clone(&transport), 2);
        relay.add_filter_consumed("ocr");
        let (session, _rx) = relay.connect(identity(1)).unwrap();

        let outcome = relay.handle_frame(&session, &frame(4, "faces")).await;
        assert_eq!(
            outcome,
            FrameOutcome::Rejected(ResultWrapper::error(
                4,
                "faces",
                Status::NO_ENGINE_FOR_FILTER_PASSED
            ))
        );
        assert_eq!(session.tokens("ocr"), Some(2));
        assert_eq!(transport.submitted_count(), 0);
    }

    #[tokio::test]
    async fn refused_submission_drops_frame_and_refunds() {
        for err in [SubmitError::Closed, SubmitError::NoEngine("faces".into())] {
            let relay = relay_with(RecordingTransport::refusing(err), 2);
            relay.add_filter_consumed("faces");
            let (session, _rx) = relay.connect(identity(1)).unwrap();

            let outcome = relay.handle_frame(&session, &frame(1, "faces")).await;
            assert_eq!(rejected_status(&outcome), Some(Status::SERVER_DROPPED_FRAME));
            assert_eq!(session.tokens("faces"), Some(2));
            assert_eq!(session.ledger().outstanding("faces"), Some(0));
        }
    }

    #[tokio::test]
    async fn forwarded_envelope_carries_origin() {
        let transport = Arc::new(RecordingTransport::default());
        let relay = relay_with(Arc::clone(&transport), 2);
        relay.add_filter_consumed("faces");
        let (session, _rx) = relay.connect(identity(7)).unwrap();

        relay.handle_frame(&session, &frame(12, "faces")).await;

        let submitted = transport.submitted.lock();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].origin, identity(7));
        assert_eq!(submitted[0].from_client.frame_id, 12);
        assert_eq!(submitted[0].filter_passed(), "faces");
    }

    #[tokio::test]
    async fn late_filter_usable_on_next_frame() {
        let transport = Arc::new(RecordingTransport::default());
        let relay = relay_with(Arc::clone(&transport), 2);
        let (session, _rx) = relay.connect(identity(1)).unwrap();

        let before = relay.handle_frame(&session, &frame(1, "faces")).await;
        assert_eq!(rejected_status(&before), Some(Status::NO_ENGINE_FOR_FILTER_PASSED));

        relay.add_filter_consumed("faces");
        let after = relay.handle_frame(&session, &frame(2, "faces")).await;
        assert_eq!(after, FrameOutcome::Forwarded);
        assert_eq!(session.tokens("faces"), Some(1));
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct MistypedFrame {
        frame_id: u64,
        filter_passed: Vec<u32>,
    }

    #[tokio::test]
    async fn malformed_frame_with_id_gets_wrong_input_format() {
        let relay = relay_with(RecordingTransport::default(), 2);
        relay.add_filter_consumed("faces");
        let (session, _rx) = relay.connect(identity(1)).unwrap();

        let raw = codec::encode(&MistypedFrame {
            frame_id: 77,
            filter_passed: vec![1, 2],
        })
        .unwrap();
        let outcome = relay.handle_frame(&session, &raw).await;

        let FrameOutcome::Rejected(reply) = outcome else {
            panic!("expected a rejection, got {outcome:?}");
        };
        assert_eq!(reply.frame_id, 77);
        assert_eq!(reply.status, Status::WRONG_INPUT_FORMAT);
        assert_eq!(session.tokens("faces"), Some(2));
    }

    #[tokio::test]
    async fn garbage_frame_is_dropped() {
        let relay = relay_with(RecordingTransport::default(), 2);
        let (session, _rx) = relay.connect(identity(1)).unwrap();

        let outcome = relay.handle_frame(&session, &[0xc1, 0x00, 0xff]).await;
        assert_eq!(outcome, FrameOutcome::Dropped);
    }
}

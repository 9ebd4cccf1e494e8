//! Engine -> client path.

use gabriel_core::{FromEngine, ToClient};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::Relay;

/// What happened to one engine result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Queued on the origin client's outbound queue.
    Delivered,
    /// The origin client is not connected; the result was dropped.
    UnknownClient,
    /// The origin client's queue was full or closed; the result was
    /// dropped. The token was still refunded.
    Undeliverable,
}

impl Relay {
    /// Routes one engine result to the client that sent the frame.
    ///
    /// The origin gets one token back on the result's filter before the
    /// result is queued. Results for clients that are gone are dropped with
    /// a warning and touch no state.
    ///
    /// Never waits on a client's queue: a client that is not reading loses
    /// its result instead of delaying results for everyone else.
    pub async fn dispatch_result(&self, from_engine: FromEngine) -> DispatchOutcome {
        let FromEngine {
            origin,
            result_wrapper,
        } = from_engine;

        let Some(session) = self.session(origin) else {
            warn!(%origin, frame_id = result_wrapper.frame_id, "Result for nonexistent address");
            return DispatchOutcome::UnknownClient;
        };

        let refunded = session.ledger().refund(&result_wrapper.filter_passed);
        if !refunded {
            debug!(
                %origin,
                filter = %result_wrapper.filter_passed,
                "No outstanding token for result; counter left unchanged"
            );
        }

        let frame_id = result_wrapper.frame_id;
        let msg = ToClient::Result(result_wrapper);
        match session.try_send_message(&msg) {
            Ok(()) => DispatchOutcome::Delivered,
            Err(err) => {
                warn!(%origin, frame_id, error = ?err, "Dropping result: client queue unavailable");
                DispatchOutcome::Undeliverable
            }
        }
    }

    /// Dispatches engine results until the transport closes or `shutdown`
    /// turns `true`.
    pub async fn run_dispatch(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Result dispatch started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                result = self.transport.recv_from_engine() => match result {
                    Some(from_engine) => {
                        self.dispatch_result(from_engine).await;
                    }
                    None => {
                        info!("Engine transport closed");
                        break;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("Result dispatch stopped");
    }
}

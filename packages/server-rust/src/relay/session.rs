//! Per-client session state.
//!
//! Each session owns a bounded outbound queue. The receiver end is drained
//! by the connection's outbound duty, which is the only writer to the
//! socket; the relay and the inbound duty enqueue through the session.

use std::time::{Duration, Instant};

use gabriel_core::{codec, ClientIdentity, ToClient};
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::mpsc;

use super::ledger::TokenLedger;

/// Message queued for delivery to a client.
#[derive(Debug)]
pub enum OutboundMessage {
    /// An encoded `ToClient` message.
    Binary(Vec<u8>),
    /// A close frame with an optional reason. Ends the outbound duty.
    Close(Option<String>),
}

/// Error returned when queueing a message for a client fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// The queue stayed full for the whole timeout.
    Timeout,
    /// The connection has been closed; the receiver was dropped.
    Disconnected,
    /// The queue is full (non-blocking sends only).
    Full,
    /// The message could not be encoded.
    Encode,
}

/// Server-side state of one connected client.
#[derive(Debug)]
pub struct ClientSession {
    identity: ClientIdentity,
    tx: mpsc::Sender<OutboundMessage>,
    ledger: Mutex<TokenLedger>,
    connected_at: Instant,
}

impl ClientSession {
    pub(crate) fn new(
        identity: ClientIdentity,
        tx: mpsc::Sender<OutboundMessage>,
        ledger: TokenLedger,
    ) -> Self {
        Self {
            identity,
            tx,
            ledger: Mutex::new(ledger),
            connected_at: Instant::now(),
        }
    }

    #[must_use]
    pub fn identity(&self) -> ClientIdentity {
        self.identity
    }

    /// How long this session has been established.
    #[must_use]
    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Locks the session's token ledger.
    ///
    /// Never hold the guard across an `.await`.
    pub fn ledger(&self) -> MutexGuard<'_, TokenLedger> {
        self.ledger.lock()
    }

    /// Tokens currently available on `filter`.
    #[must_use]
    pub fn tokens(&self, filter: &str) -> Option<u32> {
        self.ledger.lock().available(filter)
    }

    /// Attempts to queue a message without blocking.
    ///
    /// Returns `true` if the message was enqueued, `false` if the queue
    /// is full or the connection has been closed.
    #[must_use]
    pub fn try_send(&self, msg: OutboundMessage) -> bool {
        self.tx.try_send(msg).is_ok()
    }

    /// Queues a message, waiting at most `timeout` for space.
    ///
    /// # Errors
    ///
    /// Returns `SendError::Timeout` if the queue remains full for the
    /// entire timeout duration. Returns `SendError::Disconnected` if the
    /// receiver has been dropped (connection closed).
    pub async fn send_timeout(
        &self,
        msg: OutboundMessage,
        timeout: Duration,
    ) -> Result<(), SendError> {
        match tokio::time::timeout(timeout, self.tx.send(msg)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SendError::Disconnected),
            Err(_) => Err(SendError::Timeout),
        }
    }

    /// Encodes `msg` and queues it, waiting at most `timeout` for space.
    ///
    /// # Errors
    ///
    /// `SendError::Encode` if the message cannot be encoded, otherwise the
    /// errors of [`ClientSession::send_timeout`].
    pub async fn send_message(&self, msg: &ToClient, timeout: Duration) -> Result<(), SendError> {
        let bytes = codec::encode(msg).map_err(|_| SendError::Encode)?;
        self.send_timeout(OutboundMessage::Binary(bytes), timeout)
            .await
    }

    /// Encodes `msg` and queues it only if there is room right now.
    ///
    /// # Errors
    ///
    /// `SendError::Full` if the queue has no free slot,
    /// `SendError::Disconnected` if the receiver has been dropped, and
    /// `SendError::Encode` if the message cannot be encoded.
    pub fn try_send_message(&self, msg: &ToClient) -> Result<(), SendError> {
        let bytes = codec::encode(msg).map_err(|_| SendError::Encode)?;
        self.tx
            .try_send(OutboundMessage::Binary(bytes))
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => SendError::Full,
                mpsc::error::TrySendError::Closed(_) => SendError::Disconnected,
            })
    }

    /// Checks whether the connection is still open.
    ///
    /// Returns `false` if the receiver end of the queue has been dropped,
    /// meaning the outbound duty has exited.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

//! Test doubles shared by the relay's unit tests.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use async_trait::async_trait;
use gabriel_core::{codec, ClientIdentity, FromEngine, ToClient, ToEngine};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{OutboundMessage, Relay, RelayConfig};
use crate::network::ConnectionConfig;
use crate::traits::{EngineTransport, SubmitError};

/// Transport that records submissions and never produces results.
#[derive(Debug, Default)]
pub(crate) struct RecordingTransport {
    pub submitted: Mutex<Vec<ToEngine>>,
    /// Submissions beyond this many are refused with `SubmitError::Full`.
    pub capacity: Option<usize>,
    /// Refuse every submission with this error.
    pub refuse_with: Option<SubmitError>,
}

impl RecordingTransport {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    pub fn refusing(err: SubmitError) -> Self {
        Self {
            refuse_with: Some(err),
            ..Self::default()
        }
    }

    pub fn submitted_count(&self) -> usize {
        self.submitted.lock().len()
    }
}

#[async_trait]
impl EngineTransport for RecordingTransport {
    async fn send_to_engine(&self, to_engine: ToEngine) -> Result<(), SubmitError> {
        if let Some(err) = &self.refuse_with {
            return Err(err.clone());
        }
        let mut submitted = self.submitted.lock();
        if self.capacity.is_some_and(|cap| submitted.len() >= cap) {
            return Err(SubmitError::Full);
        }
        submitted.push(to_engine);
        Ok(())
    }

    async fn recv_from_engine(&self) -> Option<FromEngine> {
        std::future::pending().await
    }
}

pub(crate) fn identity(n: u16) -> ClientIdentity {
    ClientIdentity::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 50_000 + n)
}

pub(crate) fn relay_with(
    transport: impl Into<Arc<RecordingTransport>>,
    tokens_per_filter: u32,
) -> Relay {
    let transport: Arc<RecordingTransport> = transport.into();
    Relay::new(
        RelayConfig {
            num_tokens_per_filter: tokens_per_filter,
            ..RelayConfig::default()
        },
        ConnectionConfig::default(),
        transport,
    )
}

/// Decodes the next queued message, if any.
pub(crate) fn next_message(rx: &mut mpsc::Receiver<OutboundMessage>) -> Option<ToClient> {
    match rx.try_recv().ok()? {
        OutboundMessage::Binary(bytes) => Some(codec::decode(&bytes).expect("valid ToClient")),
        OutboundMessage::Close(_) => None,
    }
}

use async_trait::async_trait;
use gabriel_core::{FromClient, FromEngine, ResultWrapper, ToEngine};

/// Why an engine transport refused a frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// The input queue of the engine(s) consuming the filter is full.
    #[error("engine input queue is full")]
    Full,
    /// No engine is attached for the filter.
    #[error("no engine attached for filter {0}")]
    NoEngine(String),
    /// The transport has shut down.
    #[error("engine transport is closed")]
    Closed,
}

/// Pluggable channel between the gateway and its cognitive engines.
/// Implementations: in-process queues (`engine::LocalEngineTransport`),
/// network RPC or a message bus (future).
///
/// The submission side is shared by every client's inbound duty; the result
/// side has exactly one consumer, the relay's dispatch duty.
#[async_trait]
pub trait EngineTransport: Send + Sync {
    /// Hand a frame to the engine(s) consuming its filter.
    ///
    /// Must not wait for queue space: a full queue is reported immediately
    /// as `SubmitError::Full`.
    async fn send_to_engine(&self, to_engine: ToEngine) -> Result<(), SubmitError>;

    /// Wait for the next engine result. Returns `None` once the transport is closed.
    async fn recv_from_engine(&self) -> Option<FromEngine>;
}

/// A cognitive engine: turns one client frame into one result.
///
/// Engines run on a blocking thread, so `handle` may do heavy synchronous work.
pub trait CognitiveEngine: Send + 'static {
    /// Process a single frame. The frame id and filter of the returned
    /// wrapper are overwritten with the input's before routing.
    fn handle(&mut self, input: FromClient) -> ResultWrapper;
}

impl<F> CognitiveEngine for F
where
    F: FnMut(FromClient) -> ResultWrapper + Send + 'static,
{
    fn handle(&mut self, input: FromClient) -> ResultWrapper {
        self(input)
    }
}

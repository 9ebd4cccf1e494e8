//! In-process engine transport.
//!
//! Each attached engine owns a bounded input queue keyed by the filter it
//! consumes and runs on its own OS thread. All engines publish onto one
//! shared result stream, which the relay's dispatch duty drains.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use gabriel_core::{FromEngine, ResultWrapper, Status, ToEngine};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::relay::RelayConfig;
use crate::traits::{CognitiveEngine, EngineTransport, SubmitError};

/// Why an engine could not be attached.
#[derive(Debug, thiserror::Error)]
pub enum AttachError {
    #[error("an engine already consumes filter {0}")]
    AlreadyAttached(String),
    #[error("engine transport is closed")]
    Closed,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Engine transport backed by in-process queues and engine threads.
pub struct LocalEngineTransport {
    capacity: usize,
    inputs: DashMap<String, mpsc::Sender<ToEngine>>,
    results_tx: Mutex<Option<mpsc::UnboundedSender<FromEngine>>>,
    results_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<FromEngine>>,
}

impl LocalEngineTransport {
    /// Creates a transport whose per-filter input queues hold `capacity` frames.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        Self {
            capacity: capacity.max(1),
            inputs: DashMap::new(),
            results_tx: Mutex::new(Some(results_tx)),
            results_rx: tokio::sync::Mutex::new(results_rx),
        }
    }

    #[must_use]
    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.input_queue_capacity)
    }

    /// Starts `engine` on a dedicated thread consuming frames for `filter`.
    ///
    /// The thread exits once the filter is detached or the transport is
    /// closed and its queue is empty.
    ///
    /// # Errors
    ///
    /// `AttachError::AlreadyAttached` if an engine already consumes the
    /// filter, `AttachError::Closed` after [`LocalEngineTransport::close`],
    /// `AttachError::Spawn` if the thread cannot be created.
    pub fn attach<E>(&self, filter: &str, engine: E) -> Result<JoinHandle<()>, AttachError>
    where
        E: CognitiveEngine,
    {
        let results = self.results_tx.lock().clone().ok_or(AttachError::Closed)?;

        match self.inputs.entry(filter.to_owned()) {
            Entry::Occupied(_) => Err(AttachError::AlreadyAttached(filter.to_owned())),
            Entry::Vacant(slot) => {
                let (tx, rx) = mpsc::channel(self.capacity);
                let name = filter.to_owned();
                let handle = thread::Builder::new()
                    .name(format!("engine-{filter}"))
                    .spawn(move || run_engine(&name, engine, rx, &results))?;
                slot.insert(tx);
                info!(filter, capacity = self.capacity, "Engine attached");
                Ok(handle)
            }
        }
    }

    /// Stops feeding the engine attached to `filter`. Frames already queued
    /// are still processed. Returns `false` if no engine was attached.
    pub fn detach(&self, filter: &str) -> bool {
        let removed = self.inputs.remove(filter).is_some();
        if removed {
            info!(filter, "Engine detached");
        }
        removed
    }

    /// Whether an engine consumes `filter`.
    #[must_use]
    pub fn is_attached(&self, filter: &str) -> bool {
        self.inputs.contains_key(filter)
    }

    /// Refuses further frames and detaches every engine.
    ///
    /// [`EngineTransport::recv_from_engine`] returns `None` once the engines
    /// have finished their queued frames.
    pub fn close(&self) {
        self.results_tx.lock().take();
        self.inputs.clear();
        info!("Engine transport closed");
    }
}

/// Body of an engine thread.
fn run_engine<E: CognitiveEngine>(
    filter: &str,
    mut engine: E,
    mut rx: mpsc::Receiver<ToEngine>,
    results: &mpsc::UnboundedSender<FromEngine>,
) {
    debug!(filter, "Engine thread started");
    while let Some(ToEngine {
        origin,
        from_client,
    }) = rx.blocking_recv()
    {
        let frame_id = from_client.frame_id;
        let filter_passed = from_client.filter_passed.clone();

        let mut result_wrapper =
            match panic::catch_unwind(AssertUnwindSafe(|| engine.handle(from_client))) {
                Ok(wrapper) => wrapper,
                Err(_) => {
                    error!(filter, frame_id, %origin, "Engine panicked while handling frame");
                    ResultWrapper::error(frame_id, filter_passed.as_str(), Status::ENGINE_ERROR)
                }
            };
        result_wrapper.frame_id = frame_id;
        result_wrapper.filter_passed = filter_passed;

        if results
            .send(FromEngine {
                origin,
                result_wrapper,
            })
            .is_err()
        {
            break;
        }
    }
    debug!(filter, "Engine thread stopped");
}

#[async_trait]
impl EngineTransport for LocalEngineTransport {
    async fn send_to_engine(&self, to_engine: ToEngine) -> Result<(), SubmitError> {
        if self.results_tx.lock().is_none() {
            return Err(SubmitError::Closed);
        }

        let filter = to_engine.filter_passed();
        let Some(tx) = self.inputs.get(filter).map(|entry| entry.value().clone()) else {
            return Err(SubmitError::NoEngine(filter.to_owned()));
        };

        tx.try_send(to_engine).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => SubmitError::Full,
            mpsc::error::TrySendError::Closed(to_engine) => {
                SubmitError::NoEngine(to_engine.filter_passed().to_owned())
            }
        })
    }

    async fn recv_from_engine(&self) -> Option<FromEngine> {
        self.results_rx.lock().await.recv().await
    }
}

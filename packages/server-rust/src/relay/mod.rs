//! Token-gated relay between client sessions and the engine transport.
//!
//! The relay owns the client registry and the set of filters consumed by
//! engines. Both live under one lock so that connecting a client,
//! tearing a session down, and adding or removing a filter are each a
//! single atomic step:
//!
//! 1. **Lifecycle** (this module): `connect`, `disconnect`/`release`,
//!    `add_filter_consumed`, `remove_filter_consumed`
//! 2. **Inbound** (`inbound`): client frame -> token check -> engine transport
//! 3. **Dispatch** (`dispatch`): engine result -> token refund -> client queue
//!
//! Lock order is registry, then a session's ledger. No lock is held across
//! an `.await`.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod inbound;
pub mod ledger;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use gabriel_core::{codec, ClientIdentity, ToClient, WelcomeMessage};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::network::ConnectionConfig;
use crate::traits::EngineTransport;

pub use config::RelayConfig;
pub use dispatch::DispatchOutcome;
pub use error::RelayError;
pub use inbound::FrameOutcome;
pub use ledger::{AcquireError, TokenLedger};
pub use session::{ClientSession, OutboundMessage, SendError};

#[derive(Debug, Default)]
struct RelayState {
    filters_consumed: BTreeSet<String>,
    sessions: HashMap<ClientIdentity, Arc<ClientSession>>,
}

/// Routes client frames to engines and engine results back to clients,
/// enforcing per-client, per-filter token limits.
pub struct Relay {
    config: RelayConfig,
    connection: ConnectionConfig,
    transport: Arc<dyn EngineTransport>,
    state: RwLock<RelayState>,
}

impl Relay {
    #[must_use]
    pub fn new(
        config: RelayConfig,
        connection: ConnectionConfig,
        transport: Arc<dyn EngineTransport>,
    ) -> Self {
        Self {
            config,
            connection,
            transport,
            state: RwLock::new(RelayState::default()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Registers a new client session and queues its welcome message.
    ///
    /// The session starts with a full allotment on every filter consumed at
    /// this moment, and the welcome lists exactly those filters. The welcome
    /// is always the first message in the session's queue. The returned
    /// receiver must be drained by the connection's outbound duty.
    ///
    /// # Errors
    ///
    /// `RelayError::DuplicateClient` if a live session already uses
    /// `identity`; that session is left untouched.
    pub fn connect(
        &self,
        identity: ClientIdentity,
    ) -> Result<(Arc<ClientSession>, mpsc::Receiver<OutboundMessage>), RelayError> {
        let mut state = self.state.write();

        if state.sessions.contains_key(&identity) {
            warn!(%identity, "Rejecting connection: identity already registered");
            return Err(RelayError::DuplicateClient(identity));
        }

        let welcome = ToClient::Welcome(WelcomeMessage {
            filters_consumed: state.filters_consumed.iter().cloned().collect(),
            num_tokens_per_filter: self.config.num_tokens_per_filter,
        });
        let welcome = codec::encode(&welcome)?;

        let ledger = TokenLedger::new(
            self.config.num_tokens_per_filter,
            state.filters_consumed.iter().cloned(),
        );
        let (tx, rx) = mpsc::channel(self.connection.outbound_channel_capacity.max(1));
        let session = Arc::new(ClientSession::new(identity, tx, ledger));

        // The queue is fresh and has room for at least one message.
        let queued = session.try_send(OutboundMessage::Binary(welcome));
        debug_assert!(queued, "welcome must fit in a fresh outbound queue");

        state.sessions.insert(identity, Arc::clone(&session));
        info!(%identity, "New client connected");

        Ok((session, rx))
    }

    /// Removes the session registered under `identity`, if any.
    ///
    /// Idempotent: calling it again returns `None`.
    pub fn disconnect(&self, identity: ClientIdentity) -> Option<Arc<ClientSession>> {
        let removed = self.state.write().sessions.remove(&identity);
        if let Some(session) = &removed {
            info!(%identity, connected_secs = session.connected_for().as_secs(), "Client disconnected");
        }
        removed
    }

    /// Removes `session` from the registry if it is still the one registered
    /// under its identity. Returns whether an entry was removed.
    ///
    /// A session that was already removed (by `disconnect`, `drain_all`, or a
    /// previous `release`) is a no-op, and a newer session reusing the same
    /// identity is never touched.
    pub fn release(&self, session: &Arc<ClientSession>) -> bool {
        let identity = session.identity();
        let mut state = self.state.write();

        let owned = state
            .sessions
            .get(&identity)
            .is_some_and(|current| Arc::ptr_eq(current, session));
        if owned {
            state.sessions.remove(&identity);
            info!(%identity, connected_secs = session.connected_for().as_secs(), "Client disconnected");
        }
        owned
    }

    /// Records that at least one engine consumes `filter`.
    ///
    /// Every connected client receives a fresh counter with the default
    /// allotment for it. Returns `false` if the filter was already consumed.
    pub fn add_filter_consumed(&self, filter: &str) -> bool {
        let mut state = self.state.write();
        if !state.filters_consumed.insert(filter.to_owned()) {
            return false;
        }

        for session in state.sessions.values() {
            session.ledger().add_filter(filter);
        }
        info!(filter, clients = state.sessions.len(), "Filter consumed");
        true
    }

    /// Records that no engine consumes `filter` anymore.
    ///
    /// The filter's counter is removed from every connected client. Returns
    /// `false` if the filter was not consumed.
    pub fn remove_filter_consumed(&self, filter: &str) -> bool {
        let mut state = self.state.write();
        if !state.filters_consumed.remove(filter) {
            return false;
        }

        for session in state.sessions.values() {
            session.ledger().remove_filter(filter);
        }
        info!(filter, clients = state.sessions.len(), "Filter no longer consumed");
        true
    }

    /// Filters currently consumed, in sorted order.
    #[must_use]
    pub fn filters_consumed(&self) -> Vec<String> {
        self.state.read().filters_consumed.iter().cloned().collect()
    }

    /// Looks up the live session for `identity`.
    #[must_use]
    pub fn session(&self, identity: ClientIdentity) -> Option<Arc<ClientSession>> {
        self.state.read().sessions.get(&identity).cloned()
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.state.read().sessions.len()
    }

    /// Removes and returns all sessions. Used during graceful shutdown.
    pub fn drain_all(&self) -> Vec<Arc<ClientSession>> {
        let sessions = std::mem::take(&mut self.state.write().sessions);
        sessions.into_values().collect()
    }
}

/// Releases a session from the relay when dropped.
///
/// Held by the connection supervisor so teardown runs on every exit path.
pub struct SessionGuard {
    relay: Arc<Relay>,
    session: Arc<ClientSession>,
}

impl SessionGuard {
    #[must_use]
    pub fn new(relay: Arc<Relay>, session: Arc<ClientSession>) -> Self {
        Self { relay, session }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.relay.release(&self.session);
    }
}

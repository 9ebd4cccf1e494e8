//! HTTP and WebSocket handlers and the state they share.

pub mod health;
pub mod websocket;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use websocket::ws_upgrade_handler;

use std::sync::Arc;
use std::time::Instant;

use super::{NetworkConfig, ShutdownController};
use crate::relay::Relay;

/// State carried through axum's `State` extractor. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub shutdown: Arc<ShutdownController>,
    pub config: Arc<NetworkConfig>,
    /// Process start, for uptime reporting.
    pub start_time: Instant,
}

//! Gabriel gateway: a token-gated relay between WebSocket clients and
//! cognitive engines.

pub mod engine;
pub mod network;
pub mod relay;
pub mod traits;

pub use engine::{attach_engine, detach_engine, AttachError, LocalEngineTransport};
pub use network::{NetworkConfig, NetworkModule};
pub use relay::{Relay, RelayConfig};
pub use traits::{CognitiveEngine, EngineTransport, SubmitError};

//! Wire-compatible message schemas for the Gabriel protocol.
//!
//! Every message is encoded as named `MsgPack` (`rmp_serde::to_vec_named()`)
//! with camelCase field names, one message per WebSocket frame.
//!
//! - [`client`]: frames sent by clients (`FromClient`)
//! - [`server`]: messages sent to clients (`ToClient`, `ResultWrapper`, `Status`)
//! - [`engine`]: envelopes exchanged with cognitive engines (`ToEngine`, `FromEngine`)

pub mod client;
pub mod engine;
pub mod server;

pub use client::{FromClient, PayloadType};
pub use engine::{FromEngine, ToEngine};
pub use server::{EngineResult, ResultWrapper, Status, ToClient, WelcomeMessage};

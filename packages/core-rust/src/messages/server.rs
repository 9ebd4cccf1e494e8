//! Server-to-client messages.
//!
//! `ToClient` is internally tagged by a `type` field so clients can dispatch
//! on it before looking at any other field.

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use super::client::PayloadType;

/// Outcome of processing one client frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum Status {
    SUCCESS,
    UNSPECIFIED_ERROR,
    /// The frame (or its payload) could not be parsed.
    WRONG_INPUT_FORMAT,
    ENGINE_ERROR,
    /// The client sent a frame for a filter on which it holds no tokens.
    NO_TOKENS,
    /// The engine input queue for the frame's filter was full.
    QUEUE_FULL,
    /// No engine consumes the frame's filter.
    #[serde(alias = "REQUESTED_ENGINE_NOT_AVAILABLE")]
    NO_ENGINE_FOR_FILTER_PASSED,
    /// The gateway could not hand the frame to any engine.
    SERVER_DROPPED_FRAME,
}

/// One result payload produced by an engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineResult {
    pub payload_type: PayloadType,
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
}

/// Result (or error) for a single frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultWrapper {
    pub frame_id: u64,
    pub filter_passed: String,
    pub status: Status,
    #[serde(default)]
    pub results: Vec<EngineResult>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub extras: Option<ByteBuf>,
}

impl ResultWrapper {
    /// Successful result carrying the given payloads.
    #[must_use]
    pub fn success(
        frame_id: u64,
        filter_passed: impl Into<String>,
        results: Vec<EngineResult>,
    ) -> Self {
        Self {
            frame_id,
            filter_passed: filter_passed.into(),
            status: Status::SUCCESS,
            results,
            extras: None,
        }
    }

    /// Error reply without payloads.
    #[must_use]
    pub fn error(frame_id: u64, filter_passed: impl Into<String>, status: Status) -> Self {
        Self {
            frame_id,
            filter_passed: filter_passed.into(),
            status,
            results: Vec::new(),
            extras: None,
        }
    }
}

/// Sent once, immediately after a client connects.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeMessage {
    /// Filters consumed by at least one engine at connect time.
    pub filters_consumed: Vec<String>,
    /// Tokens the client starts with on each filter.
    pub num_tokens_per_filter: u32,
}

/// Every message the gateway sends to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToClient {
    #[serde(rename = "WELCOME")]
    Welcome(WelcomeMessage),
    #[serde(rename = "RESULT")]
    Result(ResultWrapper),
}

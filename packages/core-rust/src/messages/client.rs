//! Client-to-server frames.

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

/// Kind of data carried by a frame or a result.
///
/// Variant names use `SCREAMING_CASE` to match the wire format exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum PayloadType {
    #[default]
    IMAGE,
    VIDEO,
    AUDIO,
    ACCELEROMETER,
    LOCATION,
    TEXT,
    OTHER,
}

/// A single frame produced by a client.
///
/// `filter_passed` names the filter (category) the frame passed on the client
/// side; only engines consuming that filter receive it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FromClient {
    /// Client-assigned identifier, echoed back in every reply for this frame.
    pub frame_id: u64,
    #[serde(default)]
    pub payload_type: PayloadType,
    pub filter_passed: String,
    /// Opaque payloads; the gateway never inspects them.
    #[serde(default)]
    pub payloads_for_frame: Vec<ByteBuf>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub extras: Option<ByteBuf>,
}

impl FromClient {
    /// Creates a frame with a single payload.
    #[must_use]
    pub fn new(frame_id: u64, filter_passed: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            frame_id,
            filter_passed: filter_passed.into(),
            payloads_for_frame: vec![ByteBuf::from(payload)],
            ..Self::default()
        }
    }
}

//! `MsgPack` encoding and decoding of wire messages.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Errors from encoding or decoding a wire message.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("failed to decode message: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Encodes a message as named `MsgPack`.
///
/// # Errors
///
/// Returns `CodecError::Encode` if the value cannot be serialized.
pub fn encode<T: Serialize + ?Sized>(msg: &T) -> Result<Vec<u8>, CodecError> {
    Ok(rmp_serde::to_vec_named(msg)?)
}

/// Decodes a message from `MsgPack` bytes.
///
/// # Errors
///
/// Returns `CodecError::Decode` if the bytes are not a valid encoding of `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

/// Only the part of a client frame needed to address a reply to it.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrameHeader {
    frame_id: u64,
}

/// Recovers the `frameId` of a frame that failed to decode as a whole.
///
/// Returns `None` when not even the frame id can be read, in which case
/// there is nothing to address an error reply to.
#[must_use]
pub fn recover_frame_id(bytes: &[u8]) -> Option<u64> {
    rmp_serde::from_slice::<FrameHeader>(bytes)
        .ok()
        .map(|header| header.frame_id)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::messages::{
        EngineResult, FromClient, PayloadType, ResultWrapper, Status, ToClient, WelcomeMessage,
    };

    #[derive(Deserialize)]
    struct Tagged {
        #[serde(rename = "type")]
        kind: String,
    }

    /// A frame whose `filterPassed` has the wrong type.
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct MistypedFrame {
        frame_id: u64,
        filter_passed: u32,
    }

    #[test]
    fn from_client_survives_encoding() {
        let mut frame = FromClient::new(7, "faces", vec![0xff, 0xd8, 0xff]);
        frame.payload_type = PayloadType::IMAGE;

        let bytes = encode(&frame).unwrap();
        let decoded: FromClient = decode(&bytes).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn to_client_carries_type_discriminator() {
        let welcome = ToClient::Welcome(WelcomeMessage {
            filters_consumed: vec!["faces".into(), "ocr".into()],
            num_tokens_per_filter: 2,
        });
        let tagged: Tagged = decode(&encode(&welcome).unwrap()).unwrap();
        assert_eq!(tagged.kind, "WELCOME");

        let result = ToClient::Result(ResultWrapper::error(3, "faces", Status::NO_TOKENS));
        let tagged: Tagged = decode(&encode(&result).unwrap()).unwrap();
        assert_eq!(tagged.kind, "RESULT");
    }

    #[test]
    fn to_client_result_decodes_with_payloads() {
        let msg = ToClient::Result(ResultWrapper::success(
            11,
            "ocr",
            vec![EngineResult {
                payload_type: PayloadType::TEXT,
                payload: b"hello".to_vec(),
            }],
        ));

        let decoded: ToClient = decode(&encode(&msg).unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn status_serializes_to_expected_strings() {
        let s: String = decode(&encode(&Status::NO_TOKENS).unwrap()).unwrap();
        assert_eq!(s, "NO_TOKENS");

        let s: String = decode(&encode(&Status::NO_ENGINE_FOR_FILTER_PASSED).unwrap()).unwrap();
        assert_eq!(s, "NO_ENGINE_FOR_FILTER_PASSED");
    }

    #[test]
    fn engine_not_available_alias_decodes() {
        let bytes = encode("REQUESTED_ENGINE_NOT_AVAILABLE").unwrap();
        let status: Status = decode(&bytes).unwrap();
        assert_eq!(status, Status::NO_ENGINE_FOR_FILTER_PASSED);
    }

    #[test]
    fn error_reply_has_no_results() {
        let reply = ResultWrapper::error(5, "faces", Status::QUEUE_FULL);
        assert!(reply.results.is_empty());
        assert_eq!(reply.status, Status::QUEUE_FULL);
        assert_eq!(reply.frame_id, 5);
    }

    #[test]
    fn frame_id_recovered_from_mistyped_frame() {
        let bytes = encode(&MistypedFrame {
            frame_id: 42,
            filter_passed: 9,
        })
        .unwrap();

        assert!(decode::<FromClient>(&bytes).is_err());
        assert_eq!(recover_frame_id(&bytes), Some(42));
    }

    #[test]
    fn frame_id_not_recovered_from_garbage() {
        assert_eq!(recover_frame_id(b"not msgpack at all"), None);
        assert_eq!(recover_frame_id(&[]), None);
    }

    proptest! {
        #[test]
        fn decoding_arbitrary_bytes_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = decode::<FromClient>(&bytes);
            let _ = recover_frame_id(&bytes);
        }
    }
}

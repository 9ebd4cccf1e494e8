//! Gabriel core: wire messages, engine envelopes, and the `MsgPack` codec
//! shared by the gateway server, its clients, and cognitive engines.

pub mod codec;
pub mod identity;
pub mod messages;

pub use codec::{decode, encode, recover_frame_id, CodecError};
pub use identity::ClientIdentity;
pub use messages::{
    EngineResult, FromClient, FromEngine, PayloadType, ResultWrapper, Status, ToClient, ToEngine,
    WelcomeMessage,
};


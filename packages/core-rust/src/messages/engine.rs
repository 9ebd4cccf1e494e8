//! Envelopes exchanged between the gateway and cognitive engines.
//!
//! Both directions carry the origin client's identity so results can be
//! routed back without engines knowing anything about connections.

use serde::{Deserialize, Serialize};

use super::client::FromClient;
use super::server::ResultWrapper;
use crate::identity::ClientIdentity;

/// A client frame on its way to the engines consuming its filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToEngine {
    pub origin: ClientIdentity,
    pub from_client: FromClient,
}

impl ToEngine {
    /// Filter the wrapped frame passed.
    #[must_use]
    pub fn filter_passed(&self) -> &str {
        &self.from_client.filter_passed
    }
}

/// An engine result on its way back to the originating client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FromEngine {
    pub origin: ClientIdentity,
    pub result_wrapper: ResultWrapper,
}

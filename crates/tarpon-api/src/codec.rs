//! Pluggable payload codec
//!
//! The dispatcher and notifiers treat payload bytes as opaque; everything that
//! needs structure goes through a `PayloadCodec`. The default implementation
//! is JSON, but the trait is the seam: a deployment can swap in any format
//! without touching routing, framing, or bookkeeping.

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};

use crate::model::{
    ClusterMembership, ClusterRemoved, ClusterTopology, ClusterView, ModuleAvailability,
    TransactionRequest, TransactionResponse,
};

/// Codec-level failure: the payload could not be encoded or decoded.
///
/// Never fatal to the channel by itself; the caller decides whether there is
/// anything left to report to the peer.
#[derive(thiserror::Error, Debug)]
pub enum WireError {
    #[error("encode failed: {0}")]
    Encode(String),

    #[error("decode failed: {0}")]
    Decode(String),
}

/// Encode/decode service for per-message payloads.
///
/// Both sides of the channel use the same codec; decode methods for outbound
/// kinds exist for the client half and for tests.
pub trait PayloadCodec: Send + Sync {
    fn encode_transaction_request(&self, request: &TransactionRequest) -> Result<Bytes, WireError>;
    fn decode_transaction_request(&self, payload: &[u8]) -> Result<TransactionRequest, WireError>;

    fn encode_transaction_response(
        &self,
        response: &TransactionResponse,
    ) -> Result<Bytes, WireError>;
    fn decode_transaction_response(&self, payload: &[u8])
    -> Result<TransactionResponse, WireError>;

    fn encode_module_availability(
        &self,
        availability: &ModuleAvailability,
    ) -> Result<Bytes, WireError>;
    fn decode_module_availability(&self, payload: &[u8])
    -> Result<ModuleAvailability, WireError>;

    fn encode_cluster_topology(&self, topology: &ClusterTopology) -> Result<Bytes, WireError>;
    fn decode_cluster_topology(&self, payload: &[u8]) -> Result<ClusterTopology, WireError>;

    fn encode_cluster_formed(&self, cluster: &ClusterView) -> Result<Bytes, WireError>;
    fn decode_cluster_formed(&self, payload: &[u8]) -> Result<ClusterView, WireError>;

    fn encode_cluster_removed(&self, removed: &ClusterRemoved) -> Result<Bytes, WireError>;
    fn decode_cluster_removed(&self, payload: &[u8]) -> Result<ClusterRemoved, WireError>;

    fn encode_cluster_membership(&self, membership: &ClusterMembership)
    -> Result<Bytes, WireError>;
    fn decode_cluster_membership(&self, payload: &[u8]) -> Result<ClusterMembership, WireError>;
}

/// Default JSON payload codec.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonPayloadCodec;

impl JsonPayloadCodec {
    fn encode<T: Serialize>(value: &T) -> Result<Bytes, WireError> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| WireError::Encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, WireError> {
        serde_json::from_slice(payload).map_err(|e| WireError::Decode(e.to_string()))
    }
}

impl PayloadCodec for JsonPayloadCodec {
    fn encode_transaction_request(&self, request: &TransactionRequest) -> Result<Bytes, WireError> {
        Self::encode(request)
    }

    fn decode_transaction_request(&self, payload: &[u8]) -> Result<TransactionRequest, WireError> {
        Self::decode(payload)
    }

    fn encode_transaction_response(
        &self,
        response: &TransactionResponse,
    ) -> Result<Bytes, WireError> {
        Self::encode(response)
    }

    fn decode_transaction_response(
        &self,
        payload: &[u8],
    ) -> Result<TransactionResponse, WireError> {
        Self::decode(payload)
    }

    fn encode_module_availability(
        &self,
        availability: &ModuleAvailability,
    ) -> Result<Bytes, WireError> {
        Self::encode(availability)
    }

    fn decode_module_availability(
        &self,
        payload: &[u8],
    ) -> Result<ModuleAvailability, WireError> {
        Self::decode(payload)
    }

    fn encode_cluster_topology(&self, topology: &ClusterTopology) -> Result<Bytes, WireError> {
        Self::encode(topology)
    }

    fn decode_cluster_topology(&self, payload: &[u8]) -> Result<ClusterTopology, WireError> {
        Self::decode(payload)
    }

    fn encode_cluster_formed(&self, cluster: &ClusterView) -> Result<Bytes, WireError> {
        Self::encode(cluster)
    }

    fn decode_cluster_formed(&self, payload: &[u8]) -> Result<ClusterView, WireError> {
        Self::decode(payload)
    }

    fn encode_cluster_removed(&self, removed: &ClusterRemoved) -> Result<Bytes, WireError> {
        Self::encode(removed)
    }

    fn decode_cluster_removed(&self, payload: &[u8]) -> Result<ClusterRemoved, WireError> {
        Self::decode(payload)
    }

    fn encode_cluster_membership(
        &self,
        membership: &ClusterMembership,
    ) -> Result<Bytes, WireError> {
        Self::encode(membership)
    }

    fn decode_cluster_membership(&self, payload: &[u8]) -> Result<ClusterMembership, WireError> {
        Self::decode(payload)
    }
}

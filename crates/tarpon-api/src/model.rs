//! Payload models for Tarpon protocol messages
//!
//! These are the structured forms of the per-message payloads. How they are
//! turned into bytes is the codec's concern; the models carry no framing.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use tarpon_common::ErrorCode;

/// Identity of one distributed transaction as supplied by the remote peer.
///
/// Opaque to this layer; the local transaction manager interprets it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub String);

impl TransactionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl Display for TransactionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one deployable remote-invokable unit.
///
/// Used purely as an opaque key for availability notification.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleId {
    pub app: String,
    pub module: String,
    #[serde(default)]
    pub distinct: String,
}

impl ModuleId {
    pub fn new(app: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            module: module.into(),
            distinct: String::new(),
        }
    }
}

impl Display for ModuleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.distinct.is_empty() {
            write!(f, "{}/{}", self.app, self.module)
        } else {
            write!(f, "{}/{}/{}", self.app, self.module, self.distinct)
        }
    }
}

/// An address/identity within a cluster group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNode {
    pub name: String,
    pub address: String,
}

impl ClusterNode {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

/// One cluster group and its current members, as pushed to a client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterView {
    pub group: String,
    pub nodes: Vec<ClusterNode>,
}

/// Payload of a complete-cluster-topology message: every known group.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterTopology {
    pub clusters: Vec<ClusterView>,
}

/// Payload of a cluster-removed message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRemoved {
    pub group: String,
}

/// Payload of a nodes-added / nodes-removed message, scoped to one group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMembership {
    pub group: String,
    pub nodes: Vec<ClusterNode>,
}

/// Payload of a components-available / components-unavailable message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleAvailability {
    pub modules: Vec<ModuleId>,
}

/// Inbound transaction-control request payload.
///
/// `request_id` is the correlation identifier: responses may complete out of
/// order relative to other messages on the channel, so the peer matches
/// replies on it, never on arrival order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub request_id: String,
    pub transaction_id: TransactionId,
    /// One-phase optimization flag; only meaningful for commit.
    #[serde(default)]
    pub one_phase: bool,
}

/// Outcome of one transaction-control operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "result")]
pub enum TransactionOutcome {
    Success {
        #[serde(default)]
        read_only: bool,
    },
    Error {
        code: i32,
        message: String,
    },
}

/// Outbound transaction-control response payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub request_id: String,
    #[serde(flatten)]
    pub outcome: TransactionOutcome,
}

// Transaction error codes reported back to peers
pub const TX_UNKNOWN_TRANSACTION: ErrorCode<'static> = ErrorCode {
    code: 30001,
    message: "unknown transaction",
};

pub const TX_NOT_PREPARED: ErrorCode<'static> = ErrorCode {
    code: 30002,
    message: "transaction not prepared",
};

pub const TX_HEURISTIC_MIXED: ErrorCode<'static> = ErrorCode {
    code: 30003,
    message: "heuristic mixed outcome",
};

pub const TX_HEURISTIC_ROLLBACK: ErrorCode<'static> = ErrorCode {
    code: 30004,
    message: "heuristic rollback",
};

pub const TX_SYSTEM_ERROR: ErrorCode<'static> = ErrorCode {
    code: 30005,
    message: "transaction system error",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_id_display() {
        let module = ModuleId::new("shop", "orders");
        assert_eq!(module.to_string(), "shop/orders");

        let distinct = ModuleId {
            app: "shop".to_string(),
            module: "orders".to_string(),
            distinct: "v2".to_string(),
        };
        assert_eq!(distinct.to_string(), "shop/orders/v2");
    }

    #[test]
    fn test_transaction_request_defaults() {
        let json = r#"{"requestId":"r-1","transactionId":"tx-9"}"#;
        let request: TransactionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.request_id, "r-1");
        assert_eq!(request.transaction_id, TransactionId::new("tx-9"));
        assert!(!request.one_phase);
    }

    #[test]
    fn test_transaction_response_wire_shape() {
        let response = TransactionResponse {
            request_id: "r-2".to_string(),
            outcome: TransactionOutcome::Error {
                code: TX_UNKNOWN_TRANSACTION.code,
                message: "unknown transaction 'tx-1'".to_string(),
            },
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["requestId"], "r-2");
        assert_eq!(json["result"], "error");
        assert_eq!(json["code"], 30001);
    }

    #[test]
    fn test_transaction_error_codes_distinct() {
        let codes = [
            TX_UNKNOWN_TRANSACTION.code,
            TX_NOT_PREPARED.code,
            TX_HEURISTIC_MIXED.code,
            TX_HEURISTIC_ROLLBACK.code,
            TX_SYSTEM_ERROR.code,
        ];
        let mut unique = codes.to_vec();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), codes.len());
    }
}

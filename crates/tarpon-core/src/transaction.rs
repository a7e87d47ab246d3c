//! Transaction control path
//!
//! Translates inbound transaction-control messages into two-phase-commit
//! operations against the local transaction manager and reports the outcome
//! back to the peer. Dispatch is a stateless function parameterized by the
//! operation, so nothing is allocated per message beyond the decoded payload.
//!
//! Operations for the same transaction identifier are serialized by the
//! manager, not here; this layer is a faithful at-most-once relay. Failed
//! operations are reported once and never retried, the peer owns retry
//! policy.

use std::fmt::{Display, Formatter};

use bytes::Bytes;
use metrics::counter;
use tracing::{debug, warn};

use tarpon_api::model::{
    TX_HEURISTIC_MIXED, TX_HEURISTIC_ROLLBACK, TX_NOT_PREPARED, TX_SYSTEM_ERROR,
    TX_UNKNOWN_TRANSACTION, TransactionId, TransactionOutcome, TransactionResponse,
};
use tarpon_api::PayloadCodec;
use tarpon_api::protocol::{self, HEADER_TX_RESPONSE};
use tarpon_common::{ErrorCode, TarponError};

use crate::channel::ChannelWriter;

/// The five two-phase-commit control operations a peer may request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionOperation {
    Prepare,
    Commit,
    Rollback,
    Forget,
    BeforeCompletion,
}

impl Display for TransactionOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionOperation::Prepare => write!(f, "prepare"),
            TransactionOperation::Commit => write!(f, "commit"),
            TransactionOperation::Rollback => write!(f, "rollback"),
            TransactionOperation::Forget => write!(f, "forget"),
            TransactionOperation::BeforeCompletion => write!(f, "before-completion"),
        }
    }
}

/// Vote returned by a successful prepare.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrepareResult {
    /// The branch has work to commit; a commit or rollback decision follows.
    Committable,
    /// The branch did no work; the coordinator may drop it from phase two.
    ReadOnly,
}

/// Failure of one transaction-control operation.
///
/// Reported to the peer as a payload-level error code, never escalated to a
/// transport fault.
#[derive(thiserror::Error, Debug)]
pub enum TransactionError {
    #[error("unknown transaction '{0}'")]
    Unknown(TransactionId),

    #[error("transaction '{0}' is not prepared")]
    NotPrepared(TransactionId),

    #[error("heuristic mixed outcome for transaction '{0}'")]
    HeuristicMixed(TransactionId),

    #[error("transaction '{0}' was heuristically rolled back")]
    HeuristicRollback(TransactionId),

    #[error("transaction system error: {0}")]
    System(String),
}

impl TransactionError {
    pub fn error_code(&self) -> ErrorCode<'static> {
        match self {
            TransactionError::Unknown(_) => TX_UNKNOWN_TRANSACTION,
            TransactionError::NotPrepared(_) => TX_NOT_PREPARED,
            TransactionError::HeuristicMixed(_) => TX_HEURISTIC_MIXED,
            TransactionError::HeuristicRollback(_) => TX_HEURISTIC_ROLLBACK,
            TransactionError::System(_) => TX_SYSTEM_ERROR,
        }
    }
}

/// The local transaction manager this dispatcher relays control messages to.
///
/// External collaborator: it owns prepare/commit persistence and serializes
/// concurrent operations on the same transaction identifier.
#[async_trait::async_trait]
pub trait TransactionManager: Send + Sync {
    async fn prepare(&self, transaction_id: &TransactionId)
    -> Result<PrepareResult, TransactionError>;

    async fn commit(
        &self,
        transaction_id: &TransactionId,
        one_phase: bool,
    ) -> Result<(), TransactionError>;

    async fn rollback(&self, transaction_id: &TransactionId) -> Result<(), TransactionError>;

    async fn forget(&self, transaction_id: &TransactionId) -> Result<(), TransactionError>;

    async fn before_completion(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<(), TransactionError>;
}

/// Handle one inbound transaction-control message end to end.
///
/// Decodes the request, invokes the matching manager operation, and writes a
/// response frame. An undecodable payload without a recoverable request id is
/// logged and dropped; there is nothing to correlate a response to. The only
/// error returned is a channel write failure, which the caller escalates to
/// channel teardown.
pub async fn handle_transaction_message(
    op: TransactionOperation,
    payload: Bytes,
    codec: &dyn PayloadCodec,
    manager: &dyn TransactionManager,
    writer: &ChannelWriter,
) -> Result<(), TarponError> {
    let request = match codec.decode_transaction_request(&payload) {
        Ok(request) => request,
        Err(e) => {
            warn!(channel = %writer.id(), operation = %op, "undecodable transaction payload: {e}");
            return Ok(());
        }
    };

    counter!("tarpon_tx_operations_total", "operation" => op.to_string()).increment(1);
    debug!(
        channel = %writer.id(),
        transaction = %request.transaction_id,
        request = %request.request_id,
        "handling transaction {op}"
    );

    let result = match op {
        TransactionOperation::Prepare => manager
            .prepare(&request.transaction_id)
            .await
            .map(|vote| TransactionOutcome::Success {
                read_only: vote == PrepareResult::ReadOnly,
            }),
        TransactionOperation::Commit => manager
            .commit(&request.transaction_id, request.one_phase)
            .await
            .map(|_| TransactionOutcome::Success { read_only: false }),
        TransactionOperation::Rollback => manager
            .rollback(&request.transaction_id)
            .await
            .map(|_| TransactionOutcome::Success { read_only: false }),
        TransactionOperation::Forget => manager
            .forget(&request.transaction_id)
            .await
            .map(|_| TransactionOutcome::Success { read_only: false }),
        TransactionOperation::BeforeCompletion => manager
            .before_completion(&request.transaction_id)
            .await
            .map(|_| TransactionOutcome::Success { read_only: false }),
    };

    let outcome = result.unwrap_or_else(|e| {
        debug!(
            channel = %writer.id(),
            transaction = %request.transaction_id,
            "transaction {op} failed: {e}"
        );
        TransactionOutcome::Error {
            code: e.error_code().code,
            message: e.to_string(),
        }
    });

    let response = TransactionResponse {
        request_id: request.request_id,
        outcome,
    };
    let body = match codec.encode_transaction_response(&response) {
        Ok(body) => body,
        Err(e) => {
            warn!(channel = %writer.id(), "could not encode transaction response: {e}");
            return Ok(());
        }
    };
    writer.send(protocol::frame(HEADER_TX_RESPONSE, body)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use dashmap::DashMap;

    use tarpon_api::JsonPayloadCodec;
    use tarpon_api::model::TransactionRequest;
    use tarpon_api::protocol::split_frame;

    use crate::channel::Channel;

    /// Manager that knows a fixed set of prepared transactions.
    struct ScriptedManager {
        prepared: DashMap<TransactionId, ()>,
    }

    impl ScriptedManager {
        fn with_prepared(ids: &[&str]) -> Arc<Self> {
            let prepared = DashMap::new();
            for id in ids {
                prepared.insert(TransactionId::new(*id), ());
            }
            Arc::new(Self { prepared })
        }
    }

    #[async_trait::async_trait]
    impl TransactionManager for ScriptedManager {
        async fn prepare(
            &self,
            transaction_id: &TransactionId,
        ) -> Result<PrepareResult, TransactionError> {
            if self.prepared.contains_key(transaction_id) {
                Ok(PrepareResult::Committable)
            } else {
                Err(TransactionError::Unknown(transaction_id.clone()))
            }
        }

        async fn commit(
            &self,
            transaction_id: &TransactionId,
            _one_phase: bool,
        ) -> Result<(), TransactionError> {
            self.prepared
                .remove(transaction_id)
                .map(|_| ())
                .ok_or_else(|| TransactionError::Unknown(transaction_id.clone()))
        }

        async fn rollback(&self, transaction_id: &TransactionId) -> Result<(), TransactionError> {
            self.prepared
                .remove(transaction_id)
                .map(|_| ())
                .ok_or_else(|| TransactionError::Unknown(transaction_id.clone()))
        }

        async fn forget(&self, transaction_id: &TransactionId) -> Result<(), TransactionError> {
            let _ = transaction_id;
            Ok(())
        }

        async fn before_completion(
            &self,
            transaction_id: &TransactionId,
        ) -> Result<(), TransactionError> {
            let _ = transaction_id;
            Ok(())
        }
    }

    fn request_payload(request_id: &str, transaction_id: &str) -> Bytes {
        let codec = JsonPayloadCodec;
        codec
            .encode_transaction_request(&TransactionRequest {
                request_id: request_id.to_string(),
                transaction_id: TransactionId::new(transaction_id),
                one_phase: false,
            })
            .unwrap()
    }

    async fn next_response(transport: &mut crate::channel::ChannelTransport) -> TransactionResponse {
        let frame = transport.next_outbound().await.expect("response frame");
        let (header, payload) = split_frame(&frame).unwrap();
        assert_eq!(header, HEADER_TX_RESPONSE);
        JsonPayloadCodec.decode_transaction_response(&payload).unwrap()
    }

    #[tokio::test]
    async fn test_prepare_unknown_yields_error_response() {
        let (channel, mut transport) = Channel::pair("tx-chan", 8);
        let codec = JsonPayloadCodec;
        let manager = ScriptedManager::with_prepared(&[]);

        handle_transaction_message(
            TransactionOperation::Prepare,
            request_payload("r-1", "tx-missing"),
            &codec,
            manager.as_ref(),
            &channel.writer(),
        )
        .await
        .unwrap();

        let response = next_response(&mut transport).await;
        assert_eq!(response.request_id, "r-1");
        match response.outcome {
            TransactionOutcome::Error { code, .. } => {
                assert_eq!(code, TX_UNKNOWN_TRANSACTION.code)
            }
            other => panic!("expected error outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_commit_after_prepare_succeeds() {
        let (channel, mut transport) = Channel::pair("tx-chan", 8);
        let codec = JsonPayloadCodec;
        let manager = ScriptedManager::with_prepared(&["tx-1"]);

        handle_transaction_message(
            TransactionOperation::Commit,
            request_payload("r-2", "tx-1"),
            &codec,
            manager.as_ref(),
            &channel.writer(),
        )
        .await
        .unwrap();

        let response = next_response(&mut transport).await;
        assert_eq!(response.request_id, "r-2");
        assert!(matches!(
            response.outcome,
            TransactionOutcome::Success { read_only: false }
        ));
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_dropped_not_fatal() {
        let (channel, mut transport) = Channel::pair("tx-chan", 8);
        let codec = JsonPayloadCodec;
        let manager = ScriptedManager::with_prepared(&["tx-1"]);

        let result = handle_transaction_message(
            TransactionOperation::Prepare,
            Bytes::from_static(b"\xff\xfe not json"),
            &codec,
            manager.as_ref(),
            &channel.writer(),
        )
        .await;

        assert!(result.is_ok());
        assert!(transport.try_next_outbound().is_none());
        assert!(!channel.writer().is_closed());
    }

    #[tokio::test]
    async fn test_write_failure_surfaces_channel_closed() {
        let (channel, _transport) = Channel::pair("tx-chan", 8);
        let writer = channel.writer();
        writer.close();
        let codec = JsonPayloadCodec;
        let manager = ScriptedManager::with_prepared(&["tx-1"]);

        let err = handle_transaction_message(
            TransactionOperation::Commit,
            request_payload("r-3", "tx-1"),
            &codec,
            manager.as_ref(),
            &writer,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TarponError::ChannelClosed));
    }

    #[test]
    fn test_error_code_mapping() {
        let id = TransactionId::new("t");
        assert_eq!(
            TransactionError::Unknown(id.clone()).error_code().code,
            TX_UNKNOWN_TRANSACTION.code
        );
        assert_eq!(
            TransactionError::HeuristicRollback(id).error_code().code,
            TX_HEURISTIC_ROLLBACK.code
        );
        assert_eq!(
            TransactionError::System("boom".into()).error_code().code,
            TX_SYSTEM_ERROR.code
        );
    }
}

//! Transaction control over the TCP transport

use tarpon_api::model::{TX_NOT_PREPARED, TX_UNKNOWN_TRANSACTION, TransactionId, TransactionOutcome};
use tarpon_api::protocol::{
    HEADER_TX_BEFORE_COMPLETION_REQUEST, HEADER_TX_COMMIT_REQUEST, HEADER_TX_FORGET_REQUEST,
    HEADER_TX_PREPARE_REQUEST, HEADER_TX_ROLLBACK_REQUEST,
};
use tarpon_integration_tests::{TestClient, start_test_server, unique_test_id};

#[tokio::test]
async fn test_two_phase_commit_round_trip() {
    let server = start_test_server().await;
    let tx = unique_test_id("tx");
    server.transactions.begin(TransactionId(tx.clone()));

    let mut client = TestClient::connect(server.addr).await;

    let prepared = client
        .transaction_call(HEADER_TX_PREPARE_REQUEST, "r-prepare", &tx, false)
        .await;
    assert_eq!(
        prepared.outcome,
        TransactionOutcome::Success { read_only: false }
    );

    let committed = client
        .transaction_call(HEADER_TX_COMMIT_REQUEST, "r-commit", &tx, false)
        .await;
    assert_eq!(
        committed.outcome,
        TransactionOutcome::Success { read_only: false }
    );
    assert!(server.transactions.is_empty());
}

#[tokio::test]
async fn test_commit_without_prepare_reports_payload_error() {
    let server = start_test_server().await;
    let tx = unique_test_id("tx");
    server.transactions.begin(TransactionId(tx.clone()));

    let mut client = TestClient::connect(server.addr).await;
    let response = client
        .transaction_call(HEADER_TX_COMMIT_REQUEST, "r-1", &tx, false)
        .await;
    match response.outcome {
        TransactionOutcome::Error { code, .. } => assert_eq!(code, TX_NOT_PREPARED.code),
        other => panic!("expected error outcome, got {other:?}"),
    }

    // the failure was payload-level only; the channel still serves requests
    let one_phase = client
        .transaction_call(HEADER_TX_COMMIT_REQUEST, "r-2", &tx, true)
        .await;
    assert_eq!(
        one_phase.outcome,
        TransactionOutcome::Success { read_only: false }
    );
}

#[tokio::test]
async fn test_rollback_and_forget_unknown_transaction() {
    let server = start_test_server().await;
    let mut client = TestClient::connect(server.addr).await;

    for (header, request_id) in [
        (HEADER_TX_ROLLBACK_REQUEST, "r-rollback"),
        (HEADER_TX_FORGET_REQUEST, "r-forget"),
        (HEADER_TX_BEFORE_COMPLETION_REQUEST, "r-bc"),
    ] {
        let response = client
            .transaction_call(header, request_id, "never-started", false)
            .await;
        match response.outcome {
            TransactionOutcome::Error { code, .. } => {
                assert_eq!(code, TX_UNKNOWN_TRANSACTION.code)
            }
            other => panic!("expected error outcome, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_pipelined_requests_from_one_client() {
    let server = start_test_server().await;
    let mut ids = Vec::new();
    for _ in 0..8 {
        let tx = unique_test_id("tx");
        server.transactions.begin(TransactionId(tx.clone()));
        ids.push(tx);
    }

    let mut client = TestClient::connect(server.addr).await;
    for (i, tx) in ids.iter().enumerate() {
        let response = client
            .transaction_call(HEADER_TX_PREPARE_REQUEST, &format!("r-{i}"), tx, false)
            .await;
        assert_eq!(
            response.outcome,
            TransactionOutcome::Success { read_only: false }
        );
    }
}

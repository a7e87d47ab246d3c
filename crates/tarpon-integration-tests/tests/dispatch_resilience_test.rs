//! Dispatch resilience: bad input on one channel never takes the server down

use tarpon_api::model::{TransactionId, TransactionOutcome};
use tarpon_api::protocol::HEADER_TX_PREPARE_REQUEST;
use tarpon_integration_tests::{TestClient, start_test_server, unique_test_id};

#[tokio::test]
async fn test_unknown_header_is_dropped_channel_survives() {
    let server = start_test_server().await;
    let tx = unique_test_id("tx");
    server.transactions.begin(TransactionId(tx.clone()));

    let mut client = TestClient::connect(server.addr).await;
    client.send_frame(0x7F, b"garbage").await;

    let response = client
        .transaction_call(HEADER_TX_PREPARE_REQUEST, "r-after", &tx, false)
        .await;
    assert_eq!(
        response.outcome,
        TransactionOutcome::Success { read_only: false }
    );
}

#[tokio::test]
async fn test_undecodable_transaction_payload_is_dropped() {
    let server = start_test_server().await;
    let tx = unique_test_id("tx");
    server.transactions.begin(TransactionId(tx.clone()));

    let mut client = TestClient::connect(server.addr).await;
    client
        .send_frame(HEADER_TX_PREPARE_REQUEST, b"not json at all")
        .await;

    // no response is owed for the broken payload; the channel still works
    let response = client
        .transaction_call(HEADER_TX_PREPARE_REQUEST, "r-good", &tx, false)
        .await;
    assert_eq!(response.request_id, "r-good");
}

#[tokio::test]
async fn test_one_misbehaving_client_does_not_affect_another() {
    let server = start_test_server().await;
    let tx = unique_test_id("tx");
    server.transactions.begin(TransactionId(tx.clone()));

    let mut bad = TestClient::connect(server.addr).await;
    let mut good = TestClient::connect(server.addr).await;

    bad.send_frame(0x42, b"??").await;
    bad.send_frame(0x43, b"!!").await;

    let response = good
        .transaction_call(HEADER_TX_PREPARE_REQUEST, "r-good", &tx, false)
        .await;
    assert_eq!(
        response.outcome,
        TransactionOutcome::Success { read_only: false }
    );
}

//! Shared utilities for the Tarpon integration test binaries
//!
//! Provides a framed TCP test client and a server-state builder so each test
//! file can stand up a full server on an ephemeral port in a couple of lines.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use tarpon_api::JsonPayloadCodec;
use tarpon_api::model::{TransactionId, TransactionRequest, TransactionResponse};
use tarpon_api::protocol::HEADER_TX_RESPONSE;
use tarpon_core::cluster::ClusterRegistry;
use tarpon_core::deployment::DeploymentRepository;
use tarpon_core::recovery::RecoveryRegistry;
use tarpon_server::service::{
    InMemoryTransactionManager, NoopComponentInvoker, PeriodicRecoveryManager,
};
use tarpon_server::transport::{ServerState, serve};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

pub fn unique_test_id(prefix: &str) -> String {
    format!("{prefix}_{}", NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

/// Everything a test needs to poke at a running server.
pub struct TestServer {
    pub addr: std::net::SocketAddr,
    pub transactions: Arc<InMemoryTransactionManager>,
    pub deployments: Arc<DeploymentRepository>,
    pub clusters: Arc<ClusterRegistry>,
    pub recovery: Arc<RecoveryRegistry>,
}

/// Bind a full server on an ephemeral port with in-memory collaborators.
pub async fn start_test_server() -> TestServer {
    let transactions = Arc::new(InMemoryTransactionManager::new());
    let deployments = Arc::new(DeploymentRepository::new());
    let clusters = Arc::new(ClusterRegistry::new());
    let recovery_manager = PeriodicRecoveryManager::new(Duration::from_secs(3600));
    let recovery = RecoveryRegistry::new("test-node", recovery_manager);
    recovery.start();

    let state = Arc::new(ServerState {
        codec: Arc::new(JsonPayloadCodec),
        transaction_manager: transactions.clone(),
        invoker: Arc::new(NoopComponentInvoker),
        deployments: deployments.clone(),
        clusters: clusters.clone(),
        recovery: recovery.clone(),
        channel_capacity: 16,
        max_frame_len: 1024 * 1024,
    });

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(serve(listener, state));

    TestServer {
        addr,
        transactions,
        deployments,
        clusters,
        recovery,
    }
}

/// Framed TCP client speaking the length-prefixed wire format.
pub struct TestClient {
    stream: TcpStream,
    codec: JsonPayloadCodec,
}

impl TestClient {
    pub async fn connect(addr: std::net::SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        Self {
            stream,
            codec: JsonPayloadCodec,
        }
    }

    pub async fn send_frame(&mut self, header: u8, payload: &[u8]) {
        let len = (payload.len() + 1) as u32;
        self.stream.write_u32(len).await.expect("write length");
        self.stream.write_u8(header).await.expect("write header");
        self.stream.write_all(payload).await.expect("write payload");
        self.stream.flush().await.expect("flush");
    }

    pub async fn recv_frame(&mut self) -> (u8, Bytes) {
        let len = self.stream.read_u32().await.expect("read length") as usize;
        assert!(len > 0, "zero-length frame");
        let mut frame = vec![0u8; len];
        self.stream.read_exact(&mut frame).await.expect("read body");
        (frame[0], Bytes::from(frame).slice(1..))
    }

    /// Receive frames until one with the wanted header arrives; push
    /// notifications interleave with responses, so tests skip what they are
    /// not asserting on.
    pub async fn recv_frame_with_header(&mut self, header: u8) -> Bytes {
        loop {
            let (got, payload) = self.recv_frame().await;
            if got == header {
                return payload;
            }
        }
    }

    /// Send one transaction-control request and wait for its response.
    pub async fn transaction_call(
        &mut self,
        header: u8,
        request_id: &str,
        transaction_id: &str,
        one_phase: bool,
    ) -> TransactionResponse {
        use tarpon_api::PayloadCodec;

        let request = TransactionRequest {
            request_id: request_id.to_string(),
            transaction_id: TransactionId(transaction_id.to_string()),
            one_phase,
        };
        let payload = self
            .codec
            .encode_transaction_request(&request)
            .expect("encode request");
        self.send_frame(header, &payload).await;
        loop {
            let payload = self.recv_frame_with_header(HEADER_TX_RESPONSE).await;
            let response = self
                .codec
                .decode_transaction_response(&payload)
                .expect("decode response");
            // responses from pipelined requests may arrive out of order
            if response.request_id == request_id {
                return response;
            }
        }
    }
}

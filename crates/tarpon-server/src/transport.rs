//! TCP transport
//!
//! Frames are length-prefixed: a big-endian u32 byte count followed by the
//! frame body (header byte plus payload). Each accepted connection gets a
//! channel pair, a dispatcher, and two pump tasks moving frames between the
//! socket halves and the channel. When either direction ends, the channel
//! closes and the dispatcher tears the connection state down.

use std::sync::Arc;

use bytes::Bytes;
use metrics::gauge;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use tarpon_api::PayloadCodec;
use tarpon_common::{TarponError, channel_id};
use tarpon_core::channel::{Channel, TransportInbound, TransportOutbound};
use tarpon_core::cluster::ClusterRegistry;
use tarpon_core::deployment::DeploymentRepository;
use tarpon_core::dispatcher::ChannelDispatcher;
use tarpon_core::invocation::ComponentInvoker;
use tarpon_core::recovery::{ReceiverContext, RecoveryRegistry};
use tarpon_core::transaction::TransactionManager;

/// Shared collaborators handed to every accepted connection.
pub struct ServerState {
    pub codec: Arc<dyn PayloadCodec>,
    pub transaction_manager: Arc<dyn TransactionManager>,
    pub invoker: Arc<dyn ComponentInvoker>,
    pub deployments: Arc<DeploymentRepository>,
    pub clusters: Arc<ClusterRegistry>,
    pub recovery: Arc<RecoveryRegistry>,
    pub channel_capacity: usize,
    pub max_frame_len: usize,
}

/// Accept connections until the listener task is dropped.
pub async fn serve(listener: TcpListener, state: Arc<ServerState>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let state = state.clone();
                tokio::spawn(async move {
                    handle_connection(stream, peer.to_string(), state).await;
                });
            }
            Err(e) => {
                warn!("accept failed: {e}");
            }
        }
    }
}

/// Run one connection to completion.
pub async fn handle_connection(stream: TcpStream, peer: String, state: Arc<ServerState>) {
    let id = channel_id(&peer);
    info!(channel = %id, peer = %peer, "connection accepted");
    gauge!("tarpon_connections_active").increment(1.0);

    let context = ReceiverContext::new(Uuid::new_v4().to_string(), peer);
    state.recovery.register_peer(context.clone());

    let (channel, transport) = Channel::pair(&id, state.channel_capacity);
    let dispatcher = ChannelDispatcher::new(
        state.codec.clone(),
        state.transaction_manager.clone(),
        state.invoker.clone(),
        state.deployments.clone(),
        state.clusters.clone(),
    );
    dispatcher.start(channel).await;

    let (inbound, outbound) = transport.into_split();
    let (read_half, write_half) = stream.into_split();
    let max_frame_len = state.max_frame_len;

    let writer_id = id.clone();
    let write_task = tokio::spawn(async move {
        if let Err(e) = write_pump(write_half, outbound).await {
            debug!(channel = %writer_id, "write pump ended: {e}");
        }
    });

    // The read pump runs inline. When it returns, dropping `inbound` ends the
    // channel's read loop, which tears the dispatcher down and closes the
    // channel; the write pump then observes the close and ends too.
    if let Err(e) = read_pump(read_half, inbound, max_frame_len).await {
        warn!(channel = %id, "read pump ended: {e}");
    }
    dispatcher.close();
    let _ = write_task.await;

    state.recovery.unregister_peer(&context);
    gauge!("tarpon_connections_active").decrement(1.0);
    info!(channel = %id, "connection closed");
}

async fn read_pump(
    mut read_half: OwnedReadHalf,
    inbound: TransportInbound,
    max_frame_len: usize,
) -> Result<(), TarponError> {
    let mut closed = inbound.closed_signal();
    loop {
        let len = tokio::select! {
            read = read_half.read_u32() => match read {
                Ok(len) => len as usize,
                // clean EOF between frames
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(e.into()),
            },
            _ = closed.changed() => return Ok(()),
        };
        if len > max_frame_len {
            return Err(TarponError::Protocol(format!(
                "frame of {len} bytes exceeds limit of {max_frame_len}"
            )));
        }
        let mut frame = vec![0u8; len];
        read_half.read_exact(&mut frame).await?;
        if !inbound.deliver(Bytes::from(frame)).await {
            return Ok(());
        }
    }
}

async fn write_pump(
    mut write_half: OwnedWriteHalf,
    mut outbound: TransportOutbound,
) -> Result<(), TarponError> {
    while let Some(frame) = outbound.next().await {
        write_half.write_u32(frame.len() as u32).await?;
        write_half.write_all(&frame).await?;
        write_half.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tarpon_api::JsonPayloadCodec;
    use tarpon_api::model::{TransactionId, TransactionRequest};
    use tarpon_api::protocol::{HEADER_TX_PREPARE_REQUEST, HEADER_TX_RESPONSE};

    use crate::service::{InMemoryTransactionManager, NoopComponentInvoker,
        PeriodicRecoveryManager};

    fn test_state(transactions: Arc<InMemoryTransactionManager>) -> Arc<ServerState> {
        let recovery_manager = PeriodicRecoveryManager::new(Duration::from_secs(3600));
        Arc::new(ServerState {
            codec: Arc::new(JsonPayloadCodec),
            transaction_manager: transactions,
            invoker: Arc::new(NoopComponentInvoker),
            deployments: Arc::new(DeploymentRepository::new()),
            clusters: Arc::new(ClusterRegistry::new()),
            recovery: RecoveryRegistry::new("test-node", recovery_manager),
            channel_capacity: 16,
            max_frame_len: 1024 * 1024,
        })
    }

    async fn write_frame(stream: &mut TcpStream, header: u8, payload: &[u8]) {
        let len = (payload.len() + 1) as u32;
        stream.write_u32(len).await.unwrap();
        stream.write_u8(header).await.unwrap();
        stream.write_all(payload).await.unwrap();
        stream.flush().await.unwrap();
    }

    async fn read_frame(stream: &mut TcpStream) -> (u8, Vec<u8>) {
        let len = stream.read_u32().await.unwrap() as usize;
        let mut frame = vec![0u8; len];
        stream.read_exact(&mut frame).await.unwrap();
        (frame[0], frame[1..].to_vec())
    }

    #[tokio::test]
    async fn test_prepare_over_tcp() {
        let transactions = Arc::new(InMemoryTransactionManager::new());
        transactions.begin(TransactionId("tx-tcp".into()));
        let state = test_state(transactions);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, state));

        let mut client = TcpStream::connect(addr).await.unwrap();
        let request = TransactionRequest {
            request_id: "r-1".into(),
            transaction_id: TransactionId("tx-tcp".into()),
            one_phase: false,
        };
        let payload = JsonPayloadCodec.encode_transaction_request(&request).unwrap();
        write_frame(&mut client, HEADER_TX_PREPARE_REQUEST, &payload).await;

        let (header, body) = read_frame(&mut client).await;
        assert_eq!(header, HEADER_TX_RESPONSE);
        let response = JsonPayloadCodec.decode_transaction_response(&body).unwrap();
        assert_eq!(response.request_id, "r-1");
    }

    #[tokio::test]
    async fn test_oversized_frame_closes_connection() {
        let state = test_state(Arc::new(InMemoryTransactionManager::new()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, state));

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_u32(u32::MAX).await.unwrap();
        client.flush().await.unwrap();

        // server drops the connection; the client read sees EOF
        let mut buf = [0u8; 1];
        let read = tokio::time::timeout(Duration::from_secs(5), client.read(&mut buf))
            .await
            .expect("server closed in time")
            .unwrap();
        assert_eq!(read, 0);
    }

    #[tokio::test]
    async fn test_disconnect_unregisters_recovery_peer() {
        let state = test_state(Arc::new(InMemoryTransactionManager::new()));
        state.recovery.start();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, state.clone()));

        let client = TcpStream::connect(addr).await.unwrap();
        // wait for the server side to register the peer
        for _ in 0..50 {
            if state.recovery.peer_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(state.recovery.peer_count(), 1);

        drop(client);
        for _ in 0..50 {
            if state.recovery.peer_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(state.recovery.peer_count(), 0);
    }
}

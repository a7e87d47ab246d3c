//! Header-based channel message dispatcher
//!
//! One dispatcher per channel. `start` wires the channel into the deployment
//! and cluster feeds, then runs a read loop that takes one frame at a time
//! off the channel, hands it to a spawned worker keyed on the header byte,
//! and immediately re-arms the next read. Slow handlers therefore never stall
//! the inbound stream; responses carry their own request correlation, so
//! ordering across workers does not matter.
//!
//! Teardown runs exactly once, whether the transport drops, the peer goes
//! away, or `close` is called locally, and releases every subscription the
//! dispatcher took out on the shared feeds.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use metrics::counter;
use parking_lot::Mutex;
use tracing::{info, warn};

use tarpon_api::PayloadCodec;
use tarpon_api::protocol::{self, split_frame};
use tarpon_common::TarponError;

use crate::ListenerHandle;
use crate::availability::AvailabilityNotifier;
use crate::channel::{Channel, ChannelWriter};
use crate::cluster::ClusterRegistry;
use crate::deployment::DeploymentRepository;
use crate::invocation::ComponentInvoker;
use crate::topology::TopologyNotifier;
use crate::transaction::{TransactionManager, TransactionOperation, handle_transaction_message};

pub struct ChannelDispatcher {
    codec: Arc<dyn PayloadCodec>,
    transaction_manager: Arc<dyn TransactionManager>,
    invoker: Arc<dyn ComponentInvoker>,
    deployments: Arc<DeploymentRepository>,
    clusters: Arc<ClusterRegistry>,
    writer: Mutex<Option<ChannelWriter>>,
    availability_handle: Mutex<Option<ListenerHandle>>,
    topology: Mutex<Option<Arc<TopologyNotifier>>>,
    started: AtomicBool,
    torn_down: AtomicBool,
}

impl ChannelDispatcher {
    pub fn new(
        codec: Arc<dyn PayloadCodec>,
        transaction_manager: Arc<dyn TransactionManager>,
        invoker: Arc<dyn ComponentInvoker>,
        deployments: Arc<DeploymentRepository>,
        clusters: Arc<ClusterRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            codec,
            transaction_manager,
            invoker,
            deployments,
            clusters,
            writer: Mutex::new(None),
            availability_handle: Mutex::new(None),
            topology: Mutex::new(None),
            started: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
        })
    }

    /// Attach the channel and begin dispatching. Idempotent; only the first
    /// call takes effect.
    ///
    /// Subscribes the channel to availability and topology pushes (each of
    /// which replays current state first), then spawns the read loop.
    pub async fn start(self: &Arc<Self>, channel: Channel) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!(channel = %channel.id(), "dispatcher already started; ignoring");
            return;
        }
        let writer = channel.writer();
        *self.writer.lock() = Some(writer.clone());

        let availability = Arc::new(AvailabilityNotifier::new(writer.clone(), self.codec.clone()));
        let handle = self.deployments.add_listener(availability).await;
        *self.availability_handle.lock() = Some(handle);

        let topology =
            TopologyNotifier::new(writer.clone(), self.codec.clone(), self.clusters.clone());
        topology.start().await;
        *self.topology.lock() = Some(topology);

        info!(channel = %channel.id(), "channel dispatcher started");
        let dispatcher = self.clone();
        tokio::spawn(async move {
            dispatcher.read_loop(channel).await;
        });
    }

    /// Close the channel locally. The read loop observes the close and runs
    /// teardown; safe to call any number of times.
    pub fn close(&self) {
        if let Some(writer) = self.writer.lock().as_ref() {
            writer.close();
        }
    }

    async fn read_loop(self: Arc<Self>, mut channel: Channel) {
        let writer = channel.writer();
        while let Some(frame) = channel.recv().await {
            counter!("tarpon_channel_messages_total").increment(1);
            let Some((header, payload)) = split_frame(&frame) else {
                warn!(channel = %channel.id(), "dropping empty frame");
                continue;
            };
            self.dispatch(header, payload, &writer);
        }
        self.teardown(&writer);
    }

    /// Route one frame to a worker. Returns immediately; the handler runs on
    /// its own task so the next read can be armed.
    fn dispatch(self: &Arc<Self>, header: u8, payload: Bytes, writer: &ChannelWriter) {
        let op = match header {
            protocol::HEADER_SESSION_OPEN_REQUEST => {
                self.spawn_invocation(payload, writer.clone(), true);
                return;
            }
            protocol::HEADER_INVOCATION_REQUEST => {
                self.spawn_invocation(payload, writer.clone(), false);
                return;
            }
            protocol::HEADER_TX_COMMIT_REQUEST => TransactionOperation::Commit,
            protocol::HEADER_TX_ROLLBACK_REQUEST => TransactionOperation::Rollback,
            protocol::HEADER_TX_PREPARE_REQUEST => TransactionOperation::Prepare,
            protocol::HEADER_TX_FORGET_REQUEST => TransactionOperation::Forget,
            protocol::HEADER_TX_BEFORE_COMPLETION_REQUEST => TransactionOperation::BeforeCompletion,
            other => {
                // Unknown header: the message is dropped, the channel stays up.
                counter!("tarpon_unknown_headers_total").increment(1);
                warn!(
                    channel = %writer.id(),
                    header = format_args!("{other:#04x}"),
                    "unsupported message header; dropping message"
                );
                return;
            }
        };

        let codec = self.codec.clone();
        let manager = self.transaction_manager.clone();
        let writer = writer.clone();
        tokio::spawn(async move {
            let result =
                handle_transaction_message(op, payload, codec.as_ref(), manager.as_ref(), &writer)
                    .await;
            if let Err(e) = result {
                handle_worker_failure(&writer, op.to_string(), e);
            }
        });
    }

    fn spawn_invocation(self: &Arc<Self>, payload: Bytes, writer: ChannelWriter, session: bool) {
        let invoker = self.invoker.clone();
        tokio::spawn(async move {
            let result = if session {
                invoker.open_session(payload, &writer).await
            } else {
                invoker.invoke(payload, &writer).await
            };
            if let Err(e) = result {
                let op = if session { "session-open" } else { "invocation" };
                handle_worker_failure(&writer, op.to_string(), e);
            }
        });
    }

    /// Release every resource tied to the channel. Exactly once.
    fn teardown(&self, writer: &ChannelWriter) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.availability_handle.lock().take() {
            self.deployments.remove_listener(handle);
        }
        if let Some(topology) = self.topology.lock().take() {
            topology.shutdown();
        }
        writer.close();
        counter!("tarpon_channels_closed_total").increment(1);
        info!(channel = %writer.id(), "channel dispatcher torn down");
    }
}

fn handle_worker_failure(writer: &ChannelWriter, op: String, error: TarponError) {
    if error.is_transport_fatal() {
        warn!(channel = %writer.id(), "closing channel after {op} failure: {error}");
        writer.close();
    } else {
        warn!(channel = %writer.id(), "{op} handler failed: {error}");
    }
}

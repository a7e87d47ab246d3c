//! Cluster topology push
//!
//! One notifier per channel. At start it sends a single complete-topology
//! message covering every known group, then subscribes to the registry and to
//! each group's membership feed. From then on the client sees incremental
//! messages only: new-cluster-formed, cluster-removed, nodes-added,
//! nodes-removed. Delivery is best-effort; a client that misses an update
//! resynchronizes by reconnecting, complete topology is only sent at channel
//! start.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use tarpon_api::PayloadCodec;
use tarpon_api::model::{
    ClusterMembership, ClusterNode, ClusterRemoved, ClusterTopology, ClusterView,
};
use tarpon_api::protocol::{
    self, HEADER_CLUSTER_FORMED, HEADER_CLUSTER_NODES_ADDED, HEADER_CLUSTER_NODES_REMOVED,
    HEADER_CLUSTER_REMOVED, HEADER_CLUSTER_TOPOLOGY_COMPLETE,
};

use crate::ListenerHandle;
use crate::channel::ChannelWriter;
use crate::cluster::{
    ClusterGroup, ClusterRegistry, ClusterRegistryListener, GroupMembershipListener,
};

pub struct TopologyNotifier {
    writer: ChannelWriter,
    codec: Arc<dyn PayloadCodec>,
    registry: Arc<ClusterRegistry>,
    registry_handle: Mutex<Option<ListenerHandle>>,
    group_handles: DashMap<String, ListenerHandle>,
    shut_down: AtomicBool,
}

impl TopologyNotifier {
    pub fn new(
        writer: ChannelWriter,
        codec: Arc<dyn PayloadCodec>,
        registry: Arc<ClusterRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            writer,
            codec,
            registry,
            registry_handle: Mutex::new(None),
            group_handles: DashMap::new(),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Replay the complete topology, then subscribe for incremental updates.
    pub async fn start(self: &Arc<Self>) {
        let groups = self.registry.groups();
        let topology = ClusterTopology {
            clusters: groups.iter().map(|g| view_of(g)).collect(),
        };
        debug!(
            channel = %self.writer.id(),
            clusters = topology.clusters.len(),
            "sending complete cluster topology"
        );
        match self.codec.encode_cluster_topology(&topology) {
            Ok(body) => {
                if let Err(e) = self
                    .writer
                    .send(protocol::frame(HEADER_CLUSTER_TOPOLOGY_COMPLETE, body))
                    .await
                {
                    warn!(channel = %self.writer.id(), "could not send cluster topology: {e}");
                }
            }
            Err(e) => warn!(channel = %self.writer.id(), "could not encode cluster topology: {e}"),
        }

        for group in &groups {
            self.listen_to(group);
        }
        let handle = self
            .registry
            .register_listener(self.clone() as Arc<dyn ClusterRegistryListener>);
        *self.registry_handle.lock() = Some(handle);
    }

    /// Release every subscription. Idempotent; safe under concurrent close
    /// paths.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.registry_handle.lock().take() {
            self.registry.unregister_listener(handle);
        }
        let names: Vec<String> = self.group_handles.iter().map(|e| e.key().clone()).collect();
        for name in names {
            if let Some((_, handle)) = self.group_handles.remove(&name)
                && let Some(group) = self.registry.group(&name)
            {
                group.unregister_listener(handle);
            }
        }
    }

    fn listen_to(&self, group: &Arc<ClusterGroup>) {
        let listener = Arc::new(GroupUpdateListener {
            writer: self.writer.clone(),
            codec: self.codec.clone(),
        });
        let handle = group.register_listener(listener);
        self.group_handles.insert(group.name().to_string(), handle);
    }

    async fn send_frame(&self, header: u8, body: bytes::Bytes, what: &str) {
        if let Err(e) = self.writer.send(protocol::frame(header, body)).await {
            warn!(channel = %self.writer.id(), "could not send {what} message: {e}");
        }
    }
}

fn view_of(group: &Arc<ClusterGroup>) -> ClusterView {
    ClusterView {
        group: group.name().to_string(),
        nodes: group.members(),
    }
}

#[async_trait::async_trait]
impl ClusterRegistryListener for TopologyNotifier {
    async fn group_registered(&self, group: &Arc<ClusterGroup>) {
        if self.shut_down.load(Ordering::SeqCst) {
            return;
        }
        debug!(channel = %self.writer.id(), group = %group.name(), "new cluster formed");
        match self.codec.encode_cluster_formed(&view_of(group)) {
            Ok(body) => {
                self.send_frame(HEADER_CLUSTER_FORMED, body, "cluster formation")
                    .await
            }
            Err(e) => {
                warn!(channel = %self.writer.id(), "could not encode cluster formation: {e}")
            }
        }
        self.listen_to(group);
    }

    async fn group_unregistered(&self, group: &Arc<ClusterGroup>) {
        if let Some((_, handle)) = self.group_handles.remove(group.name()) {
            group.unregister_listener(handle);
        }
        if self.shut_down.load(Ordering::SeqCst) {
            return;
        }
        debug!(channel = %self.writer.id(), group = %group.name(), "cluster removed");
        let removed = ClusterRemoved {
            group: group.name().to_string(),
        };
        match self.codec.encode_cluster_removed(&removed) {
            Ok(body) => {
                self.send_frame(HEADER_CLUSTER_REMOVED, body, "cluster removal")
                    .await
            }
            Err(e) => warn!(channel = %self.writer.id(), "could not encode cluster removal: {e}"),
        }
    }
}

/// Membership listener for one subscribed group, writing updates to the
/// channel. Merge events fall through to the ordinary changed path.
struct GroupUpdateListener {
    writer: ChannelWriter,
    codec: Arc<dyn PayloadCodec>,
}

impl GroupUpdateListener {
    async fn send_membership(&self, header: u8, group: &str, nodes: &[ClusterNode]) {
        let membership = ClusterMembership {
            group: group.to_string(),
            nodes: nodes.to_vec(),
        };
        let body = match self.codec.encode_cluster_membership(&membership) {
            Ok(body) => body,
            Err(e) => {
                warn!(channel = %self.writer.id(), "could not encode membership update: {e}");
                return;
            }
        };
        if let Err(e) = self.writer.send(protocol::frame(header, body)).await {
            warn!(
                channel = %self.writer.id(),
                group,
                "could not send membership update: {e}"
            );
        }
    }
}

#[async_trait::async_trait]
impl GroupMembershipListener for GroupUpdateListener {
    async fn membership_changed(
        &self,
        group: &str,
        removed: &[ClusterNode],
        added: &[ClusterNode],
        _current: &[ClusterNode],
    ) {
        if !removed.is_empty() {
            self.send_membership(HEADER_CLUSTER_NODES_REMOVED, group, removed)
                .await;
        }
        if !added.is_empty() {
            self.send_membership(HEADER_CLUSTER_NODES_ADDED, group, added)
                .await;
        }
    }
}

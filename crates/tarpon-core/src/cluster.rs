//! Cluster group registry and membership events
//!
//! The server process may belong to any number of independently tracked
//! cluster groups. Each group carries its own member set and its own
//! membership listeners; the registry tracks which groups exist and notifies
//! listeners as groups appear and disappear. Listener sets are keyed by
//! opaque handles so releasing a subscription is explicit and idempotent.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::{debug, info};

use tarpon_api::model::ClusterNode;

use crate::ListenerHandle;

/// Receives membership changes for one cluster group.
#[async_trait::async_trait]
pub trait GroupMembershipListener: Send + Sync {
    async fn membership_changed(
        &self,
        group: &str,
        removed: &[ClusterNode],
        added: &[ClusterNode],
        current: &[ClusterNode],
    );

    /// Membership change produced by a merge of partitions. Carries the
    /// pre-merge origin groups; the default treats it as an ordinary change
    /// (always-notify, no provenance-based suppression).
    async fn membership_merged(
        &self,
        group: &str,
        removed: &[ClusterNode],
        added: &[ClusterNode],
        current: &[ClusterNode],
        origins: &[Vec<ClusterNode>],
    ) {
        let _ = origins;
        self.membership_changed(group, removed, added, current).await;
    }
}

/// One named cluster group with a live member set.
pub struct ClusterGroup {
    name: String,
    members: DashMap<String, ClusterNode>,
    listeners: DashMap<u64, Arc<dyn GroupMembershipListener>>,
    next_listener: AtomicU64,
}

impl ClusterGroup {
    fn new(name: String, initial: Vec<ClusterNode>) -> Self {
        let members = DashMap::new();
        for node in initial {
            members.insert(node.name.clone(), node);
        }
        Self {
            name,
            members,
            listeners: DashMap::new(),
            next_listener: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> Vec<ClusterNode> {
        self.members.iter().map(|e| e.value().clone()).collect()
    }

    pub fn register_listener(&self, listener: Arc<dyn GroupMembershipListener>) -> ListenerHandle {
        let handle = ListenerHandle(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.insert(handle.0, listener);
        debug!(group = %self.name, listeners = self.listeners.len(), "membership listener registered");
        handle
    }

    /// Release a membership subscription. No-op if already released.
    pub fn unregister_listener(&self, handle: ListenerHandle) -> bool {
        self.listeners.remove(&handle.0).is_some()
    }

    /// Replace the member set, notifying listeners of the diff.
    pub async fn update_members(&self, members: Vec<ClusterNode>) {
        let (removed, added, current) = self.apply(members);
        if removed.is_empty() && added.is_empty() {
            return;
        }
        for listener in self.snapshot_listeners() {
            listener
                .membership_changed(&self.name, &removed, &added, &current)
                .await;
        }
    }

    /// Replace the member set as the result of a partition merge.
    ///
    /// Added/removed sets are delivered exactly as for an ordinary change;
    /// origin groups are carried for listeners that care about provenance.
    pub async fn merge_members(&self, members: Vec<ClusterNode>, origins: Vec<Vec<ClusterNode>>) {
        let (removed, added, current) = self.apply(members);
        if removed.is_empty() && added.is_empty() {
            return;
        }
        for listener in self.snapshot_listeners() {
            listener
                .membership_merged(&self.name, &removed, &added, &current, &origins)
                .await;
        }
    }

    fn apply(
        &self,
        members: Vec<ClusterNode>,
    ) -> (Vec<ClusterNode>, Vec<ClusterNode>, Vec<ClusterNode>) {
        let mut added = Vec::new();
        for node in &members {
            if !self.members.contains_key(&node.name) {
                added.push(node.clone());
            }
        }
        let mut removed = Vec::new();
        for entry in self.members.iter() {
            if !members.iter().any(|n| n.name == *entry.key()) {
                removed.push(entry.value().clone());
            }
        }
        for node in &removed {
            self.members.remove(&node.name);
        }
        for node in &added {
            self.members.insert(node.name.clone(), node.clone());
        }
        if !removed.is_empty() || !added.is_empty() {
            info!(
                group = %self.name,
                removed = removed.len(),
                added = added.len(),
                "cluster membership changed"
            );
        }
        (removed, added, self.members())
    }

    fn snapshot_listeners(&self) -> Vec<Arc<dyn GroupMembershipListener>> {
        self.listeners.iter().map(|e| e.value().clone()).collect()
    }
}

/// Receives group lifecycle events from the registry.
#[async_trait::async_trait]
pub trait ClusterRegistryListener: Send + Sync {
    async fn group_registered(&self, group: &Arc<ClusterGroup>);
    async fn group_unregistered(&self, group: &Arc<ClusterGroup>);
}

/// Registry of every cluster group this server is currently a member of.
pub struct ClusterRegistry {
    groups: DashMap<String, Arc<ClusterGroup>>,
    listeners: DashMap<u64, Arc<dyn ClusterRegistryListener>>,
    next_listener: AtomicU64,
}

impl Default for ClusterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterRegistry {
    pub fn new() -> Self {
        Self {
            groups: DashMap::new(),
            listeners: DashMap::new(),
            next_listener: AtomicU64::new(0),
        }
    }

    pub fn groups(&self) -> Vec<Arc<ClusterGroup>> {
        self.groups.iter().map(|e| e.value().clone()).collect()
    }

    pub fn group(&self, name: &str) -> Option<Arc<ClusterGroup>> {
        self.groups.get(name).map(|e| e.value().clone())
    }

    /// Start tracking a group. Returns the existing group without events if
    /// one with this name is already registered.
    pub async fn register_group(
        &self,
        name: impl Into<String>,
        members: Vec<ClusterNode>,
    ) -> Arc<ClusterGroup> {
        let name = name.into();
        if let Some(existing) = self.group(&name) {
            return existing;
        }
        let group = Arc::new(ClusterGroup::new(name.clone(), members));
        self.groups.insert(name.clone(), group.clone());
        info!(group = %name, members = group.members.len(), "cluster group registered");
        for listener in self.snapshot_listeners() {
            listener.group_registered(&group).await;
        }
        group
    }

    /// Stop tracking a group. No-op (and no events) for an unknown name.
    pub async fn unregister_group(&self, name: &str) -> bool {
        let Some((_, group)) = self.groups.remove(name) else {
            return false;
        };
        info!(group = %name, "cluster group unregistered");
        for listener in self.snapshot_listeners() {
            listener.group_unregistered(&group).await;
        }
        true
    }

    pub fn register_listener(&self, listener: Arc<dyn ClusterRegistryListener>) -> ListenerHandle {
        let handle = ListenerHandle(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.insert(handle.0, listener);
        handle
    }

    /// Release a registry subscription. No-op if already released.
    pub fn unregister_listener(&self, handle: ListenerHandle) -> bool {
        self.listeners.remove(&handle.0).is_some()
    }

    fn snapshot_listeners(&self) -> Vec<Arc<dyn ClusterRegistryListener>> {
        self.listeners.iter().map(|e| e.value().clone()).collect()
    }
}

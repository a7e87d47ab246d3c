//! Transaction-recovery resource registry
//!
//! Tracks the receiver context of every live remote peer session. After a
//! crash, the external recovery manager asks this registry for recoverable
//! resource handles, one per peer that might hold a prepared-but-undecided
//! transaction branch, and interrogates the peers through them. Handles are
//! materialized on demand and never persisted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

/// Identifies one logical remote peer session usable for recovery.
///
/// Created when a peer announces itself to the transport layer, destroyed
/// when its session ends. Identity is the session id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceiverContext {
    pub session_id: String,
    pub peer_address: String,
}

impl ReceiverContext {
    pub fn new(session_id: impl Into<String>, peer_address: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            peer_address: peer_address.into(),
        }
    }
}

/// "A prepared-but-undecided branch may exist on the peer reachable through
/// this context."
#[derive(Clone, Debug)]
pub struct RecoverableResource {
    pub node_name: String,
    pub context: ReceiverContext,
}

/// Handle returned when a resource source is registered with the recovery
/// manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SourceHandle(pub u64);

/// Anything that can enumerate recoverable resources on demand.
pub trait ResourceSource: Send + Sync {
    fn recoverable_resources(&self) -> Vec<RecoverableResource>;
}

/// The external crash-recovery manager. It periodically polls every
/// registered source from its own recovery thread.
pub trait RecoveryManager: Send + Sync {
    fn register_source(&self, source: Arc<dyn ResourceSource>) -> SourceHandle;
    fn unregister_source(&self, handle: SourceHandle) -> bool;
}

/// Registry of live peer sessions, registered as one resource source.
///
/// The context list sits behind a read-write lock so a snapshot is consistent
/// at one instant and never blocks registration for long; the original used a
/// synchronized list for the same reason.
pub struct RecoveryRegistry {
    node_name: String,
    manager: Arc<dyn RecoveryManager>,
    contexts: RwLock<Vec<ReceiverContext>>,
    registration: Mutex<Option<SourceHandle>>,
    running: AtomicBool,
}

impl RecoveryRegistry {
    pub fn new(node_name: impl Into<String>, manager: Arc<dyn RecoveryManager>) -> Arc<Self> {
        Arc::new(Self {
            node_name: node_name.into(),
            manager,
            contexts: RwLock::new(Vec::new()),
            registration: Mutex::new(None),
            running: AtomicBool::new(false),
        })
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Register with the recovery manager. Idempotent.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let handle = self
            .manager
            .register_source(self.clone() as Arc<dyn ResourceSource>);
        *self.registration.lock() = Some(handle);
        debug!(node = %self.node_name, "recovery registry registered with recovery manager");
    }

    /// Clear all tracked peers and deregister. Idempotent; after this no
    /// handles are produced until `start` is called again.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.contexts.write().clear();
        if let Some(handle) = self.registration.lock().take() {
            self.manager.unregister_source(handle);
        }
        debug!(node = %self.node_name, "recovery registry deregistered from recovery manager");
    }

    /// Track a peer session. A context is held at most once.
    pub fn register_peer(&self, context: ReceiverContext) {
        let mut contexts = self.contexts.write();
        if !contexts.contains(&context) {
            contexts.push(context);
        }
    }

    /// Stop tracking a peer session. No-op for unknown contexts.
    pub fn unregister_peer(&self, context: &ReceiverContext) {
        self.contexts.write().retain(|c| c != context);
    }

    pub fn peer_count(&self) -> usize {
        self.contexts.read().len()
    }
}

impl ResourceSource for RecoveryRegistry {
    fn recoverable_resources(&self) -> Vec<RecoverableResource> {
        if !self.running.load(Ordering::SeqCst) {
            return Vec::new();
        }
        self.contexts
            .read()
            .iter()
            .map(|context| RecoverableResource {
                node_name: self.node_name.clone(),
                context: context.clone(),
            })
            .collect()
    }
}

//! Deployment feed
//!
//! Tracks which remote-invokable modules are currently deployed and fans
//! add/remove events out to listeners. A freshly added listener is replayed
//! the current module set so a client never has to poll.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::debug;

use tarpon_api::model::ModuleId;

use crate::ListenerHandle;

/// Receives deployment feed events.
#[async_trait::async_trait]
pub trait DeploymentListener: Send + Sync {
    /// Called once, at registration, with the modules deployed right now.
    async fn listener_registered(&self, current: &[ModuleId]);

    async fn module_deployed(&self, module: &ModuleId);

    async fn module_undeployed(&self, module: &ModuleId);
}

/// The set of currently deployed modules plus its listeners.
pub struct DeploymentRepository {
    modules: DashMap<ModuleId, ()>,
    listeners: DashMap<u64, Arc<dyn DeploymentListener>>,
    next_listener: AtomicU64,
}

impl Default for DeploymentRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl DeploymentRepository {
    pub fn new() -> Self {
        Self {
            modules: DashMap::new(),
            listeners: DashMap::new(),
            next_listener: AtomicU64::new(0),
        }
    }

    pub fn modules(&self) -> Vec<ModuleId> {
        self.modules.iter().map(|e| e.key().clone()).collect()
    }

    /// Register a listener and replay the current module set to it.
    pub async fn add_listener(&self, listener: Arc<dyn DeploymentListener>) -> ListenerHandle {
        let handle = ListenerHandle(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.insert(handle.0, listener.clone());
        let current = self.modules();
        listener.listener_registered(&current).await;
        handle
    }

    /// Release a listener. No-op if already released.
    pub fn remove_listener(&self, handle: ListenerHandle) -> bool {
        self.listeners.remove(&handle.0).is_some()
    }

    /// Mark a module deployed; duplicate deploys are silent.
    pub async fn deploy(&self, module: ModuleId) {
        if self.modules.insert(module.clone(), ()).is_some() {
            return;
        }
        debug!(module = %module, "module deployed");
        for listener in self.snapshot_listeners() {
            listener.module_deployed(&module).await;
        }
    }

    /// Mark a module undeployed; unknown modules are silent.
    pub async fn undeploy(&self, module: &ModuleId) {
        if self.modules.remove(module).is_none() {
            return;
        }
        debug!(module = %module, "module undeployed");
        for listener in self.snapshot_listeners() {
            listener.module_undeployed(module).await;
        }
    }

    fn snapshot_listeners(&self) -> Vec<Arc<dyn DeploymentListener>> {
        self.listeners.iter().map(|e| e.value().clone()).collect()
    }
}

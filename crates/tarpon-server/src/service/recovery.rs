//! Periodic recovery scanner
//!
//! A minimal stand-in for a full crash-recovery subsystem: registered
//! resource sources are polled on a fixed interval and any recoverable
//! resources they report are logged and counted. The scan itself never
//! touches the peers; interrogation belongs to the transaction manager.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use metrics::gauge;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use tarpon_core::recovery::{RecoveryManager, ResourceSource, SourceHandle};

pub struct PeriodicRecoveryManager {
    sources: DashMap<u64, Arc<dyn ResourceSource>>,
    next_handle: AtomicU64,
    scan_interval: Duration,
    scan_task: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicRecoveryManager {
    pub fn new(scan_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            sources: DashMap::new(),
            next_handle: AtomicU64::new(0),
            scan_interval,
            scan_task: Mutex::new(None),
        })
    }

    /// Begin periodic scanning. Idempotent.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.scan_task.lock();
        if task.is_some() {
            return;
        }
        let manager = self.clone();
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.scan_interval);
            // the immediate first tick would scan before anything registered
            ticker.tick().await;
            loop {
                ticker.tick().await;
                manager.scan();
            }
        }));
        info!(interval = ?self.scan_interval, "recovery scanner started");
    }

    pub fn stop(&self) {
        if let Some(task) = self.scan_task.lock().take() {
            task.abort();
            info!("recovery scanner stopped");
        }
    }

    fn scan(&self) {
        let sources: Vec<Arc<dyn ResourceSource>> =
            self.sources.iter().map(|e| e.value().clone()).collect();
        let mut total = 0usize;
        for source in sources {
            for resource in source.recoverable_resources() {
                debug!(
                    node = %resource.node_name,
                    session = %resource.context.session_id,
                    peer = %resource.context.peer_address,
                    "recovery scan found in-doubt candidate"
                );
                total += 1;
            }
        }
        gauge!("tarpon_recovery_resources").set(total as f64);
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }
}

impl RecoveryManager for PeriodicRecoveryManager {
    fn register_source(&self, source: Arc<dyn ResourceSource>) -> SourceHandle {
        let handle = SourceHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.sources.insert(handle.0, source);
        handle
    }

    fn unregister_source(&self, handle: SourceHandle) -> bool {
        self.sources.remove(&handle.0).is_some()
    }
}

impl Drop for PeriodicRecoveryManager {
    fn drop(&mut self) {
        self.stop();
    }
}

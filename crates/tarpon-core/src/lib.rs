//! Tarpon Core - Channel dispatch and transaction coordination
//!
//! This crate provides:
//! - The message-framed channel abstraction and its transport seam
//! - The header-based channel message dispatcher
//! - The transaction-control path into a local transaction manager
//! - Cluster registry with per-channel topology push
//! - Deployment repository with per-channel availability push
//! - The transaction-recovery resource registry

pub mod availability;
pub mod channel;
pub mod cluster;
pub mod deployment;
pub mod dispatcher;
pub mod invocation;
pub mod recovery;
pub mod topology;
pub mod transaction;

// Re-export commonly used types
pub use channel::{Channel, ChannelTransport, ChannelWriter, TransportInbound, TransportOutbound};
pub use cluster::{ClusterGroup, ClusterRegistry, ClusterRegistryListener, GroupMembershipListener};
pub use deployment::{DeploymentListener, DeploymentRepository};
pub use dispatcher::ChannelDispatcher;
pub use invocation::ComponentInvoker;
pub use recovery::{
    ReceiverContext, RecoverableResource, RecoveryManager, RecoveryRegistry, ResourceSource,
    SourceHandle,
};
pub use transaction::{
    PrepareResult, TransactionError, TransactionManager, TransactionOperation,
    handle_transaction_message,
};

/// Opaque handle for a registered listener; releasing it is idempotent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerHandle(pub(crate) u64);

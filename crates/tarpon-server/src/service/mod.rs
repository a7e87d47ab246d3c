//! Default collaborator implementations

pub mod invoker;
pub mod recovery;
pub mod transaction;

pub use invoker::NoopComponentInvoker;
pub use recovery::PeriodicRecoveryManager;
pub use transaction::InMemoryTransactionManager;

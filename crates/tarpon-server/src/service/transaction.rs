//! In-memory transaction manager
//!
//! Tracks subordinate transaction branches in process memory with no
//! persistence. Good enough for single-node deployments and for exercising
//! the full control path; a durable manager plugs in behind the same trait.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use tarpon_api::model::TransactionId;
use tarpon_core::transaction::{PrepareResult, TransactionError, TransactionManager};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TxState {
    Active,
    Prepared,
}

#[derive(Default)]
pub struct InMemoryTransactionManager {
    transactions: DashMap<TransactionId, TxState>,
}

impl InMemoryTransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enlist a transaction branch. Invoked when an incoming invocation
    /// carries a transaction context the manager has not seen yet.
    pub fn begin(&self, transaction_id: TransactionId) {
        self.transactions.insert(transaction_id, TxState::Active);
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

#[async_trait]
impl TransactionManager for InMemoryTransactionManager {
    async fn prepare(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<PrepareResult, TransactionError> {
        let Some(mut entry) = self.transactions.get_mut(transaction_id) else {
            return Err(TransactionError::Unknown(transaction_id.clone()));
        };
        *entry = TxState::Prepared;
        debug!(transaction = %transaction_id, "prepared");
        Ok(PrepareResult::Committable)
    }

    async fn commit(
        &self,
        transaction_id: &TransactionId,
        one_phase: bool,
    ) -> Result<(), TransactionError> {
        let Some(entry) = self.transactions.get(transaction_id) else {
            return Err(TransactionError::Unknown(transaction_id.clone()));
        };
        let state = *entry;
        drop(entry);

        match state {
            TxState::Prepared => {}
            TxState::Active if one_phase => {}
            TxState::Active => {
                return Err(TransactionError::NotPrepared(transaction_id.clone()));
            }
        }
        self.transactions.remove(transaction_id);
        debug!(transaction = %transaction_id, one_phase, "committed");
        Ok(())
    }

    async fn rollback(&self, transaction_id: &TransactionId) -> Result<(), TransactionError> {
        if self.transactions.remove(transaction_id).is_none() {
            return Err(TransactionError::Unknown(transaction_id.clone()));
        }
        debug!(transaction = %transaction_id, "rolled back");
        Ok(())
    }

    async fn forget(&self, transaction_id: &TransactionId) -> Result<(), TransactionError> {
        if self.transactions.remove(transaction_id).is_none() {
            return Err(TransactionError::Unknown(transaction_id.clone()));
        }
        debug!(transaction = %transaction_id, "forgotten");
        Ok(())
    }

    async fn before_completion(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<(), TransactionError> {
        match self.transactions.get(transaction_id).map(|e| *e) {
            Some(TxState::Active) => Ok(()),
            Some(TxState::Prepared) => Err(TransactionError::System(format!(
                "transaction '{transaction_id}' already prepared"
            ))),
            None => Err(TransactionError::Unknown(transaction_id.clone())),
        }
    }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;

use crate::common::types::TxnId;
use crate::transaction::concurrency::lock_manager::LockManager;
use crate::transaction::concurrency::transaction::{
    IsolationLevel, Transaction, TransactionState,
};

/// Global transaction registry
///
/// Assigns ids monotonically, so a smaller id always means an older
/// transaction — the ordering wound-wait relies on. Records stay
/// reachable through their `Arc` even after retirement, which keeps a
/// lock-queue entry's referent alive for as long as the queue needs it.
pub struct TransactionManager {
    next_txn_id: AtomicU32,
    transactions: Mutex<HashMap<TxnId, Arc<Transaction>>>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            next_txn_id: AtomicU32::new(0),
            transactions: Mutex::new(HashMap::new()),
        }
    }

    /// Start a new transaction in the growing phase
    pub fn begin(&self, isolation_level: IsolationLevel) -> Arc<Transaction> {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let txn = Arc::new(Transaction::new(txn_id, isolation_level));
        self.transactions.lock().insert(txn_id, txn.clone());
        txn
    }

    pub fn get_transaction(&self, txn_id: TxnId) -> Option<Arc<Transaction>> {
        self.transactions.lock().get(&txn_id).cloned()
    }

    /// Commit: release every lock and retire the record
    pub fn commit(&self, txn: &Transaction, lock_manager: &LockManager) {
        txn.set_state(TransactionState::Committed);
        lock_manager.release_all(txn);
        self.transactions.lock().remove(&txn.id());
    }

    /// Abort: release every lock and retire the record
    pub fn abort(&self, txn: &Transaction, lock_manager: &LockManager) {
        txn.set_state(TransactionState::Aborted);
        lock_manager.release_all(txn);
        self.transactions.lock().remove(&txn.id());
    }

    pub fn active_transaction_ids(&self) -> Vec<TxnId> {
        self.transactions.lock().keys().copied().collect()
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

use std::collections::HashMap;
use std::sync::Arc;
use log::warn;
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::common::types::{Rid, TxnId, INVALID_TXN_ID};
use crate::transaction::concurrency::transaction::{
    AbortReason, IsolationLevel, Transaction, TransactionAbort, TransactionState,
};
use crate::transaction::concurrency::transaction_manager::TransactionManager;

/// Lock modes on a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug)]
struct LockRequest {
    txn_id: TxnId,
    mode: LockMode,
    granted: bool,
}

impl LockRequest {
    fn new(txn_id: TxnId, mode: LockMode) -> Self {
        Self {
            txn_id,
            mode,
            granted: false,
        }
    }
}

struct QueueState {
    /// Requests in arrival order
    requests: Vec<LockRequest>,
    /// Transaction with an upgrade in flight, at most one per record
    upgrading: TxnId,
}

struct LockRequestQueue {
    state: Mutex<QueueState>,
    cv: Condvar,
}

impl LockRequestQueue {
    fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                requests: Vec::new(),
                upgrading: INVALID_TXN_ID,
            }),
            cv: Condvar::new(),
        }
    }
}

/// Two-phase locking with wound-wait deadlock prevention
///
/// Each record id has a queue of requests in arrival order. An arriving
/// request wounds every younger conflicting transaction (their state
/// flips to `Aborted` and the queue is signalled), then waits until no
/// older live request conflicts. Smaller transaction id means older, so
/// waits only ever point from younger to older and no cycle can form.
pub struct LockManager {
    txn_manager: Arc<TransactionManager>,
    lock_table: Mutex<HashMap<Rid, Arc<LockRequestQueue>>>,
}

impl LockManager {
    pub fn new(txn_manager: Arc<TransactionManager>) -> Self {
        Self {
            txn_manager,
            lock_table: Mutex::new(HashMap::new()),
        }
    }

    /// Take a shared lock on `rid`, blocking until no older live
    /// exclusive request remains ahead
    ///
    /// Returns `Ok(false)` when the transaction is (or becomes) aborted.
    pub fn lock_shared(&self, txn: &Transaction, rid: Rid) -> Result<bool, TransactionAbort> {
        if !self.pre_check(txn, LockMode::Shared)? {
            return Ok(false);
        }

        let queue = self.queue_for(rid);
        let mut state = queue.state.lock();
        state.requests.push(LockRequest::new(txn.id(), LockMode::Shared));
        txn.add_shared_lock(rid);
        if self.wound_younger(&mut state, txn.id(), LockMode::Shared) {
            queue.cv.notify_all();
        }

        self.wait_for_grant(&queue, &mut state, txn, LockMode::Shared)
    }

    /// Take an exclusive lock on `rid`, blocking until no older live
    /// request of any mode remains ahead
    pub fn lock_exclusive(&self, txn: &Transaction, rid: Rid) -> Result<bool, TransactionAbort> {
        if !self.pre_check(txn, LockMode::Exclusive)? {
            return Ok(false);
        }

        let queue = self.queue_for(rid);
        let mut state = queue.state.lock();
        state
            .requests
            .push(LockRequest::new(txn.id(), LockMode::Exclusive));
        txn.add_exclusive_lock(rid);
        if self.wound_younger(&mut state, txn.id(), LockMode::Exclusive) {
            queue.cv.notify_all();
        }

        self.wait_for_grant(&queue, &mut state, txn, LockMode::Exclusive)
    }

    /// Convert a granted shared lock into an exclusive one
    ///
    /// Only one upgrade may be in flight per record; a second one aborts
    /// with `UpgradeConflict`. A missing, ungranted, or already-exclusive
    /// request yields `Ok(false)`.
    pub fn lock_upgrade(&self, txn: &Transaction, rid: Rid) -> Result<bool, TransactionAbort> {
        if !self.pre_check_upgrade(txn)? {
            return Ok(false);
        }

        let queue = match self.existing_queue(rid) {
            Some(queue) => queue,
            None => return Ok(false),
        };
        let mut state = queue.state.lock();

        if state.upgrading != INVALID_TXN_ID {
            txn.set_state(TransactionState::Aborted);
            return Err(TransactionAbort::new(txn.id(), AbortReason::UpgradeConflict));
        }

        let pos = match state.requests.iter().position(|r| r.txn_id == txn.id()) {
            Some(pos) => pos,
            None => return Ok(false),
        };
        if !state.requests[pos].granted || state.requests[pos].mode == LockMode::Exclusive {
            return Ok(false);
        }

        state.upgrading = txn.id();
        state.requests[pos].mode = LockMode::Exclusive;
        txn.remove_shared_lock(rid);
        txn.add_exclusive_lock(rid);
        if self.wound_younger(&mut state, txn.id(), LockMode::Exclusive) {
            queue.cv.notify_all();
        }

        let granted = self.wait_for_grant(&queue, &mut state, txn, LockMode::Exclusive)?;
        state.upgrading = INVALID_TXN_ID;
        Ok(granted)
    }

    /// Release the lock held on `rid`
    ///
    /// Under `RepeatableRead` the first unlock ends the growing phase.
    /// Returns `false` when the transaction holds no request on the
    /// record.
    pub fn unlock(&self, txn: &Transaction, rid: Rid) -> bool {
        if txn.isolation_level() == IsolationLevel::RepeatableRead
            && txn.state() == TransactionState::Growing
        {
            txn.set_state(TransactionState::Shrinking);
        }
        txn.remove_shared_lock(rid);
        txn.remove_exclusive_lock(rid);

        let queue = match self.existing_queue(rid) {
            Some(queue) => queue,
            None => return false,
        };
        let mut state = queue.state.lock();
        let pos = match state.requests.iter().position(|r| r.txn_id == txn.id()) {
            Some(pos) => pos,
            None => return false,
        };
        state.requests.remove(pos);
        drop(state);
        queue.cv.notify_all();
        true
    }

    /// Release every lock the transaction still holds
    pub fn release_all(&self, txn: &Transaction) {
        for rid in txn.locked_rids() {
            self.unlock(txn, rid);
        }
    }

    fn queue_for(&self, rid: Rid) -> Arc<LockRequestQueue> {
        self.lock_table
            .lock()
            .entry(rid)
            .or_insert_with(|| Arc::new(LockRequestQueue::new()))
            .clone()
    }

    fn existing_queue(&self, rid: Rid) -> Option<Arc<LockRequestQueue>> {
        self.lock_table.lock().get(&rid).cloned()
    }

    fn pre_check(&self, txn: &Transaction, mode: LockMode) -> Result<bool, TransactionAbort> {
        if txn.state() == TransactionState::Shrinking {
            txn.set_state(TransactionState::Aborted);
            return Err(TransactionAbort::new(txn.id(), AbortReason::LockOnShrinking));
        }
        if mode == LockMode::Shared && txn.isolation_level() == IsolationLevel::ReadUncommitted {
            txn.set_state(TransactionState::Aborted);
            return Err(TransactionAbort::new(
                txn.id(),
                AbortReason::LockSharedOnReadUncommitted,
            ));
        }
        Ok(txn.state() != TransactionState::Aborted)
    }

    fn pre_check_upgrade(&self, txn: &Transaction) -> Result<bool, TransactionAbort> {
        if txn.state() == TransactionState::Shrinking {
            txn.set_state(TransactionState::Aborted);
            return Err(TransactionAbort::new(txn.id(), AbortReason::LockOnShrinking));
        }
        Ok(txn.state() != TransactionState::Aborted)
    }

    /// Whether `other` conflicts with an acquisition in `mode`: a shared
    /// request yields only to older exclusive requests, an exclusive
    /// request to any older one
    fn conflicts(mode: LockMode, other: LockMode) -> bool {
        mode == LockMode::Exclusive || other == LockMode::Exclusive
    }

    fn is_live(&self, txn_id: TxnId) -> bool {
        match self.txn_manager.get_transaction(txn_id) {
            Some(txn) => txn.state() != TransactionState::Aborted,
            None => false,
        }
    }

    /// An older live request ahead of `txn_id` that conflicts with `mode`
    fn older_conflict_exists(&self, state: &QueueState, txn_id: TxnId, mode: LockMode) -> bool {
        state
            .requests
            .iter()
            .any(|r| r.txn_id < txn_id && Self::conflicts(mode, r.mode) && self.is_live(r.txn_id))
    }

    /// Abort every younger transaction whose request conflicts with an
    /// acquisition in `mode`; returns whether anything was wounded
    fn wound_younger(&self, state: &mut QueueState, txn_id: TxnId, mode: LockMode) -> bool {
        let mut wounded = false;
        for request in state.requests.iter_mut() {
            if request.txn_id <= txn_id || !Self::conflicts(mode, request.mode) {
                continue;
            }
            if let Some(other) = self.txn_manager.get_transaction(request.txn_id) {
                if other.state() != TransactionState::Aborted {
                    warn!("txn {} wounds younger txn {}", txn_id, request.txn_id);
                    other.set_state(TransactionState::Aborted);
                    request.granted = false;
                    wounded = true;
                }
            }
        }
        wounded
    }

    /// Block on the queue's condition variable until the request can be
    /// granted or the caller has been wounded
    fn wait_for_grant(
        &self,
        queue: &LockRequestQueue,
        state: &mut MutexGuard<'_, QueueState>,
        txn: &Transaction,
        mode: LockMode,
    ) -> Result<bool, TransactionAbort> {
        loop {
            if txn.state() == TransactionState::Aborted {
                return Ok(false);
            }
            if !self.older_conflict_exists(state, txn.id(), mode) {
                break;
            }
            queue.cv.wait(state);
        }

        if let Some(request) = state.requests.iter_mut().find(|r| r.txn_id == txn.id()) {
            request.granted = true;
        }
        Ok(true)
    }
}

pub mod concurrency;

pub use concurrency::lock_manager::{LockManager, LockMode};
pub use concurrency::transaction::{
    AbortReason, IsolationLevel, Transaction, TransactionAbort, TransactionState,
};
pub use concurrency::transaction_manager::TransactionManager;

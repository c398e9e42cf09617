//! Transaction coordinator seam.
//!
//! The cache manager never mutates the shared cache from inside an open
//! transaction. It asks the coordinator whether one is open and, for
//! invalidation, registers a commit hook instead of acting immediately.

/// Zero-argument callback run after a successful commit.
pub type CommitCallback = Box<dyn FnOnce() + Send + 'static>;

/// Ambient transaction context.
///
/// # Contract
///
/// - `on_commit` callbacks run exactly once, only after the enclosing
///   transaction commits, in registration order.
/// - Callbacks registered in a transaction that rolls back are dropped
///   without running.
/// - Called outside any transaction, `on_commit` runs the callback
///   immediately and synchronously.
pub trait TransactionCoordinator: Send + Sync {
    /// Whether the calling code is inside an open transaction.
    fn in_transaction(&self) -> bool;

    /// Register a callback to run after the enclosing transaction commits.
    fn on_commit(&self, callback: CommitCallback);
}

/// Coordinator for storage engines without transactions.
///
/// Every write is final as soon as it returns, so commit hooks run at once.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTransactions;

impl TransactionCoordinator for NoTransactions {
    fn in_transaction(&self) -> bool {
        false
    }

    fn on_commit(&self, callback: CommitCallback) {
        callback();
    }
}

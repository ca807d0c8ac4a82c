//! Unit of work with deferred callbacks.
//!
//! A [`Transaction`] collects work that must only happen once the write is
//! durable (`call_after`) or only if it is abandoned (`call_on_exception`).
//! [`run_interaction`] owns the lifecycle: it begins the backend transaction,
//! runs the body, commits or rolls back, and only then runs the matching
//! callbacks, in registration order, outside the backend's commit.
//!
//! # Lifecycle
//!
//! ```text
//! begin ──→ body ──Ok──→ commit ──Ok──→ after-callbacks
//!             │            │
//!            Err          Err
//!             └─────┬──────┘
//!                rollback ──→ exception-callbacks
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use cachewire_core::{CachewireResult, TransactionError};

/// Deferred action attached to a transaction.
pub type Callback = Box<dyn FnOnce() -> CachewireResult<()> + Send>;

/// An open unit of work.
pub struct Transaction {
    description: String,
    after_callbacks: Vec<Callback>,
    exception_callbacks: Vec<Callback>,
}

impl Transaction {
    fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            after_callbacks: Vec::new(),
            exception_callbacks: Vec::new(),
        }
    }

    /// Name of the interaction, used in logs and errors.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Run `callback` after the transaction commits. Never runs on rollback.
    pub fn call_after<F>(&mut self, callback: F)
    where
        F: FnOnce() -> CachewireResult<()> + Send + 'static,
    {
        self.after_callbacks.push(Box::new(callback));
    }

    /// Run `callback` if the transaction is rolled back.
    pub fn call_on_exception<F>(&mut self, callback: F)
    where
        F: FnOnce() -> CachewireResult<()> + Send + 'static,
    {
        self.exception_callbacks.push(Box::new(callback));
    }

    /// Number of post-commit callbacks scheduled so far.
    pub fn pending_after_callbacks(&self) -> usize {
        self.after_callbacks.len()
    }

    /// Run the post-commit callbacks in order, stopping at the first failure.
    fn run_after_callbacks(self) -> CachewireResult<()> {
        let description = self.description;
        for (index, callback) in self.after_callbacks.into_iter().enumerate() {
            if let Err(err) = callback() {
                tracing::error!(
                    txn = %description,
                    index,
                    error = %err,
                    "Post-commit callback failed, skipping remaining callbacks"
                );
                return Err(TransactionError::CallbackFailed {
                    description,
                    index,
                    reason: err.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Run every exception callback. Failures are logged, not returned, so the
    /// original error reaches the caller.
    fn run_exception_callbacks(self) {
        for (index, callback) in self.exception_callbacks.into_iter().enumerate() {
            if let Err(err) = callback() {
                tracing::warn!(
                    txn = %self.description,
                    index,
                    error = %err,
                    "Rollback callback failed"
                );
            }
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("description", &self.description)
            .field("after_callbacks", &self.after_callbacks.len())
            .field("exception_callbacks", &self.exception_callbacks.len())
            .finish()
    }
}

/// Backend that makes a transaction's changes durable.
pub trait TransactionBackend: Send + Sync {
    fn begin(&self, description: &str) -> CachewireResult<()>;

    fn commit(&self, description: &str) -> CachewireResult<()>;

    fn rollback(&self, description: &str) -> CachewireResult<()>;
}

/// Run `body` inside a transaction on `backend`.
///
/// Post-commit callbacks run only after `commit` succeeds. A failing
/// post-commit callback is reported as [`TransactionError::CallbackFailed`];
/// the write stays committed and is not retried.
pub fn run_interaction<B, T, F>(backend: &B, description: &str, body: F) -> CachewireResult<T>
where
    B: TransactionBackend + ?Sized,
    F: FnOnce(&mut Transaction) -> CachewireResult<T>,
{
    backend.begin(description)?;
    let mut txn = Transaction::new(description);

    let value = match body(&mut txn) {
        Ok(value) => value,
        Err(err) => {
            abort(backend, txn);
            return Err(err);
        }
    };

    if let Err(err) = backend.commit(description) {
        abort(backend, txn);
        return Err(err);
    }

    tracing::debug!(
        txn = description,
        callbacks = txn.pending_after_callbacks(),
        "Transaction committed"
    );
    txn.run_after_callbacks()?;
    Ok(value)
}

fn abort<B: TransactionBackend + ?Sized>(backend: &B, txn: Transaction) {
    if let Err(err) = backend.rollback(txn.description()) {
        tracing::warn!(txn = %txn.description(), error = %err, "Rollback failed");
    }
    txn.run_exception_callbacks();
}

// ============================================================================
// IN-MEMORY BACKEND
// ============================================================================

/// Transaction backend with no storage behind it.
///
/// Counts commits and rollbacks and can be told to fail the next begin,
/// commit or rollback.
#[derive(Debug, Default)]
pub struct InMemoryTransactionBackend {
    commits: AtomicU64,
    rollbacks: AtomicU64,
    fail_next_begin: AtomicBool,
    fail_next_commit: AtomicBool,
    fail_next_rollback: AtomicBool,
}

impl InMemoryTransactionBackend {
    /// Backend with no injected failures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `begin` fail.
    pub fn fail_next_begin(&self) {
        self.fail_next_begin.store(true, Ordering::SeqCst);
    }

    /// Make the next `commit` fail.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Make the next `rollback` fail.
    pub fn fail_next_rollback(&self) {
        self.fail_next_rollback.store(true, Ordering::SeqCst);
    }

    /// Successful commits so far.
    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Successful rollbacks so far.
    pub fn rollbacks(&self) -> u64 {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

impl TransactionBackend for InMemoryTransactionBackend {
    fn begin(&self, description: &str) -> CachewireResult<()> {
        if self.fail_next_begin.swap(false, Ordering::SeqCst) {
            return Err(TransactionError::BeginFailed {
                description: description.to_string(),
                reason: "injected begin failure".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn commit(&self, description: &str) -> CachewireResult<()> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(TransactionError::CommitFailed {
                description: description.to_string(),
                reason: "injected commit failure".to_string(),
            }
            .into());
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&self, description: &str) -> CachewireResult<()> {
        if self.fail_next_rollback.swap(false, Ordering::SeqCst) {
            return Err(TransactionError::RollbackFailed {
                description: description.to_string(),
                reason: "injected rollback failure".to_string(),
            }
            .into());
        }
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachewire_core::{CacheError, CachewireError};
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn push(log: &Log, entry: &'static str) -> impl FnOnce() -> CachewireResult<()> + Send + 'static {
        let log = Arc::clone(log);
        move || {
            log.lock().expect("log lock").push(entry);
            Ok(())
        }
    }

    fn entries(log: &Log) -> Vec<&'static str> {
        log.lock().expect("log lock").clone()
    }

    #[test]
    fn test_after_callbacks_run_in_order_on_commit() {
        let backend = InMemoryTransactionBackend::new();
        let log: Log = Arc::default();

        let value = run_interaction(&backend, "write", |txn| {
            txn.call_after(push(&log, "first"));
            txn.call_after(push(&log, "second"));
            txn.call_on_exception(push(&log, "exception"));
            assert!(entries(&log).is_empty());
            Ok(7)
        })
        .expect("interaction should succeed");

        assert_eq!(value, 7);
        assert_eq!(entries(&log), vec!["first", "second"]);
        assert_eq!(backend.commits(), 1);
        assert_eq!(backend.rollbacks(), 0);
    }

    #[test]
    fn test_body_error_rolls_back_without_after_callbacks() {
        let backend = InMemoryTransactionBackend::new();
        let log: Log = Arc::default();

        let err = run_interaction::<_, (), _>(&backend, "write", |txn| {
            txn.call_after(push(&log, "after"));
            txn.call_on_exception(push(&log, "exception"));
            Err(CacheError::InvalidationFailed {
                cache_id: "x".to_string(),
                reason: "boom".to_string(),
            }
            .into())
        })
        .unwrap_err();

        assert!(matches!(err, CachewireError::Cache(_)));
        assert_eq!(entries(&log), vec!["exception"]);
        assert_eq!(backend.commits(), 0);
        assert_eq!(backend.rollbacks(), 1);
    }

    #[test]
    fn test_commit_failure_never_runs_after_callbacks() {
        let backend = InMemoryTransactionBackend::new();
        backend.fail_next_commit();
        let log: Log = Arc::default();

        let err = run_interaction(&backend, "write", |txn| {
            txn.call_after(push(&log, "after"));
            Ok(())
        })
        .unwrap_err();

        assert!(matches!(
            err,
            CachewireError::Transaction(TransactionError::CommitFailed { .. })
        ));
        assert!(entries(&log).is_empty());
        assert_eq!(backend.rollbacks(), 1);
    }

    #[test]
    fn test_begin_failure_skips_body() {
        let backend = InMemoryTransactionBackend::new();
        backend.fail_next_begin();
        let log: Log = Arc::default();

        let err = run_interaction(&backend, "write", |txn| {
            txn.call_after(push(&log, "after"));
            Ok(())
        })
        .unwrap_err();

        assert!(matches!(
            err,
            CachewireError::Transaction(TransactionError::BeginFailed { .. })
        ));
        assert!(entries(&log).is_empty());
        assert_eq!(backend.commits(), 0);
        assert_eq!(backend.rollbacks(), 0);
    }

    #[test]
    fn test_rollback_failure_keeps_body_error() {
        let backend = InMemoryTransactionBackend::new();
        backend.fail_next_rollback();
        let log: Log = Arc::default();

        let err = run_interaction::<_, (), _>(&backend, "write", |txn| {
            txn.call_after(push(&log, "after"));
            txn.call_on_exception(push(&log, "exception"));
            Err(CacheError::InvalidationFailed {
                cache_id: "x".to_string(),
                reason: "boom".to_string(),
            }
            .into())
        })
        .unwrap_err();

        assert!(matches!(err, CachewireError::Cache(_)));
        assert_eq!(entries(&log), vec!["exception"]);
        assert_eq!(backend.rollbacks(), 0);
    }

    #[test]
    fn test_callback_failure_reported_but_write_stays_committed() {
        let backend = InMemoryTransactionBackend::new();
        let log: Log = Arc::default();

        let err = run_interaction(&backend, "write", |txn| {
            txn.call_after(push(&log, "first"));
            txn.call_after(|| {
                Err(CacheError::InvalidationFailed {
                    cache_id: "get_user".to_string(),
                    reason: "wiring bug".to_string(),
                }
                .into())
            });
            txn.call_after(push(&log, "third"));
            Ok(())
        })
        .unwrap_err();

        match err {
            CachewireError::Transaction(TransactionError::CallbackFailed { index, reason, .. }) => {
                assert_eq!(index, 1);
                assert!(reason.contains("wiring bug"));
            }
            other => panic!("expected CallbackFailed, got {:?}", other),
        }
        assert_eq!(entries(&log), vec!["first"]);
        assert_eq!(backend.commits(), 1);
        assert_eq!(backend.rollbacks(), 0);
    }
}

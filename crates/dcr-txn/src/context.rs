//! Task-scoped ambient transaction.
//!
//! A scope owns one slot holding at most one root transaction. Code
//! awaited inside [`transaction_scope`] sees the slot; spawned tasks do
//! not, unless their future is wrapped with [`propagate`].

use std::future::Future;
use std::sync::{Arc, Mutex};

use crate::transaction::TransactionState;

tokio::task_local! {
    static SCOPE: Arc<ScopeSlot>;
}

/// Holder for the active root transaction of one scope.
#[derive(Default, Debug)]
pub struct ScopeSlot {
    current: Mutex<Option<Arc<TransactionState>>>,
}

impl ScopeSlot {
    pub fn current(&self) -> Option<Arc<TransactionState>> {
        self.current.lock().expect("lock poisoned").clone()
    }

    pub(crate) fn install(&self, state: Arc<TransactionState>) {
        *self.current.lock().expect("lock poisoned") = Some(state);
    }

    /// Clear the slot if it still holds `state`.
    pub(crate) fn clear_if(&self, state: &Arc<TransactionState>) -> bool {
        let mut current = self.current.lock().expect("lock poisoned");
        match current.as_ref() {
            Some(held) if Arc::ptr_eq(held, state) => {
                *current = None;
                true
            }
            _ => false,
        }
    }
}

/// Run `fut` with a transaction slot available.
///
/// Nested calls reuse the enclosing slot, so an inner scope still sees
/// the outer transaction.
pub async fn transaction_scope<F: Future>(fut: F) -> F::Output {
    let slot = slot().unwrap_or_default();
    SCOPE.scope(slot, fut).await
}

/// Wrap `fut` so it shares the caller's slot when spawned elsewhere.
pub fn propagate<F: Future>(fut: F) -> impl Future<Output = F::Output> {
    let slot = slot().unwrap_or_default();
    SCOPE.scope(slot, fut)
}

/// The slot of the current scope, if any.
pub fn slot() -> Option<Arc<ScopeSlot>> {
    SCOPE.try_with(Arc::clone).ok()
}

/// The ambient root transaction, if one is installed.
pub fn current_transaction() -> Option<Arc<TransactionState>> {
    slot().and_then(|slot| slot.current())
}

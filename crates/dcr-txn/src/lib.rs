//! Transaction coordination for the DCR access layer.
//!
//! A transaction is a server-side unit of work identified by a URI. At
//! most one root transaction is active per task scope; starting another
//! while one is active yields a sub handle that shares the root's fate
//! but cannot commit it.
//!
//! # Components
//!
//! - [`TransactionManager`] -- starts transactions and runs units of work
//! - [`Transaction`] -- root or sub handle: `close`, `cancel`, `keep_alive`
//! - [`TransactionRefresher`] -- background lease renewal with a hard TTL
//! - [`TransactionalTransport`] -- rewrites outgoing requests into the
//!   ambient transaction's namespace
//!
//! The ambient transaction lives in a task-local scope (see [`context`])
//! rather than thread-local storage, so any code awaited inside the scope
//! participates without threading a handle through every call.
//!
//! # Rules
//!
//! 1. Only the call that created the root commits it.
//! 2. Cancelling any handle rolls back the root and always yields
//!    `TransactionCancelled`.
//! 3. Commit and rollback each happen at most once.
//! 4. A transaction older than its max TTL is expired: it is neither
//!    renewed nor used for further requests.

pub mod context;
pub mod manager;
pub mod refresher;
pub mod rewriter;
pub mod transaction;

pub use context::{current_transaction, propagate, transaction_scope};
pub use manager::{TransactionConfig, TransactionManager};
pub use refresher::{LeaseRenewer, TransactionRefresher};
pub use rewriter::{rewrite_uri, TransactionalTransport};
pub use transaction::{Transaction, TransactionState, TransactionStatus};

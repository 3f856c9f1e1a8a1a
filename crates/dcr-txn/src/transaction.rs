use std::convert::Infallible;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dcr_client::RepositoryClient;
use dcr_types::{BoxError, RepositoryError, RepositoryResult};
use tokio::time::Instant;

use crate::context::ScopeSlot;
use crate::refresher::{LeaseRenewer, TransactionRefresher};

const KEEP_ALIVE_SUFFIX: &str = "/fcr:tx";
const COMMIT_SUFFIX: &str = "/fcr:tx/fcr:commit";
const ROLLBACK_SUFFIX: &str = "/fcr:tx/fcr:rollback";

/// Lifecycle of a server-side transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TransactionStatus {
    Active = 0,
    Committed = 1,
    Cancelled = 2,
}

impl TransactionStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Active,
            1 => Self::Committed,
            _ => Self::Cancelled,
        }
    }
}

/// Shared state of one root transaction.
///
/// Root and sub handles point at the same state. The status only moves
/// out of `Active` once, which guards against double commit or rollback.
pub struct TransactionState {
    uri: String,
    client: RepositoryClient,
    started: Instant,
    max_ttl: Duration,
    status: AtomicU8,
    refresher: Mutex<Option<TransactionRefresher>>,
}

impl TransactionState {
    pub(crate) fn new(uri: String, client: RepositoryClient, max_ttl: Duration) -> Self {
        Self {
            uri,
            client,
            started: Instant::now(),
            max_ttl,
            status: AtomicU8::new(TransactionStatus::Active as u8),
            refresher: Mutex::new(None),
        }
    }

    /// Transaction URI, e.g. `{base}/tx:7`.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn status(&self) -> TransactionStatus {
        TransactionStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    pub fn is_active(&self) -> bool {
        self.status() == TransactionStatus::Active
    }

    pub fn is_cancelled(&self) -> bool {
        self.status() == TransactionStatus::Cancelled
    }

    /// True once the transaction has outlived its max TTL.
    pub fn is_expired(&self) -> bool {
        self.started.elapsed() > self.max_ttl
    }

    pub fn age(&self) -> Duration {
        self.started.elapsed()
    }

    /// Renew the server-side lease.
    pub async fn keep_alive(&self) -> RepositoryResult<()> {
        match self.status() {
            TransactionStatus::Cancelled => return Err(RepositoryError::cancelled(None)),
            TransactionStatus::Committed => {
                return Err(RepositoryError::operation(&self.uri, "transaction already committed"))
            }
            TransactionStatus::Active => {}
        }
        if self.is_expired() {
            return Err(RepositoryError::TransactionExpired(self.uri.clone()));
        }
        self.client
            .post(&format!("{}{KEEP_ALIVE_SUFFIX}", self.uri))
            .await?;
        Ok(())
    }

    pub(crate) fn attach_refresher(&self, refresher: TransactionRefresher) {
        *self.refresher.lock().expect("lock poisoned") = Some(refresher);
    }

    pub(crate) fn stop_refresher(&self) {
        if let Some(refresher) = self.refresher.lock().expect("lock poisoned").take() {
            refresher.interrupt();
        }
    }

    fn transition(&self, to: TransactionStatus) -> bool {
        self.status
            .compare_exchange(
                TransactionStatus::Active as u8,
                to as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    async fn commit(&self) -> RepositoryResult<()> {
        match self.status() {
            TransactionStatus::Cancelled => return Err(RepositoryError::cancelled(None)),
            TransactionStatus::Committed => return Ok(()),
            TransactionStatus::Active => {}
        }
        if self.is_expired() {
            self.rollback().await;
            return Err(RepositoryError::TransactionExpired(self.uri.clone()));
        }
        if !self.transition(TransactionStatus::Committed) {
            return self.settled();
        }
        self.stop_refresher();
        match self
            .client
            .post(&format!("{}{COMMIT_SUFFIX}", self.uri))
            .await
        {
            Ok(_) => {
                tracing::info!(tx = %self.uri, "transaction committed");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(tx = %self.uri, "commit request failed, rolling back: {e}");
                self.status
                    .store(TransactionStatus::Cancelled as u8, Ordering::SeqCst);
                self.send_rollback().await;
                Err(RepositoryError::cancelled(Some(Box::new(e))))
            }
        }
    }

    /// Roll back at most once. Failures are logged; the transaction is
    /// considered cancelled regardless.
    async fn rollback(&self) {
        if !self.transition(TransactionStatus::Cancelled) {
            return;
        }
        self.stop_refresher();
        self.send_rollback().await;
    }

    async fn send_rollback(&self) {
        match self
            .client
            .post(&format!("{}{ROLLBACK_SUFFIX}", self.uri))
            .await
        {
            Ok(_) => tracing::info!(tx = %self.uri, "transaction rolled back"),
            Err(e) => tracing::warn!(tx = %self.uri, "rollback request failed: {e}"),
        }
    }

    fn settled(&self) -> RepositoryResult<()> {
        match self.status() {
            TransactionStatus::Cancelled => Err(RepositoryError::cancelled(None)),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl LeaseRenewer for TransactionState {
    fn lease_id(&self) -> &str {
        &self.uri
    }

    async fn renew(&self) -> RepositoryResult<()> {
        self.keep_alive().await
    }
}

impl fmt::Debug for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionState")
            .field("uri", &self.uri)
            .field("status", &self.status())
            .field("age", &self.age())
            .finish()
    }
}

/// Handle to a transaction: the root that owns the commit, or a sub
/// handle obtained by starting while a root was active.
pub struct Transaction {
    state: Arc<TransactionState>,
    slot: Arc<ScopeSlot>,
    root: bool,
}

impl Transaction {
    pub(crate) fn root(state: Arc<TransactionState>, slot: Arc<ScopeSlot>) -> Self {
        Self {
            state,
            slot,
            root: true,
        }
    }

    pub(crate) fn sub(state: Arc<TransactionState>, slot: Arc<ScopeSlot>) -> Self {
        Self {
            state,
            slot,
            root: false,
        }
    }

    pub fn uri(&self) -> &str {
        self.state.uri()
    }

    pub fn is_sub(&self) -> bool {
        !self.root
    }

    pub fn status(&self) -> TransactionStatus {
        self.state.status()
    }

    pub fn state(&self) -> &Arc<TransactionState> {
        &self.state
    }

    /// Commit a root and clear the scope. No-op on a sub handle.
    ///
    /// Fails with `TransactionCancelled` if the transaction was cancelled
    /// through any handle.
    pub async fn close(&self) -> RepositoryResult<()> {
        if !self.root {
            tracing::debug!(tx = %self.uri(), "closing sub transaction, commit deferred to root");
            return self.state.settled();
        }
        let result = self.state.commit().await;
        self.slot.clear_if(&self.state);
        result
    }

    /// Roll back the root transaction and clear the scope.
    ///
    /// Always returns `TransactionCancelled`, wrapping `cause` if given.
    /// Only the first cancel issues the rollback.
    pub async fn cancel(&self, cause: Option<BoxError>) -> RepositoryResult<Infallible> {
        if self.root {
            tracing::debug!(tx = %self.uri(), "cancelling transaction");
        } else {
            tracing::debug!(tx = %self.uri(), "cancelling sub transaction, delegating to root");
        }
        self.state.rollback().await;
        self.slot.clear_if(&self.state);
        Err(RepositoryError::cancelled(cause))
    }

    /// Renew the lease.
    pub async fn keep_alive(&self) -> RepositoryResult<()> {
        self.state.keep_alive().await
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.root && self.state.is_active() {
            tracing::warn!(tx = %self.uri(), "root transaction dropped without close, lease will lapse");
            self.state.stop_refresher();
            self.slot.clear_if(&self.state);
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("uri", &self.uri())
            .field("sub", &self.is_sub())
            .field("status", &self.status())
            .finish()
    }
}

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dcr_client::{headers, RepositoryClient};
use dcr_types::{RepositoryError, RepositoryResult};
use serde::{Deserialize, Serialize};

use crate::context;
use crate::refresher::TransactionRefresher;
use crate::transaction::{Transaction, TransactionState};

/// Lease renewal settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    pub keep_alive_interval_secs: u64,
    /// Hard lifetime cap, independent of renewals.
    pub max_ttl_secs: u64,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            keep_alive_interval_secs: 60,
            max_ttl_secs: 24 * 60 * 60,
        }
    }
}

impl TransactionConfig {
    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_interval_secs)
    }

    pub fn max_ttl(&self) -> Duration {
        Duration::from_secs(self.max_ttl_secs)
    }
}

/// Starts transactions against the repository.
///
/// Holds the raw client: transaction control requests must reach the
/// canonical `fcr:tx` endpoints, never a rewritten URI.
#[derive(Clone, Debug)]
pub struct TransactionManager {
    client: RepositoryClient,
    config: TransactionConfig,
}

impl TransactionManager {
    pub fn new(client: RepositoryClient, config: TransactionConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// Run `fut` with a transaction slot available. See [`context::transaction_scope`].
    pub async fn scope<F: Future>(&self, fut: F) -> F::Output {
        context::transaction_scope(fut).await
    }

    /// Start a transaction in the current scope.
    ///
    /// Returns a root handle if none is active, otherwise a sub handle
    /// sharing the active root. Fails outside a scope.
    pub async fn start(&self) -> RepositoryResult<Transaction> {
        let slot = context::slot().ok_or_else(|| {
            RepositoryError::operation(
                self.client.base_uri(),
                "transaction started outside a transaction scope",
            )
        })?;

        if let Some(active) = slot.current() {
            if active.is_active() && !active.is_expired() {
                tracing::debug!(tx = %active.uri(), "joining active transaction");
                return Ok(Transaction::sub(active, slot));
            }
            slot.clear_if(&active);
        }

        let endpoint = format!("{}/fcr:tx", self.client.base_uri());
        let response = self.client.post(&endpoint).await?;
        let uri = response
            .header(headers::LOCATION)
            .map(|l| l.trim_end_matches('/').to_string())
            .ok_or_else(|| RepositoryError::operation(&endpoint, "no Location for new transaction"))?;

        let state = Arc::new(TransactionState::new(
            uri,
            self.client.clone(),
            self.config.max_ttl(),
        ));
        let refresher = TransactionRefresher::new(
            state.clone(),
            self.config.keep_alive_interval(),
            self.config.max_ttl(),
        );
        refresher.start();
        state.attach_refresher(refresher);
        slot.install(state.clone());

        tracing::info!(tx = %state.uri(), "transaction started");
        Ok(Transaction::root(state, slot))
    }

    /// Sub handle on the ambient transaction, if one is active.
    pub fn current(&self) -> Option<Transaction> {
        let slot = context::slot()?;
        let state = slot.current().filter(|s| s.is_active())?;
        Some(Transaction::sub(state, slot))
    }

    /// Run `work` inside a transaction: commit on `Ok`, cancel on `Err`.
    ///
    /// Joins the ambient transaction if one is active, in which case the
    /// commit is left to its owner. Any error becomes
    /// `TransactionCancelled` wrapping the original.
    pub async fn run<F, Fut, T>(&self, work: F) -> RepositoryResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RepositoryResult<T>>,
    {
        context::transaction_scope(async {
            let tx = self.start().await?;
            match work().await {
                Ok(value) => {
                    tx.close().await?;
                    Ok(value)
                }
                Err(e @ RepositoryError::TransactionCancelled { .. }) => {
                    let _ = tx.cancel(None).await;
                    Err(e)
                }
                Err(e) => match tx.cancel(Some(Box::new(e))).await {
                    Err(cancelled) => Err(cancelled),
                    Ok(never) => match never {},
                },
            }
        })
        .await
    }
}

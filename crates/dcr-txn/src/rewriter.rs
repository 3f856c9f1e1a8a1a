use async_trait::async_trait;
use dcr_client::{RepoRequest, RepoResponse, Transport};
use dcr_types::{RepositoryError, RepositoryResult};

use crate::context;

/// Map `uri` into the namespace of `tx_uri`.
///
/// URIs outside `base_uri`, and URIs already inside a transaction, are
/// returned unchanged.
pub fn rewrite_uri(uri: &str, base_uri: &str, tx_uri: &str) -> String {
    if uri.starts_with(tx_uri) {
        return uri.to_string();
    }
    match uri.strip_prefix(base_uri) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => {
            if rest.trim_start_matches('/').starts_with(dcr_types::paths::TX_SEGMENT_PREFIX) {
                return uri.to_string();
            }
            format!("{tx_uri}{rest}")
        }
        _ => uri.to_string(),
    }
}

/// Transport decorator that routes requests into the ambient transaction.
///
/// With no transaction in scope requests pass through untouched. A
/// cancelled or expired ambient transaction rejects the request.
#[derive(Debug)]
pub struct TransactionalTransport<T> {
    inner: T,
    base_uri: String,
}

impl<T: Transport> TransactionalTransport<T> {
    pub fn new(inner: T, base_uri: impl Into<String>) -> Self {
        let base_uri: String = base_uri.into();
        Self {
            inner,
            base_uri: base_uri.trim_end_matches('/').to_string(),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T: Transport> Transport for TransactionalTransport<T> {
    async fn execute(&self, mut request: RepoRequest) -> RepositoryResult<RepoResponse> {
        if let Some(tx) = context::current_transaction() {
            if tx.is_cancelled() {
                return Err(RepositoryError::cancelled(None));
            }
            if tx.is_expired() {
                return Err(RepositoryError::TransactionExpired(tx.uri().to_string()));
            }
            if tx.is_active() {
                let rewritten = rewrite_uri(&request.uri, &self.base_uri, tx.uri());
                if rewritten != request.uri {
                    tracing::debug!(tx = %tx.uri(), from = %request.uri, to = %rewritten, "rewrote request");
                    request.uri = rewritten;
                }
            }
        }
        self.inner.execute(request).await
    }
}

use thiserror::Error;

/// Boxed error used to carry the cause of a cancelled transaction.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced while parsing RDF payloads.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("line {line}: {reason}")]
    Syntax { line: usize, reason: String },

    #[error("unsupported update statement: {0}")]
    UnsupportedUpdate(String),
}

/// Errors surfaced by every repository access operation.
///
/// Low-level HTTP and protocol failures are translated into this taxonomy
/// at the client boundary before they reach callers. Malformed identifiers
/// are not represented here: resolving one yields `None`.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The materialized object does not have the requested or declared type.
    #[error("object type mismatch for {pid}: {reason}")]
    ObjectTypeMismatch { pid: String, reason: String },

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("not authorized to access {0}")]
    AuthorizationFailure(String),

    /// Raised on every cancellation path. Never recovered locally.
    #[error("transaction cancelled{}", cause_suffix(.source))]
    TransactionCancelled {
        #[source]
        source: Option<BoxError>,
    },

    /// The transaction outlived its hard lifetime cap.
    #[error("transaction {0} exceeded its maximum lifetime")]
    TransactionExpired(String),

    /// Generic I/O or protocol failure talking to the repository.
    #[error("repository operation failed on {uri}: {reason}")]
    RepositoryOperationFailure { uri: String, reason: String },

    /// Raised only by explicit constructors; resolution is soft.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
}

fn cause_suffix(source: &Option<BoxError>) -> String {
    match source {
        Some(cause) => format!(": {cause}"),
        None => String::new(),
    }
}

impl RepositoryError {
    pub fn type_mismatch(pid: impl ToString, reason: impl Into<String>) -> Self {
        Self::ObjectTypeMismatch {
            pid: pid.to_string(),
            reason: reason.into(),
        }
    }

    pub fn operation(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RepositoryOperationFailure {
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    /// Cancellation error wrapping an optional cause.
    pub fn cancelled(cause: Option<BoxError>) -> Self {
        Self::TransactionCancelled { source: cause }
    }

    /// Returns `true` for errors that must unwind the whole unit of work.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            Self::TransactionCancelled { .. } | Self::TransactionExpired(_)
        )
    }

    /// Returns `true` if repeating the operation outside a transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RepositoryOperationFailure { .. })
    }
}

/// Result alias for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_without_cause_display() {
        let err = RepositoryError::cancelled(None);
        assert_eq!(err.to_string(), "transaction cancelled");
        assert!(err.is_cancellation());
    }

    #[test]
    fn cancelled_wraps_cause() {
        let cause = RepositoryError::NotFound("http://repo/content/x".into());
        let err = RepositoryError::cancelled(Some(Box::new(cause)));
        assert!(err.to_string().contains("resource not found"));
        let source = std::error::Error::source(&err).expect("cause should be kept");
        assert!(source.to_string().contains("content/x"));
    }

    #[test]
    fn retryable_only_for_operation_failures() {
        assert!(RepositoryError::operation("u", "timeout").is_retryable());
        assert!(!RepositoryError::NotFound("u".into()).is_retryable());
        assert!(!RepositoryError::cancelled(None).is_retryable());
    }

    #[test]
    fn graph_error_converts() {
        let err: RepositoryError = GraphError::Syntax {
            line: 3,
            reason: "expected '.'".into(),
        }
        .into();
        assert!(err.to_string().contains("line 3"));
    }
}

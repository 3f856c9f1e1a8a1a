//! Relationship lookups that a single object graph cannot answer.
//!
//! Membership is stored on the parent, so finding an object's parent is
//! a reverse query over every graph in the repository. A live deployment
//! answers it from a SPARQL endpoint; tests answer it from the in-memory
//! repository.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use dcr_client::InMemoryRepository;
use dcr_types::{RepositoryError, RepositoryResult};
use serde::Deserialize;

const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";

/// Reverse and forward relationship queries.
#[async_trait]
pub trait RelationshipIndex: Send + Sync {
    /// Subjects `?s` of statements `?s <predicate> <object>`.
    async fn subjects(&self, predicate: &str, object: &str) -> RepositoryResult<Vec<String>>;

    /// Objects `?o` of statements `<subject> <predicate> ?o`.
    async fn objects(&self, subject: &str, predicate: &str) -> RepositoryResult<Vec<String>>;
}

#[async_trait]
impl RelationshipIndex for InMemoryRepository {
    async fn subjects(&self, predicate: &str, object: &str) -> RepositoryResult<Vec<String>> {
        Ok(InMemoryRepository::subjects(self, predicate, object))
    }

    async fn objects(&self, subject: &str, predicate: &str) -> RepositoryResult<Vec<String>> {
        Ok(InMemoryRepository::objects(self, subject, predicate))
    }
}

/// Index for deployments without a query endpoint. Reverse lookups find
/// nothing, so parents are only discovered for components.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoRelationshipIndex;

#[async_trait]
impl RelationshipIndex for NoRelationshipIndex {
    async fn subjects(&self, predicate: &str, object: &str) -> RepositoryResult<Vec<String>> {
        tracing::debug!(predicate, object, "no relationship index configured");
        Ok(Vec::new())
    }

    async fn objects(&self, subject: &str, predicate: &str) -> RepositoryResult<Vec<String>> {
        tracing::debug!(subject, predicate, "no relationship index configured");
        Ok(Vec::new())
    }
}

/// Index backed by a SPARQL 1.1 query endpoint.
#[derive(Clone, Debug)]
pub struct SparqlRelationshipIndex {
    http: reqwest::Client,
    endpoint: String,
    credentials: Option<(String, Option<String>)>,
}

impl SparqlRelationshipIndex {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> RepositoryResult<Self> {
        let endpoint: String = endpoint.into();
        url::Url::parse(&endpoint)
            .map_err(|e| RepositoryError::operation(&endpoint, format!("invalid endpoint: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| RepositoryError::operation(&endpoint, format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint,
            credentials: None,
        })
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.credentials = Some((username.into(), password));
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn select(&self, query: String, var: &str) -> RepositoryResult<Vec<String>> {
        let url = url::Url::parse_with_params(&self.endpoint, &[("query", query.as_str())])
            .map_err(|e| RepositoryError::operation(&self.endpoint, e.to_string()))?;
        let mut request = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, SPARQL_RESULTS_JSON);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, password.as_ref());
        }

        let resp = request
            .send()
            .await
            .map_err(|e| RepositoryError::operation(&self.endpoint, e.to_string()))?;
        let status = resp.status().as_u16();
        match status {
            200..=299 => {}
            401 | 403 => return Err(RepositoryError::AuthorizationFailure(self.endpoint.clone())),
            404 | 410 => return Err(RepositoryError::NotFound(self.endpoint.clone())),
            _ => {
                let body = resp.text().await.unwrap_or_default();
                let snippet: String = body.chars().take(200).collect();
                return Err(RepositoryError::operation(
                    &self.endpoint,
                    format!("query failed with status {status}: {snippet}"),
                ));
            }
        }

        let results: SparqlResults = resp
            .json()
            .await
            .map_err(|e| RepositoryError::operation(&self.endpoint, format!("malformed results: {e}")))?;
        tracing::debug!(endpoint = %self.endpoint, rows = results.results.bindings.len(), "sparql select");
        Ok(results.iris(var))
    }
}

#[async_trait]
impl RelationshipIndex for SparqlRelationshipIndex {
    async fn subjects(&self, predicate: &str, object: &str) -> RepositoryResult<Vec<String>> {
        let query = format!(
            "SELECT DISTINCT ?s WHERE {{ ?s {} {} }}",
            iri_ref(predicate)?,
            iri_ref(object)?
        );
        self.select(query, "s").await
    }

    async fn objects(&self, subject: &str, predicate: &str) -> RepositoryResult<Vec<String>> {
        let query = format!(
            "SELECT DISTINCT ?o WHERE {{ {} {} ?o }}",
            iri_ref(subject)?,
            iri_ref(predicate)?
        );
        self.select(query, "o").await
    }
}

/// `<iri>`, rejecting characters that would break out of the reference.
fn iri_ref(iri: &str) -> RepositoryResult<String> {
    if iri.is_empty()
        || iri
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '<' | '>' | '"' | '{' | '}' | '\\' | '^' | '`' | '|'))
    {
        return Err(RepositoryError::InvalidIdentifier(format!("not a usable IRI: {iri}")));
    }
    Ok(format!("<{iri}>"))
}

#[derive(Debug, Deserialize)]
struct SparqlResults {
    results: Bindings,
}

#[derive(Debug, Deserialize)]
struct Bindings {
    bindings: Vec<HashMap<String, BoundValue>>,
}

#[derive(Debug, Deserialize)]
struct BoundValue {
    #[serde(rename = "type")]
    kind: String,
    value: String,
}

impl SparqlResults {
    fn iris(self, var: &str) -> Vec<String> {
        let mut iris: Vec<String> = self
            .results
            .bindings
            .into_iter()
            .filter_map(|mut row| row.remove(var))
            .filter(|v| v.kind == "uri")
            .map(|v| v.value)
            .collect();
        iris.sort();
        iris.dedup();
        iris
    }
}

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dcr_types::{Graph, Pid, PidResolver, RepositoryError, RepositoryResult, SparqlUpdate};

use crate::transport::{headers, RepoRequest, RepoResponse, Transport};

/// Parsed metadata representation of a resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetadataResponse {
    /// Address the metadata was fetched from.
    pub uri: String,
    pub graph: Graph,
    /// Version token with quotes and weak marker removed.
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Repository protocol client over any [`Transport`].
///
/// Every non-2xx response is translated here: 401/403 become
/// `AuthorizationFailure`, 404/410 become `NotFound`, everything else
/// becomes `RepositoryOperationFailure`.
#[derive(Clone)]
pub struct RepositoryClient {
    transport: Arc<dyn Transport>,
    resolver: PidResolver,
}

impl RepositoryClient {
    pub fn new(transport: Arc<dyn Transport>, resolver: PidResolver) -> Self {
        Self {
            transport,
            resolver,
        }
    }

    pub fn resolver(&self) -> &PidResolver {
        &self.resolver
    }

    pub fn base_uri(&self) -> &str {
        self.resolver.base_uri()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Dispatch a request and translate its status.
    pub async fn execute(&self, request: RepoRequest) -> RepositoryResult<RepoResponse> {
        let uri = request.uri.clone();
        let response = self.transport.execute(request).await?;
        check_status(&uri, response)
    }

    /// Fetch and parse the metadata representation of a PID.
    pub async fn get_metadata(&self, pid: &Pid) -> RepositoryResult<MetadataResponse> {
        let uri = self.resolver.metadata_uri(pid);
        let response = self
            .execute(RepoRequest::get(&uri).with_header(headers::ACCEPT, headers::NTRIPLES))
            .await?;
        let graph = Graph::parse_ntriples(&response.text())?;
        Ok(MetadataResponse {
            etag: response.header(headers::ETAG).map(normalize_etag),
            last_modified: response
                .header(headers::LAST_MODIFIED)
                .and_then(parse_http_date),
            uri,
            graph,
        })
    }

    /// Existence check via `HEAD`.
    pub async fn exists(&self, pid: &Pid) -> RepositoryResult<bool> {
        match self.execute(RepoRequest::head(self.resolver.uri(pid))).await {
            Ok(_) => Ok(true),
            Err(RepositoryError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create an RDF resource at the PID's path. Returns the `Location`.
    pub async fn create_resource(&self, pid: &Pid, graph: &Graph) -> RepositoryResult<String> {
        let uri = self.resolver.uri(pid);
        let (parent, slug) = split_slug(&uri)?;
        let response = self
            .execute(
                RepoRequest::post(parent)
                    .with_header(headers::SLUG, slug)
                    .with_body(graph.to_ntriples(), headers::NTRIPLES),
            )
            .await?;
        Ok(location(&response, pid, &self.resolver))
    }

    /// Create a binary at the PID's path. Returns the `Location`.
    pub async fn create_binary(
        &self,
        pid: &Pid,
        content: Bytes,
        content_type: &str,
        filename: Option<&str>,
    ) -> RepositoryResult<String> {
        let uri = self.resolver.uri(pid);
        let (parent, slug) = split_slug(&uri)?;
        let mut request = RepoRequest::post(parent)
            .with_header(headers::SLUG, slug)
            .with_body(content, content_type);
        if let Some(filename) = filename {
            request = request.with_header(
                headers::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            );
        }
        let response = self.execute(request).await?;
        Ok(location(&response, pid, &self.resolver))
    }

    /// Apply an incremental update to the PID's metadata.
    pub async fn update_metadata(&self, pid: &Pid, update: &SparqlUpdate) -> RepositoryResult<()> {
        if update.is_empty() {
            return Ok(());
        }
        let uri = self.resolver.metadata_uri(pid);
        self.execute(
            RepoRequest::patch(uri).with_body(update.to_string(), headers::SPARQL_UPDATE),
        )
        .await?;
        Ok(())
    }

    /// Delete a resource and everything beneath it.
    pub async fn delete(&self, pid: &Pid) -> RepositoryResult<()> {
        self.execute(RepoRequest::delete(self.resolver.uri(pid))).await?;
        Ok(())
    }

    /// Empty-bodied `POST`, used for transaction control endpoints.
    pub async fn post(&self, uri: &str) -> RepositoryResult<RepoResponse> {
        self.execute(RepoRequest::post(uri)).await
    }
}

impl std::fmt::Debug for RepositoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryClient")
            .field("base_uri", &self.resolver.base_uri())
            .finish()
    }
}

/// Translate a response status into the error taxonomy.
pub fn check_status(uri: &str, response: RepoResponse) -> RepositoryResult<RepoResponse> {
    match response.status {
        200..=299 => Ok(response),
        401 | 403 => Err(RepositoryError::AuthorizationFailure(uri.to_string())),
        404 | 410 => Err(RepositoryError::NotFound(uri.to_string())),
        status => {
            let body = response.text();
            let snippet: String = body.chars().take(200).collect();
            Err(RepositoryError::operation(
                uri,
                format!("unexpected status {status}: {snippet}"),
            ))
        }
    }
}

fn split_slug(uri: &str) -> RepositoryResult<(&str, &str)> {
    uri.rsplit_once('/')
        .filter(|(parent, slug)| !parent.is_empty() && !slug.is_empty())
        .ok_or_else(|| RepositoryError::operation(uri, "cannot derive parent and slug"))
}

fn location(response: &RepoResponse, pid: &Pid, resolver: &PidResolver) -> String {
    response
        .header(headers::LOCATION)
        .map(str::to_string)
        .unwrap_or_else(|| resolver.uri(pid))
}

/// Strip the weak marker and quotes from an ETag.
fn normalize_etag(raw: &str) -> String {
    raw.trim()
        .trim_start_matches("W/")
        .trim_matches('"')
        .to_string()
}

fn parse_http_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

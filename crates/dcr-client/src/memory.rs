use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, SubsecRound, Utc};
use dcr_types::{vocab, Graph, RepositoryResult, SparqlUpdate, Term, Triple};

use crate::transport::{headers, Method, RepoRequest, RepoResponse, Transport};

const TX_ENDPOINT: &str = "/fcr:tx";
const TX_COMMIT: &str = "/fcr:tx/fcr:commit";
const TX_ROLLBACK: &str = "/fcr:tx/fcr:rollback";
const METADATA_SUFFIX: &str = "/fcr:metadata";

/// Format a timestamp as an HTTP date.
pub(crate) fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[derive(Clone, Debug)]
struct Resource {
    graph: Graph,
    content: Option<(Bytes, String)>,
    version: u64,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Transaction {
    /// Staged writes keyed by path; `None` marks a deletion.
    staged: BTreeMap<String, Option<Resource>>,
}

#[derive(Debug, Default)]
struct State {
    resources: BTreeMap<String, Resource>,
    transactions: HashMap<String, Transaction>,
    requests: HashMap<(Method, String), usize>,
    status_overrides: HashMap<String, u16>,
    next_version: u64,
    next_tx: u64,
    committed: usize,
    rolled_back: usize,
    keep_alives: usize,
}

impl State {
    fn bump(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }

    fn lookup(&self, tx: Option<&str>, path: &str) -> Option<Resource> {
        if let Some(staged) = tx
            .and_then(|id| self.transactions.get(id))
            .and_then(|t| t.staged.get(path))
        {
            return staged.clone();
        }
        self.resources.get(path).cloned()
    }

    fn store(&mut self, tx: Option<&str>, path: String, resource: Option<Resource>) {
        match tx.and_then(|id| self.transactions.get_mut(id)) {
            Some(transaction) => {
                transaction.staged.insert(path, resource);
            }
            None => match resource {
                Some(resource) => {
                    self.resources.insert(path, resource);
                }
                None => {
                    self.resources.remove(&path);
                }
            },
        }
    }

    /// Paths visible in the given view that equal `path` or live below it.
    fn subtree(&self, tx: Option<&str>, path: &str) -> Vec<String> {
        let below = format!("{path}/");
        let mut paths: Vec<String> = self
            .resources
            .keys()
            .filter(|p| *p == path || p.starts_with(&below))
            .cloned()
            .collect();
        if let Some(transaction) = tx.and_then(|id| self.transactions.get(id)) {
            for (p, staged) in &transaction.staged {
                if (p == path || p.starts_with(&below)) && staged.is_some() && !paths.contains(p) {
                    paths.push(p.clone());
                }
            }
        }
        paths
    }
}

/// In-memory emulation of the repository server.
///
/// Intended for tests and embedding. Speaks the same protocol as a live
/// server: N-Triples metadata, ETag and Last-Modified headers, Slug-based
/// creation, SPARQL-update PATCH, and `fcr:tx` transactions whose writes
/// are staged until commit and discarded on rollback. Every request is
/// counted so tests can assert on network traffic.
pub struct InMemoryRepository {
    base_uri: String,
    latency: Option<Duration>,
    state: Mutex<State>,
}

impl InMemoryRepository {
    pub fn new(base_uri: impl Into<String>) -> Self {
        let base_uri: String = base_uri.into();
        Self {
            base_uri: base_uri.trim_end_matches('/').to_string(),
            latency: None,
            state: Mutex::new(State::default()),
        }
    }

    /// Delay every request, widening race windows in concurrency tests.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("repository lock poisoned")
    }

    fn path_of<'a>(&self, uri: &'a str) -> Option<&'a str> {
        uri.strip_prefix(&self.base_uri)
            .filter(|p| p.is_empty() || p.starts_with('/'))
    }

    /// Seed a committed resource directly, bypassing the protocol.
    pub fn put_graph(&self, uri: &str, graph: Graph) {
        let Some(path) = self.path_of(uri) else {
            return;
        };
        let mut state = self.lock();
        let version = state.bump();
        state.resources.insert(
            path.to_string(),
            Resource {
                graph,
                content: None,
                version,
                last_modified: Utc::now().trunc_subsecs(0),
            },
        );
    }

    /// Committed metadata graph of a resource.
    pub fn graph(&self, uri: &str) -> Option<Graph> {
        let path = self.path_of(uri)?;
        self.lock().resources.get(path).map(|r| r.graph.clone())
    }

    /// Committed binary content of a resource.
    pub fn content(&self, uri: &str) -> Option<Bytes> {
        let path = self.path_of(uri)?;
        self.lock()
            .resources
            .get(path)
            .and_then(|r| r.content.as_ref().map(|(bytes, _)| bytes.clone()))
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.path_of(uri)
            .is_some_and(|path| self.lock().resources.contains_key(path))
    }

    /// Number of requests received for a method and exact URI.
    pub fn request_count(&self, method: Method, uri: &str) -> usize {
        self.lock()
            .requests
            .get(&(method, uri.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Number of requests received for a method across all URIs.
    pub fn method_count(&self, method: Method) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|((m, _), _)| *m == method)
            .map(|(_, n)| n)
            .sum()
    }

    /// Answer every request for `uri` with `status`.
    pub fn set_status(&self, uri: &str, status: u16) {
        self.lock().status_overrides.insert(uri.to_string(), status);
    }

    pub fn clear_status(&self, uri: &str) {
        self.lock().status_overrides.remove(uri);
    }

    pub fn open_transactions(&self) -> usize {
        self.lock().transactions.len()
    }

    pub fn committed_transactions(&self) -> usize {
        self.lock().committed
    }

    pub fn rolled_back_transactions(&self) -> usize {
        self.lock().rolled_back
    }

    pub fn keep_alive_count(&self) -> usize {
        self.lock().keep_alives
    }

    /// IRI subjects of committed statements `?s predicate <object>`.
    pub fn subjects(&self, predicate: &str, object: &str) -> Vec<String> {
        let state = self.lock();
        let mut subjects: Vec<String> = state
            .resources
            .values()
            .flat_map(|r| r.graph.subjects(predicate, object))
            .collect();
        subjects.sort();
        subjects.dedup();
        subjects
    }

    /// IRI objects of committed statements `<subject> predicate ?o`.
    pub fn objects(&self, subject: &str, predicate: &str) -> Vec<String> {
        let state = self.lock();
        let mut objects: Vec<String> = state
            .resources
            .values()
            .flat_map(|r| r.graph.object_iris(subject, predicate))
            .collect();
        objects.sort();
        objects.dedup();
        objects
    }

    fn handle(&self, request: &RepoRequest) -> RepoResponse {
        let mut state = self.lock();
        *state
            .requests
            .entry((request.method, request.uri.clone()))
            .or_insert(0) += 1;
        if let Some(status) = state.status_overrides.get(&request.uri) {
            return RepoResponse::new(*status);
        }
        let Some(path) = self.path_of(&request.uri) else {
            return RepoResponse::new(404);
        };

        let (tx, path) = split_transaction(path);
        match (tx, path, request.method) {
            (None, TX_ENDPOINT, Method::Post) => {
                state.next_tx += 1;
                let id = format!("tx:{}", state.next_tx);
                state.transactions.insert(id.clone(), Transaction::default());
                tracing::debug!(tx = %id, "transaction created");
                return RepoResponse::new(201)
                    .with_header(headers::LOCATION, format!("{}/{id}", self.base_uri));
            }
            (Some(id), _, _) if !state.transactions.contains_key(id) => {
                return RepoResponse::new(410);
            }
            (Some(_), TX_ENDPOINT, Method::Post) => {
                state.keep_alives += 1;
                return RepoResponse::new(204);
            }
            (Some(id), TX_COMMIT, Method::Post) => {
                if let Some(transaction) = state.transactions.remove(id) {
                    for (path, staged) in transaction.staged {
                        match staged {
                            Some(resource) => {
                                state.resources.insert(path, resource);
                            }
                            None => {
                                state.resources.remove(&path);
                            }
                        }
                    }
                    state.committed += 1;
                }
                return RepoResponse::new(204);
            }
            (Some(id), TX_ROLLBACK, Method::Post) => {
                state.transactions.remove(id);
                state.rolled_back += 1;
                return RepoResponse::new(204);
            }
            _ => {}
        }

        let metadata = path.ends_with(METADATA_SUFFIX);
        let path = path.strip_suffix(METADATA_SUFFIX).unwrap_or(path);
        match request.method {
            Method::Get | Method::Head => {
                let Some(resource) = state.lookup(tx, path) else {
                    return RepoResponse::new(404);
                };
                let resp = RepoResponse::new(200)
                    .with_header(headers::ETAG, format!("\"{}\"", resource.version))
                    .with_header(headers::LAST_MODIFIED, http_date(resource.last_modified));
                if request.method == Method::Head {
                    return resp;
                }
                match (&resource.content, metadata) {
                    (Some((bytes, content_type)), false) => resp
                        .with_header(headers::CONTENT_TYPE, content_type.clone())
                        .with_body(bytes.clone()),
                    _ => resp
                        .with_header(headers::CONTENT_TYPE, headers::NTRIPLES)
                        .with_body(resource.graph.to_ntriples()),
                }
            }
            Method::Post => self.create(&mut state, tx, path, request),
            Method::Patch => {
                let Some(mut resource) = state.lookup(tx, path) else {
                    return RepoResponse::new(404);
                };
                let body = String::from_utf8_lossy(request.body.as_deref().unwrap_or_default());
                let update = match SparqlUpdate::parse(&body) {
                    Ok(update) => update,
                    Err(e) => return RepoResponse::new(400).with_body(e.to_string()),
                };
                update.apply(&mut resource.graph);
                resource.version = state.bump();
                resource.last_modified = Utc::now().trunc_subsecs(0);
                state.store(tx, path.to_string(), Some(resource));
                RepoResponse::new(204)
            }
            Method::Delete => {
                let doomed = state.subtree(tx, path);
                if doomed.is_empty() {
                    return RepoResponse::new(404);
                }
                for p in doomed {
                    state.store(tx, p, None);
                }
                RepoResponse::new(204)
            }
            Method::Put => RepoResponse::new(405),
        }
    }

    fn create(
        &self,
        state: &mut State,
        tx: Option<&str>,
        parent: &str,
        request: &RepoRequest,
    ) -> RepoResponse {
        let slug = request
            .header(headers::SLUG)
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let path = format!("{parent}/{slug}");
        if state.lookup(tx, &path).is_some() {
            return RepoResponse::new(409);
        }
        let canonical = format!("{}{path}", self.base_uri);
        let body = request.body.clone().unwrap_or_default();
        let content_type = request
            .header(headers::CONTENT_TYPE)
            .unwrap_or("application/octet-stream")
            .to_string();

        let (graph, content) = if content_type == headers::NTRIPLES {
            match Graph::parse_ntriples(&String::from_utf8_lossy(&body)) {
                Ok(graph) => (graph, None),
                Err(e) => return RepoResponse::new(400).with_body(e.to_string()),
            }
        } else {
            let mut graph = Graph::new();
            graph.insert(Triple::iris(&canonical, vocab::RDF_TYPE, vocab::FEDORA_BINARY));
            graph.insert(Triple::new(
                Term::iri(&canonical),
                vocab::EBUCORE_MIME_TYPE,
                Term::literal(&content_type),
            ));
            if let Some(filename) = request
                .header(headers::CONTENT_DISPOSITION)
                .and_then(disposition_filename)
            {
                graph.insert(Triple::new(
                    Term::iri(&canonical),
                    vocab::EBUCORE_FILENAME,
                    Term::literal(filename),
                ));
            }
            (graph, Some((body, content_type)))
        };

        let resource = Resource {
            graph,
            content,
            version: state.bump(),
            last_modified: Utc::now().trunc_subsecs(0),
        };
        state.store(tx, path.clone(), Some(resource));
        let location = match tx {
            Some(id) => format!("{}/{id}{path}", self.base_uri),
            None => canonical,
        };
        RepoResponse::new(201).with_header(headers::LOCATION, location)
    }
}

/// Split a leading `/tx:…` segment from a path.
fn split_transaction(path: &str) -> (Option<&str>, &str) {
    match path.strip_prefix('/') {
        Some(rest) if rest.starts_with("tx:") => match rest.find('/') {
            Some(idx) => (Some(&rest[..idx]), &rest[idx..]),
            None => (Some(rest), ""),
        },
        _ => (None, path),
    }
}

fn disposition_filename(value: &str) -> Option<&str> {
    let start = value.find("filename=\"")? + "filename=\"".len();
    let end = value[start..].find('"')? + start;
    Some(&value[start..end])
}

#[async_trait]
impl Transport for InMemoryRepository {
    async fn execute(&self, request: RepoRequest) -> RepositoryResult<RepoResponse> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        Ok(self.handle(&request))
    }
}

impl std::fmt::Debug for InMemoryRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("InMemoryRepository")
            .field("base_uri", &self.base_uri)
            .field("resource_count", &state.resources.len())
            .field("open_transactions", &state.transactions.len())
            .finish()
    }
}

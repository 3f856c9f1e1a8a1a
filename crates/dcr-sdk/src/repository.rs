//! The [`Repository`] handle: every component of the access layer wired
//! to one transport.

use std::future::Future;
use std::sync::Arc;

use dcr_client::{HttpTransport, InMemoryRepository, RepositoryClient, Transport};
use dcr_objects::{
    NoRelationshipIndex, ObjectCache, RelationshipIndex, RepositoryObject, RepositoryObjectFactory,
    RepositoryObjectLoader, SparqlRelationshipIndex, TypeRegistry, TypedObject,
};
use dcr_txn::{TransactionManager, TransactionalTransport};
use dcr_types::{Pid, PidResolver, RepositoryResult};

use crate::config::RepositoryConfig;
use crate::error::SdkResult;

/// Entry point to a remote repository.
///
/// Reads and writes issued through [`loader`](Self::loader) and
/// [`factory`](Self::factory) join the ambient transaction when one is
/// active. The transaction manager talks to the repository directly so
/// that its own control requests are never rewritten.
#[derive(Clone)]
pub struct Repository {
    config: RepositoryConfig,
    resolver: PidResolver,
    client: RepositoryClient,
    transactions: TransactionManager,
    cache: Arc<ObjectCache>,
    loader: RepositoryObjectLoader,
    factory: RepositoryObjectFactory,
}

impl Repository {
    /// Connect to the repository described by `config` over HTTP.
    pub fn connect(config: RepositoryConfig) -> SdkResult<Self> {
        config.validate()?;
        let transport = HttpTransport::new(config.http_config())?;
        let index: Arc<dyn RelationshipIndex> = match &config.sparql_endpoint {
            Some(endpoint) => {
                let mut index = SparqlRelationshipIndex::new(endpoint.as_str(), config.timeout_secs)?;
                if let Some(user) = &config.username {
                    index = index.with_basic_auth(user.as_str(), config.password.clone());
                }
                Arc::new(index)
            }
            None => {
                tracing::warn!("no sparql_endpoint configured; parent lookups are limited to components");
                Arc::new(NoRelationshipIndex)
            }
        };
        tracing::info!(base_uri = %config.base_uri(), "connecting to repository");
        Ok(Self::with_transport(config, Arc::new(transport), index))
    }

    /// A repository emulated in memory. The returned handle to the
    /// backing store allows inspection of committed state.
    pub fn in_memory(base_uri: &str) -> (Self, Arc<InMemoryRepository>) {
        let store = Arc::new(InMemoryRepository::new(base_uri));
        let config = RepositoryConfig {
            base_uri: base_uri.to_string(),
            ..Default::default()
        };
        let repo = Self::with_transport(config, store.clone(), store.clone());
        (repo, store)
    }

    /// Wire the access layer over an arbitrary transport and index.
    pub fn with_transport(
        config: RepositoryConfig,
        transport: Arc<dyn Transport>,
        index: Arc<dyn RelationshipIndex>,
    ) -> Self {
        let resolver = PidResolver::new(config.base_uri());
        let raw = RepositoryClient::new(transport.clone(), resolver.clone());
        let rewriting = TransactionalTransport::new(transport, config.base_uri());
        let client = RepositoryClient::new(Arc::new(rewriting), resolver.clone());

        let transactions = TransactionManager::new(raw, config.transaction.clone());
        let cache = Arc::new(ObjectCache::new(config.cache.clone()));
        let loader = RepositoryObjectLoader::new(
            client.clone(),
            cache.clone(),
            Arc::new(TypeRegistry::default()),
            index,
        );
        let factory = RepositoryObjectFactory::new(loader.clone());

        Self {
            config,
            resolver,
            client,
            transactions,
            cache,
            loader,
            factory,
        }
    }

    // ---- Components ----

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn resolver(&self) -> &PidResolver {
        &self.resolver
    }

    /// Client whose requests join the ambient transaction.
    pub fn client(&self) -> &RepositoryClient {
        &self.client
    }

    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    pub fn cache(&self) -> &Arc<ObjectCache> {
        &self.cache
    }

    pub fn loader(&self) -> &RepositoryObjectLoader {
        &self.loader
    }

    pub fn factory(&self) -> &RepositoryObjectFactory {
        &self.factory
    }

    // ---- Identifiers ----

    pub fn resolve(&self, value: &str) -> Option<Pid> {
        self.resolver.resolve(value)
    }

    pub fn uri(&self, pid: &Pid) -> String {
        self.resolver.uri(pid)
    }

    // ---- Objects ----

    pub async fn get_object(&self, pid: &Pid) -> RepositoryResult<Arc<RepositoryObject>> {
        self.loader.get_object(pid).await
    }

    pub async fn get_typed<T: TypedObject>(&self, pid: &Pid) -> RepositoryResult<T> {
        self.loader.get_typed(pid).await
    }

    pub async fn get_parent(&self, pid: &Pid) -> RepositoryResult<Option<Arc<RepositoryObject>>> {
        self.loader.get_parent(pid).await
    }

    pub async fn get_members(&self, pid: &Pid) -> RepositoryResult<Vec<Arc<RepositoryObject>>> {
        let container = self.loader.get_object(pid).await?;
        self.loader.get_members(&container).await
    }

    pub async fn exists(&self, pid: &Pid) -> RepositoryResult<bool> {
        self.loader.exists(pid).await
    }

    // ---- Transactions ----

    /// Run `fut` inside a transaction scope without starting a transaction.
    pub async fn scope<F: Future>(&self, fut: F) -> F::Output {
        self.transactions.scope(fut).await
    }

    /// Run `work` in a transaction: commit on `Ok`, roll back on `Err`.
    ///
    /// Objects cached while the transaction was open may describe writes
    /// that were rolled back, so a failed run empties the cache.
    pub async fn run<F, Fut, T>(&self, work: F) -> RepositoryResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RepositoryResult<T>>,
    {
        let result = self.transactions.run(work).await;
        if let Err(e) = &result {
            tracing::debug!(error = %e, entries = self.cache.len(), "transaction failed; clearing object cache");
            self.cache.invalidate_all();
        }
        result
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("base_uri", &self.config.base_uri())
            .field("cached", &self.cache.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcr_objects::{ContentContainer, ResourceType};
    use dcr_types::{vocab, Qualifier, RepositoryError};

    const BASE: &str = "http://localhost:8080/rest";

    // ---- Construction ----

    #[test]
    fn connect_builds_without_network() {
        let repo = Repository::connect(RepositoryConfig::default()).unwrap();
        assert_eq!(repo.config().base_uri(), BASE);
        assert_eq!(repo.resolver().base_uri(), BASE);
        assert!(repo.cache().is_empty());
    }

    #[test]
    fn connect_with_sparql_endpoint() {
        let config = RepositoryConfig {
            sparql_endpoint: Some("http://localhost:3030/fcrepo/sparql".into()),
            username: Some("admin".into()),
            ..Default::default()
        };
        Repository::connect(config).unwrap();
    }

    #[test]
    fn connect_rejects_invalid_config() {
        let config = RepositoryConfig {
            base_uri: "repo/rest".into(),
            ..Default::default()
        };
        assert!(Repository::connect(config).is_err());
    }

    #[test]
    fn resolve_round_trips_through_uri() {
        let (repo, _) = Repository::in_memory(BASE);
        let pid = Pid::mint(Qualifier::Content);
        let uri = repo.uri(&pid);
        assert!(uri.starts_with(BASE));
        assert_eq!(repo.resolve(&uri), Some(pid));
        assert_eq!(repo.resolve("http://elsewhere.org/x"), None);
    }

    // ---- Transactions ----

    #[tokio::test]
    async fn committed_hierarchy_is_navigable() {
        let (repo, store) = Repository::in_memory(BASE);
        let factory = repo.factory();
        let (collection, work) = repo
            .run(|| async {
                let unit = factory.create_admin_unit(None, Some("Libraries")).await?;
                let collection = factory.create_collection(None, Some("Theses")).await?;
                let work = factory.create_work(None, Some("Dissertation")).await?;
                unit.add_member(factory, &collection).await?;
                collection.add_member(factory, &work).await?;
                Ok((collection, work))
            })
            .await
            .unwrap();

        assert_eq!(store.committed_transactions(), 1);
        assert_eq!(store.open_transactions(), 0);
        assert!(store.contains(work.uri()));

        let members = repo.get_members(collection.pid()).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].pid(), work.pid());

        let parent = repo.get_parent(work.pid()).await.unwrap().unwrap();
        assert_eq!(parent.pid(), collection.pid());
        assert_eq!(parent.resource_type(), ResourceType::Collection);
    }

    #[tokio::test]
    async fn failed_run_rolls_back_and_clears_cache() {
        let (repo, store) = Repository::in_memory(BASE);
        let factory = repo.factory();
        let result: RepositoryResult<()> = repo
            .run(|| async {
                let work = factory.create_work(None, None).await?;
                factory.loader().get_object(work.pid()).await?;
                Err(RepositoryError::operation(work.uri(), "checksum mismatch"))
            })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, RepositoryError::TransactionCancelled { source: Some(_) }));
        assert_eq!(store.rolled_back_transactions(), 1);
        assert!(repo.cache().is_empty());
        assert!(store.subjects(vocab::RDF_TYPE, vocab::WORK).is_empty());
    }

    #[tokio::test]
    async fn containment_violation_cancels_run() {
        let (repo, store) = Repository::in_memory(BASE);
        let factory = repo.factory();
        let result = repo
            .run(|| async {
                let work = factory.create_work(None, None).await?;
                let folder = factory.create_folder(None, None).await?;
                work.add_member(factory, &folder).await
            })
            .await;

        assert!(matches!(result, Err(RepositoryError::TransactionCancelled { .. })));
        assert_eq!(store.committed_transactions(), 0);
        assert_eq!(store.rolled_back_transactions(), 1);
    }

    #[tokio::test]
    async fn typed_lookup_checks_kind() {
        let (repo, _) = Repository::in_memory(BASE);
        let folder = repo
            .run(|| async { repo.factory().create_folder(None, Some("Scans")).await })
            .await
            .unwrap();

        let typed: dcr_objects::FolderObject = repo.get_typed(folder.pid()).await.unwrap();
        assert_eq!(typed.title(), Some("Scans"));
        let err = repo.get_typed::<dcr_objects::WorkObject>(folder.pid()).await.unwrap_err();
        assert!(matches!(err, RepositoryError::ObjectTypeMismatch { .. }));
        assert!(repo.exists(folder.pid()).await.unwrap());
    }
}

use std::sync::Arc;

use dcr_client::RepositoryClient;
use dcr_types::{vocab, Pid, PidResolver, RepositoryResult};

use crate::cache::ObjectCache;
use crate::index::RelationshipIndex;
use crate::object::{
    AdminUnit, BinaryObject, CollectionObject, ContentRootObject, DepositRecord, FileObject,
    FolderObject, PremisEventObject, RepositoryObject, Tombstone, TypedObject, WorkObject,
};
use crate::registry::TypeRegistry;

/// Loads objects through the cache, fetching and materializing on a miss.
#[derive(Clone)]
pub struct RepositoryObjectLoader {
    client: RepositoryClient,
    cache: Arc<ObjectCache>,
    registry: Arc<TypeRegistry>,
    index: Arc<dyn RelationshipIndex>,
}

impl RepositoryObjectLoader {
    pub fn new(
        client: RepositoryClient,
        cache: Arc<ObjectCache>,
        registry: Arc<TypeRegistry>,
        index: Arc<dyn RelationshipIndex>,
    ) -> Self {
        Self {
            client,
            cache,
            registry,
            index,
        }
    }

    pub fn client(&self) -> &RepositoryClient {
        &self.client
    }

    pub fn resolver(&self) -> &PidResolver {
        self.client.resolver()
    }

    pub fn cache(&self) -> &Arc<ObjectCache> {
        &self.cache
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Cached object for `pid`, fetched on a miss.
    pub async fn get_object(&self, pid: &Pid) -> RepositoryResult<Arc<RepositoryObject>> {
        self.cache.get_or_load(pid, || self.fetch(pid)).await
    }

    /// Load `pid` and check that it is a `T`.
    pub async fn get_typed<T: TypedObject>(&self, pid: &Pid) -> RepositoryResult<T> {
        T::from_object(self.get_object(pid).await?)
    }

    pub async fn get_content_root(&self) -> RepositoryResult<ContentRootObject> {
        self.get_typed(&Pid::content_root()).await
    }

    pub async fn get_admin_unit(&self, pid: &Pid) -> RepositoryResult<AdminUnit> {
        self.get_typed(pid).await
    }

    pub async fn get_collection_object(&self, pid: &Pid) -> RepositoryResult<CollectionObject> {
        self.get_typed(pid).await
    }

    pub async fn get_folder_object(&self, pid: &Pid) -> RepositoryResult<FolderObject> {
        self.get_typed(pid).await
    }

    pub async fn get_work_object(&self, pid: &Pid) -> RepositoryResult<WorkObject> {
        self.get_typed(pid).await
    }

    pub async fn get_file_object(&self, pid: &Pid) -> RepositoryResult<FileObject> {
        self.get_typed(pid).await
    }

    pub async fn get_binary_object(&self, pid: &Pid) -> RepositoryResult<BinaryObject> {
        self.get_typed(pid).await
    }

    pub async fn get_deposit_record(&self, pid: &Pid) -> RepositoryResult<DepositRecord> {
        self.get_typed(pid).await
    }

    pub async fn get_tombstone(&self, pid: &Pid) -> RepositoryResult<Tombstone> {
        self.get_typed(pid).await
    }

    pub async fn get_premis_event(&self, pid: &Pid) -> RepositoryResult<PremisEventObject> {
        self.get_typed(pid).await
    }

    /// Current state of `pid`.
    ///
    /// A cached object that reports itself fresh is returned as-is;
    /// anything else is refetched and replaces the cache entry.
    pub async fn refresh(&self, pid: &Pid) -> RepositoryResult<Arc<RepositoryObject>> {
        if let Some(cached) = self.cache.peek(pid) {
            if cached.is_fresh() {
                tracing::debug!(pid = %pid, "cached object is immutable, skipping refetch");
                return Ok(cached);
            }
        }
        match self.fetch(pid).await {
            Ok(object) => {
                let object = Arc::new(object);
                self.cache.put(object.clone());
                Ok(object)
            }
            Err(e) => {
                self.cache.invalidate(pid);
                Err(e)
            }
        }
    }

    /// The object whose membership statements point at `pid`.
    ///
    /// Components with no indexed parent fall back to their owning object.
    pub async fn get_parent(&self, pid: &Pid) -> RepositoryResult<Option<Arc<RepositoryObject>>> {
        let child = self.get_object(pid).await?;
        let parents = self
            .index
            .subjects(child.parent_predicate(), child.uri())
            .await?;
        if parents.len() > 1 {
            tracing::warn!(pid = %pid, count = parents.len(), "object has more than one parent");
        }

        let parent = parents.iter().find_map(|uri| self.resolver().resolve(uri));
        match parent {
            Some(parent) => Ok(Some(self.get_object(&parent).await?)),
            None if pid.is_component() => Ok(Some(self.get_object(&pid.parent_object()).await?)),
            None => Ok(None),
        }
    }

    /// Members listed by `container`, read from its current graph.
    ///
    /// A graph with no membership statements falls back to the index, for
    /// repositories that keep membership outside the container resource.
    pub async fn get_members(&self, container: &RepositoryObject) -> RepositoryResult<Vec<Arc<RepositoryObject>>> {
        let current = self.refresh(container.pid()).await?;
        let mut uris = current.member_uris();
        if uris.is_empty() {
            uris = self.index.objects(current.uri(), vocab::PCDM_HAS_MEMBER).await?;
            uris.extend(self.index.objects(current.uri(), vocab::PCDM_HAS_FILE).await?);
            if !uris.is_empty() {
                tracing::debug!(container = %container.pid(), count = uris.len(), "members found through index");
            }
        }
        let mut members = Vec::new();
        for uri in uris {
            match self.resolver().resolve(&uri) {
                Some(pid) => members.push(self.get_object(&pid).await?),
                None => tracing::warn!(container = %container.pid(), uri = %uri, "skipping unresolvable member"),
            }
        }
        Ok(members)
    }

    pub async fn exists(&self, pid: &Pid) -> RepositoryResult<bool> {
        self.client.exists(pid).await
    }

    async fn fetch(&self, pid: &Pid) -> RepositoryResult<RepositoryObject> {
        let response = self.client.get_metadata(pid).await?;
        let object = RepositoryObject::materialize(
            pid.clone(),
            self.resolver().uri(pid),
            response.graph,
            response.etag,
            response.last_modified,
            &self.registry,
        )?;
        tracing::debug!(pid = %pid, resource_type = %object.resource_type(), "materialized object");
        Ok(object)
    }
}

impl std::fmt::Debug for RepositoryObjectLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryObjectLoader")
            .field("base_uri", &self.client.base_uri())
            .field("cache", &self.cache)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, FailureKind, LoadState};
    use crate::model::ResourceType;
    use dcr_client::{InMemoryRepository, Method};
    use async_trait::async_trait;
    use dcr_types::{Graph, Qualifier, RepositoryError, Term, Triple};
    use std::time::Duration;

    const BASE: &str = "http://localhost:8080/rest";

    fn loader_over(repo: Arc<InMemoryRepository>) -> RepositoryObjectLoader {
        RepositoryObjectLoader::new(
            RepositoryClient::new(repo.clone(), PidResolver::new(BASE)),
            Arc::new(ObjectCache::new(CacheConfig::default())),
            Arc::new(TypeRegistry::default()),
            repo,
        )
    }

    fn seed(repo: &InMemoryRepository, pid: &Pid, type_iris: &[&str]) -> String {
        let uri = PidResolver::new(BASE).uri(pid);
        let mut graph = Graph::new();
        for iri in type_iris {
            graph.insert(Triple::iris(&uri, vocab::RDF_TYPE, iri));
        }
        repo.put_graph(&uri, graph);
        uri
    }

    fn link(repo: &InMemoryRepository, parent: &str, predicate: &str, child: &str) {
        let mut graph = repo.graph(parent).unwrap();
        graph.insert(Triple::iris(parent, predicate, child));
        repo.put_graph(parent, graph);
    }

    // ---- materialization ----

    #[tokio::test]
    async fn work_graph_loads_as_work_object() {
        let repo = Arc::new(InMemoryRepository::new(BASE));
        let loader = loader_over(repo.clone());
        let pid = Pid::mint(Qualifier::Content);
        seed(&repo, &pid, &[vocab::FEDORA_CONTAINER, vocab::WORK]);

        let work = loader.get_work_object(&pid).await.unwrap();
        assert_eq!(work.pid(), &pid);
        assert_eq!(work.resource_type(), ResourceType::Work);
        assert!(work.etag().is_some());
        assert!(work.last_modified().is_some());
    }

    #[tokio::test]
    async fn unrecognized_type_fails_with_mismatch() {
        let repo = Arc::new(InMemoryRepository::new(BASE));
        let loader = loader_over(repo.clone());
        let pid = Pid::mint(Qualifier::Content);
        seed(&repo, &pid, &[vocab::FEDORA_CONTAINER]);

        let err = loader.get_object(&pid).await.unwrap_err();
        assert!(matches!(err, RepositoryError::ObjectTypeMismatch { .. }));
        assert_eq!(
            loader.cache().load_state(&pid),
            LoadState::Failed(FailureKind::TypeMismatch)
        );
    }

    #[tokio::test]
    async fn typed_accessor_rejects_other_kind() {
        let repo = Arc::new(InMemoryRepository::new(BASE));
        let loader = loader_over(repo.clone());
        let pid = Pid::mint(Qualifier::Content);
        seed(&repo, &pid, &[vocab::FOLDER]);

        let err = loader.get_work_object(&pid).await.unwrap_err();
        assert!(matches!(err, RepositoryError::ObjectTypeMismatch { .. }));
        assert!(loader.get_folder_object(&pid).await.is_ok());
    }

    #[tokio::test]
    async fn deposit_records_load_under_deposit_qualifier() {
        let repo = Arc::new(InMemoryRepository::new(BASE));
        let loader = loader_over(repo.clone());
        let pid = Pid::mint(Qualifier::Deposit);
        seed(&repo, &pid, &[vocab::DEPOSIT_RECORD]);
        assert!(loader.get_deposit_record(&pid).await.is_ok());
    }

    #[tokio::test]
    async fn missing_and_forbidden_objects() {
        let repo = Arc::new(InMemoryRepository::new(BASE));
        let loader = loader_over(repo.clone());
        let pid = Pid::mint(Qualifier::Content);

        let err = loader.get_object(&pid).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));
        assert!(!loader.exists(&pid).await.unwrap());

        let uri = seed(&repo, &pid, &[vocab::WORK]);
        repo.set_status(&uri, 403);
        let err = loader.get_object(&pid).await.unwrap_err();
        assert!(matches!(err, RepositoryError::AuthorizationFailure(_)));
        assert_eq!(
            loader.cache().load_state(&pid),
            LoadState::Failed(FailureKind::Unauthorized)
        );
    }

    // ---- caching ----

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_gets_issue_one_fetch() {
        let repo = Arc::new(InMemoryRepository::new(BASE).with_latency(Duration::from_millis(50)));
        let loader = loader_over(repo.clone());
        let pid = Pid::mint(Qualifier::Content);
        let uri = seed(&repo, &pid, &[vocab::WORK]);

        let tasks: Vec<_> = (0..12)
            .map(|_| {
                let loader = loader.clone();
                let pid = pid.clone();
                tokio::spawn(async move { loader.get_object(&pid).await.unwrap() })
            })
            .collect();
        let mut objects = Vec::new();
        for task in tasks {
            objects.push(task.await.unwrap());
        }

        assert_eq!(repo.request_count(Method::Get, &uri), 1);
        assert!(objects.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn refresh_refetches_mutable_objects() {
        let repo = Arc::new(InMemoryRepository::new(BASE));
        let loader = loader_over(repo.clone());
        let pid = Pid::mint(Qualifier::Content);
        let uri = seed(&repo, &pid, &[vocab::WORK]);

        let before = loader.get_object(&pid).await.unwrap();
        let mut graph = repo.graph(&uri).unwrap();
        graph.insert(Triple::new(Term::iri(&uri), vocab::DC_TITLE, Term::literal("Renamed")));
        repo.put_graph(&uri, graph);

        let after = loader.refresh(&pid).await.unwrap();
        assert_eq!(repo.request_count(Method::Get, &uri), 2);
        assert_eq!(after.title(), Some("Renamed"));
        assert_ne!(before.etag(), after.etag());
        // The earlier snapshot is untouched.
        assert_eq!(before.title(), None);
        assert_eq!(loader.get_object(&pid).await.unwrap().title(), Some("Renamed"));
    }

    #[tokio::test]
    async fn refresh_skips_immutable_objects() {
        let repo = Arc::new(InMemoryRepository::new(BASE));
        let loader = loader_over(repo.clone());
        let pid = Pid::mint(Qualifier::Content);
        let uri = seed(&repo, &pid, &[vocab::PREMIS_EVENT]);

        loader.get_premis_event(&pid).await.unwrap();
        loader.refresh(&pid).await.unwrap();
        loader.refresh(&pid).await.unwrap();
        assert_eq!(repo.request_count(Method::Get, &uri), 1);
    }

    #[tokio::test]
    async fn refresh_of_deleted_object_evicts_it() {
        let repo = Arc::new(InMemoryRepository::new(BASE));
        let loader = loader_over(repo.clone());
        let pid = Pid::mint(Qualifier::Content);
        let uri = seed(&repo, &pid, &[vocab::WORK]);
        loader.get_object(&pid).await.unwrap();

        repo.set_status(&uri, 410);
        assert!(loader.refresh(&pid).await.is_err());
        assert!(loader.cache().peek(&pid).is_none());
    }

    // ---- relationships ----

    #[tokio::test]
    async fn parent_is_found_through_membership() {
        let repo = Arc::new(InMemoryRepository::new(BASE));
        let loader = loader_over(repo.clone());
        let work = Pid::mint(Qualifier::Content);
        let file = Pid::mint(Qualifier::Content);
        let work_uri = seed(&repo, &work, &[vocab::WORK]);
        let file_uri = seed(&repo, &file, &[vocab::FILE_OBJECT]);
        link(&repo, &work_uri, vocab::PCDM_HAS_MEMBER, &file_uri);

        let parent = loader.get_parent(&file).await.unwrap().unwrap();
        assert_eq!(parent.pid(), &work);
        assert!(loader.get_parent(&work).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn binary_parent_uses_file_predicate() {
        let repo = Arc::new(InMemoryRepository::new(BASE));
        let loader = loader_over(repo.clone());
        let file = Pid::mint(Qualifier::Content);
        let binary = file.component("datafs/original_file").unwrap();
        let file_uri = seed(&repo, &file, &[vocab::FILE_OBJECT]);
        let binary_uri = seed(&repo, &binary, &[vocab::FEDORA_BINARY]);

        // Without a hasFile link the owning object is the parent.
        let parent = loader.get_parent(&binary).await.unwrap().unwrap();
        assert_eq!(parent.pid(), &file);

        // A hasMember link is not a file link.
        let other = Pid::mint(Qualifier::Content);
        let other_uri = seed(&repo, &other, &[vocab::FILE_OBJECT]);
        link(&repo, &other_uri, vocab::PCDM_HAS_MEMBER, &binary_uri);
        let parent = loader.get_parent(&binary).await.unwrap().unwrap();
        assert_eq!(parent.pid(), &file);

        link(&repo, &other_uri, vocab::PCDM_HAS_FILE, &binary_uri);
        let parent = loader.get_parent(&binary).await.unwrap().unwrap();
        assert_eq!(parent.pid(), &other);
        assert_ne!(parent.uri(), file_uri);
    }

    /// Index that knows a fixed set of member links.
    struct FixedMembers {
        container: String,
        members: Vec<String>,
    }

    #[async_trait]
    impl RelationshipIndex for FixedMembers {
        async fn subjects(&self, _predicate: &str, _object: &str) -> RepositoryResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn objects(&self, subject: &str, predicate: &str) -> RepositoryResult<Vec<String>> {
            if subject == self.container && predicate == vocab::PCDM_HAS_MEMBER {
                Ok(self.members.clone())
            } else {
                Ok(Vec::new())
            }
        }
    }

    #[tokio::test]
    async fn members_fall_back_to_index() {
        let repo = Arc::new(InMemoryRepository::new(BASE));
        let folder = Pid::mint(Qualifier::Content);
        let work = Pid::mint(Qualifier::Content);
        let folder_uri = seed(&repo, &folder, &[vocab::FOLDER]);
        let work_uri = seed(&repo, &work, &[vocab::WORK]);
        let loader = RepositoryObjectLoader::new(
            RepositoryClient::new(repo.clone(), PidResolver::new(BASE)),
            Arc::new(ObjectCache::default()),
            Arc::new(TypeRegistry::default()),
            Arc::new(FixedMembers {
                container: folder_uri,
                members: vec![work_uri],
            }),
        );

        let container = loader.get_object(&folder).await.unwrap();
        let members = loader.get_members(&container).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].pid(), &work);
    }

    #[tokio::test]
    async fn members_follow_container_graph() {
        let repo = Arc::new(InMemoryRepository::new(BASE));
        let loader = loader_over(repo.clone());
        let work = Pid::mint(Qualifier::Content);
        let work_uri = seed(&repo, &work, &[vocab::WORK]);
        let container = loader.get_object(&work).await.unwrap();
        assert!(loader.get_members(&container).await.unwrap().is_empty());

        let file = Pid::mint(Qualifier::Content);
        let file_uri = seed(&repo, &file, &[vocab::FILE_OBJECT]);
        link(&repo, &work_uri, vocab::PCDM_HAS_MEMBER, &file_uri);

        let members = loader.get_members(&container).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].pid(), &file);
        assert_eq!(members[0].resource_type(), ResourceType::File);
    }
}

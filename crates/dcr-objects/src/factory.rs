use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use dcr_client::RepositoryClient;
use dcr_types::{vocab, Graph, Pid, RepositoryError, RepositoryResult, SparqlUpdate, Term, Triple};

use crate::loader::RepositoryObjectLoader;
use crate::object::{
    check_containment, AdminUnit, AsObject, BinaryObject, CollectionObject, ContentRootObject,
    DepositRecord, FileObject, FolderObject, PremisEventObject, RepositoryObject, Tombstone,
    TypedObject, WorkObject,
};

/// Creates and mutates repository objects.
///
/// Writes go through the loader's client, so they join the ambient
/// transaction when the client is transactional. Every write invalidates
/// the cache entry of the object it touched.
#[derive(Clone, Debug)]
pub struct RepositoryObjectFactory {
    loader: RepositoryObjectLoader,
}

impl RepositoryObjectFactory {
    pub fn new(loader: RepositoryObjectLoader) -> Self {
        Self { loader }
    }

    pub fn loader(&self) -> &RepositoryObjectLoader {
        &self.loader
    }

    fn client(&self) -> &RepositoryClient {
        self.loader.client()
    }

    /// Create the content root unless it already exists.
    pub async fn create_content_root(&self) -> RepositoryResult<ContentRootObject> {
        let pid = Pid::content_root();
        if self.client().exists(&pid).await? {
            return self.loader.get_typed(&pid).await;
        }
        self.create_object(Some(pid), None).await
    }

    pub async fn create_admin_unit(&self, pid: Option<Pid>, title: Option<&str>) -> RepositoryResult<AdminUnit> {
        self.create_object(pid, title).await
    }

    pub async fn create_collection(
        &self,
        pid: Option<Pid>,
        title: Option<&str>,
    ) -> RepositoryResult<CollectionObject> {
        self.create_object(pid, title).await
    }

    pub async fn create_folder(&self, pid: Option<Pid>, title: Option<&str>) -> RepositoryResult<FolderObject> {
        self.create_object(pid, title).await
    }

    pub async fn create_work(&self, pid: Option<Pid>, title: Option<&str>) -> RepositoryResult<WorkObject> {
        self.create_object(pid, title).await
    }

    pub async fn create_file(&self, pid: Option<Pid>, title: Option<&str>) -> RepositoryResult<FileObject> {
        self.create_object(pid, title).await
    }

    pub async fn create_deposit_record(
        &self,
        pid: Option<Pid>,
        title: Option<&str>,
    ) -> RepositoryResult<DepositRecord> {
        self.create_object(pid, title).await
    }

    /// Store `content` at `pid` as a binary.
    pub async fn create_binary(
        &self,
        pid: &Pid,
        content: Bytes,
        content_type: &str,
        filename: Option<&str>,
    ) -> RepositoryResult<BinaryObject> {
        check_qualifier::<BinaryObject>(pid)?;
        self.client()
            .create_binary(pid, content, content_type, filename)
            .await?;
        self.loader.cache().invalidate(pid);
        tracing::debug!(pid = %pid, content_type, "created binary");
        self.loader.get_typed(pid).await
    }

    /// Store the original bytes of `file` and link them to it.
    pub async fn create_original_file(
        &self,
        file: &FileObject,
        content: Bytes,
        content_type: &str,
        filename: Option<&str>,
    ) -> RepositoryResult<BinaryObject> {
        let pid = file.original_file_pid()?;
        let binary = self
            .create_binary(&pid, content, content_type, filename)
            .await?;
        self.add_member(file.as_object(), binary.as_object()).await?;
        Ok(binary)
    }

    /// Record a provenance event about `object`.
    pub async fn create_premis_event(
        &self,
        object: &Pid,
        event_type: &str,
        detail: Option<&str>,
    ) -> RepositoryResult<PremisEventObject> {
        let pid = Pid::mint(object.qualifier());
        check_qualifier::<PremisEventObject>(&pid)?;
        let uri = self.loader.resolver().uri(&pid);
        let subject = Term::iri(&uri);

        let mut graph = type_graph(&uri, PremisEventObject::RESOURCE_TYPE.type_iri(), None);
        graph.insert(Triple::new(subject.clone(), vocab::PREMIS_EVENT_TYPE, Term::iri(event_type)));
        graph.insert(Triple::iris(
            &uri,
            vocab::PREMIS_RELATED_OBJECT,
            &self.loader.resolver().uri(&object.parent_object()),
        ));
        graph.insert(Triple::new(
            subject.clone(),
            vocab::PREMIS_EVENT_DATE_TIME,
            Term::typed_literal(
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                vocab::XSD_DATE_TIME,
            ),
        ));
        if let Some(detail) = detail {
            graph.insert(Triple::new(subject, vocab::PREMIS_EVENT_DETAIL, Term::literal(detail)));
        }

        self.client().create_resource(&pid, &graph).await?;
        tracing::debug!(pid = %pid, object = %object, event_type, "recorded premis event");
        self.loader.get_typed(&pid).await
    }

    /// Link `member` under `container`.
    ///
    /// Fails with `ObjectTypeMismatch`, without writing, if the
    /// container's kind does not accept the member's kind.
    pub async fn add_member(&self, container: &RepositoryObject, member: &RepositoryObject) -> RepositoryResult<()> {
        check_containment(container, member)?;
        let update = SparqlUpdate::new().insert(Triple::iris(
            container.uri(),
            member.parent_predicate(),
            member.uri(),
        ));
        self.client().update_metadata(container.pid(), &update).await?;
        self.loader.cache().invalidate(container.pid());
        tracing::debug!(
            container = %container.pid(),
            member = %member.pid(),
            member_type = %member.resource_type(),
            "added member"
        );
        Ok(())
    }

    /// Replace the object's types with the tombstone type.
    pub async fn tombstone(&self, pid: &Pid) -> RepositoryResult<Tombstone> {
        let object = self.loader.refresh(pid).await?;
        let mut update = SparqlUpdate::new();
        for iri in object.types() {
            update = update.delete(Triple::iris(object.uri(), vocab::RDF_TYPE, iri));
        }
        update = update.insert(Triple::iris(object.uri(), vocab::RDF_TYPE, vocab::TOMBSTONE));
        self.client().update_metadata(pid, &update).await?;
        self.loader.cache().invalidate(pid);
        tracing::info!(pid = %pid, was = %object.resource_type(), "object tombstoned");
        self.loader.get_typed(pid).await
    }

    async fn create_object<T: TypedObject>(&self, pid: Option<Pid>, title: Option<&str>) -> RepositoryResult<T> {
        let kind = T::RESOURCE_TYPE;
        let pid = match pid {
            Some(pid) => pid,
            None => Pid::mint(kind.qualifiers()[0]),
        };
        check_qualifier::<T>(&pid)?;
        if pid.is_component() {
            return Err(RepositoryError::InvalidIdentifier(format!(
                "{kind} cannot be created at component {pid}"
            )));
        }

        let uri = self.loader.resolver().uri(&pid);
        let graph = type_graph(&uri, kind.type_iri(), title);
        self.client().create_resource(&pid, &graph).await?;
        self.loader.cache().invalidate(&pid);
        tracing::debug!(pid = %pid, resource_type = %kind, "created object");
        self.loader.get_typed(&pid).await
    }
}

fn check_qualifier<T: TypedObject>(pid: &Pid) -> RepositoryResult<()> {
    let kind = T::RESOURCE_TYPE;
    if kind.qualifiers().contains(&pid.qualifier()) {
        Ok(())
    } else {
        Err(RepositoryError::InvalidIdentifier(format!(
            "{kind} objects cannot live under qualifier {}",
            pid.qualifier()
        )))
    }
}

fn type_graph(uri: &str, type_iri: &str, title: Option<&str>) -> Graph {
    let mut graph = Graph::new();
    graph.insert(Triple::iris(uri, vocab::RDF_TYPE, type_iri));
    if let Some(title) = title {
        graph.insert(Triple::new(Term::iri(uri), vocab::DC_TITLE, Term::literal(title)));
    }
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ObjectCache;
    use crate::model::ResourceType;
    use crate::object::ContentContainer;
    use crate::registry::TypeRegistry;
    use dcr_client::{InMemoryRepository, Method};
    use dcr_txn::{TransactionConfig, TransactionManager, TransactionalTransport};
    use dcr_types::{PidResolver, Qualifier};
    use std::sync::Arc;

    const BASE: &str = "http://localhost:8080/rest";

    struct Fixture {
        repo: Arc<InMemoryRepository>,
        factory: RepositoryObjectFactory,
        manager: TransactionManager,
    }

    impl Fixture {
        fn loader(&self) -> &RepositoryObjectLoader {
            self.factory.loader()
        }
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(InMemoryRepository::new(BASE));
        let resolver = PidResolver::new(BASE);
        let client = RepositoryClient::new(
            Arc::new(TransactionalTransport::new(repo.clone(), BASE)),
            resolver.clone(),
        );
        let loader = RepositoryObjectLoader::new(
            client,
            Arc::new(ObjectCache::default()),
            Arc::new(TypeRegistry::default()),
            repo.clone(),
        );
        Fixture {
            manager: TransactionManager::new(
                RepositoryClient::new(repo.clone(), resolver),
                TransactionConfig::default(),
            ),
            factory: RepositoryObjectFactory::new(loader),
            repo,
        }
    }

    // ---- containment ----

    #[tokio::test]
    async fn work_accepts_file_and_lists_it() {
        let f = fixture();
        let work = f.factory.create_work(None, Some("Thesis")).await.unwrap();
        let file = f.factory.create_file(None, None).await.unwrap();

        work.add_member(&f.factory, &file).await.unwrap();
        let members = work.members(f.loader()).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].pid(), file.pid());
        assert_eq!(members[0].resource_type(), ResourceType::File);
        assert_eq!(work.title(), Some("Thesis"));
    }

    #[tokio::test]
    async fn folder_accepts_work_and_file_chained() {
        let f = fixture();
        let folder = f.factory.create_folder(None, None).await.unwrap();
        let work = f.factory.create_work(None, None).await.unwrap();
        let file = f.factory.create_file(None, None).await.unwrap();

        let returned = folder
            .add_member(&f.factory, &work)
            .await
            .unwrap()
            .add_member(&f.factory, &file)
            .await
            .unwrap();
        assert_eq!(returned.pid(), folder.pid());

        let mut members: Vec<_> = folder
            .members(f.loader())
            .await
            .unwrap()
            .iter()
            .map(|m| m.resource_type())
            .collect();
        members.sort();
        assert_eq!(members, vec![ResourceType::Work, ResourceType::File]);
    }

    #[tokio::test]
    async fn collection_rejects_file() {
        let f = fixture();
        let collection = f.factory.create_collection(None, None).await.unwrap();
        let file = f.factory.create_file(None, None).await.unwrap();

        let err = collection.add_member(&f.factory, &file).await.unwrap_err();
        assert!(matches!(err, RepositoryError::ObjectTypeMismatch { .. }));
        assert_eq!(f.repo.method_count(Method::Patch), 0);
        assert!(collection.members(f.loader()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn untyped_members_are_checked_too() {
        let f = fixture();
        let record = f.factory.create_deposit_record(None, None).await.unwrap();
        let work = f.factory.create_work(None, None).await.unwrap();
        let err = f
            .factory
            .add_member(record.as_object(), work.as_object())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not accept members"));
    }

    #[tokio::test]
    async fn builds_full_hierarchy() {
        let f = fixture();
        let root = f.factory.create_content_root().await.unwrap();
        let unit = f.factory.create_admin_unit(None, Some("Library")).await.unwrap();
        let collection = f.factory.create_collection(None, None).await.unwrap();
        let folder = f.factory.create_folder(None, None).await.unwrap();
        let work = f.factory.create_work(None, None).await.unwrap();
        let file = f.factory.create_file(None, None).await.unwrap();

        root.add_member(&f.factory, &unit).await.unwrap();
        unit.add_member(&f.factory, &collection).await.unwrap();
        collection.add_member(&f.factory, &folder).await.unwrap();
        folder.add_member(&f.factory, &work).await.unwrap();
        work.add_member(&f.factory, &file).await.unwrap();

        let binary = f
            .factory
            .create_original_file(&file, Bytes::from_static(b"%PDF"), "application/pdf", Some("thesis.pdf"))
            .await
            .unwrap();
        assert_eq!(binary.filename(), Some("thesis.pdf"));
        assert_eq!(binary.mime_type(), Some("application/pdf"));
        assert_eq!(binary.pid(), &file.original_file_pid().unwrap());

        let loader = f.loader();
        assert_eq!(loader.get_parent(binary.pid()).await.unwrap().unwrap().pid(), file.pid());
        assert_eq!(loader.get_parent(file.pid()).await.unwrap().unwrap().pid(), work.pid());
        assert_eq!(loader.get_parent(work.pid()).await.unwrap().unwrap().pid(), folder.pid());
        assert_eq!(loader.get_parent(unit.pid()).await.unwrap().unwrap().pid(), root.pid());
        assert!(loader.get_parent(root.pid()).await.unwrap().is_none());

        // Creating the root again returns the existing one.
        let again = f.factory.create_content_root().await.unwrap();
        assert_eq!(again.pid(), root.pid());
    }

    // ---- creation rules ----

    #[tokio::test]
    async fn qualifier_must_match_kind() {
        let f = fixture();
        let err = f
            .factory
            .create_work(Some(Pid::mint(Qualifier::Deposit)), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidIdentifier(_)));

        let record = f.factory.create_deposit_record(None, None).await.unwrap();
        assert_eq!(record.pid().qualifier(), Qualifier::Deposit);
    }

    #[tokio::test]
    async fn events_are_immutable_records() {
        let f = fixture();
        let work = f.factory.create_work(None, None).await.unwrap();
        let event = f
            .factory
            .create_premis_event(
                work.pid(),
                "http://id.loc.gov/vocabulary/preservation/eventType/cre",
                Some("ingested"),
            )
            .await
            .unwrap();
        assert!(event.is_fresh());
        assert_eq!(event.detail(), Some("ingested"));
        assert_eq!(event.related_object().as_deref(), Some(work.uri()));
        assert!(event.event_type().unwrap().ends_with("/cre"));
    }

    #[tokio::test]
    async fn tombstone_replaces_type() {
        let f = fixture();
        let work = f.factory.create_work(None, Some("Withdrawn")).await.unwrap();
        let tombstone = f.factory.tombstone(work.pid()).await.unwrap();
        assert_eq!(tombstone.resource_type(), ResourceType::Tombstone);
        assert_eq!(tombstone.title(), Some("Withdrawn"));

        let err = f.loader().get_work_object(work.pid()).await.unwrap_err();
        assert!(matches!(err, RepositoryError::ObjectTypeMismatch { .. }));
    }

    // ---- transactions ----

    #[tokio::test]
    async fn writes_in_cancelled_transaction_are_discarded() {
        let f = fixture();
        let factory = &f.factory;
        let mut created = None;
        let slot = &mut created;
        let result: RepositoryResult<()> = f
            .manager
            .run(|| async move {
                let work = factory.create_work(None, None).await?;
                *slot = Some(work.pid().clone());
                Err(RepositoryError::operation(work.uri(), "validation failed"))
            })
            .await;
        assert!(matches!(result, Err(RepositoryError::TransactionCancelled { .. })));

        let pid = created.unwrap();
        assert!(!f.repo.contains(&PidResolver::new(BASE).uri(&pid)));
        assert_eq!(f.repo.rolled_back_transactions(), 1);
    }

    #[tokio::test]
    async fn writes_in_committed_transaction_are_visible() {
        let f = fixture();
        let (work, file) = f
            .manager
            .run(|| async {
                let work = f.factory.create_work(None, None).await?;
                let file = f.factory.create_file(None, None).await?;
                work.add_member(&f.factory, &file).await?;
                Ok((work, file))
            })
            .await
            .unwrap();

        assert!(f.repo.contains(work.uri()));
        assert_eq!(
            f.repo.objects(work.uri(), vocab::PCDM_HAS_MEMBER),
            vec![file.uri().to_string()]
        );
    }
}

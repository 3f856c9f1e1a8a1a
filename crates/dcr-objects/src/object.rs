use std::fmt;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dcr_types::{vocab, Graph, Pid, RepositoryError, RepositoryResult};

use crate::factory::RepositoryObjectFactory;
use crate::loader::RepositoryObjectLoader;
use crate::model::ResourceType;
use crate::registry::TypeRegistry;

/// A materialized repository object.
///
/// Holds the metadata graph as fetched; a refresh produces a new object
/// rather than mutating this one.
#[derive(Clone)]
pub struct RepositoryObject {
    pid: Pid,
    uri: String,
    resource_type: ResourceType,
    declared_type: String,
    graph: Arc<Graph>,
    types: OnceLock<Vec<String>>,
    etag: Option<String>,
    last_modified: Option<DateTime<Utc>>,
}

impl RepositoryObject {
    /// Pick the object's kind from the `rdf:type` statements about `uri`.
    ///
    /// Fails with `ObjectTypeMismatch` when no registered type matches
    /// under the PID's qualifier.
    pub fn materialize(
        pid: Pid,
        uri: String,
        graph: Graph,
        etag: Option<String>,
        last_modified: Option<DateTime<Utc>>,
        registry: &TypeRegistry,
    ) -> RepositoryResult<Self> {
        let types = graph.types_of(&uri);
        let (resource_type, declared_type) =
            registry.resolve(pid.qualifier(), &types).ok_or_else(|| {
                RepositoryError::type_mismatch(
                    &pid,
                    format!(
                        "no recognized type among [{}] for qualifier {}",
                        types.join(", "),
                        pid.qualifier()
                    ),
                )
            })?;
        let object = Self {
            declared_type: declared_type.to_string(),
            pid,
            uri,
            resource_type,
            graph: Arc::new(graph),
            types: OnceLock::from(types),
            etag,
            last_modified,
        };
        object.validate_type()?;
        Ok(object)
    }

    pub fn pid(&self) -> &Pid {
        &self.pid
    }

    /// Canonical subject URI of the object's statements.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    /// `rdf:type` IRIs declared for the object.
    pub fn types(&self) -> &[String] {
        self.types.get_or_init(|| self.graph.types_of(&self.uri))
    }

    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    pub fn title(&self) -> Option<&str> {
        self.graph.literal(&self.uri, vocab::DC_TITLE)
    }

    /// Whether a cached copy can be used without refetching.
    pub fn is_fresh(&self) -> bool {
        self.resource_type.is_immutable()
    }

    /// Check that the declared RDF types agree with the materialized kind.
    pub fn validate_type(&self) -> RepositoryResult<()> {
        let types = self.types();
        if !types.iter().any(|t| *t == self.declared_type) {
            return Err(RepositoryError::type_mismatch(
                &self.pid,
                format!("{} does not declare {}", self.uri, self.declared_type),
            ));
        }
        if self.resource_type != ResourceType::Tombstone
            && types.iter().any(|t| t == vocab::TOMBSTONE)
        {
            return Err(RepositoryError::type_mismatch(
                &self.pid,
                format!("{} is a tombstone, not a {}", self.uri, self.resource_type),
            ));
        }
        Ok(())
    }

    /// Predicate by which a parent points at this object.
    pub fn parent_predicate(&self) -> &'static str {
        self.resource_type.membership_predicate()
    }

    /// IRIs this object lists as members, in graph order.
    pub fn member_uris(&self) -> Vec<String> {
        let mut members = self.graph.object_iris(&self.uri, vocab::PCDM_HAS_MEMBER);
        members.extend(self.graph.object_iris(&self.uri, vocab::PCDM_HAS_FILE));
        members
    }
}

impl PartialEq for RepositoryObject {
    fn eq(&self, other: &Self) -> bool {
        self.pid == other.pid
            && self.resource_type == other.resource_type
            && self.etag == other.etag
            && self.last_modified == other.last_modified
            && self.graph == other.graph
    }
}

impl Eq for RepositoryObject {}

impl fmt::Debug for RepositoryObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryObject")
            .field("pid", &self.pid.to_compact())
            .field("type", &self.resource_type)
            .field("etag", &self.etag)
            .field("triples", &self.graph.len())
            .finish()
    }
}

/// Anything that exposes an underlying [`RepositoryObject`].
pub trait AsObject: Send + Sync {
    fn as_object(&self) -> &RepositoryObject;
}

impl AsObject for RepositoryObject {
    fn as_object(&self) -> &RepositoryObject {
        self
    }
}

impl AsObject for Arc<RepositoryObject> {
    fn as_object(&self) -> &RepositoryObject {
        self
    }
}

/// A statically typed view of a [`RepositoryObject`].
pub trait TypedObject: AsObject + Clone + Sized + 'static {
    const RESOURCE_TYPE: ResourceType;

    #[doc(hidden)]
    fn wrap(object: Arc<RepositoryObject>) -> Self;

    /// Wrap `object`, failing if it is of another kind.
    fn from_object(object: Arc<RepositoryObject>) -> RepositoryResult<Self> {
        if object.resource_type() != Self::RESOURCE_TYPE {
            return Err(RepositoryError::type_mismatch(
                object.pid(),
                format!(
                    "expected {}, found {}",
                    Self::RESOURCE_TYPE,
                    object.resource_type()
                ),
            ));
        }
        Ok(Self::wrap(object))
    }

    fn pid(&self) -> &Pid {
        self.as_object().pid()
    }
}

/// Typed objects that accept members.
#[async_trait]
pub trait ContentContainer: TypedObject {
    /// Fail with `ObjectTypeMismatch` if `member` may not be added here.
    fn check_member(&self, member: &RepositoryObject) -> RepositoryResult<()> {
        check_containment(self.as_object(), member)
    }

    /// Record `member` as a child of this container and return the
    /// container, so additions can be chained.
    async fn add_member<M>(&self, factory: &RepositoryObjectFactory, member: &M) -> RepositoryResult<Self>
    where
        M: AsObject + ?Sized,
    {
        factory
            .add_member(self.as_object(), member.as_object())
            .await?;
        Ok(self.clone())
    }

    async fn members(&self, loader: &RepositoryObjectLoader) -> RepositoryResult<Vec<Arc<RepositoryObject>>> {
        loader.get_members(self.as_object()).await
    }
}

/// Containment check shared by typed and untyped callers.
pub(crate) fn check_containment(
    container: &RepositoryObject,
    member: &RepositoryObject,
) -> RepositoryResult<()> {
    let parent = container.resource_type();
    if parent.can_contain(member.resource_type()) {
        return Ok(());
    }
    let reason = if parent.is_container() {
        format!(
            "{} cannot contain {}; allowed: {}",
            parent,
            member.resource_type(),
            parent
                .allowed_members()
                .iter()
                .map(ResourceType::name)
                .collect::<Vec<_>>()
                .join(", ")
        )
    } else {
        format!("{parent} does not accept members")
    };
    Err(RepositoryError::type_mismatch(member.pid(), reason))
}

macro_rules! typed_object {
    ($(#[$meta:meta])* $name:ident => $kind:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq)]
        pub struct $name(Arc<RepositoryObject>);

        impl $name {
            pub fn object(&self) -> &Arc<RepositoryObject> {
                &self.0
            }
        }

        impl AsObject for $name {
            fn as_object(&self) -> &RepositoryObject {
                &self.0
            }
        }

        impl TypedObject for $name {
            const RESOURCE_TYPE: ResourceType = ResourceType::$kind;

            fn wrap(object: Arc<RepositoryObject>) -> Self {
                Self(object)
            }
        }

        impl std::ops::Deref for $name {
            type Target = RepositoryObject;

            fn deref(&self) -> &RepositoryObject {
                &self.0
            }
        }
    };
}

typed_object!(
    /// The single root under which all administrative units live.
    ContentRootObject => ContentRoot
);
typed_object!(AdminUnit => AdminUnit);
typed_object!(CollectionObject => Collection);
typed_object!(FolderObject => Folder);
typed_object!(
    /// An intellectual entity grouping one or more files.
    WorkObject => Work
);
typed_object!(FileObject => File);
typed_object!(
    /// Stored bytes plus technical metadata.
    BinaryObject => Binary
);
typed_object!(DepositRecord => DepositRecord);
typed_object!(
    /// Marker left in place of a removed object.
    Tombstone => Tombstone
);
typed_object!(
    /// A provenance event. Immutable once written.
    PremisEventObject => PremisEvent
);

impl ContentContainer for ContentRootObject {}
impl ContentContainer for AdminUnit {}
impl ContentContainer for CollectionObject {}
impl ContentContainer for FolderObject {}
impl ContentContainer for WorkObject {}
impl ContentContainer for FileObject {}

/// Component path of a file's original binary.
pub const ORIGINAL_FILE: &str = "datafs/original_file";

impl FileObject {
    /// PID of the binary holding the original bytes.
    pub fn original_file_pid(&self) -> RepositoryResult<Pid> {
        self.pid().component(ORIGINAL_FILE)
    }
}

impl BinaryObject {
    pub fn filename(&self) -> Option<&str> {
        self.graph().literal(self.uri(), vocab::EBUCORE_FILENAME)
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.graph().literal(self.uri(), vocab::EBUCORE_MIME_TYPE)
    }
}

impl PremisEventObject {
    pub fn event_type(&self) -> Option<String> {
        self.graph()
            .objects(self.uri(), vocab::PREMIS_EVENT_TYPE)
            .into_iter()
            .find_map(|t| t.as_iri().or_else(|| t.as_literal()).map(str::to_string))
    }

    pub fn related_object(&self) -> Option<String> {
        self.graph()
            .object_iris(self.uri(), vocab::PREMIS_RELATED_OBJECT)
            .into_iter()
            .next()
    }

    pub fn detail(&self) -> Option<&str> {
        self.graph().literal(self.uri(), vocab::PREMIS_EVENT_DETAIL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcr_types::{PidResolver, Qualifier, Term, Triple};

    const BASE: &str = "http://localhost:8080/rest";

    fn materialize(qualifier: Qualifier, type_iris: &[&str]) -> RepositoryResult<RepositoryObject> {
        let pid = Pid::mint(qualifier);
        let uri = PidResolver::new(BASE).uri(&pid);
        let mut graph = Graph::new();
        for iri in type_iris {
            graph.insert(Triple::iris(&uri, vocab::RDF_TYPE, iri));
        }
        graph.insert(Triple::new(Term::iri(&uri), vocab::DC_TITLE, Term::literal("Title")));
        RepositoryObject::materialize(pid, uri, graph, Some("3".into()), None, &TypeRegistry::default())
    }

    #[test]
    fn work_graph_materializes_as_work() {
        let object = materialize(Qualifier::Content, &[vocab::FEDORA_CONTAINER, vocab::WORK]).unwrap();
        assert_eq!(object.resource_type(), ResourceType::Work);
        assert_eq!(object.title(), Some("Title"));
        assert_eq!(object.etag(), Some("3"));
        assert!(!object.is_fresh());
        let work = WorkObject::from_object(Arc::new(object)).unwrap();
        assert_eq!(work.resource_type(), ResourceType::Work);
    }

    #[test]
    fn unrecognized_type_is_a_mismatch() {
        let err = materialize(Qualifier::Content, &[vocab::FEDORA_CONTAINER]).unwrap_err();
        assert!(matches!(err, RepositoryError::ObjectTypeMismatch { .. }));
        let err = materialize(Qualifier::Content, &[]).unwrap_err();
        assert!(matches!(err, RepositoryError::ObjectTypeMismatch { .. }));
    }

    #[test]
    fn content_type_under_deposit_qualifier_is_a_mismatch() {
        let err = materialize(Qualifier::Deposit, &[vocab::WORK]).unwrap_err();
        assert!(matches!(err, RepositoryError::ObjectTypeMismatch { .. }));
    }

    #[test]
    fn typed_view_rejects_other_kinds() {
        let object = Arc::new(materialize(Qualifier::Content, &[vocab::FOLDER]).unwrap());
        let err = WorkObject::from_object(object.clone()).unwrap_err();
        assert!(err.to_string().contains("expected Work, found Folder"));
        assert!(FolderObject::from_object(object).is_ok());
    }

    #[test]
    fn tombstoned_object_materializes_as_tombstone() {
        let object = materialize(Qualifier::Content, &[vocab::WORK, vocab::TOMBSTONE]).unwrap();
        assert_eq!(object.resource_type(), ResourceType::Tombstone);
        assert!(object.validate_type().is_ok());
    }

    #[test]
    fn events_are_always_fresh() {
        let object = materialize(Qualifier::Content, &[vocab::PREMIS_EVENT]).unwrap();
        assert!(object.is_fresh());
    }

    #[test]
    fn containment_check() {
        let collection = materialize(Qualifier::Content, &[vocab::COLLECTION]).unwrap();
        let work = materialize(Qualifier::Content, &[vocab::WORK]).unwrap();
        let file = materialize(Qualifier::Content, &[vocab::FILE_OBJECT]).unwrap();
        let record = materialize(Qualifier::Deposit, &[vocab::DEPOSIT_RECORD]).unwrap();

        assert!(check_containment(&collection, &work).is_ok());
        let err = check_containment(&collection, &file).unwrap_err();
        assert!(matches!(err, RepositoryError::ObjectTypeMismatch { .. }));
        assert!(err.to_string().contains("Collection cannot contain FileObject"));
        assert!(check_containment(&work, &file).is_ok());

        let err = check_containment(&record, &work).unwrap_err();
        assert!(err.to_string().contains("does not accept members"));
    }

    #[test]
    fn types_are_derived_from_graph() {
        let object = materialize(Qualifier::Content, &[vocab::WORK, vocab::PCDM_OBJECT]).unwrap();
        let mut types = object.types().to_vec();
        types.sort();
        assert_eq!(types, vec![vocab::PCDM_OBJECT.to_string(), vocab::WORK.to_string()]);
    }
}

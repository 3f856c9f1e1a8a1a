//! Repository object model for the DCR access layer.
//!
//! Objects are materialized from their metadata graphs: the `rdf:type`
//! statements about an object select its [`ResourceType`] through the
//! [`TypeRegistry`], and typed views ([`WorkObject`], [`FileObject`], ...)
//! expose kind-specific accessors. Containment rules live in a data table
//! on [`ResourceType`] and are enforced when members are added, not when
//! graphs are parsed.
//!
//! # Components
//!
//! - [`ObjectCache`] -- bounded, TTL-limited, coalescing cache
//! - [`RepositoryObjectLoader`] -- cache-backed reads, refresh, parent and
//!   member discovery
//! - [`RepositoryObjectFactory`] -- object creation and membership writes
//! - [`RelationshipIndex`] -- reverse relationship queries (SPARQL or
//!   in-memory)

pub mod cache;
pub mod factory;
pub mod index;
pub mod loader;
pub mod model;
pub mod object;
pub mod registry;

pub use cache::{CacheConfig, FailureKind, LoadState, ObjectCache};
pub use factory::RepositoryObjectFactory;
pub use index::{NoRelationshipIndex, RelationshipIndex, SparqlRelationshipIndex};
pub use loader::RepositoryObjectLoader;
pub use model::ResourceType;
pub use object::{
    AdminUnit, AsObject, BinaryObject, CollectionObject, ContentContainer, ContentRootObject,
    DepositRecord, FileObject, FolderObject, PremisEventObject, RepositoryObject, Tombstone,
    TypedObject, WorkObject, ORIGINAL_FILE,
};
pub use registry::TypeRegistry;

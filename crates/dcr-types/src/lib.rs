//! Foundation types for the DCR repository access layer.
//!
//! Every other DCR crate depends on `dcr-types`. It has no knowledge of
//! HTTP or of the remote server; it only defines how objects are named,
//! where they live, and how their metadata graphs are represented.
//!
//! # Key Types
//!
//! - [`Pid`] -- persistent identifier of a repository object or sub-component
//! - [`Qualifier`] -- namespace segment separating object categories
//! - [`PidResolver`] -- parses full URIs, repository paths and compact ids
//! - [`Graph`] -- RDF graph value with an N-Triples codec
//! - [`SparqlUpdate`] -- incremental graph update sent as a PATCH body
//! - [`RepositoryError`] -- the error taxonomy shared by all crates

pub mod error;
pub mod graph;
pub mod paths;
pub mod pid;
pub mod sparql;
pub mod vocab;

pub use error::{BoxError, GraphError, RepositoryError, RepositoryResult};
pub use graph::{Graph, Term, Triple};
pub use paths::{derive_path, is_proper_descendant, PidResolver};
pub use pid::{Pid, Qualifier};
pub use sparql::SparqlUpdate;

//! Repository transport for the DCR access layer.
//!
//! All traffic to the remote repository flows through the [`Transport`]
//! trait. Backends:
//!
//! - [`HttpTransport`] -- `reqwest`-based client for a live server
//! - [`InMemoryRepository`] -- server emulation for tests and embedding
//!
//! [`RepositoryClient`] sits on top of any transport and speaks the
//! repository protocol: metadata fetches, existence checks, resource
//! creation and incremental updates. It translates HTTP status codes into
//! the [`RepositoryError`](dcr_types::RepositoryError) taxonomy so that no
//! caller ever sees a raw status.

pub mod client;
pub mod http;
pub mod memory;
pub mod retry;
pub mod transport;

pub use client::{MetadataResponse, RepositoryClient};
pub use http::{HttpConfig, HttpTransport};
pub use memory::InMemoryRepository;
pub use retry::RetryPolicy;
pub use transport::{headers, Method, RepoRequest, RepoResponse, Transport};

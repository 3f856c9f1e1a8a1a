//! # DCR SDK
//!
//! One handle over the whole access layer. A [`Repository`] is built from
//! a [`RepositoryConfig`] and owns the transport stack, the transaction
//! manager, the object cache, loader and factory.
//!
//! ```no_run
//! use dcr_sdk::{Repository, RepositoryConfig};
//!
//! # async fn example() -> dcr_sdk::SdkResult<()> {
//! let repo = Repository::connect(RepositoryConfig::load("dcr.toml")?)?;
//! let work = repo
//!     .run(|| async {
//!         let work = repo.factory().create_work(None, Some("Thesis")).await?;
//!         Ok(work)
//!     })
//!     .await?;
//! println!("created {}", work.pid());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod repository;

pub use config::RepositoryConfig;
pub use error::{SdkError, SdkResult};
pub use repository::Repository;

pub use dcr_client::{HttpConfig, InMemoryRepository, RetryPolicy};
pub use dcr_objects::{CacheConfig, RepositoryObject, ResourceType};
pub use dcr_txn::TransactionConfig;
pub use dcr_types::{Pid, Qualifier, RepositoryError, RepositoryResult};

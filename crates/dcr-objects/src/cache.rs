use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dcr_types::{Pid, RepositoryError, RepositoryResult};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tokio::time::Instant;

use crate::object::RepositoryObject;

/// Bounds for [`ObjectCache`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
    /// Entries older than this since they were written are reloaded.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 512,
            ttl_secs: 300,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Why the last load of a PID failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    TypeMismatch,
    NotFound,
    Unauthorized,
    ServerError,
}

impl FailureKind {
    fn of(error: &RepositoryError) -> Self {
        match error {
            RepositoryError::ObjectTypeMismatch { .. } => Self::TypeMismatch,
            RepositoryError::NotFound(_) => Self::NotFound,
            RepositoryError::AuthorizationFailure(_) => Self::Unauthorized,
            _ => Self::ServerError,
        }
    }
}

/// Materialization state of a PID as seen by the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
    Failed(FailureKind),
}

struct Entry {
    cell: Arc<OnceCell<Arc<RepositoryObject>>>,
    written: Instant,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<Pid, Entry>,
    failures: HashMap<Pid, FailureKind>,
}

/// Shared cache of materialized objects.
///
/// Concurrent loads of one PID are coalesced: the first caller runs the
/// fetch, the rest await its result. A failed load is not cached, so the
/// next caller fetches again. Refreshed objects replace the entry
/// wholesale; readers holding the old `Arc` keep a consistent view.
pub struct ObjectCache {
    config: CacheConfig,
    inner: Mutex<Inner>,
}

impl ObjectCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Return the cached object for `pid`, running `load` on a miss.
    pub async fn get_or_load<F, Fut>(&self, pid: &Pid, load: F) -> RepositoryResult<Arc<RepositoryObject>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RepositoryResult<RepositoryObject>>,
    {
        let cell = self.cell_for(pid);
        if let Some(object) = cell.get() {
            tracing::debug!(pid = %pid, "object cache hit");
            return Ok(object.clone());
        }

        let result = cell
            .get_or_try_init(|| async {
                tracing::debug!(pid = %pid, "object cache miss");
                load().await.map(Arc::new)
            })
            .await;

        let mut inner = self.lock();
        match result {
            Ok(object) => {
                inner.failures.remove(pid);
                Ok(object.clone())
            }
            Err(e) => {
                inner.failures.insert(pid.clone(), FailureKind::of(&e));
                // Waiters still holding the cell retry the load on it; only
                // the last one out drops the entry.
                let abandoned = inner.entries.get(pid).is_some_and(|entry| {
                    Arc::ptr_eq(&entry.cell, &cell)
                        && !cell.initialized()
                        && Arc::strong_count(&cell) == 2
                });
                if abandoned {
                    inner.entries.remove(pid);
                }
                Err(e)
            }
        }
    }

    /// Cached object if present and within TTL.
    pub fn peek(&self, pid: &Pid) -> Option<Arc<RepositoryObject>> {
        let inner = self.lock();
        inner
            .entries
            .get(pid)
            .filter(|entry| !self.expired(entry))
            .and_then(|entry| entry.cell.get().cloned())
    }

    /// Replace the entry for the object's PID.
    pub fn put(&self, object: Arc<RepositoryObject>) {
        let pid = object.pid().clone();
        let mut inner = self.lock();
        inner.failures.remove(&pid);
        inner.entries.remove(&pid);
        self.make_room(&mut inner);
        inner.entries.insert(
            pid,
            Entry {
                cell: Arc::new(OnceCell::new_with(Some(object))),
                written: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, pid: &Pid) {
        let mut inner = self.lock();
        if inner.entries.remove(pid).is_some() {
            tracing::debug!(pid = %pid, "object cache entry invalidated");
        }
        inner.failures.remove(pid);
    }

    pub fn invalidate_all(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.failures.clear();
    }

    pub fn load_state(&self, pid: &Pid) -> LoadState {
        let inner = self.lock();
        match inner.entries.get(pid) {
            Some(entry) if entry.cell.initialized() && !self.expired(entry) => LoadState::Loaded,
            Some(entry) if !entry.cell.initialized() => LoadState::Loading,
            _ => match inner.failures.get(pid) {
                Some(kind) => LoadState::Failed(*kind),
                None => LoadState::Unloaded,
            },
        }
    }

    /// Number of entries, including loads in flight.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("lock poisoned")
    }

    fn expired(&self, entry: &Entry) -> bool {
        entry.cell.initialized() && entry.written.elapsed() > self.config.ttl()
    }

    /// The cell to load through, replacing expired entries.
    fn cell_for(&self, pid: &Pid) -> Arc<OnceCell<Arc<RepositoryObject>>> {
        let mut inner = self.lock();
        if let Some(entry) = inner.entries.get(pid) {
            if !self.expired(entry) {
                return entry.cell.clone();
            }
            tracing::debug!(pid = %pid, "object cache entry expired");
            inner.entries.remove(pid);
        }
        self.make_room(&mut inner);
        let cell = Arc::new(OnceCell::new());
        inner.entries.insert(
            pid.clone(),
            Entry {
                cell: cell.clone(),
                written: Instant::now(),
            },
        );
        cell
    }

    /// Evict expired entries, then the oldest loaded ones, until one slot is free.
    fn make_room(&self, inner: &mut Inner) {
        if inner.entries.len() < self.config.max_entries {
            return;
        }
        inner.entries.retain(|_, entry| !self.expired(entry));
        while inner.entries.len() >= self.config.max_entries.max(1) {
            let oldest = inner
                .entries
                .iter()
                .filter(|(_, entry)| entry.cell.initialized())
                .min_by_key(|(_, entry)| entry.written)
                .map(|(pid, _)| pid.clone());
            match oldest {
                Some(pid) => {
                    inner.entries.remove(&pid);
                }
                None => break,
            }
        }
    }
}

impl Default for ObjectCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl std::fmt::Debug for ObjectCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectCache")
            .field("entries", &self.len())
            .field("max_entries", &self.config.max_entries)
            .field("ttl_secs", &self.config.ttl_secs)
            .finish()
    }
}

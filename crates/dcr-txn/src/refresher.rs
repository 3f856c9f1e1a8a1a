use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dcr_types::RepositoryResult;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Something whose lease can be renewed.
#[async_trait]
pub trait LeaseRenewer: Send + Sync {
    /// Identifier used in log output.
    fn lease_id(&self) -> &str;

    async fn renew(&self) -> RepositoryResult<()>;
}

/// Periodically renews a lease until stopped or the max TTL elapses.
///
/// The loop sleeps `interval`, then renews unless stopped. Renewal
/// failures are logged and the loop continues; cancellation and expiry
/// end it. Flags are atomics so both the owner and the worker task can
/// observe them.
pub struct TransactionRefresher {
    renewer: Arc<dyn LeaseRenewer>,
    interval: Duration,
    max_ttl: Duration,
    running: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    wake: Arc<Notify>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TransactionRefresher {
    pub fn new(renewer: Arc<dyn LeaseRenewer>, interval: Duration, max_ttl: Duration) -> Self {
        Self {
            renewer,
            interval,
            max_ttl,
            running: Arc::new(AtomicBool::new(false)),
            stopped: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the renewal task. Returns `false` if already running or stopped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        if self.stopped.load(Ordering::SeqCst) {
            tracing::warn!(lease = self.renewer.lease_id(), "refresher already stopped, not restarting");
            return false;
        }
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!(lease = self.renewer.lease_id(), "refresher already running");
            return false;
        }

        let renewer = Arc::clone(&self.renewer);
        let running = Arc::clone(&self.running);
        let stopped = Arc::clone(&self.stopped);
        let wake = Arc::clone(&self.wake);
        let interval = self.interval;
        let max_ttl = self.max_ttl;

        let handle = tokio::spawn(async move {
            let started = Instant::now();
            loop {
                tokio::select! {
                    _ = wake.notified() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                if stopped.load(Ordering::SeqCst) {
                    break;
                }
                if started.elapsed() > max_ttl {
                    tracing::warn!(
                        lease = renewer.lease_id(),
                        max_ttl_secs = max_ttl.as_secs(),
                        "lease exceeded maximum lifetime, no longer renewing"
                    );
                    break;
                }
                match renewer.renew().await {
                    Ok(()) => tracing::debug!(lease = renewer.lease_id(), "lease renewed"),
                    Err(e) if e.is_cancellation() => {
                        tracing::debug!(lease = renewer.lease_id(), "lease ended: {e}");
                        break;
                    }
                    Err(e) => tracing::warn!(lease = renewer.lease_id(), "lease renewal failed: {e}"),
                }
            }
            stopped.store(true, Ordering::SeqCst);
            running.store(false, Ordering::SeqCst);
        });
        *self.handle.lock().expect("lock poisoned") = Some(handle);
        true
    }

    /// Ask the loop to exit after its current sleep or renewal.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    /// Stop immediately, aborting an in-flight renewal.
    pub fn interrupt(&self) {
        self.stop();
        if let Some(handle) = self.handle.lock().expect("lock poisoned").take() {
            handle.abort();
        }
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl Drop for TransactionRefresher {
    fn drop(&mut self) {
        self.interrupt();
    }
}

impl std::fmt::Debug for TransactionRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionRefresher")
            .field("lease", &self.renewer.lease_id())
            .field("interval", &self.interval)
            .field("max_ttl", &self.max_ttl)
            .field("running", &self.is_running())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

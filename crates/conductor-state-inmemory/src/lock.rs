use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use conductor_core::{CancellationSignal, CoreError, DistributedLockProvider};

struct Lease {
    owner: Arc<str>,
    acquired_at: Instant,
    ttl: Option<Duration>,
}

impl Lease {
    fn is_expired(&self) -> bool {
        match self.ttl {
            Some(ttl) => self.acquired_at.elapsed() >= ttl,
            None => false,
        }
    }
}

/// Process-local lock provider
///
/// Acquisition never waits: a held lock returns `false` at once, whoever
/// holds it. With a lease TTL, a lock that was never released may be taken
/// over once it expires.
///
/// Every provider carries an owner token and only releases leases it owns.
/// [`InMemoryLockProvider::handle`] gives another owner (one per host) over
/// the same lock table; `Clone` keeps the owner.
#[derive(Clone)]
pub struct InMemoryLockProvider {
    leases: Arc<Mutex<HashMap<String, Lease>>>,
    lease_ttl: Option<Duration>,
    owner: Arc<str>,
}

impl Default for InMemoryLockProvider {
    fn default() -> Self {
        Self::with_lease_ttl(None)
    }
}

impl InMemoryLockProvider {
    /// Locks are held until released
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks may be taken over after `lease_ttl`
    pub fn with_lease_ttl(lease_ttl: Option<Duration>) -> Self {
        Self {
            leases: Arc::default(),
            lease_ttl,
            owner: new_owner(),
        }
    }

    /// A new owner sharing this lock table
    pub fn handle(&self) -> Self {
        Self {
            leases: self.leases.clone(),
            lease_ttl: self.lease_ttl,
            owner: new_owner(),
        }
    }

    /// Token identifying this owner
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Whether a live lease exists for the resource
    pub async fn is_locked(&self, resource_id: &str) -> bool {
        self.leases
            .lock()
            .await
            .get(resource_id)
            .is_some_and(|lease| !lease.is_expired())
    }
}

fn new_owner() -> Arc<str> {
    Arc::from(Uuid::new_v4().to_string())
}

#[async_trait]
impl DistributedLockProvider for InMemoryLockProvider {
    async fn start(&self) -> Result<(), CoreError> {
        info!(owner = %self.owner, lease_ttl = ?self.lease_ttl, "In-memory lock provider started");
        Ok(())
    }

    /// Leases stay in the shared table; other owners may still be using it
    async fn stop(&self) -> Result<(), CoreError> {
        let leases = self.leases.lock().await;
        let held = leases
            .values()
            .filter(|lease| lease.owner == self.owner && !lease.is_expired())
            .count();
        if held > 0 {
            warn!(owner = %self.owner, held, "Lock provider stopped while holding leases");
        }
        info!(owner = %self.owner, "In-memory lock provider stopped");
        Ok(())
    }

    async fn acquire(
        &self,
        resource_id: &str,
        cancellation: CancellationSignal,
    ) -> Result<bool, CoreError> {
        if cancellation.is_cancelled() {
            debug!(resource_id, "Lock acquisition cancelled");
            return Ok(false);
        }

        let mut leases = self.leases.lock().await;
        if let Some(lease) = leases.get(resource_id) {
            if !lease.is_expired() {
                return Ok(false);
            }
            warn!(resource_id, previous_owner = %lease.owner, "Taking over expired lock lease");
        }

        leases.insert(
            resource_id.to_string(),
            Lease {
                owner: self.owner.clone(),
                acquired_at: Instant::now(),
                ttl: self.lease_ttl,
            },
        );
        debug!(resource_id, owner = %self.owner, "Lock acquired");
        Ok(true)
    }

    async fn release(&self, resource_id: &str) -> Result<(), CoreError> {
        let mut leases = self.leases.lock().await;
        match leases.get(resource_id) {
            Some(lease) if lease.owner == self.owner => {
                leases.remove(resource_id);
            }
            Some(lease) => {
                warn!(
                    resource_id,
                    owner = %self.owner,
                    holder = %lease.owner,
                    "Ignoring release of a lock held by another owner"
                );
            }
            None => debug!(resource_id, "Released a lock that was not held"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::watch;

    #[tokio::test]
    async fn test_lock_is_exclusive_until_released() -> Result<(), CoreError> {
        let lock = InMemoryLockProvider::new();

        assert!(lock.acquire("wf-1", CancellationSignal::never()).await?);
        assert!(!lock.acquire("wf-1", CancellationSignal::never()).await?);
        assert!(lock.acquire("wf-2", CancellationSignal::never()).await?);

        lock.release("wf-1").await?;
        assert!(!lock.is_locked("wf-1").await);
        assert!(lock.acquire("wf-1", CancellationSignal::never()).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_handles_share_table_but_not_ownership() -> Result<(), CoreError> {
        let first = InMemoryLockProvider::new();
        let second = first.handle();
        assert_ne!(first.owner(), second.owner());
        assert_eq!(first.clone().owner(), first.owner());

        assert!(first.acquire("wf-1", CancellationSignal::never()).await?);
        assert!(!second.acquire("wf-1", CancellationSignal::never()).await?);

        second.release("wf-1").await?;
        assert!(first.is_locked("wf-1").await);
        Ok(())
    }

    #[tokio::test]
    async fn test_expired_lease_can_be_taken_over() -> Result<(), CoreError> {
        let lock = InMemoryLockProvider::with_lease_ttl(Some(Duration::from_millis(20)));

        assert!(lock.acquire("wf-1", CancellationSignal::never()).await?);
        assert!(!lock.acquire("wf-1", CancellationSignal::never()).await?);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!lock.is_locked("wf-1").await);
        assert!(lock.acquire("wf-1", CancellationSignal::never()).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_late_release_does_not_free_new_holders_lease() -> Result<(), CoreError> {
        let expired_holder = InMemoryLockProvider::with_lease_ttl(Some(Duration::from_millis(20)));
        let new_holder = expired_holder.handle();
        let latecomer = expired_holder.handle();

        assert!(expired_holder.acquire("wf", CancellationSignal::never()).await?);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(new_holder.acquire("wf", CancellationSignal::never()).await?);

        expired_holder.release("wf").await?;

        assert!(new_holder.is_locked("wf").await);
        assert!(!latecomer.acquire("wf", CancellationSignal::never()).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_acquire_is_refused() -> Result<(), CoreError> {
        let lock = InMemoryLockProvider::new();
        let (tx, rx) = watch::channel(false);
        tx.send_replace(true);

        assert!(!lock.acquire("wf-1", CancellationSignal::new(rx)).await?);
        assert!(!lock.is_locked("wf-1").await);
        Ok(())
    }

    #[tokio::test]
    async fn test_stop_keeps_shared_leases() -> Result<(), CoreError> {
        let holder = InMemoryLockProvider::new();
        let stopping = holder.handle();

        holder.acquire("wf-1", CancellationSignal::never()).await?;
        stopping.stop().await?;
        holder.stop().await?;

        assert!(holder.is_locked("wf-1").await);
        assert!(!stopping.acquire("wf-1", CancellationSignal::never()).await?);
        Ok(())
    }
}

//! In-memory providers for the Conductor workflow host
//!
//! This crate implements the persistence, queue and distributed lock
//! contracts defined in conductor-core without any external service. It is
//! meant for development, tests and single-process deployments; nothing
//! survives a restart.

use std::sync::Arc;

use conductor_core::{CoreError, HostOptions, WorkflowHost, WorkflowHostBuilder};

pub mod lock;
pub mod persistence;
pub mod queue;

pub use lock::InMemoryLockProvider;
pub use persistence::InMemoryPersistenceProvider;
pub use queue::InMemoryQueueProvider;

/// One set of shared in-memory backends
///
/// Every host built from the same bundle (or a clone of it) sees the same
/// instances, queues and lock table, which is how several hosts share a
/// cluster. Each host gets its own lock owner.
#[derive(Clone)]
pub struct InMemoryProviders {
    /// Instance and event store
    pub persistence: InMemoryPersistenceProvider,
    /// Work queues
    pub queue: InMemoryQueueProvider,
    /// Instance locks; hosts get their own [`InMemoryLockProvider::handle`]
    pub lock: InMemoryLockProvider,
    options: HostOptions,
}

impl InMemoryProviders {
    /// Create fresh backends; the lock lease comes from `options`
    pub fn new(options: HostOptions) -> Self {
        Self {
            persistence: InMemoryPersistenceProvider::new(),
            queue: InMemoryQueueProvider::new(),
            lock: InMemoryLockProvider::with_lease_ttl(options.lock_lease_ttl()),
            options,
        }
    }

    /// A host builder wired to these backends
    pub fn host_builder(&self) -> WorkflowHostBuilder {
        WorkflowHost::builder(
            Arc::new(self.persistence.clone()),
            Arc::new(self.queue.clone()),
            Arc::new(self.lock.handle()),
        )
        .options(self.options.clone())
    }

    /// A host with no background tasks
    pub fn build_host(&self) -> Result<WorkflowHost, CoreError> {
        self.host_builder().build()
    }
}

impl Default for InMemoryProviders {
    fn default() -> Self {
        Self::new(HostOptions::default())
    }
}

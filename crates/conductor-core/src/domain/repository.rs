//! Provider traits for the Conductor host
//!
//! This module defines the contracts the host consumes. External crates
//! implement these traits to provide different persistence, queueing and
//! locking backends; several host processes may share one set of backends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

use super::event::{Event, EventId};
use super::workflow_definition::WorkflowDefinition;
use super::workflow_instance::{WorkflowInstance, WorkflowInstanceId};
use crate::CoreError;

/// Kind of id carried by a work token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueType {
    /// Token carries a workflow instance id
    Workflow,
    /// Token carries an event id
    Event,
}

impl fmt::Display for QueueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueType::Workflow => f.write_str("workflow"),
            QueueType::Event => f.write_str("event"),
        }
    }
}

/// Signal handed to lock acquisition so a blocking backend can give up early
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    rx: watch::Receiver<bool>,
}

impl CancellationSignal {
    /// Wrap a watch receiver; `true` means cancelled
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// A signal that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until cancellation is requested.
    ///
    /// Pends forever once the sending side is gone without having cancelled.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Durable store for workflow instances and events
#[async_trait]
pub trait PersistenceProvider: Send + Sync {
    /// Create the backing store if it does not exist yet
    async fn ensure_store_exists(&self) -> Result<(), CoreError>;

    /// Store a new instance and return its assigned id
    async fn create_instance(
        &self,
        instance: &WorkflowInstance,
    ) -> Result<WorkflowInstanceId, CoreError>;

    /// Load an instance by id
    async fn get_instance(&self, id: &WorkflowInstanceId) -> Result<WorkflowInstance, CoreError>;

    /// Replace a stored instance
    async fn persist_instance(&self, instance: &WorkflowInstance) -> Result<(), CoreError>;

    /// Store a new event and return its assigned id
    async fn create_event(&self, event: &Event) -> Result<EventId, CoreError>;

    /// Load an event by id
    async fn get_event(&self, id: &EventId) -> Result<Event, CoreError>;

    /// Flag an event as consumed by the execution engine
    async fn mark_event_processed(&self, id: &EventId) -> Result<(), CoreError>;
}

/// At-least-once queue of work tokens
#[async_trait]
pub trait QueueProvider: Send + Sync {
    /// Start the provider
    async fn start(&self) -> Result<(), CoreError>;

    /// Stop the provider
    async fn stop(&self) -> Result<(), CoreError>;

    /// Place a token on the queue for the given kind
    async fn enqueue(&self, id: &str, queue: QueueType) -> Result<(), CoreError>;

    /// Take the next token of the given kind, if any
    async fn dequeue(&self, queue: QueueType) -> Result<Option<String>, CoreError>;
}

/// Mutual exclusion keyed by resource id, shared by many host processes
#[async_trait]
pub trait DistributedLockProvider: Send + Sync {
    /// Start the provider
    async fn start(&self) -> Result<(), CoreError>;

    /// Stop the provider
    async fn stop(&self) -> Result<(), CoreError>;

    /// Try to take the lock. `Ok(false)` means someone else holds it.
    async fn acquire(
        &self,
        resource_id: &str,
        cancellation: CancellationSignal,
    ) -> Result<bool, CoreError>;

    /// Give the lock back
    async fn release(&self, resource_id: &str) -> Result<(), CoreError>;
}

/// Resolves workflow ids and versions to definitions
#[async_trait]
pub trait WorkflowRegistry: Send + Sync {
    /// Find a definition; `None` version means the latest
    async fn get_definition(
        &self,
        id: &str,
        version: Option<u32>,
    ) -> Result<Option<Arc<WorkflowDefinition>>, CoreError>;

    /// Register a definition
    async fn register(&self, definition: WorkflowDefinition) -> Result<(), CoreError>;

    /// Whether a definition is registered
    async fn is_registered(&self, id: &str, version: Option<u32>) -> Result<bool, CoreError> {
        Ok(self.get_definition(id, version).await?.is_some())
    }
}

/// A long-running loop the host starts and stops with itself
#[async_trait]
pub trait BackgroundTask: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Start the loop
    async fn start(&self) -> Result<(), CoreError>;

    /// Stop the loop and wait for it to finish
    async fn stop(&self) -> Result<(), CoreError>;
}

/// Seam to the execution engine: consumes dequeued work tokens
#[async_trait]
pub trait WorkItemHandler: Send + Sync {
    /// Process one token
    async fn handle(&self, queue: QueueType, id: &str) -> Result<(), CoreError>;
}

//!
//! Conductor Core - orchestration coordinator for the Conductor workflow host
//!
//! This crate defines the workflow domain model, the provider contracts
//! (persistence, queue, distributed lock) and the [`WorkflowHost`] that
//! applies lifecycle transitions on top of them. Execution of steps is left
//! to a separate engine consuming the queues.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - workflow models and provider interfaces
pub mod domain;

/// Application services - the host and its collaborators
pub mod application;

/// Host configuration
pub mod options;

/// Error types
pub mod error;

pub use error::CoreError;
pub use options::HostOptions;

pub use application::queue_poller::QueuePoller;
pub use application::step_errors::{StepError, StepErrorObserver};
pub use application::workflow_host::{HostState, WorkflowHost, WorkflowHostBuilder};
pub use application::workflow_registry::DefinitionRegistry;

pub use domain::event::{Event, EventId};
pub use domain::events::{LifecycleEvent, LifecycleEventHandler};
pub use domain::repository::{
    BackgroundTask, CancellationSignal, DistributedLockProvider, PersistenceProvider,
    QueueProvider, QueueType, WorkItemHandler, WorkflowRegistry,
};
pub use domain::workflow_definition::{StepDefinition, StepId, WorkflowDefinition, WorkflowTemplate};
pub use domain::workflow_instance::{
    ExecutionPointer, TransitionOutcome, WorkflowInstance, WorkflowInstanceId, WorkflowStatus,
};

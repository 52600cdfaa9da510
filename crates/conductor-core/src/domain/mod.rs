/// Workflow definition domain models
pub mod workflow_definition;

/// Workflow instance domain models
pub mod workflow_instance;

/// Published external events
pub mod event;

/// Lifecycle events announced by the host
pub mod events;

/// Provider interfaces
pub mod repository;

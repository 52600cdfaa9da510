/// The orchestration coordinator
pub mod workflow_host;

/// In-process definition registry
pub mod workflow_registry;

/// Step failure fan-out
pub mod step_errors;

/// Queue polling background task
pub mod queue_poller;

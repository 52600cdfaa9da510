use crate::domain::workflow_definition::{StepId, WorkflowDefinition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Workflow instance status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowStatus {
    /// Instance is eligible for execution
    Runnable,

    /// Instance is paused until resumed
    Suspended,

    /// Instance was forcibly ended
    Terminated,

    /// Instance ran to completion. Only the execution engine sets this.
    Complete,
}

/// Value object: Workflow Instance ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkflowInstanceId(pub String);

impl WorkflowInstanceId {
    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkflowInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkflowInstanceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A cursor marking one position within an instance's steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPointer {
    /// Unique identifier
    pub id: String,

    /// Step this pointer refers to
    pub step_id: StepId,

    /// Name of the referenced step
    pub step_name: String,

    /// Whether the pointer is still pending execution
    pub active: bool,

    /// When the engine started executing the step
    pub start_time: Option<DateTime<Utc>>,
}

impl ExecutionPointer {
    /// Create a new active pointer at the given step
    pub fn new(step_id: StepId, step_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            step_id,
            step_name: step_name.into(),
            active: true,
            start_time: None,
        }
    }
}

/// Aggregate: Workflow instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    /// Unique identifier, assigned by the persistence provider on creation
    pub id: Option<WorkflowInstanceId>,

    /// Definition ID, pinned at creation
    pub workflow_definition_id: String,

    /// Definition version, pinned at creation
    pub version: u32,

    /// Description copied from the definition
    pub description: Option<String>,

    /// User data, opaque to the host
    pub data: Option<Value>,

    /// Current status
    pub status: WorkflowStatus,

    /// Creation timestamp
    pub create_time: DateTime<Utc>,

    /// When the instance reached a terminal status
    pub complete_time: Option<DateTime<Utc>>,

    /// Earliest time the engine should next pick the instance up
    pub next_execution: Option<DateTime<Utc>>,

    /// Execution pointers, in creation order
    pub execution_pointers: Vec<ExecutionPointer>,
}

/// Result of a lock-guarded status transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The new status was persisted
    Applied,

    /// The instance lock could not be obtained; try again later
    LockUnavailable,

    /// The current status does not allow the transition
    InvalidState {
        /// Status found under the lock
        current: WorkflowStatus,
    },
}

impl TransitionOutcome {
    /// Whether the transition was applied
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied)
    }
}

impl WorkflowInstance {
    /// Create a new runnable instance of a definition
    ///
    /// The instance gets exactly one active pointer at the initial step. When
    /// `data` is `None` the definition's default-data factory is used, if any.
    pub fn new(definition: &WorkflowDefinition, data: Option<Value>) -> Self {
        let step_name = definition
            .initial_step()
            .map(|s| s.name.clone())
            .unwrap_or_default();

        Self {
            id: None,
            workflow_definition_id: definition.id.clone(),
            version: definition.version,
            description: definition.description.clone(),
            data: data.or_else(|| definition.default_data()),
            status: WorkflowStatus::Runnable,
            create_time: Utc::now(),
            complete_time: None,
            next_execution: None,
            execution_pointers: vec![ExecutionPointer::new(StepId::INITIAL, step_name)],
        }
    }

    /// Active execution pointers
    pub fn active_pointers(&self) -> impl Iterator<Item = &ExecutionPointer> {
        self.execution_pointers.iter().filter(|p| p.active)
    }

    /// Runnable -> Suspended
    pub fn suspend(&mut self) -> TransitionOutcome {
        if self.status != WorkflowStatus::Runnable {
            return TransitionOutcome::InvalidState {
                current: self.status,
            };
        }

        self.status = WorkflowStatus::Suspended;
        TransitionOutcome::Applied
    }

    /// Suspended -> Runnable
    pub fn resume(&mut self) -> TransitionOutcome {
        if self.status != WorkflowStatus::Suspended {
            return TransitionOutcome::InvalidState {
                current: self.status,
            };
        }

        self.status = WorkflowStatus::Runnable;
        TransitionOutcome::Applied
    }

    /// Any -> Terminated. Termination is never blocked by the current status.
    pub fn terminate(&mut self) -> TransitionOutcome {
        self.status = WorkflowStatus::Terminated;
        self.complete_time = Some(Utc::now());
        TransitionOutcome::Applied
    }
}

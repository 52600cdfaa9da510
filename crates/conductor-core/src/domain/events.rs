use crate::domain::event::EventId;
use crate::domain::workflow_instance::WorkflowInstanceId;
use crate::CoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;

/// Lifecycle event trait for everything the host announces
pub trait LifecycleEvent: Debug + Send + Sync {
    /// Returns the type of the event as a string
    fn event_type(&self) -> &'static str;

    /// Returns the workflow instance ID this event is associated with, if any
    fn workflow_instance_id(&self) -> Option<&WorkflowInstanceId>;

    /// Returns the timestamp when the event occurred
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Receives lifecycle events from the host
#[async_trait]
pub trait LifecycleEventHandler: Send + Sync {
    /// Handle a lifecycle event
    async fn handle_event(&self, event: Box<dyn LifecycleEvent>) -> Result<(), CoreError>;
}

/// Event: Workflow instance started
#[derive(Debug)]
pub struct WorkflowStarted {
    /// The unique identifier of the workflow instance
    pub workflow_instance_id: WorkflowInstanceId,

    /// The identifier of the workflow definition
    pub workflow_definition_id: String,

    /// The pinned definition version
    pub version: u32,

    /// The timestamp when the instance was created
    pub timestamp: DateTime<Utc>,
}

impl LifecycleEvent for WorkflowStarted {
    fn event_type(&self) -> &'static str {
        "workflow.started"
    }

    fn workflow_instance_id(&self) -> Option<&WorkflowInstanceId> {
        Some(&self.workflow_instance_id)
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: Workflow instance suspended
#[derive(Debug)]
pub struct WorkflowSuspended {
    /// The unique identifier of the workflow instance
    pub workflow_instance_id: WorkflowInstanceId,
    /// The timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

impl LifecycleEvent for WorkflowSuspended {
    fn event_type(&self) -> &'static str {
        "workflow.suspended"
    }

    fn workflow_instance_id(&self) -> Option<&WorkflowInstanceId> {
        Some(&self.workflow_instance_id)
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: Workflow instance resumed
#[derive(Debug)]
pub struct WorkflowResumed {
    /// The unique identifier of the workflow instance
    pub workflow_instance_id: WorkflowInstanceId,
    /// The timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

impl LifecycleEvent for WorkflowResumed {
    fn event_type(&self) -> &'static str {
        "workflow.resumed"
    }

    fn workflow_instance_id(&self) -> Option<&WorkflowInstanceId> {
        Some(&self.workflow_instance_id)
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: Workflow instance terminated
#[derive(Debug)]
pub struct WorkflowTerminated {
    /// The unique identifier of the workflow instance
    pub workflow_instance_id: WorkflowInstanceId,
    /// The timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

impl LifecycleEvent for WorkflowTerminated {
    fn event_type(&self) -> &'static str {
        "workflow.terminated"
    }

    fn workflow_instance_id(&self) -> Option<&WorkflowInstanceId> {
        Some(&self.workflow_instance_id)
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: External event published
#[derive(Debug)]
pub struct EventPublished {
    /// The stored event id
    pub event_id: EventId,
    /// Event name
    pub event_name: String,
    /// Correlation key
    pub event_key: String,
    /// The timestamp when the event was published
    pub timestamp: DateTime<Utc>,
}

impl LifecycleEvent for EventPublished {
    fn event_type(&self) -> &'static str {
        "event.published"
    }

    fn workflow_instance_id(&self) -> Option<&WorkflowInstanceId> {
        None
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

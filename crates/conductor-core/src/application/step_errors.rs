//! Step-failure notifications
//!
//! The execution engine reports failed steps through the host; the host fans
//! each report out to every subscribed observer and takes no action itself.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, warn};

use crate::domain::workflow_definition::StepId;
use crate::domain::workflow_instance::WorkflowInstanceId;
use crate::CoreError;

/// A step failure reported by the execution engine
#[derive(Debug, Clone, PartialEq)]
pub struct StepError {
    /// Instance the step belongs to
    pub workflow_instance_id: WorkflowInstanceId,
    /// Failed step
    pub step_id: StepId,
    /// Error description
    pub error: String,
    /// When the failure was reported
    pub timestamp: DateTime<Utc>,
}

/// Receives step failure reports
pub trait StepErrorObserver: Send + Sync {
    /// Called once per report, in subscription order
    fn on_step_error(&self, error: &StepError) -> Result<(), CoreError>;
}

impl<F> StepErrorObserver for F
where
    F: Fn(&StepError) -> Result<(), CoreError> + Send + Sync,
{
    fn on_step_error(&self, error: &StepError) -> Result<(), CoreError> {
        self(error)
    }
}

/// Ordered list of subscribed observers
#[derive(Default)]
pub(crate) struct StepErrorObservers {
    observers: RwLock<Vec<Arc<dyn StepErrorObserver>>>,
}

impl StepErrorObservers {
    pub(crate) async fn subscribe(&self, observer: Arc<dyn StepErrorObserver>) {
        self.observers.write().await.push(observer);
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.observers.read().await.len()
    }

    /// Deliver to every observer; a failing observer does not stop the rest
    pub(crate) async fn notify(&self, step_error: &StepError) {
        let observers = self.observers.read().await.clone();
        if observers.is_empty() {
            warn!(
                workflow_instance_id = %step_error.workflow_instance_id,
                step_id = %step_error.step_id,
                error = %step_error.error,
                "Step error reported with no observers"
            );
            return;
        }

        for observer in observers {
            if let Err(e) = observer.on_step_error(step_error) {
                error!(
                    workflow_instance_id = %step_error.workflow_instance_id,
                    step_id = %step_error.step_id,
                    error = %e,
                    "Step error observer failed"
                );
            }
        }
    }
}

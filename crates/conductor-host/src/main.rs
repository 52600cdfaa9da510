use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use conductor_core::{
    CoreError, EventId, HostOptions, PersistenceProvider, QueueType, StepError, WorkItemHandler,
    WorkflowDefinition, WorkflowInstanceId, WorkflowTemplate,
};
use conductor_state_inmemory::{InMemoryPersistenceProvider, InMemoryProviders};

/// Sample workflow registered on boot
#[derive(Default)]
struct OrderWorkflow;

impl WorkflowTemplate for OrderWorkflow {
    fn build(&self) -> WorkflowDefinition {
        WorkflowDefinition::new("order", 1)
            .with_description("Receive, charge and ship an order")
            .with_step(0, "receive")
            .with_step(1, "charge")
            .with_step(2, "ship")
            .with_default_data(|| json!({ "items": [], "total": 0 }))
    }
}

/// Stands in for the execution engine: logs each token it is handed
struct LoggingHandler {
    persistence: InMemoryPersistenceProvider,
}

#[async_trait]
impl WorkItemHandler for LoggingHandler {
    async fn handle(&self, queue: QueueType, id: &str) -> Result<(), CoreError> {
        match queue {
            QueueType::Workflow => {
                let instance = self
                    .persistence
                    .get_instance(&WorkflowInstanceId::from(id))
                    .await?;
                info!(
                    workflow_instance_id = id,
                    workflow = %instance.workflow_definition_id,
                    status = ?instance.status,
                    "Workflow token received"
                );
            }
            QueueType::Event => {
                let event_id = EventId(id.to_string());
                let event = self.persistence.get_event(&event_id).await?;
                info!(
                    event_id = id,
                    event_name = %event.event_name,
                    event_key = %event.event_key,
                    "Event token received"
                );
                self.persistence.mark_event_processed(&event_id).await?;
            }
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let options = HostOptions::load().context("Failed to load host options")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&options.log_filter)),
        )
        .init();

    let providers = InMemoryProviders::new(options);
    let handler = Arc::new(LoggingHandler {
        persistence: providers.persistence.clone(),
    });

    let host = providers
        .host_builder()
        .work_item_handler(QueueType::Workflow, handler.clone())
        .work_item_handler(QueueType::Event, handler)
        .build()
        .context("Failed to build workflow host")?;

    host.register_workflow::<OrderWorkflow>()
        .await
        .context("Failed to register workflows")?;
    host.on_step_error(Arc::new(|e: &StepError| -> Result<(), CoreError> {
        error!(
            workflow_instance_id = %e.workflow_instance_id,
            step_id = %e.step_id,
            error = %e.error,
            "Step failed"
        );
        Ok(())
    }))
    .await;

    host.start().await.context("Failed to start workflow host")?;

    let id = host
        .start_workflow("order", None, None)
        .await
        .context("Failed to start sample workflow")?;
    host.publish_event("order.received", id.as_str(), None, None::<DateTime<Utc>>)
        .await
        .context("Failed to publish sample event")?;

    info!("Workflow host running; press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    host.shutdown().await.context("Workflow host did not stop cleanly")?;
    Ok(())
}

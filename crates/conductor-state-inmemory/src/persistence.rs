use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use conductor_core::{
    CoreError, Event, EventId, PersistenceProvider, WorkflowInstance, WorkflowInstanceId,
};

/// In-memory implementation of the PersistenceProvider
///
/// Clones share the same storage, so several hosts can be pointed at one store.
#[derive(Clone, Default)]
pub struct InMemoryPersistenceProvider {
    instances: Arc<RwLock<HashMap<String, WorkflowInstance>>>,
    events: Arc<RwLock<HashMap<String, Event>>>,
}

impl InMemoryPersistenceProvider {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored instances
    pub async fn instance_count(&self) -> usize {
        self.instances.read().await.len()
    }

    /// Every stored event, oldest effective time first
    pub async fn list_events(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self.events.read().await.values().cloned().collect();
        events.sort_by_key(|e| e.event_time);
        events
    }
}

#[async_trait]
impl PersistenceProvider for InMemoryPersistenceProvider {
    async fn ensure_store_exists(&self) -> Result<(), CoreError> {
        Ok(())
    }

    async fn create_instance(
        &self,
        instance: &WorkflowInstance,
    ) -> Result<WorkflowInstanceId, CoreError> {
        let id = WorkflowInstanceId::generate();
        let mut stored = instance.clone();
        stored.id = Some(id.clone());

        self.instances.write().await.insert(id.0.clone(), stored);
        debug!(workflow_instance_id = %id, "Stored workflow instance");
        Ok(id)
    }

    async fn get_instance(&self, id: &WorkflowInstanceId) -> Result<WorkflowInstance, CoreError> {
        self.instances
            .read()
            .await
            .get(&id.0)
            .cloned()
            .ok_or_else(|| CoreError::InstanceNotFound(id.0.clone()))
    }

    async fn persist_instance(&self, instance: &WorkflowInstance) -> Result<(), CoreError> {
        let id = instance.id.as_ref().ok_or_else(|| {
            CoreError::PersistenceError("Cannot persist an instance without an id".to_string())
        })?;

        let mut instances = self.instances.write().await;
        let slot = instances
            .get_mut(&id.0)
            .ok_or_else(|| CoreError::InstanceNotFound(id.0.clone()))?;
        *slot = instance.clone();

        debug!(workflow_instance_id = %id, status = ?instance.status, "Persisted workflow instance");
        Ok(())
    }

    async fn create_event(&self, event: &Event) -> Result<EventId, CoreError> {
        let id = EventId(Uuid::new_v4().to_string());
        let mut stored = event.clone();
        stored.id = Some(id.clone());

        self.events.write().await.insert(id.0.clone(), stored);
        debug!(event_id = %id, event_name = %event.event_name, "Stored event");
        Ok(id)
    }

    async fn get_event(&self, id: &EventId) -> Result<Event, CoreError> {
        self.events
            .read()
            .await
            .get(&id.0)
            .cloned()
            .ok_or_else(|| CoreError::EventNotFound(id.0.clone()))
    }

    async fn mark_event_processed(&self, id: &EventId) -> Result<(), CoreError> {
        let mut events = self.events.write().await;
        let event = events
            .get_mut(&id.0)
            .ok_or_else(|| CoreError::EventNotFound(id.0.clone()))?;
        event.is_processed = true;
        Ok(())
    }
}

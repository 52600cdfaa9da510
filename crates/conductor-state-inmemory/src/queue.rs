use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use conductor_core::{CoreError, QueueProvider, QueueType};

/// In-memory FIFO queues, one per queue type
///
/// Clones share the same queues.
#[derive(Clone, Default)]
pub struct InMemoryQueueProvider {
    queues: Arc<Mutex<HashMap<QueueType, VecDeque<String>>>>,
}

impl InMemoryQueueProvider {
    /// Create empty queues
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tokens waiting on a queue
    pub async fn len(&self, queue: QueueType) -> usize {
        self.queues
            .lock()
            .await
            .get(&queue)
            .map_or(0, VecDeque::len)
    }

    /// Whether a queue has nothing waiting
    pub async fn is_empty(&self, queue: QueueType) -> bool {
        self.len(queue).await == 0
    }
}

#[async_trait]
impl QueueProvider for InMemoryQueueProvider {
    async fn start(&self) -> Result<(), CoreError> {
        info!("In-memory queue provider started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), CoreError> {
        info!("In-memory queue provider stopped");
        Ok(())
    }

    async fn enqueue(&self, id: &str, queue: QueueType) -> Result<(), CoreError> {
        self.queues
            .lock()
            .await
            .entry(queue)
            .or_default()
            .push_back(id.to_string());
        debug!(%queue, id, "Enqueued work item");
        Ok(())
    }

    async fn dequeue(&self, queue: QueueType) -> Result<Option<String>, CoreError> {
        Ok(self
            .queues
            .lock()
            .await
            .get_mut(&queue)
            .and_then(VecDeque::pop_front))
    }
}

//! Background task draining one queue into a work item handler.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info};

use crate::domain::repository::{BackgroundTask, QueueProvider, QueueType, WorkItemHandler};
use crate::CoreError;

struct RunningLoop {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Polls a [`QueueProvider`] for one [`QueueType`] and hands each token to a
/// [`WorkItemHandler`].
///
/// Every tick drains the queue until it is empty or shutdown is signalled.
/// Handler failures are logged and the token is not re-queued.
pub struct QueuePoller {
    name: String,
    queue: Arc<dyn QueueProvider>,
    queue_type: QueueType,
    handler: Arc<dyn WorkItemHandler>,
    poll_interval: Duration,
    running: Mutex<Option<RunningLoop>>,
}

impl QueuePoller {
    /// Create a poller; it does nothing until started
    pub fn new(
        queue: Arc<dyn QueueProvider>,
        queue_type: QueueType,
        handler: Arc<dyn WorkItemHandler>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            name: format!("{}-queue-poller", queue_type),
            queue,
            queue_type,
            handler,
            poll_interval,
            running: Mutex::new(None),
        }
    }

    /// Whether the loop is currently running
    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }
}

#[async_trait]
impl BackgroundTask for QueuePoller {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<(), CoreError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(());
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(
            self.name.clone(),
            self.queue.clone(),
            self.queue_type,
            self.handler.clone(),
            self.poll_interval,
            shutdown_rx,
        ));

        *running = Some(RunningLoop {
            shutdown_tx,
            handle,
        });
        Ok(())
    }

    async fn stop(&self) -> Result<(), CoreError> {
        let Some(running) = self.running.lock().await.take() else {
            return Ok(());
        };

        let _ = running.shutdown_tx.send(true);
        running
            .handle
            .await
            .map_err(|e| CoreError::Other(format!("{} did not stop cleanly: {}", self.name, e)))
    }
}

async fn run_loop(
    name: String,
    queue: Arc<dyn QueueProvider>,
    queue_type: QueueType,
    handler: Arc<dyn WorkItemHandler>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    info!(poller = %name, "Queue poller started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                drain(&name, queue.as_ref(), queue_type, handler.as_ref(), &shutdown).await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!(poller = %name, "Queue poller stopped");
}

async fn drain(
    name: &str,
    queue: &dyn QueueProvider,
    queue_type: QueueType,
    handler: &dyn WorkItemHandler,
    shutdown: &watch::Receiver<bool>,
) {
    while !*shutdown.borrow() {
        let id = match queue.dequeue(queue_type).await {
            Ok(Some(id)) => id,
            Ok(None) => return,
            Err(e) => {
                error!(poller = %name, error = %e, "Error dequeuing work");
                return;
            }
        };

        debug!(poller = %name, %queue_type, id = %id, "Dispatching work item");
        if let Err(e) = handler.handle(queue_type, &id).await {
            error!(poller = %name, id = %id, error = %e, "Work item handler failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct VecQueue {
        items: StdMutex<VecDeque<(String, QueueType)>>,
    }

    #[async_trait]
    impl QueueProvider for VecQueue {
        async fn start(&self) -> Result<(), CoreError> {
            Ok(())
        }

        async fn stop(&self) -> Result<(), CoreError> {
            Ok(())
        }

        async fn enqueue(&self, id: &str, queue: QueueType) -> Result<(), CoreError> {
            self.items.lock().unwrap().push_back((id.to_string(), queue));
            Ok(())
        }

        async fn dequeue(&self, queue: QueueType) -> Result<Option<String>, CoreError> {
            let mut items = self.items.lock().unwrap();
            let pos = items.iter().position(|(_, q)| *q == queue);
            Ok(pos.and_then(|p| items.remove(p)).map(|(id, _)| id))
        }
    }

    #[derive(Default)]
    struct RecordingHandler {
        seen: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl WorkItemHandler for RecordingHandler {
        async fn handle(&self, _queue: QueueType, id: &str) -> Result<(), CoreError> {
            self.seen.lock().unwrap().push(id.to_string());
            if id == "bad" {
                return Err(CoreError::Other("cannot process".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_poller_dispatches_only_its_queue_type() {
        let queue = Arc::new(VecQueue::default());
        let handler = Arc::new(RecordingHandler::default());

        queue.enqueue("wf-1", QueueType::Workflow).await.unwrap();
        queue.enqueue("ev-1", QueueType::Event).await.unwrap();
        queue.enqueue("bad", QueueType::Workflow).await.unwrap();
        queue.enqueue("wf-2", QueueType::Workflow).await.unwrap();

        let poller = QueuePoller::new(
            queue.clone(),
            QueueType::Workflow,
            handler.clone(),
            Duration::from_millis(5),
        );
        assert_eq!(poller.name(), "workflow-queue-poller");

        poller.start().await.unwrap();
        assert!(poller.is_running().await);

        for _ in 0..100 {
            if handler.seen.lock().unwrap().len() == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        poller.stop().await.unwrap();
        assert!(!poller.is_running().await);

        assert_eq!(
            *handler.seen.lock().unwrap(),
            vec!["wf-1".to_string(), "bad".to_string(), "wf-2".to_string()]
        );
        assert_eq!(
            queue.dequeue(QueueType::Event).await.unwrap(),
            Some("ev-1".to_string())
        );
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let poller = QueuePoller::new(
            Arc::new(VecQueue::default()),
            QueueType::Event,
            Arc::new(RecordingHandler::default()),
            Duration::from_millis(5),
        );
        assert!(poller.stop().await.is_ok());
    }
}

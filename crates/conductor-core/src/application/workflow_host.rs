//! The orchestration coordinator.
//!
//! [`WorkflowHost`] owns instance lifecycle transitions. It creates instances,
//! applies status changes under the distributed lock, publishes events and
//! starts/stops the providers and background tasks it was built with.
//!
//! Host state is a `NotRunning -> Starting -> Running -> Stopping ->
//! NotRunning` machine behind a [`RwLock`]. Instantiation and publishing hold
//! the read guard for their whole duration, so `stop` (which needs the write
//! guard) waits for them and nothing new starts once shutdown has begun.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, warn};

use crate::application::queue_poller::QueuePoller;
use crate::application::step_errors::{StepError, StepErrorObserver, StepErrorObservers};
use crate::application::workflow_registry::DefinitionRegistry;
use crate::domain::event::{Event, EventId};
use crate::domain::events::{
    EventPublished, LifecycleEvent, LifecycleEventHandler, WorkflowResumed, WorkflowStarted,
    WorkflowSuspended, WorkflowTerminated,
};
use crate::domain::repository::{
    BackgroundTask, CancellationSignal, DistributedLockProvider, PersistenceProvider,
    QueueProvider, QueueType, WorkItemHandler, WorkflowRegistry,
};
use crate::domain::workflow_definition::{StepId, WorkflowDefinition, WorkflowTemplate};
use crate::domain::workflow_instance::{TransitionOutcome, WorkflowInstance, WorkflowInstanceId};
use crate::options::HostOptions;
use crate::CoreError;

/// Lifecycle state of a host process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    /// Not accepting requests
    NotRunning,
    /// Providers and background tasks are being started
    Starting,
    /// Accepting requests
    Running,
    /// Background tasks and providers are being stopped
    Stopping,
}

type Transition = fn(&mut WorkflowInstance) -> TransitionOutcome;

/// Builder for constructing a [`WorkflowHost`].
pub struct WorkflowHostBuilder {
    persistence: Arc<dyn PersistenceProvider>,
    queue: Arc<dyn QueueProvider>,
    lock: Arc<dyn DistributedLockProvider>,
    registry: Option<Arc<dyn WorkflowRegistry>>,
    background_tasks: Vec<Arc<dyn BackgroundTask>>,
    work_item_handlers: Vec<(QueueType, Arc<dyn WorkItemHandler>)>,
    lifecycle_handler: Option<Arc<dyn LifecycleEventHandler>>,
    options: HostOptions,
}

impl WorkflowHostBuilder {
    /// Use a specific registry instead of a fresh [`DefinitionRegistry`]
    pub fn registry(mut self, registry: Arc<dyn WorkflowRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Add a background task started and stopped with the host
    pub fn background_task(mut self, task: Arc<dyn BackgroundTask>) -> Self {
        self.background_tasks.push(task);
        self
    }

    /// Poll the host's queue for `queue_type` tokens and hand them to `handler`
    pub fn work_item_handler(
        mut self,
        queue_type: QueueType,
        handler: Arc<dyn WorkItemHandler>,
    ) -> Self {
        self.work_item_handlers.push((queue_type, handler));
        self
    }

    /// Receive lifecycle events
    pub fn lifecycle_handler(mut self, handler: Arc<dyn LifecycleEventHandler>) -> Self {
        self.lifecycle_handler = Some(handler);
        self
    }

    /// Set the host options
    pub fn options(mut self, options: HostOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the host
    pub fn build(self) -> Result<WorkflowHost, CoreError> {
        self.options.validate()?;

        let mut background_tasks = self.background_tasks;
        for (queue_type, handler) in self.work_item_handlers {
            background_tasks.push(Arc::new(QueuePoller::new(
                self.queue.clone(),
                queue_type,
                handler,
                self.options.poll_interval(),
            )));
        }

        let (shutdown_tx, _) = watch::channel(false);

        Ok(WorkflowHost {
            persistence: self.persistence,
            queue: self.queue,
            lock: self.lock,
            registry: self
                .registry
                .unwrap_or_else(|| Arc::new(DefinitionRegistry::new())),
            background_tasks,
            lifecycle_handler: self.lifecycle_handler,
            step_error_observers: StepErrorObservers::default(),
            options: self.options,
            state: RwLock::new(HostState::NotRunning),
            shutdown_tx,
        })
    }
}

/// Coordinates workflow instance lifecycles across host processes
pub struct WorkflowHost {
    persistence: Arc<dyn PersistenceProvider>,
    queue: Arc<dyn QueueProvider>,
    lock: Arc<dyn DistributedLockProvider>,
    registry: Arc<dyn WorkflowRegistry>,
    background_tasks: Vec<Arc<dyn BackgroundTask>>,
    lifecycle_handler: Option<Arc<dyn LifecycleEventHandler>>,
    step_error_observers: StepErrorObservers,
    options: HostOptions,
    state: RwLock<HostState>,
    shutdown_tx: watch::Sender<bool>,
}

impl WorkflowHost {
    /// Create a new host builder
    pub fn builder(
        persistence: Arc<dyn PersistenceProvider>,
        queue: Arc<dyn QueueProvider>,
        lock: Arc<dyn DistributedLockProvider>,
    ) -> WorkflowHostBuilder {
        WorkflowHostBuilder {
            persistence,
            queue,
            lock,
            registry: None,
            background_tasks: Vec::new(),
            work_item_handlers: Vec::new(),
            lifecycle_handler: None,
            options: HostOptions::default(),
        }
    }

    /// Current lifecycle state
    pub async fn state(&self) -> HostState {
        *self.state.read().await
    }

    /// Host options
    pub fn options(&self) -> &HostOptions {
        &self.options
    }

    /// The definition registry
    pub fn registry(&self) -> &Arc<dyn WorkflowRegistry> {
        &self.registry
    }

    /// Start the host.
    ///
    /// Ensures the store exists, then starts the queue provider, the lock
    /// provider and every background task, in that order. On failure whatever
    /// was started is stopped again and the host stays `NotRunning`.
    pub async fn start(&self) -> Result<(), CoreError> {
        let mut state = self.state.write().await;
        if *state != HostState::NotRunning {
            debug!(state = ?*state, "Start requested while host is not stopped");
            return Ok(());
        }

        *state = HostState::Starting;
        self.shutdown_tx.send_replace(false);
        info!(
            background_tasks = self.background_tasks.len(),
            "Workflow host starting"
        );

        match self.start_components().await {
            Ok(()) => {
                *state = HostState::Running;
                info!("Workflow host started");
                Ok(())
            }
            Err(e) => {
                *state = HostState::NotRunning;
                error!(error = %e, "Workflow host failed to start");
                Err(e)
            }
        }
    }

    async fn start_components(&self) -> Result<(), CoreError> {
        self.persistence.ensure_store_exists().await?;
        self.queue.start().await?;

        if let Err(e) = self.lock.start().await {
            log_stop_result("queue provider", self.queue.stop().await);
            return Err(e);
        }

        for (started, task) in self.background_tasks.iter().enumerate() {
            debug!(task = task.name(), "Starting background task");
            if let Err(e) = task.start().await {
                // stop failures are logged per component; the start error is returned
                let _rollback = stop_components(
                    &self.background_tasks[..started],
                    self.queue.as_ref(),
                    self.lock.as_ref(),
                )
                .await;
                return Err(e);
            }
        }

        Ok(())
    }

    /// Stop the host.
    ///
    /// Waits for in-flight instantiation and publish calls, cancels pending
    /// lock acquisitions, then stops background tasks, the queue provider
    /// and the lock provider, in that order. Every component is asked to
    /// stop even if an earlier one fails; the first failure is returned.
    pub async fn stop(&self) -> Result<(), CoreError> {
        let mut state = self.state.write().await;
        if *state != HostState::Running {
            debug!(state = ?*state, "Stop requested while host is not running");
            return Ok(());
        }

        *state = HostState::Stopping;
        self.shutdown_tx.send_replace(true);
        info!("Workflow host stopping");

        let result = stop_components(
            &self.background_tasks,
            self.queue.as_ref(),
            self.lock.as_ref(),
        )
        .await;

        *state = HostState::NotRunning;
        info!("Workflow host stopped");
        result
    }

    /// Stop the host and drop it
    pub async fn shutdown(self) -> Result<(), CoreError> {
        self.stop().await
    }

    /// Register a workflow by instantiating its template
    pub async fn register_workflow<W>(&self) -> Result<(), CoreError>
    where
        W: WorkflowTemplate + Default,
    {
        self.registry.register(W::default().build()).await
    }

    /// Register an already built definition
    pub async fn register_definition(&self, definition: WorkflowDefinition) -> Result<(), CoreError> {
        self.registry.register(definition).await
    }

    /// Create and enqueue a new workflow instance.
    ///
    /// `version` pins a definition version; `None` uses the latest. When
    /// `data` is `None` the definition's default-data factory is used.
    pub async fn start_workflow(
        &self,
        definition_id: &str,
        version: Option<u32>,
        data: Option<Value>,
    ) -> Result<WorkflowInstanceId, CoreError> {
        let state = self.state.read().await;
        if *state != HostState::Running {
            return Err(CoreError::HostNotRunning);
        }

        let definition = self
            .registry
            .get_definition(definition_id, version)
            .await?
            .ok_or_else(|| CoreError::WorkflowNotRegistered {
                id: definition_id.to_string(),
                version,
            })?;

        let instance = WorkflowInstance::new(&definition, data);
        let id = self.persistence.create_instance(&instance).await?;
        self.queue.enqueue(id.as_str(), QueueType::Workflow).await?;

        info!(
            workflow_instance_id = %id,
            workflow = %definition.id,
            version = definition.version,
            "Workflow instance started"
        );

        self.publish_lifecycle(Box::new(WorkflowStarted {
            workflow_instance_id: id.clone(),
            workflow_definition_id: definition.id.clone(),
            version: definition.version,
            timestamp: instance.create_time,
        }))
        .await;

        drop(state);
        Ok(id)
    }

    /// Runnable -> Suspended, under the instance lock
    pub async fn suspend_workflow(
        &self,
        id: &WorkflowInstanceId,
    ) -> Result<TransitionOutcome, CoreError> {
        let outcome = self.transition(id, WorkflowInstance::suspend).await?;

        if outcome.is_applied() {
            info!(workflow_instance_id = %id, "Workflow instance suspended");
            self.publish_lifecycle(Box::new(WorkflowSuspended {
                workflow_instance_id: id.clone(),
                timestamp: Utc::now(),
            }))
            .await;
        }

        Ok(outcome)
    }

    /// Suspended -> Runnable, under the instance lock.
    ///
    /// On success the instance is re-queued after the lock is released. The
    /// status change is already committed at that point, so a failed enqueue
    /// is logged and the outcome is still `Applied`.
    pub async fn resume_workflow(
        &self,
        id: &WorkflowInstanceId,
    ) -> Result<TransitionOutcome, CoreError> {
        let outcome = self.transition(id, WorkflowInstance::resume).await?;

        if outcome.is_applied() {
            if let Err(e) = self.queue.enqueue(id.as_str(), QueueType::Workflow).await {
                error!(
                    workflow_instance_id = %id,
                    error = %e,
                    "Resumed workflow instance could not be re-queued"
                );
            }
            info!(workflow_instance_id = %id, "Workflow instance resumed");
            self.publish_lifecycle(Box::new(WorkflowResumed {
                workflow_instance_id: id.clone(),
                timestamp: Utc::now(),
            }))
            .await;
        }

        Ok(outcome)
    }

    /// Any -> Terminated, under the instance lock
    pub async fn terminate_workflow(
        &self,
        id: &WorkflowInstanceId,
    ) -> Result<TransitionOutcome, CoreError> {
        let outcome = self.transition(id, WorkflowInstance::terminate).await?;

        if outcome.is_applied() {
            info!(workflow_instance_id = %id, "Workflow instance terminated");
            self.publish_lifecycle(Box::new(WorkflowTerminated {
                workflow_instance_id: id.clone(),
                timestamp: Utc::now(),
            }))
            .await;
        }

        Ok(outcome)
    }

    /// Store an event and enqueue it for the execution engine.
    ///
    /// The event takes effect at `effective_date` (converted to UTC), or now.
    pub async fn publish_event<Tz>(
        &self,
        event_name: &str,
        event_key: &str,
        event_data: Option<Value>,
        effective_date: Option<DateTime<Tz>>,
    ) -> Result<EventId, CoreError>
    where
        Tz: TimeZone + Send + Sync,
        Tz::Offset: Send + Sync,
    {
        let state = self.state.read().await;
        if *state != HostState::Running {
            return Err(CoreError::HostNotRunning);
        }

        let event = Event::new(event_name, event_key, event_data, effective_date);
        let id = self.persistence.create_event(&event).await?;
        self.queue.enqueue(id.as_str(), QueueType::Event).await?;

        debug!(
            event_id = %id,
            event_name = %event.event_name,
            event_key = %event.event_key,
            event_time = %event.event_time,
            "Event published"
        );

        self.publish_lifecycle(Box::new(EventPublished {
            event_id: id.clone(),
            event_name: event.event_name,
            event_key: event.event_key,
            timestamp: Utc::now(),
        }))
        .await;

        drop(state);
        Ok(id)
    }

    /// Subscribe to step failure reports
    pub async fn on_step_error(&self, observer: Arc<dyn StepErrorObserver>) {
        self.step_error_observers.subscribe(observer).await;
    }

    /// Report a failed step to every observer.
    ///
    /// Accepted in any host state so late reports from draining pollers are
    /// not lost during shutdown.
    pub async fn report_step_error(
        &self,
        workflow_instance_id: &WorkflowInstanceId,
        step_id: StepId,
        error: impl Into<String>,
    ) {
        let step_error = StepError {
            workflow_instance_id: workflow_instance_id.clone(),
            step_id,
            error: error.into(),
            timestamp: Utc::now(),
        };
        self.step_error_observers.notify(&step_error).await;
    }

    async fn transition(
        &self,
        id: &WorkflowInstanceId,
        apply: Transition,
    ) -> Result<TransitionOutcome, CoreError> {
        if !self.acquire_lock(id).await {
            return Ok(TransitionOutcome::LockUnavailable);
        }

        let result = self.apply_locked(id, apply).await;

        if let Err(e) = self.lock.release(id.as_str()).await {
            warn!(workflow_instance_id = %id, error = %e, "Failed to release instance lock");
        }

        result
    }

    async fn apply_locked(
        &self,
        id: &WorkflowInstanceId,
        apply: Transition,
    ) -> Result<TransitionOutcome, CoreError> {
        let mut instance = self.persistence.get_instance(id).await?;
        let outcome = apply(&mut instance);

        match outcome {
            TransitionOutcome::Applied => {
                self.persistence.persist_instance(&instance).await?;
            }
            TransitionOutcome::InvalidState { current } => {
                debug!(workflow_instance_id = %id, status = ?current, "Transition not allowed");
            }
            TransitionOutcome::LockUnavailable => {}
        }

        Ok(outcome)
    }

    /// Any failure to obtain the lock counts as not acquired
    async fn acquire_lock(&self, id: &WorkflowInstanceId) -> bool {
        let cancellation = CancellationSignal::new(self.shutdown_tx.subscribe());
        let acquire = self.lock.acquire(id.as_str(), cancellation);

        let result = match self.options.lock_acquire_timeout() {
            Some(limit) => match tokio::time::timeout(limit, acquire).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        workflow_instance_id = %id,
                        timeout_ms = limit.as_millis() as u64,
                        "Timed out acquiring instance lock"
                    );
                    return false;
                }
            },
            None => acquire.await,
        };

        match result {
            Ok(true) => true,
            Ok(false) => {
                debug!(workflow_instance_id = %id, "Instance lock is held elsewhere");
                false
            }
            Err(e) => {
                error!(workflow_instance_id = %id, error = %e, "Lock provider failed");
                false
            }
        }
    }

    async fn publish_lifecycle(&self, event: Box<dyn LifecycleEvent>) {
        let Some(handler) = &self.lifecycle_handler else {
            return;
        };

        let event_type = event.event_type();
        if let Err(e) = handler.handle_event(event).await {
            error!(event_type, error = %e, "Lifecycle event handler failed");
        }
    }
}

impl Drop for WorkflowHost {
    fn drop(&mut self) {
        if *self.state.get_mut() != HostState::Running {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Workflow host dropped while running outside a runtime; providers were not stopped");
            return;
        };

        self.shutdown_tx.send_replace(true);
        let tasks = std::mem::take(&mut self.background_tasks);
        let queue = self.queue.clone();
        let lock = self.lock.clone();
        runtime.spawn(async move {
            let _ = stop_components(&tasks, queue.as_ref(), lock.as_ref()).await;
        });
        warn!("Workflow host dropped while running; stopping providers in the background");
    }
}

/// Stop background tasks, then the queue, then the lock provider
async fn stop_components(
    tasks: &[Arc<dyn BackgroundTask>],
    queue: &dyn QueueProvider,
    lock: &dyn DistributedLockProvider,
) -> Result<(), CoreError> {
    let mut first_error = None;

    for task in tasks {
        let result = task.stop().await;
        log_stop_result(task.name(), result.clone());
        first_error = first_error.or(result.err());
    }

    let result = queue.stop().await;
    log_stop_result("queue provider", result.clone());
    first_error = first_error.or(result.err());

    let result = lock.stop().await;
    log_stop_result("lock provider", result.clone());
    first_error = first_error.or(result.err());

    first_error.map_or(Ok(()), Err)
}

fn log_stop_result(component: &str, result: Result<(), CoreError>) {
    if let Err(e) = result {
        error!(component, error = %e, "Failed to stop component");
    }
}

use thiserror::Error;

/// Core error type for the Conductor host
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A mutating request arrived while the host was not running
    #[error("Workflow host is not running")]
    HostNotRunning,

    /// No definition is registered for the requested id and version
    #[error("Workflow {id} version {} is not registered", version_label(.version))]
    WorkflowNotRegistered {
        /// Definition id that was requested
        id: String,
        /// Pinned version, if the caller asked for one
        version: Option<u32>,
    },

    /// Definition failed validation at registration time
    #[error("Invalid workflow definition: {0}")]
    InvalidDefinition(String),

    /// The same id and version was registered twice
    #[error("Workflow {id} version {version} is already registered")]
    DuplicateDefinition {
        /// Definition id
        id: String,
        /// Definition version
        version: u32,
    },

    /// Workflow instance not found
    #[error("Workflow instance not found: {0}")]
    InstanceNotFound(String),

    /// Event not found
    #[error("Event not found: {0}")]
    EventNotFound(String),

    /// Persistence backend failure
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// Queue backend failure
    #[error("Queue error: {0}")]
    QueueError(String),

    /// Lock backend failure
    #[error("Lock error: {0}")]
    LockError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

fn version_label(version: &Option<u32>) -> String {
    match version {
        Some(v) => v.to_string(),
        None => "latest".to_string(),
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

impl From<String> for CoreError {
    fn from(err: String) -> Self {
        CoreError::Other(err)
    }
}

impl From<&str> for CoreError {
    fn from(err: &str) -> Self {
        CoreError::Other(err.to_string())
    }
}

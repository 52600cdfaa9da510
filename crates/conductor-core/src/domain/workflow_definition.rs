use crate::CoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Value object: Step ID within a definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepId(pub u32);

impl StepId {
    /// The step every new instance starts at
    pub const INITIAL: StepId = StepId(0);
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Factory producing the data payload for instances started without data
pub type DataFactory = Arc<dyn Fn() -> Value + Send + Sync>;

/// Represents a step in a workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepDefinition {
    /// ID of the step
    pub id: StepId,

    /// Human-readable name of the step
    pub name: String,
}

impl StepDefinition {
    /// Create a new step definition
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id: StepId(id),
            name: name.into(),
        }
    }
}

/// An immutable, versioned workflow definition
#[derive(Clone)]
pub struct WorkflowDefinition {
    /// ID of the workflow
    pub id: String,

    /// Version of the workflow, monotonic per id
    pub version: u32,

    /// Description of the workflow
    pub description: Option<String>,

    /// The steps in this workflow, in declaration order
    pub steps: Vec<StepDefinition>,

    /// Produces the instance data when a caller starts the workflow without any
    default_data: Option<DataFactory>,
}

impl fmt::Debug for WorkflowDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowDefinition")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("description", &self.description)
            .field("steps", &self.steps)
            .field("has_default_data", &self.default_data.is_some())
            .finish()
    }
}

impl WorkflowDefinition {
    /// Create a new definition with no steps
    pub fn new(id: impl Into<String>, version: u32) -> Self {
        Self {
            id: id.into(),
            version,
            description: None,
            steps: Vec::new(),
            default_data: None,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Append a step
    pub fn with_step(mut self, id: u32, name: impl Into<String>) -> Self {
        self.steps.push(StepDefinition::new(id, name));
        self
    }

    /// Register a factory for the default instance data
    pub fn with_default_data<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default_data = Some(Arc::new(factory));
        self
    }

    /// Whether a default-data factory is declared
    pub fn has_default_data(&self) -> bool {
        self.default_data.is_some()
    }

    /// Build a fresh default data value, if the definition declares a factory
    pub fn default_data(&self) -> Option<Value> {
        self.default_data.as_ref().map(|factory| factory())
    }

    /// Look up a step by id
    pub fn step(&self, id: StepId) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// The step new instances start at
    pub fn initial_step(&self) -> Option<&StepDefinition> {
        self.step(StepId::INITIAL)
    }

    /// Validate the workflow definition
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.id.trim().is_empty() {
            return Err(CoreError::InvalidDefinition(
                "Workflow id must not be empty".to_string(),
            ));
        }

        if self.steps.is_empty() {
            return Err(CoreError::InvalidDefinition(format!(
                "Workflow {} must have at least one step",
                self.id
            )));
        }

        let mut step_ids = HashSet::new();
        for step in &self.steps {
            if !step_ids.insert(step.id) {
                return Err(CoreError::InvalidDefinition(format!(
                    "Workflow {} has duplicate step ID: {}",
                    self.id, step.id
                )));
            }
        }

        if !step_ids.contains(&StepId::INITIAL) {
            return Err(CoreError::InvalidDefinition(format!(
                "Workflow {} has no initial step {}",
                self.id,
                StepId::INITIAL
            )));
        }

        Ok(())
    }
}

/// A type that knows how to build a workflow definition.
///
/// Registering a template instantiates it and hands the produced definition
/// to the registry.
pub trait WorkflowTemplate: Send + Sync {
    /// Build the definition
    fn build(&self) -> WorkflowDefinition;
}

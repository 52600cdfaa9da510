//! Default in-process definition registry

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::repository::WorkflowRegistry;
use crate::domain::workflow_definition::WorkflowDefinition;
use crate::CoreError;

type VersionMap = BTreeMap<u32, Arc<WorkflowDefinition>>;

/// Registry holding every version of every registered definition
#[derive(Default)]
pub struct DefinitionRegistry {
    definitions: RwLock<HashMap<String, VersionMap>>,
}

impl DefinitionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// All registered (id, version) pairs, sorted
    pub async fn list_definitions(&self) -> Vec<(String, u32)> {
        let definitions = self.definitions.read().await;
        let mut result: Vec<(String, u32)> = definitions
            .iter()
            .flat_map(|(id, versions)| versions.keys().map(move |v| (id.clone(), *v)))
            .collect();
        result.sort();
        result
    }
}

#[async_trait]
impl WorkflowRegistry for DefinitionRegistry {
    async fn get_definition(
        &self,
        id: &str,
        version: Option<u32>,
    ) -> Result<Option<Arc<WorkflowDefinition>>, CoreError> {
        let definitions = self.definitions.read().await;
        let Some(versions) = definitions.get(id) else {
            return Ok(None);
        };

        let found = match version {
            Some(v) => versions.get(&v).cloned(),
            None => versions.values().next_back().cloned(),
        };
        Ok(found)
    }

    async fn register(&self, definition: WorkflowDefinition) -> Result<(), CoreError> {
        definition.validate()?;

        let mut definitions = self.definitions.write().await;
        let versions = definitions.entry(definition.id.clone()).or_default();
        if versions.contains_key(&definition.version) {
            return Err(CoreError::DuplicateDefinition {
                id: definition.id,
                version: definition.version,
            });
        }

        info!(
            workflow = %definition.id,
            version = definition.version,
            steps = definition.steps.len(),
            "Registered workflow definition"
        );
        debug!(?definition, "Definition details");
        versions.insert(definition.version, Arc::new(definition));
        Ok(())
    }
}

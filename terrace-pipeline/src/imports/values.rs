use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use terrace_core::domain::import::{ImportDefinition, ImportType};
use terrace_core::domain::installation::Installation;

use crate::error::Result;

/// Values fetched for the imports of an installation, keyed by logical import name
///
/// A missing key means the value was not provided.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportedValues {
    pub data: Map<String, Value>,
    pub targets: Map<String, Value>,
    pub target_lists: Map<String, Value>,
    pub component_descriptors: Map<String, Value>,
    pub component_descriptor_lists: Map<String, Value>,
}

impl ImportedValues {
    /// Sorts a flat map of values into kinds using the declared import types
    ///
    /// Values without a matching definition are treated as data.
    pub fn from_flat(values: Map<String, Value>, definitions: &[ImportDefinition]) -> Self {
        let mut imported = Self::default();
        for (name, value) in values {
            let import_type = terrace_core::domain::import::find_import(definitions, &name)
                .map(|def| def.import_type.clone())
                .unwrap_or(ImportType::Data);
            imported.kind_mut(&import_type).insert(name, value);
        }
        imported
    }

    fn kind_mut(&mut self, import_type: &ImportType) -> &mut Map<String, Value> {
        match import_type {
            ImportType::Target => &mut self.targets,
            ImportType::TargetList => &mut self.target_lists,
            ImportType::ComponentDescriptor => &mut self.component_descriptors,
            ImportType::ComponentDescriptorList => &mut self.component_descriptor_lists,
            ImportType::Data | ImportType::Unknown(_) => &mut self.data,
        }
    }

    /// The values of one import kind
    pub fn of_kind(&self, import_type: &ImportType) -> Option<&Map<String, Value>> {
        match import_type {
            ImportType::Data => Some(&self.data),
            ImportType::Target => Some(&self.targets),
            ImportType::TargetList => Some(&self.target_lists),
            ImportType::ComponentDescriptor => Some(&self.component_descriptors),
            ImportType::ComponentDescriptorList => Some(&self.component_descriptor_lists),
            ImportType::Unknown(_) => None,
        }
    }
}

/// Fetches the values of one import kind for an installation
#[async_trait]
pub trait ImportProvider: Send + Sync {
    async fn provide(&self, installation: &Installation) -> Result<Map<String, Value>>;
}

#[async_trait]
impl ImportProvider for Map<String, Value> {
    async fn provide(&self, _installation: &Installation) -> Result<Map<String, Value>> {
        Ok(self.clone())
    }
}

/// One optional provider per import kind
#[derive(Clone, Default)]
pub struct ImportProviders {
    pub data: Option<Arc<dyn ImportProvider>>,
    pub targets: Option<Arc<dyn ImportProvider>>,
    pub target_lists: Option<Arc<dyn ImportProvider>>,
    pub component_descriptors: Option<Arc<dyn ImportProvider>>,
    pub component_descriptor_lists: Option<Arc<dyn ImportProvider>>,
}

impl ImportProviders {
    /// Asks every configured provider for its values
    pub async fn fetch(&self, installation: &Installation) -> Result<ImportedValues> {
        async fn provide(
            provider: &Option<Arc<dyn ImportProvider>>,
            installation: &Installation,
        ) -> Result<Map<String, Value>> {
            match provider {
                Some(provider) => provider.provide(installation).await,
                None => Ok(Map::new()),
            }
        }
        Ok(ImportedValues {
            data: provide(&self.data, installation).await?,
            targets: provide(&self.targets, installation).await?,
            target_lists: provide(&self.target_lists, installation).await?,
            component_descriptors: provide(&self.component_descriptors, installation).await?,
            component_descriptor_lists: provide(&self.component_descriptor_lists, installation)
                .await?,
        })
    }
}

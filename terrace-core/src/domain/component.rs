//! Component descriptors
//!
//! Only the parts of a descriptor the pipeline reads are typed. Everything
//! else is kept as raw JSON so that templates see the full document.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDescriptor {
    #[serde(default)]
    pub meta: DescriptorMeta,
    pub component: ComponentSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptorMeta {
    pub schema_version: String,
}

impl Default for DescriptorMeta {
    fn default() -> Self {
        Self {
            schema_version: "v2".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub repository_contexts: Vec<RepositoryContext>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub component_references: Vec<ComponentReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryContext {
    #[serde(rename = "type")]
    pub context_type: String,
    #[serde(default)]
    pub base_url: String,
}

/// An artifact shipped with a component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_identity: BTreeMap<String, String>,
    #[serde(default)]
    pub access: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentReference {
    pub name: String,
    pub component_name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_identity: BTreeMap<String, String>,
}

/// Transitive closure of descriptors referenced by a component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescriptorList {
    #[serde(default)]
    pub components: Vec<ComponentDescriptor>,
}

impl ComponentDescriptor {
    /// Decodes a descriptor from YAML or JSON
    pub fn decode(data: &[u8]) -> Result<Self> {
        serde_yaml::from_slice(data).map_err(|e| CoreError::decode("component descriptor", e))
    }

    pub fn name(&self) -> &str {
        &self.component.name
    }

    pub fn version(&self) -> &str {
        &self.component.version
    }

    /// The last repository context is the one the component was resolved from
    pub fn effective_repository_context(&self) -> Option<&RepositoryContext> {
        self.component.repository_contexts.last()
    }

    /// Finds a resource by name and optional extra identity
    pub fn find_resource(
        &self,
        name: &str,
        extra_identity: &BTreeMap<String, String>,
    ) -> Option<&Resource> {
        self.component.resources.iter().find(|r| {
            r.name == name
                && extra_identity
                    .iter()
                    .all(|(k, v)| r.extra_identity.get(k) == Some(v))
        })
    }

    pub fn find_component_reference(&self, name: &str) -> Option<&ComponentReference> {
        self.component
            .component_references
            .iter()
            .find(|r| r.name == name)
    }

    /// Serializes the descriptor into plain JSON as seen by templates
    pub fn to_generic(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| CoreError::decode("component descriptor", e))
    }
}

impl ComponentDescriptorList {
    /// Finds the descriptor a component reference points to
    pub fn find(&self, component_name: &str, version: &str) -> Option<&ComponentDescriptor> {
        self.components
            .iter()
            .find(|cd| cd.name() == component_name && cd.version() == version)
    }

    pub fn to_generic(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self)
            .map_err(|e| CoreError::decode("component descriptor list", e))
    }
}

//! Component and blob resolution
//!
//! Fetching descriptors and blobs from remote repositories is outside this
//! crate. [`LocalComponentResolver`] serves both from a directory, which is
//! what offline blueprint rendering uses.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use terrace_core::domain::component::{ComponentDescriptor, ComponentDescriptorList, Resource};
use terrace_template::{BlobResolver, TemplateError};

use crate::error::{PipelineError, Result};

/// File name of a component descriptor inside a component directory
pub const COMPONENT_DESCRIPTOR_FILE_NAME: &str = "component-descriptor.yaml";

/// Directory of resource blobs next to a component descriptor
pub const BLOBS_DIR_NAME: &str = "blobs";

/// Resolves component descriptors together with a blob resolver for their resources
#[async_trait]
pub trait ComponentResolver: Send + Sync {
    /// Resolves a component version
    ///
    /// # Arguments
    /// * `repository_context` - Repository the component is stored in
    /// * `name` - Component name
    /// * `version` - Component version
    async fn resolve_with_blob_resolver(
        &self,
        repository_context: Option<&Value>,
        name: &str,
        version: &str,
    ) -> Result<(ComponentDescriptor, Arc<dyn BlobResolver>)>;
}

/// Resolves all transitively referenced components of a descriptor
///
/// Each component version is resolved once, even if referenced repeatedly.
pub async fn resolve_component_list(
    resolver: &dyn ComponentResolver,
    cd: &ComponentDescriptor,
) -> Result<ComponentDescriptorList> {
    let repository_context = cd
        .effective_repository_context()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| PipelineError::ComponentResolution {
            component: cd.name().to_string(),
            message: e.to_string(),
        })?;

    let mut visited = BTreeSet::new();
    visited.insert((cd.name().to_string(), cd.version().to_string()));
    let mut pending: Vec<(String, String)> = cd
        .component
        .component_references
        .iter()
        .map(|r| (r.component_name.clone(), r.version.clone()))
        .collect();

    let mut list = ComponentDescriptorList::default();
    while let Some((name, version)) = pending.pop() {
        if !visited.insert((name.clone(), version.clone())) {
            continue;
        }
        let (referenced, _) = resolver
            .resolve_with_blob_resolver(repository_context.as_ref(), &name, &version)
            .await?;
        for reference in &referenced.component.component_references {
            pending.push((reference.component_name.clone(), reference.version.clone()));
        }
        list.components.push(referenced);
    }
    Ok(list)
}

/// Serves components from subdirectories holding a `component-descriptor.yaml`
#[derive(Debug, Clone)]
pub struct LocalComponentResolver {
    root: PathBuf,
}

impl LocalComponentResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn read_descriptor(path: &Path) -> Result<ComponentDescriptor> {
        let data = tokio::fs::read(path).await.map_err(|source| terrace_core::CoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(ComponentDescriptor::decode(&data)?)
    }
}

#[async_trait]
impl ComponentResolver for LocalComponentResolver {
    async fn resolve_with_blob_resolver(
        &self,
        _repository_context: Option<&Value>,
        name: &str,
        version: &str,
    ) -> Result<(ComponentDescriptor, Arc<dyn BlobResolver>)> {
        let not_found = |message: String| PipelineError::ComponentResolution {
            component: format!("{}:{}", name, version),
            message,
        };
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| not_found(format!("unable to read {}: {}", self.root.display(), e)))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| not_found(e.to_string()))?
        {
            let descriptor_path = entry.path().join(COMPONENT_DESCRIPTOR_FILE_NAME);
            if !tokio::fs::try_exists(&descriptor_path).await.unwrap_or(false) {
                continue;
            }
            let cd = Self::read_descriptor(&descriptor_path).await?;
            if cd.name() == name && cd.version() == version {
                debug!(component = name, version, path = %entry.path().display(), "resolved component");
                let blobs = LocalBlobResolver::new(entry.path().join(BLOBS_DIR_NAME));
                return Ok((cd, Arc::new(blobs)));
            }
        }
        Err(not_found("component not found".to_string()))
    }
}

/// Reads resource blobs from a directory
///
/// A resource is stored under the `filename` of its local access, falling
/// back to the resource name.
#[derive(Debug, Clone)]
pub struct LocalBlobResolver {
    dir: PathBuf,
}

impl LocalBlobResolver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl BlobResolver for LocalBlobResolver {
    fn fetch(&self, resource: &Resource) -> terrace_template::Result<Vec<u8>> {
        let file = resource
            .access
            .get("filename")
            .and_then(Value::as_str)
            .unwrap_or(&resource.name);
        let file = file.trim_start_matches('/');
        if file.split('/').any(|part| part == "..") {
            return Err(TemplateError::Blob {
                resource: resource.name.clone(),
                message: format!("invalid blob path {:?}", file),
            });
        }
        std::fs::read(self.dir.join(file)).map_err(|e| TemplateError::Blob {
            resource: resource.name.clone(),
            message: e.to_string(),
        })
    }
}

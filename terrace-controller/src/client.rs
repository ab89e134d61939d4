//! Deploy item storage
//!
//! The controller only needs to read a deploy item and write back either its
//! metadata or its status. Two stores are provided: an in-memory one and one
//! backed by a directory of YAML manifests (`<dir>/<namespace>/<name>.yaml`).

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

use terrace_core::domain::DeployItem;

use crate::error::{ControllerError, Result};

/// Access to persisted deploy items, addressed by `namespace/name`
#[async_trait]
pub trait DeployItemClient: Send + Sync {
    /// Fetches a deploy item; `None` if it does not exist
    async fn get(&self, key: &str) -> Result<Option<DeployItem>>;

    /// Writes metadata and spec, leaving the stored status untouched
    async fn update(&self, item: &DeployItem) -> Result<()>;

    /// Writes the status, leaving metadata and spec untouched
    async fn update_status(&self, item: &DeployItem) -> Result<()>;

    /// Keys of all stored deploy items
    async fn list(&self) -> Result<Vec<String>>;
}

// ============================================================================
// In-memory store
// ============================================================================

/// Deploy item store backed by a map; counts writes
#[derive(Debug, Default)]
pub struct MemoryDeployItemClient {
    items: RwLock<BTreeMap<String, DeployItem>>,
    updates: AtomicUsize,
    status_updates: AtomicUsize,
}

impl MemoryDeployItemClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, item: DeployItem) {
        self.items.write().await.insert(item.metadata.key(), item);
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn status_update_count(&self) -> usize {
        self.status_updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeployItemClient for MemoryDeployItemClient {
    async fn get(&self, key: &str) -> Result<Option<DeployItem>> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn update(&self, item: &DeployItem) -> Result<()> {
        let key = item.metadata.key();
        let mut items = self.items.write().await;
        let stored = items
            .get_mut(&key)
            .ok_or_else(|| ControllerError::NotFound(key.clone()))?;
        stored.metadata = item.metadata.clone();
        stored.spec = item.spec.clone();
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_status(&self, item: &DeployItem) -> Result<()> {
        let key = item.metadata.key();
        let mut items = self.items.write().await;
        let stored = items
            .get_mut(&key)
            .ok_or_else(|| ControllerError::NotFound(key.clone()))?;
        stored.status = item.status.clone();
        self.status_updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.items.read().await.keys().cloned().collect())
    }
}

// ============================================================================
// Directory store
// ============================================================================

/// Deploy item store backed by YAML manifests on disk
#[derive(Debug, Clone)]
pub struct DirDeployItemClient {
    root: PathBuf,
}

impl DirDeployItemClient {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        match key.split_once('/') {
            Some((namespace, name)) => self.root.join(namespace).join(format!("{}.yaml", name)),
            None => self.root.join(format!("{}.yaml", key)),
        }
    }

    async fn read(&self, key: &str) -> Result<Option<DeployItem>> {
        let path = self.path_for(key);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(io_error(&path, source)),
        };
        let mut item: DeployItem =
            serde_yaml::from_str(&raw).map_err(|e| ControllerError::decode(key, e))?;
        // the file location is authoritative for the object key
        if let Some((namespace, name)) = key.split_once('/') {
            item.metadata.namespace = namespace.to_string();
            item.metadata.name = name.to_string();
        } else {
            item.metadata.name = key.to_string();
        }
        Ok(Some(item))
    }

    async fn write(&self, item: &DeployItem) -> Result<()> {
        let key = item.metadata.key();
        let path = self.path_for(&key);
        let encoded = serde_yaml::to_string(item).map_err(|e| ControllerError::decode(&key, e))?;
        tokio::fs::write(&path, encoded)
            .await
            .map_err(|source| io_error(&path, source))?;
        debug!(item = %key, path = %path.display(), "wrote deploy item");
        Ok(())
    }

    async fn manifests_in(dir: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|source| io_error(dir, source))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| io_error(dir, source))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> ControllerError {
    ControllerError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[async_trait]
impl DeployItemClient for DirDeployItemClient {
    async fn get(&self, key: &str) -> Result<Option<DeployItem>> {
        self.read(key).await
    }

    async fn update(&self, item: &DeployItem) -> Result<()> {
        let key = item.metadata.key();
        let mut stored = self
            .read(&key)
            .await?
            .ok_or_else(|| ControllerError::NotFound(key.clone()))?;
        stored.metadata = item.metadata.clone();
        stored.spec = item.spec.clone();
        self.write(&stored).await
    }

    async fn update_status(&self, item: &DeployItem) -> Result<()> {
        let key = item.metadata.key();
        let mut stored = self
            .read(&key)
            .await?
            .ok_or_else(|| ControllerError::NotFound(key.clone()))?;
        stored.status = item.status.clone();
        self.write(&stored).await
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(keys),
            Err(source) => return Err(io_error(&self.root, source)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| io_error(&self.root, source))?
        {
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()).map(String::from) else {
                continue;
            };
            let file_type = entry
                .file_type()
                .await
                .map_err(|source| io_error(&path, source))?;
            if file_type.is_dir() {
                for name in Self::manifests_in(&path).await? {
                    keys.push(format!("{}/{}", file_name, name));
                }
            } else if let Some(name) = file_name.strip_suffix(".yaml") {
                keys.push(name.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

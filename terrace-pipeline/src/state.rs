//! Persistence of opaque per-execution template state
//!
//! State is keyed by `prefix + execution name`, where the prefix separates
//! import, deploy and export executions. Stores never interpret the bytes.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::RwLock;

use terrace_core::domain::installation::Installation;

/// State prefix of import executions
pub const IMPORT_STATE_PREFIX: &str = "import";
/// State prefix of deploy and subinstallation executions
pub const DEPLOY_STATE_PREFIX: &str = "deploy";
/// State prefix of export executions
pub const EXPORT_STATE_PREFIX: &str = "export";

#[derive(Debug, Error)]
pub enum StateError {
    /// No state was stored for the key yet
    #[error("state {0:?} not found")]
    NotFound(String),

    /// The backing store failed
    #[error("state {key:?}: {message}")]
    Backend { key: String, message: String },
}

/// Key-value store of opaque execution state
#[async_trait]
pub trait StateHandler: Send + Sync {
    /// Returns the state stored for `key`
    ///
    /// # Errors
    /// Returns [`StateError::NotFound`] if nothing was stored for `key`
    async fn get(&self, key: &str) -> Result<Vec<u8>, StateError>;

    /// Overwrites the state of `key`; storing zero-length data is a no-op
    async fn store(&self, key: &str, data: &[u8]) -> Result<(), StateError>;
}

/// In-memory state store, used for offline rendering
#[derive(Debug, Default)]
pub struct MemoryStateHandler {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStateHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all stored entries
    pub async fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl StateHandler for MemoryStateHandler {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StateError> {
        self.entries
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StateError::NotFound(key.to_string()))
    }

    async fn store(&self, key: &str, data: &[u8]) -> Result<(), StateError> {
        if data.is_empty() {
            return Ok(());
        }
        self.entries
            .write()
            .await
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }
}

/// State store backed by the template state of an installation
///
/// Loads the base64 encoded entries of `status.templateState` and writes them
/// back with [`InstallationStateHandler::apply_to`] once the pass is done.
#[derive(Debug, Default)]
pub struct InstallationStateHandler {
    inner: MemoryStateHandler,
}

impl InstallationStateHandler {
    /// Loads the state stored on an installation
    pub fn from_installation(installation: &Installation) -> Result<Self, StateError> {
        let mut entries = BTreeMap::new();
        for (key, encoded) in &installation.status.template_state {
            let data = STANDARD.decode(encoded).map_err(|e| StateError::Backend {
                key: key.clone(),
                message: format!("invalid base64 state: {}", e),
            })?;
            entries.insert(key.clone(), data);
        }
        Ok(Self {
            inner: MemoryStateHandler {
                entries: RwLock::new(entries),
            },
        })
    }

    /// Writes the current state back into the installation status
    pub async fn apply_to(&self, installation: &mut Installation) {
        let entries = self.inner.entries.read().await;
        installation.status.template_state = entries
            .iter()
            .map(|(key, data)| (key.clone(), STANDARD.encode(data)))
            .collect();
    }
}

#[async_trait]
impl StateHandler for InstallationStateHandler {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StateError> {
        self.inner.get(key).await
    }

    async fn store(&self, key: &str, data: &[u8]) -> Result<(), StateError> {
        self.inner.store(key, data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_round_trip() {
        let store = MemoryStateHandler::new();
        assert!(matches!(
            store.get("deploymain").await,
            Err(StateError::NotFound(key)) if key == "deploymain"
        ));

        store.store("deploymain", b"counter: 1").await.unwrap();
        assert_eq!(store.get("deploymain").await.unwrap(), b"counter: 1".to_vec());
        assert_eq!(store.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn test_installation_state_round_trip() {
        let mut inst = Installation::default();
        inst.status
            .template_state
            .insert("importcheck".to_string(), STANDARD.encode(b"a: 1"));

        let store = InstallationStateHandler::from_installation(&inst).unwrap();
        assert_eq!(store.get("importcheck").await.unwrap(), b"a: 1".to_vec());

        store.store("exportout", b"b: 2").await.unwrap();
        store.apply_to(&mut inst).await;
        assert_eq!(inst.status.template_state["exportout"], STANDARD.encode(b"b: 2"));
        assert_eq!(inst.status.template_state.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_store_keeps_prior_state() {
        let store = MemoryStateHandler::new();
        store.store("deploymain", b"a: 1").await.unwrap();
        store.store("deploymain", b"").await.unwrap();
        assert_eq!(store.get("deploymain").await.unwrap(), b"a: 1".to_vec());

        store.store("deployother", b"").await.unwrap();
        assert!(matches!(
            store.get("deployother").await,
            Err(StateError::NotFound(_))
        ));

        let mut inst = Installation::default();
        let store = InstallationStateHandler::from_installation(&inst).unwrap();
        store.store("exportout", b"b: 2").await.unwrap();
        store.store("exportout", b"").await.unwrap();
        store.store("exportnone", b"").await.unwrap();
        store.apply_to(&mut inst).await;
        assert_eq!(inst.status.template_state.len(), 1);
        assert_eq!(inst.status.template_state["exportout"], STANDARD.encode(b"b: 2"));
    }

    #[test]
    fn test_installation_state_rejects_garbage() {
        let mut inst = Installation::default();
        inst.status
            .template_state
            .insert("x".to_string(), "%%%".to_string());
        assert!(InstallationStateHandler::from_installation(&inst).is_err());
    }
}

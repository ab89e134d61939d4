//! Deployer registration cleanup
//!
//! A deployer registration installs one deployer per environment. Before the
//! registration may go away, every one of those installations has to be
//! removed; the finalizer is only dropped once all deletions succeeded.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use terrace_core::annotations::DEPLOYER_MANAGEMENT_FINALIZER;
use terrace_core::domain::ObjectMeta;

use crate::error::{ControllerError, Result};

/// A deployer registered for installation into every environment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployerRegistration {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub types: Vec<String>,
}

/// An environment deployers get installed into
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub metadata: ObjectMeta,
}

/// Removes the deployer installation of a registration from one environment
#[async_trait]
pub trait DeployerManager: Send + Sync {
    async fn delete(&self, registration: &DeployerRegistration, environment: &Environment) -> Result<()>;
}

/// Persists deployer registrations
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    async fn update(&self, registration: &DeployerRegistration) -> Result<()>;
}

/// Deletes the deployer of `registration` from all environments
///
/// Deletions run concurrently, at most `max_parallel` at a time. Every
/// environment is attempted even if some fail. Only when all succeeded is
/// the management finalizer removed and the registration persisted.
///
/// Returns `false` if the registration is not being deleted.
///
/// # Errors
///
/// Returns the failed deletions aggregated into one error, or the error of
/// persisting the registration.
pub async fn cleanup_registration(
    registration: &mut DeployerRegistration,
    environments: &[Environment],
    manager: Arc<dyn DeployerManager>,
    store: &dyn RegistrationStore,
    max_parallel: usize,
) -> Result<bool> {
    if !registration.metadata.is_being_deleted() {
        return Ok(false);
    }

    info!(
        "Removing deployer {} from {} environment(s)",
        registration.metadata.name,
        environments.len()
    );

    let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));
    let shared = Arc::new(registration.clone());
    let mut handles = Vec::with_capacity(environments.len());

    for environment in environments.iter().cloned() {
        let semaphore = Arc::clone(&semaphore);
        let manager = Arc::clone(&manager);
        let registration = Arc::clone(&shared);

        handles.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| ControllerError::Task(e.to_string()))?;
            manager.delete(&registration, &environment).await
        }));
    }

    let mut errors = Vec::new();
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Deployer cleanup failed: {}", e);
                errors.push(e);
            }
            Err(e) => errors.push(ControllerError::Task(e.to_string())),
        }
    }
    if let Some(err) = ControllerError::aggregate(errors) {
        return Err(err);
    }

    registration
        .metadata
        .remove_finalizer(DEPLOYER_MANAGEMENT_FINALIZER);
    store.update(registration).await?;
    info!("Deployer {} removed from all environments", registration.metadata.name);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingManager {
        failing: HashSet<String>,
        deleted: Mutex<Vec<String>>,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl DeployerManager for RecordingManager {
        async fn delete(&self, _: &DeployerRegistration, environment: &Environment) -> Result<()> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            let name = environment.metadata.name.clone();
            self.deleted.lock().unwrap().push(name.clone());
            if self.failing.contains(&name) {
                return Err(ControllerError::Deletion {
                    registration: "helm".into(),
                    environment: name,
                    message: "still in use".into(),
                });
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        updates: Mutex<Vec<DeployerRegistration>>,
    }

    #[async_trait]
    impl RegistrationStore for RecordingStore {
        async fn update(&self, registration: &DeployerRegistration) -> Result<()> {
            self.updates.lock().unwrap().push(registration.clone());
            Ok(())
        }
    }

    fn registration(deleting: bool) -> DeployerRegistration {
        let mut metadata = ObjectMeta::named("", "helm");
        metadata.add_finalizer(DEPLOYER_MANAGEMENT_FINALIZER);
        if deleting {
            metadata.deletion_timestamp = Some(Utc::now());
        }
        DeployerRegistration {
            metadata,
            types: vec!["helm".into()],
        }
    }

    fn environments(n: usize) -> Vec<Environment> {
        (0..n)
            .map(|i| Environment {
                metadata: ObjectMeta::named("", format!("env-{}", i)),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_cleanup_removes_finalizer() {
        let manager = Arc::new(RecordingManager::default());
        let store = RecordingStore::default();
        let mut reg = registration(true);

        let done = cleanup_registration(&mut reg, &environments(6), manager.clone(), &store, 2)
            .await
            .unwrap();

        assert!(done);
        assert_eq!(manager.deleted.lock().unwrap().len(), 6);
        assert!(manager.peak.load(Ordering::SeqCst) <= 2);
        assert!(!reg.metadata.has_finalizer(DEPLOYER_MANAGEMENT_FINALIZER));
        assert_eq!(store.updates.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_aggregates_failures() {
        let manager = Arc::new(RecordingManager {
            failing: ["env-1".to_string(), "env-3".to_string()].into_iter().collect(),
            ..Default::default()
        });
        let store = RecordingStore::default();
        let mut reg = registration(true);

        let err = cleanup_registration(&mut reg, &environments(4), manager.clone(), &store, 4)
            .await
            .unwrap_err();

        match err {
            ControllerError::Aggregate(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {}", other),
        }
        // every environment was attempted
        assert_eq!(manager.deleted.lock().unwrap().len(), 4);
        assert!(reg.metadata.has_finalizer(DEPLOYER_MANAGEMENT_FINALIZER));
        assert!(store.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_skips_live_registration() {
        let manager = Arc::new(RecordingManager::default());
        let store = RecordingStore::default();
        let mut reg = registration(false);

        let done = cleanup_registration(&mut reg, &environments(2), manager.clone(), &store, 1)
            .await
            .unwrap();
        assert!(!done);
        assert!(manager.deleted.lock().unwrap().is_empty());
    }
}

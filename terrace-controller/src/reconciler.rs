//! Deploy item timeout reconciler
//!
//! Fetches a deploy item, runs the timeout checks against it and writes back
//! whatever changed. The loop re-runs every item either when one of them asked
//! for a requeue or when the resync interval elapsed.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::client::DeployItemClient;
use crate::config::Config;
use crate::error::Result;
use crate::timeout::{TimeoutDetector, earliest};

/// Outcome of a single reconcile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileResult {
    pub requeue_after: Option<Duration>,
}

/// Reconciler detecting pickup, aborting and progressing timeouts
pub struct DeployItemController {
    client: Arc<dyn DeployItemClient>,
    detector: TimeoutDetector,
    resync_interval: Duration,
}

impl DeployItemController {
    /// Creates a new controller and logs which detections are active
    pub fn new(client: Arc<dyn DeployItemClient>, config: &Config) -> Self {
        let detector = TimeoutDetector::from_config(config);
        log_detection("deploy item pickup timeout detection", detector.pickup_timeout);
        log_detection("deploy item aborting timeout detection", detector.aborting_timeout);
        log_detection("deploy item default timeout", detector.default_timeout);

        Self {
            client,
            detector,
            resync_interval: config.resync_interval,
        }
    }

    /// Reconciles the deploy item stored under `key`
    ///
    /// Status and metadata are written separately and only when they differ
    /// from what was read. A deploy item that no longer exists is skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the item cannot be read or written, or carries a
    /// malformed timestamp annotation.
    pub async fn reconcile(&self, key: &str) -> Result<ReconcileResult> {
        debug!(item = %key, "reconcile");
        let Some(mut item) = self.client.get(key).await? else {
            debug!(item = %key, "deploy item not found");
            return Ok(ReconcileResult::default());
        };
        let old = item.clone();

        let requeue_after = self.detector.detect(&mut item, Utc::now())?;

        if item.status != old.status {
            self.client.update_status(&item).await.inspect_err(|e| {
                error!(item = %key, "unable to set deploy item status: {}", e);
            })?;
        }
        if item.metadata.annotations != old.metadata.annotations {
            self.client.update(&item).await.inspect_err(|e| {
                error!(item = %key, "unable to update deploy item: {}", e);
            })?;
        }

        if let Some(after) = requeue_after {
            debug!(item = %key, "requeue deploy item after {:?}", after);
        }
        Ok(ReconcileResult { requeue_after })
    }

    /// Reconciles every stored deploy item once
    ///
    /// Returns how long to wait before the next pass: the earliest requeue,
    /// never longer than the resync interval. Failures are logged and do not
    /// affect other items.
    pub async fn reconcile_all(&self) -> Duration {
        let keys = match self.client.list().await {
            Ok(keys) => keys,
            Err(e) => {
                error!("Unable to list deploy items: {}", e);
                return self.resync_interval;
            }
        };

        let mut next = None;
        for key in &keys {
            match self.reconcile(key).await {
                Ok(result) => next = earliest(next, result.requeue_after),
                Err(e) => error!(item = %key, "reconcile failed: {}", e),
            }
        }

        next.map_or(self.resync_interval, |d| d.min(self.resync_interval))
    }

    /// Runs reconcile passes until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            "Starting deploy item timeout loop (resync: {:?})",
            self.resync_interval
        );

        loop {
            let wait = self.reconcile_all().await;
            debug!("Next reconcile pass in {:?}", wait);

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Deploy item timeout loop stopped");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

fn log_detection(what: &str, timeout: Option<Duration>) {
    info!(
        active = timeout.is_some(),
        timeout = ?timeout.unwrap_or_default(),
        "{}",
        what
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryDeployItemClient;
    use chrono::TimeDelta;
    use terrace_core::annotations::{
        self, ABORT_OPERATION, OPERATION_ANNOTATION, PICKUP_TIMEOUT_REASON,
        RECONCILE_TIMESTAMP_ANNOTATION,
    };
    use terrace_core::domain::{DeployItem, DeployItemPhase, ObjectMeta};

    fn config() -> Config {
        let mut config = Config::new("unused");
        config.pickup_timeout = Some(Duration::from_secs(60));
        config.aborting_timeout = Some(Duration::from_secs(60));
        config.default_timeout = Some(Duration::from_secs(600));
        config.resync_interval = Duration::from_secs(120);
        config
    }

    fn item(name: &str) -> DeployItem {
        DeployItem {
            metadata: ObjectMeta::named("default", name),
            ..Default::default()
        }
    }

    async fn setup(items: Vec<DeployItem>) -> (Arc<MemoryDeployItemClient>, DeployItemController) {
        let client = Arc::new(MemoryDeployItemClient::new());
        for di in items {
            client.insert(di).await;
        }
        let controller = DeployItemController::new(client.clone(), &config());
        (client, controller)
    }

    #[tokio::test]
    async fn test_missing_item_is_not_an_error() {
        let (_, controller) = setup(Vec::new()).await;
        let result = controller.reconcile("default/ghost").await.unwrap();
        assert_eq!(result, ReconcileResult::default());
    }

    #[tokio::test]
    async fn test_pickup_timeout_updates_status_only() {
        let mut di = item("app");
        annotations::set_timestamp_annotation(
            &mut di.metadata,
            RECONCILE_TIMESTAMP_ANNOTATION,
            Utc::now() - TimeDelta::seconds(3600),
        );
        let (client, controller) = setup(vec![di]).await;

        let result = controller.reconcile("default/app").await.unwrap();
        assert_eq!(result.requeue_after, None);
        assert_eq!(client.status_update_count(), 1);
        assert_eq!(client.update_count(), 0);

        let stored = client.get("default/app").await.unwrap().unwrap();
        assert!(stored.status.failed_with(PICKUP_TIMEOUT_REASON));

        // nothing changes on the next pass
        controller.reconcile("default/app").await.unwrap();
        assert_eq!(client.status_update_count(), 1);
    }

    #[tokio::test]
    async fn test_progressing_timeout_updates_annotations() {
        let mut di = item("app");
        di.status.phase = DeployItemPhase::Progressing;
        di.status.last_reconcile_time = Some(Utc::now() - TimeDelta::seconds(900));
        let (client, controller) = setup(vec![di]).await;

        controller.reconcile("default/app").await.unwrap();
        assert_eq!(client.update_count(), 1);
        assert_eq!(client.status_update_count(), 0);

        let stored = client.get("default/app").await.unwrap().unwrap();
        assert_eq!(stored.metadata.annotations[OPERATION_ANNOTATION], ABORT_OPERATION);
    }

    #[tokio::test]
    async fn test_untouched_item_is_not_written() {
        let mut di = item("app");
        di.status.phase = DeployItemPhase::Progressing;
        di.status.last_reconcile_time = Some(Utc::now());
        let (client, controller) = setup(vec![di]).await;

        let result = controller.reconcile("default/app").await.unwrap();
        let requeue = result.requeue_after.unwrap();
        assert!(requeue > Duration::from_secs(600) && requeue <= Duration::from_secs(605));
        assert_eq!(client.update_count(), 0);
        assert_eq!(client.status_update_count(), 0);
    }

    #[tokio::test]
    async fn test_reconcile_all_bounds_wait() {
        let mut soon = item("soon");
        annotations::set_timestamp_annotation(
            &mut soon.metadata,
            RECONCILE_TIMESTAMP_ANNOTATION,
            Utc::now() - TimeDelta::seconds(50),
        );
        let mut broken = item("broken");
        broken
            .metadata
            .annotations
            .insert(RECONCILE_TIMESTAMP_ANNOTATION.to_string(), "not-a-time".to_string());
        let (_, controller) = setup(vec![soon, broken, item("idle")]).await;

        let wait = controller.reconcile_all().await;
        assert!(wait <= Duration::from_secs(15), "wait was {:?}", wait);

        let (_, idle_only) = setup(vec![item("idle")]).await;
        assert_eq!(idle_only.reconcile_all().await, Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_run_stops_when_cancelled() {
        let (_, controller) = setup(vec![item("idle")]).await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        controller.run(cancel).await;
    }
}

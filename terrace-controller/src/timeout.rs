//! Deploy item timeout detection
//!
//! Three checks run on every reconcile of a deploy item:
//!
//! 1. Pickup: a deployer has to remove the reconcile timestamp annotation
//!    within the pickup timeout, otherwise the item fails.
//! 2. Aborting: a deployer has to remove the abort annotations within the
//!    aborting timeout, otherwise the item fails.
//! 3. Progressing: a deployer has to finish a reconcile within the item's
//!    timeout, otherwise an abort is requested.
//!
//! The checks only mutate the item passed in. Persisting the changes is up to
//! the caller.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

use terrace_core::annotations::{
    self, ABORT_OPERATION, ABORT_TIMESTAMP_ANNOTATION, ABORTING_TIMEOUT_OPERATION,
    ABORTING_TIMEOUT_REASON, ERROR_TIMEOUT, OPERATION_ANNOTATION, PICKUP_TIMEOUT_OPERATION,
    PICKUP_TIMEOUT_REASON, RECONCILE_TIMESTAMP_ANNOTATION,
};
use terrace_core::domain::{DeployItem, DeployItemPhase, LastError};

use crate::config::Config;
use crate::error::{ControllerError, Result};

/// Added to every requeue so the next check lands after the deadline
pub const REQUEUE_MARGIN: Duration = Duration::from_secs(5);

/// The three timeout checks with their configured durations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeoutDetector {
    pub pickup_timeout: Option<Duration>,
    pub aborting_timeout: Option<Duration>,
    pub default_timeout: Option<Duration>,
}

impl TimeoutDetector {
    pub fn new(
        pickup_timeout: Option<Duration>,
        aborting_timeout: Option<Duration>,
        default_timeout: Option<Duration>,
    ) -> Self {
        Self {
            pickup_timeout: pickup_timeout.filter(|d| !d.is_zero()),
            aborting_timeout: aborting_timeout.filter(|d| !d.is_zero()),
            default_timeout: default_timeout.filter(|d| !d.is_zero()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.pickup_timeout,
            config.aborting_timeout,
            config.default_timeout,
        )
    }

    /// Runs all active checks against `item`
    ///
    /// Returns the earliest requeue any check asked for. A check that fails
    /// the item ends the run, later checks are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a timestamp annotation is malformed.
    pub fn detect(&self, item: &mut DeployItem, now: DateTime<Utc>) -> Result<Option<Duration>> {
        let mut requeue = None;

        if let Some(timeout) = self.pickup_timeout {
            let status = item.status.clone();
            requeue = detect_pickup_timeout(item, timeout, now)?;
            if item.status != status {
                return Ok(None);
            }
        }

        if let Some(timeout) = self.aborting_timeout {
            let status = item.status.clone();
            let next = detect_aborting_timeout(item, timeout, now)?;
            if item.status != status {
                return Ok(None);
            }
            requeue = earliest(requeue, next);
        }

        if progressing_detection_active(item, self.default_timeout) {
            let next = detect_progressing_timeout(item, self.default_timeout, now)?;
            requeue = earliest(requeue, next);
        }

        Ok(requeue)
    }
}

/// Returns the smaller of two optional requeue durations
pub fn earliest(a: Option<Duration>, b: Option<Duration>) -> Option<Duration> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Fails the item if no deployer picked it up within `timeout`
pub fn detect_pickup_timeout(
    item: &mut DeployItem,
    timeout: Duration,
    now: DateTime<Utc>,
) -> Result<Option<Duration>> {
    let key = item.metadata.key();
    if item.status.failed_with(PICKUP_TIMEOUT_REASON) {
        // a stale reconcile annotation must not fail the item again
        debug!(item = %key, "deploy item already failed due to pickup timeout");
        return Ok(None);
    }

    let Some(ts) = read_timestamp(item, RECONCILE_TIMESTAMP_ANNOTATION, "reconcile")? else {
        debug!(item = %key, "deploy item has no reconcile timestamp annotation");
        return Ok(None);
    };

    let waiting = elapsed(ts, now);
    if waiting >= timeout {
        debug!(item = %key, "pickup timeout occurred");
        item.status.phase = DeployItemPhase::Failed;
        item.status.last_error = Some(LastError::updated(
            item.status.last_error.as_ref(),
            PICKUP_TIMEOUT_OPERATION,
            PICKUP_TIMEOUT_REASON,
            format!(
                "no deployer has reconciled this deployitem within {} seconds",
                timeout.as_secs()
            ),
            now,
            &[ERROR_TIMEOUT],
        ));
        return Ok(None);
    }

    Ok(Some(timeout - waiting + REQUEUE_MARGIN))
}

/// Fails the item if a requested abort was not honored within `timeout`
pub fn detect_aborting_timeout(
    item: &mut DeployItem,
    timeout: Duration,
    now: DateTime<Utc>,
) -> Result<Option<Duration>> {
    let key = item.metadata.key();
    if item.status.failed_with(ABORTING_TIMEOUT_REASON) {
        debug!(item = %key, "deploy item already failed due to aborting timeout");
        annotations::remove_abort_operation_and_timestamp(&mut item.metadata);
        return Ok(None);
    }

    if !item.metadata.has_annotation(ABORT_TIMESTAMP_ANNOTATION) || item.status.phase.is_final() {
        return Ok(None);
    }
    let Some(ts) = read_timestamp(item, ABORT_TIMESTAMP_ANNOTATION, "abort")? else {
        return Ok(None);
    };

    let waiting = elapsed(ts, now);
    if waiting >= timeout {
        debug!(item = %key, "aborting timeout occurred");
        annotations::remove_abort_operation_and_timestamp(&mut item.metadata);
        item.status.phase = DeployItemPhase::Failed;
        item.status.last_error = Some(LastError::updated(
            item.status.last_error.as_ref(),
            ABORTING_TIMEOUT_OPERATION,
            ABORTING_TIMEOUT_REASON,
            format!(
                "deployer has not aborted progressing this deploy item within {} seconds",
                timeout.as_secs()
            ),
            now,
            &[ERROR_TIMEOUT],
        ));
        return Ok(None);
    }

    Ok(Some(timeout - waiting + REQUEUE_MARGIN))
}

/// True unless the item disables progressing detection, or declares no
/// timeout while no default is configured
pub fn progressing_detection_active(item: &DeployItem, default_timeout: Option<Duration>) -> bool {
    match item.spec.timeout_seconds {
        Some(0) => false,
        Some(_) => true,
        None => default_timeout.is_some_and(|d| !d.is_zero()),
    }
}

/// Requests an abort if the deployer has been progressing for too long
///
/// The phase is left untouched; the aborting check takes over from here.
pub fn detect_progressing_timeout(
    item: &mut DeployItem,
    default_timeout: Option<Duration>,
    now: DateTime<Utc>,
) -> Result<Option<Duration>> {
    let Some(last_reconcile) = item.status.last_reconcile_time else {
        return Ok(None);
    };
    if item.status.phase.is_final() {
        return Ok(None);
    }

    let timeout = match item.spec.timeout_seconds {
        Some(0) => return Ok(None),
        Some(seconds) => Duration::from_secs(seconds),
        None => match default_timeout {
            Some(timeout) if !timeout.is_zero() => timeout,
            _ => return Ok(None),
        },
    };

    let progressing = elapsed(last_reconcile, now);
    if progressing >= timeout {
        if abort_requested(item) {
            return Ok(None);
        }
        debug!(item = %item.metadata.key(), "deploy item timed out, requesting abort");
        annotations::set_abort_operation_and_timestamp(&mut item.metadata, now);
        return Ok(None);
    }

    Ok(Some(timeout - progressing + REQUEUE_MARGIN))
}

fn abort_requested(item: &DeployItem) -> bool {
    item.metadata.annotations.get(OPERATION_ANNOTATION).map(String::as_str) == Some(ABORT_OPERATION)
        && item.metadata.has_annotation(ABORT_TIMESTAMP_ANNOTATION)
}

fn read_timestamp(
    item: &DeployItem,
    annotation: &str,
    kind: &'static str,
) -> Result<Option<DateTime<Utc>>> {
    annotations::get_timestamp_annotation(&item.metadata, annotation)
        .map_err(|source| ControllerError::Timestamp { kind, source })
}

/// Time since `ts`; timestamps in the future count as zero
fn elapsed(ts: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - ts).to_std().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use terrace_core::annotations::set_timestamp_annotation;
    use terrace_core::domain::ObjectMeta;

    // annotations carry whole seconds
    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn item() -> DeployItem {
        DeployItem {
            metadata: ObjectMeta::named("default", "app"),
            ..Default::default()
        }
    }

    fn waiting_for_pickup(now: DateTime<Utc>, secs: i64) -> DeployItem {
        let mut di = item();
        set_timestamp_annotation(
            &mut di.metadata,
            RECONCILE_TIMESTAMP_ANNOTATION,
            now - TimeDelta::seconds(secs),
        );
        di
    }

    fn waiting_for_abort(now: DateTime<Utc>, secs: i64) -> DeployItem {
        let mut di = item();
        di.status.phase = DeployItemPhase::Progressing;
        annotations::set_abort_operation_and_timestamp(&mut di.metadata, now - TimeDelta::seconds(secs));
        di
    }

    #[test]
    fn test_pickup_timeout_fails_item() {
        let now = fixed_now();
        let mut di = waiting_for_pickup(now, 61);
        let requeue = detect_pickup_timeout(&mut di, Duration::from_secs(60), now).unwrap();

        assert_eq!(requeue, None);
        assert_eq!(di.status.phase, DeployItemPhase::Failed);
        let err = di.status.last_error.unwrap();
        assert_eq!(err.reason, PICKUP_TIMEOUT_REASON);
        assert_eq!(err.operation, PICKUP_TIMEOUT_OPERATION);
        assert_eq!(err.codes, vec![ERROR_TIMEOUT.to_string()]);
        assert_eq!(
            err.message,
            "no deployer has reconciled this deployitem within 60 seconds"
        );
    }

    #[test]
    fn test_pickup_requeue_before_timeout() {
        let now = fixed_now();
        let mut di = waiting_for_pickup(now, 30);
        let requeue = detect_pickup_timeout(&mut di, Duration::from_secs(60), now).unwrap();

        assert_eq!(requeue, Some(Duration::from_secs(35)));
        assert_eq!(di.status.phase, DeployItemPhase::Init);
        assert!(di.status.last_error.is_none());
    }

    #[test]
    fn test_pickup_without_annotation() {
        let mut di = item();
        let requeue = detect_pickup_timeout(&mut di, Duration::from_secs(60), fixed_now()).unwrap();
        assert_eq!(requeue, None);
        assert_eq!(di, item());
    }

    #[test]
    fn test_pickup_already_failed_is_untouched() {
        let now = fixed_now();
        let mut di = waiting_for_pickup(now, 3600);
        detect_pickup_timeout(&mut di, Duration::from_secs(60), now).unwrap();
        let failed = di.clone();

        let later = now + TimeDelta::seconds(120);
        detect_pickup_timeout(&mut di, Duration::from_secs(60), later).unwrap();
        assert_eq!(di, failed);
    }

    #[test]
    fn test_malformed_reconcile_annotation() {
        let mut di = item();
        di.metadata
            .annotations
            .insert(RECONCILE_TIMESTAMP_ANNOTATION.to_string(), "garbage".to_string());
        let err = detect_pickup_timeout(&mut di, Duration::from_secs(60), fixed_now()).unwrap_err();
        assert!(matches!(err, ControllerError::Timestamp { kind: "reconcile", .. }));
    }

    #[test]
    fn test_aborting_timeout_fails_item() {
        let now = fixed_now();
        let mut di = waiting_for_abort(now, 301);
        let requeue = detect_aborting_timeout(&mut di, Duration::from_secs(300), now).unwrap();

        assert_eq!(requeue, None);
        assert_eq!(di.status.phase, DeployItemPhase::Failed);
        assert!(di.status.failed_with(ABORTING_TIMEOUT_REASON));
        assert!(di.metadata.annotations.is_empty());
        assert_eq!(
            di.status.last_error.unwrap().message,
            "deployer has not aborted progressing this deploy item within 300 seconds"
        );
    }

    #[test]
    fn test_aborting_requeue_before_timeout() {
        let now = fixed_now();
        let mut di = waiting_for_abort(now, 100);
        let requeue = detect_aborting_timeout(&mut di, Duration::from_secs(300), now).unwrap();
        assert_eq!(requeue, Some(Duration::from_secs(205)));
        assert!(di.metadata.has_annotation(ABORT_TIMESTAMP_ANNOTATION));
    }

    #[test]
    fn test_aborting_ignores_final_phase() {
        let now = fixed_now();
        let mut di = waiting_for_abort(now, 1000);
        di.status.phase = DeployItemPhase::Succeeded;
        let before = di.clone();
        assert_eq!(
            detect_aborting_timeout(&mut di, Duration::from_secs(300), now).unwrap(),
            None
        );
        assert_eq!(di, before);
    }

    #[test]
    fn test_abort_idempotence() {
        let now = fixed_now();
        let mut di = waiting_for_abort(now, 1000);
        detect_aborting_timeout(&mut di, Duration::from_secs(300), now).unwrap();
        let status = di.status.clone();

        // a deployer re-adds the abort request after the item failed
        annotations::set_abort_operation_and_timestamp(&mut di.metadata, now);
        detect_aborting_timeout(&mut di, Duration::from_secs(300), now).unwrap();
        assert!(di.metadata.annotations.is_empty());
        assert_eq!(di.status, status);

        let settled = di.clone();
        detect_aborting_timeout(&mut di, Duration::from_secs(300), now).unwrap();
        assert_eq!(di, settled);
    }

    #[test]
    fn test_progressing_requests_abort() {
        let now = fixed_now();
        let mut di = item();
        di.status.phase = DeployItemPhase::Progressing;
        di.status.last_reconcile_time = Some(now - TimeDelta::seconds(700));

        let requeue =
            detect_progressing_timeout(&mut di, Some(Duration::from_secs(600)), now).unwrap();
        assert_eq!(requeue, None);
        assert_eq!(di.metadata.annotations[OPERATION_ANNOTATION], ABORT_OPERATION);
        assert_eq!(di.status.phase, DeployItemPhase::Progressing);

        // an existing abort request keeps its timestamp
        let requested = di.clone();
        let later = now + TimeDelta::seconds(30);
        detect_progressing_timeout(&mut di, Some(Duration::from_secs(600)), later).unwrap();
        assert_eq!(di, requested);
    }

    #[test]
    fn test_progressing_uses_item_timeout() {
        let now = fixed_now();
        let mut di = item();
        di.status.phase = DeployItemPhase::Progressing;
        di.status.last_reconcile_time = Some(now - TimeDelta::seconds(10));
        di.spec.timeout_seconds = Some(60);

        let requeue =
            detect_progressing_timeout(&mut di, Some(Duration::from_secs(600)), now).unwrap();
        assert_eq!(requeue, Some(Duration::from_secs(55)));
    }

    #[test]
    fn test_progressing_detection_switches() {
        let mut di = item();
        assert!(progressing_detection_active(&di, Some(Duration::from_secs(1))));
        assert!(!progressing_detection_active(&di, None));

        di.spec.timeout_seconds = Some(0);
        assert!(!progressing_detection_active(&di, Some(Duration::from_secs(1))));

        di.spec.timeout_seconds = Some(30);
        assert!(progressing_detection_active(&di, None));
    }

    #[test]
    fn test_detect_takes_earliest_requeue() {
        let now = fixed_now();
        let mut di = waiting_for_pickup(now, 30);
        di.status.phase = DeployItemPhase::Progressing;
        di.status.last_reconcile_time = Some(now - TimeDelta::seconds(50));

        let detector = TimeoutDetector::new(
            Some(Duration::from_secs(60)),
            Some(Duration::from_secs(300)),
            Some(Duration::from_secs(60)),
        );
        let requeue = detector.detect(&mut di, now).unwrap();
        assert_eq!(requeue, Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_detect_stops_after_pickup_failure() {
        let now = fixed_now();
        let mut di = waiting_for_pickup(now, 120);
        di.status.last_reconcile_time = Some(now - TimeDelta::seconds(7200));

        let detector = TimeoutDetector::new(
            Some(Duration::from_secs(60)),
            Some(Duration::from_secs(300)),
            Some(Duration::from_secs(60)),
        );
        assert_eq!(detector.detect(&mut di, now).unwrap(), None);
        assert!(di.status.failed_with(PICKUP_TIMEOUT_REASON));
        assert!(!di.metadata.has_annotation(ABORT_TIMESTAMP_ANNOTATION));
    }

    #[test]
    fn test_disabled_detector_does_nothing() {
        let now = fixed_now();
        let mut di = waiting_for_pickup(now, 1_000_000);
        let before = di.clone();
        let detector = TimeoutDetector::new(Some(Duration::ZERO), None, None);
        assert_eq!(detector.detect(&mut di, now).unwrap(), None);
        assert_eq!(di, before);
    }
}

//! Well-known annotations, labels and reasons
//!
//! The reconcile-timestamp and abort annotations are the only contract between
//! the timeout controller and deployers: deployers remove the reconcile
//! timestamp when they pick up a deploy item, and remove the abort pair once
//! they honored an abort request.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::domain::meta::ObjectMeta;
use crate::error::{CoreError, Result};

pub const DOMAIN: &str = "terrace.dev";

/// Operation requested from a deployer
pub const OPERATION_ANNOTATION: &str = "terrace.dev/operation";

/// Set when a deploy item is handed to deployers; removed on pickup
pub const RECONCILE_TIMESTAMP_ANNOTATION: &str = "terrace.dev/reconcile-time";

/// Set together with `operation=abort`; removed once the abort is honored
pub const ABORT_TIMESTAMP_ANNOTATION: &str = "terrace.dev/abort-time";

/// Value of the operation annotation requesting an abort
pub const ABORT_OPERATION: &str = "abort";

/// Label naming the installation that manages a deploy item
pub const EXECUTION_MANAGED_BY_LABEL: &str = "execution.terrace.dev/managed-by";

/// Annotation naming the deploy item specification a deploy item was built from
pub const EXECUTION_MANAGED_NAME_ANNOTATION: &str = "execution.terrace.dev/name";

/// Label marking installations created for a deployer environment
pub const DEPLOYER_ENVIRONMENT_LABEL: &str = "deployers.terrace.dev/environment";

/// Finalizer held by the deployer management on registrations
pub const DEPLOYER_MANAGEMENT_FINALIZER: &str = "finalizer.deployermanagement.terrace.dev";

pub const PICKUP_TIMEOUT_REASON: &str = "PickupTimeout";
pub const PICKUP_TIMEOUT_OPERATION: &str = "WaitingForPickup";
pub const ABORTING_TIMEOUT_REASON: &str = "AbortingTimeout";
pub const ABORTING_TIMEOUT_OPERATION: &str = "WaitingForAbort";

/// Error code attached to timeout errors
pub const ERROR_TIMEOUT: &str = "ERR_TIMEOUT";

/// Writes `ts` as an RFC 3339 timestamp annotation
pub fn set_timestamp_annotation(meta: &mut ObjectMeta, key: &str, ts: DateTime<Utc>) {
    meta.annotations
        .insert(key.to_string(), ts.to_rfc3339_opts(SecondsFormat::Secs, true));
}

/// Reads a timestamp annotation
///
/// Returns `Ok(None)` when the annotation is absent. A present but malformed
/// value is an error; corrupted annotations are never silently dropped.
pub fn get_timestamp_annotation(meta: &ObjectMeta, key: &str) -> Result<Option<DateTime<Utc>>> {
    let Some(raw) = meta.annotations.get(key) else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| Some(ts.with_timezone(&Utc)))
        .map_err(|source| CoreError::InvalidTimestamp {
            key: key.to_string(),
            value: raw.clone(),
            source,
        })
}

/// Requests an abort from the responsible deployer
pub fn set_abort_operation_and_timestamp(meta: &mut ObjectMeta, now: DateTime<Utc>) {
    meta.annotations
        .insert(OPERATION_ANNOTATION.to_string(), ABORT_OPERATION.to_string());
    set_timestamp_annotation(meta, ABORT_TIMESTAMP_ANNOTATION, now);
}

/// Removes the abort request; a no-op if it is not present
pub fn remove_abort_operation_and_timestamp(meta: &mut ObjectMeta) {
    if meta.annotations.get(OPERATION_ANNOTATION).map(String::as_str) == Some(ABORT_OPERATION) {
        meta.annotations.remove(OPERATION_ANNOTATION);
    }
    meta.annotations.remove(ABORT_TIMESTAMP_ANNOTATION);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_annotation_roundtrip() {
        let mut meta = ObjectMeta::default();
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        set_timestamp_annotation(&mut meta, RECONCILE_TIMESTAMP_ANNOTATION, ts);
        assert_eq!(
            meta.annotations[RECONCILE_TIMESTAMP_ANNOTATION],
            "2024-05-01T12:30:00Z"
        );
        let read = get_timestamp_annotation(&meta, RECONCILE_TIMESTAMP_ANNOTATION).unwrap();
        assert_eq!(read, Some(ts));
    }

    #[test]
    fn test_missing_timestamp_annotation() {
        let meta = ObjectMeta::default();
        assert_eq!(
            get_timestamp_annotation(&meta, ABORT_TIMESTAMP_ANNOTATION).unwrap(),
            None
        );
    }

    #[test]
    fn test_malformed_timestamp_annotation() {
        let mut meta = ObjectMeta::default();
        meta.annotations
            .insert(ABORT_TIMESTAMP_ANNOTATION.to_string(), "yesterday".to_string());
        let err = get_timestamp_annotation(&meta, ABORT_TIMESTAMP_ANNOTATION).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTimestamp { .. }));
    }

    #[test]
    fn test_abort_annotations() {
        let mut meta = ObjectMeta::default();
        set_abort_operation_and_timestamp(&mut meta, Utc::now());
        assert_eq!(meta.annotations[OPERATION_ANNOTATION], ABORT_OPERATION);
        assert!(meta.has_annotation(ABORT_TIMESTAMP_ANNOTATION));

        remove_abort_operation_and_timestamp(&mut meta);
        assert!(meta.annotations.is_empty());

        // removing twice is fine
        remove_abort_operation_and_timestamp(&mut meta);
        assert!(meta.annotations.is_empty());
    }

    #[test]
    fn test_remove_abort_keeps_other_operations() {
        let mut meta = ObjectMeta::default();
        meta.annotations
            .insert(OPERATION_ANNOTATION.to_string(), "reconcile".to_string());
        remove_abort_operation_and_timestamp(&mut meta);
        assert_eq!(meta.annotations[OPERATION_ANNOTATION], "reconcile");
    }
}

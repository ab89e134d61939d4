//! Deploy item specifications and persisted deploy items

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::meta::{ObjectMeta, ObjectReference};

// ============================================================================
// Specification produced by deploy executions
// ============================================================================

/// Target of a deploy item specification
///
/// On the wire this is `{name?, namespace?, import?, index?}`. A set `index`
/// selects an element of a target list import, a set `import` alone references
/// a single target import, and a bare `name` is a literal object reference.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "RawTargetReference", into = "RawTargetReference")]
pub enum TargetReference {
    Literal {
        name: String,
        namespace: Option<String>,
    },
    Import {
        import: String,
    },
    ImportList {
        import: String,
        index: i64,
    },
    #[default]
    Empty,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawTargetReference {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    import: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    index: Option<i64>,
}

impl From<RawTargetReference> for TargetReference {
    fn from(raw: RawTargetReference) -> Self {
        if let Some(index) = raw.index {
            return TargetReference::ImportList {
                import: raw.import,
                index,
            };
        }
        if !raw.import.is_empty() {
            return TargetReference::Import { import: raw.import };
        }
        if !raw.name.is_empty() {
            return TargetReference::Literal {
                name: raw.name,
                namespace: Some(raw.namespace).filter(|ns| !ns.is_empty()),
            };
        }
        TargetReference::Empty
    }
}

impl From<TargetReference> for RawTargetReference {
    fn from(target: TargetReference) -> Self {
        match target {
            TargetReference::Literal { name, namespace } => RawTargetReference {
                name,
                namespace: namespace.unwrap_or_default(),
                ..Default::default()
            },
            TargetReference::Import { import } => RawTargetReference {
                import,
                ..Default::default()
            },
            TargetReference::ImportList { import, index } => RawTargetReference {
                import,
                index: Some(index),
                ..Default::default()
            },
            TargetReference::Empty => RawTargetReference::default(),
        }
    }
}

/// A deploy item as rendered by a deploy execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployItemSpecification {
    pub name: String,
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(default)]
    pub target: TargetReference,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, rename = "config")]
    pub configuration: serde_json::Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

/// A deploy item specification whose target has been resolved to an object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployItemTemplate {
    pub name: String,
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ObjectReference>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, rename = "config")]
    pub configuration: serde_json::Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

// ============================================================================
// Persisted deploy item
// ============================================================================

/// Execution phase of a deploy item, advanced by deployers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeployItemPhase {
    #[default]
    Init,
    Progressing,
    Succeeded,
    Failed,
    Deleting,
}

impl DeployItemPhase {
    /// Succeeded and Failed are final
    pub fn is_final(&self) -> bool {
        matches!(self, DeployItemPhase::Succeeded | DeployItemPhase::Failed)
    }
}

impl fmt::Display for DeployItemPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeployItemPhase::Init => "Init",
            DeployItemPhase::Progressing => "Progressing",
            DeployItemPhase::Succeeded => "Succeeded",
            DeployItemPhase::Failed => "Failed",
            DeployItemPhase::Deleting => "Deleting",
        };
        f.write_str(s)
    }
}

/// Structured description of the last error of an object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastError {
    pub operation: String,
    pub reason: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub codes: Vec<String>,
    pub last_transition_time: DateTime<Utc>,
    pub last_update_time: DateTime<Utc>,
}

impl LastError {
    /// Builds the next last error from the previous one
    ///
    /// The transition time is carried over when operation and reason are unchanged.
    pub fn updated(
        previous: Option<&LastError>,
        operation: impl Into<String>,
        reason: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
        codes: &[&str],
    ) -> Self {
        let operation = operation.into();
        let reason = reason.into();
        let last_transition_time = match previous {
            Some(prev) if prev.operation == operation && prev.reason == reason => {
                prev.last_transition_time
            }
            _ => now,
        };
        Self {
            operation,
            reason,
            message: message.into(),
            codes: codes.iter().map(|c| c.to_string()).collect(),
            last_transition_time,
            last_update_time: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployItemSpec {
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ObjectReference>,
    #[serde(default, rename = "config")]
    pub configuration: serde_json::Value,
    /// Progressing timeout of this item in seconds
    ///
    /// `None` falls back to the controller default, `Some(0)` disables detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployItemStatus {
    #[serde(default)]
    pub phase: DeployItemPhase,
    #[serde(default)]
    pub observed_generation: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<LastError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconcile_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_status: Option<serde_json::Value>,
}

impl DeployItemStatus {
    /// True if the item failed with the given last error reason
    pub fn failed_with(&self, reason: &str) -> bool {
        self.phase == DeployItemPhase::Failed
            && self.last_error.as_ref().is_some_and(|e| e.reason == reason)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployItem {
    pub metadata: ObjectMeta,
    pub spec: DeployItemSpec,
    #[serde(default)]
    pub status: DeployItemStatus,
}

impl DeployItem {
    /// Creates a deploy item from a resolved template
    pub fn from_template(namespace: &str, template: &DeployItemTemplate) -> Self {
        let mut metadata = ObjectMeta::named(namespace, template.name.clone());
        metadata.labels = template.labels.clone();
        Self {
            metadata,
            spec: DeployItemSpec {
                item_type: template.item_type.clone(),
                target: template.target.clone(),
                configuration: template.configuration.clone(),
                timeout_seconds: None,
            },
            status: DeployItemStatus::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn target(raw: serde_json::Value) -> TargetReference {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn test_target_reference_variants() {
        assert_eq!(
            target(json!({"name": "t", "namespace": "ns"})),
            TargetReference::Literal {
                name: "t".into(),
                namespace: Some("ns".into())
            }
        );
        assert_eq!(
            target(json!({"import": "cluster"})),
            TargetReference::Import {
                import: "cluster".into()
            }
        );
        assert_eq!(
            target(json!({"import": "clusters", "index": 1})),
            TargetReference::ImportList {
                import: "clusters".into(),
                index: 1
            }
        );
        assert_eq!(target(json!({})), TargetReference::Empty);
    }

    #[test]
    fn test_specification_wire_shape() {
        let spec: DeployItemSpecification = serde_json::from_value(json!({
            "name": "init",
            "type": "manifest",
            "target": {"import": "cluster"},
            "config": {"replicas": 2},
            "dependsOn": ["base"]
        }))
        .unwrap();
        assert_eq!(spec.item_type, "manifest");
        assert_eq!(spec.configuration, json!({"replicas": 2}));
        assert_eq!(spec.depends_on, vec!["base".to_string()]);

        let encoded = serde_json::to_value(&spec).unwrap();
        assert_eq!(encoded["target"], json!({"import": "cluster"}));
    }

    #[test]
    fn test_last_error_keeps_transition_time() {
        let t0 = Utc::now() - chrono::Duration::seconds(100);
        let first = LastError::updated(None, "Op", "Reason", "a", t0, &["ERR"]);
        let now = Utc::now();
        let second = LastError::updated(Some(&first), "Op", "Reason", "b", now, &["ERR"]);
        assert_eq!(second.last_transition_time, t0);
        assert_eq!(second.last_update_time, now);

        let third = LastError::updated(Some(&second), "Op", "Other", "c", now, &[]);
        assert_eq!(third.last_transition_time, now);
    }

    #[test]
    fn test_final_phases() {
        assert!(DeployItemPhase::Succeeded.is_final());
        assert!(DeployItemPhase::Failed.is_final());
        assert!(!DeployItemPhase::Progressing.is_final());
        assert!(!DeployItemPhase::Init.is_final());
    }
}

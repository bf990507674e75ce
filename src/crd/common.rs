//! # Shared CRD Types
//!
//! Status and reference types shared by every managed kind.

use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Coarse lifecycle phase reported in `status.phase`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum Phase {
    /// Waiting on children or dependencies
    Pending,
    /// Pulling or processing external data
    Syncing,
    /// Every sub-component converged
    Ready,
    /// The desired state cannot be realised until the spec changes
    Failed,
    /// Deletion requested, finalizer still present
    Terminating,
}

impl Phase {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Pending => "Pending",
            Phase::Syncing => "Syncing",
            Phase::Ready => "Ready",
            Phase::Failed => "Failed",
            Phase::Terminating => "Terminating",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// A typed, reason-coded status entry. Unique by `type` within a status.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,
    /// Machine-readable reason in CamelCase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Generation the condition was computed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// Last time `status` flipped (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// Reference to one key of a Secret in the same namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub struct SecretKeyRef {
    pub name: String,
    pub key: String,
}

/// Reference to one key of a ConfigMap in the same namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub struct ConfigMapKeyRef {
    pub name: String,
    pub key: String,
}

/// Reference to another managed resource in the same namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub struct LocalRef {
    pub name: String,
}

/// Plain environment variable passed to a workload container
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct EnvVar {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// Extra labels and annotations for a generated object.
/// Keys generated by the operator win over user-supplied ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct MetadataOverrides {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Per-child metadata overrides for workload kinds
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<MetadataOverrides>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<MetadataOverrides>,
}

/// Schema for raw pod template overrides.
///
/// The payload is kept as untyped JSON so that absent fields stay absent; it is
/// parsed against `PodTemplateSpec` at reconcile time.
pub(crate) fn pod_template_schema(_gen: &mut SchemaGenerator) -> Schema {
    schemars::json_schema!({
        "type": "object",
        "nullable": true,
        "description": "Partial PodTemplateSpec merged over the generated pod template. Containers, volumes and env are merged by name.",
        "x-kubernetes-preserve-unknown-fields": true
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_serializes_camel_case_without_empty_fields() {
        let condition = Condition {
            r#type: "Ready".to_string(),
            status: ConditionStatus::True,
            reason: Some("AllReady".to_string()),
            message: None,
            observed_generation: Some(3),
            last_transition_time: None,
        };
        let value = serde_json::to_value(&condition).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "Ready",
                "status": "True",
                "reason": "AllReady",
                "observedGeneration": 3
            })
        );
    }

    #[test]
    fn test_phase_round_trips_as_plain_string() {
        let value = serde_json::to_value(Phase::Terminating).unwrap();
        assert_eq!(value, serde_json::json!("Terminating"));
        assert_eq!(Phase::Terminating.to_string(), "Terminating");
    }
}

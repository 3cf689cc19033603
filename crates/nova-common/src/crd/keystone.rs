//! KeystoneEndpoint CRD mirror
//!
//! The endpoint catalog entry is owned by the keystone operator. Several
//! services may register against the same entry, so the NovaAPI never sets
//! an owner reference on it; it only adds its finalizer token.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Catalog registration of a service's endpoints
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "keystone.openstack.org",
    version = "v1beta1",
    kind = "KeystoneEndpoint",
    plural = "keystoneendpoints",
    namespaced,
    status = "KeystoneEndpointStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct KeystoneEndpointSpec {
    /// Catalog service name
    pub service_name: String,

    /// URL per logical endpoint
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
}

/// Condition as written by the keystone operator
///
/// Its condition types and reasons are not ours, so they stay strings.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogCondition {
    /// Condition type, e.g. `Ready` or `KeystoneServiceOSEndpointsReady`
    #[serde(rename = "type")]
    pub type_: String,

    /// `True`, `False` or `Unknown`
    pub status: String,

    /// Machine-readable reason
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// Severity of a False condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,

    /// Last time the condition transitioned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl CatalogCondition {
    /// A condition of `type_` with `status`
    pub fn new(type_: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            type_: type_.into(),
            status: status.into(),
            ..Default::default()
        }
    }
}

/// Catalog-side state of the registration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KeystoneEndpointStatus {
    /// Conditions reported by the keystone operator
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<CatalogCondition>,

    /// Service id assigned by keystone
    #[serde(default, rename = "serviceID", skip_serializing_if = "String::is_empty")]
    pub service_id: String,
}

impl KeystoneEndpointStatus {
    /// Whether the keystone operator reports the registration ready
    pub fn is_ready(&self) -> bool {
        self.conditions
            .iter()
            .any(|c| c.type_ == "Ready" && c.status == "True")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_requires_true_ready_condition() {
        let mut status = KeystoneEndpointStatus::default();
        assert!(!status.is_ready());

        status.conditions.push(CatalogCondition::new("Ready", "False"));
        assert!(!status.is_ready());

        status.conditions[0].status = "True".to_string();
        assert!(status.is_ready());
    }

    /// Story: A status written by the keystone operator parses, foreign condition types included
    #[test]
    fn story_keystone_operator_status_deserializes() {
        let entry: KeystoneEndpoint = serde_json::from_value(serde_json::json!({
            "apiVersion": "keystone.openstack.org/v1beta1",
            "kind": "KeystoneEndpoint",
            "metadata": {"name": "nova", "namespace": "openstack", "finalizers": ["nova-api"]},
            "spec": {
                "serviceName": "nova",
                "endpoints": {"internal": "http://nova-internal.openstack.svc:8774/v2.1"}
            },
            "status": {
                "conditions": [
                    {
                        "type": "Ready",
                        "status": "True",
                        "reason": "Ready",
                        "message": "Setup complete",
                        "lastTransitionTime": "2024-05-02T10:11:12Z"
                    },
                    {
                        "type": "KeystoneServiceOSEndpointsReady",
                        "status": "True",
                        "reason": "Ready",
                        "message": "KeystoneServiceOSEndpoints completed",
                        "lastTransitionTime": "2024-05-02T10:11:12Z"
                    },
                    {
                        "type": "KeystoneServiceReady",
                        "status": "False",
                        "severity": "Warning",
                        "reason": "Error",
                        "lastTransitionTime": "2024-05-02T10:11:12Z"
                    }
                ],
                "endpointId": {"internal": 3, "public": 4},
                "hash": {"input": "n5c8h"},
                "observedGeneration": 2,
                "serviceID": "b7f3a5c9"
            }
        }))
        .unwrap();

        let status = entry.status.unwrap();
        assert!(status.is_ready());
        assert_eq!(status.service_id, "b7f3a5c9");
        assert_eq!(status.conditions[1].type_, "KeystoneServiceOSEndpointsReady");
        assert_eq!(status.conditions[2].severity.as_deref(), Some("Warning"));
    }

    #[test]
    fn not_ready_while_only_subordinate_conditions_are_true() {
        let status = KeystoneEndpointStatus {
            conditions: vec![
                CatalogCondition::new("KeystoneServiceOSEndpointsReady", "True"),
                CatalogCondition::new("Ready", "Unknown"),
            ],
            ..Default::default()
        };
        assert!(!status.is_ready());
    }
}

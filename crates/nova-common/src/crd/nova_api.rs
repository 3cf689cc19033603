//! NovaAPI CRD types
//!
//! Desired state of one nova-api deployment: image, replicas, the secrets
//! it reads credentials from, network attachments, and how each logical
//! endpoint is exposed.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::condition::ConditionSet;
use crate::Error;

// =============================================================================
// Endpoints
// =============================================================================

/// Logical API endpoint
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    /// Reachable from outside the cluster
    Public,
    /// Reachable from the control plane network
    Internal,
}

impl Endpoint {
    /// Both endpoints, in the order they are exposed
    pub const ALL: [Endpoint; 2] = [Endpoint::Public, Endpoint::Internal];

    /// Wire name of this endpoint
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to expose an endpoint through a load balancer instead of a route
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalEndpoint {
    /// Which endpoint this applies to
    pub endpoint: Endpoint,

    /// Address pool the load balancer allocates from
    pub ip_address_pool: String,

    /// Specific addresses to request from the pool
    #[serde(default, rename = "loadBalancerIPs")]
    pub load_balancer_ips: Vec<String>,
}

// =============================================================================
// Secret selectors
// =============================================================================

/// Keys to read from the service secret
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PasswordSelectors {
    /// Key holding the service user password
    #[serde(default = "default_service_selector")]
    pub service: String,

    /// Key holding the API database password
    #[serde(default = "default_api_database_selector")]
    pub api_database: String,

    /// Key holding the cell0 database password
    #[serde(default = "default_cell_database_selector")]
    pub cell_database: String,
}

impl Default for PasswordSelectors {
    fn default() -> Self {
        Self {
            service: default_service_selector(),
            api_database: default_api_database_selector(),
            cell_database: default_cell_database_selector(),
        }
    }
}

impl PasswordSelectors {
    /// Selected keys in fixed order
    pub fn keys(&self) -> [&str; 3] {
        [&self.service, &self.api_database, &self.cell_database]
    }
}

fn default_service_selector() -> String {
    "NovaPassword".to_string()
}

fn default_api_database_selector() -> String {
    "NovaAPIDatabasePassword".to_string()
}

fn default_cell_database_selector() -> String {
    "NovaCell0DatabasePassword".to_string()
}

/// Debug switches
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DebugSpec {
    /// Keep the pods idle instead of starting the service
    #[serde(default)]
    pub stop_service: bool,
}

// =============================================================================
// CRD
// =============================================================================

/// Desired state of the nova-api service
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "nova.openstack.org",
    version = "v1beta1",
    kind = "NovaAPI",
    plural = "novaapis",
    namespaced,
    status = "NovaAPIStatus",
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NovaAPISpec {
    /// Service container image
    pub container_image: String,

    /// Number of API replicas
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Secret holding the service and database passwords
    pub secret: String,

    /// Which keys of `secret` hold which password
    #[serde(default)]
    pub password_selectors: PasswordSelectors,

    /// Secret holding the message bus `transport_url`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_bus_secret_name: Option<String>,

    /// Keystone user the service authenticates as
    #[serde(default = "default_service_user")]
    pub service_user: String,

    /// Internal keystone URL
    #[serde(default, rename = "keystoneAuthURL")]
    pub keystone_auth_url: String,

    /// Public keystone URL
    #[serde(default, rename = "keystonePublicAuthURL")]
    pub keystone_public_auth_url: String,

    /// Hostname of the API database
    #[serde(default)]
    pub api_database_hostname: String,

    /// Username for the API database
    #[serde(default = "default_api_database_user")]
    pub api_database_user: String,

    /// Hostname of the cell0 database
    #[serde(default)]
    pub cell0_database_hostname: String,

    /// Username for the cell0 database
    #[serde(default = "default_cell0_database_user")]
    pub cell0_database_user: String,

    /// Free-form config appended as the override document
    #[serde(default)]
    pub custom_service_config: String,

    /// Extra config documents published alongside the rendered ones
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub default_config_overwrite: BTreeMap<String, String>,

    /// NetworkAttachmentDefinition names the pods attach to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network_attachments: Vec<String>,

    /// Endpoints exposed through a load balancer
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_endpoints: Vec<ExternalEndpoint>,

    /// Debug switches
    #[serde(default)]
    pub debug: DebugSpec,

    /// Node selector for the API pods
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
}

impl Default for NovaAPISpec {
    fn default() -> Self {
        Self {
            container_image: String::new(),
            replicas: default_replicas(),
            secret: String::new(),
            password_selectors: PasswordSelectors::default(),
            message_bus_secret_name: None,
            service_user: default_service_user(),
            keystone_auth_url: String::new(),
            keystone_public_auth_url: String::new(),
            api_database_hostname: String::new(),
            api_database_user: default_api_database_user(),
            cell0_database_hostname: String::new(),
            cell0_database_user: default_cell0_database_user(),
            custom_service_config: String::new(),
            default_config_overwrite: BTreeMap::new(),
            network_attachments: Vec::new(),
            external_endpoints: Vec::new(),
            debug: DebugSpec::default(),
            node_selector: BTreeMap::new(),
        }
    }
}

fn default_replicas() -> i32 {
    1
}

fn default_service_user() -> String {
    "nova".to_string()
}

fn default_api_database_user() -> String {
    "nova_api".to_string()
}

fn default_cell0_database_user() -> String {
    "nova_cell0".to_string()
}

impl NovaAPISpec {
    /// Structural checks the schema cannot express
    pub fn validate(&self, resource: &str) -> Result<(), Error> {
        if self.replicas < 0 {
            return Err(Error::validation_for_field(
                resource,
                "spec.replicas",
                format!("must be >= 0, got {}", self.replicas),
            ));
        }
        if self.container_image.trim().is_empty() {
            return Err(Error::validation_for_field(
                resource,
                "spec.containerImage",
                "must not be empty",
            ));
        }
        for (i, ep) in self.external_endpoints.iter().enumerate() {
            if self.external_endpoints[..i]
                .iter()
                .any(|other| other.endpoint == ep.endpoint)
            {
                return Err(Error::validation_for_field(
                    resource,
                    "spec.externalEndpoints",
                    format!("endpoint '{}' listed more than once", ep.endpoint),
                ));
            }
            if ep.ip_address_pool.is_empty() {
                return Err(Error::validation_for_field(
                    resource,
                    "spec.externalEndpoints",
                    format!("endpoint '{}' has no ipAddressPool", ep.endpoint),
                ));
            }
        }
        Ok(())
    }
}

/// Observed state of the nova-api service
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NovaAPIStatus {
    /// Input fingerprints by hash kind
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hash: BTreeMap<String, String>,

    /// Ready replicas of the StatefulSet
    #[serde(default)]
    pub ready_count: i32,

    /// Service id assigned by the endpoint catalog
    #[serde(default, rename = "serviceID", skip_serializing_if = "String::is_empty")]
    pub service_id: String,

    /// URL per logical endpoint
    #[serde(default, rename = "apiEndpoints", skip_serializing_if = "BTreeMap::is_empty")]
    pub api_endpoints: BTreeMap<String, String>,

    /// IPs per `<namespace>/<attachment>`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub network_attachments: BTreeMap<String, Vec<String>>,

    /// Condition set
    #[serde(default)]
    pub conditions: ConditionSet,

    /// Generation last reconciled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_from_yaml(yaml: &str) -> NovaAPISpec {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn defaults_fill_in_optional_fields() {
        let spec = spec_from_yaml(
            r#"
containerImage: quay.io/podified/nova-api:current
secret: osp-secret
"#,
        );
        assert_eq!(spec.replicas, 1);
        assert_eq!(spec.password_selectors.service, "NovaPassword");
        assert_eq!(spec.service_user, "nova");
        assert!(spec.network_attachments.is_empty());
        assert!(spec.validate("novaapi/x").is_ok());
    }

    #[test]
    fn default_matches_wire_defaults() {
        let spec = spec_from_yaml("containerImage: \"\"\nsecret: \"\"\n");
        assert_eq!(spec, NovaAPISpec::default());
    }

    #[test]
    fn external_endpoints_use_camel_case_wire_names() {
        let spec = spec_from_yaml(
            r#"
containerImage: img
secret: s
externalEndpoints:
  - endpoint: internal
    ipAddressPool: osp-internalapi
    loadBalancerIPs: [internal-lb-ip-1, internal-lb-ip-2]
"#,
        );
        let ep = &spec.external_endpoints[0];
        assert_eq!(ep.endpoint, Endpoint::Internal);
        assert_eq!(ep.ip_address_pool, "osp-internalapi");
        assert_eq!(ep.load_balancer_ips.len(), 2);
    }

    #[test]
    fn duplicate_external_endpoint_is_rejected() {
        let spec = spec_from_yaml(
            r#"
containerImage: img
secret: s
externalEndpoints:
  - {endpoint: public, ipAddressPool: a}
  - {endpoint: public, ipAddressPool: b}
"#,
        );
        let err = spec.validate("novaapi/x").unwrap_err();
        assert_eq!(err.field(), Some("spec.externalEndpoints"));
    }

    #[test]
    fn negative_replicas_are_rejected() {
        let mut spec = spec_from_yaml("containerImage: img\nsecret: s\n");
        spec.replicas = -1;
        assert_eq!(
            spec.validate("novaapi/x").unwrap_err().field(),
            Some("spec.replicas")
        );
    }

    /// Story: A brand-new status serializes to almost nothing
    #[test]
    fn story_empty_status_omits_maps() {
        let json = serde_json::to_value(NovaAPIStatus::default()).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("hash"));
        assert!(!obj.contains_key("apiEndpoints"));
        assert!(!obj.contains_key("serviceID"));
        assert!(!obj.contains_key("networkAttachments"));
        assert_eq!(obj["readyCount"], 0);
    }
}

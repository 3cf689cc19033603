//! Child object construction
//!
//! Pure functions turning a NovaAPI (plus values computed during the pass)
//! into the Kubernetes objects the clients apply. Every child carries the
//! `service`/`owner` labels and a controller owner reference to the NovaAPI.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ExecAction, HTTPGetAction, KeyToPath, PodSpec,
    PodTemplateSpec, Probe, Service, ServicePort, ServiceSpec as CoreServiceSpec, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::core::{ApiResource, GroupVersionKind};
use kube::{Resource, ResourceExt};
use serde_json::json;

use nova_common::crd::network::{
    NetworkSelectionElement, NAD_GROUP, NAD_KIND, NAD_VERSION, NETWORKS_ANNOTATION,
};
use nova_common::crd::{Endpoint, NovaAPI};
use nova_common::{
    Error, NOVA_API_PORT, NOVA_API_SERVICE, OWNER_LABEL_KEY, SERVICE_LABEL_KEY,
};

use crate::config::{BASE_CONFIG_KEY, LOGGING_CONFIG_KEY, OVERRIDE_CONFIG_KEY};
use crate::exposure::{service_name, Exposure};

/// Pod template annotation carrying the input fingerprint
pub const CONFIG_HASH_ANNOTATION: &str = "nova.openstack.org/config-hash";

/// Label distinguishing the public and internal services
pub const ENDPOINT_LABEL_KEY: &str = "endpoint";

const CONFIG_VOLUME: &str = "config-data";
const CONFIG_CUSTOM_VOLUME: &str = "config-data-custom";
const CONFIG_MOUNT_PATH: &str = "/var/lib/openstack/config";
const CONFIG_CUSTOM_MOUNT_PATH: &str = "/var/lib/openstack/config-custom";
const SERVICE_COMMAND: &str = "/usr/local/bin/kolla_start";
const LOG_FILE: &str = "/var/log/nova/nova-api.log";

// =============================================================================
// Owner
// =============================================================================

/// Identity of the NovaAPI that owns a child
#[derive(Clone, Debug, PartialEq)]
pub struct Owner {
    /// NovaAPI name
    pub name: String,
    /// NovaAPI namespace
    pub namespace: String,
    /// Controller owner reference, absent for objects without a uid
    pub reference: Option<OwnerReference>,
}

impl Owner {
    /// Owner identity of `nova`
    pub fn of(nova: &NovaAPI) -> Self {
        Self {
            name: nova.name_any(),
            namespace: nova.namespace().unwrap_or_default(),
            reference: nova.controller_owner_ref(&()),
        }
    }

    /// Labels put on every child
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (SERVICE_LABEL_KEY.to_string(), NOVA_API_SERVICE.to_string()),
            (OWNER_LABEL_KEY.to_string(), self.name.clone()),
        ])
    }

    /// Label selector matching every child
    pub fn selector(&self) -> String {
        format!(
            "{SERVICE_LABEL_KEY}={NOVA_API_SERVICE},{OWNER_LABEL_KEY}={}",
            self.name
        )
    }

    fn metadata(&self, name: impl Into<String>) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.into()),
            namespace: Some(self.namespace.clone()),
            labels: Some(self.labels()),
            owner_references: self.reference.clone().map(|r| vec![r]),
            ..Default::default()
        }
    }
}

// =============================================================================
// ConfigMap
// =============================================================================

/// Name of the rendered config map
pub fn config_map_name(owner_name: &str) -> String {
    format!("{owner_name}-config-data")
}

/// Config map holding the rendered documents
pub fn config_map(owner: &Owner, documents: &BTreeMap<String, String>) -> ConfigMap {
    ConfigMap {
        metadata: owner.metadata(config_map_name(&owner.name)),
        data: Some(documents.clone()),
        ..Default::default()
    }
}

// =============================================================================
// StatefulSet
// =============================================================================

/// Desired shape of the API StatefulSet
#[derive(Clone, Debug, PartialEq)]
pub struct WorkloadSpec {
    /// Owning NovaAPI
    pub owner: Owner,
    /// Container image
    pub image: String,
    /// Replica count
    pub replicas: i32,
    /// Input fingerprint, rolls the pods on change
    pub config_hash: String,
    /// Config map keys mounted as service config, override excluded
    pub config_documents: Vec<String>,
    /// Requested network attachments
    pub networks: Vec<NetworkSelectionElement>,
    /// Keep the containers idle
    pub stop_service: bool,
    /// Node selector
    pub node_selector: BTreeMap<String, String>,
}

impl WorkloadSpec {
    /// Workload for `nova` with the given input fingerprint
    pub fn for_nova(nova: &NovaAPI, config_hash: &str) -> Self {
        let owner = Owner::of(nova);
        let networks = nova
            .spec
            .network_attachments
            .iter()
            .map(|name| NetworkSelectionElement {
                name: name.clone(),
                namespace: owner.namespace.clone(),
            })
            .collect();
        let config_documents: BTreeSet<String> = [BASE_CONFIG_KEY, LOGGING_CONFIG_KEY]
            .into_iter()
            .map(str::to_string)
            .chain(nova.spec.default_config_overwrite.keys().cloned())
            .filter(|key| key != OVERRIDE_CONFIG_KEY)
            .collect();
        Self {
            owner,
            image: nova.spec.container_image.clone(),
            replicas: nova.spec.replicas,
            config_hash: config_hash.to_string(),
            config_documents: config_documents.into_iter().collect(),
            networks,
            stop_service: nova.spec.debug.stop_service,
            node_selector: nova.spec.node_selector.clone(),
        }
    }
}

/// Value of the multus networks annotation, `None` when nothing is requested
pub fn network_annotation(networks: &[NetworkSelectionElement]) -> Result<Option<String>, Error> {
    if networks.is_empty() {
        return Ok(None);
    }
    serde_json::to_string(networks)
        .map(Some)
        .map_err(|e| Error::serialization_for_kind("NetworkSelectionElement", e.to_string()))
}

fn probe(stop_service: bool) -> Probe {
    let mut probe = Probe {
        timeout_seconds: Some(5),
        period_seconds: Some(10),
        initial_delay_seconds: Some(5),
        ..Default::default()
    };
    if stop_service {
        probe.exec = Some(ExecAction {
            command: Some(vec!["/bin/true".to_string()]),
        });
    } else {
        probe.http_get = Some(HTTPGetAction {
            path: Some("/".to_string()),
            port: IntOrString::Int(NOVA_API_PORT),
            ..Default::default()
        });
    }
    probe
}

fn container(name: &str, spec: &WorkloadSpec, command: Vec<String>) -> Container {
    Container {
        name: name.to_string(),
        image: Some(spec.image.clone()),
        command: Some(command),
        volume_mounts: Some(vec![
            VolumeMount {
                name: CONFIG_VOLUME.to_string(),
                mount_path: CONFIG_MOUNT_PATH.to_string(),
                read_only: Some(true),
                ..Default::default()
            },
            VolumeMount {
                name: CONFIG_CUSTOM_VOLUME.to_string(),
                mount_path: CONFIG_CUSTOM_MOUNT_PATH.to_string(),
                read_only: Some(true),
                ..Default::default()
            },
        ]),
        liveness_probe: Some(probe(spec.stop_service)),
        readiness_probe: Some(probe(spec.stop_service)),
        ..Default::default()
    }
}

fn key_to_path(key: &str) -> KeyToPath {
    KeyToPath {
        key: key.to_string(),
        path: key.to_string(),
        ..Default::default()
    }
}

fn config_volumes(spec: &WorkloadSpec) -> Vec<Volume> {
    let cm = config_map_name(&spec.owner.name);
    vec![
        Volume {
            name: CONFIG_VOLUME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: cm.clone(),
                items: Some(spec.config_documents.iter().map(|k| key_to_path(k)).collect()),
                ..Default::default()
            }),
            ..Default::default()
        },
        Volume {
            name: CONFIG_CUSTOM_VOLUME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: cm,
                items: Some(vec![key_to_path(OVERRIDE_CONFIG_KEY)]),
                ..Default::default()
            }),
            ..Default::default()
        },
    ]
}

/// StatefulSet running the API
pub fn stateful_set(spec: &WorkloadSpec) -> Result<StatefulSet, Error> {
    let labels = spec.owner.labels();

    let mut annotations = BTreeMap::from([(
        CONFIG_HASH_ANNOTATION.to_string(),
        spec.config_hash.clone(),
    )]);
    if let Some(networks) = network_annotation(&spec.networks)? {
        annotations.insert(NETWORKS_ANNOTATION.to_string(), networks);
    }

    let idle = vec!["/bin/sleep".to_string(), "infinity".to_string()];
    let (api_command, log_command) = if spec.stop_service {
        (idle.clone(), idle)
    } else {
        (
            vec![SERVICE_COMMAND.to_string()],
            vec![
                "/usr/bin/tail".to_string(),
                "-n+1".to_string(),
                "-F".to_string(),
                LOG_FILE.to_string(),
            ],
        )
    };

    Ok(StatefulSet {
        metadata: spec.owner.metadata(spec.owner.name.clone()),
        spec: Some(StatefulSetSpec {
            replicas: Some(spec.replicas),
            service_name: spec.owner.name.clone(),
            pod_management_policy: Some("Parallel".to_string()),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    annotations: Some(annotations),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![
                        container("nova-api-log", spec, log_command),
                        container("nova-api", spec, api_command),
                    ],
                    volumes: Some(config_volumes(spec)),
                    node_selector: (!spec.node_selector.is_empty())
                        .then(|| spec.node_selector.clone()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Ready replicas reported by a StatefulSet
pub fn ready_replicas(sts: &StatefulSet) -> i32 {
    sts.status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0)
}

// =============================================================================
// Service and Route
// =============================================================================

/// Desired shape of one endpoint's service
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceSpec {
    /// Owning NovaAPI
    pub owner: Owner,
    /// Which endpoint
    pub endpoint: Endpoint,
    /// How the endpoint is reachable
    pub exposure: Exposure,
}

/// Service for one endpoint
pub fn service(spec: &ServiceSpec) -> Service {
    let name = service_name(spec.endpoint);
    let mut metadata = spec.owner.metadata(name.clone());
    if let Some(labels) = metadata.labels.as_mut() {
        labels.insert(ENDPOINT_LABEL_KEY.to_string(), spec.endpoint.to_string());
    }
    let annotations = spec.exposure.annotations();
    if !annotations.is_empty() {
        metadata.annotations = Some(annotations);
    }

    let type_ = match spec.exposure {
        Exposure::Routed => "ClusterIP",
        Exposure::LoadBalanced { .. } => "LoadBalancer",
    };

    Service {
        metadata,
        spec: Some(CoreServiceSpec {
            type_: Some(type_.to_string()),
            selector: Some(spec.owner.labels()),
            ports: Some(vec![ServicePort {
                name: Some(name),
                port: NOVA_API_PORT,
                target_port: Some(IntOrString::Int(NOVA_API_PORT)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// ApiResource of OpenShift routes
pub fn route_api_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk("route.openshift.io", "v1", "Route"))
}

/// ApiResource of NetworkAttachmentDefinitions
pub fn nad_api_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk(NAD_GROUP, NAD_VERSION, NAD_KIND),
        "network-attachment-definitions",
    )
}

/// Route object for one endpoint, as JSON for a dynamic apply
pub fn route(owner: &Owner, endpoint: Endpoint) -> serde_json::Value {
    let name = service_name(endpoint);
    let ar = route_api_resource();
    let mut labels = owner.labels();
    labels.insert(ENDPOINT_LABEL_KEY.to_string(), endpoint.to_string());
    json!({
        "apiVersion": ar.api_version,
        "kind": ar.kind,
        "metadata": {
            "name": name,
            "namespace": owner.namespace,
            "labels": labels,
            "ownerReferences": owner.reference.iter().collect::<Vec<_>>(),
        },
        "spec": {
            "to": { "kind": "Service", "name": name },
            "port": { "targetPort": name },
        }
    })
}

/// Admitted host of a route object, if any
pub fn route_host(route: &serde_json::Value) -> Option<String> {
    ["/spec/host", "/status/ingress/0/host"]
        .iter()
        .filter_map(|path| route.pointer(path).and_then(|h| h.as_str()))
        .find(|h| !h.is_empty())
        .map(str::to_string)
}

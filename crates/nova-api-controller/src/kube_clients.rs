//! kube-rs implementations of the collaborator traits

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret, Service};
use kube::api::{
    Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams, Preconditions,
};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::{Client, Resource, ResourceExt};
use serde_json::json;
use tracing::{debug, info, warn};

use nova_common::crd::network::{NetworkStatus, NETWORK_STATUS_ANNOTATION};
use nova_common::crd::{KeystoneEndpoint, KeystoneEndpointSpec, NovaAPI, NovaAPIStatus};
use nova_common::error::{is_conflict, is_not_found};
use nova_common::Error;

use crate::builders::{
    self, nad_api_resource, route_api_resource, route_host, Owner, ServiceSpec, WorkloadSpec,
};
use crate::clients::{
    EndpointCatalogClient, EndpointRegistration, NetworkObjectClient, NovaApiClient,
    PodInspector, RegistrationStatus, SecretData, SecretResolver, WorkloadClient,
};
use crate::exposure::service_name;
use crate::network::PodInterfaces;

fn apply_params(field_manager: &str) -> PatchParams {
    PatchParams::apply(field_manager).force()
}

/// Treat 404 on delete as success
fn ignore_not_found<T>(result: Result<T, kube::Error>) -> Result<(), Error> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if is_not_found(&e) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

// =============================================================================
// Secrets
// =============================================================================

/// Reads secrets from the API server
pub struct KubeSecretResolver {
    client: Client,
}

impl KubeSecretResolver {
    /// Create a resolver
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretResolver for KubeSecretResolver {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<SecretData>, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let Some(secret) = api.get_opt(name).await? else {
            return Ok(None);
        };
        let data = secret
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k, v.0))
            .collect();
        Ok(Some(data))
    }
}

// =============================================================================
// Workload
// =============================================================================

/// Applies the config map and StatefulSet
pub struct KubeWorkloadClient {
    client: Client,
    field_manager: String,
}

impl KubeWorkloadClient {
    /// Create a workload client applying as `field_manager`
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }
}

#[async_trait]
impl WorkloadClient for KubeWorkloadClient {
    async fn ensure_config_map(
        &self,
        owner: &Owner,
        documents: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        let cm = builders::config_map(owner, documents);
        let name = builders::config_map_name(&owner.name);
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &owner.namespace);
        api.patch(&name, &apply_params(&self.field_manager), &Patch::Apply(&cm))
            .await?;
        debug!(configmap = %name, documents = documents.len(), "applied config map");
        Ok(())
    }

    async fn ensure_stateful_workload(&self, spec: &WorkloadSpec) -> Result<i32, Error> {
        let sts = builders::stateful_set(spec)?;
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), &spec.owner.namespace);
        let applied = api
            .patch(
                &spec.owner.name,
                &apply_params(&self.field_manager),
                &Patch::Apply(&sts),
            )
            .await?;
        Ok(builders::ready_replicas(&applied))
    }

    async fn delete_children(&self, owner: &Owner) -> Result<(), Error> {
        let ns = &owner.namespace;
        let lp = ListParams::default().labels(&owner.selector());
        let dp = DeleteParams::default();

        let routes: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), ns, &route_api_resource());
        ignore_not_found(routes.delete_collection(&dp, &lp).await)?;

        let services: Api<Service> = Api::namespaced(self.client.clone(), ns);
        for svc in services.list(&lp).await? {
            ignore_not_found(services.delete(&svc.name_any(), &dp).await)?;
        }

        let statefulsets: Api<StatefulSet> = Api::namespaced(self.client.clone(), ns);
        ignore_not_found(statefulsets.delete_collection(&dp, &lp).await)?;

        let config_maps: Api<ConfigMap> = Api::namespaced(self.client.clone(), ns);
        ignore_not_found(config_maps.delete_collection(&dp, &lp).await)?;

        info!(owner = %owner.name, namespace = %ns, "deleted owned children");
        Ok(())
    }
}

// =============================================================================
// Network objects
// =============================================================================

/// Applies services and routes, checks attachment definitions
pub struct KubeNetworkClient {
    client: Client,
    field_manager: String,
}

impl KubeNetworkClient {
    /// Create a network client applying as `field_manager`
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }
}

#[async_trait]
impl NetworkObjectClient for KubeNetworkClient {
    async fn ensure_service(&self, spec: &ServiceSpec) -> Result<(), Error> {
        let svc = builders::service(spec);
        let name = service_name(spec.endpoint);
        let api: Api<Service> = Api::namespaced(self.client.clone(), &spec.owner.namespace);
        api.patch(&name, &apply_params(&self.field_manager), &Patch::Apply(&svc))
            .await?;
        Ok(())
    }

    async fn ensure_route(&self, spec: &ServiceSpec) -> Result<Option<String>, Error> {
        let route = builders::route(&spec.owner, spec.endpoint);
        let name = service_name(spec.endpoint);
        let api: Api<DynamicObject> = Api::namespaced_with(
            self.client.clone(),
            &spec.owner.namespace,
            &route_api_resource(),
        );
        let applied = api
            .patch(&name, &apply_params(&self.field_manager), &Patch::Apply(&route))
            .await?;
        let value = serde_json::to_value(&applied)
            .map_err(|e| Error::serialization_for_kind("Route", e.to_string()))?;
        Ok(route_host(&value))
    }

    async fn delete_route(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &route_api_resource());
        ignore_not_found(api.delete(name, &DeleteParams::default()).await)
    }

    async fn network_attachment_exists(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<bool, Error> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &nad_api_resource());
        Ok(api.get_opt(name).await?.is_some())
    }
}

// =============================================================================
// Endpoint catalog
// =============================================================================

/// Manages the shared KeystoneEndpoint entry
pub struct KubeEndpointCatalog {
    client: Client,
}

impl KubeEndpointCatalog {
    /// Create a catalog client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn catalog_ref(name: &str) -> String {
    format!("keystoneendpoint/{name}")
}

/// Delete that only succeeds while the entry is still at `resource_version`
fn unowned_delete_params(resource_version: Option<String>) -> DeleteParams {
    DeleteParams {
        preconditions: Some(Preconditions {
            resource_version,
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn registration_status(entry: &KeystoneEndpoint) -> RegistrationStatus {
    entry
        .status
        .as_ref()
        .map(|s| RegistrationStatus {
            ready: s.is_ready(),
            service_id: s.service_id.clone(),
        })
        .unwrap_or_default()
}

#[async_trait]
impl EndpointCatalogClient for KubeEndpointCatalog {
    async fn ensure_endpoint_registration(
        &self,
        registration: &EndpointRegistration,
    ) -> Result<RegistrationStatus, Error> {
        let api: Api<KeystoneEndpoint> =
            Api::namespaced(self.client.clone(), &registration.namespace);
        let desired = KeystoneEndpointSpec {
            service_name: registration.service_name.clone(),
            endpoints: registration.endpoints.clone(),
        };
        let conflict =
            || Error::ownership_conflict(catalog_ref(&registration.name), &registration.owner_token);

        let Some(existing) = api.get_opt(&registration.name).await? else {
            let mut entry = KeystoneEndpoint::new(&registration.name, desired);
            entry.meta_mut().namespace = Some(registration.namespace.clone());
            entry.meta_mut().finalizers = Some(vec![registration.owner_token.clone()]);
            return match api.create(&PostParams::default(), &entry).await {
                Ok(created) => {
                    info!(entry = %registration.name, "created endpoint catalog entry");
                    Ok(registration_status(&created))
                }
                Err(e) if is_conflict(&e) => Err(conflict()),
                Err(e) => Err(e.into()),
            };
        };

        let has_token = existing.finalizers().contains(&registration.owner_token);
        if has_token && existing.spec == desired {
            return Ok(registration_status(&existing));
        }

        // resourceVersion from the read makes the replace a compare-and-update
        let mut updated = existing.clone();
        updated.spec = desired;
        if !has_token {
            updated
                .finalizers_mut()
                .push(registration.owner_token.clone());
        }
        match api
            .replace(&registration.name, &PostParams::default(), &updated)
            .await
        {
            Ok(replaced) => Ok(registration_status(&replaced)),
            Err(e) if is_conflict(&e) => Err(conflict()),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_owner_token(
        &self,
        namespace: &str,
        name: &str,
        token: &str,
    ) -> Result<(), Error> {
        let api: Api<KeystoneEndpoint> = Api::namespaced(self.client.clone(), namespace);
        let Some(existing) = api.get_opt(name).await? else {
            return Ok(());
        };
        if !existing.finalizers().iter().any(|f| f == token) {
            return Ok(());
        }

        let mut updated = existing.clone();
        updated.finalizers_mut().retain(|f| f != token);
        let remaining = updated.finalizers().len();
        let conflict = || Error::ownership_conflict(catalog_ref(name), token);
        let replaced = match api.replace(name, &PostParams::default(), &updated).await {
            Ok(replaced) => replaced,
            Err(e) if is_conflict(&e) => return Err(conflict()),
            Err(e) => return Err(e.into()),
        };
        info!(entry = %name, token, remaining, "removed owner token from endpoint catalog entry");

        if remaining == 0 {
            // Another owner registering after the replace bumps the version
            let dp = unowned_delete_params(replaced.resource_version());
            match api.delete(name, &dp).await {
                Ok(_) => info!(entry = %name, "deleted endpoint catalog entry without owners"),
                Err(e) if is_conflict(&e) => return Err(conflict()),
                Err(e) if is_not_found(&e) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

// =============================================================================
// Pods
// =============================================================================

/// Reads multus network-status annotations from pods
pub struct KubePodInspector {
    client: Client,
}

impl KubePodInspector {
    /// Create a pod inspector
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Interfaces reported in a pod's network-status annotation
pub fn pod_interfaces(pod: &Pod) -> PodInterfaces {
    let mut ips: BTreeMap<String, Vec<String>> = BTreeMap::new();
    if let Some(raw) = pod.annotations().get(NETWORK_STATUS_ANNOTATION) {
        match serde_json::from_str::<Vec<NetworkStatus>>(raw) {
            Ok(statuses) => {
                for status in statuses {
                    ips.entry(status.name).or_default().extend(status.ips);
                }
            }
            Err(e) => warn!(pod = %pod.name_any(), error = %e, "unparseable network-status annotation"),
        }
    }
    PodInterfaces {
        pod: pod.name_any(),
        ready: pod_ready(pod),
        ips,
    }
}

/// Whether the pod's Ready condition is True
fn pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

#[async_trait]
impl PodInspector for KubePodInspector {
    async fn list_pod_interface_ips(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<PodInterfaces>, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api.list(&ListParams::default().labels(selector)).await?;
        let mut interfaces: Vec<PodInterfaces> = pods.items.iter().map(pod_interfaces).collect();
        interfaces.sort_by(|a, b| a.pod.cmp(&b.pod));
        Ok(interfaces)
    }
}

// =============================================================================
// NovaAPI
// =============================================================================

/// Status and finalizer writes on the NovaAPI itself
pub struct KubeNovaApiClient {
    client: Client,
    field_manager: String,
    store: Option<Store<NovaAPI>>,
}

impl KubeNovaApiClient {
    /// Create a client; `store` makes deletion checks local reads
    pub fn new(client: Client, field_manager: impl Into<String>, store: Option<Store<NovaAPI>>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
            store,
        }
    }

    async fn patch_finalizers(&self, nova: &NovaAPI, finalizers: Vec<String>) -> Result<(), Error> {
        let api: Api<NovaAPI> =
            Api::namespaced(self.client.clone(), &nova.namespace().unwrap_or_default());
        // resourceVersion in a merge patch turns it into a compare-and-update
        let patch = json!({
            "metadata": {
                "finalizers": finalizers,
                "resourceVersion": nova.resource_version(),
            }
        });
        api.patch(&nova.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl NovaApiClient for KubeNovaApiClient {
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &NovaAPIStatus,
    ) -> Result<(), Error> {
        let api: Api<NovaAPI> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({
            "apiVersion": NovaAPI::api_version(&()),
            "kind": NovaAPI::kind(&()),
            "status": status,
        });
        api.patch_status(name, &apply_params(&self.field_manager), &Patch::Apply(&patch))
            .await?;
        Ok(())
    }

    async fn add_finalizer(&self, nova: &NovaAPI, finalizer: &str) -> Result<(), Error> {
        if nova.finalizers().iter().any(|f| f == finalizer) {
            return Ok(());
        }
        let mut finalizers = nova.finalizers().to_vec();
        finalizers.push(finalizer.to_string());
        self.patch_finalizers(nova, finalizers).await
    }

    async fn remove_finalizer(&self, nova: &NovaAPI, finalizer: &str) -> Result<(), Error> {
        if !nova.finalizers().iter().any(|f| f == finalizer) {
            return Ok(());
        }
        let finalizers = nova
            .finalizers()
            .iter()
            .filter(|f| *f != finalizer)
            .cloned()
            .collect();
        match self.patch_finalizers(nova, finalizers).await {
            Err(Error::Kube { source }) if is_not_found(&source) => Ok(()),
            other => other,
        }
    }

    async fn deletion_requested(&self, namespace: &str, name: &str) -> Result<bool, Error> {
        if let Some(store) = &self.store {
            if let Some(cached) = store.get(&ObjectRef::new(name).within(namespace)) {
                return Ok(cached.metadata.deletion_timestamp.is_some());
            }
        }
        let api: Api<NovaAPI> = Api::namespaced(self.client.clone(), namespace);
        Ok(match api.get_opt(name).await? {
            Some(nova) => nova.metadata.deletion_timestamp.is_some(),
            None => true,
        })
    }
}

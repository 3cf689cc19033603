//! Collaborator interfaces of the reconciliation engine
//!
//! The engine only talks to the cluster through these traits. Production
//! implementations live in [`crate::kube_clients`]; unit tests use the
//! generated mocks and the integration tests an in-memory cluster.

use std::collections::BTreeMap;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use nova_common::crd::{NovaAPI, NovaAPIStatus};
use nova_common::Error;

use crate::builders::{Owner, ServiceSpec, WorkloadSpec};
use crate::config::RenderParams;
use crate::network::PodInterfaces;

/// Secret data by key
pub type SecretData = BTreeMap<String, Vec<u8>>;

/// Resolves referenced secrets
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SecretResolver: Send + Sync {
    /// Get a secret's data, `None` if the secret does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<SecretData>, Error>;
}

/// Renders the config documents
#[cfg_attr(test, automock)]
pub trait ConfigRenderer: Send + Sync {
    /// Render every document, override text included, keyed by file name
    fn render(
        &self,
        params: &RenderParams,
        override_text: &str,
    ) -> Result<BTreeMap<String, String>, Error>;
}

/// Owned workload objects
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkloadClient: Send + Sync {
    /// Create or update the config map holding `documents`
    async fn ensure_config_map(
        &self,
        owner: &Owner,
        documents: &BTreeMap<String, String>,
    ) -> Result<(), Error>;

    /// Create or update the StatefulSet, returning its ready replica count
    async fn ensure_stateful_workload(&self, spec: &WorkloadSpec) -> Result<i32, Error>;

    /// Delete every child labelled as owned by `owner`
    async fn delete_children(&self, owner: &Owner) -> Result<(), Error>;
}

/// Services, routes and attachment definitions
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NetworkObjectClient: Send + Sync {
    /// Create or update one endpoint's service
    async fn ensure_service(&self, spec: &ServiceSpec) -> Result<(), Error>;

    /// Create or update one endpoint's route, returning its admitted host
    async fn ensure_route(&self, spec: &ServiceSpec) -> Result<Option<String>, Error>;

    /// Delete a route if it exists
    async fn delete_route(&self, namespace: &str, name: &str) -> Result<(), Error>;

    /// Whether a NetworkAttachmentDefinition exists
    async fn network_attachment_exists(&self, namespace: &str, name: &str)
        -> Result<bool, Error>;
}

/// Registration request for the shared endpoint catalog entry
#[derive(Clone, Debug, PartialEq)]
pub struct EndpointRegistration {
    /// Catalog entry namespace
    pub namespace: String,
    /// Catalog entry name
    pub name: String,
    /// Catalog service name
    pub service_name: String,
    /// Finalizer token marking this owner
    pub owner_token: String,
    /// URL per logical endpoint
    pub endpoints: BTreeMap<String, String>,
}

/// State of the catalog entry as reported by its operator
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegistrationStatus {
    /// Catalog reports the registration ready
    pub ready: bool,
    /// Service id assigned by the catalog
    pub service_id: String,
}

/// Shared endpoint catalog entry
///
/// Owner tokens are finalizers on the entry. Both operations are
/// compare-and-update: a lost race is [`Error::OwnershipConflict`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EndpointCatalogClient: Send + Sync {
    /// Create or update the entry and make sure it carries the owner token
    async fn ensure_endpoint_registration(
        &self,
        registration: &EndpointRegistration,
    ) -> Result<RegistrationStatus, Error>;

    /// Remove `token` from the entry's finalizers.
    ///
    /// A missing entry or token is success. The entry is deleted once no
    /// finalizer remains.
    async fn remove_owner_token(
        &self,
        namespace: &str,
        name: &str,
        token: &str,
    ) -> Result<(), Error>;
}

/// Pod network state
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PodInspector: Send + Sync {
    /// Interfaces reported by every pod matching `selector`
    async fn list_pod_interface_ips(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<PodInterfaces>, Error>;
}

/// The NovaAPI resource itself
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NovaApiClient: Send + Sync {
    /// Write the status subresource
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &NovaAPIStatus,
    ) -> Result<(), Error>;

    /// Add `finalizer` unless present
    async fn add_finalizer(&self, nova: &NovaAPI, finalizer: &str) -> Result<(), Error>;

    /// Remove `finalizer` if present
    async fn remove_finalizer(&self, nova: &NovaAPI, finalizer: &str) -> Result<(), Error>;

    /// Whether the resource is gone or marked for deletion
    async fn deletion_requested(&self, namespace: &str, name: &str) -> Result<bool, Error>;
}

//! NovaAPI reconciliation entry points
//!
//! `reconcile` runs one level-triggered pass: deletion goes through the
//! [`FinalizerCoordinator`], everything else through the stage
//! orchestrator. The status subresource is written only when the pass
//! changed something other than condition timestamps.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::runtime::reflector::Store;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use nova_common::crd::{NovaAPI, NovaAPIStatus};
use nova_common::error::Disposition;
use nova_common::events::{EventPublisher, KubeEventPublisher};
use nova_common::Error;

use crate::clients::{
    ConfigRenderer, EndpointCatalogClient, NetworkObjectClient, NovaApiClient, PodInspector,
    SecretResolver, WorkloadClient,
};
use crate::finalizer::FinalizerCoordinator;
use crate::kube_clients::{
    KubeEndpointCatalog, KubeNetworkClient, KubeNovaApiClient, KubePodInspector,
    KubeSecretResolver, KubeWorkloadClient,
};
use crate::orchestrator::run_pass;

/// Requeue after the finalizer was added, so the next pass sees it
const FINALIZER_ADDED_REQUEUE: Duration = Duration::from_secs(1);

/// Requeue intervals
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Periodic resync once everything is ready
    pub resync: Duration,
    /// Poll interval while waiting on a dependency or rollout
    pub waiting_requeue: Duration,
    /// Backoff after a failed operation
    pub error_requeue: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            resync: Duration::from_secs(300),
            waiting_requeue: Duration::from_secs(10),
            error_requeue: Duration::from_secs(30),
        }
    }
}

/// Shared state for every NovaAPI reconciliation
pub struct NovaApiContext {
    /// Secret lookups
    pub secrets: Arc<dyn SecretResolver>,
    /// Config document rendering
    pub renderer: Arc<dyn ConfigRenderer>,
    /// ConfigMap and StatefulSet
    pub workload: Arc<dyn WorkloadClient>,
    /// Services, routes and attachment definitions
    pub network: Arc<dyn NetworkObjectClient>,
    /// Shared KeystoneEndpoint entry
    pub catalog: Arc<dyn EndpointCatalogClient>,
    /// Pod network status
    pub pods: Arc<dyn PodInspector>,
    /// The NovaAPI resource itself
    pub nova: Arc<dyn NovaApiClient>,
    /// Event publisher for emitting Kubernetes Events
    pub events: Arc<dyn EventPublisher>,
    /// Requeue intervals
    pub config: ReconcileConfig,
}

impl NovaApiContext {
    /// Context backed by the Kubernetes API.
    ///
    /// `store` is the controller's NovaAPI cache, used to notice deletion
    /// mid-pass without an API round trip.
    pub fn new(
        client: Client,
        store: Option<Store<NovaAPI>>,
        renderer: Arc<dyn ConfigRenderer>,
        field_manager: &str,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            secrets: Arc::new(KubeSecretResolver::new(client.clone())),
            renderer,
            workload: Arc::new(KubeWorkloadClient::new(client.clone(), field_manager)),
            network: Arc::new(KubeNetworkClient::new(client.clone(), field_manager)),
            catalog: Arc::new(KubeEndpointCatalog::new(client.clone())),
            pods: Arc::new(KubePodInspector::new(client.clone())),
            nova: Arc::new(KubeNovaApiClient::new(client.clone(), field_manager, store)),
            events: Arc::new(KubeEventPublisher::new(client, field_manager)),
            config,
        }
    }
}

/// Reconcile one NovaAPI
///
/// # Returns
///
/// An `Action` indicating when to requeue, or an `Error` for failures
/// outside the stages (finalizer and status writes).
#[instrument(
    skip(nova, ctx),
    fields(novaapi = %nova.name_any(), namespace = %nova.namespace().unwrap_or_default())
)]
pub async fn reconcile(nova: Arc<NovaAPI>, ctx: Arc<NovaApiContext>) -> Result<Action, Error> {
    info!("reconciling novaapi");
    let coordinator = FinalizerCoordinator::new(&ctx, &nova);

    if nova.metadata.deletion_timestamp.is_some() {
        return finalize(&coordinator).await;
    }

    let Some(namespace) = nova.namespace() else {
        error!("NovaAPI is missing namespace");
        return Ok(Action::await_change());
    };

    if coordinator.ensure_own_finalizer().await? {
        return Ok(Action::requeue(FINALIZER_ADDED_REQUEUE));
    }

    let before = nova.status.clone().unwrap_or_default();
    let mut status = before.clone();
    status.conditions.init();

    let report = run_pass(&ctx, &nova, &mut status).await;
    if report.deletion_requested {
        return finalize(&coordinator).await;
    }
    status.observed_generation = nova.metadata.generation;

    if status_changed(&before, &status) {
        debug!(ready = status.conditions.is_ready(), "writing status");
        ctx.nova
            .patch_status(&namespace, &nova.name_any(), &status)
            .await?;
    }

    let requeue = report.requeue_after(&ctx.config);
    if status.conditions.is_ready() {
        debug!(?requeue, "novaapi ready");
    } else {
        info!(?requeue, "novaapi not ready yet");
    }
    Ok(Action::requeue(requeue))
}

/// Error policy for the NovaAPI controller
///
/// - Lost compare-and-update races: retry immediately
/// - Retryable errors: retry after the error interval
/// - Permanent errors: retry at the resync interval; a spec change
///   triggers a reconcile sooner
pub fn error_policy(nova: Arc<NovaAPI>, error: &Error, ctx: Arc<NovaApiContext>) -> Action {
    error!(
        ?error,
        novaapi = %nova.name_any(),
        retryable = error.is_retryable(),
        "reconciliation failed"
    );

    match error.disposition() {
        Disposition::Immediate => Action::requeue(Duration::ZERO),
        _ if error.is_retryable() => Action::requeue(ctx.config.error_requeue),
        _ => Action::requeue(ctx.config.resync),
    }
}

async fn finalize(coordinator: &FinalizerCoordinator<'_>) -> Result<Action, Error> {
    match coordinator.finalize().await {
        Ok(()) => Ok(Action::await_change()),
        Err(e) => {
            warn!(error = %e, "cleanup incomplete, deletion blocked");
            Err(e)
        }
    }
}

/// Whether a status write is needed, ignoring condition timestamps
fn status_changed(before: &NovaAPIStatus, after: &NovaAPIStatus) -> bool {
    !before.conditions.semantically_equal(&after.conditions)
        || before.hash != after.hash
        || before.ready_count != after.ready_count
        || before.service_id != after.service_id
        || before.api_endpoints != after.api_endpoints
        || before.network_attachments != after.network_attachments
        || before.observed_generation != after.observed_generation
}

//! Teardown ordering on NovaAPI deletion
//!
//! The KeystoneEndpoint entry is shared between owners, so this owner's
//! token is removed from it first. Owned children go next, and the
//! NovaAPI's own finalizer is only dropped once both succeeded.

use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use tracing::info;

use nova_common::crd::NovaAPI;
use nova_common::events::{actions, reasons};
use nova_common::Error;

use crate::builders::Owner;
use crate::controller::NovaApiContext;
use crate::stages::KEYSTONE_ENDPOINT_NAME;

/// Finalizer put on every NovaAPI
pub const NOVA_API_FINALIZER: &str = "nova.openstack.org/novaapi";

/// Whether `nova` carries the controller's finalizer
pub fn has_finalizer(nova: &NovaAPI) -> bool {
    nova.finalizers().iter().any(|f| f == NOVA_API_FINALIZER)
}

/// Drives finalizer bookkeeping for one NovaAPI
pub struct FinalizerCoordinator<'a> {
    ctx: &'a NovaApiContext,
    nova: &'a NovaAPI,
}

impl<'a> FinalizerCoordinator<'a> {
    /// Coordinator for `nova`
    pub fn new(ctx: &'a NovaApiContext, nova: &'a NovaAPI) -> Self {
        Self { ctx, nova }
    }

    /// Add the controller's finalizer before any child exists.
    ///
    /// Returns true when the finalizer was added by this call.
    pub async fn ensure_own_finalizer(&self) -> Result<bool, Error> {
        if has_finalizer(self.nova) {
            return Ok(false);
        }
        info!("adding finalizer");
        self.ctx
            .nova
            .add_finalizer(self.nova, NOVA_API_FINALIZER)
            .await?;
        Ok(true)
    }

    /// Release everything this NovaAPI holds, in order.
    ///
    /// Stops at the first failing step; the caller retries the whole
    /// sequence. Each step tolerates having already been done.
    pub async fn finalize(&self) -> Result<(), Error> {
        if !has_finalizer(self.nova) {
            return Ok(());
        }
        let owner = Owner::of(self.nova);

        self.ctx
            .catalog
            .remove_owner_token(&owner.namespace, KEYSTONE_ENDPOINT_NAME, &owner.name)
            .await?;
        info!(entry = KEYSTONE_ENDPOINT_NAME, "owner token removed from catalog entry");

        self.ctx.workload.delete_children(&owner).await?;
        info!("owned children deleted");

        self.ctx
            .nova
            .remove_finalizer(self.nova, NOVA_API_FINALIZER)
            .await?;
        info!(name = %self.nova.name_any(), "finalizer removed");
        self.ctx
            .events
            .publish(
                &self.nova.object_ref(&()),
                EventType::Normal,
                reasons::FINALIZER_REMOVED,
                actions::DELETE,
                None,
            )
            .await;
        Ok(())
    }
}

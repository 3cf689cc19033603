//! Kubernetes Event recording for the Nova controllers.
//!
//! Events are fire-and-forget: a failed publish is logged and never fails
//! the reconciliation pass.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Publishes Kubernetes Events about a resource.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an Event on `resource_ref`.
    ///
    /// `reason` is a PascalCase machine-readable string from [`reasons`],
    /// `action` one of [`actions`].
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Publisher backed by `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as `controller_name`
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "failed to publish Kubernetes event");
        }
    }
}

/// Publisher that drops every event.
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Event reasons, shown in the REASON column of `kubectl get events`.
pub mod reasons {
    /// Config documents rendered and published
    pub const CONFIG_RENDERED: &str = "ConfigRendered";
    /// StatefulSet has ready replicas
    pub const WORKLOAD_READY: &str = "WorkloadReady";
    /// Catalog registration reported ready
    pub const ENDPOINT_REGISTERED: &str = "EndpointRegistered";
    /// Owner token removed from the catalog entry
    pub const FINALIZER_REMOVED: &str = "FinalizerRemoved";
    /// A referenced secret is missing
    pub const INPUT_MISSING: &str = "InputMissing";
    /// A reconciliation stage failed
    pub const STAGE_FAILED: &str = "StageFailed";
}

/// Event actions, shown in the ACTION column.
pub mod actions {
    /// Regular reconciliation pass
    pub const RECONCILE: &str = "Reconcile";
    /// Teardown on deletion
    pub const DELETE: &str = "Delete";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_publisher_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoopEventPublisher>();
    }

    #[tokio::test]
    async fn noop_publisher_does_not_panic() {
        NoopEventPublisher
            .publish(
                &ObjectReference::default(),
                EventType::Warning,
                reasons::INPUT_MISSING,
                actions::RECONCILE,
                Some("secret/osp-secret".to_string()),
            )
            .await;
    }
}

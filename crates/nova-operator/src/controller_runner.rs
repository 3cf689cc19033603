//! Controller runner - wires the NovaAPI reconciler into a kube-rs Controller

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use k8s_openapi::NamespaceResourceScope;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, Resource, ResourceExt};

use nova_api_controller::clients::ConfigRenderer;
use nova_api_controller::{error_policy, reconcile, NovaApiContext};
use nova_common::crd::NovaAPI;

use crate::config::ControllerArgs;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
const WATCH_TIMEOUT_SECS: u32 = 25;

fn watcher_config() -> WatcherConfig {
    WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS)
}

/// Api over one namespace, or all of them
fn scoped<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    K::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Whether `nova` reads the secret `name` in its own namespace
fn references_secret(nova: &NovaAPI, name: &str) -> bool {
    nova.spec.secret == name || nova.spec.message_bus_secret_name.as_deref() == Some(name)
}

/// Build the NovaAPI controller future
///
/// Besides NovaAPIs it watches the owned StatefulSets, ConfigMaps and
/// Services, and every Secret, mapped back to the NovaAPIs referencing it.
pub fn build_nova_api_controller(
    client: Client,
    args: &ControllerArgs,
    renderer: Arc<dyn ConfigRenderer>,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    let namespace = args.namespace.as_deref();
    let controller = Controller::new(scoped::<NovaAPI>(&client, namespace), watcher_config());
    let store = controller.store();

    let ctx = Arc::new(NovaApiContext::new(
        client.clone(),
        Some(store.clone()),
        renderer,
        &args.field_manager,
        args.reconcile_config(),
    ));

    tracing::info!(namespace = ?namespace, "- NovaAPI controller");

    Box::pin(
        controller
            .owns(scoped::<StatefulSet>(&client, namespace), watcher_config())
            .owns(scoped::<ConfigMap>(&client, namespace), watcher_config())
            .owns(scoped::<Service>(&client, namespace), watcher_config())
            .watches(
                scoped::<Secret>(&client, namespace),
                watcher_config(),
                move |secret| {
                    let Some(secret_ns) = secret.namespace() else {
                        return Vec::new();
                    };
                    let name = secret.name_any();
                    let affected: Vec<ObjectRef<NovaAPI>> = store
                        .state()
                        .into_iter()
                        .filter(|nova| nova.namespace().as_deref() == Some(secret_ns.as_str()))
                        .filter(|nova| references_secret(nova, &name))
                        .map(|nova| ObjectRef::from_obj(&*nova))
                        .collect();
                    if !affected.is_empty() {
                        tracing::debug!(
                            secret = %name,
                            namespace = %secret_ns,
                            affected_count = affected.len(),
                            "Triggering re-reconciliation of NovaAPIs"
                        );
                    }
                    affected
                },
            )
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result("NovaAPI")),
    )
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}

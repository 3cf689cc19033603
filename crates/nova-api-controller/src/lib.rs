//! NovaAPI reconciliation engine
//!
//! Drives a NovaAPI's children toward its spec, one pass at a time:
//!
//! - **Orchestrator**: ordered, dependency-aware stages, each owning one condition
//! - **Builders**: ConfigMap, StatefulSet, Service and Route objects
//! - **Network**: attachment readiness from pod network-status annotations
//! - **Finalizer**: teardown of the shared KeystoneEndpoint entry and owned children
//! - **Controller**: `reconcile` and `error_policy` for the kube-rs runtime

pub mod builders;
pub mod clients;
pub mod config;
pub mod controller;
pub mod exposure;
pub mod finalizer;
pub mod kube_clients;
pub mod network;
pub mod orchestrator;
mod stages;

pub use controller::{error_policy, reconcile, NovaApiContext, ReconcileConfig};
pub use stages::{KEYSTONE_ENDPOINT_NAME, KEYSTONE_SERVICE_NAME, TRANSPORT_URL_KEY};

//! Per-endpoint exposure
//!
//! Each logical endpoint is either reachable through a route or through a
//! load-balanced service, never both. The choice is resolved once per pass
//! from `spec.externalEndpoints`.

use std::collections::BTreeMap;

use nova_common::crd::{Endpoint, ExternalEndpoint};
use nova_common::NOVA_API_PORT;

/// MetalLB annotation selecting the address pool
pub const METALLB_ADDRESS_POOL: &str = "metallb.universe.tf/address-pool";

/// MetalLB annotation allowing services to share an address
pub const METALLB_ALLOW_SHARED_IP: &str = "metallb.universe.tf/allow-shared-ip";

/// MetalLB annotation requesting specific addresses
pub const METALLB_LOADBALANCER_IPS: &str = "metallb.universe.tf/loadBalancerIPs";

/// Path suffix of the compute API
pub const API_PATH: &str = "/v2.1";

/// How one endpoint is reachable
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Exposure {
    /// Plain ClusterIP service plus a route
    Routed,
    /// LoadBalancer service with MetalLB annotations, no route
    LoadBalanced {
        /// Address pool
        pool: String,
        /// Requested addresses, possibly empty
        addresses: Vec<String>,
    },
}

impl Exposure {
    /// Resolve the exposure of `endpoint`
    pub fn resolve(endpoint: Endpoint, external: &[ExternalEndpoint]) -> Self {
        match external.iter().find(|e| e.endpoint == endpoint) {
            Some(e) => Exposure::LoadBalanced {
                pool: e.ip_address_pool.clone(),
                addresses: e.load_balancer_ips.clone(),
            },
            None => Exposure::Routed,
        }
    }

    /// Resolve every endpoint
    pub fn resolve_all(external: &[ExternalEndpoint]) -> BTreeMap<Endpoint, Exposure> {
        Endpoint::ALL
            .into_iter()
            .map(|ep| (ep, Exposure::resolve(ep, external)))
            .collect()
    }

    /// Whether this endpoint gets a route
    pub fn is_routed(&self) -> bool {
        matches!(self, Exposure::Routed)
    }

    /// Service annotations for this exposure
    pub fn annotations(&self) -> BTreeMap<String, String> {
        let mut annotations = BTreeMap::new();
        if let Exposure::LoadBalanced { pool, addresses } = self {
            annotations.insert(METALLB_ADDRESS_POOL.to_string(), pool.clone());
            annotations.insert(METALLB_ALLOW_SHARED_IP.to_string(), pool.clone());
            if !addresses.is_empty() {
                annotations.insert(METALLB_LOADBALANCER_IPS.to_string(), addresses.join(","));
            }
        }
        annotations
    }
}

/// Name of the service (and route) for `endpoint`
pub fn service_name(endpoint: Endpoint) -> String {
    format!("nova-{endpoint}")
}

/// In-cluster URL of `endpoint`
pub fn cluster_url(endpoint: Endpoint, namespace: &str) -> String {
    format!(
        "http://{}.{namespace}.svc:{NOVA_API_PORT}{API_PATH}",
        service_name(endpoint)
    )
}

/// URL through a route admitted with `host`
pub fn route_url(host: &str) -> String {
    format!("http://{host}{API_PATH}")
}

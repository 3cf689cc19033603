//! Custom Resource Definitions used by the Nova operator

mod keystone;
pub mod network;
mod nova_api;
mod types;

pub use keystone::{
    CatalogCondition, KeystoneEndpoint, KeystoneEndpointSpec, KeystoneEndpointStatus,
};
pub use nova_api::{
    DebugSpec, Endpoint, ExternalEndpoint, NovaAPI, NovaAPISpec, NovaAPIStatus,
    PasswordSelectors,
};
pub use types::{Condition, ConditionKind, ConditionReason, ConditionStatus};

//! Common types for the Nova operator: CRDs, conditions, fingerprints, and errors

#![deny(missing_docs)]

pub mod condition;
pub mod crd;
pub mod error;
pub mod events;
pub mod hash;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager used for every server-side apply issued by the operator
pub const FIELD_MANAGER: &str = "nova-operator";

/// Port the nova-api service listens on
pub const NOVA_API_PORT: i32 = 8774;

/// Label carrying the service name on every child resource
pub const SERVICE_LABEL_KEY: &str = "service";

/// Value of [`SERVICE_LABEL_KEY`] for nova-api children
pub const NOVA_API_SERVICE: &str = "nova-api";

/// Label carrying the owning NovaAPI name on every child resource
pub const OWNER_LABEL_KEY: &str = "owner";

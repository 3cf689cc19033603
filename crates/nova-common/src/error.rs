//! Error types for the Nova operator
//!
//! Every failure inside a reconciliation pass ends up as one of these
//! variants. The variant decides how the failure is reported on the
//! NovaAPI conditions and how quickly the pass is retried.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// How a failed operation should be surfaced and retried
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// A dependency is not satisfied yet; surfaced with reason `Requested`
    Requested,
    /// An operation failed; surfaced with reason `Error` and retried with backoff
    Backoff,
    /// A compare-and-update lost a race; retried without delay
    Immediate,
}

/// Main error type for Nova operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A referenced input resource does not exist (yet)
    #[error("input data resources missing: {resource}")]
    MissingInput {
        /// Resource in `<kind>/<name>` form
        resource: String,
    },

    /// A resource operation failed for a reason expected to pass
    #[error("transient api error [{context}]: {message}")]
    TransientApi {
        /// Operation that failed (e.g. "ensure_service")
        context: String,
        /// Description of what failed
        message: String,
    },

    /// Malformed desired-state field; will not self-resolve without an edit
    #[error("validation error for {resource}: {message}")]
    Validation {
        /// Resource carrying the invalid field
        resource: String,
        /// The invalid field path (e.g., "spec.customServiceConfig")
        field: Option<String>,
        /// Description of what's invalid
        message: String,
    },

    /// Compare-and-update of a shared finalizer list lost a race
    #[error("ownership conflict on {resource} while updating token {token}")]
    OwnershipConflict {
        /// Shared resource in `<kind>/<name>` form
        resource: String,
        /// Finalizer token being written
        token: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Config template rendering error
    #[error("template error: {message}")]
    Template {
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a missing-input error for `<kind>/<name>`
    pub fn missing_input(kind: &str, name: &str) -> Self {
        Self::MissingInput {
            resource: format!("{kind}/{name}"),
        }
    }

    /// Create a transient API error with the given message
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::TransientApi {
            context: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
        }
    }

    /// Create a transient API error with operation context
    pub fn transient_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::TransientApi {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: UNKNOWN_CONTEXT.to_string(),
            field: None,
            message: msg.into(),
        }
    }

    /// Create a validation error with resource context
    pub fn validation_for(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: resource.into(),
            field: None,
            message: msg.into(),
        }
    }

    /// Create a validation error with resource context and field path
    pub fn validation_for_field(
        resource: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            resource: resource.into(),
            field: Some(field.into()),
            message: msg.into(),
        }
    }

    /// Create an ownership conflict error
    pub fn ownership_conflict(resource: impl Into<String>, token: impl Into<String>) -> Self {
        Self::OwnershipConflict {
            resource: resource.into(),
            token: token.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a template rendering error
    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template {
            message: msg.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation errors need a spec edit. Kubernetes 4xx responses other
    /// than conflicts will not change on retry either.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code) && ae.code != 409
            ),
            Error::MissingInput { .. } => true,
            Error::TransientApi { .. } => true,
            Error::Validation { .. } => false,
            Error::OwnershipConflict { .. } => true,
            Error::Serialization { .. } => false,
            Error::Template { .. } => false,
        }
    }

    /// How this error is surfaced on conditions and scheduled for retry
    pub fn disposition(&self) -> Disposition {
        match self {
            Error::MissingInput { .. } => Disposition::Requested,
            Error::OwnershipConflict { .. } => Disposition::Immediate,
            Error::Kube {
                source: kube::Error::Api(ae),
            } if ae.code == 409 => Disposition::Immediate,
            _ => Disposition::Backoff,
        }
    }

    /// Message without the variant prefix, used in condition messages
    pub fn detail(&self) -> String {
        match self {
            Error::Kube { source } => source.to_string(),
            Error::MissingInput { resource } => resource.clone(),
            Error::Validation {
                field: Some(field),
                message,
                ..
            } => format!("{field}: {message}"),
            Error::TransientApi { message, .. }
            | Error::Validation { message, .. }
            | Error::Serialization { message, .. }
            | Error::Template { message } => message.clone(),
            Error::OwnershipConflict { resource, token } => {
                format!("{resource} changed while updating owner token {token}")
            }
        }
    }

    /// Get the field path if this is a field-specific validation error
    pub fn field(&self) -> Option<&str> {
        match self {
            Error::Validation { field, .. } => field.as_deref(),
            _ => None,
        }
    }
}

/// Returns true when a kube error is an HTTP 404
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

/// Returns true when a kube error is an HTTP 409
pub fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409)
}

//! Shared CRD types: the condition vocabulary carried in NovaAPI status

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition status following Kubernetes conventions
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Fixed vocabulary of condition kinds reported on a NovaAPI
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum ConditionKind {
    /// Derived aggregate of every other kind
    Ready,
    /// Referenced secrets resolved and complete
    InputReady,
    /// Config documents rendered and published
    ServiceConfigReady,
    /// StatefulSet declared and at least one replica ready
    DeploymentReady,
    /// Services and routes exist for every endpoint
    ExposeServiceReady,
    /// Every requested attachment has IPs on the pods
    NetworkAttachmentsReady,
    /// Endpoint catalog registration is ready
    KeystoneEndpointReady,
}

impl ConditionKind {
    /// Every kind that feeds the `Ready` aggregate, in display order
    pub const SUBORDINATES: [ConditionKind; 6] = [
        ConditionKind::InputReady,
        ConditionKind::ServiceConfigReady,
        ConditionKind::DeploymentReady,
        ConditionKind::ExposeServiceReady,
        ConditionKind::NetworkAttachmentsReady,
        ConditionKind::KeystoneEndpointReady,
    ];

    /// Wire name of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "Ready",
            Self::InputReady => "InputReady",
            Self::ServiceConfigReady => "ServiceConfigReady",
            Self::DeploymentReady => "DeploymentReady",
            Self::ExposeServiceReady => "ExposeServiceReady",
            Self::NetworkAttachmentsReady => "NetworkAttachmentsReady",
            Self::KeystoneEndpointReady => "KeystoneEndpointReady",
        }
    }
}

impl std::fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable condition reason
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionReason {
    /// Not yet evaluated in any pass
    #[default]
    Init,
    /// Waiting on a dependency, will retry
    Requested,
    /// An operation failed, retried with backoff
    Error,
    /// Condition satisfied
    Ready,
}

impl std::fmt::Display for ConditionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Init => write!(f, "Init"),
            Self::Requested => write!(f, "Requested"),
            Self::Error => write!(f, "Error"),
            Self::Ready => write!(f, "Ready"),
        }
    }
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Kind of condition
    #[serde(rename = "type")]
    pub type_: ConditionKind,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: ConditionReason,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: ConditionKind,
        status: ConditionStatus,
        reason: ConditionReason,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_,
            status,
            reason,
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }
}

//! Condition set and `Ready` aggregation
//!
//! A [`ConditionSet`] holds at most one [`Condition`] per [`ConditionKind`].
//! `Ready` is never set directly: it is re-derived from the subordinate
//! kinds after every update, so a status snapshot taken at any point in a
//! pass carries an aggregate consistent with the rest of the set.
//!
//! Aggregation rules, in priority order:
//!
//! 1. any subordinate missing or `Unknown` ⇒ `Ready=Unknown` (not all
//!    stages have been attempted yet)
//! 2. any subordinate `False` ⇒ `Ready=False`, mirroring the reason and
//!    message of the first `False` subordinate
//! 3. otherwise `Ready=True`

use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::{Condition, ConditionKind, ConditionReason, ConditionStatus};

/// Human-readable condition messages
///
/// Tests diff these verbatim, keep them stable.
pub mod messages {
    /// Ready, not all subordinates evaluated
    pub const READY_INIT: &str = "Setup started";
    /// Ready, all subordinates true
    pub const READY: &str = "Setup complete";

    /// InputReady initial message
    pub const INPUT_READY_INIT: &str = "Input data not started";
    /// InputReady true
    pub const INPUT_READY: &str = "Input data complete";
    /// ServiceConfigReady initial message
    pub const SERVICE_CONFIG_READY_INIT: &str = "Service config create not started";
    /// ServiceConfigReady true
    pub const SERVICE_CONFIG_READY: &str = "Service config create completed";
    /// DeploymentReady initial message
    pub const DEPLOYMENT_READY_INIT: &str = "Deployment not started";
    /// DeploymentReady while replicas start
    pub const DEPLOYMENT_READY_RUNNING: &str = "Deployment in progress";
    /// DeploymentReady true
    pub const DEPLOYMENT_READY: &str = "Deployment completed";
    /// ExposeServiceReady initial message
    pub const EXPOSE_SERVICE_READY_INIT: &str = "Exposing service not started";
    /// ExposeServiceReady while waiting for a route host
    pub const EXPOSE_SERVICE_READY_RUNNING: &str = "Exposing service in progress";
    /// ExposeServiceReady true
    pub const EXPOSE_SERVICE_READY: &str = "Exposing service completed";
    /// NetworkAttachmentsReady initial message
    pub const NETWORK_ATTACHMENTS_READY_INIT: &str = "NetworkAttachments not started";
    /// NetworkAttachmentsReady true
    pub const NETWORK_ATTACHMENTS_READY: &str = "NetworkAttachments completed";
    /// KeystoneEndpointReady initial message
    pub const KEYSTONE_ENDPOINT_READY_INIT: &str = "KeystoneEndpoint not started";
    /// KeystoneEndpointReady while the catalog entry is not ready
    pub const KEYSTONE_ENDPOINT_READY_RUNNING: &str = "KeystoneEndpoint creation in progress";
    /// KeystoneEndpointReady true
    pub const KEYSTONE_ENDPOINT_READY: &str = "KeystoneEndpoint completed";

    /// InputReady, a referenced resource does not exist
    pub fn input_missing(resource: &str) -> String {
        format!("Input data resources missing: {resource}")
    }

    /// InputReady, a resource exists but is unusable
    pub fn input_error(detail: &str) -> String {
        format!("Input data error occurred {detail}")
    }

    /// ServiceConfigReady failure
    pub fn service_config_error(detail: &str) -> String {
        format!("Error occured creating service config {detail}")
    }

    /// DeploymentReady failure
    pub fn deployment_error(detail: &str) -> String {
        format!("Deployment error occurred {detail}")
    }

    /// ExposeServiceReady failure
    pub fn expose_service_error(detail: &str) -> String {
        format!("Exposing service error occured {detail}")
    }

    /// NetworkAttachmentsReady, definitions do not exist
    pub fn network_attachments_missing(names: &str) -> String {
        format!("NetworkAttachment resources missing: {names}")
    }

    /// NetworkAttachmentsReady failure
    pub fn network_attachments_error(detail: &str) -> String {
        format!("NetworkAttachments error occured {detail}")
    }

    /// KeystoneEndpointReady failure
    pub fn keystone_endpoint_error(detail: &str) -> String {
        format!("KeystoneEndpoint error occured {detail}")
    }
}

/// Initial (never evaluated) message for a kind
fn init_message(kind: ConditionKind) -> &'static str {
    match kind {
        ConditionKind::Ready => messages::READY_INIT,
        ConditionKind::InputReady => messages::INPUT_READY_INIT,
        ConditionKind::ServiceConfigReady => messages::SERVICE_CONFIG_READY_INIT,
        ConditionKind::DeploymentReady => messages::DEPLOYMENT_READY_INIT,
        ConditionKind::ExposeServiceReady => messages::EXPOSE_SERVICE_READY_INIT,
        ConditionKind::NetworkAttachmentsReady => messages::NETWORK_ATTACHMENTS_READY_INIT,
        ConditionKind::KeystoneEndpointReady => messages::KEYSTONE_ENDPOINT_READY_INIT,
    }
}

/// At most one condition per kind, with `Ready` kept in sync.
///
/// Equality ignores element order.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(transparent)]
pub struct ConditionSet(Vec<Condition>);

impl PartialEq for ConditionSet {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.0.iter().all(|c| other.get(c.type_) == Some(c))
    }
}

impl ConditionSet {
    /// Add `Unknown/Init` for every kind not present yet.
    ///
    /// Existing conditions are left untouched.
    pub fn init(&mut self) {
        if self.get(ConditionKind::Ready).is_none() {
            self.0.insert(0, init_condition(ConditionKind::Ready));
        }
        for kind in ConditionKind::SUBORDINATES {
            if self.get(kind).is_none() {
                self.0.push(init_condition(kind));
            }
        }
        self.refresh_ready();
    }

    /// Get the condition of `kind`
    pub fn get(&self, kind: ConditionKind) -> Option<&Condition> {
        self.0.iter().find(|c| c.type_ == kind)
    }

    /// Status of `kind`, `Unknown` when absent
    pub fn status(&self, kind: ConditionKind) -> ConditionStatus {
        self.get(kind).map(|c| c.status).unwrap_or_default()
    }

    /// Whether `kind` is present and `True`
    pub fn is_true(&self, kind: ConditionKind) -> bool {
        self.status(kind) == ConditionStatus::True
    }

    /// Whether the aggregate is `True`
    pub fn is_ready(&self) -> bool {
        self.is_true(ConditionKind::Ready)
    }

    /// Same kinds, statuses, reasons and messages, ignoring timestamps
    pub fn semantically_equal(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self.0.iter().all(|c| {
                other.get(c.type_).is_some_and(|o| {
                    o.status == c.status && o.reason == c.reason && o.message == c.message
                })
            })
    }

    /// Iterate conditions in display order
    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    /// Upsert a subordinate condition and re-derive `Ready`.
    ///
    /// The transition time only moves when the status changes. Setting
    /// `Ready` directly is ignored. Returns true if anything changed.
    pub fn set(
        &mut self,
        kind: ConditionKind,
        status: ConditionStatus,
        reason: ConditionReason,
        message: impl Into<String>,
    ) -> bool {
        if kind == ConditionKind::Ready {
            return false;
        }
        let changed = self.upsert(Condition::new(kind, status, reason, message));
        self.refresh_ready();
        changed
    }

    /// Set `kind` to `True/Ready` with `message`
    pub fn mark_true(&mut self, kind: ConditionKind, message: impl Into<String>) -> bool {
        self.set(kind, ConditionStatus::True, ConditionReason::Ready, message)
    }

    /// Set `kind` to `False` with the given reason
    pub fn mark_false(
        &mut self,
        kind: ConditionKind,
        reason: ConditionReason,
        message: impl Into<String>,
    ) -> bool {
        self.set(kind, ConditionStatus::False, reason, message)
    }

    /// Reset `kind` to `Unknown/Init`
    pub fn mark_unknown(&mut self, kind: ConditionKind) -> bool {
        self.set(
            kind,
            ConditionStatus::Unknown,
            ConditionReason::Init,
            init_message(kind),
        )
    }

    /// Compute `Ready` from the subordinate conditions.
    ///
    /// Pure: depends only on the current set. The returned condition is
    /// timestamped now; [`ConditionSet::set`] keeps the stored timestamp
    /// when the status does not change.
    pub fn aggregate(&self) -> Condition {
        let pending = ConditionKind::SUBORDINATES
            .iter()
            .any(|kind| self.status(*kind) == ConditionStatus::Unknown);
        if pending {
            return init_condition(ConditionKind::Ready);
        }

        let first_false = ConditionKind::SUBORDINATES
            .iter()
            .filter_map(|kind| self.get(*kind))
            .find(|c| c.status == ConditionStatus::False);
        match first_false {
            Some(c) => Condition::new(
                ConditionKind::Ready,
                ConditionStatus::False,
                c.reason,
                c.message.clone(),
            ),
            None => Condition::new(
                ConditionKind::Ready,
                ConditionStatus::True,
                ConditionReason::Ready,
                messages::READY,
            ),
        }
    }

    fn refresh_ready(&mut self) {
        let ready = self.aggregate();
        self.upsert(ready);
    }

    fn upsert(&mut self, mut condition: Condition) -> bool {
        match self.0.iter_mut().find(|c| c.type_ == condition.type_) {
            Some(existing) => {
                if existing.status == condition.status
                    && existing.reason == condition.reason
                    && existing.message == condition.message
                {
                    return false;
                }
                if existing.status == condition.status {
                    condition.last_transition_time = existing.last_transition_time;
                }
                *existing = condition;
                true
            }
            None => {
                condition.last_transition_time = Utc::now();
                if condition.type_ == ConditionKind::Ready {
                    self.0.insert(0, condition);
                } else {
                    self.0.push(condition);
                }
                true
            }
        }
    }
}

fn init_condition(kind: ConditionKind) -> Condition {
    Condition::new(
        kind,
        ConditionStatus::Unknown,
        ConditionReason::Init,
        init_message(kind),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_true() -> ConditionSet {
        let mut set = ConditionSet::default();
        set.init();
        for kind in ConditionKind::SUBORDINATES {
            set.mark_true(kind, "ok");
        }
        set
    }

    // ==========================================================================
    // Story Tests: Ready aggregation
    // ==========================================================================

    /// Story: A fresh NovaAPI lists every condition as not started
    #[test]
    fn story_init_lists_full_vocabulary() {
        let mut set = ConditionSet::default();
        set.init();

        assert_eq!(set.iter().count(), 7);
        assert_eq!(set.iter().next().map(|c| c.type_), Some(ConditionKind::Ready));
        let ready = set.get(ConditionKind::Ready).unwrap();
        assert_eq!(ready.status, ConditionStatus::Unknown);
        assert_eq!(ready.reason, ConditionReason::Init);
        assert_eq!(ready.message, messages::READY_INIT);
    }

    /// Story: A missing secret does not make the service "failed"
    ///
    /// Only InputReady has been attempted. Everything downstream is still
    /// pending, so Ready stays Unknown instead of False.
    #[test]
    fn story_false_input_with_pending_stages_keeps_ready_unknown() {
        let mut set = ConditionSet::default();
        set.init();
        set.mark_false(
            ConditionKind::InputReady,
            ConditionReason::Requested,
            messages::input_missing("secret/test-secret"),
        );

        assert_eq!(set.status(ConditionKind::Ready), ConditionStatus::Unknown);
        assert_eq!(set.status(ConditionKind::InputReady), ConditionStatus::False);
    }

    /// Story: Missing kinds count as not evaluated, not as failed
    #[test]
    fn story_missing_kind_keeps_ready_unknown() {
        let mut set = ConditionSet::default();
        for kind in &ConditionKind::SUBORDINATES[..5] {
            set.mark_true(*kind, "ok");
        }
        assert_eq!(set.status(ConditionKind::Ready), ConditionStatus::Unknown);

        set.mark_true(ConditionKind::KeystoneEndpointReady, "ok");
        assert!(set.is_ready());
    }

    /// Story: One subordinate going False flips Ready to False
    #[test]
    fn story_any_false_flips_ready() {
        for kind in ConditionKind::SUBORDINATES {
            let mut set = all_true();
            assert!(set.is_ready());

            set.mark_false(kind, ConditionReason::Error, "boom");
            let ready = set.get(ConditionKind::Ready).unwrap();
            assert_eq!(ready.status, ConditionStatus::False, "{kind}");
            assert_eq!(ready.reason, ConditionReason::Error);
            assert_eq!(ready.message, "boom");
        }
    }

    #[test]
    fn ready_mirrors_first_false_in_vocabulary_order() {
        let mut set = all_true();
        set.mark_false(
            ConditionKind::KeystoneEndpointReady,
            ConditionReason::Requested,
            messages::KEYSTONE_ENDPOINT_READY_RUNNING,
        );
        set.mark_false(
            ConditionKind::DeploymentReady,
            ConditionReason::Requested,
            messages::DEPLOYMENT_READY_RUNNING,
        );
        let ready = set.get(ConditionKind::Ready).unwrap();
        assert_eq!(ready.message, messages::DEPLOYMENT_READY_RUNNING);
    }

    #[test]
    fn unknown_takes_precedence_over_false() {
        let mut set = all_true();
        set.mark_false(ConditionKind::InputReady, ConditionReason::Error, "bad");
        set.mark_unknown(ConditionKind::DeploymentReady);
        assert_eq!(set.status(ConditionKind::Ready), ConditionStatus::Unknown);
    }

    #[test]
    fn ready_cannot_be_set_directly() {
        let mut set = ConditionSet::default();
        set.init();
        assert!(!set.mark_true(ConditionKind::Ready, "forced"));
        assert_eq!(set.status(ConditionKind::Ready), ConditionStatus::Unknown);
    }

    /// Story: Re-reporting the same state does not move timestamps
    #[test]
    fn story_transition_time_moves_only_on_status_change() {
        let mut set = ConditionSet::default();
        set.init();
        set.mark_false(
            ConditionKind::DeploymentReady,
            ConditionReason::Requested,
            messages::DEPLOYMENT_READY_RUNNING,
        );
        let first = set.get(ConditionKind::DeploymentReady).unwrap().last_transition_time;

        assert!(!set.mark_false(
            ConditionKind::DeploymentReady,
            ConditionReason::Requested,
            messages::DEPLOYMENT_READY_RUNNING,
        ));
        // Same status, different message: updated but not a transition
        assert!(set.mark_false(
            ConditionKind::DeploymentReady,
            ConditionReason::Error,
            messages::deployment_error("quota exceeded"),
        ));
        let c = set.get(ConditionKind::DeploymentReady).unwrap();
        assert_eq!(c.last_transition_time, first);
        assert_eq!(c.reason, ConditionReason::Error);

        set.mark_true(ConditionKind::DeploymentReady, messages::DEPLOYMENT_READY);
        let c = set.get(ConditionKind::DeploymentReady).unwrap();
        assert!(c.last_transition_time >= first);
        assert_eq!(c.status, ConditionStatus::True);
    }

    #[test]
    fn init_keeps_existing_conditions() {
        let mut set = ConditionSet::default();
        set.mark_true(ConditionKind::InputReady, messages::INPUT_READY);
        set.init();
        assert!(set.is_true(ConditionKind::InputReady));
        assert_eq!(set.iter().count(), 7);
    }

    #[test]
    fn semantic_equality_ignores_timestamps() {
        let a = all_true();
        let mut b = a.clone();
        for c in &mut b.0 {
            c.last_transition_time = c.last_transition_time - chrono::Duration::seconds(60);
        }
        assert!(a.semantically_equal(&b));

        b.mark_false(ConditionKind::DeploymentReady, ConditionReason::Requested, "x");
        assert!(!a.semantically_equal(&b));
    }

    #[test]
    fn equality_ignores_order() {
        let a = all_true();
        let mut items: Vec<Condition> = a.iter().cloned().collect();
        items.reverse();
        let b = ConditionSet(items);
        assert_eq!(a, b);

        let mut c = a.clone();
        c.mark_false(ConditionKind::InputReady, ConditionReason::Error, "x");
        assert_ne!(a, c);
    }

    #[test]
    fn serializes_as_plain_list() {
        let set = all_true();
        let json = serde_json::to_value(&set).unwrap();
        assert!(json.is_array());
        assert_eq!(json.as_array().unwrap().len(), 7);
        let back: ConditionSet = serde_json::from_value(json).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn message_formats_are_stable() {
        assert_eq!(
            messages::input_missing("secret/test-secret"),
            "Input data resources missing: secret/test-secret"
        );
        assert_eq!(
            messages::network_attachments_missing("internalapi"),
            "NetworkAttachment resources missing: internalapi"
        );
        assert_eq!(
            messages::network_attachments_error("x"),
            "NetworkAttachments error occured x"
        );
    }
}

//! Stage graph and the per-pass driver
//!
//! A pass walks the stages in a fixed order. Each stage declares which
//! earlier stages it needs and how far along they must be; a stage whose
//! needs are unmet is skipped and its condition left alone. Independent
//! branches keep going, so a failed catalog registration does not stop
//! network attachment tracking.

use std::fmt;
use std::time::Duration;

use kube::ResourceExt;
use tracing::{debug, info, warn};

use nova_common::crd::{ConditionKind, NovaAPI, NovaAPIStatus};
use nova_common::error::Disposition;

use crate::controller::{NovaApiContext, ReconcileConfig};
use crate::stages::Pass;

/// One ordered unit of reconciliation work
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Resolve secrets and fingerprint the inputs
    ValidateInputs,
    /// Render and publish the config documents
    RenderConfig,
    /// Declare the StatefulSet
    EnsureWorkload,
    /// Services and routes for each endpoint
    ExposeService,
    /// Shared KeystoneEndpoint registration
    RegisterEndpoint,
    /// Per-pod network attachment addresses
    TrackNetworkAttachments,
}

/// How far a dependency must have progressed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requirement {
    /// The stage ran and declared its objects
    Created,
    /// The stage reported ready
    Ready,
}

impl Stage {
    /// Execution order
    pub const ORDER: [Stage; 6] = [
        Stage::ValidateInputs,
        Stage::RenderConfig,
        Stage::EnsureWorkload,
        Stage::ExposeService,
        Stage::RegisterEndpoint,
        Stage::TrackNetworkAttachments,
    ];

    /// Stages that must have progressed before this one runs
    pub fn dependencies(self) -> &'static [(Stage, Requirement)] {
        match self {
            Stage::ValidateInputs => &[],
            Stage::RenderConfig => &[(Stage::ValidateInputs, Requirement::Ready)],
            Stage::EnsureWorkload => &[(Stage::RenderConfig, Requirement::Ready)],
            Stage::ExposeService => &[(Stage::EnsureWorkload, Requirement::Created)],
            Stage::RegisterEndpoint => &[(Stage::ExposeService, Requirement::Ready)],
            Stage::TrackNetworkAttachments => &[(Stage::EnsureWorkload, Requirement::Ready)],
        }
    }

    /// Condition this stage owns
    pub fn condition(self) -> ConditionKind {
        match self {
            Stage::ValidateInputs => ConditionKind::InputReady,
            Stage::RenderConfig => ConditionKind::ServiceConfigReady,
            Stage::EnsureWorkload => ConditionKind::DeploymentReady,
            Stage::ExposeService => ConditionKind::ExposeServiceReady,
            Stage::RegisterEndpoint => ConditionKind::KeystoneEndpointReady,
            Stage::TrackNetworkAttachments => ConditionKind::NetworkAttachmentsReady,
        }
    }

    /// Name used in logs
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::ValidateInputs => "validate-inputs",
            Stage::RenderConfig => "render-config",
            Stage::EnsureWorkload => "ensure-workload",
            Stage::ExposeService => "expose-service",
            Stage::RegisterEndpoint => "register-endpoint",
            Stage::TrackNetworkAttachments => "track-network-attachments",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of running (or skipping) one stage
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageOutcome {
    /// Done and ready
    Ready,
    /// Objects declared, cluster still converging
    Progressing,
    /// A dependency outside this resource is not there yet
    Waiting,
    /// The underlying operation failed
    Failed(Disposition),
    /// Dependencies unmet, stage not run
    Skipped,
}

impl StageOutcome {
    /// Whether this outcome meets `requirement`
    pub fn satisfies(self, requirement: Requirement) -> bool {
        match requirement {
            Requirement::Ready => self == StageOutcome::Ready,
            Requirement::Created => {
                matches!(self, StageOutcome::Ready | StageOutcome::Progressing)
            }
        }
    }
}

/// Outcome of one reconciliation pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    outcomes: Vec<(Stage, StageOutcome)>,
    /// Deletion was requested while the pass ran
    pub deletion_requested: bool,
}

impl PassReport {
    /// Outcome of `stage`, `None` if the pass stopped before it
    pub fn outcome(&self, stage: Stage) -> Option<StageOutcome> {
        self.outcomes
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, outcome)| *outcome)
    }

    /// Whether every stage ran and reported ready
    pub fn all_ready(&self) -> bool {
        self.outcomes.len() == Stage::ORDER.len()
            && self
                .outcomes
                .iter()
                .all(|(_, outcome)| *outcome == StageOutcome::Ready)
    }

    /// When to run the next pass
    pub fn requeue_after(&self, config: &ReconcileConfig) -> Duration {
        let failed = |d: Disposition| {
            self.outcomes
                .iter()
                .any(|(_, outcome)| *outcome == StageOutcome::Failed(d))
        };
        if failed(Disposition::Immediate) {
            Duration::ZERO
        } else if failed(Disposition::Backoff) {
            config.error_requeue
        } else if self.all_ready() {
            config.resync
        } else {
            config.waiting_requeue
        }
    }

    fn record(&mut self, stage: Stage, outcome: StageOutcome) {
        self.outcomes.push((stage, outcome));
    }
}

/// Run every stage once against `status`.
///
/// Conditions and observed fields are updated in place; `Ready` is
/// re-derived after every stage. Before each stage after the first the
/// resource is checked for deletion; if found, the remaining stages are
/// not run and the report says so.
pub async fn run_pass(
    ctx: &NovaApiContext,
    nova: &NovaAPI,
    status: &mut NovaAPIStatus,
) -> PassReport {
    let namespace = nova.namespace().unwrap_or_default();
    let name = nova.name_any();
    let mut report = PassReport::default();
    let mut pass = Pass::new(ctx, nova, status);

    for stage in Stage::ORDER {
        if !report.outcomes.is_empty() {
            match ctx.nova.deletion_requested(&namespace, &name).await {
                Ok(true) => {
                    info!(%stage, "deletion requested, stopping pass");
                    report.deletion_requested = true;
                    return report;
                }
                Ok(false) => {}
                Err(e) => warn!(error = %e, "deletion check failed, continuing pass"),
            }
        }

        let unmet = stage
            .dependencies()
            .iter()
            .find(|(dep, req)| !report.outcome(*dep).is_some_and(|o| o.satisfies(*req)));
        if let Some((dep, req)) = unmet {
            debug!(%stage, dependency = %dep, ?req, "dependency not met, skipping");
            report.record(stage, StageOutcome::Skipped);
            continue;
        }

        let outcome = pass.run(stage).await;
        debug!(%stage, ?outcome, "stage finished");
        report.record(stage, outcome);
    }

    report
}

//! Canary Custom Resource Definition
//!
//! A Canary describes a progressive-delivery release of one target workload:
//! how the routing services are generated, how the release is analysed and
//! which external webhooks take part in it.
//!
//! The analysis policy exists in two generations. `spec.analysis` is the
//! current form and `spec.canaryAnalysis` the deprecated one; both are kept
//! verbatim and the current form wins when both are present.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::analysis::CanaryAnalysis;
use super::service::CanaryService;
use super::types::{Condition, CrossNamespaceObjectReference};

/// Kind name of the Canary resource
pub const CANARY_KIND: &str = "Canary";

/// API group of the Canary resource
pub const CANARY_GROUP: &str = "flagger.app";

/// API version of the Canary resource
pub const CANARY_VERSION: &str = "v1beta1";

/// Canary is the configuration for a canary release, which drives the
/// bootstrap, analysis, traffic shifting, promotion or rollback of an app
/// revision.
///
/// Example:
/// ```yaml
/// apiVersion: flagger.app/v1beta1
/// kind: Canary
/// metadata:
///   name: podinfo
///   namespace: test
/// spec:
///   targetRef:
///     apiVersion: apps/v1
///     kind: Deployment
///     name: podinfo
///   service:
///     port: 9898
///   analysis:
///     interval: 1m
///     threshold: 5
///     maxWeight: 50
///     stepWeight: 10
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "flagger.app",
    version = "v1beta1",
    kind = "Canary",
    plural = "canaries",
    namespaced,
    status = "CanaryStatus",
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Weight","type":"integer","jsonPath":".status.canaryWeight"}"#,
    printcolumn = r#"{"name":"FailedChecks","type":"integer","priority":1,"jsonPath":".status.failedChecks"}"#,
    printcolumn = r#"{"name":"LastTransitionTime","type":"string","jsonPath":".status.lastTransitionTime"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CanarySpec {
    /// Overrides the mesh provider for this canary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Overrides the metrics server address for this canary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_server: Option<String>,

    /// Target workload of the release
    pub target_ref: CrossNamespaceObjectReference,

    /// Autoscaler attached to the target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoscaler_ref: Option<CrossNamespaceObjectReference>,

    /// Ingress resource used for routing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_ref: Option<CrossNamespaceObjectReference>,

    /// How the routing services are generated
    pub service: CanaryService,

    /// Analysis policy of the release
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<CanaryAnalysis>,

    /// Deprecated: replaced by `analysis`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canary_analysis: Option<CanaryAnalysis>,

    /// Maximum time in seconds for the release to make progress before it
    /// is considered failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_deadline_seconds: Option<i32>,

    /// Promote the canary without analysing it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_analysis: Option<bool>,
}

impl CanarySpec {
    /// Spec targeting `target` with a service on `port`; everything else absent
    pub fn new(target: CrossNamespaceObjectReference, port: i32) -> Self {
        Self {
            provider: None,
            metrics_server: None,
            target_ref: target,
            autoscaler_ref: None,
            ingress_ref: None,
            service: CanaryService::with_port(port),
            analysis: None,
            canary_analysis: None,
            progress_deadline_seconds: None,
            skip_analysis: None,
        }
    }

    /// Structural checks an admission layer applies before accepting a spec.
    ///
    /// Resolution never depends on these passing; they exist for loaders that
    /// want to reject records that cannot describe a release at all.
    pub fn validate(&self, canary: &str) -> Result<(), crate::Error> {
        if self.target_ref.name.trim().is_empty() {
            return Err(crate::Error::validation_for_field(
                canary,
                "spec.targetRef.name",
                "target reference name must be set",
            ));
        }
        if self.service.port <= 0 {
            return Err(crate::Error::validation_for_field(
                canary,
                "spec.service.port",
                format!("port must be a positive integer, got {}", self.service.port),
            ));
        }

        let (field, analysis) = match (&self.analysis, &self.canary_analysis) {
            (Some(a), _) => ("spec.analysis", a),
            (None, Some(a)) => ("spec.canaryAnalysis", a),
            (None, None) => return Ok(()),
        };

        for (i, metric) in analysis.metrics().iter().enumerate() {
            if metric.name.trim().is_empty() {
                return Err(crate::Error::validation_for_field(
                    canary,
                    format!("{field}.metrics[{i}].name"),
                    "metric name must be set",
                ));
            }
        }
        for (i, alert) in analysis.alerts().iter().enumerate() {
            if alert.provider_ref.name.trim().is_empty() {
                return Err(crate::Error::validation_for_field(
                    canary,
                    format!("{field}.alerts[{i}].providerRef.name"),
                    format!("alert '{}' must reference a provider", alert.name),
                ));
            }
        }
        for (i, hook) in analysis.webhooks().iter().enumerate() {
            if hook.name.trim().is_empty() {
                return Err(crate::Error::validation_for_field(
                    canary,
                    format!("{field}.webhooks[{i}].name"),
                    "webhook name must be set",
                ));
            }
            if hook.url.trim().is_empty() {
                return Err(crate::Error::validation_for_field(
                    canary,
                    format!("{field}.webhooks[{i}].url"),
                    format!("webhook '{}' must have a URL", hook.name),
                ));
            }
        }
        Ok(())
    }
}

/// Phase of a canary release, as reported by the rollout controller
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum CanaryPhase {
    /// Primary workload and services are being created
    Initializing,
    /// Primary is ready and the target is scaled down
    Initialized,
    /// A new revision was detected; analysis is held
    Waiting,
    /// Traffic is being shifted and analysed
    Progressing,
    /// Analysis passed; promotion is held
    WaitingPromotion,
    /// The canary spec is being copied over the primary
    Promoting,
    /// Traffic is routed back to the primary and the canary scaled down
    Finalising,
    /// The release was promoted
    Succeeded,
    /// The release was rolled back
    Failed,
}

impl CanaryPhase {
    /// Every phase, in lifecycle order
    pub const ALL: [CanaryPhase; 9] = [
        Self::Initializing,
        Self::Initialized,
        Self::Waiting,
        Self::Progressing,
        Self::WaitingPromotion,
        Self::Promoting,
        Self::Finalising,
        Self::Succeeded,
        Self::Failed,
    ];

    /// Phases in which an analysis run is in flight
    pub fn is_analysing(&self) -> bool {
        matches!(
            self,
            Self::Waiting | Self::Progressing | Self::WaitingPromotion
        )
    }

    /// Terminal phases of one release
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for CanaryPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "Initializing"),
            Self::Initialized => write!(f, "Initialized"),
            Self::Waiting => write!(f, "Waiting"),
            Self::Progressing => write!(f, "Progressing"),
            Self::WaitingPromotion => write!(f, "WaitingPromotion"),
            Self::Promoting => write!(f, "Promoting"),
            Self::Finalising => write!(f, "Finalising"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

impl std::str::FromStr for CanaryPhase {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| crate::Error::validation(format!("invalid canary phase: {s}")))
    }
}

/// Canary status, written by the rollout controller
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CanaryStatus {
    /// Current phase; absent until the controller first reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<CanaryPhase>,

    /// Failed checks in the current analysis run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_checks: Option<i32>,

    /// Traffic percentage currently routed to the canary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canary_weight: Option<i32>,

    /// Completed iterations (A/B testing and blue/green)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<i32>,

    /// Last time the phase changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,

    /// Status conditions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Condition>>,
}

impl CanaryStatus {
    /// Create a status with the given phase
    pub fn with_phase(phase: CanaryPhase) -> Self {
        Self {
            phase: Some(phase),
            ..Default::default()
        }
    }

    /// Set phase (builder pattern)
    pub fn phase(mut self, phase: CanaryPhase) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Set canary weight (builder pattern)
    pub fn weight(mut self, weight: i32) -> Self {
        self.canary_weight = Some(weight);
        self
    }

    /// Add a condition, replacing any earlier one of the same type
    pub fn condition(mut self, condition: Condition) -> Self {
        let conditions = self.conditions.get_or_insert_with(Vec::new);
        conditions.retain(|c| c.type_ != condition.type_);
        conditions.push(condition);
        self
    }

    /// Set the transition time (builder pattern)
    pub fn transitioned_at(mut self, time: DateTime<Utc>) -> Self {
        self.last_transition_time = Some(time);
        self
    }
}

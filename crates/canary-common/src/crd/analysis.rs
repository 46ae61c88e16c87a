//! Analysis policy types: metric checks, alerts and webhooks.
//!
//! Metrics carry two generations of the same settings. The deprecated scalar
//! `threshold` and inline `query` are kept next to their replacements
//! (`thresholdRange`, `templateRef`) so old manifests load unchanged; the
//! [`MetricThreshold`] and [`MetricSource`] views apply the "current form
//! first" precedence for readers.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::istio::HTTPMatchRequest;
use super::types::CrossNamespaceObjectReference;
use crate::hooks::HookType;

/// CanaryAnalysis describes how the analysis of a release is carried out
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CanaryAnalysis {
    /// Schedule interval for this analysis (duration string)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,

    /// Number of checks to run for A/B testing and blue/green
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<i32>,

    /// Enable traffic mirroring for blue/green
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror: Option<bool>,

    /// Max traffic percentage routed to the canary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_weight: Option<i32>,

    /// Incremental traffic percentage step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_weight: Option<i32>,

    /// Max number of failed checks before the canary is rolled back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<i32>,

    /// Alerts for this analysis
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alerts: Option<Vec<CanaryAlert>>,

    /// Metric checks for this analysis
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Vec<CanaryMetric>>,

    /// Webhooks for this analysis
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhooks: Option<Vec<CanaryWebhook>>,

    /// A/B testing HTTP match conditions
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub r#match: Option<Vec<HTTPMatchRequest>>,
}

impl CanaryAnalysis {
    /// Alerts, empty when none are configured
    pub fn alerts(&self) -> &[CanaryAlert] {
        self.alerts.as_deref().unwrap_or_default()
    }

    /// Metric checks, empty when none are configured
    pub fn metrics(&self) -> &[CanaryMetric] {
        self.metrics.as_deref().unwrap_or_default()
    }

    /// Webhooks, in declaration order
    pub fn webhooks(&self) -> &[CanaryWebhook] {
        self.webhooks.as_deref().unwrap_or_default()
    }
}

/// CanaryMetric references a metric check used during analysis
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CanaryMetric {
    /// Name of the metric
    pub name: String,

    /// Window size of the metric query (duration string)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,

    /// Deprecated: max accepted value, replaced by `thresholdRange`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,

    /// Accepted value range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_range: Option<CanaryThresholdRange>,

    /// Deprecated: inline Prometheus query, replaced by `templateRef`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    /// Reference to a metric template object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_ref: Option<CrossNamespaceObjectReference>,
}

/// Value range used for metric validation; bounds are inclusive
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct CanaryThresholdRange {
    /// Minimum accepted value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    /// Maximum accepted value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl CanaryThresholdRange {
    /// True when neither bound is set, so every value passes
    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// Whether `value` lies within the configured bounds
    pub fn contains(&self, value: f64) -> bool {
        if let Some(min) = self.min {
            if value < min {
                return false;
            }
        }
        if let Some(max) = self.max {
            if value > max {
                return false;
            }
        }
        true
    }
}

/// Effective acceptance rule of a metric
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MetricThreshold<'a> {
    /// `thresholdRange` is set and takes precedence
    Range(&'a CanaryThresholdRange),
    /// Only the deprecated scalar `threshold` is set
    Max(f64),
    /// Nothing constrains the value
    Unbounded,
}

impl MetricThreshold<'_> {
    /// Whether a measured value passes the check
    pub fn accepts(&self, value: f64) -> bool {
        match self {
            Self::Range(range) => range.contains(value),
            Self::Max(max) => value <= *max,
            Self::Unbounded => true,
        }
    }

    /// True if the rule cannot reject any value
    pub fn is_unbounded(&self) -> bool {
        match self {
            Self::Range(range) => range.is_unbounded(),
            Self::Max(_) => false,
            Self::Unbounded => true,
        }
    }
}

/// Effective query source of a metric
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MetricSource<'a> {
    /// `templateRef` is set and takes precedence
    Template(&'a CrossNamespaceObjectReference),
    /// Only the deprecated inline query is set
    Query(&'a str),
    /// Neither form is set
    Missing,
}

impl CanaryMetric {
    /// Acceptance rule, preferring `thresholdRange` over `threshold`
    pub fn effective_threshold(&self) -> MetricThreshold<'_> {
        match (&self.threshold_range, self.threshold) {
            (Some(range), _) => MetricThreshold::Range(range),
            (None, Some(max)) => MetricThreshold::Max(max),
            (None, None) => MetricThreshold::Unbounded,
        }
    }

    /// Query source, preferring `templateRef` over the inline query
    pub fn effective_source(&self) -> MetricSource<'_> {
        if let Some(template) = &self.template_ref {
            return MetricSource::Template(template);
        }
        match self.query.as_deref() {
            Some(query) if !query.trim().is_empty() => MetricSource::Query(query),
            _ => MetricSource::Missing,
        }
    }

    /// Whether a measured value passes this metric's check
    pub fn accepts(&self, value: f64) -> bool {
        self.effective_threshold().accepts(value)
    }
}

/// Alert filtering based on severity levels
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord,
)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// All events
    #[default]
    Info,
    /// Warnings and errors
    Warn,
    /// Errors only
    Error,
}

impl AlertSeverity {
    /// Whether an event of `event` severity is delivered to a provider
    /// configured with this severity
    pub fn admits(&self, event: AlertSeverity) -> bool {
        event >= *self
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// CanaryAlert routes canary events to an alert provider
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CanaryAlert {
    /// Name of the alert
    pub name: String,

    /// Severity level: info, warn, error (default info)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<AlertSeverity>,

    /// Alert provider reference
    pub provider_ref: CrossNamespaceObjectReference,
}

impl CanaryAlert {
    /// Configured severity, `info` when unset
    pub fn severity(&self) -> AlertSeverity {
        self.severity.unwrap_or_default()
    }
}

/// CanaryWebhook holds the reference to an external check
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CanaryWebhook {
    /// Lifecycle hook this webhook is bound to
    #[serde(rename = "type")]
    pub type_: HookType,

    /// Name of this webhook
    pub name: String,

    /// URL address of this webhook
    pub url: String,

    /// Request timeout for this webhook (duration string)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// Key-value pairs forwarded in the webhook payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

impl CanaryWebhook {
    /// Webhook with the given hook type, name and URL
    pub fn new(type_: HookType, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            type_,
            name: name.into(),
            url: url.into(),
            timeout: None,
            metadata: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(yaml: &str) -> CanaryMetric {
        serde_yaml::from_str(yaml).expect("metric should parse")
    }

    #[test]
    fn story_range_wins_over_deprecated_threshold() {
        let m = metric(
            r#"
name: error-rate
threshold: 1
thresholdRange:
  max: 5
templateRef:
  name: error-rate
  namespace: istio-system
"#,
        );
        assert!(matches!(m.effective_threshold(), MetricThreshold::Range(_)));
        assert!(m.accepts(3.0));
        assert!(!m.accepts(5.5));
    }

    #[test]
    fn story_legacy_metric_uses_scalar_threshold_and_query() {
        let m = metric(
            r#"
name: request-success-rate
threshold: 99
interval: 1m
query: sum(rate(requests_total[1m]))
"#,
        );
        assert_eq!(m.effective_threshold(), MetricThreshold::Max(99.0));
        assert_eq!(
            m.effective_source(),
            MetricSource::Query("sum(rate(requests_total[1m]))")
        );
        assert!(m.accepts(99.0));
        assert!(!m.accepts(99.5));
    }

    #[test]
    fn story_template_ref_wins_over_inline_query() {
        let m = metric(
            r#"
name: latency
query: histogram_quantile(0.99, x)
templateRef:
  name: latency
"#,
        );
        match m.effective_source() {
            MetricSource::Template(r) => assert_eq!(r.name, "latency"),
            other => panic!("expected template source, got {other:?}"),
        }
    }

    #[test]
    fn test_metric_without_source_or_threshold() {
        let m = metric("name: bare");
        assert_eq!(m.effective_source(), MetricSource::Missing);
        assert_eq!(m.effective_threshold(), MetricThreshold::Unbounded);
        assert!(m.accepts(f64::MAX));

        let blank = metric("name: blank\nquery: '  '");
        assert_eq!(blank.effective_source(), MetricSource::Missing);
    }

    #[test]
    fn test_threshold_range_bounds_are_inclusive() {
        let range = CanaryThresholdRange {
            min: Some(99.0),
            max: Some(100.0),
        };
        assert!(range.contains(99.0));
        assert!(range.contains(100.0));
        assert!(!range.contains(98.9));
        assert!(!range.contains(100.1));

        let min_only = CanaryThresholdRange {
            min: Some(1.0),
            max: None,
        };
        assert!(min_only.contains(1e9));
        assert!(!min_only.contains(0.5));
    }

    #[test]
    fn test_empty_threshold_range_is_unbounded() {
        let m = metric("name: smell\nthresholdRange: {}");
        let threshold = m.effective_threshold();
        assert!(matches!(threshold, MetricThreshold::Range(_)));
        assert!(threshold.is_unbounded());
        assert!(m.accepts(-1e12));
    }

    #[test]
    fn test_alert_severity_default_and_filtering() {
        let alert: CanaryAlert =
            serde_yaml::from_str("name: on-call\nproviderRef:\n  name: slack")
                .expect("alert should parse");
        assert_eq!(alert.severity(), AlertSeverity::Info);
        assert!(alert.severity.is_none());

        assert!(AlertSeverity::Info.admits(AlertSeverity::Info));
        assert!(AlertSeverity::Warn.admits(AlertSeverity::Error));
        assert!(!AlertSeverity::Warn.admits(AlertSeverity::Info));
        assert!(!AlertSeverity::Error.admits(AlertSeverity::Warn));
        assert_eq!(AlertSeverity::Warn.to_string(), "warn");
    }

    #[test]
    fn test_webhook_yaml() {
        let yaml = r#"
name: load-test
type: rollout
url: http://flagger-loadtester.test/
timeout: 5s
metadata:
  cmd: "hey -z 1m -q 10 -c 2 http://podinfo-canary.test:9898/"
"#;
        let hook: CanaryWebhook = serde_yaml::from_str(yaml).expect("webhook should parse");
        assert_eq!(hook.type_, HookType::Rollout);
        assert_eq!(hook.timeout.as_deref(), Some("5s"));
        assert!(hook
            .metadata
            .as_ref()
            .is_some_and(|m| m.contains_key("cmd")));
    }

    #[test]
    fn test_webhook_rejects_unknown_hook_type() {
        let yaml = "name: x\ntype: mid-rollout\nurl: http://x/";
        assert!(serde_yaml::from_str::<CanaryWebhook>(yaml).is_err());
    }
}

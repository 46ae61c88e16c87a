//! Configuration smells and structural checks for canaries.
//!
//! Smells never stop a canary from resolving. They point at settings that
//! are legal but almost certainly not what the author meant: analysis
//! policies written twice, metric checks that cannot fail, deprecated forms
//! shadowed by their replacements.

use kube::ResourceExt;
use serde::Serialize;

use crate::crd::{Canary, MetricSource, MetricThreshold};
use crate::resolve::{AnalysisSource, Diagnostic};
use crate::Result;

/// A legal but suspicious setting
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ConfigSmell {
    /// Both `analysis` and `canaryAnalysis` are set; the latter is ignored
    BothAnalysisForms,
    /// Only the deprecated `canaryAnalysis` is set
    DeprecatedAnalysis,
    /// A metric's `thresholdRange` has neither bound, so it always passes
    EmptyThresholdRange {
        /// Metric name
        metric: String,
    },
    /// A metric has neither `templateRef` nor `query`
    MetricWithoutSource {
        /// Metric name
        metric: String,
    },
    /// A metric sets both `threshold` and `thresholdRange`; the scalar is ignored
    MetricBothThresholds {
        /// Metric name
        metric: String,
    },
    /// A metric sets both `query` and `templateRef`; the query is ignored
    MetricBothSources {
        /// Metric name
        metric: String,
    },
    /// A value fell back to its default during resolution
    Fallback {
        /// What the resolver substituted
        diagnostic: Diagnostic,
    },
}

impl std::fmt::Display for ConfigSmell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BothAnalysisForms => {
                write!(f, "spec.analysis and spec.canaryAnalysis are both set; spec.canaryAnalysis is ignored")
            }
            Self::DeprecatedAnalysis => {
                write!(f, "spec.canaryAnalysis is deprecated, use spec.analysis")
            }
            Self::EmptyThresholdRange { metric } => {
                write!(f, "metric {metric}: thresholdRange has no bounds and always passes")
            }
            Self::MetricWithoutSource { metric } => {
                write!(f, "metric {metric}: neither templateRef nor query is set")
            }
            Self::MetricBothThresholds { metric } => {
                write!(f, "metric {metric}: threshold is ignored because thresholdRange is set")
            }
            Self::MetricBothSources { metric } => {
                write!(f, "metric {metric}: query is ignored because templateRef is set")
            }
            Self::Fallback { diagnostic } => write!(f, "{diagnostic}"),
        }
    }
}

/// Collect every smell of a canary; an empty list means nothing suspicious
pub fn lint(canary: &Canary) -> Vec<ConfigSmell> {
    let spec = &canary.spec;
    let mut smells = Vec::new();

    let Some(source) = spec.analysis_source() else {
        return smells;
    };
    match source {
        AnalysisSource::Current(_) if spec.canary_analysis.is_some() => {
            smells.push(ConfigSmell::BothAnalysisForms)
        }
        AnalysisSource::Deprecated(_) => smells.push(ConfigSmell::DeprecatedAnalysis),
        AnalysisSource::Current(_) => {}
    }

    let analysis = source.analysis();
    for metric in analysis.metrics() {
        let name = || metric.name.clone();
        if matches!(metric.effective_threshold(), MetricThreshold::Range(r) if r.is_unbounded()) {
            smells.push(ConfigSmell::EmptyThresholdRange { metric: name() });
        }
        if metric.threshold_range.is_some() && metric.threshold.is_some() {
            smells.push(ConfigSmell::MetricBothThresholds { metric: name() });
        }
        if metric.effective_source() == MetricSource::Missing {
            smells.push(ConfigSmell::MetricWithoutSource { metric: name() });
        }
        if metric.template_ref.is_some() && metric.query.is_some() {
            smells.push(ConfigSmell::MetricBothSources { metric: name() });
        }
    }

    // Only values written in the record count; unset fields default silently.
    let mut fallbacks = Vec::new();
    if analysis.interval.is_some() {
        fallbacks.extend(analysis.effective_interval().diagnostic);
    }
    if analysis.threshold.is_some() {
        fallbacks.extend(analysis.effective_threshold().diagnostic);
    }
    for webhook in analysis.webhooks() {
        fallbacks.extend(webhook.effective_timeout().diagnostic);
    }
    smells.extend(
        fallbacks
            .into_iter()
            .map(|diagnostic| ConfigSmell::Fallback { diagnostic }),
    );

    smells
}

/// Structural checks of a canary; see [`crate::CanarySpec::validate`]
pub fn validate(canary: &Canary) -> Result<()> {
    canary.spec.validate(&canary.name_any())
}

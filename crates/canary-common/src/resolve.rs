//! Effective values for partially specified canaries.
//!
//! A stored Canary may omit most of its settings, spell them in a
//! deprecated form or carry values that do not parse. The functions here
//! never fail: each one returns the value a controller should act on and,
//! through [`Resolved`], says when it had to fall back to a default.

use std::time::Duration;

use kube::ResourceExt;
use serde::Serialize;
use tracing::debug;

use crate::crd::{Canary, CanaryAnalysis, CanarySpec, CanaryWebhook};

/// Progress deadline used when `progressDeadlineSeconds` is unset
pub const PROGRESS_DEADLINE_SECONDS: i32 = 600;

/// Analysis interval used when the configured one is missing or malformed
pub const ANALYSIS_INTERVAL: Duration = Duration::from_secs(60);

/// Lower bound of the analysis interval
pub const MIN_ANALYSIS_INTERVAL: Duration = Duration::from_secs(10);

/// Default metric query window
pub const METRIC_INTERVAL: &str = "1m";

/// Webhook request timeout used when none is configured
pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Suffix of the primary service name
pub const PRIMARY_SUFFIX: &str = "-primary";

/// Suffix of the canary service name
pub const CANARY_SUFFIX: &str = "-canary";

/// Why a resolved value differs from what the record says
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Diagnostic {
    /// The raw value could not be parsed and the default was used
    Unparseable {
        /// Field path of the value
        field: String,
        /// Value as found in the record
        raw: String,
        /// Parser message
        reason: String,
    },
    /// The value was below the allowed minimum and was raised to it
    Clamped {
        /// Field path of the value
        field: String,
        /// Value as found in the record
        requested: String,
        /// Value used instead
        minimum: String,
    },
    /// The value was absent or out of range and the default was used
    Defaulted {
        /// Field path of the value
        field: String,
        /// What was wrong with the recorded value
        reason: String,
    },
}

impl Diagnostic {
    /// Field path the diagnostic refers to
    pub fn field(&self) -> &str {
        match self {
            Self::Unparseable { field, .. }
            | Self::Clamped { field, .. }
            | Self::Defaulted { field, .. } => field,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unparseable { field, raw, reason } => {
                write!(f, "{field}: cannot parse {raw:?} ({reason}), using default")
            }
            Self::Clamped {
                field,
                requested,
                minimum,
            } => write!(f, "{field}: {requested} is below the minimum, using {minimum}"),
            Self::Defaulted { field, reason } => write!(f, "{field}: {reason}, using default"),
        }
    }
}

/// A resolved value together with the fallback that produced it, if any
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolved<T> {
    /// The value to act on
    pub value: T,
    /// Set when the value is not the one written in the record
    pub diagnostic: Option<Diagnostic>,
}

impl<T> Resolved<T> {
    /// Value taken from the record as is
    pub fn exact(value: T) -> Self {
        Self {
            value,
            diagnostic: None,
        }
    }

    /// Value substituted for what the record says
    pub fn fallback(value: T, diagnostic: Diagnostic) -> Self {
        debug!(%diagnostic, "falling back to default");
        Self {
            value,
            diagnostic: Some(diagnostic),
        }
    }

    /// True when a default replaced the recorded value
    pub fn is_fallback(&self) -> bool {
        self.diagnostic.is_some()
    }
}

/// Names of the three services generated for a canary
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ServiceNames {
    /// Service selecting both primary and canary pods
    pub apex: String,
    /// Service selecting the primary pods
    pub primary: String,
    /// Service selecting the canary pods
    pub canary: String,
}

/// Which of the two analysis fields is authoritative
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AnalysisSource<'a> {
    /// `spec.analysis`
    Current(&'a CanaryAnalysis),
    /// `spec.canaryAnalysis`, used only when `spec.analysis` is absent
    Deprecated(&'a CanaryAnalysis),
}

impl<'a> AnalysisSource<'a> {
    /// The analysis policy, whichever field it came from
    pub fn analysis(&self) -> &'a CanaryAnalysis {
        match self {
            Self::Current(a) | Self::Deprecated(a) => a,
        }
    }

    /// Field path of the winning form
    pub fn field(&self) -> &'static str {
        match self {
            Self::Current(_) => "spec.analysis",
            Self::Deprecated(_) => "spec.canaryAnalysis",
        }
    }

    /// True for the deprecated form
    pub fn is_deprecated(&self) -> bool {
        matches!(self, Self::Deprecated(_))
    }
}

impl CanarySpec {
    /// Apex, primary and canary service names.
    ///
    /// The apex is `service.name` when set and non-empty, otherwise the
    /// target name.
    pub fn service_names(&self) -> ServiceNames {
        let apex = self
            .service
            .name_override()
            .unwrap_or(&self.target_ref.name)
            .to_string();
        ServiceNames {
            primary: format!("{apex}{PRIMARY_SUFFIX}"),
            canary: format!("{apex}{CANARY_SUFFIX}"),
            apex,
        }
    }

    /// Progress deadline in seconds; an explicit value is used even if zero
    pub fn progress_deadline_seconds(&self) -> i32 {
        self.progress_deadline_seconds
            .unwrap_or(PROGRESS_DEADLINE_SECONDS)
    }

    /// The authoritative analysis field, tagged with its origin
    pub fn analysis_source(&self) -> Option<AnalysisSource<'_>> {
        match (&self.analysis, &self.canary_analysis) {
            (Some(current), _) => Some(AnalysisSource::Current(current)),
            (None, Some(legacy)) => Some(AnalysisSource::Deprecated(legacy)),
            (None, None) => None,
        }
    }

    /// `spec.analysis` if present, else `spec.canaryAnalysis`
    pub fn effective_analysis(&self) -> Option<&CanaryAnalysis> {
        self.analysis_source().map(|s| s.analysis())
    }

    /// Whether the release is promoted without analysis.
    ///
    /// A spec without any analysis policy always skips; otherwise the
    /// `skipAnalysis` flag decides.
    pub fn skip_analysis(&self) -> bool {
        if self.analysis.is_none() && self.canary_analysis.is_none() {
            return true;
        }
        self.skip_analysis.unwrap_or(false)
    }
}

impl CanaryAnalysis {
    /// Analysis interval: 60s when empty or malformed, never below 10s
    pub fn effective_interval(&self) -> Resolved<Duration> {
        const FIELD: &str = "analysis.interval";

        let raw = self.interval.as_deref().unwrap_or_default();
        if raw.trim().is_empty() {
            return Resolved::fallback(
                ANALYSIS_INTERVAL,
                Diagnostic::Defaulted {
                    field: FIELD.to_string(),
                    reason: "interval not set".to_string(),
                },
            );
        }

        match parse_duration(raw) {
            Ok(ParsedDuration::Positive(interval)) if interval >= MIN_ANALYSIS_INTERVAL => {
                Resolved::exact(interval)
            }
            Ok(_) => Resolved::fallback(
                MIN_ANALYSIS_INTERVAL,
                Diagnostic::Clamped {
                    field: FIELD.to_string(),
                    requested: raw.to_string(),
                    minimum: humantime::format_duration(MIN_ANALYSIS_INTERVAL).to_string(),
                },
            ),
            Err(reason) => Resolved::fallback(
                ANALYSIS_INTERVAL,
                Diagnostic::Unparseable {
                    field: FIELD.to_string(),
                    raw: raw.to_string(),
                    reason,
                },
            ),
        }
    }

    /// Failed checks tolerated before rollback: the configured value when
    /// positive, otherwise 1
    pub fn effective_threshold(&self) -> Resolved<u32> {
        match self.threshold {
            Some(t) if t > 0 => Resolved::exact(t.unsigned_abs()),
            other => Resolved::fallback(
                1,
                Diagnostic::Defaulted {
                    field: "analysis.threshold".to_string(),
                    reason: match other {
                        Some(t) => format!("threshold {t} is not positive"),
                        None => "threshold not set".to_string(),
                    },
                },
            ),
        }
    }

    /// Default metric query window; the same for every analysis
    pub fn metric_interval(&self) -> &'static str {
        METRIC_INTERVAL
    }
}

impl CanaryWebhook {
    /// Request timeout: 10s when empty, malformed or not positive
    pub fn effective_timeout(&self) -> Resolved<Duration> {
        let field = format!("webhooks[{}].timeout", self.name);
        let raw = self.timeout.as_deref().unwrap_or_default();
        if raw.trim().is_empty() {
            return Resolved::exact(WEBHOOK_TIMEOUT);
        }
        match parse_duration(raw) {
            Ok(ParsedDuration::Positive(timeout)) if !timeout.is_zero() => {
                Resolved::exact(timeout)
            }
            Ok(_) => Resolved::fallback(
                WEBHOOK_TIMEOUT,
                Diagnostic::Defaulted {
                    field,
                    reason: format!("timeout {raw:?} is not positive"),
                },
            ),
            Err(reason) => Resolved::fallback(
                WEBHOOK_TIMEOUT,
                Diagnostic::Unparseable {
                    field,
                    raw: raw.to_string(),
                    reason,
                },
            ),
        }
    }
}

enum ParsedDuration {
    Positive(Duration),
    Negative,
}

/// Nanoseconds per duration unit
const UNITS: &[(&str, u128)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("\u{b5}s", 1_000),
    ("\u{3bc}s", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60_000_000_000),
    ("h", 3_600_000_000_000),
];

/// Longest representable duration, in nanoseconds
const MAX_NANOS: u128 = i64::MAX as u128;

/// Parse a duration string such as `30s`, `1m30s`, `1.5m` or `2h`.
///
/// A duration is an optionally signed sequence of decimal numbers, each
/// with a unit out of `ns`, `us` (`µs`), `ms`, `s`, `m` and `h`, with no
/// spaces. `0` is accepted on its own. A leading `-` yields a negative
/// duration, which callers treat as below any minimum.
fn parse_duration(raw: &str) -> Result<ParsedDuration, String> {
    let invalid = || format!("invalid duration {raw:?}");

    let (negative, mut rest) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };
    if rest == "0" {
        return Ok(ParsedDuration::Positive(Duration::ZERO));
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let (int_part, after) = rest.split_at(int_len);
        let (frac_part, after) = match after.strip_prefix('.') {
            Some(after) => {
                let len = after.find(|c: char| !c.is_ascii_digit()).unwrap_or(after.len());
                after.split_at(len)
            }
            None => ("", after),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }

        let unit_len = after
            .find(|c: char| c == '.' || c.is_ascii_digit())
            .unwrap_or(after.len());
        let (unit, after) = after.split_at(unit_len);
        if unit.is_empty() {
            return Err(format!("missing unit in duration {raw:?}"));
        }
        let scale = UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, nanos)| *nanos)
            .ok_or_else(|| format!("unknown unit {unit:?} in duration {raw:?}"))?;

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| format!("duration {raw:?} overflows"))?
        };
        total = whole
            .checked_mul(scale)
            .and_then(|n| n.checked_add(total))
            .filter(|n| *n <= MAX_NANOS)
            .ok_or_else(|| format!("duration {raw:?} overflows"))?;

        // Digits beyond nanosecond precision of the largest unit cannot
        // change the result.
        let frac_digits = &frac_part[..frac_part.len().min(18)];
        if !frac_digits.is_empty() {
            let numerator: u128 = frac_digits.parse().map_err(|_| invalid())?;
            let denominator = 10u128.pow(frac_digits.len() as u32);
            total += numerator * scale / denominator;
            if total > MAX_NANOS {
                return Err(format!("duration {raw:?} overflows"));
            }
        }

        rest = after;
    }

    let parsed = Duration::from_nanos(total as u64);
    if negative && !parsed.is_zero() {
        Ok(ParsedDuration::Negative)
    } else {
        Ok(ParsedDuration::Positive(parsed))
    }
}

/// Every effective value of one canary, for display and inspection
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveSettings {
    /// Canary name
    pub name: String,
    /// Canary namespace
    pub namespace: String,
    /// Generated service names
    pub services: ServiceNames,
    /// Progress deadline in seconds
    pub progress_deadline_seconds: i32,
    /// Field the analysis policy came from, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_source: Option<&'static str>,
    /// Whether analysis is skipped
    pub skip_analysis: bool,
    /// Analysis interval, formatted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    /// Failed-check threshold
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u32>,
    /// Default metric query window
    pub metric_interval: &'static str,
    /// Webhook name to effective timeout, formatted
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub webhook_timeouts: Vec<(String, String)>,
    /// Fallbacks taken while resolving
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

impl Canary {
    /// Resolve every effective value of this canary
    pub fn effective_settings(&self) -> EffectiveSettings {
        let spec = &self.spec;
        let source = spec.analysis_source();
        let mut diagnostics = Vec::new();
        let mut keep = |diagnostic: Option<Diagnostic>| diagnostics.extend(diagnostic);

        let (interval, threshold, webhook_timeouts) = match source {
            Some(source) => {
                let analysis = source.analysis();
                let interval = analysis.effective_interval();
                let threshold = analysis.effective_threshold();
                let formatted = humantime::format_duration(interval.value).to_string();
                keep(interval.diagnostic);
                keep(threshold.diagnostic);
                let timeouts = analysis
                    .webhooks()
                    .iter()
                    .map(|w| {
                        let timeout = w.effective_timeout();
                        let formatted = humantime::format_duration(timeout.value).to_string();
                        keep(timeout.diagnostic);
                        (w.name.clone(), formatted)
                    })
                    .collect::<Vec<_>>();
                (Some(formatted), Some(threshold.value), timeouts)
            }
            None => (None, None, Vec::new()),
        };

        EffectiveSettings {
            name: self.name_any(),
            namespace: self.namespace().unwrap_or_default(),
            services: spec.service_names(),
            progress_deadline_seconds: spec.progress_deadline_seconds(),
            analysis_source: source.map(|s| s.field()),
            skip_analysis: spec.skip_analysis(),
            interval,
            threshold,
            metric_interval: METRIC_INTERVAL,
            webhook_timeouts,
            diagnostics,
        }
    }
}

//! Canary release schema: the `Canary` CRD, effective-value resolution,
//! webhook hook lifecycle, manifest loading and linting

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod hooks;
pub mod lint;
pub mod manifest;
pub mod resolve;

pub use crd::{Canary, CanaryAnalysis, CanaryPhase, CanarySpec, CanaryStatus, CanaryWebhook};
pub use error::Error;
pub use hooks::{HookOutcome, HookResult, HookTable, HookType};
pub use resolve::{Diagnostic, EffectiveSettings, Resolved};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

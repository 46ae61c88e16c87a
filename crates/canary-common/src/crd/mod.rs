//! Custom Resource Definition for canary releases
//!
//! The `Canary` resource and every type reachable from its spec.

mod analysis;
mod canary;
mod istio;
mod service;
mod types;

pub use analysis::{
    AlertSeverity, CanaryAlert, CanaryAnalysis, CanaryMetric, CanaryThresholdRange, CanaryWebhook,
    MetricSource, MetricThreshold,
};
pub use canary::{
    Canary, CanaryPhase, CanarySpec, CanaryStatus, CANARY_GROUP, CANARY_KIND, CANARY_VERSION,
};
pub use istio::{
    ClientTLSSettings, CorsPolicy, HTTPMatchRequest, HTTPRetry, HTTPRewrite, HeaderOperations,
    Headers, LoadBalancerSettings, StringMatch, TrafficPolicy,
};
pub use service::{CanaryService, DEFAULT_PORT_NAME};
pub use types::{Condition, ConditionStatus, CrossNamespaceObjectReference};

/// A list of canaries, as returned by the API server
pub type CanaryList = kube::core::ObjectList<Canary>;

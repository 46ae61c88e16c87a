//! Integration tests for loading and resolving canary manifests
//!
//! Each test loads a fixture the way a controller would receive it from the
//! API server and checks the effective values it would act on.

use std::time::Duration;

use kube::{CustomResourceExt, ResourceExt};

use canary_common::crd::{MetricSource, MetricThreshold};
use canary_common::hooks::{HookOutcome, HookResult, HookTable, HookType};
use canary_common::lint::{self, ConfigSmell};
use canary_common::manifest;
use canary_common::resolve::Diagnostic;
use canary_common::{Canary, CanaryPhase};

const PODINFO: &str = include_str!("fixtures/podinfo.yaml");
const LEGACY: &str = include_str!("fixtures/legacy.yaml");
const SMELLS: &str = include_str!("fixtures/smells.yaml");

fn load_one(input: &str) -> Canary {
    manifest::load_canary(input).expect("fixture should hold exactly one canary")
}

// =============================================================================
// Current-form manifests
// =============================================================================

/// Story: an Istio canary written against the current schema resolves to
/// exactly what it declares
#[test]
fn story_current_manifest_resolves_as_written() {
    let canary = load_one(PODINFO);
    assert_eq!(canary.name_any(), "podinfo");

    let settings = canary.effective_settings();
    assert_eq!(settings.services.apex, "podinfo");
    assert_eq!(settings.services.primary, "podinfo-primary");
    assert_eq!(settings.progress_deadline_seconds, 60);
    assert_eq!(settings.analysis_source, Some("spec.analysis"));
    assert!(!settings.skip_analysis);
    assert_eq!(settings.interval.as_deref(), Some("15s"));
    assert_eq!(settings.threshold, Some(10));
    assert!(settings.diagnostics.is_empty());

    assert!(lint::validate(&canary).is_ok());
    assert!(lint::lint(&canary).is_empty());
}

/// Story: the webhook dispatcher walks a release phase by phase
#[test]
fn story_dispatcher_walks_release_phases() {
    let canary = load_one(PODINFO);
    let table = HookTable::for_spec(&canary.spec);

    let names = |phase: CanaryPhase| -> Vec<String> {
        table
            .for_phase(phase)
            .iter()
            .map(|h| h.webhook().name.clone())
            .collect()
    };

    assert_eq!(names(CanaryPhase::Initializing), vec!["audit"]);
    assert_eq!(
        names(CanaryPhase::Waiting),
        vec!["gate", "rollback-switch", "audit"]
    );
    assert_eq!(
        names(CanaryPhase::Progressing),
        vec![
            "acceptance-test",
            "load-test",
            "gate",
            "promotion-gate",
            "rollback-switch",
            "audit"
        ]
    );
    assert_eq!(
        names(CanaryPhase::WaitingPromotion),
        vec!["promotion-gate", "rollback-switch", "audit"]
    );
    assert_eq!(names(CanaryPhase::Succeeded), vec!["notify", "audit"]);
    assert_eq!(names(CanaryPhase::Failed), vec!["audit"]);

    let progressing = table.for_phase(CanaryPhase::Progressing);
    let load_test = progressing
        .iter()
        .find(|h| h.hook_type() == HookType::Rollout)
        .expect("rollout hook is scheduled while progressing");
    assert_eq!(
        load_test.interpret(HookResult::from_status(503)),
        HookOutcome::CountFailure
    );

    let payload = load_test.payload(&canary);
    assert_eq!(payload.namespace, "test");
    assert_eq!(payload.phase, CanaryPhase::Progressing);
    assert!(payload.metadata["cmd"].starts_with("hey"));
}

/// Story: webhook timeouts default when unset and honour explicit values
#[test]
fn story_webhook_timeouts() {
    let canary = load_one(PODINFO);
    let table = HookTable::for_spec(&canary.spec);

    let acceptance = table
        .of_type(HookType::PreRollout)
        .next()
        .expect("pre-rollout hook present");
    assert_eq!(acceptance.effective_timeout().value, Duration::from_secs(30));

    let gate = table
        .of_type(HookType::ConfirmRollout)
        .next()
        .expect("confirm-rollout hook present");
    assert_eq!(gate.effective_timeout().value, Duration::from_secs(10));
}

#[test]
fn test_metrics_prefer_current_forms() {
    let canary = load_one(PODINFO);
    let analysis = canary.spec.effective_analysis().expect("analysis present");

    let duration = &analysis.metrics()[1];
    assert!(matches!(
        duration.effective_source(),
        MetricSource::Template(r) if r.namespace.as_deref() == Some("istio-system")
    ));
    assert!(matches!(
        duration.effective_threshold(),
        MetricThreshold::Range(_)
    ));
    assert!(duration.accepts(500.0));
    assert!(!duration.accepts(501.0));
}

// =============================================================================
// Deprecated-form manifests
// =============================================================================

/// Story: a manifest still using canaryAnalysis keeps working, with the
/// resolver cleaning up its out-of-range values
#[test]
fn story_legacy_manifest_keeps_working() {
    let canary = load_one(LEGACY);
    let settings = canary.effective_settings();

    assert_eq!(settings.services.apex, "backend-svc");
    assert_eq!(settings.services.canary, "backend-svc-canary");
    assert_eq!(settings.progress_deadline_seconds, 600);
    assert_eq!(settings.analysis_source, Some("spec.canaryAnalysis"));
    assert!(settings.skip_analysis);
    assert_eq!(settings.interval.as_deref(), Some("10s"));
    assert_eq!(settings.threshold, Some(1));
    assert_eq!(
        settings.webhook_timeouts,
        vec![("load-test".to_string(), "10s".to_string())]
    );

    let fields: Vec<&str> = settings.diagnostics.iter().map(Diagnostic::field).collect();
    assert_eq!(
        fields,
        vec!["analysis.interval", "analysis.threshold", "webhooks[load-test].timeout"]
    );

    let metric = &canary
        .spec
        .effective_analysis()
        .expect("deprecated analysis is used")
        .metrics()[0];
    assert!(matches!(metric.effective_source(), MetricSource::Query(q) if q.contains("istio_requests_total")));
    assert_eq!(metric.effective_threshold(), MetricThreshold::Max(99.0));

    let smells = lint::lint(&canary);
    assert_eq!(smells[0], ConfigSmell::DeprecatedAnalysis);
}

// =============================================================================
// Smells and structural errors
// =============================================================================

/// Story: a reviewer lints a manifest that has drifted over time
#[test]
fn story_lint_reports_drift() {
    let canaries = manifest::load_canaries(SMELLS).expect("manifest should load");
    assert_eq!(canaries.len(), 2);

    let frontend = &canaries[0];
    let smells = lint::lint(frontend);
    assert!(smells.contains(&ConfigSmell::BothAnalysisForms));
    assert!(smells.contains(&ConfigSmell::EmptyThresholdRange {
        metric: "always-passes".to_string()
    }));
    assert!(smells.contains(&ConfigSmell::MetricWithoutSource {
        metric: "orphan".to_string()
    }));
    assert!(smells.iter().any(|s| matches!(
        s,
        ConfigSmell::Fallback {
            diagnostic: Diagnostic::Unparseable { .. }
        }
    )));

    // The current form wins even though the deprecated one is valid.
    let settings = frontend.effective_settings();
    assert_eq!(settings.threshold, Some(3));
    assert_eq!(settings.interval.as_deref(), Some("1m"));

    assert!(lint::validate(frontend).is_ok());
    let err = lint::validate(&canaries[1]).unwrap_err();
    assert_eq!(err.canary(), Some("broken"));
    assert_eq!(err.field(), Some("spec.targetRef.name"));
}

#[test]
fn test_saved_manifests_reload_unchanged() {
    for fixture in [PODINFO, LEGACY, SMELLS] {
        let canaries = manifest::load_canaries(fixture).expect("fixture should load");
        let saved = manifest::to_yaml(&canaries).expect("canaries should serialize");
        let reloaded = manifest::load_canaries(&saved).expect("saved manifest should load");
        let before: Vec<_> = canaries.iter().map(|c| &c.spec).collect();
        let after: Vec<_> = reloaded.iter().map(|c| &c.spec).collect();
        assert_eq!(before, after);
    }
}

/// Story: a canary read back from the cluster, status included, is saved
/// to disk and reloaded without fields appearing or disappearing
#[test]
fn story_status_and_empty_lists_survive_save_and_reload() {
    let yaml = r#"
apiVersion: flagger.app/v1beta1
kind: Canary
metadata:
  name: podinfo
  namespace: test
spec:
  targetRef:
    name: podinfo
  service:
    port: 9898
    gateways: []
    hosts: [app.example.com]
  analysis:
    webhooks: []
    metrics: []
status:
  phase: Progressing
"#;
    let canary = load_one(yaml);
    let status = canary.status.as_ref().expect("status present");
    assert_eq!(status.phase, Some(CanaryPhase::Progressing));
    assert!(status.failed_checks.is_none());
    assert!(status.canary_weight.is_none());
    assert!(status.iterations.is_none());

    let saved = manifest::to_yaml(std::slice::from_ref(&canary)).expect("canary should serialize");
    assert!(!saved.contains("failedChecks"));
    assert!(!saved.contains("canaryWeight"));
    assert!(!saved.contains("iterations"));
    assert!(!saved.contains("alerts"));

    let reloaded = load_one(&saved);
    assert_eq!(reloaded.spec, canary.spec);
    assert_eq!(reloaded.status, canary.status);
    assert_eq!(reloaded.spec.service.gateways, Some(Vec::new()));
    let analysis = reloaded.spec.analysis.as_ref().expect("analysis kept");
    assert_eq!(analysis.webhooks, Some(Vec::new()));
    assert_eq!(analysis.metrics, Some(Vec::new()));
    assert!(analysis.alerts.is_none());
    assert!(HookTable::for_spec(&reloaded.spec).is_empty());
}

// =============================================================================
// CRD generation
// =============================================================================

#[test]
fn test_generated_crd_names() {
    let crd = Canary::crd();
    assert_eq!(crd.metadata.name.as_deref(), Some("canaries.flagger.app"));
    assert_eq!(crd.spec.group, "flagger.app");
    assert_eq!(crd.spec.names.kind, "Canary");
    assert_eq!(crd.spec.names.plural, "canaries");
    assert_eq!(crd.spec.scope, "Namespaced");

    let version = &crd.spec.versions[0];
    assert_eq!(version.name, "v1beta1");
    assert!(version.subresources.as_ref().is_some_and(|s| s.status.is_some()));
    let columns: Vec<&str> = version
        .additional_printer_columns
        .iter()
        .flatten()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(
        columns,
        vec!["Status", "Weight", "FailedChecks", "LastTransitionTime"]
    );
}

//! Webhook hook types and their lifecycle rules.
//!
//! Every webhook in an analysis policy is bound to a [`HookType`]. The hook
//! type decides in which [`CanaryPhase`]s the webhook may be called and what
//! its answer means for the release. The rollout controller drives the
//! phases; this module only encodes the contract it has to honour:
//!
//! | hook                | phases                                | on success     | on failure       |
//! |---------------------|---------------------------------------|----------------|------------------|
//! | `pre-rollout`       | Progressing                           | proceed        | block the start  |
//! | `rollout`           | Progressing                           | proceed        | count a failure  |
//! | `confirm-rollout`   | Waiting, Progressing                  | proceed        | hold             |
//! | `confirm-promotion` | Progressing, WaitingPromotion         | proceed        | hold promotion   |
//! | `post-rollout`      | Succeeded                             | proceed        | log only         |
//! | `rollback`          | Waiting, Progressing, WaitingPromotion| force rollback | proceed          |
//! | `event`             | every phase                           | ignored        | ignored          |
//!
//! Dispatchers should go through [`HookTable::for_phase`]: it only hands out
//! webhooks that are eligible in the requested phase, so an out-of-phase
//! call cannot be expressed through it.

use std::collections::BTreeMap;

use kube::ResourceExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::{Canary, CanaryPhase, CanarySpec, CanaryWebhook};

/// Lifecycle hook a webhook is bound to
#[derive(
    Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "kebab-case")]
pub enum HookType {
    /// Called once before traffic is routed to the canary
    PreRollout,
    /// Called on every analysis iteration
    Rollout,
    /// Halts the analysis until it returns success
    ConfirmRollout,
    /// Halts the promotion until it returns success
    ConfirmPromotion,
    /// Called once after the release was promoted
    PostRollout,
    /// Rolls the release back when it returns success
    Rollback,
    /// Receives every phase transition as a notification
    Event,
}

impl HookType {
    /// Every hook type
    pub const ALL: [HookType; 7] = [
        Self::PreRollout,
        Self::Rollout,
        Self::ConfirmRollout,
        Self::ConfirmPromotion,
        Self::PostRollout,
        Self::Rollback,
        Self::Event,
    ];

    /// Wire name of the hook type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreRollout => "pre-rollout",
            Self::Rollout => "rollout",
            Self::ConfirmRollout => "confirm-rollout",
            Self::ConfirmPromotion => "confirm-promotion",
            Self::PostRollout => "post-rollout",
            Self::Rollback => "rollback",
            Self::Event => "event",
        }
    }

    /// Phases in which a webhook of this type may be called
    pub fn eligible_phases(&self) -> &'static [CanaryPhase] {
        use CanaryPhase::*;
        match self {
            Self::PreRollout | Self::Rollout => &[Progressing],
            Self::ConfirmRollout => &[Waiting, Progressing],
            Self::ConfirmPromotion => &[Progressing, WaitingPromotion],
            Self::PostRollout => &[Succeeded],
            Self::Rollback => &[Waiting, Progressing, WaitingPromotion],
            Self::Event => &CanaryPhase::ALL,
        }
    }

    /// Whether a webhook of this type may be called in `phase`
    pub fn is_eligible(&self, phase: CanaryPhase) -> bool {
        self.eligible_phases().contains(&phase)
    }

    /// How often a webhook of this type is called within its phases
    pub fn cadence(&self) -> HookCadence {
        match self {
            Self::PreRollout | Self::PostRollout => HookCadence::Once,
            Self::Rollout | Self::Rollback => HookCadence::EveryIteration,
            Self::ConfirmRollout | Self::ConfirmPromotion => HookCadence::UntilConfirmed,
            Self::Event => HookCadence::EveryTransition,
        }
    }

    /// What a webhook result means for the release
    pub fn interpret(&self, result: HookResult) -> HookOutcome {
        let ok = result.is_success();
        match self {
            Self::PreRollout if ok => HookOutcome::Proceed,
            Self::PreRollout => HookOutcome::Block,
            Self::Rollout if ok => HookOutcome::Proceed,
            Self::Rollout => HookOutcome::CountFailure,
            Self::ConfirmRollout | Self::ConfirmPromotion if ok => HookOutcome::Proceed,
            Self::ConfirmRollout | Self::ConfirmPromotion => HookOutcome::Hold,
            Self::PostRollout if ok => HookOutcome::Proceed,
            Self::PostRollout => HookOutcome::LogOnly,
            Self::Rollback if ok => HookOutcome::ForceRollback,
            Self::Rollback => HookOutcome::Proceed,
            Self::Event => HookOutcome::Ignore,
        }
    }
}

impl std::fmt::Display for HookType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HookType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|h| h.as_str() == s)
            .ok_or_else(|| {
                crate::Error::validation(format!(
                    "invalid hook type: {s}, expected one of: pre-rollout, rollout, confirm-rollout, confirm-promotion, post-rollout, rollback, event"
                ))
            })
    }
}

/// Call frequency of a hook within its eligible phases
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookCadence {
    /// Called a single time per release
    Once,
    /// Called on every analysis iteration
    EveryIteration,
    /// Called repeatedly until it succeeds
    UntilConfirmed,
    /// Called on every phase transition
    EveryTransition,
}

impl std::fmt::Display for HookCadence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Once => write!(f, "once"),
            Self::EveryIteration => write!(f, "every-iteration"),
            Self::UntilConfirmed => write!(f, "until-confirmed"),
            Self::EveryTransition => write!(f, "every-transition"),
        }
    }
}

/// Result of one webhook call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookResult {
    /// The endpoint answered with a 2xx status
    Success,
    /// Non-2xx status, timeout or transport error
    Failure,
}

impl HookResult {
    /// Classify an HTTP status code; only 2xx counts as success
    pub fn from_status(code: u16) -> Self {
        if (200..300).contains(&code) {
            Self::Success
        } else {
            Self::Failure
        }
    }

    /// True for [`HookResult::Success`]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Effect of a webhook result on the release
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookOutcome {
    /// Continue as planned
    Proceed,
    /// Do not start the rollout
    Block,
    /// Pause until a later call succeeds; nothing is counted as failed
    Hold,
    /// Count one failed check toward the analysis threshold
    CountFailure,
    /// Roll back now, whatever the failed-check count
    ForceRollback,
    /// Record the failure; the release is not changed
    LogOnly,
    /// The result carries no meaning
    Ignore,
}

impl HookOutcome {
    /// Whether the release stops advancing because of this outcome
    pub fn halts_progress(&self) -> bool {
        matches!(self, Self::Block | Self::Hold | Self::ForceRollback)
    }

    /// Whether the outcome adds to the failed-check count
    pub fn counts_toward_threshold(&self) -> bool {
        matches!(self, Self::CountFailure)
    }
}

impl std::fmt::Display for HookOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Proceed => write!(f, "proceed"),
            Self::Block => write!(f, "block"),
            Self::Hold => write!(f, "hold"),
            Self::CountFailure => write!(f, "count-failure"),
            Self::ForceRollback => write!(f, "force-rollback"),
            Self::LogOnly => write!(f, "log-only"),
            Self::Ignore => write!(f, "ignore"),
        }
    }
}

/// Body sent to a webhook endpoint
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CanaryWebhookPayload {
    /// Name of the canary
    pub name: String,

    /// Namespace of the canary
    pub namespace: String,

    /// Phase of the canary when the webhook was called
    pub phase: CanaryPhase,

    /// Key-value pairs from the webhook definition
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl CanaryWebhookPayload {
    /// Payload for calling `webhook` on behalf of `canary` in `phase`
    pub fn for_hook(canary: &Canary, phase: CanaryPhase, webhook: &CanaryWebhook) -> Self {
        Self {
            name: canary.name_any(),
            namespace: canary.namespace().unwrap_or_default(),
            phase,
            metadata: webhook.metadata.clone().unwrap_or_default(),
        }
    }
}

/// Phase-indexed view of the webhooks of an analysis policy
#[derive(Clone, Copy, Debug)]
pub struct HookTable<'a> {
    webhooks: &'a [CanaryWebhook],
}

impl<'a> HookTable<'a> {
    /// Table over an explicit webhook list
    pub fn new(webhooks: &'a [CanaryWebhook]) -> Self {
        Self { webhooks }
    }

    /// Table over the webhooks of the effective analysis policy; empty when
    /// there is no analysis policy
    pub fn for_spec(spec: &'a CanarySpec) -> Self {
        let webhooks = spec
            .effective_analysis()
            .map(|a| a.webhooks())
            .unwrap_or(&[]);
        Self::new(webhooks)
    }

    /// True if there are no webhooks at all
    pub fn is_empty(&self) -> bool {
        self.webhooks.is_empty()
    }

    /// Webhooks of one type, in declaration order
    pub fn of_type(&self, hook_type: HookType) -> impl Iterator<Item = &'a CanaryWebhook> {
        self.webhooks.iter().filter(move |w| w.type_ == hook_type)
    }

    /// Webhooks that may be called in `phase`, in declaration order
    pub fn for_phase(&self, phase: CanaryPhase) -> Vec<ScheduledHook<'a>> {
        self.webhooks
            .iter()
            .filter(|w| w.type_.is_eligible(phase))
            .map(|webhook| ScheduledHook { phase, webhook })
            .collect()
    }

    /// Webhooks grouped by the phases they are eligible in
    pub fn by_phase(&self) -> BTreeMap<String, Vec<&'a str>> {
        CanaryPhase::ALL
            .into_iter()
            .map(|phase| {
                let names = self
                    .for_phase(phase)
                    .into_iter()
                    .map(|h| h.webhook.name.as_str())
                    .collect();
                (phase.to_string(), names)
            })
            .collect()
    }
}

/// A webhook cleared for a call in a specific phase.
///
/// Only [`HookTable::for_phase`] creates these, so holding one proves the
/// hook type is eligible in [`ScheduledHook::phase`].
#[derive(Clone, Copy, Debug)]
pub struct ScheduledHook<'a> {
    phase: CanaryPhase,
    webhook: &'a CanaryWebhook,
}

impl<'a> ScheduledHook<'a> {
    /// Phase the call belongs to
    pub fn phase(&self) -> CanaryPhase {
        self.phase
    }

    /// The webhook definition
    pub fn webhook(&self) -> &'a CanaryWebhook {
        self.webhook
    }

    /// Hook type of the webhook
    pub fn hook_type(&self) -> HookType {
        self.webhook.type_
    }

    /// Call frequency of the webhook
    pub fn cadence(&self) -> HookCadence {
        self.webhook.type_.cadence()
    }

    /// What the call result means for the release
    pub fn interpret(&self, result: HookResult) -> HookOutcome {
        self.webhook.type_.interpret(result)
    }

    /// Payload for calling this webhook on behalf of `canary`
    pub fn payload(&self, canary: &Canary) -> CanaryWebhookPayload {
        CanaryWebhookPayload::for_hook(canary, self.phase, self.webhook)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{CanaryAnalysis, CrossNamespaceObjectReference};
    use CanaryPhase::*;

    fn webhooks() -> Vec<CanaryWebhook> {
        HookType::ALL
            .into_iter()
            .map(|t| CanaryWebhook::new(t, format!("{t}-hook"), format!("http://hooks/{t}")))
            .collect()
    }

    fn names(hooks: &[ScheduledHook<'_>]) -> Vec<String> {
        hooks.iter().map(|h| h.webhook().name.clone()).collect()
    }

    #[test]
    fn test_hook_type_wire_names() {
        for hook in HookType::ALL {
            let json = serde_json::to_value(hook).expect("hook type should serialize");
            assert_eq!(json, hook.as_str());
            let parsed: HookType = hook.as_str().parse().expect("hook type should parse");
            assert_eq!(parsed, hook);
        }
        assert!("pre_rollout".parse::<HookType>().is_err());
    }

    #[test]
    fn test_eligibility_table() {
        assert!(HookType::PreRollout.is_eligible(Progressing));
        assert!(!HookType::PreRollout.is_eligible(Waiting));
        assert!(HookType::Rollout.is_eligible(Progressing));
        assert!(!HookType::Rollout.is_eligible(Succeeded));
        assert!(HookType::ConfirmRollout.is_eligible(Waiting));
        assert!(HookType::ConfirmPromotion.is_eligible(WaitingPromotion));
        assert!(!HookType::ConfirmPromotion.is_eligible(Waiting));
        assert!(HookType::PostRollout.is_eligible(Succeeded));
        assert!(!HookType::PostRollout.is_eligible(Failed));
        assert!(HookType::Rollback.is_eligible(WaitingPromotion));
        assert!(!HookType::Rollback.is_eligible(Promoting));
        for phase in CanaryPhase::ALL {
            assert!(HookType::Event.is_eligible(phase));
        }
    }

    #[test]
    fn test_rollback_only_fires_while_analysing() {
        for phase in CanaryPhase::ALL {
            assert_eq!(HookType::Rollback.is_eligible(phase), phase.is_analysing());
        }
    }

    #[test]
    fn test_outcome_table() {
        use HookResult::{Failure, Success};

        assert_eq!(HookType::PreRollout.interpret(Success), HookOutcome::Proceed);
        assert_eq!(HookType::PreRollout.interpret(Failure), HookOutcome::Block);
        assert_eq!(HookType::Rollout.interpret(Failure), HookOutcome::CountFailure);
        assert_eq!(HookType::ConfirmRollout.interpret(Failure), HookOutcome::Hold);
        assert_eq!(HookType::ConfirmPromotion.interpret(Failure), HookOutcome::Hold);
        assert_eq!(HookType::ConfirmPromotion.interpret(Success), HookOutcome::Proceed);
        assert_eq!(HookType::PostRollout.interpret(Failure), HookOutcome::LogOnly);
        assert_eq!(HookType::Rollback.interpret(Success), HookOutcome::ForceRollback);
        assert_eq!(HookType::Rollback.interpret(Failure), HookOutcome::Proceed);
        assert_eq!(HookType::Event.interpret(Success), HookOutcome::Ignore);
        assert_eq!(HookType::Event.interpret(Failure), HookOutcome::Ignore);
    }

    #[test]
    fn test_outcome_effects() {
        assert!(HookOutcome::Hold.halts_progress());
        assert!(HookOutcome::ForceRollback.halts_progress());
        assert!(!HookOutcome::LogOnly.halts_progress());
        assert!(HookOutcome::CountFailure.counts_toward_threshold());
        assert!(!HookOutcome::Hold.counts_toward_threshold());
    }

    #[test]
    fn test_status_code_classification() {
        assert_eq!(HookResult::from_status(200), HookResult::Success);
        assert_eq!(HookResult::from_status(204), HookResult::Success);
        assert_eq!(HookResult::from_status(299), HookResult::Success);
        assert_eq!(HookResult::from_status(199), HookResult::Failure);
        assert_eq!(HookResult::from_status(302), HookResult::Failure);
        assert_eq!(HookResult::from_status(500), HookResult::Failure);
    }

    #[test]
    fn test_cadence() {
        assert_eq!(HookType::PreRollout.cadence(), HookCadence::Once);
        assert_eq!(HookType::Rollout.cadence(), HookCadence::EveryIteration);
        assert_eq!(HookType::ConfirmRollout.cadence(), HookCadence::UntilConfirmed);
        assert_eq!(HookType::Event.cadence(), HookCadence::EveryTransition);
    }

    #[test]
    fn story_dispatcher_only_sees_eligible_hooks() {
        let hooks = webhooks();
        let table = HookTable::new(&hooks);

        assert_eq!(
            names(&table.for_phase(Waiting)),
            vec!["confirm-rollout-hook", "rollback-hook", "event-hook"]
        );
        assert_eq!(
            names(&table.for_phase(Succeeded)),
            vec!["post-rollout-hook", "event-hook"]
        );
        assert_eq!(names(&table.for_phase(Initializing)), vec!["event-hook"]);

        for phase in CanaryPhase::ALL {
            for scheduled in table.for_phase(phase) {
                assert!(scheduled.hook_type().is_eligible(scheduled.phase()));
            }
        }
    }

    #[test]
    fn test_by_phase_lists_every_phase() {
        let hooks = webhooks();
        let grouped = HookTable::new(&hooks).by_phase();
        assert_eq!(grouped.len(), CanaryPhase::ALL.len());
        assert_eq!(grouped["Promoting"], vec!["event-hook"]);
    }

    #[test]
    fn test_table_for_spec_without_analysis_is_empty() {
        let spec = CanarySpec::new(CrossNamespaceObjectReference::new("podinfo"), 80);
        let table = HookTable::for_spec(&spec);
        assert!(table.is_empty());
        assert!(table.for_phase(Progressing).is_empty());
    }

    #[test]
    fn test_table_for_spec_uses_effective_analysis() {
        let mut spec = CanarySpec::new(CrossNamespaceObjectReference::new("podinfo"), 80);
        spec.analysis = Some(CanaryAnalysis {
            webhooks: Some(vec![CanaryWebhook::new(HookType::Rollout, "current", "http://a/")]),
            ..Default::default()
        });
        spec.canary_analysis = Some(CanaryAnalysis {
            webhooks: Some(vec![CanaryWebhook::new(HookType::Rollout, "legacy", "http://b/")]),
            ..Default::default()
        });
        let table = HookTable::for_spec(&spec);
        let rollout: Vec<_> = table.of_type(HookType::Rollout).map(|w| &w.name).collect();
        assert_eq!(rollout, vec!["current"]);
    }

    #[test]
    fn story_payload_carries_phase_and_metadata() {
        let mut hook = CanaryWebhook::new(HookType::Rollout, "load-test", "http://tester/");
        hook.metadata = Some(BTreeMap::from([(
            "cmd".to_string(),
            "hey -z 1m http://podinfo-canary.test/".to_string(),
        )]));
        let hooks = vec![hook];

        let mut canary = Canary::new(
            "podinfo",
            CanarySpec::new(CrossNamespaceObjectReference::new("podinfo"), 9898),
        );
        canary.metadata.namespace = Some("test".to_string());

        let table = HookTable::new(&hooks);
        let scheduled = table.for_phase(Progressing);
        let payload = scheduled[0].payload(&canary);
        assert_eq!(payload.name, "podinfo");
        assert_eq!(payload.namespace, "test");
        assert_eq!(payload.phase, Progressing);

        let json = serde_json::to_value(&payload).expect("payload should serialize");
        assert_eq!(json["phase"], "Progressing");
        assert_eq!(json["metadata"]["cmd"], "hey -z 1m http://podinfo-canary.test/");
    }

    #[test]
    fn test_payload_omits_empty_metadata() {
        let payload = CanaryWebhookPayload {
            name: "podinfo".to_string(),
            namespace: "test".to_string(),
            phase: Succeeded,
            metadata: BTreeMap::new(),
        };
        let json = serde_json::to_value(&payload).expect("payload should serialize");
        assert!(json.get("metadata").is_none());
    }
}

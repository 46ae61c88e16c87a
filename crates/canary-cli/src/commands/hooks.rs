//! Hooks command

use std::path::PathBuf;

use clap::Args;
use kube::ResourceExt;
use serde::Serialize;

use canary_common::hooks::{HookResult, HookTable};
use canary_common::{Canary, CanaryPhase};

use super::{format_table, read_canaries, render_structured, OutputFormat};
use crate::Result;

#[derive(Args, Debug)]
pub struct HooksArgs {
    /// Manifest file holding one or more Canary documents
    pub file: PathBuf,

    /// Only show webhooks eligible in this phase (default: every phase)
    #[arg(long, value_parser = parse_phase)]
    pub phase: Option<CanaryPhase>,
}

fn parse_phase(s: &str) -> std::result::Result<CanaryPhase, String> {
    s.parse().map_err(|e: canary_common::Error| e.to_string())
}

/// One webhook scheduled in one phase
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HookRow {
    pub canary: String,
    pub phase: CanaryPhase,
    pub webhook: String,
    #[serde(rename = "type")]
    pub hook_type: String,
    pub cadence: String,
    pub on_success: String,
    pub on_failure: String,
}

/// Rows for every webhook of `canary`, phase by phase
pub fn rows(canary: &Canary, phase: Option<CanaryPhase>) -> Vec<HookRow> {
    let table = HookTable::for_spec(&canary.spec);
    let phases: Vec<CanaryPhase> = match phase {
        Some(p) => vec![p],
        None => CanaryPhase::ALL.to_vec(),
    };

    phases
        .into_iter()
        .flat_map(|p| table.for_phase(p))
        .map(|hook| HookRow {
            canary: canary.name_any(),
            phase: hook.phase(),
            webhook: hook.webhook().name.clone(),
            hook_type: hook.hook_type().to_string(),
            cadence: hook.cadence().to_string(),
            on_success: hook.interpret(HookResult::Success).to_string(),
            on_failure: hook.interpret(HookResult::Failure).to_string(),
        })
        .collect()
}

pub fn run(args: HooksArgs, output: OutputFormat) -> Result<()> {
    let rows: Vec<HookRow> = read_canaries(&args.file)?
        .iter()
        .flat_map(|c| rows(c, args.phase))
        .collect();
    print!("{}", render(&rows, output)?);
    Ok(())
}

pub fn render(rows: &[HookRow], output: OutputFormat) -> Result<String> {
    match output {
        OutputFormat::Text => {
            let cells: Vec<Vec<String>> = rows
                .iter()
                .map(|r| {
                    vec![
                        r.canary.clone(),
                        r.phase.to_string(),
                        r.webhook.clone(),
                        r.hook_type.clone(),
                        r.cadence.clone(),
                        r.on_success.clone(),
                        r.on_failure.clone(),
                    ]
                })
                .collect();
            Ok(format_table(
                &[
                    "CANARY",
                    "PHASE",
                    "WEBHOOK",
                    "TYPE",
                    "CADENCE",
                    "ON SUCCESS",
                    "ON FAILURE",
                ],
                &cells,
            ))
        }
        structured => render_structured(rows, structured),
    }
}

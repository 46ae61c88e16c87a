//! Lint command
//!
//! Structural errors fail the command; smells are reported as warnings.

use std::path::PathBuf;

use clap::Args;
use kube::ResourceExt;
use serde::Serialize;
use tracing::{info, warn};

use canary_common::lint::{self, ConfigSmell};
use canary_common::Canary;

use super::{read_canaries, render_structured, OutputFormat};
use crate::{Error, Result};

#[derive(Args, Debug)]
pub struct LintArgs {
    /// Manifest file holding one or more Canary documents
    pub file: PathBuf,

    /// Treat configuration smells as errors
    #[arg(long)]
    pub strict: bool,
}

/// Lint findings of one canary
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LintReport {
    pub name: String,
    pub namespace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub smells: Vec<ConfigSmell>,
}

impl LintReport {
    pub fn for_canary(canary: &Canary) -> Self {
        Self {
            name: canary.name_any(),
            namespace: canary.namespace().unwrap_or_default(),
            error: lint::validate(canary).err().map(|e| e.to_string()),
            smells: lint::lint(canary),
        }
    }
}

pub fn run(args: LintArgs, output: OutputFormat) -> Result<()> {
    let reports: Vec<LintReport> = read_canaries(&args.file)?
        .iter()
        .map(LintReport::for_canary)
        .collect();

    print!("{}", render(&reports, output)?);
    verdict(&reports, args.strict)
}

pub fn render(reports: &[LintReport], output: OutputFormat) -> Result<String> {
    match output {
        OutputFormat::Text => {
            let mut out = String::new();
            for report in reports {
                let status = match (&report.error, report.smells.is_empty()) {
                    (Some(_), _) => "invalid",
                    (None, false) => "warnings",
                    (None, true) => "ok",
                };
                out.push_str(&format!(
                    "{}/{}: {status}\n",
                    report.namespace, report.name
                ));
                if let Some(error) = &report.error {
                    out.push_str(&format!("  error: {error}\n"));
                }
                for smell in &report.smells {
                    out.push_str(&format!("  warning: {smell}\n"));
                }
            }
            Ok(out)
        }
        structured => render_structured(reports, structured),
    }
}

/// Overall result: structural errors always fail, smells only when strict
pub fn verdict(reports: &[LintReport], strict: bool) -> Result<()> {
    let errors = reports.iter().filter(|r| r.error.is_some()).count();
    let smells: usize = reports.iter().map(|r| r.smells.len()).sum();

    if smells > 0 {
        warn!(smells, "configuration smells found");
    }
    if errors > 0 {
        return Err(Error::validation(format!(
            "{errors} of {} canaries failed validation",
            reports.len()
        )));
    }
    if strict && smells > 0 {
        return Err(Error::validation(format!(
            "{smells} configuration smells (strict mode)"
        )));
    }
    info!(canaries = reports.len(), "lint passed");
    Ok(())
}

//! Resolve command

use std::fmt::Write;
use std::path::PathBuf;

use clap::Args;

use canary_common::EffectiveSettings;

use super::{read_canaries, render_structured, OutputFormat};
use crate::Result;

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Manifest file holding one or more Canary documents
    pub file: PathBuf,
}

pub fn run(args: ResolveArgs, output: OutputFormat) -> Result<()> {
    let settings: Vec<EffectiveSettings> = read_canaries(&args.file)?
        .iter()
        .map(|c| c.effective_settings())
        .collect();
    print!("{}", render(&settings, output)?);
    Ok(())
}

pub fn render(settings: &[EffectiveSettings], output: OutputFormat) -> Result<String> {
    match output {
        OutputFormat::Text => Ok(settings
            .iter()
            .map(render_text)
            .collect::<Vec<_>>()
            .join("\n")),
        structured => render_structured(settings, structured),
    }
}

fn render_text(s: &EffectiveSettings) -> String {
    let mut out = String::new();
    let or_none = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());

    // Writing into a String cannot fail.
    let _ = writeln!(out, "Canary:             {}/{}", s.namespace, s.name);
    let _ = writeln!(
        out,
        "Services:           {}, {}, {}",
        s.services.apex, s.services.primary, s.services.canary
    );
    let _ = writeln!(out, "Progress deadline:  {}s", s.progress_deadline_seconds);
    let _ = writeln!(
        out,
        "Analysis:           {}",
        s.analysis_source.unwrap_or("none")
    );
    let _ = writeln!(out, "Skip analysis:      {}", s.skip_analysis);
    let _ = writeln!(out, "Interval:           {}", or_none(s.interval.clone()));
    let _ = writeln!(
        out,
        "Threshold:          {}",
        or_none(s.threshold.map(|t| t.to_string()))
    );
    let _ = writeln!(out, "Metric interval:    {}", s.metric_interval);
    for (name, timeout) in &s.webhook_timeouts {
        let _ = writeln!(out, "Webhook timeout:    {name}={timeout}");
    }
    if !s.diagnostics.is_empty() {
        let _ = writeln!(out, "Diagnostics:");
        for d in &s.diagnostics {
            let _ = writeln!(out, "  - {d}");
        }
    }
    out
}

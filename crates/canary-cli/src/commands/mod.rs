//! CLI commands

use std::path::Path;

use clap::ValueEnum;
use serde::Serialize;
use tracing::{debug, warn};

use canary_common::{manifest, Canary};

use crate::{Error, Result};

pub mod crd;
pub mod hooks;
pub mod lint;
pub mod resolve;

/// Output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text (default)
    #[default]
    Text,
    /// YAML
    Yaml,
    /// JSON
    Json,
}

/// Read a manifest file and load every Canary in it.
///
/// A manifest without canaries is not an error, but it is logged.
pub fn read_canaries(path: &Path) -> Result<Vec<Canary>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {e}", path.display()),
        ))
    })?;
    let canaries = manifest::load_canaries(&content)?;
    if canaries.is_empty() {
        warn!(path = %path.display(), "no Canary resources found");
    } else {
        debug!(path = %path.display(), count = canaries.len(), "loaded canaries");
    }
    Ok(canaries)
}

/// Serialize a value for the structured output formats.
///
/// Text output is command specific, so `Text` is rejected here.
pub fn render_structured<T: Serialize + ?Sized>(value: &T, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Yaml => Ok(serde_yaml::to_string(value)?),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(value)? + "\n"),
        OutputFormat::Text => Err(Error::command_failed(
            "text output has no generic rendering",
        )),
    }
}

/// Render rows as a column-aligned table with headers
pub fn format_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let line = |cells: Vec<&str>| -> String {
        let padded: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:<width$}", cell, width = w)
            })
            .collect();
        padded.join("  ").trim_end().to_string()
    };

    let mut out = line(headers.to_vec());
    out.push('\n');
    for row in rows {
        out.push_str(&line(row.iter().map(String::as_str).collect()));
        out.push('\n');
    }
    out
}

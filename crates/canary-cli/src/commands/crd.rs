//! Crd command

use kube::CustomResourceExt;

use canary_common::Canary;

use super::{render_structured, OutputFormat};
use crate::Result;

/// Render the Canary CRD; text output is YAML, as kubectl expects
pub fn render(output: OutputFormat) -> Result<String> {
    let crd = Canary::crd();
    match output {
        OutputFormat::Text | OutputFormat::Yaml => render_structured(&crd, OutputFormat::Yaml),
        OutputFormat::Json => render_structured(&crd, OutputFormat::Json),
    }
}

pub fn run(output: OutputFormat) -> Result<()> {
    print!("{}", render(output)?);
    Ok(())
}

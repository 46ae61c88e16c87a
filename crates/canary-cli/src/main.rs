//! canaryctl
//!
//! Inspect, lint and resolve canary release manifests.

use clap::Parser;

use canary_cli::{init_tracing, Cli, Result};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);
    cli.run()
}

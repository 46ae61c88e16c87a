//! canaryctl library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::OutputFormat;

/// canaryctl - inspect canary release manifests offline
#[derive(Parser, Debug)]
#[command(name = "canaryctl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(
        short,
        long,
        env = "CANARYCTL_OUTPUT",
        default_value = "text",
        global = true
    )]
    pub output: OutputFormat,

    /// Log format on stderr
    #[arg(long, env = "CANARYCTL_LOG_FORMAT", default_value = "text", global = true)]
    pub log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the effective settings of every canary in a manifest
    Resolve(commands::resolve::ResolveArgs),
    /// Check canaries for structural errors and configuration smells
    Lint(commands::lint::LintArgs),
    /// Show which webhooks fire in which phase
    Hooks(commands::hooks::HooksArgs),
    /// Print the Canary CustomResourceDefinition
    Crd,
}

/// Log line format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines (default)
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl Cli {
    /// Run the CLI command
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Resolve(args) => commands::resolve::run(args, self.output),
            Commands::Lint(args) => commands::lint::run(args, self.output),
            Commands::Hooks(args) => commands::hooks::run(args, self.output),
            Commands::Crd => commands::crd::run(self.output),
        }
    }
}

/// Install the global tracing subscriber; logs go to stderr so command
/// output on stdout stays machine-readable
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let text = (format == LogFormat::Text).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });
    let json = (format == LogFormat::Json).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
    });

    // A second init (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .try_init();
}

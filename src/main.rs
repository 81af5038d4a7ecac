//! Modbuild CLI
//!
//! Entry point for the modbuild command-line application.

use anyhow::Result;
use clap::Parser;

use modbuild::cli::output::{display_error, OutputConfig};
use modbuild::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Apply output configuration globally
    let output_config = OutputConfig::new(cli.global.quiet, cli.global.json, cli.global.verbose);
    output_config.apply_global();

    // RUST_LOG wins over -v
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::default().add_directive(output_config.log_level().into())
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.run().await {
        Ok(()) => Ok(()),
        Err(e) => {
            display_error(&e);
            std::process::exit(1);
        }
    }
}

//! Relay CLI - proxy rewrite rule compiler.
//!
//! Provides commands for:
//! - `render`: Print the rule block for the configured mappings
//! - `inject`: Install proxy rules if they are not installed yet
//! - `flush`: Invalidate installed rules and reinstall them
//! - `status`: Show routing mode, injection state and mappings
//! - `set`: Change forum settings in the option store

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{FlushArgs, InjectArgs, RenderArgs, SetArgs, StatusArgs};
use output::Output;

/// Relay - proxy rewrite rule compiler.
#[derive(Parser)]
#[command(name = "relay", version, about)]
struct Cli {
    /// Enable verbose output (info-level logs).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the rule block for the configured mappings.
    Render(RenderArgs),
    /// Install proxy rules if they are not installed yet.
    Inject(InjectArgs),
    /// Invalidate installed rules and reinstall them.
    Flush(FlushArgs),
    /// Show routing mode, injection state and mappings.
    Status(StatusArgs),
    /// Change forum settings in the option store.
    Set(SetArgs),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Render(args) => args.execute(),
        Commands::Inject(args) => args.execute(),
        Commands::Flush(args) => args.execute(),
        Commands::Status(args) => args.execute(),
        Commands::Set(args) => args.execute(),
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}

//! Genstream CLI - run and inspect streaming generation sessions
//!
//! Drives engines built from a vocabulary file and a replayed model
//! transcript, which is enough to exercise stop sequences, token budgets and
//! chunk boundaries without loading model weights.

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod commands;
mod config;
mod utils;

use commands::{count::CountCommand, run::RunCommand, Command};

#[derive(Parser)]
#[command(
    name = "genstream",
    version = env!("CARGO_PKG_VERSION"),
    about = "Streaming text-generation session CLI",
    long_about = "Run generation requests through genstream sessions, stream their chunks and count prompt tokens."
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Quiet output (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "GENSTREAM_CONFIG")]
    config: Option<PathBuf>,

    /// JSON output format
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a response through a session
    #[command(name = "run", alias = "r")]
    Run(RunCommand),

    /// Count the tokens a text encodes to
    #[command(name = "count", alias = "c")]
    Count(CountCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    debug!("Genstream CLI v{} starting", env!("CARGO_PKG_VERSION"));

    let config = config::Config::load(cli.config.as_deref())?;
    debug!("Configuration loaded: {:?}", config);

    let result = match cli.command {
        Commands::Run(cmd) => cmd.execute(&config, cli.json).await,
        Commands::Count(cmd) => cmd.execute(&config, cli.json).await,
    };

    match result {
        Ok(_) => {
            if !cli.quiet {
                info!("Command completed successfully");
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {:#}", style("Error:").red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_names(cli.debug)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

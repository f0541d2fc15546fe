//! # CLI Layer
//!
//! The CLI layer is the **only** place in the codebase that:
//! - Knows about terminal I/O (stdout, stderr)
//! - Installs a `tracing` subscriber
//! - Builds the tokio runtime
//! - Handles argument parsing
//!
//! ## Responsibilities
//!
//! 1. **Argument Parsing**: Convert shell arguments into typed commands via clap
//! 2. **Logging**: Route diagnostics to stderr, filtered by `FOLIO_LOG` or `-v`
//! 3. **Context Setup**: Load the layered configuration and open the storage backend
//! 4. **Dispatch**: Route commands to handlers on a multi-threaded runtime

use super::handlers::{self, AppState};
use super::setup::{parse_cli, Cli, Commands};
use anyhow::{Context, Result};
use folioapp::config::FolioConfig;
use folioapp::store::open_backend;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "FOLIO_LOG";

pub fn run() -> Result<()> {
    let cli = parse_cli();
    init_logging(cli.verbose);

    let state = create_app_state(&cli)?;
    let command = cli.command.unwrap_or(Commands::List);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("could not start the async runtime")?;
    runtime.block_on(handlers::dispatch(&state, command))
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));
    // A subscriber may already be installed when embedded; keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn create_app_state(cli: &Cli) -> Result<AppState> {
    let cwd = std::env::current_dir().context("could not read the working directory")?;
    let mut config = FolioConfig::load(Some(&cwd))?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = Some(dir.clone());
    }
    let backend = open_backend(&config)?;
    Ok(AppState { config, backend })
}

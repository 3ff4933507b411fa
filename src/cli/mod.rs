//! Command-line interface for devx.
//!
//! # Command Structure
//!
//! ```text
//! devx [--verbose | --quiet] update <check | install | status | clear-cache>
//! ```
//!
//! Global flags control logging only: `--verbose` logs at `debug`, `--quiet`
//! at `error`, and otherwise `RUST_LOG` applies with `warn` as the default.

mod update;

pub use update::{UpdateAction, UpdateCommand};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// devx command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "devx", version, about = "Developer experience toolkit", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output for debugging and detailed information.
    ///
    /// Equivalent to `RUST_LOG=debug`. Mutually exclusive with `--quiet`.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all output except errors, including progress spinners.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check for and install new devx releases
    Update(UpdateCommand),
}

impl Cli {
    /// Log filter implied by the global flags.
    #[must_use]
    pub fn log_filter(&self) -> EnvFilter {
        if self.verbose {
            EnvFilter::new("debug")
        } else if self.quiet {
            EnvFilter::new("error")
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
        }
    }

    /// Install the stderr tracing subscriber for this invocation.
    pub fn init_logging(&self) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(self.log_filter())
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }

    /// Execute the selected command.
    pub async fn execute(self) -> Result<()> {
        let show_progress = !self.quiet;
        match self.command {
            Commands::Update(cmd) => cmd.execute(show_progress).await,
        }
    }
}

//! devx CLI entry point
//!
//! Parses arguments, installs logging, runs the command and renders failures
//! through [`devx::core::user_friendly_error`].

use anyhow::Result;
use clap::Parser;
use devx::cli;
use devx::core::user_friendly_error;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    cli.init_logging();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            let error_ctx = user_friendly_error(e);
            error_ctx.display();
            std::process::exit(1);
        }
    }
}

//! ako: commit messages from your staged diff
//!
//! Streams a commit message from the configured LLM backend.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("ako=debug,ako_core=debug,ako_provider=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let store = ako_core::ConfigStore::at(&cli.config);

    match cli.command {
        Commands::Init { force } => commands::init::run(&store, force)?,
        Commands::Commit { ref diff_file } => {
            if let Err(err) = commands::commit::run(&store, diff_file.as_deref()).await {
                if let Some(exit_err) = err.downcast_ref::<commands::commit::CommitExitError>() {
                    eprintln!("{}", exit_err.message);
                    std::process::exit(exit_err.code);
                }
                return Err(err);
            }
        }
        Commands::Ci { template } => {
            let template = match template {
                Some(name) => name.parse()?,
                None => commands::ci::select_template()?,
            };
            commands::ci::create(template, std::path::Path::new("."))?;
        }
    }

    Ok(())
}

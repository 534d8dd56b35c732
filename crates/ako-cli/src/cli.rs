//! CLI argument and command definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ako", version, about = "Commit messages written by an LLM of your choice")]
pub struct Cli {
    /// Path of the LLM configuration file.
    #[arg(long, global = true, env = "AKO_CONFIG", default_value = ako_core::DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default LLM configuration (local Ollama).
    Init {
        /// Overwrite an existing configuration.
        #[arg(long)]
        force: bool,
    },

    /// Generate a commit message for the staged changes.
    Commit {
        /// Read the diff from a file instead of `git diff --cached`; `-` reads stdin.
        #[arg(long, value_name = "PATH")]
        diff_file: Option<PathBuf>,
    },

    /// Create a CI configuration from a template.
    Ci {
        /// Template name; prompts when omitted.
        template: Option<String>,
    },
}

//! Command line argument parsing using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Kestrel - hybrid intent classification service
#[derive(Parser, Debug, Clone)]
#[command(name = "kestrel")]
#[command(about = "Hybrid keyword + embedding intent classification with LLM escalation")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "Kestrel Contributors")]
pub struct KestrelArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long)]
    pub quiet: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl KestrelArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1,
                n => n,
            }
        }
    }
}

/// Data and configuration locations shared by every subcommand.
#[derive(Parser, Debug, Clone, Default)]
pub struct DataOpts {
    /// Directory of intent definition JSON files
    #[arg(long)]
    pub taxonomy_dir: Option<PathBuf>,

    /// Directory of keyword dictionary JSON files
    #[arg(long)]
    pub keywords_dir: Option<PathBuf>,

    /// Rules file holding config variants
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Append-only audit log (JSONL)
    #[arg(long)]
    pub audit_log: Option<PathBuf>,

    /// Append-only usage log (JSONL)
    #[arg(long)]
    pub usage_log: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP service with an embedded worker pool
    Serve {
        /// Listen address
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: String,

        /// Number of escalation workers
        #[arg(long, default_value_t = 4)]
        workers: usize,

        #[command(flatten)]
        data: DataOpts,
    },

    /// Run a standalone escalation worker pool
    Worker {
        /// Number of escalation workers
        #[arg(long, default_value_t = 4)]
        workers: usize,

        #[command(flatten)]
        data: DataOpts,
    },

    /// Classify a single utterance and print the result
    Classify {
        /// The utterance to classify
        text: String,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,

        #[command(flatten)]
        data: DataOpts,
    },
}

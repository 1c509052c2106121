//! Kestrel service binary.

use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use kestrel::cli::args::KestrelArgs;
use kestrel::cli::commands::{execute_command, exit_code_for};

#[tokio::main]
async fn main() {
    let args = KestrelArgs::parse();

    let default_level = match args.verbosity() {
        0 => "error",
        1 => "warn",
        2 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("kestrel={default_level}"))),
        )
        .init();

    if let Err(e) = execute_command(args).await {
        eprintln!("Error: {e}");
        process::exit(exit_code_for(&e));
    }
}

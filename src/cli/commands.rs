//! CLI command execution.
//!
//! Exit codes: 0 success, 1 startup validation failed, 2 fatal
//! dependency unavailable.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::app::{AppContext, AppOptions};
use crate::classify::engine::ClassifyRequest;
use crate::classify::ClassifyOutcome;
use crate::config::{spawn_config_watcher, Settings};
use crate::cost::spawn_spike_scheduler;
use crate::error::{KestrelError, Result};

use super::args::{Command, DataOpts, KestrelArgs};

/// Map an error to the process exit code.
pub fn exit_code_for(error: &KestrelError) -> i32 {
    match error {
        KestrelError::ConfigInvalid(_)
        | KestrelError::Taxonomy(_)
        | KestrelError::KeywordLoad(_)
        | KestrelError::InvalidInput(_) => 1,
        _ => 2,
    }
}

fn options_from(data: &DataOpts, workers: usize) -> AppOptions {
    AppOptions {
        taxonomy_dir: data.taxonomy_dir.clone(),
        keywords_dir: data.keywords_dir.clone(),
        config_file: data.config.clone(),
        audit_log: data.audit_log.clone(),
        usage_log: data.usage_log.clone(),
        workers,
        settings: Settings::from_env(),
    }
}

/// Execute the parsed command.
pub async fn execute_command(args: KestrelArgs) -> Result<()> {
    match args.command {
        Command::Serve {
            addr,
            workers,
            data,
        } => serve(addr, workers, data).await,
        Command::Worker { workers, data } => run_worker(workers, data).await,
        Command::Classify { text, pretty, data } => classify_once(text, pretty, data).await,
    }
}

async fn serve(addr: String, workers: usize, data: DataOpts) -> Result<()> {
    let context = AppContext::build(options_from(&data, workers))?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let pool = context.spawn_workers();
    let _spike = spawn_spike_scheduler(
        context.spike_detector(),
        Arc::clone(&context.usage),
        Arc::clone(&context.alerts),
        crate::cost::spike::DEFAULT_SCHEDULE_INTERVAL,
        shutdown_rx.clone(),
    );
    let _watcher = context.config_file.clone().map(|path| {
        spawn_config_watcher(
            Arc::clone(&context.config),
            path,
            crate::config::watcher::DEFAULT_POLL_INTERVAL,
            shutdown_rx,
        )
    });

    let serve_result = crate::server::run(Arc::clone(&context), &addr).await;

    let _ = shutdown_tx.send(true);
    pool.shutdown().await;
    serve_result
}

async fn run_worker(workers: usize, data: DataOpts) -> Result<()> {
    let context = AppContext::build(options_from(&data, workers))?;
    let pool = context.spawn_workers();
    info!(workers, "worker pool running; ctrl-c to stop");

    tokio::signal::ctrl_c()
        .await
        .map_err(KestrelError::Io)?;
    info!("shutting down worker pool");
    pool.shutdown().await;
    Ok(())
}

async fn classify_once(text: String, pretty: bool, data: DataOpts) -> Result<()> {
    let context = AppContext::build(options_from(&data, 1))?;
    let outcome = context
        .engine
        .classify(&ClassifyRequest::text_only(text))
        .await?;

    let value = match outcome {
        ClassifyOutcome::Resolved(result) => serde_json::to_value(&result)?,
        ClassifyOutcome::Queued { request_id } => serde_json::json!({
            "request_id": request_id,
            "status": "QUEUED",
        }),
    };
    let rendered = if pretty {
        serde_json::to_string_pretty(&value)?
    } else {
        serde_json::to_string(&value)?
    };
    println!("{rendered}");
    Ok(())
}

//! Run command - scan and clean up on a schedule until ctrl-c

use crate::cli::error::HelpfulError;
use crate::cli::CliContext;
use marketwatch::{JsonFileFeed, Scheduler};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug)]
pub struct RunArgs {
    /// Falls back to `snapshot_path` from the config
    pub snapshot: Option<PathBuf>,
}

pub fn run(args: RunArgs, ctx: &CliContext) -> anyhow::Result<()> {
    let snapshot_path = args
        .snapshot
        .or_else(|| ctx.config.snapshot_path.clone())
        .ok_or_else(|| {
            HelpfulError::new("No snapshot source configured")
                .with_context("The scheduler reads one JSON snapshot per scan cycle")
                .with_suggestions([
                    "TRY: marketwatch run --snapshot /var/lib/capture/listings.json",
                    "TRY: Set snapshot_path in ~/.marketwatch/config.toml",
                ])
        })?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(run_async(ctx, snapshot_path))
}

async fn run_async(ctx: &CliContext, snapshot_path: PathBuf) -> anyhow::Result<()> {
    let monitor = ctx.open().await?;
    let feed = Arc::new(JsonFileFeed::new(snapshot_path));
    let scheduler = Scheduler::new(monitor.clone(), feed);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let summary = scheduler
        .run_until(shutdown)
        .await
        .map_err(HelpfulError::from)?;

    info!(
        scans_applied = summary.scans_applied,
        scans_retried = summary.scans_retried,
        scans_rejected = summary.scans_rejected,
        cleanups_run = summary.cleanups_run,
        "Scheduler finished"
    );
    monitor.db().clone().close().await;
    Ok(())
}

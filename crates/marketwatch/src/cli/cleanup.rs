//! Cleanup command - purge entries UNCHECKED past the retention window

use crate::cli::error::HelpfulError;
use crate::cli::output::{format_timestamp, print_json, print_table};
use crate::cli::{runtime, CliContext};

#[derive(Debug)]
pub struct CleanupArgs {
    /// Overrides `retention_days` from the config
    pub retention_days: Option<u32>,
    pub json: bool,
}

pub fn run(args: CleanupArgs, ctx: &CliContext) -> anyhow::Result<()> {
    runtime()?.block_on(run_async(args, ctx))
}

async fn run_async(args: CleanupArgs, ctx: &CliContext) -> anyhow::Result<()> {
    let monitor = ctx.open_existing().await?;
    let retention_days = args.retention_days.unwrap_or(ctx.config.retention_days);

    let report = monitor
        .trigger_cleanup(retention_days)
        .await
        .map_err(HelpfulError::from)?;

    if args.json {
        return print_json(&report);
    }

    print_table(
        &["Cutoff (UTC)", "Purged", "Audit written", "Audit suppressed"],
        vec![vec![
            format_timestamp(report.cutoff),
            report.purged.to_string(),
            report.audit_written.to_string(),
            report.audit_suppressed.to_string(),
        ]],
    );
    Ok(())
}

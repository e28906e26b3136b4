//! Registry commands - active listings, counts, mirror check

use crate::cli::error::HelpfulError;
use crate::cli::output::{
    format_relative, format_timestamp, print_json, print_table, print_table_colored, status_color,
};
use crate::cli::{runtime, CliContext};
use marketwatch::MonitorError;
use marketwatch_db::MonitorDb;

#[derive(Debug)]
pub struct ActiveArgs {
    pub limit: Option<usize>,
    pub json: bool,
}

#[derive(Debug)]
pub struct StatsArgs {
    pub json: bool,
}

#[derive(Debug)]
pub struct VerifyArgs {
    pub json: bool,
}

pub fn run_active(args: ActiveArgs, ctx: &CliContext) -> anyhow::Result<()> {
    runtime()?.block_on(active_async(args, ctx))
}

async fn active_async(args: ActiveArgs, ctx: &CliContext) -> anyhow::Result<()> {
    let monitor = ctx.open_existing().await?;
    let mut entries = monitor.active_entries().await.map_err(HelpfulError::from)?;
    let total = entries.len();
    if let Some(limit) = args.limit {
        entries.truncate(limit);
    }

    if args.json {
        return print_json(&entries);
    }

    if entries.is_empty() {
        println!("No active listings");
        return Ok(());
    }

    let now = MonitorDb::now();
    let rows = entries
        .iter()
        .map(|entry| {
            vec![
                (entry.combination.seller().to_string(), None),
                (entry.combination.item().to_string(), None),
                (entry.status.to_string(), Some(status_color(entry.status))),
                (format_relative(entry.status_changed_at, now), None),
                (format_timestamp(entry.created_at), None),
            ]
        })
        .collect();

    print_table_colored(
        &["Seller", "Item", "Status", "Since", "First seen (UTC)"],
        rows,
    );
    if total > entries.len() {
        println!("Showing {} of {} active listings", entries.len(), total);
    } else {
        println!("{} active listing(s)", total);
    }
    Ok(())
}

pub fn run_stats(args: StatsArgs, ctx: &CliContext) -> anyhow::Result<()> {
    runtime()?.block_on(stats_async(args, ctx))
}

async fn stats_async(args: StatsArgs, ctx: &CliContext) -> anyhow::Result<()> {
    let monitor = ctx.open_existing().await?;
    let stats = monitor
        .db()
        .registry_stats()
        .await
        .map_err(|e| HelpfulError::from(MonitorError::from(e)))?;
    let audit_records = monitor
        .db()
        .audit_count()
        .await
        .map_err(|e| HelpfulError::from(MonitorError::from(e)))?;

    if args.json {
        return print_json(&serde_json::json!({
            "registry": stats,
            "audit_records": audit_records,
        }));
    }

    print_table(
        &["Total", "NEW", "CHECKED", "UNCHECKED", "Audit records"],
        vec![vec![
            stats.total.to_string(),
            stats.new.to_string(),
            stats.checked.to_string(),
            stats.unchecked.to_string(),
            audit_records.to_string(),
        ]],
    );
    Ok(())
}

pub fn run_verify(args: VerifyArgs, ctx: &CliContext) -> anyhow::Result<()> {
    runtime()?.block_on(verify_async(args, ctx))
}

async fn verify_async(args: VerifyArgs, ctx: &CliContext) -> anyhow::Result<()> {
    let monitor = ctx.open_existing().await?;
    let drift = monitor
        .db()
        .verify_mirror()
        .await
        .map_err(|e| HelpfulError::from(MonitorError::from(e)))?;

    if args.json {
        print_json(&drift)?;
    } else if drift.is_clean() {
        println!("Mirror is consistent with monitoring_queue");
    } else {
        let mut rows = Vec::new();
        for combination in &drift.missing_in_mirror {
            rows.push(vec![
                combination.to_string(),
                "missing in sellers_current".to_string(),
            ]);
        }
        for combination in &drift.missing_in_queue {
            rows.push(vec![
                combination.to_string(),
                "missing in monitoring_queue".to_string(),
            ]);
        }
        for (combination, queue, mirror) in &drift.mismatched {
            rows.push(vec![
                combination.to_string(),
                format!("status {} vs mirror {}", queue, mirror),
            ]);
        }
        print_table(&["Combination", "Problem"], rows);
    }

    if drift.is_clean() {
        Ok(())
    } else {
        Err(HelpfulError::new("Mirror drift detected")
            .with_context("sellers_current does not match monitoring_queue")
            .with_suggestion("TRY: Run the next scan; every write re-syncs the mirror row")
            .into())
    }
}

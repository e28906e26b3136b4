//! Apply command - run one scan from a snapshot file

use crate::cli::error::HelpfulError;
use crate::cli::output::{print_json, print_table};
use crate::cli::{runtime, CliContext};
use marketwatch::{parse_snapshot_json, Snapshot, SnapshotDiff};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct ApplyArgs {
    /// Falls back to `snapshot_path` from the config
    pub snapshot: Option<PathBuf>,
    pub dry_run: bool,
    pub json: bool,
}

pub fn run(args: ApplyArgs, ctx: &CliContext) -> anyhow::Result<()> {
    let path = args
        .snapshot
        .clone()
        .or_else(|| ctx.config.snapshot_path.clone())
        .ok_or_else(|| {
            HelpfulError::new("No snapshot given")
                .with_suggestions([
                    "TRY: marketwatch apply --snapshot listings.json",
                    "TRY: Set snapshot_path in ~/.marketwatch/config.toml",
                ])
        })?;

    let snapshot = read_snapshot(&path)?;
    runtime()?.block_on(run_async(args, ctx, snapshot))
}

fn read_snapshot(path: &Path) -> anyhow::Result<Snapshot> {
    if !path.exists() {
        return Err(HelpfulError::snapshot_not_found(path).into());
    }
    let content = std::fs::read_to_string(path).map_err(|e| {
        HelpfulError::new(format!("Cannot read file: {}", path.display()))
            .with_context(e.to_string())
    })?;
    Ok(parse_snapshot_json(&content).map_err(HelpfulError::from)?)
}

async fn run_async(args: ApplyArgs, ctx: &CliContext, snapshot: Snapshot) -> anyhow::Result<()> {
    if args.dry_run {
        let monitor = ctx.open_existing().await?;
        let diff = monitor
            .plan_snapshot(&snapshot)
            .await
            .map_err(HelpfulError::from)?;
        print_plan(&diff, args.json)?;
        return Ok(());
    }

    let monitor = ctx.open().await?;
    let report = monitor
        .apply_snapshot(&snapshot)
        .await
        .map_err(HelpfulError::from)?;

    if args.json {
        return print_json(&report);
    }

    print_table(
        &["Observed", "Created", "Reacquired", "Graduated", "Unchanged", "Vanished", "Audit"],
        vec![vec![
            report.observed.to_string(),
            report.created.to_string(),
            report.reacquired.to_string(),
            report.graduated.to_string(),
            report.unchanged.to_string(),
            report.vanished.to_string(),
            report.audit_records.to_string(),
        ]],
    );
    Ok(())
}

fn print_plan(diff: &SnapshotDiff, json: bool) -> anyhow::Result<()> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    for combination in &diff.appeared {
        rows.push(vec![
            "appear".to_string(),
            combination.seller().to_string(),
            combination.item().to_string(),
        ]);
    }
    for entry in &diff.vanished {
        rows.push(vec![
            "vanish".to_string(),
            entry.combination.seller().to_string(),
            entry.combination.item().to_string(),
        ]);
    }

    if json {
        let changes: Vec<serde_json::Value> = rows
            .iter()
            .map(|row| serde_json::json!({ "change": row[0], "seller": row[1], "item": row[2] }))
            .collect();
        return print_json(&serde_json::json!({
            "confirmed": diff.confirmed.len(),
            "changes": changes,
        }));
    }

    if rows.is_empty() {
        println!("No changes ({} confirmed)", diff.confirmed.len());
        return Ok(());
    }

    print_table(&["Change", "Seller", "Item"], rows);
    println!("{} confirmed", diff.confirmed.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_snapshot_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = read_snapshot(&tmp.path().join("missing.json")).unwrap_err();
        assert!(err.to_string().contains("Snapshot file not found"));
    }

    #[test]
    fn test_read_snapshot_rejects_blank_entries() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("snapshot.json");
        std::fs::write(&path, r#"[{"seller": "S1", "item": "  "}]"#).unwrap();

        let err = read_snapshot(&path).unwrap_err();
        assert!(err.to_string().contains("Snapshot rejected"));
    }
}

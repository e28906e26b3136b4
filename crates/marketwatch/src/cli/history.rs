//! History command - read the audit log

use crate::cli::error::HelpfulError;
use crate::cli::output::{change_color, format_timestamp, print_json, print_table_colored};
use crate::cli::{runtime, CliContext};
use chrono::{DateTime, Duration, Utc};
use marketwatch_db::{AuditRecord, Combination, MonitorDb};

#[derive(Debug)]
pub struct HistoryArgs {
    /// RFC 3339 timestamp or relative window such as `24h`
    pub since: String,
    pub seller: Option<String>,
    pub item: Option<String>,
    pub json: bool,
}

/// Parse `--since`: an RFC 3339 timestamp, or `<n>m`, `<n>h`, `<n>d` back from `now`.
pub fn parse_since(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, HelpfulError> {
    let input = input.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(input) {
        return Ok(at.with_timezone(&Utc));
    }

    let split = input
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(input.len());
    let (num, unit) = input.split_at(split);
    let amount: i64 = num
        .parse()
        .map_err(|_| HelpfulError::invalid_timestamp(input))?;

    let window = match unit {
        "m" => Duration::minutes(amount),
        "h" => Duration::hours(amount),
        "d" => Duration::days(amount),
        _ => return Err(HelpfulError::invalid_timestamp(input)),
    };
    Ok(now - window)
}

pub fn run(args: HistoryArgs, ctx: &CliContext) -> anyhow::Result<()> {
    runtime()?.block_on(run_async(args, ctx))
}

async fn run_async(args: HistoryArgs, ctx: &CliContext) -> anyhow::Result<()> {
    let monitor = ctx.open_existing().await?;

    let records: Vec<AuditRecord> = match (&args.seller, &args.item) {
        (Some(seller), Some(item)) => {
            let combination = Combination::new(seller.as_str(), item.as_str())?;
            monitor
                .db()
                .history_for(&combination)
                .await
                .map_err(|e| HelpfulError::from(marketwatch::MonitorError::from(e)))?
        }
        (None, None) => {
            let since = parse_since(&args.since, MonitorDb::now())?;
            monitor
                .change_history(since)
                .await
                .map_err(HelpfulError::from)?
        }
        _ => {
            return Err(HelpfulError::new("--seller and --item must be given together")
                .with_suggestion("TRY: marketwatch history --seller S1 --item I1")
                .into())
        }
    };

    if args.json {
        return print_json(&records);
    }

    if records.is_empty() {
        println!("No changes recorded");
        return Ok(());
    }

    let rows = records
        .iter()
        .map(|record| {
            vec![
                (record.id.to_string(), None),
                (format_timestamp(record.detected_at), None),
                (
                    record.change_type.to_string(),
                    Some(change_color(record.change_type)),
                ),
                (record.combination.seller().to_string(), None),
                (record.combination.item().to_string(), None),
                (describe(record.old_value), None),
                (describe(record.new_value), None),
            ]
        })
        .collect();

    print_table_colored(
        &["ID", "Detected (UTC)", "Change", "Seller", "Item", "Old", "New"],
        rows,
    );
    println!("{} record(s)", records.len());
    Ok(())
}

fn describe(status: Option<marketwatch_db::EntryStatus>) -> String {
    status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string())
}

//! Marketwatch - marketplace listing reconciliation
//!
//! Usage:
//!   marketwatch apply --snapshot listings.json   # One scan
//!   marketwatch active                           # NEW + CHECKED listings
//!   marketwatch history --since 24h              # Audit log
//!   marketwatch cleanup --retention-days 7       # Purge stale entries
//!   marketwatch run                              # Scan + cleanup on a schedule

mod cli;

use clap::{Parser, Subcommand};
use marketwatch_logging::LogConfig;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::cli::CliContext;

#[derive(Parser, Debug)]
#[command(name = "marketwatch")]
#[command(author, version, about = "Track marketplace listings across scans")]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Config file (default: ~/.marketwatch/config.toml)
    #[arg(long, global = true, env = "MARKETWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database path, overrides the config file
    #[arg(long, global = true, env = "MARKETWATCH_DB")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply one snapshot file as a scan cycle
    Apply {
        /// JSON array of {"seller", "item"} objects
        #[arg(short, long)]
        snapshot: Option<PathBuf>,

        /// Show what would change without writing
        #[arg(long)]
        dry_run: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List active (NEW and CHECKED) listings
    Active {
        /// Maximum rows to show
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show audit log records
    History {
        /// RFC 3339 timestamp or relative window (30m, 24h, 7d)
        #[arg(long, default_value = "24h")]
        since: String,

        /// Full history for one seller (requires --item)
        #[arg(long)]
        seller: Option<String>,

        /// Full history for one item (requires --seller)
        #[arg(long)]
        item: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Purge listings UNCHECKED longer than the retention window
    Cleanup {
        /// Days to keep UNCHECKED listings (default: from config)
        #[arg(long)]
        retention_days: Option<u32>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Registry counts by status
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that sellers_current mirrors monitoring_queue
    Verify {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Scan and clean up on a schedule until ctrl-c
    Run {
        /// Snapshot file the capture pipeline rewrites each cycle
        #[arg(short, long)]
        snapshot: Option<PathBuf>,
    },
}

fn run_command(command: Commands, ctx: &CliContext) -> anyhow::Result<()> {
    match command {
        Commands::Apply {
            snapshot,
            dry_run,
            json,
        } => cli::apply::run(
            cli::apply::ApplyArgs {
                snapshot,
                dry_run,
                json,
            },
            ctx,
        ),
        Commands::Active { limit, json } => {
            cli::registry::run_active(cli::registry::ActiveArgs { limit, json }, ctx)
        }
        Commands::History {
            since,
            seller,
            item,
            json,
        } => cli::history::run(
            cli::history::HistoryArgs {
                since,
                seller,
                item,
                json,
            },
            ctx,
        ),
        Commands::Cleanup {
            retention_days,
            json,
        } => cli::cleanup::run(
            cli::cleanup::CleanupArgs {
                retention_days,
                json,
            },
            ctx,
        ),
        Commands::Stats { json } => cli::registry::run_stats(cli::registry::StatsArgs { json }, ctx),
        Commands::Verify { json } => {
            cli::registry::run_verify(cli::registry::VerifyArgs { json }, ctx)
        }
        Commands::Run { snapshot } => cli::run::run(cli::run::RunArgs { snapshot }, ctx),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let daemon = matches!(cli.command, Commands::Run { .. });
    if let Err(e) = marketwatch_logging::init_logging(LogConfig {
        app_name: "marketwatch",
        verbose: cli.verbose,
        daemon,
        log_dir: None,
    }) {
        eprintln!("Warning: failed to initialize logging: {:#}", e);
    }

    let result = CliContext::load(cli.config, cli.database)
        .and_then(|ctx| run_command(cli.command, &ctx));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if e.downcast_ref::<cli::error::HelpfulError>().is_some() {
                eprint!("{}", e);
            } else {
                eprintln!("ERROR: {:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_cleanup() {
        let cli = Cli::try_parse_from([
            "marketwatch",
            "--database",
            "/tmp/mw.sqlite3",
            "cleanup",
            "--retention-days",
            "7",
        ])
        .unwrap();
        assert_eq!(cli.database, Some(PathBuf::from("/tmp/mw.sqlite3")));
        match cli.command {
            Commands::Cleanup {
                retention_days,
                json,
            } => {
                assert_eq!(retention_days, Some(7));
                assert!(!json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_history_defaults_to_last_day() {
        let cli = Cli::try_parse_from(["marketwatch", "history"]).unwrap();
        match cli.command {
            Commands::History { since, .. } => assert_eq!(since, "24h"),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}

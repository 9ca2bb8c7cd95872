//! Binary entry point for tallybook.
//!
//! Operator CLI over the dedup cache and the expense stores.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, bail};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tallybook::observability;
use tallybook::{DedupCoordinator, ExpenseRecord, TallybookConfig, WriteBehindStorage};

/// Tallybook - message dedup cache and expense persistence.
#[derive(Parser)]
#[command(name = "tallybook")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "TALLYBOOK_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Check whether a message still needs processing.
    Check {
        /// Message text.
        text: String,

        /// Message timestamp (RFC 3339, default: now).
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Record an expense in both stores.
    Record {
        /// Amount spent.
        #[arg(long)]
        amount: Decimal,

        /// Expense category.
        #[arg(long)]
        category: String,

        /// Free-form description.
        #[arg(long)]
        description: Option<String>,

        /// Expense timestamp (RFC 3339, default: now).
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        /// Originating message; its verdict is cached alongside.
        #[arg(long)]
        message: Option<String>,

        /// Export through the write-behind worker.
        #[arg(long = "async")]
        use_async: bool,
    },

    /// Show cache and export statistics.
    Status {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Remove cached verdicts older than the retention period.
    Cleanup {
        /// Days to keep (default: configured retention).
        #[arg(long)]
        days: Option<u32>,
    },

    /// List exported expenses.
    Expenses {
        /// First day (YYYY-MM-DD).
        #[arg(long, requires = "to", conflicts_with = "category")]
        from: Option<NaiveDate>,

        /// Last day (YYYY-MM-DD).
        #[arg(long, requires = "from")]
        to: Option<NaiveDate>,

        /// Category filter.
        #[arg(long)]
        category: Option<String>,

        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration.
    Config {
        /// Show the effective configuration.
        #[arg(long)]
        show: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match TallybookConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let logging = config.logging.clone().verbose(cli.verbose);
    if let Err(e) = observability::init(&logging) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli.command, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
fn run_command(command: Commands, config: TallybookConfig) -> anyhow::Result<()> {
    match command {
        Commands::Check { text, at } => cmd_check(&config, &text, at.unwrap_or_else(Utc::now)),

        Commands::Record {
            amount,
            category,
            description,
            at,
            message,
            use_async,
        } => {
            let at = at.unwrap_or_else(Utc::now);
            let expense = ExpenseRecord::new(amount, &category, description, at)
                .context("invalid expense")?;
            cmd_record(&config, &expense, message.as_deref(), use_async)
        },

        Commands::Status { json } => cmd_status(&config, json),

        Commands::Cleanup { days } => cmd_cleanup(&config, days.unwrap_or(config.retention_days)),

        Commands::Expenses {
            from,
            to,
            category,
            json,
        } => cmd_expenses(&config, from.zip(to), category, json),

        Commands::Config { show } => cmd_config(&config, show),
    }
}

fn open_coordinator(config: &TallybookConfig) -> anyhow::Result<DedupCoordinator> {
    DedupCoordinator::open(config).context("failed to open expense stores")
}

fn cmd_check(config: &TallybookConfig, text: &str, at: DateTime<Utc>) -> anyhow::Result<()> {
    let coordinator = open_coordinator(config)?;

    if coordinator.should_process(text, at) {
        println!("process: new message");
    } else if let Some(entry) = coordinator.cached_message(text, at) {
        let kind = if entry.is_system_message {
            "system message"
        } else if entry.is_expense {
            "already recorded as expense"
        } else {
            "already processed"
        };
        println!("skip: {kind} (cached {})", entry.cached_at.format("%Y-%m-%d %H:%M"));
    } else {
        println!("skip");
    }
    Ok(())
}

fn cmd_record(
    config: &TallybookConfig,
    expense: &ExpenseRecord,
    message: Option<&str>,
    use_async: bool,
) -> anyhow::Result<()> {
    let coordinator = Arc::new(open_coordinator(config)?);

    if let Some(text) = message {
        coordinator.cache_message_result(text, expense.date, Some(expense));
    }

    let saved = if use_async {
        let storage = WriteBehindStorage::new(Arc::clone(&coordinator), config.write_behind)
            .context("failed to start write-behind worker")?;
        let queued = storage.save_expense_async(expense);
        let stats = storage.shutdown(config.write_behind.drain_timeout);
        println!(
            "Write-behind: {} synced, {} failed, {} retried, {} abandoned",
            stats.synced, stats.failed, stats.retried, stats.abandoned
        );
        queued && stats.failed == 0 && stats.abandoned == 0
    } else {
        coordinator.save_expense(expense)
    };

    if !saved {
        bail!("expense {} was not saved to both stores (see logs)", expense.id);
    }
    println!("Recorded {expense} [{}]", expense.id);
    Ok(())
}

fn cmd_status(config: &TallybookConfig, json: bool) -> anyhow::Result<()> {
    let coordinator = open_coordinator(config)?;
    let info = coordinator.storage_info();

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    let last = coordinator
        .last_processed_timestamp()
        .map_or_else(|| "never".to_string(), |ts| ts.to_rfc3339());
    let stats = &info.stats;

    println!("Tallybook Status");
    println!("================");
    println!();
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Last processed message: {last}");
    println!();
    println!(
        "Cache: {}",
        info.cache
            .path
            .as_ref()
            .map_or_else(|| "in-memory".to_string(), |p| p.display().to_string())
    );
    println!(
        "  Schema version: {}",
        info.cache.schema_version.as_deref().unwrap_or("unknown")
    );
    println!("  Cached messages: {}", stats.cache.total_cached);
    println!("    Expenses: {}", stats.cache.expense_messages);
    println!("    System: {}", stats.cache.system_messages);
    println!("    Regular: {}", stats.cache.regular_messages);
    println!("  Cached expenses: {}", info.cache.expenses);
    for (day, count) in &stats.cache.daily {
        println!("    {day}: {count}");
    }
    println!();
    println!("Export: {}", info.export.path.display());
    println!("  Rows: {}", info.export.rows);
    println!("  Total: ${}", stats.expenses.total_amount);
    for (category, totals) in &stats.expenses.categories {
        println!("    {category}: {} (${})", totals.count, totals.amount);
    }
    println!();
    println!(
        "System filter rate: {:.1}%",
        stats.performance.system_filter_rate * 100.0
    );

    Ok(())
}

fn cmd_cleanup(config: &TallybookConfig, days: u32) -> anyhow::Result<()> {
    let coordinator = open_coordinator(config)?;
    let removed = coordinator.cleanup_cache(days);
    println!("Removed {removed} cached messages older than {days} days");
    Ok(())
}

fn cmd_expenses(
    config: &TallybookConfig,
    range: Option<(NaiveDate, NaiveDate)>,
    category: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let coordinator = open_coordinator(config)?;

    let expenses = match (range, category) {
        (Some((from, to)), _) => coordinator.expenses_between(from, to),
        (None, Some(category)) => coordinator.expenses_by_category(&category),
        (None, None) => coordinator.expenses_between(NaiveDate::MIN, NaiveDate::MAX),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&expenses)?);
        return Ok(());
    }

    if expenses.is_empty() {
        println!("No expenses found");
        return Ok(());
    }
    let total: Decimal = expenses.iter().map(|e| e.amount).sum();
    for expense in &expenses {
        match &expense.description {
            Some(description) => println!("{expense}  {description}"),
            None => println!("{expense}"),
        }
    }
    println!("{} expenses, total ${total}", expenses.len());
    Ok(())
}

fn cmd_config(config: &TallybookConfig, show: bool) -> anyhow::Result<()> {
    if show {
        println!("{}", serde_json::to_string_pretty(config)?);
    } else {
        println!("Export: {}", config.resolved_export_path().display());
        println!("Cache: {}", config.resolved_cache_path().display());
        println!();
        println!("Use 'tallybook config --show' to view full configuration");
    }
    Ok(())
}

//! Market Journal CLI: update, repair and inspect the observation ledger.
//!
//! Commands:
//! - `update` reconciles target dates (default today) and commits once
//! - `repair <pass>` runs one batch corrector and commits if it changed anything
//! - `status` reports row count, date range and per-field coverage
//! - `schema` prints the field table and default source chains

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use journal_core::logging::{init_logging, LogConfig};
use journal_core::reconcile::TargetDates;
use journal_core::repair::{DateFilter, GapFillOptions, OverrideOptions};
use journal_core::{
    CommitSummary, Journal, JournalConfig, PersistMode, ReconcileMode, RepairOp, RepairOutcome,
    SourceSpec, UpdateOutcome,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "journal",
    about = "Market Journal: daily FX, index, commodity and yield ledger"
)]
struct Cli {
    /// TOML config file. Defaults to ./journal.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Ledger CSV path (overrides the config).
    #[arg(long, global = true)]
    ledger: Option<PathBuf>,

    /// Persistence strategy (overrides the config).
    #[arg(long, global = true, value_enum)]
    persist: Option<PersistArg>,

    /// No network access: every source is disabled, carry-forward only.
    #[arg(long, global = true, default_value_t = false)]
    offline: bool,

    /// Print the report as JSON.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile target dates through each field's source chain.
    Update {
        /// Dates to reconcile (YYYY-MM-DD). Defaults to today.
        #[arg(value_parser = parse_date)]
        dates: Vec<NaiveDate>,

        /// First business day of a backfill range.
        #[arg(long, value_parser = parse_date, requires = "to")]
        from: Option<NaiveDate>,

        /// Last business day of a backfill range (inclusive).
        #[arg(long, value_parser = parse_date, requires = "from")]
        to: Option<NaiveDate>,

        /// Every ledger date missing any field.
        #[arg(long, default_value_t = false)]
        missing: bool,

        #[arg(long, value_enum, default_value_t = ModeArg::WriteOnce)]
        mode: ModeArg,
    },
    /// Batch repair passes over the whole ledger.
    Repair {
        #[command(subcommand)]
        pass: RepairPass,
    },
    /// Row count, date range and per-field coverage.
    Status,
    /// Print the field table.
    Schema,
}

#[derive(Subcommand)]
enum RepairPass {
    /// Fill empty cells from sources, then carry-forward.
    GapFill {
        /// Field to fill (repeatable). Defaults to all fields.
        #[arg(long = "field")]
        fields: Vec<String>,

        /// Only rows dated strictly after this date.
        #[arg(long, value_parser = parse_date)]
        after: Option<NaiveDate>,

        /// Only these dates (repeatable).
        #[arg(long = "date", value_parser = parse_date)]
        dates: Vec<NaiveDate>,

        /// Use ledger history only; no adapter calls.
        #[arg(long, default_value_t = false)]
        carry_forward_only: bool,
    },
    /// Multiply values stored at the wrong scale, per the configured rules.
    Rescale {
        /// Restrict to one field's rule. Defaults to every rule.
        #[arg(long)]
        field: Option<String>,

        /// Rescale every value, not only those matching the rule window.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Rewrite numeric cells at their field's fixed precision.
    Precision {
        #[arg(long = "field")]
        fields: Vec<String>,
    },
    /// Sort rows by ascending date.
    Sort,
    /// Replace stored values that differ from the source chain.
    Override {
        #[arg(long = "field")]
        fields: Vec<String>,

        #[arg(long, value_parser = parse_date)]
        after: Option<NaiveDate>,

        #[arg(long = "date", value_parser = parse_date)]
        dates: Vec<NaiveDate>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    WriteOnce,
    Refresh,
}

impl From<ModeArg> for ReconcileMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::WriteOnce => ReconcileMode::WriteOnce,
            ModeArg::Refresh => ReconcileMode::Refresh,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum PersistArg {
    Rewrite,
    Append,
}

impl From<PersistArg> for PersistMode {
    fn from(p: PersistArg) -> Self {
        match p {
            PersistArg::Rewrite => PersistMode::Rewrite,
            PersistArg::Append => PersistMode::Append,
        }
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| format!("invalid date '{s}' (expected YYYY-MM-DD): {e}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&LogConfig::from_env()) {
        eprintln!("logging disabled: {e}");
    }

    let mut config = JournalConfig::load(cli.config.as_deref())?;
    if let Some(ledger) = cli.ledger {
        config.ledger = ledger;
    }
    if let Some(persist) = cli.persist {
        config.persist = persist.into();
    }
    tracing::debug!(
        ledger = %config.ledger.display(),
        persist = %config.persist,
        offline = cli.offline,
        "configuration resolved"
    );

    match cli.command {
        Commands::Schema => run_schema(&config, cli.json),
        Commands::Status => run_status(&config, cli.json),
        Commands::Update {
            dates,
            from,
            to,
            missing,
            mode,
        } => run_update(&config, cli.offline, cli.json, dates, from, to, missing, mode),
        Commands::Repair { pass } => run_repair(&config, cli.offline, cli.json, pass),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_update(
    config: &JournalConfig,
    offline: bool,
    json: bool,
    dates: Vec<NaiveDate>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    missing: bool,
    mode: ModeArg,
) -> Result<()> {
    let selectors = usize::from(!dates.is_empty()) + usize::from(from.is_some()) + usize::from(missing);
    if selectors > 1 {
        bail!("DATE.., --from/--to and --missing are mutually exclusive");
    }

    let targets = match (from, to) {
        (Some(from), Some(to)) => TargetDates::BusinessDays { from, to },
        _ if missing => TargetDates::Missing,
        _ if !dates.is_empty() => TargetDates::Dates(dates),
        _ => TargetDates::Today,
    };

    let mut journal = Journal::open(config, offline).context("open journal")?;
    let outcome = journal.update(&targets, mode.into())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_update(&outcome);
    }
    Ok(())
}

fn run_repair(config: &JournalConfig, offline: bool, json: bool, pass: RepairPass) -> Result<()> {
    let mut journal = Journal::open(config, offline).context("open journal")?;

    let op = match pass {
        RepairPass::GapFill {
            fields,
            after,
            dates,
            carry_forward_only,
        } => RepairOp::GapFill(GapFillOptions {
            fields: journal.field_ids(&fields)?,
            filter: date_filter(after, dates),
            carry_forward_only,
        }),
        RepairPass::Rescale { field, force } => RepairOp::Rescale {
            fields: match field {
                Some(f) => journal.field_ids(&[f])?,
                None => Vec::new(),
            },
            force,
        },
        RepairPass::Precision { fields } => RepairOp::Precision(journal.field_ids(&fields)?),
        RepairPass::Sort => RepairOp::Sort,
        RepairPass::Override {
            fields,
            after,
            dates,
        } => RepairOp::Override(OverrideOptions {
            fields: journal.field_ids(&fields)?,
            filter: date_filter(after, dates),
        }),
    };

    let outcome = journal.repair(&op)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_repair(&outcome);
    }
    Ok(())
}

fn date_filter(after: Option<NaiveDate>, dates: Vec<NaiveDate>) -> DateFilter {
    DateFilter {
        after,
        dates: (!dates.is_empty()).then(|| dates.into_iter().collect()),
    }
}

fn run_status(config: &JournalConfig, json: bool) -> Result<()> {
    // status never needs a provider
    let journal = Journal::open(config, true).context("open journal")?;
    let status = journal.status();

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Ledger: {}", status.path.display());
    println!("Rows: {} ({} complete)", status.rows, status.complete_rows);
    match (status.first_date, status.last_date) {
        (Some(first), Some(last)) => println!("Dates: {first} to {last}"),
        _ => println!("Dates: (empty)"),
    }
    println!();
    println!("{:<18} {:>8} {:>8} {:>10}", "Field", "Filled", "Empty", "Malformed");
    println!("{}", "-".repeat(47));
    for c in &status.coverage {
        println!(
            "{:<18} {:>8} {:>8} {:>10}",
            c.field, c.filled, c.empty, c.malformed
        );
    }
    Ok(())
}

fn run_schema(config: &JournalConfig, json: bool) -> Result<()> {
    let schema = config.schema()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    println!("{:<18} {:<13} {:>4}  Chain", "Field", "Unit", "DP");
    println!("{}", "-".repeat(72));
    for f in schema.fields() {
        let chain: Vec<String> = f.chain.iter().map(describe_step).collect();
        let unit = format!("{:?}", f.unit);
        println!(
            "{:<18} {:<13} {:>4}  {}",
            f.name,
            unit,
            f.precision,
            chain.join(" -> ")
        );
    }
    Ok(())
}

fn describe_step(step: &SourceSpec) -> String {
    let mut s = match step {
        SourceSpec::Point { source, id, .. } => format!("{source}:{id}"),
        SourceSpec::Series {
            source,
            id,
            lookback_days,
            ..
        } => format!("{source}:{id} (<= {lookback_days}d)"),
    };
    if let Some(d) = step.divisor() {
        s.push_str(&format!(" /{d}"));
    }
    s
}

fn print_commit(commit: &CommitSummary) {
    println!(
        "Committed {} rows to {} ({}, {} bytes, blake3 {})",
        commit.rows_written,
        commit.path.display(),
        commit.mode,
        commit.bytes,
        &commit.digest[..12.min(commit.digest.len())]
    );
    if commit.dropped_updates > 0 {
        println!(
            "Warning: {} updates to stored rows dropped (append mode)",
            commit.dropped_updates
        );
    }
    if let Some(bak) = &commit.backup {
        println!("Backup: {}", bak.display());
    }
}

fn print_update(outcome: &UpdateOutcome) {
    let r = &outcome.report;
    println!(
        "Update ({}): {} added, {} updated, {} unchanged, {} skipped, {} cells filled",
        r.mode,
        r.added.len(),
        r.updated.len(),
        r.unchanged.len(),
        r.skipped.len(),
        r.filled_cells()
    );
    for change in &r.changes {
        println!("  {change}");
    }
    if !r.unavailable.is_empty() {
        println!("Unavailable: {} cells", r.unavailable.len());
        for c in &r.unavailable {
            println!("  {} {}", c.date, c.field);
        }
    }
    print_commit(&outcome.commit);
}

fn print_repair(outcome: &RepairOutcome) {
    let r = &outcome.report;
    println!(
        "Repair {}: {} cells changed, {} rows reordered",
        r.pass,
        r.changes.len(),
        r.rows_reordered
    );
    for (field, n) in &r.per_field {
        println!("  {field:<18} {n}");
    }
    for change in &r.changes {
        println!("  {change}");
    }
    if !r.unavailable.is_empty() {
        println!("Unavailable: {} cells", r.unavailable.len());
    }
    if !r.skipped_malformed.is_empty() {
        println!("Skipped malformed: {} cells", r.skipped_malformed.len());
        for c in &r.skipped_malformed {
            println!("  {} {}", c.date, c.field);
        }
    }
    match &outcome.commit {
        Some(commit) => print_commit(commit),
        None => println!("Nothing to repair; ledger untouched."),
    }
}

//! voldrip-cli — Replay and inspect Voldrip drip ledgers.
//!
//! `run` replays a JSON scenario of ledger operations against a fresh or
//! restored ledger and reports each step. `inspect` prints the active drips
//! and period history held in a snapshot file.

mod config;
mod scenario;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use voldrip_core::types::{Period, Timestamp};
use voldrip_ledger::{DripManager, LedgerSnapshot};

use crate::config::CliConfig;
use crate::scenario::{Outcome, Runner, Scenario};

/// Voldrip ledger command-line interface.
#[derive(Parser)]
#[command(name = "voldrip-cli")]
#[command(version, about = "Replay and inspect volume-proportional drip ledgers")]
struct Cli {
    /// Log level (trace, debug, info, warn, error). Overrides VOLDRIP_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format ("text" or "json"). Overrides VOLDRIP_LOG_FORMAT.
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Data directory for the persisted ledger. Overrides VOLDRIP_DATA_DIR.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario file.
    Run(RunArgs),
    /// Print the contents of a snapshot.
    Inspect(InspectArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Path to the scenario JSON file.
    scenario: PathBuf,

    /// Start from this snapshot instead of an empty ledger.
    #[arg(long)]
    from: Option<PathBuf>,

    /// Write the final ledger to this snapshot file.
    #[arg(long)]
    snapshot_out: Option<PathBuf>,

    /// Load from and save to the snapshot in the data directory.
    #[arg(long, conflicts_with_all = ["from", "snapshot_out"])]
    persist: bool,

    /// Stop at the first rejected operation.
    #[arg(long)]
    strict: bool,

    /// Print results as JSON lines.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct InspectArgs {
    /// Snapshot file (default: ledger snapshot in the data directory).
    snapshot: Option<PathBuf>,

    /// Print the snapshot as JSON.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = CliConfig::from_env()?;
    config.apply_overrides(cli.log_level, cli.log_format, cli.data_dir)?;

    init_logging(&config.log_level, &config.log_format);

    match cli.command {
        Commands::Run(args) => run(&config, args),
        Commands::Inspect(args) => inspect(&config, args),
    }
}

fn run(config: &CliConfig, args: RunArgs) -> Result<()> {
    let text = std::fs::read_to_string(&args.scenario)
        .with_context(|| format!("failed to read scenario {}", args.scenario.display()))?;
    let scenario = Scenario::from_json(&text)
        .with_context(|| format!("failed to parse scenario {}", args.scenario.display()))?;

    let persisted = config.snapshot_path();
    let (source, target) = if args.persist {
        let source = persisted.exists().then(|| persisted.clone());
        (source, Some(persisted))
    } else {
        (args.from, args.snapshot_out)
    };

    let ledger = match &source {
        Some(path) => load(path)?,
        None => DripManager::new(),
    };

    let start = match scenario.start_time {
        Some(t) => t,
        None => wall_clock()?,
    };
    info!(
        "replaying {} ops from {} (start_time={}, restored={})",
        scenario.ops.len(),
        args.scenario.display(),
        start,
        source.is_some()
    );

    let mut runner = Runner::new(ledger, start);
    let outcomes = runner.run(&scenario.ops, args.strict)?;
    for outcome in &outcomes {
        print_outcome(outcome, args.json)?;
    }

    let rejected = outcomes.iter().filter(|o| o.is_rejected()).count();
    info!(
        "replay finished: {} ops, {} rejected, {} paid, clock={}",
        outcomes.len(),
        rejected,
        runner.sink().total_paid(),
        runner.now()
    );
    if !args.json {
        println!("\n=== PAYOUTS ===");
        for ((drip, participant), amount) in runner.sink().balances() {
            println!("  drip {drip} -> {participant}: {amount}");
        }
    }

    if let Some(path) = target {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        runner
            .ledger()
            .save_to_file(&path)
            .with_context(|| format!("failed to write snapshot {}", path.display()))?;
        if !args.json {
            println!("\nSnapshot saved to: {}", path.display());
        }
    }
    Ok(())
}

fn inspect(config: &CliConfig, args: InspectArgs) -> Result<()> {
    let path = args.snapshot.unwrap_or_else(|| config.snapshot_path());
    let manager = load(&path)?;
    let snapshot = LedgerSnapshot::capture(&manager);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("=== LEDGER {} ===", path.display());
    println!(
        "Config: min_period_seconds={} max_amount={} max_periods_per_call={}",
        snapshot.config.min_period_seconds, snapshot.config.max_amount, snapshot.config.max_periods_per_call
    );
    println!("Measures: {}", snapshot.measures.len());
    for measure in &snapshot.measures {
        println!("\nMeasure {}", measure.measure);
        println!("  Active drips: {}", measure.active_drips.len());
        for drip in &measure.active_drips {
            println!("    {drip}");
        }
        for ledger in &measure.ledgers {
            let status = match ledger.config {
                Some(cfg) => format!(
                    "active, period_seconds={} drip_amount={}",
                    cfg.period_seconds, cfg.drip_amount
                ),
                None => "inactive".to_string(),
            };
            println!("  Drip {} ({status})", ledger.drip);
            let periods = ledger.closed.iter().chain(std::iter::once(&ledger.current));
            for (i, period) in periods.enumerate() {
                println!("    {}", format_period(i as u64 + 1, period));
            }
        }
        let participants = measure.participants.len();
        println!("  Participants: {participants}");
    }
    Ok(())
}

fn load(path: &Path) -> Result<DripManager> {
    DripManager::load_from_file(path).with_context(|| format!("failed to load snapshot {}", path.display()))
}

fn print_outcome(outcome: &Outcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(outcome)?);
        return Ok(());
    }
    match (&outcome.detail, &outcome.error) {
        (_, Some(error)) => println!(
            "[{:>3}] t={} {:<10} REJECTED: {}",
            outcome.step, outcome.timestamp, outcome.op, error
        ),
        (Some(detail), None) => println!(
            "[{:>3}] t={} {:<10} {}",
            outcome.step,
            outcome.timestamp,
            outcome.op,
            serde_json::to_string(detail)?
        ),
        (None, None) => println!("[{:>3}] t={} {}", outcome.step, outcome.timestamp, outcome.op),
    }
    Ok(())
}

fn format_period(index: u64, period: &Period) -> String {
    format!(
        "#{index:<4} end={} ({}) volume={} drip={}",
        period.end_time,
        format_time(period.end_time),
        period.total_volume,
        period.drip_amount
    )
}

fn format_time(t: Timestamp) -> String {
    i64::try_from(t)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "out of range".to_string())
}

fn wall_clock() -> Result<Timestamp> {
    let now = Utc::now().timestamp();
    Timestamp::try_from(now).context("system clock is before the Unix epoch")
}

fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_time_renders_utc() {
        assert_eq!(format_time(0), "1970-01-01 00:00:00 UTC");
        assert_eq!(format_time(u64::MAX), "out of range");
    }

    #[test]
    fn format_period_lists_fields() {
        let p = Period {
            total_volume: 7,
            drip_amount: 100,
            end_time: 60,
        };
        let line = format_period(2, &p);
        assert!(line.starts_with("#2"));
        assert!(line.contains("end=60"));
        assert!(line.contains("volume=7"));
        assert!(line.contains("drip=100"));
    }

    #[test]
    fn cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "voldrip-cli",
            "run",
            "scenario.json",
            "--snapshot-out",
            "out.vdrp",
            "--strict",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.scenario, PathBuf::from("scenario.json"));
                assert_eq!(args.snapshot_out, Some(PathBuf::from("out.vdrp")));
                assert!(args.strict && args.json && !args.persist);
            }
            Commands::Inspect(_) => panic!("expected run"),
        }
    }

    #[test]
    fn persist_conflicts_with_explicit_paths() {
        assert!(Cli::try_parse_from(["voldrip-cli", "run", "s.json", "--persist", "--from", "a"]).is_err());
    }

    #[test]
    fn replayed_ledger_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let scenario_path = dir.path().join("scenario.json");
        std::fs::write(
            &scenario_path,
            r#"{ "start_time": 0, "ops": [
                { "op": "activate", "measure": "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee",
                  "drip": "0x1111111111111111111111111111111111111111",
                  "period_seconds": 10, "drip_amount": 100 },
                { "op": "mint", "measure": "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee",
                  "participant": "0x0101010101010101010101010101010101010101", "amount": 5, "at": 4 }
            ] }"#,
        )
        .unwrap();
        let out = dir.path().join("nested").join("ledger.vdrp");
        let config = CliConfig {
            log_level: "info".into(),
            log_format: "text".into(),
            data_dir: dir.path().to_path_buf(),
        };
        let args = RunArgs {
            scenario: scenario_path,
            from: None,
            snapshot_out: Some(out.clone()),
            persist: false,
            strict: true,
            json: true,
        };
        run(&config, args).unwrap();

        let restored = load(&out).unwrap();
        let snapshot = LedgerSnapshot::capture(&restored);
        assert_eq!(snapshot.measures.len(), 1);
        assert_eq!(snapshot.measures[0].ledgers[0].current.total_volume, 5);
    }
}

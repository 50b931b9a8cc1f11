use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::{error, info};

use hoops_ingest::checkpoint::{CheckpointStatus, CheckpointStore};
use hoops_ingest::column_spec::ColumnSet;
use hoops_ingest::config::{self, IngestConfig};
use hoops_ingest::fetch::ResultSetFetcher;
use hoops_ingest::nba_api::NbaStatsClient;
use hoops_ingest::orchestrator::{
    EXIT_FATAL, EXIT_SUCCESS, RunOutcome, exit_code, ingest, plan_units,
};
use hoops_ingest::response_cache::{CachedSource, ResponseCache};
use hoops_ingest::store::Store;
use hoops_ingest::telemetry;

/// Ingestion worker. Exits 0 when every unit is complete, 42 when the
/// upstream session is exhausted and a relaunch should resume, 2 when some
/// units fetched nothing, 1 otherwise.
#[derive(Debug, Parser)]
#[command(name = "hoops_ingest", version)]
struct Args {
    #[arg(long)]
    db: Option<PathBuf>,
    #[arg(long)]
    columns: Option<PathBuf>,
    #[arg(long = "season", value_delimiter = ',')]
    seasons: Vec<String>,
    #[arg(long = "season-type", value_delimiter = ',')]
    season_types: Vec<String>,
    #[arg(long)]
    delay_ms: Option<u64>,
    #[arg(long)]
    cache_hours: Option<u64>,
    #[arg(long)]
    reset: bool,
    #[arg(long)]
    list: bool,
}

fn main() {
    let args = Args::parse();
    let cfg = IngestConfig::from_env();
    telemetry::init_tracing();

    let code = match run(args, cfg) {
        Ok(code) => code,
        Err(err) => {
            error!("fatal: {err:#}");
            EXIT_FATAL
        }
    };
    std::process::exit(code);
}

fn run(args: Args, mut cfg: IngestConfig) -> Result<i32> {
    if let Some(db) = args.db {
        cfg.db_path = db;
    }
    if let Some(columns) = args.columns {
        cfg.columns_file = columns;
    }
    if !args.seasons.is_empty() {
        cfg.seasons = config::parse_seasons(&args.seasons.join(","));
        if cfg.seasons.is_empty() {
            return Err(anyhow!("no valid seasons in {:?}", args.seasons));
        }
    }
    if !args.season_types.is_empty() {
        cfg.season_types = config::parse_season_types(&args.season_types.join(","));
        if cfg.season_types.is_empty() {
            return Err(anyhow!("no valid season types in {:?}", args.season_types));
        }
    }
    if let Some(ms) = args.delay_ms {
        cfg.call_delay = Duration::from_millis(ms);
    }
    if let Some(hours) = args.cache_hours {
        cfg.response_cache_max_age = Duration::from_secs(hours * 3600);
    }

    let mut checkpoints = CheckpointStore::open(&cfg.db_path)?;
    if args.reset {
        let cleared = checkpoints.reset()?;
        info!(cleared, "checkpoints reset");
    }

    if args.list {
        let spec = ColumnSet::load(&cfg.columns_file)?;
        let recorded = checkpoints
            .list()?
            .into_iter()
            .map(|row| (row.key.clone(), row))
            .collect::<HashMap<_, _>>();
        for unit in plan_units(&spec, &cfg.seasons, &cfg.season_types) {
            match recorded.get(&unit) {
                Some(row) => println!(
                    "{:<12} {unit} attempts={} calls={}/{} {}",
                    row.status.key(),
                    row.attempts,
                    row.calls_done,
                    row.calls_total,
                    row.last_error.as_deref().unwrap_or("")
                ),
                None => println!("{:<12} {unit}", CheckpointStatus::Pending.key()),
            }
        }
        return Ok(EXIT_SUCCESS);
    }

    let mut store = Store::open(&cfg.db_path)?;
    let cache_path = cfg.db_path.with_file_name("responses.sqlite");
    let cache = ResponseCache::open(&cache_path, cfg.response_cache_max_age)?;
    let purged = cache.purge_expired()?;
    let client = NbaStatsClient::new(&cfg.api_base_url, cfg.timeout)
        .context("build upstream client")?;
    let fetcher = ResultSetFetcher::new(
        CachedSource::new(client, cache),
        cfg.call_delay,
        cfg.failure_threshold,
    );

    info!(
        db = %cfg.db_path.display(),
        seasons = cfg.seasons.len(),
        season_types = cfg.season_types.len(),
        purged_cache_entries = purged,
        "worker starting"
    );
    let result = ingest(
        &cfg.columns_file,
        &cfg.seasons,
        &cfg.season_types,
        &mut store,
        &mut checkpoints,
        fetcher,
    );
    let code = exit_code(&result);
    let outcome = result?;

    let summary = outcome.summary();
    println!("Ingest {}", match &outcome {
        RunOutcome::Completed(_) => "complete",
        RunOutcome::Incomplete { .. } => "incomplete",
        RunOutcome::Exhausted { .. } => "interrupted",
    });
    println!("DB: {}", cfg.db_path.display());
    println!(
        "Units: {} done, {} already complete, {} total",
        summary.units_completed, summary.units_skipped, summary.units_total
    );
    println!("Values written: {}", summary.values_written);
    println!("Upstream calls: {}", summary.upstream_calls);
    if summary.subtraction_violations > 0 {
        println!("Subtraction violations: {}", summary.subtraction_violations);
    }
    match &outcome {
        RunOutcome::Exhausted { unit, exhaustion, .. } => println!("Stopped at {unit}: {exhaustion}"),
        RunOutcome::Incomplete { failed, .. } => {
            for unit in failed {
                println!("Unfinished: {unit}");
            }
            if summary.units_deferred > 0 {
                println!("Deferred: {}", summary.units_deferred);
            }
        }
        RunOutcome::Completed(_) => {}
    }
    Ok(code)
}

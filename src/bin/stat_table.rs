use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::{Parser, ValueEnum};

use hoops_ingest::column_spec::ColumnSet;
use hoops_ingest::config::{self, IngestConfig};
use hoops_ingest::query::query_population;
use hoops_ingest::record::EntityKind;
use hoops_ingest::scaler::StatMode;
use hoops_ingest::season::Season;
use hoops_ingest::settings::{AbsentPolicy, SETTINGS_FILE, SeasonScope, ViewSettings};
use hoops_ingest::store::Store;
use hoops_ingest::telemetry;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Totals,
    PerGame,
    PerMinutes,
    PerPossessions,
}

#[derive(Debug, Parser)]
#[command(name = "stat_table", version)]
struct Args {
    #[arg(long, default_value = "player")]
    kind: String,
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,
    #[arg(long)]
    per: Option<f64>,
    /// `current`, `career`, `last:N` or a comma list of seasons.
    #[arg(long)]
    scope: Option<String>,
    #[arg(long = "season-type", value_delimiter = ',')]
    season_types: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    stats: Vec<String>,
    #[arg(long)]
    absent_as_zero: bool,
    #[arg(long)]
    save: bool,
    #[arg(long)]
    limit: Option<usize>,
    #[arg(long)]
    db: Option<PathBuf>,
    #[arg(long)]
    columns: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = IngestConfig::from_env();
    telemetry::init_tracing();

    let db_path = args.db.clone().unwrap_or(cfg.db_path.clone());
    let columns = args.columns.clone().unwrap_or(cfg.columns_file.clone());
    let settings_path = db_path.with_file_name(SETTINGS_FILE);

    let kind = EntityKind::parse(&args.kind).ok_or_else(|| anyhow!("unknown kind {}", args.kind))?;
    let mut settings = ViewSettings::load(&settings_path);
    if cfg.absent_as_zero || args.absent_as_zero {
        settings.absent_policy = AbsentPolicy::TreatAsZero;
    }
    apply_args(&args, &mut settings)?;
    if args.save {
        settings.save(&settings_path)?;
    }

    let spec = ColumnSet::load(&columns)?;
    let store = Store::open(&db_path)?;
    // Off-season: the latest stored season stands in for the current one.
    let current = store
        .seasons_with_data(kind)?
        .first()
        .copied()
        .unwrap_or_else(Season::current);
    let table = query_population(&store, &spec, &settings, kind, current)?;

    let stats = if args.stats.is_empty() {
        table.stats.clone()
    } else {
        args.stats.clone()
    };
    println!(
        "{} | {} | {} | {:?}",
        kind,
        settings.mode.label(),
        settings.season_scope.label(),
        settings.season_types
    );
    print!("{:<28}", "name");
    for stat in &stats {
        print!("{stat:>14}");
    }
    println!();

    let limit = args.limit.unwrap_or(usize::MAX);
    for row in table.rows.iter().take(limit) {
        print!("{:<28}", truncate(&row.name, 27));
        for stat in &stats {
            let cell = match (row.result.value(stat), row.percentile(stat)) {
                (Some(v), Some(p)) => format!("{v:.1} ({p:.0})"),
                (Some(v), None) => format!("{v:.1}"),
                (None, _) => "-".to_string(),
            };
            print!("{cell:>14}");
        }
        println!();
    }
    Ok(())
}

fn apply_args(args: &Args, settings: &mut ViewSettings) -> Result<()> {
    if let Some(mode) = args.mode {
        settings.mode = match mode {
            ModeArg::Totals => StatMode::Totals,
            ModeArg::PerGame => StatMode::PerGame,
            ModeArg::PerMinutes => StatMode::PerMinutes {
                minutes: args.per.unwrap_or(36.0),
            },
            ModeArg::PerPossessions => StatMode::PerPossessions {
                possessions: args.per.unwrap_or(100.0),
            },
        };
    }
    if let Some(scope) = &args.scope {
        settings.season_scope = parse_scope(scope)?;
    }
    if !args.season_types.is_empty() {
        let types = config::parse_season_types(&args.season_types.join(","));
        if types.is_empty() {
            return Err(anyhow!("no valid season types in {:?}", args.season_types));
        }
        settings.season_types = types;
    }
    Ok(())
}

fn parse_scope(raw: &str) -> Result<SeasonScope> {
    let raw = raw.trim();
    match raw {
        "current" => return Ok(SeasonScope::Current),
        "career" => return Ok(SeasonScope::Career),
        _ => {}
    }
    if let Some(n) = raw.strip_prefix("last:") {
        let years = n
            .trim()
            .parse::<u32>()
            .map_err(|_| anyhow!("bad year count in scope {raw}"))?;
        return Ok(SeasonScope::LastN { years });
    }
    let seasons = config::parse_seasons(raw);
    if seasons.is_empty() {
        return Err(anyhow!("unrecognised season scope {raw}"));
    }
    Ok(SeasonScope::Seasons { seasons })
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

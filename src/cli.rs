//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_archive_adapter::CsvArchiveAdapter;
use crate::adapters::csv_price_adapter::CsvPriceAdapter;
use crate::adapters::csv_report_adapter::{read_series, write_series_csv, CsvReportAdapter};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::file_listing_adapter::FileListingAdapter;
use crate::adapters::overrides_adapter::load_overrides;
use crate::domain::asset::OverrideTable;
use crate::domain::asset_filter::{filter_universe, ExclusionSets};
use crate::domain::backfill::{backfill_current_basket, BackfillConfig, BackfillRun};
use crate::domain::config_validation::{parse_cap_entry, validate_config, Settings};
use crate::domain::continuity::{merge, rebase_at, MergeConfig, SeriesPoint};
use crate::domain::error::IndexError;
use crate::domain::index::{IndexEngine, IndexPoint, IndexRun};
use crate::domain::rebalance::RebalanceFrequency;
use crate::domain::returns::ReturnCalculator;
use crate::domain::summary::{contribution_report, SeriesSummary, TOP_CONTRIBUTORS};
use crate::domain::weights::WeightBuilder;
use crate::ports::daily_data_port::DailyDataPort;
use crate::ports::listing_port::{ListingPort, NoListings};
use crate::ports::price_port::PriceSourcePort;
use crate::ports::report_port::ReportPort;

pub const BACKFILL_FILE: &str = "bm20_backfill.csv";
pub const MERGED_FILE: &str = "bm20_merged.csv";

#[derive(Parser, Debug)]
#[command(name = "bm20", about = "BM20 crypto index builder")]
pub struct Cli {
    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the index series from the daily archive
    Build {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        rebalance: Option<RebalanceFrequency>,
        #[arg(long)]
        base_date: Option<NaiveDate>,
        #[arg(long)]
        base_value: Option<f64>,
        /// SYMBOL:FRACTION, repeatable
        #[arg(long = "cap", value_parser = parse_cap_entry)]
        caps: Vec<(String, f64)>,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Backfill history for the latest basket from close prices
    Backfill {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Splice a backfilled series onto a live series
    Merge {
        backfill: PathBuf,
        live: PathBuf,
        /// Takes `[merge]` defaults from this file
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        base: Option<f64>,
        #[arg(long)]
        head_window: Option<usize>,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Rescale a series so one date sits at a base value
    Rebase {
        input: PathBuf,
        output: PathBuf,
        #[arg(long)]
        base_date: Option<NaiveDate>,
        #[arg(long, default_value_t = 100.0)]
        base_value: f64,
    },
    /// Validate a configuration file and print the resolved settings
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Build {
            config,
            rebalance,
            base_date,
            base_value,
            caps,
            out,
        } => run_build(&config, rebalance, base_date, base_value, caps, out),
        Command::Backfill {
            config,
            start,
            end,
            out,
        } => run_backfill(&config, start, end, out),
        Command::Merge {
            backfill,
            live,
            config,
            base,
            head_window,
            out,
        } => run_merge(&backfill, &live, config.as_deref(), base, head_window, out),
        Command::Rebase {
            input,
            output,
            base_date,
            base_value,
        } => run_rebase(&input, &output, base_date, base_value),
        Command::Validate { config } => run_validate(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            (&e).into()
        }
    }
}

pub fn load_settings(path: &Path) -> Result<Settings, IndexError> {
    tracing::info!(path = %path.display(), "loading config");
    let adapter = FileConfigAdapter::from_file(path)?;
    validate_config(&adapter)
}

/// Optional collaborators named in `[data]`.
pub struct Collaborators {
    pub overrides: OverrideTable,
    pub listings: Box<dyn ListingPort>,
    pub prices: Option<CsvPriceAdapter>,
}

pub fn load_collaborators(settings: &Settings) -> Result<Collaborators, IndexError> {
    let overrides = match &settings.data.overrides {
        Some(path) => load_overrides(path)?,
        None => OverrideTable::default(),
    };
    let listings: Box<dyn ListingPort> = match &settings.data.listings {
        Some(path) => Box::new(FileListingAdapter::from_file(path)?),
        None => Box::new(NoListings),
    };
    let prices = settings
        .data
        .prices
        .as_ref()
        .map(|dir| CsvPriceAdapter::new(PathBuf::from(dir)));
    Ok(Collaborators {
        overrides,
        listings,
        prices,
    })
}

pub fn run_build(
    config_path: &Path,
    rebalance: Option<RebalanceFrequency>,
    base_date: Option<NaiveDate>,
    base_value: Option<f64>,
    caps: Vec<(String, f64)>,
    out: Option<PathBuf>,
) -> Result<(), IndexError> {
    let mut settings = load_settings(config_path)?;
    if let Some(frequency) = rebalance {
        settings.index.frequency = frequency;
    }
    if base_date.is_some() {
        settings.index.base_date = base_date;
    }
    if let Some(value) = base_value {
        if !(value.is_finite() && value > 0.0) {
            return Err(IndexError::config_invalid("index", "base_value", "base_value must be positive"));
        }
        settings.index.base_value = value;
    }
    settings.weights.caps.extend(caps);
    if let Some(dir) = out {
        settings.data.output = dir.display().to_string();
    }

    let collaborators = load_collaborators(&settings)?;
    let archive = CsvArchiveAdapter::new(PathBuf::from(&settings.data.archive));
    let report = CsvReportAdapter::new(PathBuf::from(&settings.data.output));

    let run = run_build_pipeline(
        &settings,
        &archive,
        collaborators.prices.as_ref().map(|p| p as &dyn PriceSourcePort),
        collaborators.listings.as_ref(),
        &collaborators.overrides,
        &report,
    )?;

    if let Some(latest) = run.latest() {
        tracing::info!(
            date = %latest.date,
            level = latest.level,
            out = %settings.data.output,
            "index built"
        );
    }
    Ok(())
}

pub fn series_of(points: &[IndexPoint]) -> Vec<SeriesPoint> {
    points
        .iter()
        .map(|p| SeriesPoint::new(p.date, p.level))
        .collect()
}

/// Loads the archive, runs the index engine and writes every artifact.
pub fn run_build_pipeline(
    settings: &Settings,
    data: &dyn DailyDataPort,
    prices: Option<&dyn PriceSourcePort>,
    listings: &dyn ListingPort,
    overrides: &OverrideTable,
    report: &dyn ReportPort,
) -> Result<IndexRun, IndexError> {
    let days = data.load_days()?;
    tracing::info!(
        days = days.len(),
        rebalance = %settings.index.frequency,
        weights = %settings.weights.scheme,
        "building index"
    );

    let exclusions = ExclusionSets::new(settings.exclude_exchange_tokens);
    let engine = IndexEngine::new(
        &settings.index,
        &exclusions,
        overrides,
        WeightBuilder::new(&settings.weights, overrides, listings),
        ReturnCalculator::new(&settings.returns, overrides, prices),
    );
    let run = engine.run(&days)?;

    for anchor in &run.unconverged_anchors {
        tracing::warn!(%anchor, "caps did not converge, best approximation used");
    }
    if run.flagged_returns > 0 {
        tracing::warn!(count = run.flagged_returns, "returns outside bounds");
    }

    report.write_index(&run.points)?;
    if settings.dump_constituents {
        for snapshot in &run.snapshots {
            report.write_constituents(snapshot)?;
        }
    }
    if let Some(summary) = SeriesSummary::compute(&series_of(&run.points)) {
        let contributions = contribution_report(&run.contributions, TOP_CONTRIBUTORS);
        report.write_summary(&summary, contributions.as_ref())?;
    }
    Ok(run)
}

pub fn run_backfill(
    config_path: &Path,
    start: NaiveDate,
    end: Option<NaiveDate>,
    out: Option<PathBuf>,
) -> Result<(), IndexError> {
    let settings = load_settings(config_path)?;
    let collaborators = load_collaborators(&settings)?;
    let prices = collaborators.prices.as_ref().ok_or_else(|| IndexError::ConfigMissing {
        section: "data".to_string(),
        key: "prices".to_string(),
    })?;
    let archive = CsvArchiveAdapter::new(PathBuf::from(&settings.data.archive));

    let run = run_backfill_pipeline(
        &settings,
        &archive,
        prices,
        collaborators.listings.as_ref(),
        &collaborators.overrides,
        start,
        end,
    )?;

    let series = series_of(&run.points);
    let path = match out {
        Some(path) => {
            write_series_csv(&path, &series)?;
            path
        }
        None => {
            let report = CsvReportAdapter::new(PathBuf::from(&settings.data.output));
            report.write_series(BACKFILL_FILE, &series)?;
            report.series_path(BACKFILL_FILE)
        }
    };
    tracing::info!(points = run.points.len(), path = %path.display(), "backfill written");
    Ok(())
}

/// Weights the latest archived day with the configured rules and replays
/// them over `[start, end]` (end defaults to that day).
pub fn run_backfill_pipeline(
    settings: &Settings,
    data: &dyn DailyDataPort,
    prices: &dyn PriceSourcePort,
    listings: &dyn ListingPort,
    overrides: &OverrideTable,
    start: NaiveDate,
    end: Option<NaiveDate>,
) -> Result<BackfillRun, IndexError> {
    let days = data.load_days()?;
    let latest = days
        .iter()
        .max_by_key(|d| d.date)
        .ok_or_else(|| IndexError::NoDailyData {
            location: settings.data.archive.clone(),
        })?;
    let end = end.unwrap_or(latest.date);
    if start > end {
        return Err(IndexError::config_invalid("backfill", "start", "start must not be after end"));
    }

    let exclusions = ExclusionSets::new(settings.exclude_exchange_tokens);
    let universe = filter_universe(latest, &exclusions, overrides);
    let build = WeightBuilder::new(&settings.weights, overrides, listings).build(&universe);
    tracing::info!(
        basket_date = %latest.date,
        constituents = build.vector.len(),
        %start,
        %end,
        "backfilling"
    );

    let config = BackfillConfig::new(&settings.returns, settings.index.base_value);
    let run = backfill_current_basket(&build.vector, prices, overrides, start, end, &config)?;
    for symbol in &run.unpriced_symbols {
        tracing::warn!(symbol = %symbol, "no close history, excluded from backfill");
    }
    Ok(run)
}

pub fn run_merge(
    backfill_path: &Path,
    live_path: &Path,
    config_path: Option<&Path>,
    base: Option<f64>,
    head_window: Option<usize>,
    out: Option<PathBuf>,
) -> Result<(), IndexError> {
    let defaults = match config_path {
        Some(path) => load_settings(path)?.merge,
        None => MergeConfig::default(),
    };
    if base.is_some_and(|value| !(value.is_finite() && value > 0.0)) {
        return Err(IndexError::config_invalid("merge", "base_value", "base_value must be positive"));
    }
    if head_window == Some(0) {
        return Err(IndexError::config_invalid("merge", "head_window", "head_window must be at least 1"));
    }
    let config = MergeConfig {
        base_value: base.unwrap_or(defaults.base_value),
        head_window: head_window.unwrap_or(defaults.head_window),
    };

    let backfill = if backfill_path.exists() {
        read_series(backfill_path)?
    } else {
        tracing::warn!(path = %backfill_path.display(), "backfill not found, rebasing live series only");
        Vec::new()
    };
    let live = read_series(live_path)?;

    let outcome = merge(&backfill, &live, &config)?;
    let path = out.unwrap_or_else(|| PathBuf::from(MERGED_FILE));
    write_series_csv(&path, &outcome.points)?;
    tracing::info!(
        points = outcome.points.len(),
        pre_join = outcome.pre_join,
        scale = ?outcome.scale,
        path = %path.display(),
        "merged series written"
    );
    Ok(())
}

pub fn run_rebase(
    input: &Path,
    output: &Path,
    base_date: Option<NaiveDate>,
    base_value: f64,
) -> Result<(), IndexError> {
    if !(base_value.is_finite() && base_value > 0.0) {
        return Err(IndexError::config_invalid("rebase", "base_value", "base_value must be positive"));
    }
    let points = read_series(input)?;
    let date = match base_date.or_else(|| points.first().map(|p| p.date)) {
        Some(date) => date,
        None => {
            return Err(IndexError::EmptySeries {
                series: input.display().to_string(),
            });
        }
    };
    let rebased = rebase_at(&points, date, base_value)?;
    write_series_csv(output, &rebased)?;
    tracing::info!(points = rebased.len(), path = %output.display(), "rebased series written");
    Ok(())
}

pub fn run_validate(config_path: &Path) -> Result<(), IndexError> {
    let settings = load_settings(config_path)?;
    let collaborators = load_collaborators(&settings)?;

    let mut caps: Vec<_> = settings.weights.caps.iter().collect();
    caps.sort_by(|a, b| a.0.cmp(b.0));

    eprintln!("Config validated successfully");
    eprintln!("\nData:");
    eprintln!("  archive:   {}", settings.data.archive);
    eprintln!("  overrides: {} entries", collaborators.overrides.len());
    eprintln!("  prices:    {}", settings.data.prices.as_deref().unwrap_or("(none)"));
    eprintln!("  listings:  {}", settings.data.listings.as_deref().unwrap_or("(none)"));
    eprintln!("  output:    {}", settings.data.output);
    eprintln!("\nIndex:");
    eprintln!("  rebalance:       {}", settings.index.frequency);
    match settings.index.base_date {
        Some(date) => eprintln!("  base date:       {}", date),
        None => eprintln!("  base date:       first available"),
    }
    eprintln!("  base value:      {}", settings.index.base_value);
    eprintln!("  missing returns: {}", settings.index.missing_returns);
    eprintln!("\nWeights:");
    eprintln!("  source:        {}", settings.weights.scheme);
    eprintln!("  listing bonus: {}", settings.weights.listing_bonus);
    for (symbol, cap) in caps {
        eprintln!("  cap {}: {}", symbol, cap);
    }
    eprintln!("  exchange tokens excluded: {}", settings.exclude_exchange_tokens);
    eprintln!("\nReturns:");
    match settings.returns.bounds {
        Some(b) => eprintln!("  bounds: [{}, {}] ({})", b.lower, b.upper, settings.returns.outliers),
        None => eprintln!("  bounds: none"),
    }
    eprintln!("  fallback window: {} days", settings.returns.fallback_window_days);
    eprintln!("\nMerge:");
    eprintln!("  base value:  {}", settings.merge.base_value);
    eprintln!("  head window: {}", settings.merge.head_window);

    eprintln!("\nDry run complete: configuration is valid");
    Ok(())
}

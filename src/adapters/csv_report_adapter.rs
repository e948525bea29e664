//! CSV and JSON artifact writer implementing ReportPort.
//!
//! Layout under the output directory:
//! - `bm20_index.csv` (`date,index,ret,n_constituents,n_priced`)
//! - `bm20_constituents_<label>.csv` (`symbol,weight_base`), one per anchor
//! - `bm20_summary.json`

use crate::adapters::csv_archive_adapter::lenient_number;
use crate::domain::continuity::{daily_returns, SeriesPoint};
use crate::domain::error::IndexError;
use crate::domain::index::{ConstituentSnapshot, IndexPoint};
use crate::domain::summary::{ContributionReport, SeriesSummary};
use crate::ports::report_port::ReportPort;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const INDEX_FILE: &str = "bm20_index.csv";
pub const SUMMARY_FILE: &str = "bm20_summary.json";

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct CsvReportAdapter {
    out_dir: PathBuf,
}

#[derive(Serialize)]
struct IndexRecord {
    date: String,
    index: f64,
    ret: f64,
    n_constituents: usize,
    n_priced: usize,
}

#[derive(Serialize)]
struct ConstituentRecord<'a> {
    symbol: &'a str,
    weight_base: f64,
}

#[derive(Serialize)]
struct SeriesRecord {
    date: String,
    index: f64,
    ret: Option<f64>,
}

#[derive(Deserialize)]
struct SeriesInput {
    date: String,
    #[serde(alias = "level", deserialize_with = "lenient_number")]
    index: Option<f64>,
}

#[derive(Serialize)]
struct SummaryDoc {
    as_of: String,
    level: f64,
    returns: ReturnsDoc,
    volatility: f64,
    max_drawdown: f64,
    max_drawdown_duration: i64,
    observations: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    contributions: Option<ContributionsDoc>,
}

#[derive(Serialize)]
struct ReturnsDoc {
    d1: Option<f64>,
    mtd: Option<f64>,
    qtd: Option<f64>,
    ytd: Option<f64>,
    total: f64,
    annualized: f64,
}

#[derive(Serialize)]
struct ContributionsDoc {
    as_of: String,
    windows: BTreeMap<&'static str, WindowDoc>,
    best: Vec<RankedDoc>,
    worst: Vec<RankedDoc>,
}

#[derive(Serialize)]
struct WindowDoc {
    start: String,
    top: Vec<RankedDoc>,
}

#[derive(Serialize)]
struct RankedDoc {
    symbol: String,
    value: f64,
}

fn ranked(entries: &[(String, f64)]) -> Vec<RankedDoc> {
    entries
        .iter()
        .map(|(symbol, value)| RankedDoc {
            symbol: symbol.clone(),
            value: *value,
        })
        .collect()
}

fn fmt_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn write_error(path: &Path, e: impl std::fmt::Display) -> IndexError {
    IndexError::ReportWrite {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

fn ensure_parent(path: &Path) -> Result<(), IndexError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| write_error(path, e))
        }
        _ => Ok(()),
    }
}

fn write_records<S: Serialize>(path: &Path, records: impl IntoIterator<Item = S>) -> Result<(), IndexError> {
    ensure_parent(path)?;
    let mut wtr = csv::Writer::from_path(path).map_err(|e| write_error(path, e))?;
    for record in records {
        wtr.serialize(record).map_err(|e| write_error(path, e))?;
    }
    wtr.flush().map_err(|e| write_error(path, e))?;
    tracing::debug!(path = %path.display(), "wrote artifact");
    Ok(())
}

/// Writes a `date,index,ret` series; the first `ret` is blank.
pub fn write_series_csv(path: &Path, points: &[SeriesPoint]) -> Result<(), IndexError> {
    let returns = daily_returns(points);
    write_records(
        path,
        points.iter().zip(returns).map(|(p, ret)| SeriesRecord {
            date: fmt_date(p.date),
            index: p.level,
            ret,
        }),
    )
}

/// Reads a `date,index` series (`level` accepted for `index`, other columns
/// ignored). Rows without a level are skipped. Ascending by date.
pub fn read_series<P: AsRef<Path>>(path: P) -> Result<Vec<SeriesPoint>, IndexError> {
    let path = path.as_ref();
    let read_error = |reason: String| IndexError::DataRead {
        source_name: path.display().to_string(),
        reason,
    };
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| read_error(e.to_string()))?;

    let mut points = Vec::new();
    for result in rdr.deserialize::<SeriesInput>() {
        let record = result.map_err(|e| read_error(format!("CSV parse error: {}", e)))?;
        let date = NaiveDate::parse_from_str(&record.date, DATE_FORMAT)
            .map_err(|e| read_error(format!("invalid date '{}': {}", record.date, e)))?;
        if let Some(level) = record.index {
            points.push(SeriesPoint::new(date, level));
        }
    }
    points.sort_by_key(|p| p.date);
    Ok(points)
}

impl CsvReportAdapter {
    pub fn new(out_dir: PathBuf) -> Self {
        Self { out_dir }
    }

    pub fn constituents_path(&self, label: &str) -> PathBuf {
        self.out_dir.join(format!("bm20_constituents_{}.csv", label))
    }

    pub fn index_path(&self) -> PathBuf {
        self.out_dir.join(INDEX_FILE)
    }

    pub fn series_path(&self, name: &str) -> PathBuf {
        self.out_dir.join(name)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.out_dir.join(SUMMARY_FILE)
    }
}

impl ReportPort for CsvReportAdapter {
    fn write_index(&self, points: &[IndexPoint]) -> Result<(), IndexError> {
        write_records(
            &self.index_path(),
            points.iter().map(|p| IndexRecord {
                date: fmt_date(p.date),
                index: p.level,
                ret: p.daily_return,
                n_constituents: p.constituents,
                n_priced: p.priced,
            }),
        )
    }

    fn write_constituents(&self, snapshot: &ConstituentSnapshot) -> Result<(), IndexError> {
        write_records(
            &self.constituents_path(&snapshot.label),
            snapshot.weights.iter().map(|(symbol, weight)| ConstituentRecord {
                symbol,
                weight_base: *weight,
            }),
        )
    }

    fn write_series(&self, name: &str, points: &[SeriesPoint]) -> Result<(), IndexError> {
        write_series_csv(&self.series_path(name), points)
    }

    fn write_summary(
        &self,
        summary: &SeriesSummary,
        contributions: Option<&ContributionReport>,
    ) -> Result<(), IndexError> {
        let doc = SummaryDoc {
            as_of: fmt_date(summary.as_of),
            level: summary.level,
            returns: ReturnsDoc {
                d1: summary.d1,
                mtd: summary.mtd,
                qtd: summary.qtd,
                ytd: summary.ytd,
                total: summary.total_return,
                annualized: summary.annualized_return,
            },
            volatility: summary.volatility,
            max_drawdown: summary.max_drawdown,
            max_drawdown_duration: summary.max_drawdown_duration,
            observations: summary.observations,
            contributions: contributions.map(|report| ContributionsDoc {
                as_of: fmt_date(report.as_of),
                windows: report
                    .windows
                    .iter()
                    .map(|w| {
                        (
                            w.window.label(),
                            WindowDoc {
                                start: fmt_date(w.start),
                                top: ranked(&w.top),
                            },
                        )
                    })
                    .collect(),
                best: ranked(&report.best),
                worst: ranked(&report.worst),
            }),
        };

        let path = self.summary_path();
        ensure_parent(&path)?;
        let json = serde_json::to_string_pretty(&doc).map_err(|e| write_error(&path, e))?;
        fs::write(&path, json).map_err(|e| write_error(&path, e))?;
        tracing::debug!(path = %path.display(), "wrote artifact");
        Ok(())
    }
}

//! Series statistics and return attribution for published artifacts.

use crate::domain::continuity::SeriesPoint;
use crate::domain::index::DailyContribution;
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;

/// Crypto markets trade every calendar day.
const DAYS_PER_YEAR: f64 = 365.0;
pub const TOP_CONTRIBUTORS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    MonthToDate,
    QuarterToDate,
    YearToDate,
}

impl Window {
    pub const ALL: [Window; 3] = [Window::MonthToDate, Window::QuarterToDate, Window::YearToDate];

    pub fn label(self) -> &'static str {
        match self {
            Window::MonthToDate => "MTD",
            Window::QuarterToDate => "QTD",
            Window::YearToDate => "YTD",
        }
    }

    /// First calendar day of the window containing `date`.
    pub fn start(self, date: NaiveDate) -> NaiveDate {
        let month = match self {
            Window::MonthToDate => date.month(),
            Window::QuarterToDate => (date.month() - 1) / 3 * 3 + 1,
            Window::YearToDate => 1,
        };
        NaiveDate::from_ymd_opt(date.year(), month, 1).unwrap_or(date)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSummary {
    pub as_of: NaiveDate,
    pub level: f64,
    pub d1: Option<f64>,
    pub mtd: Option<f64>,
    pub qtd: Option<f64>,
    pub ytd: Option<f64>,
    pub total_return: f64,
    pub annualized_return: f64,
    /// Annualized standard deviation of daily returns.
    pub volatility: f64,
    pub max_drawdown: f64,
    /// Longest run of observations spent below a prior peak.
    pub max_drawdown_duration: i64,
    pub observations: usize,
}

impl SeriesSummary {
    /// `None` for an empty series. `points` must be ascending by date.
    pub fn compute(points: &[SeriesPoint]) -> Option<Self> {
        let first = points.first()?;
        let last = points.last()?;

        let total_return = if first.level > 0.0 {
            last.level / first.level - 1.0
        } else {
            0.0
        };
        let years = (last.date - first.date).num_days() as f64 / DAYS_PER_YEAR;
        let annualized_return = if years > 0.0 && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let d1 = match points {
            [.., prev, _] if prev.level > 0.0 => Some(last.level / prev.level - 1.0),
            _ => None,
        };
        let (max_drawdown, max_drawdown_duration) = compute_drawdown(points);

        Some(SeriesSummary {
            as_of: last.date,
            level: last.level,
            d1,
            mtd: window_return(points, Window::MonthToDate),
            qtd: window_return(points, Window::QuarterToDate),
            ytd: window_return(points, Window::YearToDate),
            total_return,
            annualized_return,
            volatility: compute_volatility(points),
            max_drawdown,
            max_drawdown_duration,
            observations: points.len(),
        })
    }
}

/// Return from the last level before the window opened (or the window's
/// first level when the series starts inside it) to the latest level.
pub fn window_return(points: &[SeriesPoint], window: Window) -> Option<f64> {
    let last = points.last()?;
    let start = window.start(last.date);
    let reference = points
        .iter()
        .rev()
        .find(|p| p.date < start)
        .or_else(|| points.iter().find(|p| p.date >= start))?;
    (reference.level > 0.0).then(|| last.level / reference.level - 1.0)
}

fn compute_drawdown(points: &[SeriesPoint]) -> (f64, i64) {
    if points.is_empty() {
        return (0.0, 0);
    }

    let mut peak = points[0].level;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0i64;
    let mut current_dd_duration = 0i64;

    for point in points {
        if point.level >= peak {
            peak = point.level;
            current_dd_duration = 0;
        } else if peak > 0.0 {
            let dd = (peak - point.level) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
            current_dd_duration += 1;
            if current_dd_duration > max_dd_duration {
                max_dd_duration = current_dd_duration;
            }
        }
    }

    (max_dd, max_dd_duration)
}

fn compute_volatility(points: &[SeriesPoint]) -> f64 {
    let returns: Vec<f64> = points
        .windows(2)
        .filter(|w| w[0].level > 0.0)
        .map(|w| w[1].level / w[0].level - 1.0)
        .collect();
    if returns.len() < 2 {
        return 0.0;
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    variance.sqrt() * DAYS_PER_YEAR.sqrt()
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowContributions {
    pub window: Window,
    pub start: NaiveDate,
    /// Descending by contribution.
    pub top: Vec<(String, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContributionReport {
    pub as_of: NaiveDate,
    pub windows: Vec<WindowContributions>,
    /// Last day's priced constituents by return, best first.
    pub best: Vec<(String, f64)>,
    /// Last day's priced constituents by return, worst first.
    pub worst: Vec<(String, f64)>,
}

fn descending(mut entries: Vec<(String, f64)>) -> Vec<(String, f64)> {
    entries.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries
}

/// Sums each symbol's daily `weight × return` over MTD, QTD and YTD and
/// ranks the last day's movers. `None` when there are no days.
pub fn contribution_report(days: &[DailyContribution], top_n: usize) -> Option<ContributionReport> {
    let as_of = days.iter().map(|d| d.date).max()?;

    let windows = Window::ALL
        .iter()
        .map(|&window| {
            let start = window.start(as_of);
            let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
            for day in days.iter().filter(|d| d.date >= start && d.date <= as_of) {
                for entry in &day.entries {
                    *totals.entry(entry.symbol.as_str()).or_insert(0.0) += entry.value();
                }
            }
            let mut top = descending(
                totals
                    .into_iter()
                    .map(|(s, v)| (s.to_string(), v))
                    .collect(),
            );
            top.truncate(top_n);
            WindowContributions { window, start, top }
        })
        .collect();

    let last_day: Vec<(String, f64)> = days
        .iter()
        .find(|d| d.date == as_of)
        .map(|d| {
            d.entries
                .iter()
                .filter(|e| e.priced)
                .map(|e| (e.symbol.clone(), e.asset_return))
                .collect()
        })
        .unwrap_or_default();

    let mut best = descending(last_day);
    let mut worst: Vec<(String, f64)> = best.iter().rev().cloned().collect();
    best.truncate(top_n);
    worst.truncate(top_n);

    Some(ContributionReport {
        as_of,
        windows,
        best,
        worst,
    })
}

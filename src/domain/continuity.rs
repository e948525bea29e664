//! Splicing a backfilled history onto a live series, and rebasing.

use crate::domain::error::IndexError;
use crate::domain::returns::median;
use chrono::NaiveDate;

pub const DEFAULT_HEAD_WINDOW: usize = 5;
const SEAM_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub level: f64,
}

impl SeriesPoint {
    pub fn new(date: NaiveDate, level: f64) -> Self {
        Self { date, level }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeConfig {
    pub base_value: f64,
    /// Number of leading valid points whose median is rebased to `base_value`.
    pub head_window: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            base_value: 100.0,
            head_window: DEFAULT_HEAD_WINDOW,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub points: Vec<SeriesPoint>,
    /// `None` when the backfill was empty or had no usable level at the seam.
    pub scale: Option<f64>,
    pub pre_join: usize,
    pub live: usize,
}

fn sorted(points: &[SeriesPoint]) -> Vec<SeriesPoint> {
    let mut out = points.to_vec();
    out.sort_by_key(|p| p.date);
    out.dedup_by_key(|p| p.date);
    out
}

/// Levels are positive; anything else cannot anchor a rescale.
fn usable(level: f64) -> bool {
    level.is_finite() && level > SEAM_EPSILON
}

/// Last backfill level dated on or before `date`.
pub fn level_as_of(points: &[SeriesPoint], date: NaiveDate) -> Option<f64> {
    points
        .iter()
        .filter(|p| p.date <= date)
        .max_by_key(|p| p.date)
        .map(|p| p.level)
}

/// Rescales backfill points before the live series' first date so the
/// two meet at the seam, concatenates, and rebases the result.
pub fn merge(
    backfill: &[SeriesPoint],
    live: &[SeriesPoint],
    config: &MergeConfig,
) -> Result<MergeOutcome, IndexError> {
    let live = sorted(live);
    let Some(first) = live.first().copied() else {
        return Err(IndexError::EmptySeries {
            series: "live".to_string(),
        });
    };
    let backfill = sorted(backfill);

    let scale = if backfill.is_empty() {
        None
    } else {
        match level_as_of(&backfill, first.date) {
            Some(anchor) if usable(anchor) && usable(first.level) => {
                Some(first.level / anchor)
            }
            anchor => {
                tracing::warn!(
                    join = %first.date,
                    anchor = ?anchor,
                    "backfill level unusable at seam, concatenating unscaled"
                );
                None
            }
        }
    };

    let factor = scale.unwrap_or(1.0);
    let mut points: Vec<SeriesPoint> = backfill
        .iter()
        .filter(|p| p.date < first.date)
        .map(|p| SeriesPoint::new(p.date, p.level * factor))
        .collect();
    let pre_join = points.len();
    points.extend(live.iter().copied());

    tracing::info!(pre_join, live = live.len(), scale = ?scale, "series merged");
    let points = rebase_to_head_median(&points, config.base_value, config.head_window)?;

    Ok(MergeOutcome {
        points,
        scale,
        pre_join,
        live: live.len(),
    })
}

/// Rescales so the median of the first `head_window` valid levels equals
/// `base_value`. A series with no valid head is returned unchanged.
pub fn rebase_to_head_median(
    points: &[SeriesPoint],
    base_value: f64,
    head_window: usize,
) -> Result<Vec<SeriesPoint>, IndexError> {
    if points.is_empty() {
        return Err(IndexError::EmptySeries {
            series: "merged".to_string(),
        });
    }
    let mut head: Vec<f64> = points
        .iter()
        .map(|p| p.level)
        .filter(|&l| usable(l))
        .take(head_window.max(1))
        .collect();

    match median(&mut head) {
        Some(m) if usable(m) => Ok(scaled(points, base_value / m)),
        _ => {
            tracing::warn!("no valid head levels, series left unscaled");
            Ok(points.to_vec())
        }
    }
}

/// Rescales so the level at `base_date` equals `base_value`. Uses the exact
/// date if present, else the first later date, else the last earlier one.
pub fn rebase_at(
    points: &[SeriesPoint],
    base_date: NaiveDate,
    base_value: f64,
) -> Result<Vec<SeriesPoint>, IndexError> {
    let points = sorted(points);
    let reference = points
        .iter()
        .find(|p| p.date >= base_date)
        .or_else(|| points.last())
        .ok_or_else(|| IndexError::EmptySeries {
            series: "rebase input".to_string(),
        })?;

    if !usable(reference.level) {
        tracing::warn!(date = %reference.date, "reference level unusable, series left unscaled");
        return Ok(points);
    }
    if reference.date != base_date {
        tracing::info!(requested = %base_date, used = %reference.date, "rebase date not in series");
    }
    Ok(scaled(&points, base_value / reference.level))
}

fn scaled(points: &[SeriesPoint], factor: f64) -> Vec<SeriesPoint> {
    points
        .iter()
        .map(|p| SeriesPoint::new(p.date, p.level * factor))
        .collect()
}

/// Level-to-level returns; the first point has none.
pub fn daily_returns(points: &[SeriesPoint]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(points.len());
    let mut previous: Option<f64> = None;
    for p in points {
        out.push(match previous {
            Some(prev) if prev != 0.0 => Some(p.level / prev - 1.0),
            _ => None,
        });
        previous = Some(p.level);
    }
    out
}

//! Index aggregation: anchor weights × daily returns, compounded into a
//! level series.

use crate::domain::asset::{DailyData, OverrideTable};
use crate::domain::asset_filter::{filter_universe, ExclusionSets};
use crate::domain::error::IndexError;
use crate::domain::rebalance::{period_label, AnchorMap, RebalanceFrequency};
use crate::domain::returns::{ReturnCalculator, ReturnVector};
use crate::domain::weights::{SizingSource, WeightBuild, WeightBuilder, WeightVector};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_BASE_VALUE: f64 = 100.0;

/// How weights of unpriced constituents are treated on a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingReturnPolicy {
    /// Unpriced constituents keep their weight and contribute nothing.
    #[default]
    Zero,
    /// Weights are rescaled over priced constituents only.
    Renormalize,
}

impl FromStr for MissingReturnPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "zero" => Ok(MissingReturnPolicy::Zero),
            "renormalize" => Ok(MissingReturnPolicy::Renormalize),
            other => Err(format!(
                "unknown missing-return policy '{}' (expected zero or renormalize)",
                other
            )),
        }
    }
}

impl fmt::Display for MissingReturnPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingReturnPolicy::Zero => write!(f, "zero"),
            MissingReturnPolicy::Renormalize => write!(f, "renormalize"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexConfig {
    /// Defaults to the first date in the calendar.
    pub base_date: Option<NaiveDate>,
    pub base_value: f64,
    pub frequency: RebalanceFrequency,
    pub missing_returns: MissingReturnPolicy,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            base_date: None,
            base_value: DEFAULT_BASE_VALUE,
            frequency: RebalanceFrequency::Quarterly,
            missing_returns: MissingReturnPolicy::Zero,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexPoint {
    pub date: NaiveDate,
    pub level: f64,
    pub daily_return: f64,
    /// Symbols with positive weight on this date.
    pub constituents: usize,
    /// Constituents with a real return on this date.
    pub priced: usize,
}

/// Weights governing one rebalancing period.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstituentSnapshot {
    pub anchor: NaiveDate,
    pub label: String,
    /// Descending by weight.
    pub weights: Vec<(String, f64)>,
    pub source: SizingSource,
    pub converged: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Contribution {
    pub symbol: String,
    /// Weight actually applied on the day (after any renormalization).
    pub weight: f64,
    pub asset_return: f64,
    pub priced: bool,
}

impl Contribution {
    pub fn value(&self) -> f64 {
        self.weight * self.asset_return
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyContribution {
    pub date: NaiveDate,
    pub entries: Vec<Contribution>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexRun {
    pub base_date: NaiveDate,
    pub points: Vec<IndexPoint>,
    pub snapshots: Vec<ConstituentSnapshot>,
    pub contributions: Vec<DailyContribution>,
    pub flagged_returns: usize,
    pub unconverged_anchors: Vec<NaiveDate>,
}

impl IndexRun {
    pub fn latest(&self) -> Option<&IndexPoint> {
        self.points.last()
    }
}

/// Per-symbol contributions for one day. Sums to the day's portfolio return.
/// Nothing priced means every contribution is zero.
pub fn attribute(
    weights: &WeightVector,
    returns: &ReturnVector,
    policy: MissingReturnPolicy,
) -> Vec<Contribution> {
    let priced_weight: f64 = weights
        .iter()
        .filter(|(s, _)| returns.is_priced(s))
        .map(|(_, w)| w)
        .sum();

    weights
        .iter()
        .map(|(symbol, weight)| {
            let priced = returns.is_priced(symbol);
            let applied = match policy {
                MissingReturnPolicy::Zero => weight,
                MissingReturnPolicy::Renormalize if priced && priced_weight > 0.0 => {
                    weight / priced_weight
                }
                MissingReturnPolicy::Renormalize => 0.0,
            };
            Contribution {
                symbol: symbol.to_string(),
                weight: applied,
                asset_return: if priced { returns.value(symbol) } else { 0.0 },
                priced,
            }
        })
        .collect()
}

pub fn portfolio_return(
    weights: &WeightVector,
    returns: &ReturnVector,
    policy: MissingReturnPolicy,
) -> f64 {
    attribute(weights, returns, policy)
        .iter()
        .map(Contribution::value)
        .sum()
}

/// Index of the base date in `dates` (ascending): exact match, else the
/// first later date, else the last date.
pub fn resolve_base_index(dates: &[NaiveDate], base_date: Option<NaiveDate>) -> usize {
    let Some(base) = base_date else {
        return 0;
    };
    match dates.binary_search(&base) {
        Ok(i) => i,
        Err(i) if i < dates.len() => i,
        Err(_) => dates.len().saturating_sub(1),
    }
}

/// Levels such that `levels[base] == base_value` exactly and
/// `levels[i] == levels[i - 1] * (1 + returns[i])` for every `i >= 1`.
pub fn chain_levels(returns: &[f64], base: usize, base_value: f64) -> Vec<f64> {
    let mut levels = vec![0.0; returns.len()];
    if returns.is_empty() {
        return levels;
    }
    levels[base] = base_value;
    for i in base + 1..returns.len() {
        levels[i] = levels[i - 1] * (1.0 + returns[i]);
    }
    for i in (0..base).rev() {
        let growth = 1.0 + returns[i + 1];
        levels[i] = if growth != 0.0 {
            levels[i + 1] / growth
        } else {
            0.0
        };
    }
    levels
}

pub struct IndexEngine<'a> {
    config: &'a IndexConfig,
    exclusions: &'a ExclusionSets,
    overrides: &'a OverrideTable,
    weights: WeightBuilder<'a>,
    returns: ReturnCalculator<'a>,
}

impl<'a> IndexEngine<'a> {
    pub fn new(
        config: &'a IndexConfig,
        exclusions: &'a ExclusionSets,
        overrides: &'a OverrideTable,
        weights: WeightBuilder<'a>,
        returns: ReturnCalculator<'a>,
    ) -> Self {
        Self {
            config,
            exclusions,
            overrides,
            weights,
            returns,
        }
    }

    /// Single forward pass over `days`. Weights are built once per anchor
    /// date and reused for every date in its period.
    pub fn run(&self, days: &[DailyData]) -> Result<IndexRun, IndexError> {
        let mut ordered: Vec<&DailyData> = days.iter().collect();
        ordered.sort_by_key(|d| d.date);
        ordered.dedup_by_key(|d| d.date);
        if ordered.is_empty() {
            return Err(IndexError::NoDailyData {
                location: "input".to_string(),
            });
        }

        let dates: Vec<NaiveDate> = ordered.iter().map(|d| d.date).collect();
        let anchors = AnchorMap::build(&dates, self.config.frequency);
        let by_date: HashMap<NaiveDate, &DailyData> =
            ordered.iter().map(|d| (d.date, *d)).collect();

        let mut cache: HashMap<NaiveDate, WeightBuild> = HashMap::new();
        let mut snapshots = Vec::new();
        let mut unconverged_anchors = Vec::new();
        let mut contributions = Vec::with_capacity(ordered.len());
        let mut daily_returns = Vec::with_capacity(ordered.len());
        let mut counts = Vec::with_capacity(ordered.len());
        let mut flagged_returns = 0;

        for &day in &ordered {
            let anchor = anchors.anchor(day.date).unwrap_or(day.date);
            if !cache.contains_key(&anchor) {
                let anchor_day = by_date.get(&anchor).copied().unwrap_or(day);
                let build = self.build_weights(anchor_day);
                if !build.converged {
                    unconverged_anchors.push(anchor);
                }
                snapshots.push(ConstituentSnapshot {
                    anchor,
                    label: period_label(anchor, self.config.frequency),
                    weights: build.vector.ranked(),
                    source: build.source,
                    converged: build.converged,
                });
                cache.insert(anchor, build);
            }
            let Some(build) = cache.get(&anchor) else {
                continue;
            };

            let returns = self.returns.compute(day, build.vector.symbols());
            let entries = attribute(&build.vector, &returns, self.config.missing_returns);
            let daily_return: f64 = entries.iter().map(Contribution::value).sum();
            if !build.vector.is_empty() && returns.priced_count() == 0 {
                tracing::warn!(date = %day.date, "no constituent priced, index held flat");
            }

            flagged_returns += returns.flagged_count();
            daily_returns.push(daily_return);
            counts.push((build.vector.len(), returns.priced_count()));
            contributions.push(DailyContribution {
                date: day.date,
                entries,
            });
        }

        let base = resolve_base_index(&dates, self.config.base_date);
        match self.config.base_date {
            Some(requested) if requested != dates[base] => {
                tracing::info!(%requested, resolved = %dates[base], "base date not in calendar");
            }
            _ => {}
        }
        let levels = chain_levels(&daily_returns, base, self.config.base_value);

        let points: Vec<IndexPoint> = dates
            .iter()
            .zip(levels)
            .zip(daily_returns)
            .zip(counts)
            .map(|(((&date, level), daily_return), (constituents, priced))| IndexPoint {
                date,
                level,
                daily_return,
                constituents,
                priced,
            })
            .collect();

        tracing::info!(
            dates = points.len(),
            anchors = snapshots.len(),
            flagged_returns,
            "index run complete"
        );

        Ok(IndexRun {
            base_date: dates[base],
            points,
            snapshots,
            contributions,
            flagged_returns,
            unconverged_anchors,
        })
    }

    fn build_weights(&self, anchor_day: &DailyData) -> WeightBuild {
        let universe = filter_universe(anchor_day, self.exclusions, self.overrides);
        let build = self.weights.build(&universe);
        if build.vector.is_empty() {
            tracing::warn!(anchor = %anchor_day.date, "no valid weights for period");
        }
        build
    }
}

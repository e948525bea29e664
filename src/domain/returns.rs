//! Per-asset daily returns with a primary/fallback source chain and an
//! outlier guard.

use crate::domain::asset::{DailyData, OverrideTable};
use crate::ports::price_port::PriceSourcePort;
use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_FALLBACK_WINDOW_DAYS: i64 = 5;

/// Plausible range for a single asset's daily return.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReturnBounds {
    pub lower: f64,
    pub upper: f64,
}

impl ReturnBounds {
    pub fn new(lower: f64, upper: f64) -> Result<Self, String> {
        if !(lower.is_finite() && upper.is_finite()) || lower >= upper {
            return Err(format!(
                "return bounds must satisfy lower < upper (got {} and {})",
                lower, upper
            ));
        }
        Ok(Self { lower, upper })
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// What happens to a return outside [`ReturnBounds`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutlierPolicy {
    #[default]
    Clip,
    /// Treat the asset as unpriced for the day.
    Discard,
}

impl FromStr for OutlierPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "clip" => Ok(OutlierPolicy::Clip),
            "discard" => Ok(OutlierPolicy::Discard),
            other => Err(format!("unknown outlier policy '{}'", other)),
        }
    }
}

impl fmt::Display for OutlierPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutlierPolicy::Clip => write!(f, "clip"),
            OutlierPolicy::Discard => write!(f, "discard"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnSource {
    PriceRatio,
    PercentChange,
    Fallback,
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssetReturn {
    pub value: f64,
    pub source: ReturnSource,
    /// Raw value fell outside the configured bounds.
    pub flagged: bool,
}

impl AssetReturn {
    pub fn missing() -> Self {
        Self {
            value: 0.0,
            source: ReturnSource::Missing,
            flagged: false,
        }
    }

    pub fn is_priced(&self) -> bool {
        self.source != ReturnSource::Missing
    }
}

/// Symbol → return for one date. Unpriced symbols are present with a zero
/// value and [`ReturnSource::Missing`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnVector {
    pub date: NaiveDate,
    returns: BTreeMap<String, AssetReturn>,
}

impl ReturnVector {
    pub fn new(date: NaiveDate, returns: BTreeMap<String, AssetReturn>) -> Self {
        Self { date, returns }
    }

    pub fn get(&self, symbol: &str) -> Option<&AssetReturn> {
        self.returns.get(symbol)
    }

    /// Zero for unknown or unpriced symbols.
    pub fn value(&self, symbol: &str) -> f64 {
        self.get(symbol).map(|r| r.value).unwrap_or(0.0)
    }

    pub fn is_priced(&self, symbol: &str) -> bool {
        self.get(symbol).is_some_and(|r| r.is_priced())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AssetReturn)> {
        self.returns.iter().map(|(s, r)| (s.as_str(), r))
    }

    pub fn priced_count(&self) -> usize {
        self.returns.values().filter(|r| r.is_priced()).count()
    }

    pub fn flagged_count(&self) -> usize {
        self.returns.values().filter(|r| r.flagged).count()
    }

    pub fn len(&self) -> usize {
        self.returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnConfig {
    pub bounds: Option<ReturnBounds>,
    pub outliers: OutlierPolicy,
    pub fallback_window_days: i64,
}

impl Default for ReturnConfig {
    fn default() -> Self {
        Self {
            bounds: None,
            outliers: OutlierPolicy::Clip,
            fallback_window_days: DEFAULT_FALLBACK_WINDOW_DAYS,
        }
    }
}

impl ReturnConfig {
    /// Applies the outlier guard to a raw return.
    pub fn guard(&self, value: f64, source: ReturnSource) -> AssetReturn {
        let Some(bounds) = self.bounds else {
            return AssetReturn {
                value,
                source,
                flagged: false,
            };
        };
        if bounds.contains(value) {
            return AssetReturn {
                value,
                source,
                flagged: false,
            };
        }
        match self.outliers {
            OutlierPolicy::Clip => AssetReturn {
                value: value.clamp(bounds.lower, bounds.upper),
                source,
                flagged: true,
            },
            OutlierPolicy::Discard => AssetReturn {
                flagged: true,
                ..AssetReturn::missing()
            },
        }
    }
}

pub(crate) fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Factor that converts the day's `price_change_pct` column to a fraction.
/// The column is taken to be in percent when its median magnitude exceeds 1.
pub fn percent_scale(day: &DailyData) -> f64 {
    let mut magnitudes: Vec<f64> = day
        .rows
        .iter()
        .filter_map(|r| r.price_change_pct)
        .filter(|v| v.is_finite())
        .map(f64::abs)
        .collect();
    match median(&mut magnitudes) {
        Some(m) if m > 1.0 => 0.01,
        _ => 1.0,
    }
}

/// Last close-to-close return from an ascending close series.
pub fn last_close_return(closes: &[(NaiveDate, f64)]) -> Option<f64> {
    let [.., (_, prev), (_, last)] = closes else {
        return None;
    };
    if *prev == 0.0 {
        return None;
    }
    let r = last / prev - 1.0;
    r.is_finite().then_some(r)
}

pub struct ReturnCalculator<'a> {
    config: &'a ReturnConfig,
    overrides: &'a OverrideTable,
    fallback: Option<&'a dyn PriceSourcePort>,
}

impl<'a> ReturnCalculator<'a> {
    pub fn new(
        config: &'a ReturnConfig,
        overrides: &'a OverrideTable,
        fallback: Option<&'a dyn PriceSourcePort>,
    ) -> Self {
        Self {
            config,
            overrides,
            fallback,
        }
    }

    /// Returns for `symbols` on `day`: price ratio, then percent change,
    /// then the fallback price source, else missing.
    pub fn compute<'s>(
        &self,
        day: &DailyData,
        symbols: impl IntoIterator<Item = &'s str>,
    ) -> ReturnVector {
        let scale = percent_scale(day);
        let mut returns = BTreeMap::new();

        for symbol in symbols {
            let row = day.row(symbol);
            let primary = row.and_then(|r| {
                r.price_ratio_return()
                    .map(|v| (v, ReturnSource::PriceRatio))
                    .or_else(|| {
                        r.price_change_pct
                            .filter(|v| v.is_finite())
                            .map(|v| (v * scale, ReturnSource::PercentChange))
                    })
            });

            let raw = primary.or_else(|| {
                self.fallback_return(symbol, day.date)
                    .map(|v| (v, ReturnSource::Fallback))
            });

            let asset_return = match raw {
                Some((value, source)) => {
                    let guarded = self.config.guard(value, source);
                    if guarded.flagged {
                        tracing::debug!(date = %day.date, symbol, value, "return outside bounds");
                    }
                    guarded
                }
                None => {
                    tracing::debug!(date = %day.date, symbol, "no return source, zero contribution");
                    AssetReturn::missing()
                }
            };
            returns.insert(symbol.to_string(), asset_return);
        }

        ReturnVector::new(day.date, returns)
    }

    fn fallback_return(&self, symbol: &str, date: NaiveDate) -> Option<f64> {
        let source = self.fallback?;
        let ticker = self.overrides.price_ticker(symbol);
        let start = date - Duration::days(self.config.fallback_window_days);
        match source.closes(&ticker, start, date) {
            Ok(mut closes) => {
                closes.sort_by_key(|(d, _)| *d);
                last_close_return(&closes)
            }
            Err(e) => {
                tracing::warn!(%date, symbol, %ticker, "fallback price source failed: {e}");
                None
            }
        }
    }
}

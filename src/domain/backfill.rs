//! Historical index for today's basket, built from close-price histories.

use crate::domain::asset::OverrideTable;
use crate::domain::error::IndexError;
use crate::domain::index::{attribute, Contribution, IndexPoint, MissingReturnPolicy, DEFAULT_BASE_VALUE};
use crate::domain::returns::{
    AssetReturn, OutlierPolicy, ReturnBounds, ReturnConfig, ReturnSource, ReturnVector,
};
use crate::domain::weights::WeightVector;
use crate::ports::price_port::PriceSourcePort;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

/// Guard applied to close-to-close returns when no bounds are configured.
pub const DEFAULT_BACKFILL_BOUNDS: ReturnBounds = ReturnBounds {
    lower: -0.95,
    upper: 3.0,
};

#[derive(Debug, Clone, PartialEq)]
pub struct BackfillConfig {
    pub returns: ReturnConfig,
    pub base_value: f64,
}

impl BackfillConfig {
    /// Unbounded return settings fall back to `DEFAULT_BACKFILL_BOUNDS`
    /// with out-of-range returns discarded.
    pub fn new(returns: &ReturnConfig, base_value: f64) -> Self {
        let returns = match returns.bounds {
            Some(_) => returns.clone(),
            None => ReturnConfig {
                bounds: Some(DEFAULT_BACKFILL_BOUNDS),
                outliers: OutlierPolicy::Discard,
                ..returns.clone()
            },
        };
        Self { returns, base_value }
    }
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self::new(&ReturnConfig::default(), DEFAULT_BASE_VALUE)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackfillRun {
    pub points: Vec<IndexPoint>,
    pub flagged_returns: usize,
    /// Weighted symbols with no usable history in the window.
    pub unpriced_symbols: Vec<String>,
}

/// Close-to-close returns keyed by date; the first close has no return.
fn close_returns(closes: &[(NaiveDate, f64)]) -> BTreeMap<NaiveDate, f64> {
    closes
        .windows(2)
        .filter_map(|pair| {
            let (_, prev) = pair[0];
            let (date, close) = pair[1];
            let r = close / prev - 1.0;
            (prev != 0.0 && r.is_finite()).then_some((date, r))
        })
        .collect()
}

/// Holds `weights` fixed over `[start, end]` and compounds the weighted
/// close-to-close returns, renormalizing over symbols priced each day.
/// The first date in the window sits at `base_value`.
pub fn backfill_current_basket(
    weights: &WeightVector,
    prices: &dyn PriceSourcePort,
    overrides: &OverrideTable,
    start: NaiveDate,
    end: NaiveDate,
    config: &BackfillConfig,
) -> Result<BackfillRun, IndexError> {
    let mut returns_by_symbol: BTreeMap<String, BTreeMap<NaiveDate, f64>> = BTreeMap::new();
    let mut calendar: BTreeSet<NaiveDate> = BTreeSet::new();
    let mut unpriced_symbols = Vec::new();

    for symbol in weights.symbols() {
        let ticker = overrides.price_ticker(symbol);
        let mut closes = match prices.closes(&ticker, start, end) {
            Ok(closes) => closes,
            Err(e) => {
                tracing::warn!(symbol, %ticker, "no price history: {e}");
                Vec::new()
            }
        };
        closes.retain(|(d, c)| *d >= start && *d <= end && c.is_finite());
        closes.sort_by_key(|(d, _)| *d);
        closes.dedup_by_key(|(d, _)| *d);

        if closes.is_empty() {
            unpriced_symbols.push(symbol.to_string());
            continue;
        }
        calendar.extend(closes.iter().map(|(d, _)| *d));
        returns_by_symbol.insert(symbol.to_string(), close_returns(&closes));
    }

    if calendar.is_empty() {
        return Err(IndexError::EmptySeries {
            series: "backfill".to_string(),
        });
    }
    tracing::info!(
        dates = calendar.len(),
        symbols = returns_by_symbol.len(),
        unpriced = unpriced_symbols.len(),
        "backfilling current basket"
    );

    let mut points = Vec::with_capacity(calendar.len());
    let mut flagged_returns = 0;
    let mut level = config.base_value;

    for (i, &date) in calendar.iter().enumerate() {
        let day: BTreeMap<String, AssetReturn> = weights
            .symbols()
            .map(|symbol| {
                let r = returns_by_symbol
                    .get(symbol)
                    .and_then(|rets| rets.get(&date))
                    .map(|&v| config.returns.guard(v, ReturnSource::PriceRatio))
                    .unwrap_or_else(AssetReturn::missing);
                (symbol.to_string(), r)
            })
            .collect();
        let returns = ReturnVector::new(date, day);
        flagged_returns += returns.flagged_count();

        let daily_return: f64 = attribute(weights, &returns, MissingReturnPolicy::Renormalize)
            .iter()
            .map(Contribution::value)
            .sum();
        if i > 0 {
            level *= 1.0 + daily_return;
        }
        points.push(IndexPoint {
            date,
            level,
            daily_return,
            constituents: weights.len(),
            priced: returns.priced_count(),
        });
    }

    Ok(BackfillRun {
        points,
        flagged_returns,
        unpriced_symbols,
    })
}

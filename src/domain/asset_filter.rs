//! Universe filtering: stablecoins, wrapped/derivative tokens and
//! explicitly excluded symbols are removed before weighting.

use crate::domain::asset::{AssetRow, DailyData, OverrideTable};
use chrono::NaiveDate;
use std::collections::HashSet;

pub const STABLECOINS: &[&str] = &[
    "USDT", "USDC", "DAI", "FDUSD", "TUSD", "USDE", "USDP", "USDL", "USDS",
];

pub const DERIVATIVES: &[&str] = &[
    "WBTC", "WETH", "WBETH", "WEETH", "STETH", "WSTETH", "RETH", "CBETH", "RENBTC", "HBTC",
    "TBTC",
];

pub const EXCHANGE_TOKENS: &[&str] = &["LEO", "WBT"];

#[derive(Debug, Clone, PartialEq)]
pub struct ExclusionSets {
    symbols: HashSet<String>,
}

impl Default for ExclusionSets {
    fn default() -> Self {
        Self::new(false)
    }
}

impl ExclusionSets {
    pub fn new(exclude_exchange_tokens: bool) -> Self {
        let mut symbols: HashSet<String> = STABLECOINS
            .iter()
            .chain(DERIVATIVES)
            .map(|s| s.to_string())
            .collect();
        if exclude_exchange_tokens {
            symbols.extend(EXCHANGE_TOKENS.iter().map(|s| s.to_string()));
        }
        Self { symbols }
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains(symbol)
    }

    /// Whether `symbol` survives the exclusion rules. An explicit include
    /// flag wins over the default sets in both directions.
    pub fn admits(&self, symbol: &str, overrides: &OverrideTable) -> bool {
        match overrides.include(symbol) {
            Some(include) => include,
            None => !self.contains(symbol),
        }
    }
}

/// A date's rows after filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct Universe {
    pub date: NaiveDate,
    pub assets: Vec<AssetRow>,
}

impl Universe {
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// True when at least one asset has a positive market cap or weight ratio.
    pub fn has_sizing_signal(&self) -> bool {
        self.assets.iter().any(|a| {
            a.market_cap.is_some_and(|v| v > 0.0) || a.weight_ratio.is_some_and(|v| v > 0.0)
        })
    }
}

pub fn filter_universe(
    day: &DailyData,
    exclusions: &ExclusionSets,
    overrides: &OverrideTable,
) -> Universe {
    let assets: Vec<AssetRow> = day
        .rows
        .iter()
        .filter(|row| exclusions.admits(&row.symbol, overrides))
        .cloned()
        .collect();

    let universe = Universe {
        date: day.date,
        assets,
    };
    if !universe.is_empty() && !universe.has_sizing_signal() {
        tracing::warn!(
            date = %day.date,
            assets = universe.len(),
            "no usable market cap or weight ratio, falling back to equal weights"
        );
    }
    universe
}

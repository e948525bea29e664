//! Per-asset daily rows and the symbol override table.

use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};

/// One asset on one date, as supplied by the daily data collaborator.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AssetRow {
    pub symbol: String,
    pub market_cap: Option<f64>,
    pub weight_ratio: Option<f64>,
    pub current_price: Option<f64>,
    pub previous_price: Option<f64>,
    pub price_change_pct: Option<f64>,
    pub listed_domestic: bool,
}

impl AssetRow {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.trim().to_uppercase(),
            ..Self::default()
        }
    }

    /// Current/previous price ratio return, when both prices are usable.
    pub fn price_ratio_return(&self) -> Option<f64> {
        match (self.current_price, self.previous_price) {
            (Some(cur), Some(prev)) if prev != 0.0 => {
                let r = cur / prev - 1.0;
                r.is_finite().then_some(r)
            }
            _ => None,
        }
    }
}

/// All rows sharing one date. Symbols are upper-case and unique.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyData {
    pub date: NaiveDate,
    pub rows: Vec<AssetRow>,
}

impl DailyData {
    /// Normalizes symbols to upper case and keeps the first row per symbol.
    pub fn new(date: NaiveDate, rows: Vec<AssetRow>) -> Self {
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(rows.len());
        for mut row in rows {
            row.symbol = row.symbol.trim().to_uppercase();
            if row.symbol.is_empty() {
                continue;
            }
            if !seen.insert(row.symbol.clone()) {
                tracing::debug!(%date, symbol = %row.symbol, "duplicate symbol row ignored");
                continue;
            }
            unique.push(row);
        }
        Self { date, rows: unique }
    }

    pub fn row(&self, symbol: &str) -> Option<&AssetRow> {
        self.rows.iter().find(|r| r.symbol == symbol)
    }
}

/// Per-symbol overrides loaded from the optional mapping file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SymbolOverride {
    pub symbol: String,
    pub price_ticker: Option<String>,
    pub listed_domestic: bool,
    /// `None` when the table leaves the include column blank.
    pub include: Option<bool>,
    pub cap_override: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct OverrideTable {
    entries: HashMap<String, SymbolOverride>,
}

impl OverrideTable {
    pub fn new(entries: Vec<SymbolOverride>) -> Self {
        let entries = entries
            .into_iter()
            .map(|mut o| {
                o.symbol = o.symbol.trim().to_uppercase();
                (o.symbol.clone(), o)
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolOverride> {
        self.entries.get(symbol)
    }

    pub fn include(&self, symbol: &str) -> Option<bool> {
        self.get(symbol).and_then(|o| o.include)
    }

    pub fn listed_domestic(&self, symbol: &str) -> bool {
        self.get(symbol).is_some_and(|o| o.listed_domestic)
    }

    pub fn cap_overrides(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries
            .values()
            .filter_map(|o| o.cap_override.map(|c| (o.symbol.as_str(), c)))
    }

    /// Ticker used for price lookups; `<SYMBOL>-USD` unless overridden.
    pub fn price_ticker(&self, symbol: &str) -> String {
        self.get(symbol)
            .and_then(|o| o.price_ticker.clone())
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| format!("{}-USD", symbol))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

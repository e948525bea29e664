#![allow(dead_code)]

use bm20::domain::asset::{AssetRow, DailyData};
use bm20::domain::config_validation::{DataPaths, Settings};
use bm20::domain::continuity::{MergeConfig, SeriesPoint};
use bm20::domain::error::IndexError;
use bm20::domain::index::{ConstituentSnapshot, IndexConfig, IndexPoint};
use bm20::domain::returns::ReturnConfig;
use bm20::domain::summary::{ContributionReport, SeriesSummary};
use bm20::domain::weights::WeightConfig;
use bm20::ports::daily_data_port::DailyDataPort;
use bm20::ports::listing_port::ListingPort;
use bm20::ports::price_port::PriceSourcePort;
use bm20::ports::report_port::ReportPort;
use chrono::NaiveDate;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Row sized by market cap with a current/previous price pair.
pub fn cap_row(symbol: &str, market_cap: f64, current: f64, previous: f64) -> AssetRow {
    AssetRow {
        market_cap: Some(market_cap),
        current_price: Some(current),
        previous_price: Some(previous),
        ..AssetRow::new(symbol)
    }
}

/// Row sized by market cap with no price information at all.
pub fn unpriced_row(symbol: &str, market_cap: f64) -> AssetRow {
    AssetRow {
        market_cap: Some(market_cap),
        ..AssetRow::new(symbol)
    }
}

pub struct MockDailyData {
    pub days: Vec<DailyData>,
}

impl MockDailyData {
    pub fn new() -> Self {
        Self { days: Vec::new() }
    }

    pub fn with_day(mut self, date: NaiveDate, rows: Vec<AssetRow>) -> Self {
        self.days.push(DailyData::new(date, rows));
        self
    }
}

impl DailyDataPort for MockDailyData {
    fn load_days(&self) -> Result<Vec<DailyData>, IndexError> {
        if self.days.is_empty() {
            return Err(IndexError::NoDailyData {
                location: "mock".to_string(),
            });
        }
        let mut days = self.days.clone();
        days.sort_by_key(|d| d.date);
        Ok(days)
    }
}

pub struct MockPriceSource {
    pub closes: HashMap<String, Vec<(NaiveDate, f64)>>,
    pub errors: HashMap<String, String>,
    pub requests: RefCell<Vec<String>>,
}

impl MockPriceSource {
    pub fn new() -> Self {
        Self {
            closes: HashMap::new(),
            errors: HashMap::new(),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn with_closes(mut self, ticker: &str, closes: Vec<(NaiveDate, f64)>) -> Self {
        self.closes.insert(ticker.to_string(), closes);
        self
    }

    pub fn with_error(mut self, ticker: &str, reason: &str) -> Self {
        self.errors.insert(ticker.to_string(), reason.to_string());
        self
    }
}

impl PriceSourcePort for MockPriceSource {
    fn closes(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(NaiveDate, f64)>, IndexError> {
        self.requests.borrow_mut().push(ticker.to_string());
        if let Some(reason) = self.errors.get(ticker) {
            return Err(IndexError::PriceSource {
                ticker: ticker.to_string(),
                reason: reason.clone(),
            });
        }
        Ok(self
            .closes
            .get(ticker)
            .map(|c| {
                c.iter()
                    .filter(|(d, _)| *d >= start && *d <= end)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }
}

pub struct StaticListings(pub HashSet<String>);

impl StaticListings {
    pub fn of(symbols: &[&str]) -> Self {
        Self(symbols.iter().map(|s| s.to_string()).collect())
    }
}

impl ListingPort for StaticListings {
    fn is_domestically_listed(&self, symbol: &str) -> bool {
        self.0.contains(symbol)
    }
}

/// Records everything written through the report port.
#[derive(Default)]
pub struct MockReport {
    pub index: RefCell<Vec<IndexPoint>>,
    pub snapshots: RefCell<Vec<ConstituentSnapshot>>,
    pub series: RefCell<HashMap<String, Vec<SeriesPoint>>>,
    pub summaries: RefCell<Vec<(SeriesSummary, Option<ContributionReport>)>>,
}

impl ReportPort for MockReport {
    fn write_index(&self, points: &[IndexPoint]) -> Result<(), IndexError> {
        *self.index.borrow_mut() = points.to_vec();
        Ok(())
    }

    fn write_constituents(&self, snapshot: &ConstituentSnapshot) -> Result<(), IndexError> {
        self.snapshots.borrow_mut().push(snapshot.clone());
        Ok(())
    }

    fn write_series(&self, name: &str, points: &[SeriesPoint]) -> Result<(), IndexError> {
        self.series
            .borrow_mut()
            .insert(name.to_string(), points.to_vec());
        Ok(())
    }

    fn write_summary(
        &self,
        summary: &SeriesSummary,
        contributions: Option<&ContributionReport>,
    ) -> Result<(), IndexError> {
        self.summaries
            .borrow_mut()
            .push((summary.clone(), contributions.cloned()));
        Ok(())
    }
}

/// Settings with every default, no caps and an in-memory archive path.
pub fn uncapped_settings() -> Settings {
    Settings {
        data: DataPaths {
            archive: "mock".to_string(),
            overrides: None,
            prices: None,
            listings: None,
            output: "out".to_string(),
        },
        index: IndexConfig::default(),
        weights: WeightConfig {
            caps: HashMap::new(),
            ..WeightConfig::default()
        },
        returns: ReturnConfig::default(),
        merge: MergeConfig::default(),
        exclude_exchange_tokens: false,
        dump_constituents: true,
    }
}

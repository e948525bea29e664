//! Rebalancing calendar: maps every trading date to the anchor date whose
//! weights are carried forward through its period.

use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RebalanceFrequency {
    Daily,
    Monthly,
    /// Calendar quarters ending March, June, September, December.
    #[default]
    Quarterly,
}

impl FromStr for RebalanceFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(RebalanceFrequency::Daily),
            "monthly" => Ok(RebalanceFrequency::Monthly),
            "quarterly" => Ok(RebalanceFrequency::Quarterly),
            other => Err(format!(
                "unknown rebalance frequency '{}' (expected daily, monthly or quarterly)",
                other
            )),
        }
    }
}

impl fmt::Display for RebalanceFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RebalanceFrequency::Daily => "daily",
            RebalanceFrequency::Monthly => "monthly",
            RebalanceFrequency::Quarterly => "quarterly",
        };
        write!(f, "{}", name)
    }
}

fn quarter(date: NaiveDate) -> u32 {
    (date.month() - 1) / 3 + 1
}

/// Label used to name constituent snapshots for the period starting at `anchor`.
pub fn period_label(anchor: NaiveDate, frequency: RebalanceFrequency) -> String {
    match frequency {
        RebalanceFrequency::Daily => anchor.format("%Y-%m-%d").to_string(),
        RebalanceFrequency::Monthly => anchor.format("%Y-%m").to_string(),
        RebalanceFrequency::Quarterly => format!("{}Q{}", anchor.year(), quarter(anchor)),
    }
}

/// Date → anchor date for one run's calendar.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorMap {
    frequency: RebalanceFrequency,
    anchors: BTreeMap<NaiveDate, NaiveDate>,
}

impl AnchorMap {
    /// Anchors are the first date of each period present in `dates`.
    /// Input order and duplicates do not matter.
    pub fn build(dates: &[NaiveDate], frequency: RebalanceFrequency) -> Self {
        let mut sorted = dates.to_vec();
        sorted.sort();
        sorted.dedup();

        let anchors = match frequency {
            RebalanceFrequency::Daily => sorted.iter().map(|&d| (d, d)).collect(),
            RebalanceFrequency::Monthly => assign_period_starts(&sorted, |d| (d.year(), d.month())),
            RebalanceFrequency::Quarterly => assign_period_starts(&sorted, |d| (d.year(), quarter(*d))),
        };

        Self { frequency, anchors }
    }

    pub fn frequency(&self) -> RebalanceFrequency {
        self.frequency
    }

    pub fn anchor(&self, date: NaiveDate) -> Option<NaiveDate> {
        self.anchors.get(&date).copied()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.anchors.keys().copied()
    }

    /// Distinct anchor dates, ascending.
    pub fn anchor_dates(&self) -> Vec<NaiveDate> {
        let mut anchors: Vec<NaiveDate> = self.anchors.values().copied().collect();
        anchors.dedup();
        anchors
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

fn assign_period_starts<T: PartialEq>(
    sorted: &[NaiveDate],
    period_of: impl Fn(&NaiveDate) -> T,
) -> BTreeMap<NaiveDate, NaiveDate> {
    let mut anchors = BTreeMap::new();
    let mut current: Option<(T, NaiveDate)> = None;

    for date in sorted {
        let period = period_of(date);
        let same_period = matches!(&current, Some((p, _)) if *p == period);
        if !same_period {
            current = Some((period, *date));
        }
        if let Some((_, start)) = &current {
            anchors.insert(*date, *start);
        }
    }
    anchors
}

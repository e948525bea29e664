//! Configuration validation.
//!
//! Reads every recognized key once, validates it, and returns typed
//! settings for a run.

use crate::domain::continuity::{DEFAULT_HEAD_WINDOW, MergeConfig};
use crate::domain::error::IndexError;
use crate::domain::index::{DEFAULT_BASE_VALUE, IndexConfig, MissingReturnPolicy};
use crate::domain::rebalance::RebalanceFrequency;
use crate::domain::returns::{DEFAULT_FALLBACK_WINDOW_DAYS, OutlierPolicy, ReturnBounds, ReturnConfig};
use crate::domain::weights::{
    DEFAULT_LISTING_BONUS, DEFAULT_MAX_ITERATIONS, WeightConfig, WeightScheme, default_caps,
};
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::str::FromStr;

pub const DEFAULT_OUTPUT_DIR: &str = "out";

#[derive(Debug, Clone, PartialEq)]
pub struct DataPaths {
    pub archive: String,
    pub overrides: Option<String>,
    pub prices: Option<String>,
    pub listings: Option<String>,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub data: DataPaths,
    pub index: IndexConfig,
    pub weights: WeightConfig,
    pub returns: ReturnConfig,
    pub merge: MergeConfig,
    pub exclude_exchange_tokens: bool,
    pub dump_constituents: bool,
}

const RECOGNIZED_KEYS: &[(&str, &[&str])] = &[
    ("data", &["archive", "overrides", "prices", "listings", "output"]),
    (
        "index",
        &["base_date", "base_value", "rebalance", "missing_returns", "weights_source", "dump_constituents"],
    ),
    ("weights", &["listing_bonus", "caps", "max_iterations", "exclude_exchange_tokens"]),
    ("returns", &["min", "max", "outliers", "fallback_window_days"]),
    ("merge", &["base_value", "head_window"]),
];

/// `section.key` names the validator does not read.
pub fn unknown_keys(config: &dyn ConfigPort) -> Vec<String> {
    RECOGNIZED_KEYS
        .iter()
        .flat_map(|(section, known)| {
            config
                .keys(section)
                .into_iter()
                .filter(|key| !known.contains(&key.as_str()))
                .map(move |key| format!("{}.{}", section, key))
        })
        .collect()
}

pub fn validate_config(config: &dyn ConfigPort) -> Result<Settings, IndexError> {
    for key in unknown_keys(config) {
        tracing::warn!(%key, "unrecognized config key ignored");
    }
    Ok(Settings {
        data: validate_data(config)?,
        index: validate_index(config)?,
        weights: validate_weights(config)?,
        returns: validate_returns(config)?,
        merge: validate_merge(config)?,
        exclude_exchange_tokens: config.get_bool("weights", "exclude_exchange_tokens", false),
        dump_constituents: config.get_bool("index", "dump_constituents", true),
    })
}

fn non_empty(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_key<T>(config: &dyn ConfigPort, section: &str, key: &str, default: T) -> Result<T, IndexError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(config, section, key) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| IndexError::config_invalid(section, key, e.to_string())),
    }
}

fn optional_f64(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<f64>, IndexError> {
    match non_empty(config, section, key) {
        None => Ok(None),
        Some(raw) => match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(IndexError::config_invalid(section, key, format!("{} must be a number", key))),
        },
    }
}

fn positive(config: &dyn ConfigPort, section: &str, key: &str, default: f64) -> Result<f64, IndexError> {
    let value: f64 = parse_key(config, section, key, default)?;
    if !value.is_finite() || value <= 0.0 {
        return Err(IndexError::config_invalid(section, key, format!("{} must be positive", key)));
    }
    Ok(value)
}

fn at_least_one(config: &dyn ConfigPort, section: &str, key: &str, default: usize) -> Result<usize, IndexError> {
    let value: i64 = parse_key(config, section, key, default as i64)?;
    if value < 1 {
        return Err(IndexError::config_invalid(section, key, format!("{} must be at least 1", key)));
    }
    Ok(value as usize)
}

pub fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| format!("invalid date '{}', expected YYYY-MM-DD", value.trim()))
}

/// Parses one `SYMBOL:FRACTION` cap entry.
pub fn parse_cap_entry(entry: &str) -> Result<(String, f64), String> {
    let (symbol, fraction) = entry
        .split_once(':')
        .ok_or_else(|| format!("cap '{}' must look like SYMBOL:FRACTION", entry.trim()))?;
    let symbol = symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(format!("cap '{}' has no symbol", entry.trim()));
    }
    let cap: f64 = fraction
        .trim()
        .parse()
        .map_err(|_| format!("cap for {} is not a number", symbol))?;
    if !(cap > 0.0 && cap <= 1.0) {
        return Err(format!("cap for {} must be in (0, 1]", symbol));
    }
    Ok((symbol, cap))
}

/// Comma-separated cap list. `none` or an empty string means no caps.
pub fn parse_caps(value: &str) -> Result<HashMap<String, f64>, String> {
    if value.trim().eq_ignore_ascii_case("none") {
        return Ok(HashMap::new());
    }
    value
        .split(',')
        .filter(|e| !e.trim().is_empty())
        .map(parse_cap_entry)
        .collect()
}

fn validate_data(config: &dyn ConfigPort) -> Result<DataPaths, IndexError> {
    let archive = non_empty(config, "data", "archive").ok_or_else(|| IndexError::ConfigMissing {
        section: "data".to_string(),
        key: "archive".to_string(),
    })?;
    Ok(DataPaths {
        archive,
        overrides: non_empty(config, "data", "overrides"),
        prices: non_empty(config, "data", "prices"),
        listings: non_empty(config, "data", "listings"),
        output: non_empty(config, "data", "output").unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string()),
    })
}

fn validate_index(config: &dyn ConfigPort) -> Result<IndexConfig, IndexError> {
    let base_date = match non_empty(config, "index", "base_date") {
        None => None,
        Some(raw) => Some(parse_date(&raw).map_err(|e| IndexError::config_invalid("index", "base_date", e))?),
    };
    Ok(IndexConfig {
        base_date,
        base_value: positive(config, "index", "base_value", DEFAULT_BASE_VALUE)?,
        frequency: parse_key(config, "index", "rebalance", RebalanceFrequency::Quarterly)?,
        missing_returns: parse_key(config, "index", "missing_returns", MissingReturnPolicy::Zero)?,
    })
}

fn validate_weights(config: &dyn ConfigPort) -> Result<WeightConfig, IndexError> {
    let caps = match config.get_string("weights", "caps") {
        None => default_caps(),
        Some(raw) => parse_caps(&raw).map_err(|e| IndexError::config_invalid("weights", "caps", e))?,
    };
    Ok(WeightConfig {
        scheme: parse_key(config, "index", "weights_source", WeightScheme::Rules)?,
        listing_bonus: positive(config, "weights", "listing_bonus", DEFAULT_LISTING_BONUS)?,
        caps,
        max_iterations: at_least_one(config, "weights", "max_iterations", DEFAULT_MAX_ITERATIONS)?,
    })
}

fn validate_returns(config: &dyn ConfigPort) -> Result<ReturnConfig, IndexError> {
    let lower = optional_f64(config, "returns", "min")?;
    let upper = optional_f64(config, "returns", "max")?;

    let bounds = match (lower, upper) {
        (None, None) => None,
        (Some(lo), Some(hi)) => {
            if lo <= -1.0 {
                return Err(IndexError::config_invalid("returns", "min", "min must be greater than -1"));
            }
            Some(ReturnBounds::new(lo, hi).map_err(|e| IndexError::config_invalid("returns", "max", e))?)
        }
        (Some(_), None) => {
            return Err(IndexError::config_invalid("returns", "max", "min and max must be set together"));
        }
        (None, Some(_)) => {
            return Err(IndexError::config_invalid("returns", "min", "min and max must be set together"));
        }
    };

    Ok(ReturnConfig {
        bounds,
        outliers: parse_key(config, "returns", "outliers", OutlierPolicy::Clip)?,
        fallback_window_days: at_least_one(
            config,
            "returns",
            "fallback_window_days",
            DEFAULT_FALLBACK_WINDOW_DAYS as usize,
        )? as i64,
    })
}

fn validate_merge(config: &dyn ConfigPort) -> Result<MergeConfig, IndexError> {
    Ok(MergeConfig {
        base_value: positive(config, "merge", "base_value", DEFAULT_BASE_VALUE)?,
        head_window: at_least_one(config, "merge", "head_window", DEFAULT_HEAD_WINDOW)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    fn invalid_key(result: Result<Settings, IndexError>) -> (String, String) {
        match result {
            Err(IndexError::ConfigInvalid { section, key, .. }) => (section, key),
            other => panic!("expected ConfigInvalid, got {:?}", other),
        }
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let settings = validate_config(&make_config("[data]\narchive = archive\n")).unwrap();

        assert_eq!(settings.data.archive, "archive");
        assert_eq!(settings.data.output, "out");
        assert_eq!(settings.data.overrides, None);
        assert_eq!(settings.index, IndexConfig::default());
        assert_eq!(settings.weights, WeightConfig::default());
        assert_eq!(settings.returns, ReturnConfig::default());
        assert_eq!(settings.merge, MergeConfig::default());
        assert!(settings.dump_constituents);
        assert!(!settings.exclude_exchange_tokens);
    }

    #[test]
    fn full_config_parses() {
        let content = r#"
[data]
archive = archive
overrides = overrides.csv
prices = prices
output = build

[index]
rebalance = monthly
base_date = 2024-01-01
base_value = 1000
missing_returns = renormalize
weights_source = supplied
dump_constituents = no

[weights]
listing_bonus = 1.5
caps = BTC:0.25, SOL:0.1
max_iterations = 10
exclude_exchange_tokens = yes

[returns]
min = -0.95
max = 3.0
outliers = discard
fallback_window_days = 7

[merge]
head_window = 3
"#;
        let s = validate_config(&make_config(content)).unwrap();

        assert_eq!(s.data.prices.as_deref(), Some("prices"));
        assert_eq!(s.data.output, "build");
        assert_eq!(s.index.frequency, RebalanceFrequency::Monthly);
        assert_eq!(s.index.base_date, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(s.index.base_value, 1000.0);
        assert_eq!(s.index.missing_returns, MissingReturnPolicy::Renormalize);
        assert_eq!(s.weights.scheme, WeightScheme::Supplied);
        assert_eq!(s.weights.listing_bonus, 1.5);
        assert_eq!(s.weights.caps.get("SOL"), Some(&0.1));
        assert_eq!(s.weights.caps.len(), 2);
        assert_eq!(s.weights.max_iterations, 10);
        assert_eq!(s.returns.bounds, Some(ReturnBounds { lower: -0.95, upper: 3.0 }));
        assert_eq!(s.returns.outliers, OutlierPolicy::Discard);
        assert_eq!(s.returns.fallback_window_days, 7);
        assert_eq!(s.merge.head_window, 3);
        assert!(!s.dump_constituents);
        assert!(s.exclude_exchange_tokens);
    }

    #[test]
    fn missing_archive_fails() {
        let result = validate_config(&make_config("[index]\nrebalance = daily\n"));
        assert!(matches!(result, Err(IndexError::ConfigMissing { ref key, .. }) if key == "archive"));
    }

    #[test]
    fn unknown_rebalance_fails() {
        let result = validate_config(&make_config("[data]\narchive = a\n[index]\nrebalance = weekly\n"));
        assert_eq!(invalid_key(result), ("index".into(), "rebalance".into()));
    }

    #[test]
    fn bad_base_date_fails() {
        let result = validate_config(&make_config("[data]\narchive = a\n[index]\nbase_date = 01/02/2024\n"));
        assert_eq!(invalid_key(result), ("index".into(), "base_date".into()));
    }

    #[test]
    fn non_positive_base_value_fails() {
        let result = validate_config(&make_config("[data]\narchive = a\n[index]\nbase_value = 0\n"));
        assert_eq!(invalid_key(result), ("index".into(), "base_value".into()));
    }

    #[test]
    fn cap_out_of_range_fails() {
        let result = validate_config(&make_config("[data]\narchive = a\n[weights]\ncaps = BTC:1.5\n"));
        assert_eq!(invalid_key(result), ("weights".into(), "caps".into()));
    }

    #[test]
    fn empty_caps_disable_capping() {
        let s = validate_config(&make_config("[data]\narchive = a\n[weights]\ncaps = none\n")).unwrap();
        assert!(s.weights.caps.is_empty());
    }

    #[test]
    fn zero_iterations_fails() {
        let result = validate_config(&make_config("[data]\narchive = a\n[weights]\nmax_iterations = 0\n"));
        assert_eq!(invalid_key(result), ("weights".into(), "max_iterations".into()));
    }

    #[test]
    fn inverted_bounds_fail() {
        let result = validate_config(&make_config("[data]\narchive = a\n[returns]\nmin = 0.5\nmax = 0.1\n"));
        assert_eq!(invalid_key(result), ("returns".into(), "max".into()));
    }

    #[test]
    fn lower_bound_at_total_loss_fails() {
        let result = validate_config(&make_config("[data]\narchive = a\n[returns]\nmin = -1\nmax = 3\n"));
        assert_eq!(invalid_key(result), ("returns".into(), "min".into()));
    }

    #[test]
    fn one_sided_bound_fails() {
        let result = validate_config(&make_config("[data]\narchive = a\n[returns]\nmax = 3\n"));
        assert_eq!(invalid_key(result), ("returns".into(), "min".into()));
    }

    #[test]
    fn cap_entry_parsing() {
        assert_eq!(parse_cap_entry("btc:0.3"), Ok(("BTC".to_string(), 0.3)));
        assert!(parse_cap_entry("BTC").is_err());
        assert!(parse_cap_entry(":0.3").is_err());
        assert!(parse_cap_entry("BTC:abc").is_err());
        assert!(parse_cap_entry("BTC:0").is_err());
    }

    #[test]
    fn unknown_keys_are_reported_not_rejected() {
        let config = make_config("[data]\narchive = a\narchve = b\n\n[merge]\nwindow = 3\n");
        assert_eq!(unknown_keys(&config), vec!["data.archve", "merge.window"]);
        assert!(validate_config(&config).is_ok());
    }
}

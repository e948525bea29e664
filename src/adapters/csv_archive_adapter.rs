//! Daily CSV archive adapter.
//!
//! One file per date, with the date embedded in the file name
//! (`bm20_2024-05-07.csv`, `daily/2024-05-07.csv`, ...).

use crate::domain::asset::{AssetRow, DailyData};
use crate::domain::error::IndexError;
use crate::ports::daily_data_port::DailyDataPort;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub struct CsvArchiveAdapter {
    root: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ArchiveRecord {
    symbol: String,
    #[serde(default, deserialize_with = "lenient_number")]
    market_cap: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    weight_ratio: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    current_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    previous_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    price_change_pct: Option<f64>,
    #[serde(default, deserialize_with = "lenient_flag")]
    listed_kr: Option<bool>,
}

impl From<ArchiveRecord> for AssetRow {
    fn from(r: ArchiveRecord) -> Self {
        AssetRow {
            market_cap: r.market_cap,
            weight_ratio: r.weight_ratio,
            current_price: r.current_price,
            previous_price: r.previous_price,
            price_change_pct: r.price_change_pct,
            listed_domestic: r.listed_kr.unwrap_or(false),
            ..AssetRow::new(&r.symbol)
        }
    }
}

/// Unparseable or non-finite cells read as missing.
pub(crate) fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// `1/true/t/y/yes` and `0/false/f/n/no`; anything else is absent.
pub(crate) fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "y" | "yes" => Some(true),
        "0" | "false" | "f" | "n" | "no" => Some(false),
        _ => None,
    }
}

pub(crate) fn lenient_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let raw: Option<String> = Option::deserialize(d)?;
    Ok(raw.as_deref().and_then(parse_number))
}

pub(crate) fn lenient_flag<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    let raw: Option<String> = Option::deserialize(d)?;
    Ok(raw.as_deref().and_then(parse_flag))
}

/// First `YYYY-MM-DD` found anywhere in `name`.
pub fn date_in_name(name: &str) -> Option<NaiveDate> {
    (0..name.len()).find_map(|i| {
        name.get(i..i + 10)
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
    })
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>, IndexError> {
    let entries = fs::read_dir(dir).map_err(|e| IndexError::DataRead {
        source_name: dir.display().to_string(),
        reason: e.to_string(),
    })?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| IndexError::DataRead {
            source_name: dir.display().to_string(),
            reason: format!("directory entry error: {}", e),
        })?;
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

impl CsvArchiveAdapter {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Dated CSV files in the root and its immediate subdirectories. The
    /// first file per date (by path) wins.
    pub fn dated_files(&self) -> Result<BTreeMap<NaiveDate, PathBuf>, IndexError> {
        let mut candidates = Vec::new();
        for path in read_dir_sorted(&self.root)? {
            if path.is_dir() {
                candidates.extend(read_dir_sorted(&path)?.into_iter().filter(|p| p.is_file()));
            } else {
                candidates.push(path);
            }
        }

        let mut files: BTreeMap<NaiveDate, PathBuf> = BTreeMap::new();
        for path in candidates.into_iter().filter(|p| is_csv(p)) {
            let Some(date) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(date_in_name)
            else {
                continue;
            };
            if let Some(existing) = files.get(&date) {
                tracing::warn!(
                    %date,
                    kept = %existing.display(),
                    ignored = %path.display(),
                    "two archive files for one date"
                );
                continue;
            }
            files.insert(date, path);
        }
        Ok(files)
    }

    pub fn read_day(date: NaiveDate, path: &Path) -> Result<DailyData, IndexError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| IndexError::DataRead {
                source_name: path.display().to_string(),
                reason: e.to_string(),
            })?;

        let mut rows = Vec::new();
        for result in rdr.deserialize::<ArchiveRecord>() {
            let record = result.map_err(|e| IndexError::DataRead {
                source_name: path.display().to_string(),
                reason: format!("CSV parse error: {}", e),
            })?;
            rows.push(AssetRow::from(record));
        }
        Ok(DailyData::new(date, rows))
    }
}

impl DailyDataPort for CsvArchiveAdapter {
    fn load_days(&self) -> Result<Vec<DailyData>, IndexError> {
        let files = self.dated_files()?;
        if files.is_empty() {
            return Err(IndexError::NoDailyData {
                location: self.root.display().to_string(),
            });
        }
        tracing::info!(files = files.len(), root = %self.root.display(), "loading daily archive");

        let mut days = Vec::with_capacity(files.len());
        for (&date, path) in &files {
            match Self::read_day(date, path) {
                Ok(day) => days.push(day),
                Err(e) => tracing::warn!(%date, "skipping unreadable archive file: {e}"),
            }
        }
        if days.is_empty() {
            return Err(IndexError::NoDailyData {
                location: self.root.display().to_string(),
            });
        }
        Ok(days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn setup_archive() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(
            root.join("bm20_2024-01-02.csv"),
            "symbol,market_cap,current_price,previous_price,listed_kr\n\
             btc,800,110,100,yes\n\
             ETH,n/a,20,,0\n\
             BTC,999,1,1,no\n",
        )
        .unwrap();
        fs::create_dir(root.join("2024")).unwrap();
        fs::write(
            root.join("2024").join("2024-01-01.csv"),
            "symbol,weight_ratio,price_change_pct\nSOL,0.5,3.5\n",
        )
        .unwrap();
        fs::write(root.join("notes.csv"), "symbol\nBTC\n").unwrap();
        fs::write(root.join("2024-01-03.txt"), "ignored").unwrap();
        dir
    }

    #[test]
    fn loads_dated_files_in_order() {
        let dir = setup_archive();
        let days = CsvArchiveAdapter::new(dir.path().to_path_buf())
            .load_days()
            .unwrap();

        assert_eq!(days.len(), 2);
        assert_eq!(days[0].date, d(2024, 1, 1));
        assert_eq!(days[1].date, d(2024, 1, 2));
    }

    #[test]
    fn rows_are_normalized() {
        let dir = setup_archive();
        let days = CsvArchiveAdapter::new(dir.path().to_path_buf())
            .load_days()
            .unwrap();

        let jan2 = &days[1];
        assert_eq!(jan2.rows.len(), 2);
        let btc = jan2.row("BTC").unwrap();
        assert_eq!(btc.market_cap, Some(800.0));
        assert!(btc.listed_domestic);
        assert!((btc.price_ratio_return().unwrap() - 0.10).abs() < 1e-12);

        let eth = jan2.row("ETH").unwrap();
        assert_eq!(eth.market_cap, None);
        assert_eq!(eth.previous_price, None);
        assert!(!eth.listed_domestic);

        let sol = days[0].row("SOL").unwrap();
        assert_eq!(sol.weight_ratio, Some(0.5));
        assert_eq!(sol.price_change_pct, Some(3.5));
        assert_eq!(sol.market_cap, None);
    }

    #[test]
    fn empty_archive_is_no_daily_data() {
        let dir = TempDir::new().unwrap();
        let result = CsvArchiveAdapter::new(dir.path().to_path_buf()).load_days();
        assert!(matches!(result, Err(IndexError::NoDailyData { .. })));
    }

    #[test]
    fn unreadable_file_is_skipped() {
        let dir = setup_archive();
        fs::write(dir.path().join("bm20_2024-01-03.csv"), "coin,mc\nBTC,1\n").unwrap();
        let days = CsvArchiveAdapter::new(dir.path().to_path_buf())
            .load_days()
            .unwrap();

        let dates: Vec<NaiveDate> = days.iter().map(|d| d.date).collect();
        assert_eq!(dates, vec![d(2024, 1, 1), d(2024, 1, 2)]);
    }

    #[test]
    fn only_unreadable_files_is_no_daily_data() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("bm20_2024-01-03.csv"), "coin,mc\nBTC,1\n").unwrap();
        let result = CsvArchiveAdapter::new(dir.path().to_path_buf()).load_days();
        assert!(matches!(result, Err(IndexError::NoDailyData { .. })));
    }

    #[test]
    fn missing_root_is_data_read() {
        let result = CsvArchiveAdapter::new(PathBuf::from("/nonexistent/archive")).load_days();
        assert!(matches!(result, Err(IndexError::DataRead { .. })));
    }

    #[test]
    fn date_extraction() {
        assert_eq!(date_in_name("bm20_daily_2024-05-07.csv"), Some(d(2024, 5, 7)));
        assert_eq!(date_in_name("2024-13-01.csv"), None);
        assert_eq!(date_in_name("코인_2024-05-07.csv"), Some(d(2024, 5, 7)));
        assert_eq!(date_in_name("latest.csv"), None);
    }

    #[test]
    fn flags_and_numbers() {
        assert_eq!(parse_flag(" Y "), Some(true));
        assert_eq!(parse_flag("f"), Some(false));
        assert_eq!(parse_flag(""), None);
        assert_eq!(parse_number("1e3"), Some(1000.0));
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("-"), None);
    }
}

//! Close-price files, one `<TICKER>.csv` (`date,close`) per ticker.

use crate::adapters::csv_archive_adapter::lenient_number;
use crate::domain::error::IndexError;
use crate::ports::price_port::PriceSourcePort;
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::PathBuf;

pub struct CsvPriceAdapter {
    base_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct CloseRecord {
    date: String,
    #[serde(deserialize_with = "lenient_number")]
    close: Option<f64>,
}

impl CsvPriceAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, ticker: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", ticker))
    }
}

impl PriceSourcePort for CsvPriceAdapter {
    fn closes(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(NaiveDate, f64)>, IndexError> {
        let path = self.csv_path(ticker);
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&path)
            .map_err(|e| IndexError::PriceSource {
                ticker: ticker.to_string(),
                reason: format!("failed to read {}: {}", path.display(), e),
            })?;

        let mut closes = Vec::new();
        for result in rdr.deserialize::<CloseRecord>() {
            let record = result.map_err(|e| IndexError::PriceSource {
                ticker: ticker.to_string(),
                reason: format!("CSV parse error: {}", e),
            })?;
            let date = NaiveDate::parse_from_str(&record.date, "%Y-%m-%d").map_err(|e| {
                IndexError::PriceSource {
                    ticker: ticker.to_string(),
                    reason: format!("invalid date format: {}", e),
                }
            })?;
            if date < start || date > end {
                continue;
            }
            if let Some(close) = record.close {
                closes.push((date, close));
            }
        }

        closes.sort_by_key(|(d, _)| *d);
        Ok(closes)
    }
}

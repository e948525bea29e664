//! Symbol override table (`symbol,yf_ticker,listed_kr_override,include,cap_override`).

use crate::adapters::csv_archive_adapter::{lenient_flag, lenient_number};
use crate::domain::asset::{OverrideTable, SymbolOverride};
use crate::domain::error::IndexError;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct OverrideRecord {
    symbol: String,
    #[serde(default)]
    yf_ticker: Option<String>,
    #[serde(default, deserialize_with = "lenient_flag")]
    listed_kr_override: Option<bool>,
    #[serde(default, deserialize_with = "lenient_flag")]
    include: Option<bool>,
    #[serde(default, deserialize_with = "lenient_number")]
    cap_override: Option<f64>,
}

pub fn load_overrides<P: AsRef<Path>>(path: P) -> Result<OverrideTable, IndexError> {
    let path = path.as_ref();
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| IndexError::DataRead {
            source_name: path.display().to_string(),
            reason: e.to_string(),
        })?;

    let mut entries = Vec::new();
    for result in rdr.deserialize::<OverrideRecord>() {
        let record = result.map_err(|e| IndexError::DataRead {
            source_name: path.display().to_string(),
            reason: format!("CSV parse error: {}", e),
        })?;
        if record.symbol.trim().is_empty() {
            continue;
        }
        entries.push(SymbolOverride {
            symbol: record.symbol,
            price_ticker: record.yf_ticker.filter(|t| !t.trim().is_empty()),
            listed_domestic: record.listed_kr_override.unwrap_or(false),
            include: record.include,
            cap_override: record.cap_override.filter(|c| *c > 0.0),
        });
    }

    let table = OverrideTable::new(entries);
    tracing::debug!(entries = table.len(), path = %path.display(), "loaded overrides");
    Ok(table)
}

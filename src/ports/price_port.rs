//! Secondary price source port.

use crate::domain::error::IndexError;
use chrono::NaiveDate;

/// Daily closing prices keyed by a price ticker (e.g. `BTC-USD`).
pub trait PriceSourcePort {
    /// Closes with `start <= date <= end`, ascending by date.
    fn closes(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(NaiveDate, f64)>, IndexError>;
}

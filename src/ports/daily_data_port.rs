//! Daily market data port trait.

use crate::domain::asset::DailyData;
use crate::domain::error::IndexError;

/// Source of per-date asset rows.
pub trait DailyDataPort {
    /// One entry per date, ascending. No data at all is
    /// [`IndexError::NoDailyData`].
    fn load_days(&self) -> Result<Vec<DailyData>, IndexError>;
}

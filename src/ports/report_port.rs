//! Output artifact port trait.

use crate::domain::continuity::SeriesPoint;
use crate::domain::error::IndexError;
use crate::domain::index::{ConstituentSnapshot, IndexPoint};
use crate::domain::summary::{ContributionReport, SeriesSummary};

/// Port for writing index artifacts.
pub trait ReportPort {
    fn write_index(&self, points: &[IndexPoint]) -> Result<(), IndexError>;

    fn write_constituents(&self, snapshot: &ConstituentSnapshot) -> Result<(), IndexError>;

    /// A `date,index,ret` series, named by `name`.
    fn write_series(&self, name: &str, points: &[SeriesPoint]) -> Result<(), IndexError>;

    fn write_summary(
        &self,
        summary: &SeriesSummary,
        contributions: Option<&ContributionReport>,
    ) -> Result<(), IndexError>;
}

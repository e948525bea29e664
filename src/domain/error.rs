//! Domain error types.

/// Top-level error type for bm20.
///
/// Only failures that make a whole run meaningless are raised. Per-date and
/// per-asset problems (degraded universe, missing prices, infeasible caps,
/// an invalid merge seam) are absorbed by the engine and surfaced in its
/// output instead.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("no daily data found in {location}")]
    NoDailyData { location: String },

    #[error("failed to read {source_name}: {reason}")]
    DataRead { source_name: String, reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("{series} series is empty")]
    EmptySeries { series: String },

    #[error("price source lookup for {ticker} failed: {reason}")]
    PriceSource { ticker: String, reason: String },

    #[error("failed to write {path}: {reason}")]
    ReportWrite { path: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl IndexError {
    pub(crate) fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        IndexError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&IndexError> for std::process::ExitCode {
    fn from(err: &IndexError) -> Self {
        let code: u8 = match err {
            IndexError::Io(_) => 1,
            IndexError::ConfigParse { .. }
            | IndexError::ConfigMissing { .. }
            | IndexError::ConfigInvalid { .. } => 2,
            IndexError::DataRead { .. } => 3,
            IndexError::PriceSource { .. } => 4,
            IndexError::NoDailyData { .. } | IndexError::EmptySeries { .. } => 5,
            IndexError::ReportWrite { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}

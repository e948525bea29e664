//! Domestic listing list read from a plain text file.

use crate::domain::error::IndexError;
use crate::ports::listing_port::ListingPort;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Symbols separated by newlines, commas or whitespace. `#` starts a comment.
#[derive(Debug, Clone, Default)]
pub struct FileListingAdapter {
    symbols: HashSet<String>,
}

impl FileListingAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, IndexError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| IndexError::DataRead {
            source_name: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::from_string(&content))
    }

    pub fn from_string(content: &str) -> Self {
        let symbols = content
            .lines()
            .map(|line| line.split('#').next().unwrap_or(""))
            .flat_map(|line| line.split(|c: char| c == ',' || c.is_whitespace()))
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        Self { symbols }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl ListingPort for FileListingAdapter {
    fn is_domestically_listed(&self, symbol: &str) -> bool {
        self.symbols.contains(symbol)
    }
}

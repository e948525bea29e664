//! INI file configuration adapter.

use crate::adapters::csv_archive_adapter::parse_flag;
use crate::domain::error::IndexError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, IndexError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(|reason| IndexError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, IndexError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| IndexError::ConfigParse {
                file: "<string>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_deref()
            .and_then(parse_flag)
            .unwrap_or(default)
    }

    fn keys(&self, section: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .config
            .get_map_ref()
            .get(&section.to_lowercase())
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    const SAMPLE: &str = r#"
[data]
archive = /var/bm20/archive

[index]
rebalance = quarterly
base_value = 100.0
dump_constituents = yes

[weights]
caps = BTC:0.30,ETH:0.20
max_iterations = 16
"#;

    #[test]
    fn typed_getters() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(
            adapter.get_string("data", "archive"),
            Some("/var/bm20/archive".to_string())
        );
        assert_eq!(
            adapter.get_string("weights", "caps"),
            Some("BTC:0.30,ETH:0.20".to_string())
        );
        assert_eq!(adapter.get_string("weights", "max_iterations").as_deref(), Some("16"));
        assert!(adapter.get_bool("index", "dump_constituents", false));
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(adapter.get_string("index", "base_date"), None);
        assert_eq!(adapter.get_string("merge", "head_window"), None);
        assert!(!adapter.get_bool("weights", "exclude_exchange_tokens", false));
    }

    #[test]
    fn keys_lists_section_entries() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(adapter.keys("weights"), vec!["caps", "max_iterations"]);
        assert_eq!(
            adapter.keys("index"),
            vec!["base_value", "dump_constituents", "rebalance"]
        );
        assert!(adapter.keys("returns").is_empty());
    }

    #[test]
    fn bool_spellings() {
        let adapter = FileConfigAdapter::from_string(
            "[flags]\na = true\nb = Y\nc = 1\nd = no\ne = F\nf = maybe\n",
        )
        .unwrap();
        assert!(adapter.get_bool("flags", "a", false));
        assert!(adapter.get_bool("flags", "b", false));
        assert!(adapter.get_bool("flags", "c", false));
        assert!(!adapter.get_bool("flags", "d", true));
        assert!(!adapter.get_bool("flags", "e", true));
        assert!(adapter.get_bool("flags", "f", true));
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[data]\nprices = /var/bm20/prices\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("data", "prices"),
            Some("/var/bm20/prices".to_string())
        );
    }

    #[test]
    fn from_file_missing_is_config_parse() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/bm20.ini");
        assert!(matches!(result, Err(IndexError::ConfigParse { .. })));
    }
}

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::processor::{ProcessorError, Result};

/// Session settings, loadable from TOML
///
/// ```toml
/// app_name = "baseball"
/// master = "local[4]"
/// read_cache_capacity = 8
/// output_partitions = 1
/// show_rows = 20
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub app_name: String,
    /// `local`, `local[N]` or `local[*]`
    pub master: String,
    /// Cached CSV loads; 0 turns the cache off
    pub read_cache_capacity: usize,
    /// Part files written per output directory
    pub output_partitions: usize,
    /// Rows printed by the CLI's `show` calls
    pub show_rows: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            app_name: "columnar-query".to_string(),
            master: "local[*]".to_string(),
            read_cache_capacity: 16,
            output_partitions: 1,
            show_rows: 20,
        }
    }
}

impl SessionConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ProcessorError::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Apply `COLUMNAR_QUERY_MASTER` and `COLUMNAR_QUERY_OUTPUT_PARTITIONS`
    pub fn merge_env_vars(&mut self) -> Result<()> {
        if let Ok(master) = std::env::var("COLUMNAR_QUERY_MASTER") {
            self.set("master", &master)?;
        }
        if let Ok(partitions) = std::env::var("COLUMNAR_QUERY_OUTPUT_PARTITIONS") {
            self.set("output_partitions", &partitions)?;
        }
        Ok(())
    }

    /// Override one setting by key, as `SessionBuilder::config` does
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let invalid = || ProcessorError::InvalidOption {
            key: key.to_string(),
            value: value.to_string(),
        };
        match key {
            "app_name" => self.app_name = value.to_string(),
            "master" => self.master = value.to_string(),
            "read_cache_capacity" => self.read_cache_capacity = value.parse().map_err(|_| invalid())?,
            "output_partitions" => {
                self.output_partitions = value
                    .parse()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(invalid)?
            }
            "show_rows" => self.show_rows = value.parse().map_err(|_| invalid())?,
            _ => return Err(ProcessorError::Config(format!("unknown setting '{}'", key))),
        }
        Ok(())
    }
}

use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::processor::csv_reader::parse_delimiter;
use crate::processor::dataframe::DataFrame;
use crate::processor::session::Session;
use crate::processor::{ProcessorError, Result};

/// Behaviour when the output path already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveMode {
    /// Replace whatever is at the path
    Overwrite,
    #[default]
    ErrorIfExists,
    /// Leave the existing output alone and write nothing
    Ignore,
    /// Add part files after the existing ones
    Append,
}

impl SaveMode {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "overwrite" => Ok(SaveMode::Overwrite),
            "error" | "errorifexists" | "default" => Ok(SaveMode::ErrorIfExists),
            "ignore" => Ok(SaveMode::Ignore),
            "append" => Ok(SaveMode::Append),
            _ => Err(ProcessorError::InvalidOption {
                key: "mode".into(),
                value: name.into(),
            }),
        }
    }
}

/// Writes a frame as a directory of `part-NNNNN.csv` files plus `_SUCCESS`
///
/// Null and the empty string are both written as an empty field (or as the
/// `nullValue` option), so an empty string reads back as null.
#[derive(Debug, Clone)]
pub struct DataFrameWriter {
    df: DataFrame,
    format: String,
    mode: SaveMode,
    options: BTreeMap<String, String>,
    partitions: Option<usize>,
}

impl DataFrameWriter {
    pub fn new(df: DataFrame) -> Self {
        DataFrameWriter {
            df,
            format: "csv".to_string(),
            mode: SaveMode::default(),
            options: BTreeMap::new(),
            partitions: None,
        }
    }

    pub fn format(mut self, format: &str) -> Self {
        self.format = format.to_ascii_lowercase();
        self
    }

    pub fn mode(mut self, mode: SaveMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn option(mut self, key: &str, value: &str) -> Self {
        self.options
            .insert(key.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Number of part files; defaults to the session's `output_partitions`
    pub fn partitions(mut self, n: usize) -> Self {
        self.partitions = Some(n.max(1));
        self
    }

    pub fn csv(self, path: impl AsRef<Path>) -> Result<()> {
        self.format("csv").save(path)
    }

    /// Save to the directory named by the `path` option
    pub fn save_to_path_option(&self) -> Result<()> {
        match self.options.get("path") {
            Some(path) => self.save(path),
            None => Err(ProcessorError::InvalidOption {
                key: "path".into(),
                value: String::new(),
            }),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if self.format != "csv" {
            return Err(ProcessorError::UnsupportedFormat(self.format.clone()));
        }
        let header = match self.options.get("header").map(|v| v.to_ascii_lowercase()) {
            None => false,
            Some(v) if v == "true" => true,
            Some(v) if v == "false" => false,
            Some(v) => {
                return Err(ProcessorError::InvalidOption {
                    key: "header".into(),
                    value: v,
                });
            }
        };
        let delimiter = match (self.options.get("sep"), self.options.get("delimiter")) {
            (Some(v), _) => parse_delimiter("sep", v)?,
            (None, Some(v)) => parse_delimiter("delimiter", v)?,
            (None, None) => b',',
        };
        let null_value = self.options.get("nullvalue").cloned().unwrap_or_default();

        let exists = path.exists();
        match (self.mode, exists) {
            (SaveMode::ErrorIfExists, true) => {
                return Err(ProcessorError::PathExists(path.to_path_buf()));
            }
            (SaveMode::Ignore, true) => {
                info!(path = %path.display(), "output exists, skipping write");
                return Ok(());
            }
            (SaveMode::Overwrite, true) => {
                if path.is_dir() {
                    fs::remove_dir_all(path)?;
                } else {
                    fs::remove_file(path)?;
                }
                debug!(path = %path.display(), "removed existing output");
            }
            _ => {}
        }
        fs::create_dir_all(path)?;

        let first_part = match self.mode {
            SaveMode::Append => next_part_index(path)?,
            _ => 0,
        };
        let partitions = self
            .partitions
            .unwrap_or_else(|| Session::active().map_or(1, |s| s.config().output_partitions))
            .max(1);
        let rows = self.df.count();
        let per_part = rows.div_ceil(partitions).max(1);
        let ranges: Vec<(usize, usize)> = (0..partitions)
            .map(|i| ((i * per_part).min(rows), ((i + 1) * per_part).min(rows)))
            .enumerate()
            .filter(|(i, (start, end))| *i == 0 || start < end)
            .map(|(_, r)| r)
            .collect();

        let names = self.df.column_names();
        ranges
            .par_iter()
            .enumerate()
            .try_for_each(|(i, &(start, end))| {
                let file = path.join(format!("part-{:05}.csv", first_part + i));
                let mut writer = csv::WriterBuilder::new()
                    .delimiter(delimiter)
                    .from_path(&file)?;
                if header {
                    writer.write_record(&names)?;
                }
                for row in start..end {
                    writer.write_record(self.df.columns().iter().map(|c| {
                        let v = c.get(row);
                        if v.is_null() {
                            null_value.clone()
                        } else {
                            v.to_string()
                        }
                    }))?;
                }
                writer.flush()?;
                Ok::<(), ProcessorError>(())
            })?;
        fs::write(path.join("_SUCCESS"), b"")?;

        info!(
            path = %path.display(),
            rows,
            parts = ranges.len(),
            mode = ?self.mode,
            "wrote CSV output"
        );
        Ok(())
    }
}

/// Index after the highest existing `part-NNNNN` file
fn next_part_index(dir: &Path) -> Result<usize> {
    let mut next = 0;
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        let index = name
            .to_str()
            .and_then(|n| n.strip_prefix("part-"))
            .and_then(|n| n.split('.').next())
            .and_then(|n| n.parse::<usize>().ok());
        if let Some(index) = index {
            next = next.max(index + 1);
        }
    }
    Ok(next)
}

impl DataFrame {
    pub fn write(&self) -> DataFrameWriter {
        DataFrameWriter::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::Value;
    use crate::processor::column::Column;
    use crate::processor::csv_reader::DataFrameReader;
    use tempfile::TempDir;

    fn leaders() -> DataFrame {
        DataFrame::from_columns(vec![
            ("yearID", Column::Int64(vec![Some(1871), Some(1872), Some(1873)])),
            (
                "playerID",
                Column::Str(vec![Some("barnero01".into()), None, Some("Smith, Al".into())]),
            ),
            ("maxruns", Column::Float64(vec![Some(66.0), Some(94.5), Some(1e7)])),
        ])
        .unwrap()
    }

    fn read_back(dir: &Path) -> DataFrame {
        DataFrameReader::new()
            .option("header", "true")
            .option("inferSchema", "true")
            .csv(dir)
            .unwrap()
    }

    #[test]
    fn test_overwrite_replaces_previous_output() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("maxruns");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("part-00007.csv"), "stale\n").unwrap();

        leaders()
            .write()
            .mode(SaveMode::Overwrite)
            .option("header", "true")
            .partitions(1)
            .csv(&out)
            .unwrap();

        assert!(out.join("_SUCCESS").exists());
        assert!(!out.join("part-00007.csv").exists());
        let text = fs::read_to_string(out.join("part-00000.csv")).unwrap();
        assert_eq!(
            text,
            "yearID,playerID,maxruns\n1871,barnero01,66.0\n1872,,94.5\n1873,\"Smith, Al\",1.0E7\n"
        );
        let back = read_back(&out);
        assert_eq!(back.count(), 3);
        assert_eq!(back.column_values("playerID").unwrap()[1], Value::Null);
    }

    #[test]
    fn test_error_if_exists_and_ignore() {
        let tmp = TempDir::new().unwrap();
        leaders().write().csv(tmp.path().join("a")).unwrap();
        assert!(matches!(
            leaders().write().csv(tmp.path().join("a")),
            Err(ProcessorError::PathExists(_))
        ));
        leaders()
            .limit(1)
            .write()
            .mode(SaveMode::Ignore)
            .csv(tmp.path().join("a"))
            .unwrap();
        let back = DataFrameReader::new().csv(tmp.path().join("a")).unwrap();
        assert_eq!(back.count(), 3);
    }

    #[test]
    fn test_append_and_partitions() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("runs");
        leaders()
            .write()
            .partitions(2)
            .option("header", "true")
            .csv(&out)
            .unwrap();
        assert!(out.join("part-00001.csv").exists());

        leaders()
            .write()
            .mode(SaveMode::Append)
            .option("header", "true")
            .partitions(1)
            .csv(&out)
            .unwrap();
        assert!(out.join("part-00002.csv").exists());
        assert_eq!(read_back(&out).count(), 6);
    }

    #[test]
    fn test_empty_string_reads_back_as_null() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("names");
        DataFrame::from_columns(vec![
            ("id", Column::Int64(vec![Some(1), Some(2)])),
            ("nick", Column::Str(vec![Some(String::new()), None])),
        ])
        .unwrap()
        .write()
        .option("header", "true")
        .partitions(1)
        .csv(&out)
        .unwrap();
        assert_eq!(
            fs::read_to_string(out.join("part-00000.csv")).unwrap(),
            "id,nick\n1,\n2,\n"
        );
        assert_eq!(
            read_back(&out).column_values("nick").unwrap(),
            vec![Value::Null, Value::Null]
        );
    }

    #[test]
    fn test_tab_separator_spellings_match_reader() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("tabbed");
        leaders()
            .write()
            .option("header", "true")
            .option("sep", "\t")
            .partitions(1)
            .csv(&out)
            .unwrap();
        let text = fs::read_to_string(out.join("part-00000.csv")).unwrap();
        assert!(text.starts_with("yearID\tplayerID\tmaxruns\n"));

        let back = DataFrameReader::new()
            .option("header", "true")
            .option("inferSchema", "true")
            .option("sep", "\\t")
            .csv(&out)
            .unwrap();
        assert_eq!(back.column_values("maxruns").unwrap()[1], Value::Float(94.5));

        let escaped = tmp.path().join("escaped");
        leaders().write().option("delimiter", "\\t").csv(&escaped).unwrap();
        assert!(matches!(
            leaders().write().option("sep", "::").csv(tmp.path().join("bad")),
            Err(ProcessorError::InvalidOption { .. })
        ));
    }

    #[test]
    fn test_save_mode_names() {
        assert_eq!(SaveMode::parse("overwrite").unwrap(), SaveMode::Overwrite);
        assert_eq!(SaveMode::parse("errorifexists").unwrap(), SaveMode::ErrorIfExists);
        assert!(SaveMode::parse("replace").is_err());
    }
}

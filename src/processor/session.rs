//! Process-wide query session
//!
//! The first `get_or_create` call sizes the global rayon pool from the
//! master string and installs the session; later calls return the same one.

use lru::LruCache;
use once_cell::sync::OnceCell;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::processor::column::Column;
use crate::processor::csv_reader::DataFrameReader;
use crate::processor::dataframe::DataFrame;
use crate::processor::{ProcessorError, Result};

static ACTIVE: OnceCell<Session> = OnceCell::new();

pub(crate) type ReadCache = Arc<Mutex<LruCache<ReadCacheKey, DataFrame>>>;

/// Identifies one CSV load: the path, its reader options and the size and
/// modification time of every file read
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ReadCacheKey {
    path: PathBuf,
    options: BTreeMap<String, String>,
    files: Vec<(PathBuf, u64, Option<SystemTime>)>,
}

impl ReadCacheKey {
    pub(crate) fn new(
        path: &Path,
        options: &BTreeMap<String, String>,
        files: &[PathBuf],
    ) -> Result<Self> {
        let files = files
            .iter()
            .map(|f| {
                let meta = std::fs::metadata(f)?;
                Ok((f.clone(), meta.len(), meta.modified().ok()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ReadCacheKey {
            path: path.to_path_buf(),
            options: options.clone(),
            files,
        })
    }
}

/// Number of workers for a master string: `local`, `local[N]` or `local[*]`
pub fn parse_master(master: &str) -> Result<usize> {
    let master = master.trim();
    if master == "local" {
        return Ok(1);
    }
    let workers = master
        .strip_prefix("local[")
        .and_then(|rest| rest.strip_suffix(']'))
        .and_then(|n| match n.trim() {
            "*" => Some(
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1),
            ),
            n => n.parse::<usize>().ok().filter(|n| *n > 0),
        });
    workers.ok_or_else(|| ProcessorError::InvalidOption {
        key: "master".into(),
        value: master.into(),
    })
}

#[derive(Debug)]
struct SessionInner {
    config: SessionConfig,
    workers: usize,
    cache: Option<ReadCache>,
}

/// Entry point for reading data and generating sequences
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    /// The session installed by `get_or_create`, if any
    pub fn active() -> Option<Session> {
        ACTIVE.get().cloned()
    }

    /// Build a standalone session; it is not installed as the active one
    pub fn from_config(config: SessionConfig) -> Result<Session> {
        let workers = parse_master(&config.master)?;
        match rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("columnar-query-{}", i))
            .build_global()
        {
            Ok(()) => debug!(workers, "configured global worker pool"),
            Err(e) => warn!(
                requested = workers,
                current = rayon::current_num_threads(),
                error = %e,
                "worker pool already configured, keeping it"
            ),
        }

        let cache = NonZeroUsize::new(config.read_cache_capacity)
            .map(|cap| Arc::new(Mutex::new(LruCache::new(cap))));

        info!(
            app_name = %config.app_name,
            master = %config.master,
            workers = rayon::current_num_threads(),
            "session started"
        );
        Ok(Session {
            inner: Arc::new(SessionInner {
                config,
                workers,
                cache,
            }),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn app_name(&self) -> &str {
        &self.inner.config.app_name
    }

    /// Worker count requested by the master string
    pub fn workers(&self) -> usize {
        self.inner.workers
    }

    pub fn read(&self) -> DataFrameReader {
        DataFrameReader::with_cache(self.inner.cache.clone())
    }

    /// `id` column holding `0, 1, …, end - 1`
    pub fn range(&self, end: i64) -> Result<DataFrame> {
        self.range_between(0, end, 1)
    }

    /// `id` column holding `start, start + step, …` up to but excluding `end`
    pub fn range_between(&self, start: i64, end: i64, step: i64) -> Result<DataFrame> {
        if step == 0 {
            return Err(ProcessorError::InvalidOption {
                key: "step".into(),
                value: "0".into(),
            });
        }
        let span = end as i128 - start as i128;
        let wide_step = step as i128;
        let count = if (step > 0 && span > 0) || (step < 0 && span < 0) {
            (span + wide_step - wide_step.signum()) / wide_step
        } else {
            0
        };
        let count = usize::try_from(count).map_err(|_| ProcessorError::InvalidOption {
            key: "range".into(),
            value: format!("{}..{} by {}", start, end, step),
        })?;
        // every value lies in [start, end), so the i128 result always fits
        let ids: Vec<Option<i64>> = (0..count)
            .into_par_iter()
            .map(|i| Some((start as i128 + i as i128 * wide_step) as i64))
            .collect();
        DataFrame::from_columns(vec![("id", Column::Int64(ids))])
    }

    /// Number of frames held by the read cache
    pub fn cached_reads(&self) -> usize {
        self.inner
            .cache
            .as_ref()
            .map_or(0, |c| c.lock().unwrap_or_else(|e| e.into_inner()).len())
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.inner.cache {
            cache.lock().unwrap_or_else(|e| e.into_inner()).clear();
        }
    }
}

#[derive(Debug, Default)]
pub struct SessionBuilder {
    config: SessionConfig,
    overrides: Vec<(String, String)>,
}

impl SessionBuilder {
    pub fn master(mut self, master: &str) -> Self {
        self.config.master = master.to_string();
        self
    }

    pub fn app_name(mut self, name: &str) -> Self {
        self.config.app_name = name.to_string();
        self
    }

    /// Override a [`SessionConfig`] setting by key. Bad keys or values are
    /// reported by `get_or_create`.
    pub fn config(mut self, key: &str, value: &str) -> Self {
        self.overrides.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Return the active session, creating and installing it on first use.
    /// Settings on a builder that finds an active session are ignored.
    pub fn get_or_create(self) -> Result<Session> {
        if let Some(active) = ACTIVE.get() {
            debug!(app_name = %active.app_name(), "reusing active session");
            return Ok(active.clone());
        }
        let mut config = self.config;
        for (key, value) in &self.overrides {
            config.set(key, value)?;
        }
        let session = Session::from_config(config)?;
        Ok(ACTIVE.get_or_init(|| session).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::Value;
    use std::io::Write;

    fn local_session() -> Session {
        Session::from_config(SessionConfig {
            master: "local[2]".into(),
            ..SessionConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_parse_master() {
        assert_eq!(parse_master("local").unwrap(), 1);
        assert_eq!(parse_master("local[3]").unwrap(), 3);
        assert!(parse_master("local[*]").unwrap() >= 1);
        assert!(parse_master("local[0]").is_err());
        assert!(parse_master("spark://host:7077").is_err());
    }

    #[test]
    fn test_range() {
        let session = local_session();
        let df = session.range(5).unwrap();
        assert_eq!(df.column_names(), vec!["id"]);
        assert_eq!(
            df.column_values("id").unwrap(),
            (0..5).map(Value::Int).collect::<Vec<_>>()
        );
        let stepped = session.range_between(10, 0, -3).unwrap();
        assert_eq!(
            stepped.column_values("id").unwrap(),
            vec![Value::Int(10), Value::Int(7), Value::Int(4), Value::Int(1)]
        );
        assert_eq!(session.range(0).unwrap().count(), 0);
        assert!(session.range_between(0, 5, 0).is_err());
    }

    #[test]
    fn test_range_near_i64_limits() {
        let session = local_session();
        let df = session
            .range_between(
                -9_000_000_000_000_000_000,
                9_000_000_000_000_000_000,
                1_000_000_000_000_000_000,
            )
            .unwrap();
        assert_eq!(df.count(), 18);
        let values = df.column_values("id").unwrap();
        assert_eq!(values[0], Value::Int(-9_000_000_000_000_000_000));
        assert_eq!(values[17], Value::Int(8_000_000_000_000_000_000));

        let top = session.range_between(i64::MAX - 2, i64::MAX, 1).unwrap();
        assert_eq!(
            top.column_values("id").unwrap(),
            vec![Value::Int(i64::MAX - 2), Value::Int(i64::MAX - 1)]
        );
        let down = session.range_between(i64::MIN + 1, i64::MIN, -1).unwrap();
        assert_eq!(down.column_values("id").unwrap(), vec![Value::Int(i64::MIN + 1)]);
    }

    #[test]
    fn test_get_or_create_returns_one_session() {
        let first = Session::builder()
            .app_name("first")
            .master("local[2]")
            .get_or_create()
            .unwrap();
        let second = Session::builder().app_name("second").get_or_create().unwrap();
        assert_eq!(first.app_name(), second.app_name());
        assert!(Session::active().is_some());
    }

    #[test]
    fn test_read_cache_tracks_modification() {
        let session = local_session();
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "a\n1").unwrap();
        file.flush().unwrap();

        let reader = || session.read().option("header", "true").option("inferSchema", "true");
        reader().csv(file.path()).unwrap();
        reader().csv(file.path()).unwrap();
        assert_eq!(session.cached_reads(), 1);

        // different options are a different entry
        session.read().csv(file.path()).unwrap();
        assert_eq!(session.cached_reads(), 2);

        writeln!(file, "2").unwrap();
        file.flush().unwrap();
        let df = reader().csv(file.path()).unwrap();
        assert_eq!(df.count(), 2);

        session.clear_cache();
        assert_eq!(session.cached_reads(), 0);
    }

    #[test]
    fn test_zero_capacity_disables_cache() {
        let session = Session::from_config(SessionConfig {
            master: "local".into(),
            read_cache_capacity: 0,
            ..SessionConfig::default()
        })
        .unwrap();
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "1").unwrap();
        session.read().csv(file.path()).unwrap();
        assert_eq!(session.cached_reads(), 0);
    }
}

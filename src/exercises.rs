//! The baseball query workflow, one function per step
//!
//! Each step is a short chain of engine calls. `run_all` runs them in order
//! and prints every result table.

use std::path::{Path, PathBuf};
use tracing::info;

use crate::processor::Result;
use crate::processor::aggregate::{approx_count_distinct, count_distinct};
use crate::processor::csv_writer::SaveMode;
use crate::processor::dataframe::DataFrame;
use crate::processor::expr::{col, expr};
use crate::processor::join::JoinType;
use crate::processor::session::Session;

pub const DEFAULT_BATTING: &str = "data/baseball/Batting.csv";
pub const DEFAULT_MASTER: &str = "data/baseball/Master.csv";
pub const DEFAULT_OUTPUT: &str = "output/maxruns";

/// Where `run_all` reads its inputs and writes the leaderboard
#[derive(Debug, Clone, PartialEq)]
pub struct DataPaths {
    pub batting: PathBuf,
    pub master: PathBuf,
    pub output: PathBuf,
}

impl Default for DataPaths {
    fn default() -> Self {
        DataPaths {
            batting: PathBuf::from(DEFAULT_BATTING),
            master: PathBuf::from(DEFAULT_MASTER),
            output: PathBuf::from(DEFAULT_OUTPUT),
        }
    }
}

/// `x` in `[0, n)` with `y = sqrt(x)` and `z = x * x`
pub fn squares(session: &Session, n: i64) -> Result<DataFrame> {
    session
        .range(n)?
        .to_df(&["x"])?
        .with_column("y", expr("sqrt(x)")?)?
        .with_column("z", expr("x*x")?)
}

/// Mean of `z` for even and odd `z`
pub fn parity_means(squares: &DataFrame) -> Result<DataFrame> {
    squares
        .with_column("even", expr("z % 2 = 0")?)?
        .group_by(&["even"])
        .avg(&["z"])
}

/// CSV with a header row and inferred column types
pub fn load_table(session: &Session, path: &Path) -> Result<DataFrame> {
    session
        .read()
        .format("csv")
        .option("inferSchema", "true")
        .option("header", "true")
        .load(path)
}

pub fn runs_per_year(batting: &DataFrame) -> Result<DataFrame> {
    batting
        .group_by(&["yearID"])
        .sum(&["R"])?
        .order_by_cols(&["yearID"])
}

pub fn distinct_runs(batting: &DataFrame) -> Result<DataFrame> {
    batting.agg(vec![count_distinct("R")])
}

pub fn approx_distinct_runs(batting: &DataFrame, rsd: f64) -> Result<DataFrame> {
    batting.agg(vec![approx_count_distinct("R", rsd)?])
}

/// Player(s) with the most runs in each year. Ties keep every player.
pub fn max_runs_per_year(batting: &DataFrame) -> Result<DataFrame> {
    let maxruns = batting.group_by(&["yearID"]).max(&["R"])?;
    batting
        .alias("b")
        .join(
            &maxruns.alias("m"),
            &[("b.yearID", "m.yearID"), ("b.R", "m.max(R)")],
            JoinType::Inner,
        )?
        .select(vec![
            col("b.yearID"),
            col("playerID"),
            col("m.max(R)").alias("maxruns"),
        ])?
        .order_by_cols(&["yearID"])
}

pub fn save_leaderboard(leaders: &DataFrame, dir: &Path) -> Result<()> {
    leaders
        .write()
        .format("csv")
        .mode(SaveMode::Overwrite)
        .option("path", &dir.to_string_lossy())
        .option("header", "true")
        .save_to_path_option()
}

/// Total runs by birth state for players born in `country`, smallest first
pub fn runs_per_state(batting: &DataFrame, master: &DataFrame, country: &str) -> Result<DataFrame> {
    let predicate = format!("birthCountry = '{}'", country.replace('\'', "''"));
    batting
        .alias("b")
        .join(
            &master.alias("p"),
            &[("b.playerID", "p.playerID")],
            JoinType::Inner,
        )?
        .where_str(&predicate)?
        .group_by(&["birthState"])
        .sum(&["R"])?
        .order_by_cols(&["sum(R)"])
}

/// Every step in order, printing each table with up to `rows` rows
pub fn run_all(session: &Session, paths: &DataPaths, rows: usize) -> Result<()> {
    let df = squares(session, 20)?;
    info!(rows = df.count(), "squares");
    df.show(rows);
    parity_means(&df)?.show(rows);

    let batting = load_table(session, &paths.batting)?;
    info!(path = %paths.batting.display(), rows = batting.count(), "loaded batting");
    runs_per_year(&batting)?.show(rows);
    distinct_runs(&batting)?.show(rows);
    approx_distinct_runs(&batting, 0.05)?.show(rows);

    let leaders = max_runs_per_year(&batting)?;
    leaders.show(rows);
    save_leaderboard(&leaders, &paths.output)?;

    let master = load_table(session, &paths.master)?;
    info!(path = %paths.master.display(), rows = master.count(), "loaded master");
    runs_per_state(&batting, &master, "USA")?.show(rows.max(55));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::processor::Value;
    use crate::processor::column::Column;

    fn session() -> Session {
        Session::from_config(SessionConfig {
            master: "local[2]".into(),
            ..SessionConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_squares_columns() {
        let df = squares(&session(), 20).unwrap();
        assert_eq!(df.column_names(), vec!["x", "y", "z"]);
        let rows = df.collect();
        assert_eq!(rows[9].values(), &[Value::Int(9), Value::Float(3.0), Value::Int(81)]);
    }

    #[test]
    fn test_parity_means_for_twenty() {
        let out = parity_means(&squares(&session(), 20).unwrap()).unwrap();
        assert_eq!(out.column_names(), vec!["even", "avg(z)"]);
        assert_eq!(
            out.collect()
                .into_iter()
                .map(|r| r.into_values())
                .collect::<Vec<_>>(),
            vec![
                vec![Value::Bool(true), Value::Float(114.0)],
                vec![Value::Bool(false), Value::Float(133.0)],
            ]
        );
    }

    #[test]
    fn test_max_runs_keeps_ties() {
        let batting = DataFrame::from_columns(vec![
            (
                "playerID",
                Column::Str(vec![
                    Some("eggleda01".into()),
                    Some("barnero01".into()),
                    Some("spaldal01".into()),
                    Some("whitede01".into()),
                ]),
            ),
            (
                "yearID",
                Column::Int64(vec![Some(1872), Some(1871), Some(1871), Some(1872)]),
            ),
            ("R", Column::Int64(vec![Some(94), Some(66), Some(66), Some(40)])),
        ])
        .unwrap();
        let out = max_runs_per_year(&batting).unwrap();
        assert_eq!(out.column_names(), vec!["yearID", "playerID", "maxruns"]);
        assert_eq!(
            out.column_values("playerID").unwrap(),
            vec![
                Value::Str("barnero01".into()),
                Value::Str("spaldal01".into()),
                Value::Str("eggleda01".into()),
            ]
        );
        assert_eq!(out.column_values("maxruns").unwrap()[2], Value::Int(94));
    }
}

//! # columnar_query
//!
//! An in-process, columnar DataFrame engine for ad-hoc analytical queries
//! over CSV data, with the session/reader/writer surface of a cluster query
//! engine run in local mode. It supports:
//!
//! - Memory-mapped CSV loading with parallel, chunked parsing
//! - Schema inference over every row (long, double, boolean, string)
//! - Expressions from builders or SQL-like strings (`"z % 2 = 0"`)
//! - Parallel grouped aggregation: sum, count, avg, min, max, exact and
//!   HyperLogLog-approximate distinct counts
//! - Hash joins (inner, outer, semi, anti) and stable multi-key sorts
//! - AVX2 SIMD kernels for global numeric aggregates, with scalar fallback
//! - Fixed-width table display and partitioned CSV output
//!
//! # Example
//!
//! ```rust,no_run
//! use columnar_query::{Session, SaveMode};
//!
//! fn main() -> Result<(), columnar_query::ProcessorError> {
//!     let session = Session::builder()
//!         .master("local[*]")
//!         .app_name("baseball")
//!         .get_or_create()?;
//!
//!     let batting = session
//!         .read()
//!         .option("header", "true")
//!         .option("inferSchema", "true")
//!         .csv("data/baseball/Batting.csv")?;
//!
//!     let runs = batting.group_by(&["yearID"]).sum(&["R"])?.order_by_cols(&["yearID"])?;
//!     runs.show(20);
//!
//!     runs.write()
//!         .mode(SaveMode::Overwrite)
//!         .option("header", "true")
//!         .csv("output/runs")?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod exercises;
mod helpers;
pub mod processor;

pub use config::SessionConfig;
pub use processor::aggregate::{AggExpr, GroupedData};
pub use processor::column::{Column, ColumnType};
pub use processor::csv_reader::{DataFrameReader, ParseMode};
pub use processor::csv_writer::{DataFrameWriter, SaveMode};
pub use processor::dataframe::{DataFrame, Row};
pub use processor::expr::{Expr, SortExpr, col, expr, lit};
pub use processor::join::JoinType;
pub use processor::schema::{Field, Schema};
pub use processor::session::{Session, SessionBuilder};
pub use processor::{AggregateOp, ProcessorError, Result, Value};

use std::cmp::Ordering;
use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::path::PathBuf;
use thiserror::Error;

pub mod aggregate;
pub mod column;
pub mod csv_reader;
pub mod csv_writer;
pub mod dataframe;
pub mod display;
pub mod expr;
pub mod expr_parser;
pub mod join;
pub mod schema;
pub mod session;

/// Error type used across the crate
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Schema/parse error: {0}")]
    Parse(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Ambiguous column reference '{0}'")]
    AmbiguousColumn(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Malformed CSV record at line {line}: expected {expected} fields, got {found}")]
    Malformed {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("Path already exists: {}", .0.display())]
    PathExists(PathBuf),

    #[error("Integer overflow in {0}")]
    Overflow(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid value '{value}' for option '{key}'")]
    InvalidOption { key: String, value: String },
}

pub type Result<T> = std::result::Result<T, ProcessorError>;

/// Outcome of loading one CSV source
#[derive(Debug, Default)]
pub struct ParseSummary {
    pub rows_processed: usize,
    pub rows_dropped: usize,
    pub errors: Vec<ParseError>,
}

#[derive(Debug, Clone)]
pub struct ParseError {
    /// 1-based data record number across all files of the load
    pub row: usize,
    pub column: String,
    pub value: String,
    pub error: Option<String>,
}

/// A single cell value
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Total order used by sorting and min/max. Null sorts before everything,
    /// numbers compare across int/float, and unrelated types order by kind.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.total_cmp(&(*b as f64)),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (a, b) => a.kind_rank().cmp(&b.kind_rank()),
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Str(_) => 3,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(v) => v.hash(state),
            Value::Int(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::Str(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", display::format_double(*v)),
            Value::Str(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

/// Aggregate operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateOp {
    /// Sum of non-null numeric values
    Sum,
    /// Count of non-null values (or of rows for `count(*)`)
    Count,
    /// Average of numeric values
    Avg,
    /// Minimum value
    Min,
    /// Maximum value
    Max,
    /// Exact number of distinct non-null values
    CountDistinct,
    /// HyperLogLog estimate with `2^precision` registers
    ApproxCountDistinct { precision: u8 },
}

impl AggregateOp {
    /// Relative standard deviation used when none is given.
    pub const DEFAULT_RSD: f64 = 0.05;

    /// Approximate distinct count tuned for the given relative standard deviation.
    pub fn approx_count_distinct(rsd: f64) -> Result<Self> {
        if !(rsd > 0.0 && rsd < 1.0) {
            return Err(ProcessorError::InvalidOption {
                key: "rsd".into(),
                value: rsd.to_string(),
            });
        }
        let precision = (2.0 * (1.106 / rsd).log2()).ceil().clamp(4.0, 18.0) as u8;
        Ok(AggregateOp::ApproxCountDistinct { precision })
    }

    pub(crate) fn label(&self, input: &str) -> String {
        match self {
            AggregateOp::Sum => format!("sum({})", input),
            AggregateOp::Count => format!("count({})", input),
            AggregateOp::Avg => format!("avg({})", input),
            AggregateOp::Min => format!("min({})", input),
            AggregateOp::Max => format!("max({})", input),
            AggregateOp::CountDistinct => format!("count(DISTINCT {})", input),
            AggregateOp::ApproxCountDistinct { .. } => format!("approx_count_distinct({})", input),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approx_precision_from_rsd() {
        assert_eq!(
            AggregateOp::approx_count_distinct(0.05).unwrap(),
            AggregateOp::ApproxCountDistinct { precision: 9 }
        );
        assert_eq!(
            AggregateOp::approx_count_distinct(0.01).unwrap(),
            AggregateOp::ApproxCountDistinct { precision: 14 }
        );
        assert!(AggregateOp::approx_count_distinct(0.0).is_err());
    }

    #[test]
    fn test_sort_cmp_nulls_first_and_mixed_numbers() {
        assert_eq!(Value::Null.sort_cmp(&Value::Int(1)), Ordering::Less);
        assert_eq!(Value::Int(2).sort_cmp(&Value::Float(1.5)), Ordering::Greater);
        assert_eq!(
            Value::Str("AL".into()).sort_cmp(&Value::Str("AK".into())),
            Ordering::Greater
        );
    }
}

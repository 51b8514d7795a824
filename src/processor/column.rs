use std::cmp::Ordering;
use std::fmt;

use crate::processor::{ProcessorError, Result, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Int64,
    Float64,
    Bool,
    Str,
}

impl ColumnType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Int64 | ColumnType::Float64)
    }

    /// Engine type name as printed by `print_schema`
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Int64 => "long",
            ColumnType::Float64 => "double",
            ColumnType::Bool => "boolean",
            ColumnType::Str => "string",
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "long" | "bigint" | "int" | "integer" => Ok(ColumnType::Int64),
            "double" | "float" => Ok(ColumnType::Float64),
            "boolean" | "bool" => Ok(ColumnType::Bool),
            "string" | "str" => Ok(ColumnType::Str),
            other => Err(ProcessorError::Parse(format!("unknown type '{}'", other))),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Typed, nullable column storage
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Int64(Vec<Option<i64>>),
    Float64(Vec<Option<f64>>),
    Bool(Vec<Option<bool>>),
    Str(Vec<Option<String>>),
}

impl Column {
    pub fn new_empty(column_type: ColumnType) -> Self {
        match column_type {
            ColumnType::Int64 => Column::Int64(Vec::new()),
            ColumnType::Float64 => Column::Float64(Vec::new()),
            ColumnType::Bool => Column::Bool(Vec::new()),
            ColumnType::Str => Column::Str(Vec::new()),
        }
    }

    /// A column repeating `value` `len` times
    pub fn literal(value: &Value, len: usize) -> Self {
        match value {
            Value::Int(v) => Column::Int64(vec![Some(*v); len]),
            Value::Float(v) => Column::Float64(vec![Some(*v); len]),
            Value::Bool(v) => Column::Bool(vec![Some(*v); len]),
            Value::Str(v) => Column::Str(vec![Some(v.clone()); len]),
            Value::Null => Column::Str(vec![None; len]),
        }
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            Column::Int64(_) => ColumnType::Int64,
            Column::Float64(_) => ColumnType::Float64,
            Column::Bool(_) => ColumnType::Bool,
            Column::Str(_) => ColumnType::Str,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Int64(v) => v.len(),
            Column::Float64(v) => v.len(),
            Column::Bool(v) => v.len(),
            Column::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn null_count(&self) -> usize {
        match self {
            Column::Int64(v) => v.iter().filter(|x| x.is_none()).count(),
            Column::Float64(v) => v.iter().filter(|x| x.is_none()).count(),
            Column::Bool(v) => v.iter().filter(|x| x.is_none()).count(),
            Column::Str(v) => v.iter().filter(|x| x.is_none()).count(),
        }
    }

    /// Random access; out-of-range reads are null
    pub fn get(&self, idx: usize) -> Value {
        match self {
            Column::Int64(v) => v.get(idx).copied().flatten().map_or(Value::Null, Value::Int),
            Column::Float64(v) => v
                .get(idx)
                .copied()
                .flatten()
                .map_or(Value::Null, Value::Float),
            Column::Bool(v) => v.get(idx).copied().flatten().map_or(Value::Null, Value::Bool),
            Column::Str(v) => match v.get(idx) {
                Some(Some(s)) => Value::Str(s.clone()),
                _ => Value::Null,
            },
        }
    }

    pub fn is_valid(&self, idx: usize) -> bool {
        match self {
            Column::Int64(v) => matches!(v.get(idx), Some(Some(_))),
            Column::Float64(v) => matches!(v.get(idx), Some(Some(_))),
            Column::Bool(v) => matches!(v.get(idx), Some(Some(_))),
            Column::Str(v) => matches!(v.get(idx), Some(Some(_))),
        }
    }

    /// Compare two rows without materialising values; nulls sort first
    pub fn compare_rows(&self, a: usize, b: usize) -> Ordering {
        fn cmp_opt<T>(x: &Option<T>, y: &Option<T>, f: impl Fn(&T, &T) -> Ordering) -> Ordering {
            match (x, y) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => f(x, y),
            }
        }

        match self {
            Column::Int64(v) => cmp_opt(&v[a], &v[b], |x, y| x.cmp(y)),
            Column::Float64(v) => cmp_opt(&v[a], &v[b], |x, y| x.total_cmp(y)),
            Column::Bool(v) => cmp_opt(&v[a], &v[b], |x, y| x.cmp(y)),
            Column::Str(v) => cmp_opt(&v[a], &v[b], |x, y| x.cmp(y)),
        }
    }

    pub fn iter_values(&self) -> impl Iterator<Item = Value> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }

    /// Dense values when the column is a null-free long column
    pub fn dense_i64(&self) -> Option<Vec<i64>> {
        match self {
            Column::Int64(v) => v.iter().copied().collect(),
            _ => None,
        }
    }

    /// Dense values when the column is a null-free double column
    pub fn dense_f64(&self) -> Option<Vec<f64>> {
        match self {
            Column::Float64(v) => v.iter().copied().collect(),
            _ => None,
        }
    }

    /// Gather rows by index
    pub fn take(&self, indices: &[usize]) -> Column {
        match self {
            Column::Int64(v) => Column::Int64(indices.iter().map(|&i| v[i]).collect()),
            Column::Float64(v) => Column::Float64(indices.iter().map(|&i| v[i]).collect()),
            Column::Bool(v) => Column::Bool(indices.iter().map(|&i| v[i]).collect()),
            Column::Str(v) => Column::Str(indices.iter().map(|&i| v[i].clone()).collect()),
        }
    }

    /// Gather rows by optional index; `None` produces a null (outer joins)
    pub fn take_opt(&self, indices: &[Option<usize>]) -> Column {
        match self {
            Column::Int64(v) => Column::Int64(indices.iter().map(|i| i.and_then(|i| v[i])).collect()),
            Column::Float64(v) => {
                Column::Float64(indices.iter().map(|i| i.and_then(|i| v[i])).collect())
            }
            Column::Bool(v) => Column::Bool(indices.iter().map(|i| i.and_then(|i| v[i])).collect()),
            Column::Str(v) => Column::Str(
                indices
                    .iter()
                    .map(|i| i.and_then(|i| v[i].clone()))
                    .collect(),
            ),
        }
    }

    /// Move chunk columns of one type into a single column, in order
    pub fn concat(column_type: ColumnType, chunks: Vec<Column>) -> Result<Column> {
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        let mut out = match column_type {
            ColumnType::Int64 => Column::Int64(Vec::with_capacity(total)),
            ColumnType::Float64 => Column::Float64(Vec::with_capacity(total)),
            ColumnType::Bool => Column::Bool(Vec::with_capacity(total)),
            ColumnType::Str => Column::Str(Vec::with_capacity(total)),
        };

        for chunk in chunks {
            match (&mut out, chunk) {
                (Column::Int64(dst), Column::Int64(src)) => dst.extend(src),
                (Column::Float64(dst), Column::Float64(src)) => dst.extend(src),
                (Column::Bool(dst), Column::Bool(src)) => dst.extend(src),
                (Column::Str(dst), Column::Str(src)) => dst.extend(src),
                (dst, src) => {
                    return Err(ProcessorError::TypeMismatch(format!(
                        "cannot append {} chunk to {} column",
                        src.column_type(),
                        dst.column_type()
                    )));
                }
            }
        }

        Ok(out)
    }

    /// Build a column from values; the type comes from the first non-null value
    pub fn from_values(values: Vec<Value>) -> Result<Column> {
        let column_type = values
            .iter()
            .find(|v| !v.is_null())
            .map(|v| match v {
                Value::Int(_) => ColumnType::Int64,
                Value::Float(_) => ColumnType::Float64,
                Value::Bool(_) => ColumnType::Bool,
                _ => ColumnType::Str,
            })
            .unwrap_or(ColumnType::Str);
        let has_float = values.iter().any(|v| matches!(v, Value::Float(_)));
        let column_type = if column_type == ColumnType::Int64 && has_float {
            ColumnType::Float64
        } else {
            column_type
        };

        let mut builder = ColumnBuilder::with_capacity(column_type, values.len());
        for v in values {
            builder.push(v)?;
        }
        Ok(builder.finish())
    }

    /// Convert to another type. Unparseable strings become null.
    pub fn cast(&self, to: ColumnType) -> Column {
        if self.column_type() == to {
            return self.clone();
        }
        match (self, to) {
            (Column::Int64(v), ColumnType::Float64) => {
                Column::Float64(v.iter().map(|x| x.map(|x| x as f64)).collect())
            }
            (Column::Int64(v), ColumnType::Bool) => {
                Column::Bool(v.iter().map(|x| x.map(|x| x != 0)).collect())
            }
            (Column::Float64(v), ColumnType::Int64) => Column::Int64(
                v.iter()
                    .map(|x| x.filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
                    .collect(),
            ),
            (Column::Float64(v), ColumnType::Bool) => {
                Column::Bool(v.iter().map(|x| x.map(|x| x != 0.0)).collect())
            }
            (Column::Bool(v), ColumnType::Int64) => {
                Column::Int64(v.iter().map(|x| x.map(i64::from)).collect())
            }
            (Column::Bool(v), ColumnType::Float64) => {
                Column::Float64(v.iter().map(|x| x.map(|b| if b { 1.0 } else { 0.0 })).collect())
            }
            (Column::Str(v), ColumnType::Int64) => Column::Int64(
                v.iter()
                    .map(|x| x.as_deref().and_then(|s| s.trim().parse::<i64>().ok()))
                    .collect(),
            ),
            (Column::Str(v), ColumnType::Float64) => Column::Float64(
                v.iter()
                    .map(|x| x.as_deref().and_then(|s| s.trim().parse::<f64>().ok()))
                    .collect(),
            ),
            (Column::Str(v), ColumnType::Bool) => Column::Bool(
                v.iter()
                    .map(|x| {
                        x.as_deref().and_then(|s| match s.trim().to_ascii_lowercase().as_str() {
                            "true" => Some(true),
                            "false" => Some(false),
                            _ => None,
                        })
                    })
                    .collect(),
            ),
            (col, ColumnType::Str) => Column::Str(
                col.iter_values()
                    .map(|v| if v.is_null() { None } else { Some(v.to_string()) })
                    .collect(),
            ),
            (col, _) => col.clone(),
        }
    }
}

/// Appends values to a column of a fixed type
#[derive(Debug)]
pub struct ColumnBuilder {
    column: Column,
}

impl ColumnBuilder {
    pub fn with_capacity(column_type: ColumnType, capacity: usize) -> Self {
        let column = match column_type {
            ColumnType::Int64 => Column::Int64(Vec::with_capacity(capacity)),
            ColumnType::Float64 => Column::Float64(Vec::with_capacity(capacity)),
            ColumnType::Bool => Column::Bool(Vec::with_capacity(capacity)),
            ColumnType::Str => Column::Str(Vec::with_capacity(capacity)),
        };
        ColumnBuilder { column }
    }

    pub fn push(&mut self, value: Value) -> Result<()> {
        match (&mut self.column, value) {
            (Column::Int64(v), Value::Null) => v.push(None),
            (Column::Float64(v), Value::Null) => v.push(None),
            (Column::Bool(v), Value::Null) => v.push(None),
            (Column::Str(v), Value::Null) => v.push(None),
            (Column::Int64(v), Value::Int(x)) => v.push(Some(x)),
            (Column::Float64(v), Value::Float(x)) => v.push(Some(x)),
            (Column::Float64(v), Value::Int(x)) => v.push(Some(x as f64)),
            (Column::Bool(v), Value::Bool(x)) => v.push(Some(x)),
            (Column::Str(v), Value::Str(x)) => v.push(Some(x)),
            (Column::Str(v), other) => v.push(Some(other.to_string())),
            (col, other) => {
                return Err(ProcessorError::TypeMismatch(format!(
                    "cannot store {:?} in {} column",
                    other,
                    col.column_type()
                )));
            }
        }
        Ok(())
    }

    pub fn finish(self) -> Column {
        self.column
    }
}

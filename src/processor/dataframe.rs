use fxhash::FxHashSet;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

use crate::processor::column::Column;
use crate::processor::display;
use crate::processor::expr::{Expr, SortExpr, col, expr};
use crate::processor::schema::{Field, Schema};
use crate::processor::{ProcessorError, Result, Value};

/// Immutable columnar relation
///
/// Columns are shared between frames, so deriving a frame with one extra
/// column does not copy the others. Every operation returns a new frame.
///
/// # Example
///
/// ```rust
/// # use columnar_query::processor::dataframe::DataFrame;
/// # use columnar_query::processor::column::Column;
/// # use columnar_query::processor::expr::{col, lit};
/// let df = DataFrame::from_columns(vec![("x", Column::Int64(vec![Some(1), Some(2)]))]).unwrap();
/// let big = df.filter(col("x").gt(lit(1))).unwrap();
/// assert_eq!(big.count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct DataFrame {
    schema: Arc<Schema>,
    columns: Vec<Arc<Column>>,
    row_count: usize,
}

/// One materialised row, as returned by [`DataFrame::collect`]
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    schema: Arc<Schema>,
    values: Vec<Value>,
}

impl Row {
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    pub fn get_by_name(&self, name: &str) -> Result<&Value> {
        let idx = self.schema.index_of(name)?;
        Ok(&self.values[idx])
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl DataFrame {
    pub fn new(schema: Schema, columns: Vec<Arc<Column>>) -> Result<Self> {
        if schema.len() != columns.len() {
            return Err(ProcessorError::Parse(format!(
                "schema has {} fields but {} columns were given",
                schema.len(),
                columns.len()
            )));
        }
        let row_count = columns.first().map_or(0, |c| c.len());
        for (field, column) in schema.fields().iter().zip(&columns) {
            if column.len() != row_count {
                return Err(ProcessorError::Parse(format!(
                    "column '{}' has {} rows, expected {}",
                    field.name,
                    column.len(),
                    row_count
                )));
            }
            if column.column_type() != field.column_type {
                return Err(ProcessorError::TypeMismatch(format!(
                    "column '{}' declared {} but holds {}",
                    field.name,
                    field.column_type,
                    column.column_type()
                )));
            }
        }
        Ok(DataFrame {
            schema: Arc::new(schema),
            columns,
            row_count,
        })
    }

    pub fn empty() -> Self {
        DataFrame {
            schema: Arc::new(Schema::default()),
            columns: Vec::new(),
            row_count: 0,
        }
    }

    pub fn from_columns(columns: Vec<(&str, Column)>) -> Result<Self> {
        let fields = columns
            .iter()
            .map(|(name, c)| Field::new(*name, c.column_type()))
            .collect();
        let columns = columns.into_iter().map(|(_, c)| Arc::new(c)).collect();
        DataFrame::new(Schema::new(fields), columns)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn columns(&self) -> &[Arc<Column>] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.schema.names()
    }

    /// Number of rows
    pub fn count(&self) -> usize {
        self.row_count
    }

    pub fn column(&self, name: &str) -> Result<&Arc<Column>> {
        let idx = self.schema.index_of(name)?;
        Ok(&self.columns[idx])
    }

    pub fn column_values(&self, name: &str) -> Result<Vec<Value>> {
        Ok(self.column(name)?.iter_values().collect())
    }

    /// Rename every column, in order
    pub fn to_df(&self, names: &[&str]) -> Result<DataFrame> {
        if names.len() != self.schema.len() {
            return Err(ProcessorError::Parse(format!(
                "to_df expects {} names, got {}",
                self.schema.len(),
                names.len()
            )));
        }
        let fields = self
            .schema
            .fields()
            .iter()
            .zip(names)
            .map(|(f, name)| Field::new(*name, f.column_type))
            .collect();
        DataFrame::new(Schema::new(fields), self.columns.clone())
    }

    /// Qualify every column with `alias`, so `alias.name` resolves after a join
    pub fn alias(&self, alias: &str) -> DataFrame {
        let fields = self
            .schema
            .fields()
            .iter()
            .map(|f| Field {
                qualifier: Some(alias.to_string()),
                ..f.clone()
            })
            .collect();
        DataFrame {
            schema: Arc::new(Schema::new(fields)),
            columns: self.columns.clone(),
            row_count: self.row_count,
        }
    }

    /// Add a column, or replace the column with the same name
    pub fn with_column(&self, name: &str, e: Expr) -> Result<DataFrame> {
        let column = e.evaluate(self)?;
        let mut fields = self.schema.fields().to_vec();
        let mut columns = self.columns.clone();
        let field = Field::new(name, column.column_type());

        match self.schema.index_of(name) {
            Ok(idx) => {
                fields[idx] = field;
                columns[idx] = column;
            }
            Err(ProcessorError::MissingColumn(_)) => {
                fields.push(field);
                columns.push(column);
            }
            Err(e) => return Err(e),
        }
        DataFrame::new(Schema::new(fields), columns)
    }

    pub fn with_column_renamed(&self, existing: &str, new: &str) -> Result<DataFrame> {
        let fields = self
            .schema
            .fields()
            .iter()
            .map(|f| {
                if f.name == existing {
                    Field {
                        name: new.to_string(),
                        ..f.clone()
                    }
                } else {
                    f.clone()
                }
            })
            .collect();
        DataFrame::new(Schema::new(fields), self.columns.clone())
    }

    /// Remove columns by name; unknown names are ignored
    pub fn drop(&self, names: &[&str]) -> Result<DataFrame> {
        let keep: Vec<usize> = (0..self.schema.len())
            .filter(|&i| {
                let f = &self.schema.fields()[i];
                !names
                    .iter()
                    .any(|n| *n == f.name || *n == f.qualified_name())
            })
            .collect();
        self.project(&keep)
    }

    fn project(&self, indices: &[usize]) -> Result<DataFrame> {
        let fields = indices
            .iter()
            .map(|&i| self.schema.fields()[i].clone())
            .collect();
        let columns = indices.iter().map(|&i| Arc::clone(&self.columns[i])).collect();
        Ok(DataFrame::with_parts(
            Schema::new(fields),
            columns,
            self.row_count,
        ))
    }

    /// Evaluate a list of expressions into a new frame
    pub fn select(&self, exprs: Vec<Expr>) -> Result<DataFrame> {
        let mut fields = Vec::with_capacity(exprs.len());
        let mut columns = Vec::with_capacity(exprs.len());
        for e in &exprs {
            let column = e.evaluate(self)?;
            let field = match e {
                Expr::Column(name) => self.schema.fields()[self.schema.index_of(name)?].clone(),
                other => Field::new(other.output_name(), column.column_type()),
            };
            fields.push(field);
            columns.push(column);
        }
        let mut out = DataFrame::new(Schema::new(fields), columns)?;
        // a select over zero columns still keeps the row count
        if exprs.is_empty() {
            out.row_count = self.row_count;
        }
        Ok(out)
    }

    pub fn select_columns(&self, names: &[&str]) -> Result<DataFrame> {
        self.select(names.iter().map(|n| col(n)).collect())
    }

    /// Like [`select`](Self::select) but every item is an expression string
    pub fn select_expr(&self, exprs: &[&str]) -> Result<DataFrame> {
        let parsed = exprs.iter().map(|s| expr(s)).collect::<Result<Vec<_>>>()?;
        self.select(parsed)
    }

    /// Keep rows where the predicate is true; false and null rows are dropped
    pub fn filter(&self, predicate: Expr) -> Result<DataFrame> {
        let mask = predicate.evaluate(self)?;
        let Column::Bool(mask) = &*mask else {
            return Err(ProcessorError::TypeMismatch(format!(
                "filter predicate '{}' is {}, expected boolean",
                predicate,
                mask.column_type()
            )));
        };
        let indices: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, m)| (*m == Some(true)).then_some(i))
            .collect();
        debug!(
            predicate = %predicate,
            input_rows = self.row_count,
            output_rows = indices.len(),
            "filter"
        );
        Ok(self.take_rows(&indices))
    }

    pub fn where_str(&self, predicate: &str) -> Result<DataFrame> {
        self.filter(expr(predicate)?)
    }

    pub fn limit(&self, n: usize) -> DataFrame {
        if n >= self.row_count {
            return self.clone();
        }
        let indices: Vec<usize> = (0..n).collect();
        self.take_rows(&indices)
    }

    /// Drop duplicate rows, keeping the first occurrence
    pub fn distinct(&self) -> DataFrame {
        let mut seen: FxHashSet<Vec<Value>> = FxHashSet::default();
        let indices: Vec<usize> = (0..self.row_count)
            .filter(|&r| seen.insert(self.row_values(r)))
            .collect();
        self.take_rows(&indices)
    }

    /// Stable multi-key sort; rows with equal keys keep their input order
    pub fn order_by<S: Into<SortExpr>>(&self, keys: Vec<S>) -> Result<DataFrame> {
        let keys: Vec<SortExpr> = keys.into_iter().map(Into::into).collect();
        let key_columns = keys
            .iter()
            .map(|k| k.expr.evaluate(self))
            .collect::<Result<Vec<_>>>()?;

        let mut indices: Vec<usize> = (0..self.row_count).collect();
        indices.par_sort_by(|&a, &b| {
            for (key, column) in keys.iter().zip(&key_columns) {
                let ord = match (column.is_valid(a), column.is_valid(b)) {
                    (false, false) => Ordering::Equal,
                    (false, true) if key.nulls_first => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    (true, false) if key.nulls_first => Ordering::Greater,
                    (true, false) => Ordering::Less,
                    (true, true) => {
                        let ord = column.compare_rows(a, b);
                        if key.ascending { ord } else { ord.reverse() }
                    }
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
        Ok(self.take_rows(&indices))
    }

    pub fn order_by_cols(&self, names: &[&str]) -> Result<DataFrame> {
        self.order_by(names.to_vec())
    }

    pub fn collect(&self) -> Vec<Row> {
        (0..self.row_count)
            .map(|r| Row {
                schema: Arc::clone(&self.schema),
                values: self.row_values(r),
            })
            .collect()
    }

    /// Print the first `n` rows as a table
    pub fn show(&self, n: usize) {
        print!("{}", self.show_string(n, true));
    }

    pub fn show_string(&self, n: usize, truncate: bool) -> String {
        display::show_string(self, n, truncate)
    }

    pub fn print_schema(&self) {
        print!("{}", self.schema_string());
    }

    pub fn schema_string(&self) -> String {
        self.schema.tree_string()
    }

    pub(crate) fn row_values(&self, row: usize) -> Vec<Value> {
        self.columns.iter().map(|c| c.get(row)).collect()
    }

    /// Gather the given rows from every column
    pub(crate) fn take_rows(&self, indices: &[usize]) -> DataFrame {
        let columns = self
            .columns
            .par_iter()
            .map(|c| Arc::new(c.take(indices)))
            .collect();
        DataFrame {
            schema: Arc::clone(&self.schema),
            columns,
            row_count: indices.len(),
        }
    }

    pub(crate) fn with_parts(schema: Schema, columns: Vec<Arc<Column>>, row_count: usize) -> Self {
        DataFrame {
            schema: Arc::new(schema),
            columns,
            row_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::expr::lit;

    fn batting() -> DataFrame {
        DataFrame::from_columns(vec![
            (
                "playerID",
                Column::Str(vec![
                    Some("a".into()),
                    Some("b".into()),
                    Some("c".into()),
                    Some("d".into()),
                ]),
            ),
            (
                "yearID",
                Column::Int64(vec![Some(1872), Some(1871), Some(1872), Some(1871)]),
            ),
            ("R", Column::Int64(vec![Some(10), None, Some(30), Some(5)])),
        ])
        .unwrap()
    }

    #[test]
    fn test_with_column_appends_and_replaces() {
        let df = batting();
        let df = df.with_column("R2", col("R") * lit(2)).unwrap();
        assert_eq!(df.column_names(), vec!["playerID", "yearID", "R", "R2"]);
        let df = df.with_column("R", lit(0)).unwrap();
        assert_eq!(df.column_values("R").unwrap()[0], Value::Int(0));
        assert_eq!(df.schema().len(), 4);
    }

    #[test]
    fn test_filter_drops_null_predicates() {
        let df = batting().where_str("R > 7").unwrap();
        assert_eq!(
            df.column_values("playerID").unwrap(),
            vec![Value::Str("a".into()), Value::Str("c".into())]
        );
    }

    #[test]
    fn test_filter_requires_boolean() {
        assert!(matches!(
            batting().filter(col("R")),
            Err(ProcessorError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_order_by_is_stable() {
        let df = batting().order_by_cols(&["yearID"]).unwrap();
        assert_eq!(
            df.column_values("playerID").unwrap(),
            vec![
                Value::Str("b".into()),
                Value::Str("d".into()),
                Value::Str("a".into()),
                Value::Str("c".into()),
            ]
        );
    }

    #[test]
    fn test_order_by_desc_puts_nulls_last() {
        let df = batting().order_by(vec![col("R").desc()]).unwrap();
        assert_eq!(
            df.column_values("R").unwrap(),
            vec![Value::Int(30), Value::Int(10), Value::Int(5), Value::Null]
        );
        let df = batting().order_by(vec!["R"]).unwrap();
        assert_eq!(df.column_values("R").unwrap()[0], Value::Null);
    }

    #[test]
    fn test_to_df_and_select_expr() {
        let df = batting()
            .select_columns(&["yearID"])
            .unwrap()
            .to_df(&["year"])
            .unwrap()
            .select_expr(&["year - 1870 AS since"])
            .unwrap();
        assert_eq!(df.column_names(), vec!["since"]);
        assert_eq!(df.column_values("since").unwrap()[0], Value::Int(2));
    }

    #[test]
    fn test_distinct_limit_and_collect() {
        let df = batting()
            .select_columns(&["yearID"])
            .unwrap()
            .distinct();
        assert_eq!(df.count(), 2);
        let rows = df.limit(1).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_by_name("yearID").unwrap(), &Value::Int(1872));
    }

    #[test]
    fn test_drop_and_rename() {
        let df = batting()
            .drop(&["R", "nosuch"])
            .unwrap()
            .with_column_renamed("yearID", "year")
            .unwrap();
        assert_eq!(df.column_names(), vec!["playerID", "year"]);
    }

    #[test]
    fn test_drop_every_column_keeps_row_count() {
        let df = batting().drop(&["playerID", "yearID", "R"]).unwrap();
        assert!(df.column_names().is_empty());
        assert_eq!(df.count(), 4);
        assert_eq!(df.collect().len(), 4);
        assert_eq!(batting().select(vec![]).unwrap().count(), 4);
    }

    #[test]
    fn test_schema_string() {
        let df = batting().select_columns(&["playerID", "R"]).unwrap();
        assert_eq!(
            df.schema_string(),
            "root\n |-- playerID: string (nullable = true)\n |-- R: long (nullable = true)\n"
        );
    }
}

//! Grouped and global aggregation
//!
//! Rows are split into fixed-size chunks that aggregate into local hash
//! tables in parallel. The partial tables are then merged in chunk order,
//! which keeps groups in order of first appearance regardless of how rayon
//! scheduled the chunks.

use fxhash::{FxHashMap, FxHashSet};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

use crate::helpers::hll::HllSketch;
use crate::helpers::simd_helpers::{aggregate_f64, aggregate_i64};
use crate::processor::column::{Column, ColumnBuilder, ColumnType};
use crate::processor::dataframe::DataFrame;
use crate::processor::expr::{Expr, col};
use crate::processor::schema::{Field, Schema};
use crate::processor::{AggregateOp, ProcessorError, Result, Value};

const CHUNK_ROWS: usize = 1 << 16;

/// One aggregate in an `agg` call
#[derive(Debug, Clone, PartialEq)]
pub struct AggExpr {
    pub op: AggregateOp,
    /// `None` counts rows
    pub input: Option<Expr>,
    pub alias: Option<String>,
}

impl AggExpr {
    pub fn new(op: AggregateOp, input: Expr) -> Self {
        AggExpr {
            op,
            input: Some(input),
            alias: None,
        }
    }

    pub fn alias(mut self, name: &str) -> Self {
        self.alias = Some(name.to_string());
        self
    }

    pub fn output_name(&self) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        match &self.input {
            Some(input) => self.op.label(&input.output_name()),
            None => "count".to_string(),
        }
    }
}

pub fn sum(column: &str) -> AggExpr {
    AggExpr::new(AggregateOp::Sum, col(column))
}

pub fn max(column: &str) -> AggExpr {
    AggExpr::new(AggregateOp::Max, col(column))
}

pub fn min(column: &str) -> AggExpr {
    AggExpr::new(AggregateOp::Min, col(column))
}

pub fn avg(column: &str) -> AggExpr {
    AggExpr::new(AggregateOp::Avg, col(column))
}

pub fn count(column: &str) -> AggExpr {
    AggExpr::new(AggregateOp::Count, col(column))
}

/// Row count, named `count`
pub fn count_star() -> AggExpr {
    AggExpr {
        op: AggregateOp::Count,
        input: None,
        alias: None,
    }
}

pub fn count_distinct(column: &str) -> AggExpr {
    AggExpr::new(AggregateOp::CountDistinct, col(column))
}

/// HyperLogLog distinct count with relative standard deviation `rsd`
pub fn approx_count_distinct(column: &str, rsd: f64) -> Result<AggExpr> {
    Ok(AggExpr::new(
        AggregateOp::approx_count_distinct(rsd)?,
        col(column),
    ))
}

#[derive(Debug, Clone)]
enum Accumulator {
    CountRows(i64),
    Count(i64),
    SumLong(Option<i128>),
    SumDouble(Option<f64>),
    Avg { sum: f64, count: i64 },
    Min(Value),
    Max(Value),
    Distinct(FxHashSet<Value>),
    Approx(HllSketch),
}

impl Accumulator {
    fn new(op: AggregateOp, input: Option<ColumnType>) -> Self {
        match (op, input) {
            (AggregateOp::Count, None) => Accumulator::CountRows(0),
            (AggregateOp::Count, Some(_)) => Accumulator::Count(0),
            (AggregateOp::Sum, Some(ColumnType::Int64)) => Accumulator::SumLong(None),
            (AggregateOp::Sum, _) => Accumulator::SumDouble(None),
            (AggregateOp::Avg, _) => Accumulator::Avg { sum: 0.0, count: 0 },
            (AggregateOp::Min, _) => Accumulator::Min(Value::Null),
            (AggregateOp::Max, _) => Accumulator::Max(Value::Null),
            (AggregateOp::CountDistinct, _) => Accumulator::Distinct(FxHashSet::default()),
            (AggregateOp::ApproxCountDistinct { precision }, _) => {
                Accumulator::Approx(HllSketch::new(precision))
            }
        }
    }

    fn update(&mut self, input: Option<&Column>, row: usize) {
        let Some(column) = input else {
            if let Accumulator::CountRows(n) = self {
                *n += 1;
            }
            return;
        };
        if !column.is_valid(row) {
            return;
        }
        match self {
            Accumulator::CountRows(n) | Accumulator::Count(n) => *n += 1,
            Accumulator::SumLong(acc) => {
                if let Some(x) = column.get(row).as_i64() {
                    *acc = Some(acc.unwrap_or(0) + x as i128);
                }
            }
            Accumulator::SumDouble(acc) => {
                if let Some(x) = column.get(row).as_f64() {
                    *acc = Some(acc.unwrap_or(0.0) + x);
                }
            }
            Accumulator::Avg { sum, count } => {
                if let Some(x) = column.get(row).as_f64() {
                    *sum += x;
                    *count += 1;
                }
            }
            Accumulator::Min(cur) => {
                let v = column.get(row);
                if cur.is_null() || v.sort_cmp(cur) == Ordering::Less {
                    *cur = v;
                }
            }
            Accumulator::Max(cur) => {
                let v = column.get(row);
                if cur.is_null() || v.sort_cmp(cur) == Ordering::Greater {
                    *cur = v;
                }
            }
            Accumulator::Distinct(set) => {
                set.insert(column.get(row));
            }
            Accumulator::Approx(sketch) => sketch.add(&column.get(row)),
        }
    }

    fn merge(&mut self, other: Accumulator) {
        match (self, other) {
            (Accumulator::CountRows(a), Accumulator::CountRows(b))
            | (Accumulator::Count(a), Accumulator::Count(b)) => *a += b,
            (Accumulator::SumLong(a), Accumulator::SumLong(b)) => {
                if let Some(b) = b {
                    *a = Some(a.unwrap_or(0) + b);
                }
            }
            (Accumulator::SumDouble(a), Accumulator::SumDouble(b)) => {
                if let Some(b) = b {
                    *a = Some(a.unwrap_or(0.0) + b);
                }
            }
            (
                Accumulator::Avg { sum, count },
                Accumulator::Avg {
                    sum: other_sum,
                    count: other_count,
                },
            ) => {
                *sum += other_sum;
                *count += other_count;
            }
            (Accumulator::Min(a), Accumulator::Min(b)) => {
                if !b.is_null() && (a.is_null() || b.sort_cmp(a) == Ordering::Less) {
                    *a = b;
                }
            }
            (Accumulator::Max(a), Accumulator::Max(b)) => {
                if !b.is_null() && (a.is_null() || b.sort_cmp(a) == Ordering::Greater) {
                    *a = b;
                }
            }
            (Accumulator::Distinct(a), Accumulator::Distinct(b)) => a.extend(b),
            (Accumulator::Approx(a), Accumulator::Approx(b)) => a.merge(&b),
            _ => unreachable!("partials of one aggregate share a variant"),
        }
    }

    fn finish(self, name: &str) -> Result<Value> {
        Ok(match self {
            Accumulator::CountRows(n) | Accumulator::Count(n) => Value::Int(n),
            Accumulator::SumLong(None) | Accumulator::SumDouble(None) => Value::Null,
            Accumulator::SumLong(Some(total)) => Value::Int(
                i64::try_from(total).map_err(|_| ProcessorError::Overflow(name.to_string()))?,
            ),
            Accumulator::SumDouble(Some(total)) => Value::Float(total),
            Accumulator::Avg { count: 0, .. } => Value::Null,
            Accumulator::Avg { sum, count } => Value::Float(sum / count as f64),
            Accumulator::Min(v) | Accumulator::Max(v) => v,
            Accumulator::Distinct(set) => Value::Int(set.len() as i64),
            Accumulator::Approx(sketch) => Value::Int(sketch.count()),
        })
    }
}

/// Evaluated input of one aggregate
struct AggInput {
    op: AggregateOp,
    name: String,
    column: Option<Arc<Column>>,
}

impl AggInput {
    fn input_type(&self) -> Option<ColumnType> {
        self.column.as_ref().map(|c| c.column_type())
    }

    fn output_type(&self) -> ColumnType {
        match (self.op, self.input_type()) {
            (AggregateOp::Sum, Some(ColumnType::Int64)) => ColumnType::Int64,
            (AggregateOp::Sum | AggregateOp::Avg, _) => ColumnType::Float64,
            (AggregateOp::Min | AggregateOp::Max, Some(t)) => t,
            _ => ColumnType::Int64,
        }
    }

    fn accumulator(&self) -> Accumulator {
        Accumulator::new(self.op, self.input_type())
    }
}

/// Group keys and accumulators of one chunk, in first-appearance order
#[derive(Default)]
struct Partial {
    index: FxHashMap<Vec<Value>, usize>,
    groups: Vec<(Vec<Value>, Vec<Accumulator>)>,
}

impl Partial {
    fn merge(&mut self, other: Partial) {
        for (key, accs) in other.groups {
            match self.index.get(&key) {
                Some(&slot) => {
                    for (mine, theirs) in self.groups[slot].1.iter_mut().zip(accs) {
                        mine.merge(theirs);
                    }
                }
                None => {
                    self.index.insert(key.clone(), self.groups.len());
                    self.groups.push((key, accs));
                }
            }
        }
    }
}

fn aggregate_chunk(
    keys: &[Arc<Column>],
    inputs: &[AggInput],
    rows: std::ops::Range<usize>,
) -> Partial {
    let mut partial = Partial::default();
    for row in rows {
        let key: Vec<Value> = keys.iter().map(|c| c.get(row)).collect();
        let slot = match partial.index.get(&key) {
            Some(&slot) => slot,
            None => {
                let slot = partial.groups.len();
                partial.index.insert(key.clone(), slot);
                partial
                    .groups
                    .push((key, inputs.iter().map(AggInput::accumulator).collect()));
                slot
            }
        };
        for (acc, input) in partial.groups[slot].1.iter_mut().zip(inputs) {
            acc.update(input.column.as_deref(), row);
        }
    }
    partial
}

/// Global aggregate over a dense numeric column through the SIMD kernels
fn fast_global(input: &AggInput) -> Option<Value> {
    let column = input.column.as_ref()?;
    match (input.op, column.column_type()) {
        (AggregateOp::Min | AggregateOp::Max, ColumnType::Int64) => {
            let values = column.dense_i64()?;
            aggregate_i64(&values, input.op).map(Value::Int)
        }
        (AggregateOp::Sum | AggregateOp::Min | AggregateOp::Max, ColumnType::Float64) => {
            let values = column.dense_f64()?;
            if input.op != AggregateOp::Sum && values.iter().any(|v| v.is_nan()) {
                return None;
            }
            aggregate_f64(&values, input.op).map(Value::Float)
        }
        _ => None,
    }
}

fn prepare_input(df: &DataFrame, agg: &AggExpr) -> Result<AggInput> {
    let name = agg.output_name();
    let column = match &agg.input {
        None => None,
        Some(e) => {
            let c = e.evaluate(df)?;
            let c = match (agg.op, c.column_type()) {
                (AggregateOp::Sum | AggregateOp::Avg, ColumnType::Str) => {
                    Arc::new(c.cast(ColumnType::Float64))
                }
                (AggregateOp::Sum | AggregateOp::Avg, ColumnType::Bool) => {
                    return Err(ProcessorError::TypeMismatch(format!(
                        "{} requires a numeric input, got boolean",
                        name
                    )));
                }
                _ => c,
            };
            Some(c)
        }
    };
    Ok(AggInput {
        op: agg.op,
        name,
        column,
    })
}

fn aggregate(df: &DataFrame, keys: &[Expr], aggs: &[AggExpr]) -> Result<DataFrame> {
    let key_columns = keys
        .iter()
        .map(|k| k.evaluate(df))
        .collect::<Result<Vec<_>>>()?;
    let inputs = aggs
        .iter()
        .map(|a| prepare_input(df, a))
        .collect::<Result<Vec<_>>>()?;
    let rows = df.count();

    let mut fields = Vec::with_capacity(keys.len() + aggs.len());
    for (k, c) in keys.iter().zip(&key_columns) {
        let field = match k {
            Expr::Column(name) => df.schema().fields()[df.schema().index_of(name)?].clone(),
            other => Field::new(other.output_name(), c.column_type()),
        };
        fields.push(field);
    }
    fields.extend(inputs.iter().map(|i| Field::new(i.name.clone(), i.output_type())));

    if keys.is_empty() && !inputs.is_empty() {
        let fast: Option<Vec<Value>> = inputs.iter().map(fast_global).collect();
        if let Some(values) = fast {
            debug!(rows, aggregates = inputs.len(), "global aggregate via SIMD kernels");
            let columns = values
                .into_iter()
                .zip(&inputs)
                .map(|(v, i)| {
                    let mut builder = ColumnBuilder::with_capacity(i.output_type(), 1);
                    builder.push(v)?;
                    Ok(Arc::new(builder.finish()))
                })
                .collect::<Result<Vec<_>>>()?;
            return DataFrame::new(Schema::new(fields), columns);
        }
    }

    let chunks: Vec<std::ops::Range<usize>> = (0..rows)
        .step_by(CHUNK_ROWS)
        .map(|start| start..(start + CHUNK_ROWS).min(rows))
        .collect();
    let partials: Vec<Partial> = chunks
        .into_par_iter()
        .map(|range| aggregate_chunk(&key_columns, &inputs, range))
        .collect();

    let mut merged = Partial::default();
    for partial in partials {
        merged.merge(partial);
    }
    if keys.is_empty() && merged.groups.is_empty() {
        merged
            .groups
            .push((Vec::new(), inputs.iter().map(AggInput::accumulator).collect()));
    }
    let group_count = merged.groups.len();
    debug!(rows, groups = group_count, keys = keys.len(), "aggregate");

    let mut key_builders: Vec<ColumnBuilder> = key_columns
        .iter()
        .map(|c| ColumnBuilder::with_capacity(c.column_type(), group_count))
        .collect();
    let mut agg_builders: Vec<ColumnBuilder> = inputs
        .iter()
        .map(|i| ColumnBuilder::with_capacity(i.output_type(), group_count))
        .collect();

    for (key, accs) in merged.groups {
        for (builder, v) in key_builders.iter_mut().zip(key) {
            builder.push(v)?;
        }
        for ((builder, acc), input) in agg_builders.iter_mut().zip(accs).zip(&inputs) {
            builder.push(acc.finish(&input.name)?)?;
        }
    }

    let columns = key_builders
        .into_iter()
        .chain(agg_builders)
        .map(|b| Arc::new(b.finish()))
        .collect();
    let mut out = DataFrame::new(Schema::new(fields), columns)?;
    if out.columns().is_empty() {
        out = DataFrame::with_parts(Schema::default(), Vec::new(), group_count);
    }
    Ok(out)
}

/// Result of `group_by`, waiting for its aggregates
#[derive(Debug, Clone)]
pub struct GroupedData {
    df: DataFrame,
    keys: Vec<Expr>,
}

impl GroupedData {
    pub fn agg(&self, aggs: Vec<AggExpr>) -> Result<DataFrame> {
        aggregate(&self.df, &self.keys, &aggs)
    }

    pub fn sum(&self, columns: &[&str]) -> Result<DataFrame> {
        self.simple(AggregateOp::Sum, columns)
    }

    pub fn max(&self, columns: &[&str]) -> Result<DataFrame> {
        self.simple(AggregateOp::Max, columns)
    }

    pub fn min(&self, columns: &[&str]) -> Result<DataFrame> {
        self.simple(AggregateOp::Min, columns)
    }

    pub fn avg(&self, columns: &[&str]) -> Result<DataFrame> {
        self.simple(AggregateOp::Avg, columns)
    }

    pub fn mean(&self, columns: &[&str]) -> Result<DataFrame> {
        self.avg(columns)
    }

    /// Rows per group, in a column named `count`
    pub fn count(&self) -> Result<DataFrame> {
        self.agg(vec![count_star()])
    }

    /// Apply `op` to each named column, or to every numeric non-key column
    /// when none are named
    fn simple(&self, op: AggregateOp, columns: &[&str]) -> Result<DataFrame> {
        let names: Vec<String> = if columns.is_empty() {
            let key_names: Vec<String> = self.keys.iter().map(Expr::output_name).collect();
            self.df
                .schema()
                .fields()
                .iter()
                .filter(|f| f.column_type.is_numeric() && !key_names.contains(&f.name))
                .map(|f| f.name.clone())
                .collect()
        } else {
            columns.iter().map(|c| c.to_string()).collect()
        };
        self.agg(names.iter().map(|n| AggExpr::new(op, col(n))).collect())
    }
}

impl DataFrame {
    pub fn group_by(&self, keys: &[&str]) -> GroupedData {
        self.group_by_exprs(keys.iter().map(|k| col(k)).collect())
    }

    pub fn group_by_exprs(&self, keys: Vec<Expr>) -> GroupedData {
        GroupedData {
            df: self.clone(),
            keys,
        }
    }

    /// Aggregate the whole frame into a single row
    pub fn agg(&self, aggs: Vec<AggExpr>) -> Result<DataFrame> {
        aggregate(self, &[], &aggs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::expr::expr;

    fn runs() -> DataFrame {
        DataFrame::from_columns(vec![
            (
                "yearID",
                Column::Int64(vec![Some(1872), Some(1871), Some(1872), None, Some(1871)]),
            ),
            (
                "R",
                Column::Int64(vec![Some(10), Some(3), None, Some(7), Some(3)]),
            ),
            (
                "team",
                Column::Str(vec![
                    Some("BS1".into()),
                    Some("CL1".into()),
                    Some("NY2".into()),
                    Some("BS1".into()),
                    Some("CL1".into()),
                ]),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_groups_in_first_appearance_order() {
        let out = runs().group_by(&["yearID"]).sum(&["R"]).unwrap();
        assert_eq!(out.column_names(), vec!["yearID", "sum(R)"]);
        assert_eq!(
            out.column_values("yearID").unwrap(),
            vec![Value::Int(1872), Value::Int(1871), Value::Null]
        );
        assert_eq!(
            out.column_values("sum(R)").unwrap(),
            vec![Value::Int(10), Value::Int(6), Value::Int(7)]
        );
    }

    #[test]
    fn test_all_null_group_sums_to_null() {
        let out = runs().group_by(&["team"]).agg(vec![sum("R"), count("R")]).unwrap();
        let ny = out
            .collect()
            .into_iter()
            .find(|r| r.get(0) == Some(&Value::Str("NY2".into())))
            .unwrap();
        assert_eq!(ny.get(1), Some(&Value::Null));
        assert_eq!(ny.get(2), Some(&Value::Int(0)));
    }

    #[test]
    fn test_avg_is_double_and_min_max_keep_type() {
        let df = runs();
        let out = df
            .agg(vec![avg("R"), min("team"), max("R"), count_star()])
            .unwrap();
        assert_eq!(out.count(), 1);
        assert_eq!(
            out.collect()[0].values(),
            &[
                Value::Float(23.0 / 4.0),
                Value::Str("BS1".into()),
                Value::Int(10),
                Value::Int(5)
            ]
        );
    }

    #[test]
    fn test_global_agg_over_empty_input_yields_one_row() {
        let empty = runs().where_str("R > 100").unwrap();
        let out = empty.agg(vec![sum("R"), count_star()]).unwrap();
        assert_eq!(out.count(), 1);
        assert_eq!(out.collect()[0].values(), &[Value::Null, Value::Int(0)]);

        let grouped = empty.group_by(&["yearID"]).sum(&["R"]).unwrap();
        assert_eq!(grouped.count(), 0);
    }

    #[test]
    fn test_distinct_counts() {
        let df = runs();
        let out = df
            .agg(vec![
                count_distinct("R"),
                approx_count_distinct("R", 0.05).unwrap(),
            ])
            .unwrap();
        assert_eq!(
            out.column_names(),
            vec!["count(DISTINCT R)", "approx_count_distinct(R)"]
        );
        assert_eq!(out.collect()[0].values(), &[Value::Int(3), Value::Int(3)]);
    }

    #[test]
    fn test_sum_overflow_is_an_error() {
        let df = DataFrame::from_columns(vec![(
            "x",
            Column::Int64(vec![Some(i64::MAX), Some(1)]),
        )])
        .unwrap();
        assert!(matches!(
            df.agg(vec![sum("x")]),
            Err(ProcessorError::Overflow(_))
        ));
    }

    #[test]
    fn test_simd_global_path_matches_general_path() {
        let values: Vec<Option<f64>> = (0..1000).map(|i| Some(i as f64 * 0.5)).collect();
        let df = DataFrame::from_columns(vec![("v", Column::Float64(values))]).unwrap();
        let fast = df.agg(vec![sum("v"), max("v"), min("v")]).unwrap();
        assert_eq!(
            fast.collect()[0].values(),
            &[Value::Float(249_750.0), Value::Float(499.5), Value::Float(0.0)]
        );
        // count forces the partitioned path
        let slow = df.agg(vec![sum("v"), count_star()]).unwrap();
        assert_eq!(slow.collect()[0].get(0), Some(&Value::Float(249_750.0)));
    }

    #[test]
    fn test_group_by_expression_and_grouped_count() {
        let df = DataFrame::from_columns(vec![(
            "z",
            Column::Int64((0..20).map(|i| Some(i * i)).collect()),
        )])
        .unwrap();
        let out = df
            .group_by_exprs(vec![expr("z % 2 = 0 AS even").unwrap()])
            .count()
            .unwrap();
        assert_eq!(out.column_names(), vec!["even", "count"]);
        assert_eq!(
            out.column_values("count").unwrap(),
            vec![Value::Int(10), Value::Int(10)]
        );
    }

    #[test]
    fn test_chunks_merge_across_boundaries() {
        let n = CHUNK_ROWS * 2 + 17;
        let df = DataFrame::from_columns(vec![
            ("k", Column::Int64((0..n).map(|i| Some((i % 3) as i64)).collect())),
            ("v", Column::Int64(vec![Some(1); n])),
        ])
        .unwrap();
        let out = df.group_by(&["k"]).sum(&[]).unwrap();
        assert_eq!(out.column_names(), vec!["k", "sum(v)"]);
        let total: i64 = out
            .column_values("sum(v)")
            .unwrap()
            .iter()
            .filter_map(Value::as_i64)
            .sum();
        assert_eq!(total, n as i64);
        assert_eq!(
            out.column_values("k").unwrap(),
            vec![Value::Int(0), Value::Int(1), Value::Int(2)]
        );
    }
}

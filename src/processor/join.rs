use fxhash::FxHashMap;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::debug;

use crate::processor::column::{Column, ColumnType};
use crate::processor::dataframe::DataFrame;
use crate::processor::schema::{Field, Schema};
use crate::processor::{ProcessorError, Result, Value};

const PROBE_CHUNK: usize = 1 << 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    /// Left rows with at least one match, left columns only
    LeftSemi,
    /// Left rows with no match, left columns only
    LeftAnti,
}

impl JoinType {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().replace('_', "").as_str() {
            "inner" => Ok(JoinType::Inner),
            "left" | "leftouter" => Ok(JoinType::Left),
            "right" | "rightouter" => Ok(JoinType::Right),
            "full" | "outer" | "fullouter" => Ok(JoinType::Full),
            "semi" | "leftsemi" => Ok(JoinType::LeftSemi),
            "anti" | "leftanti" => Ok(JoinType::LeftAnti),
            _ => Err(ProcessorError::InvalidOption {
                key: "joinType".into(),
                value: name.into(),
            }),
        }
    }

    fn keeps_right_columns(&self) -> bool {
        !matches!(self, JoinType::LeftSemi | JoinType::LeftAnti)
    }
}

/// Row pairs produced by a join; `None` marks the null-extended side
struct JoinIndices {
    left: Vec<Option<usize>>,
    right: Vec<Option<usize>>,
}

/// Key columns of both sides, widened to a shared type
fn key_columns(
    left: &DataFrame,
    right: &DataFrame,
    on: &[(&str, &str)],
) -> Result<(Vec<Arc<Column>>, Vec<Arc<Column>>)> {
    let mut lk = Vec::with_capacity(on.len());
    let mut rk = Vec::with_capacity(on.len());
    for (l, r) in on {
        let lc = Arc::clone(left.column(l)?);
        let rc = Arc::clone(right.column(r)?);
        let (lt, rt) = (lc.column_type(), rc.column_type());
        if lt == rt {
            lk.push(lc);
            rk.push(rc);
        } else if lt.is_numeric() && rt.is_numeric() {
            lk.push(Arc::new(lc.cast(ColumnType::Float64)));
            rk.push(Arc::new(rc.cast(ColumnType::Float64)));
        } else {
            return Err(ProcessorError::TypeMismatch(format!(
                "cannot join {} ({}) with {} ({})",
                l, lt, r, rt
            )));
        }
    }
    Ok((lk, rk))
}

/// Composite key of one row, or `None` when any part is null
fn row_key(columns: &[Arc<Column>], row: usize) -> Option<Vec<Value>> {
    columns
        .iter()
        .map(|c| match c.get(row) {
            Value::Null => None,
            Value::Float(f) if f == 0.0 => Some(Value::Float(0.0)),
            v => Some(v),
        })
        .collect()
}

fn hash_join(
    left: &DataFrame,
    right: &DataFrame,
    on: &[(&str, &str)],
    how: JoinType,
) -> Result<JoinIndices> {
    if on.is_empty() {
        return Err(ProcessorError::Parse("join needs at least one key pair".into()));
    }
    let (lk, rk) = key_columns(left, right, on)?;

    let mut table: FxHashMap<Vec<Value>, Vec<usize>> = FxHashMap::default();
    for row in 0..right.count() {
        if let Some(key) = row_key(&rk, row) {
            table.entry(key).or_default().push(row);
        }
    }

    let rows = left.count();
    let chunks: Vec<std::ops::Range<usize>> = (0..rows)
        .step_by(PROBE_CHUNK)
        .map(|start| start..(start + PROBE_CHUNK).min(rows))
        .collect();
    let probed: Vec<Vec<(usize, Option<usize>)>> = chunks
        .into_par_iter()
        .map(|range| {
            let mut out = Vec::with_capacity(range.len());
            for row in range {
                let matches = row_key(&lk, row).and_then(|k| table.get(&k));
                match (how, matches) {
                    (JoinType::LeftSemi, Some(_)) => out.push((row, None)),
                    (JoinType::LeftAnti, None) => out.push((row, None)),
                    (JoinType::LeftSemi | JoinType::LeftAnti, _) => {}
                    (_, Some(rights)) => out.extend(rights.iter().map(|&r| (row, Some(r)))),
                    (JoinType::Left | JoinType::Full, None) => out.push((row, None)),
                    (JoinType::Inner | JoinType::Right, None) => {}
                }
            }
            out
        })
        .collect();

    let mut indices = JoinIndices {
        left: Vec::new(),
        right: Vec::new(),
    };
    let mut right_matched = vec![false; right.count()];
    for (l, r) in probed.into_iter().flatten() {
        indices.left.push(Some(l));
        indices.right.push(r);
        if let Some(r) = r {
            right_matched[r] = true;
        }
    }
    if matches!(how, JoinType::Right | JoinType::Full) {
        for (r, _) in right_matched.iter().enumerate().filter(|(_, m)| !**m) {
            indices.left.push(None);
            indices.right.push(Some(r));
        }
    }

    debug!(
        left_rows = rows,
        right_rows = right.count(),
        output_rows = indices.left.len(),
        join_type = ?how,
        "hash join"
    );
    Ok(indices)
}

impl DataFrame {
    /// Equality join on `(left column, right column)` pairs.
    ///
    /// Null keys never match. Every matching pair is returned, so a key that
    /// appears twice on the right produces two output rows.
    pub fn join(&self, other: &DataFrame, on: &[(&str, &str)], how: JoinType) -> Result<DataFrame> {
        let indices = hash_join(self, other, on, how)?;

        let mut fields = self.schema().fields().to_vec();
        let mut columns: Vec<Arc<Column>> = self
            .columns()
            .par_iter()
            .map(|c| Arc::new(c.take_opt(&indices.left)))
            .collect();
        if how.keeps_right_columns() {
            fields.extend(other.schema().fields().iter().cloned());
            columns.extend(
                other
                    .columns()
                    .par_iter()
                    .map(|c| Arc::new(c.take_opt(&indices.right)))
                    .collect::<Vec<_>>(),
            );
        }
        let rows = indices.left.len();
        Ok(DataFrame::with_parts(Schema::new(fields), columns, rows))
    }

    /// Join on columns that share a name on both sides. Each key appears
    /// once in the output, ahead of the remaining left and right columns.
    pub fn join_using(&self, other: &DataFrame, names: &[&str], how: JoinType) -> Result<DataFrame> {
        let on: Vec<(&str, &str)> = names.iter().map(|n| (*n, *n)).collect();
        let indices = hash_join(self, other, &on, how)?;

        let left_keys = names
            .iter()
            .map(|n| self.schema().index_of(n))
            .collect::<Result<Vec<_>>>()?;
        let right_keys = names
            .iter()
            .map(|n| other.schema().index_of(n))
            .collect::<Result<Vec<_>>>()?;

        let mut fields = Vec::new();
        let mut columns = Vec::new();
        for (&li, &ri) in left_keys.iter().zip(&right_keys) {
            let lc = self.columns()[li].take_opt(&indices.left);
            let column = if how == JoinType::Right || how == JoinType::Full {
                let rc = other.columns()[ri]
                    .take_opt(&indices.right)
                    .cast(lc.column_type());
                coalesce(&lc, &rc)
            } else {
                lc
            };
            let source = &self.schema().fields()[li];
            fields.push(Field::new(source.name.clone(), column.column_type()));
            columns.push(Arc::new(column));
        }
        for (i, field) in self.schema().fields().iter().enumerate() {
            if !left_keys.contains(&i) {
                fields.push(field.clone());
                columns.push(Arc::new(self.columns()[i].take_opt(&indices.left)));
            }
        }
        if how.keeps_right_columns() {
            for (i, field) in other.schema().fields().iter().enumerate() {
                if !right_keys.contains(&i) {
                    fields.push(field.clone());
                    columns.push(Arc::new(other.columns()[i].take_opt(&indices.right)));
                }
            }
        }
        let rows = indices.left.len();
        Ok(DataFrame::with_parts(Schema::new(fields), columns, rows))
    }
}

/// First non-null of two same-typed columns
fn coalesce(primary: &Column, fallback: &Column) -> Column {
    match (primary, fallback) {
        (Column::Int64(a), Column::Int64(b)) => {
            Column::Int64(a.iter().zip(b).map(|(x, y)| x.or(*y)).collect())
        }
        (Column::Float64(a), Column::Float64(b)) => {
            Column::Float64(a.iter().zip(b).map(|(x, y)| x.or(*y)).collect())
        }
        (Column::Bool(a), Column::Bool(b)) => {
            Column::Bool(a.iter().zip(b).map(|(x, y)| x.or(*y)).collect())
        }
        (Column::Str(a), Column::Str(b)) => Column::Str(
            a.iter()
                .zip(b)
                .map(|(x, y)| x.clone().or_else(|| y.clone()))
                .collect(),
        ),
        (p, _) => p.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::expr::col;

    fn players() -> DataFrame {
        DataFrame::from_columns(vec![
            (
                "playerID",
                Column::Str(vec![Some("aa".into()), Some("bb".into()), None, Some("dd".into())]),
            ),
            (
                "R",
                Column::Int64(vec![Some(5), Some(8), Some(1), Some(2)]),
            ),
        ])
        .unwrap()
    }

    fn master() -> DataFrame {
        DataFrame::from_columns(vec![
            (
                "playerID",
                Column::Str(vec![Some("bb".into()), Some("aa".into()), None, Some("zz".into())]),
            ),
            (
                "birthState",
                Column::Str(vec![Some("OH".into()), Some("CA".into()), Some("TX".into()), Some("NY".into())]),
            ),
        ])
        .unwrap()
    }

    fn strings(df: &DataFrame, name: &str) -> Vec<Option<String>> {
        df.column_values(name)
            .unwrap()
            .into_iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    #[test]
    fn test_inner_join_skips_null_keys() {
        let out = players()
            .alias("b")
            .join(&master().alias("m"), &[("b.playerID", "m.playerID")], JoinType::Inner)
            .unwrap();
        assert_eq!(out.count(), 2);
        assert_eq!(
            strings(&out, "birthState"),
            vec![Some("CA".into()), Some("OH".into())]
        );
        assert!(matches!(
            out.column("playerID"),
            Err(ProcessorError::AmbiguousColumn(_))
        ));
    }

    #[test]
    fn test_outer_joins_null_extend() {
        let left = players()
            .join_using(&master(), &["playerID"], JoinType::Left)
            .unwrap();
        assert_eq!(left.count(), 4);
        assert_eq!(
            strings(&left, "birthState"),
            vec![Some("CA".into()), Some("OH".into()), None, None]
        );

        let full = players()
            .join_using(&master(), &["playerID"], JoinType::Full)
            .unwrap();
        assert_eq!(full.count(), 6);
        assert_eq!(full.column_names(), vec!["playerID", "R", "birthState"]);
        assert_eq!(strings(&full, "playerID")[5], Some("zz".into()));
    }

    #[test]
    fn test_semi_and_anti() {
        let semi = players()
            .join_using(&master(), &["playerID"], JoinType::LeftSemi)
            .unwrap();
        assert_eq!(semi.column_names(), vec!["playerID", "R"]);
        assert_eq!(semi.count(), 2);

        let anti = players()
            .join(&master(), &[("playerID", "playerID")], JoinType::LeftAnti)
            .unwrap();
        assert_eq!(
            anti.column_values("R").unwrap(),
            vec![Value::Int(1), Value::Int(2)]
        );
    }

    #[test]
    fn test_duplicate_keys_multiply_rows() {
        let maxes = DataFrame::from_columns(vec![
            ("yearID", Column::Int64(vec![Some(1871)])),
            ("max(R)", Column::Float64(vec![Some(5.0)])),
        ])
        .unwrap();
        let batting = DataFrame::from_columns(vec![
            ("yearID", Column::Int64(vec![Some(1871), Some(1871), Some(1871)])),
            ("R", Column::Int64(vec![Some(5), Some(3), Some(5)])),
        ])
        .unwrap();
        let out = batting
            .alias("b")
            .join(
                &maxes.alias("m"),
                &[("b.yearID", "m.yearID"), ("b.R", "m.max(R)")],
                JoinType::Inner,
            )
            .unwrap()
            .select(vec![col("b.R")])
            .unwrap();
        assert_eq!(out.column_values("R").unwrap(), vec![Value::Int(5), Value::Int(5)]);
    }

    #[test]
    fn test_join_type_names() {
        assert_eq!(JoinType::parse("left_outer").unwrap(), JoinType::Left);
        assert_eq!(JoinType::parse("leftanti").unwrap(), JoinType::LeftAnti);
        assert!(JoinType::parse("cross").is_err());
    }
}

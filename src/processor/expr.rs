//! Column expressions
//!
//! An [`Expr`] is evaluated against a [`DataFrame`] and yields one column with
//! a value per row. Expressions are built either with the helper functions in
//! this module (`col("x") * col("x")`) or parsed from SQL-like text with
//! [`expr`] (`expr("x * x")`).

use std::cmp::Ordering;
use std::fmt;
use std::ops;
use std::sync::Arc;

use crate::processor::column::{Column, ColumnType};
use crate::processor::dataframe::DataFrame;
use crate::processor::expr_parser;
use crate::processor::{ProcessorError, Result, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }

    fn holds(&self, ord: Ordering) -> bool {
        match self {
            BinaryOp::Eq => ord == Ordering::Equal,
            BinaryOp::NotEq => ord != Ordering::Equal,
            BinaryOp::Lt => ord == Ordering::Less,
            BinaryOp::LtEq => ord != Ordering::Greater,
            BinaryOp::Gt => ord == Ordering::Greater,
            BinaryOp::GtEq => ord != Ordering::Less,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarFunction {
    Sqrt,
    Abs,
    Round,
    Floor,
    Ceil,
    Pow,
    Upper,
    Lower,
    Length,
    Coalesce,
}

impl ScalarFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        let f = match name.to_ascii_lowercase().as_str() {
            "sqrt" => ScalarFunction::Sqrt,
            "abs" => ScalarFunction::Abs,
            "round" => ScalarFunction::Round,
            "floor" => ScalarFunction::Floor,
            "ceil" | "ceiling" => ScalarFunction::Ceil,
            "pow" | "power" => ScalarFunction::Pow,
            "upper" | "ucase" => ScalarFunction::Upper,
            "lower" | "lcase" => ScalarFunction::Lower,
            "length" | "char_length" => ScalarFunction::Length,
            "coalesce" => ScalarFunction::Coalesce,
            _ => return None,
        };
        Some(f)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScalarFunction::Sqrt => "SQRT",
            ScalarFunction::Abs => "abs",
            ScalarFunction::Round => "round",
            ScalarFunction::Floor => "FLOOR",
            ScalarFunction::Ceil => "CEIL",
            ScalarFunction::Pow => "POWER",
            ScalarFunction::Upper => "upper",
            ScalarFunction::Lower => "lower",
            ScalarFunction::Length => "length",
            ScalarFunction::Coalesce => "coalesce",
        }
    }

    fn arity(&self) -> (usize, usize) {
        match self {
            ScalarFunction::Round => (1, 2),
            ScalarFunction::Pow => (2, 2),
            ScalarFunction::Coalesce => (1, usize::MAX),
            _ => (1, 1),
        }
    }
}

/// Expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference, optionally qualified as `alias.name`
    Column(String),
    Literal(Value),
    Alias(Box<Expr>, String),
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    Negate(Box<Expr>),
    IsNull(Box<Expr>),
    IsNotNull(Box<Expr>),
    Cast(Box<Expr>, ColumnType),
    Function {
        func: ScalarFunction,
        args: Vec<Expr>,
    },
}

/// Reference a column by name
pub fn col(name: &str) -> Expr {
    Expr::Column(name.to_string())
}

/// Literal value broadcast to every row
pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Literal(value.into())
}

pub fn sqrt(e: Expr) -> Expr {
    Expr::Function {
        func: ScalarFunction::Sqrt,
        args: vec![e],
    }
}

pub fn call(func: ScalarFunction, args: Vec<Expr>) -> Expr {
    Expr::Function { func, args }
}

/// Parse an SQL-like expression string
pub fn expr(text: &str) -> Result<Expr> {
    Expr::parse(text)
}

impl Expr {
    pub fn parse(text: &str) -> Result<Expr> {
        expr_parser::parse_expression(text)
    }

    pub fn alias(self, name: &str) -> Expr {
        Expr::Alias(Box::new(self), name.to_string())
    }

    pub fn cast(self, to: ColumnType) -> Expr {
        Expr::Cast(Box::new(self), to)
    }

    fn binary(self, op: BinaryOp, other: Expr) -> Expr {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(other),
        }
    }

    pub fn eq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Eq, other)
    }

    pub fn not_eq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::NotEq, other)
    }

    pub fn lt(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Lt, other)
    }

    pub fn lt_eq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::LtEq, other)
    }

    pub fn gt(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Gt, other)
    }

    pub fn gt_eq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::GtEq, other)
    }

    pub fn and(self, other: Expr) -> Expr {
        self.binary(BinaryOp::And, other)
    }

    pub fn or(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Or, other)
    }

    pub fn is_null(self) -> Expr {
        Expr::IsNull(Box::new(self))
    }

    pub fn is_not_null(self) -> Expr {
        Expr::IsNotNull(Box::new(self))
    }

    pub fn asc(self) -> SortExpr {
        SortExpr {
            expr: self,
            ascending: true,
            nulls_first: true,
        }
    }

    pub fn desc(self) -> SortExpr {
        SortExpr {
            expr: self,
            ascending: false,
            nulls_first: false,
        }
    }

    /// Name of the column this expression produces
    pub fn output_name(&self) -> String {
        self.to_string()
    }

    /// Evaluate against every row of `df`
    pub fn evaluate(&self, df: &DataFrame) -> Result<Arc<Column>> {
        let rows = df.count();
        match self {
            Expr::Column(name) => Ok(Arc::clone(df.column(name)?)),
            Expr::Literal(v) => Ok(Arc::new(Column::literal(v, rows))),
            Expr::Alias(inner, _) => inner.evaluate(df),
            Expr::Binary { left, op, right } => {
                let l = left.evaluate(df)?;
                let r = right.evaluate(df)?;
                let out = match op {
                    BinaryOp::Add
                    | BinaryOp::Subtract
                    | BinaryOp::Multiply
                    | BinaryOp::Divide
                    | BinaryOp::Modulo => arithmetic(*op, &l, &r)?,
                    BinaryOp::And | BinaryOp::Or => logical(*op, &l, &r)?,
                    _ => comparison(*op, &l, &r)?,
                };
                Ok(Arc::new(out))
            }
            Expr::Not(inner) => match &*inner.evaluate(df)? {
                Column::Bool(v) => Ok(Arc::new(Column::Bool(
                    v.iter().map(|x| x.map(|b| !b)).collect(),
                ))),
                other => Err(ProcessorError::TypeMismatch(format!(
                    "NOT expects boolean, got {}",
                    other.column_type()
                ))),
            },
            Expr::Negate(inner) => match &*inner.evaluate(df)? {
                Column::Int64(v) => Ok(Arc::new(Column::Int64(
                    v.iter().map(|x| x.and_then(i64::checked_neg)).collect(),
                ))),
                Column::Float64(v) => Ok(Arc::new(Column::Float64(
                    v.iter().map(|x| x.map(|f| -f)).collect(),
                ))),
                other => Err(ProcessorError::TypeMismatch(format!(
                    "cannot negate {}",
                    other.column_type()
                ))),
            },
            Expr::IsNull(inner) => {
                let c = inner.evaluate(df)?;
                Ok(Arc::new(Column::Bool(
                    (0..c.len()).map(|i| Some(!c.is_valid(i))).collect(),
                )))
            }
            Expr::IsNotNull(inner) => {
                let c = inner.evaluate(df)?;
                Ok(Arc::new(Column::Bool(
                    (0..c.len()).map(|i| Some(c.is_valid(i))).collect(),
                )))
            }
            Expr::Cast(inner, to) => Ok(Arc::new(inner.evaluate(df)?.cast(*to))),
            Expr::Function { func, args } => {
                let (min, max) = func.arity();
                if args.len() < min || args.len() > max {
                    return Err(ProcessorError::Parse(format!(
                        "{} takes {} argument(s), got {}",
                        func.name(),
                        min,
                        args.len()
                    )));
                }
                let evaluated = args
                    .iter()
                    .map(|a| a.evaluate(df))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Arc::new(scalar_function(*func, &evaluated, rows)?))
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(name) => write!(f, "{}", name),
            Expr::Literal(Value::Str(s)) => write!(f, "{}", s),
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Alias(_, name) => write!(f, "{}", name),
            Expr::Binary { left, op, right } => write!(f, "({} {} {})", left, op.symbol(), right),
            Expr::Not(e) => write!(f, "(NOT {})", e),
            Expr::Negate(e) => write!(f, "(- {})", e),
            Expr::IsNull(e) => write!(f, "({} IS NULL)", e),
            Expr::IsNotNull(e) => write!(f, "({} IS NOT NULL)", e),
            Expr::Cast(e, to) => write!(f, "CAST({} AS {})", e, to.name().to_uppercase()),
            Expr::Function { func, args } => {
                let rendered: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", func.name(), rendered.join(", "))
            }
        }
    }
}

impl ops::Add for Expr {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Add, rhs)
    }
}

impl ops::Sub for Expr {
    type Output = Expr;
    fn sub(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Subtract, rhs)
    }
}

impl ops::Mul for Expr {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Multiply, rhs)
    }
}

impl ops::Div for Expr {
    type Output = Expr;
    fn div(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Divide, rhs)
    }
}

impl ops::Rem for Expr {
    type Output = Expr;
    fn rem(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Modulo, rhs)
    }
}

impl ops::Not for Expr {
    type Output = Expr;
    fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }
}

impl ops::Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::Negate(Box::new(self))
    }
}

/// Sort key for `order_by`
#[derive(Debug, Clone, PartialEq)]
pub struct SortExpr {
    pub expr: Expr,
    pub ascending: bool,
    pub nulls_first: bool,
}

impl From<&str> for SortExpr {
    fn from(name: &str) -> Self {
        col(name).asc()
    }
}

impl From<Expr> for SortExpr {
    fn from(e: Expr) -> Self {
        e.asc()
    }
}

fn numeric_f64(c: &Column) -> Result<Vec<Option<f64>>> {
    match c {
        Column::Int64(v) => Ok(v.iter().map(|x| x.map(|x| x as f64)).collect()),
        Column::Float64(v) => Ok(v.clone()),
        Column::Str(_) => match c.cast(ColumnType::Float64) {
            Column::Float64(v) => Ok(v),
            _ => unreachable!("cast to double yields a double column"),
        },
        Column::Bool(_) => Err(ProcessorError::TypeMismatch(
            "arithmetic on boolean column".into(),
        )),
    }
}

fn arithmetic(op: BinaryOp, l: &Column, r: &Column) -> Result<Column> {
    if let (Column::Int64(a), Column::Int64(b)) = (l, r) {
        if op != BinaryOp::Divide {
            let out = a
                .iter()
                .zip(b)
                .map(|(x, y)| {
                    let (x, y) = ((*x)?, (*y)?);
                    match op {
                        BinaryOp::Add => x.checked_add(y),
                        BinaryOp::Subtract => x.checked_sub(y),
                        BinaryOp::Multiply => x.checked_mul(y),
                        _ => x.checked_rem(y),
                    }
                })
                .collect();
            return Ok(Column::Int64(out));
        }
    }

    let a = numeric_f64(l)?;
    let b = numeric_f64(r)?;
    let out = a
        .iter()
        .zip(&b)
        .map(|(x, y)| {
            let (x, y) = ((*x)?, (*y)?);
            match op {
                BinaryOp::Add => Some(x + y),
                BinaryOp::Subtract => Some(x - y),
                BinaryOp::Multiply => Some(x * y),
                BinaryOp::Divide if y == 0.0 => None,
                BinaryOp::Divide => Some(x / y),
                _ if y == 0.0 => None,
                _ => Some(x % y),
            }
        })
        .collect();
    Ok(Column::Float64(out))
}

/// Bring both sides of a comparison to a common type
fn coerce_pair(l: &Column, r: &Column) -> Result<(Column, Column)> {
    let (lt, rt) = (l.column_type(), r.column_type());
    if lt == rt {
        return Ok((l.clone(), r.clone()));
    }
    let target = match (lt, rt) {
        (a, b) if a.is_numeric() && b.is_numeric() => ColumnType::Float64,
        (ColumnType::Str, b) if b.is_numeric() => ColumnType::Float64,
        (a, ColumnType::Str) if a.is_numeric() => ColumnType::Float64,
        (ColumnType::Str, ColumnType::Bool) | (ColumnType::Bool, ColumnType::Str) => {
            ColumnType::Bool
        }
        _ => {
            return Err(ProcessorError::TypeMismatch(format!(
                "cannot compare {} with {}",
                lt, rt
            )));
        }
    };
    Ok((l.cast(target), r.cast(target)))
}

fn comparison(op: BinaryOp, l: &Column, r: &Column) -> Result<Column> {
    let (l, r) = coerce_pair(l, r)?;
    let out: Vec<Option<bool>> = match (&l, &r) {
        (Column::Int64(a), Column::Int64(b)) => a
            .iter()
            .zip(b)
            .map(|(x, y)| Some(op.holds((*x)?.cmp(&(*y)?))))
            .collect(),
        (Column::Float64(a), Column::Float64(b)) => a
            .iter()
            .zip(b)
            .map(|(x, y)| Some(op.holds((*x)?.total_cmp(&(*y)?))))
            .collect(),
        (Column::Bool(a), Column::Bool(b)) => a
            .iter()
            .zip(b)
            .map(|(x, y)| Some(op.holds((*x)?.cmp(&(*y)?))))
            .collect(),
        (Column::Str(a), Column::Str(b)) => a
            .iter()
            .zip(b)
            .map(|(x, y)| Some(op.holds(x.as_ref()?.cmp(y.as_ref()?))))
            .collect(),
        _ => unreachable!("coerce_pair returns columns of one type"),
    };
    Ok(Column::Bool(out))
}

fn logical(op: BinaryOp, l: &Column, r: &Column) -> Result<Column> {
    let (Column::Bool(a), Column::Bool(b)) = (l, r) else {
        return Err(ProcessorError::TypeMismatch(format!(
            "{} expects boolean operands, got {} and {}",
            op.symbol(),
            l.column_type(),
            r.column_type()
        )));
    };
    let out = a
        .iter()
        .zip(b)
        .map(|(x, y)| match (op, x, y) {
            (BinaryOp::And, Some(false), _) | (BinaryOp::And, _, Some(false)) => Some(false),
            (BinaryOp::And, Some(true), Some(true)) => Some(true),
            (BinaryOp::Or, Some(true), _) | (BinaryOp::Or, _, Some(true)) => Some(true),
            (BinaryOp::Or, Some(false), Some(false)) => Some(false),
            _ => None,
        })
        .collect();
    Ok(Column::Bool(out))
}

fn scalar_function(func: ScalarFunction, args: &[Arc<Column>], rows: usize) -> Result<Column> {
    let first = &args[0];
    let out = match func {
        ScalarFunction::Sqrt => Column::Float64(
            numeric_f64(first)?
                .into_iter()
                .map(|x| x.map(f64::sqrt))
                .collect(),
        ),
        ScalarFunction::Abs => match &**first {
            Column::Int64(v) => Column::Int64(v.iter().map(|x| x.and_then(i64::checked_abs)).collect()),
            other => Column::Float64(
                numeric_f64(other)?
                    .into_iter()
                    .map(|x| x.map(f64::abs))
                    .collect(),
            ),
        },
        ScalarFunction::Round => {
            let scale = match args.get(1) {
                Some(c) if rows > 0 => c.get(0).as_i64().ok_or_else(|| {
                    ProcessorError::TypeMismatch("round scale must be an integer".into())
                })?,
                _ => 0,
            };
            match &**first {
                Column::Int64(v) if scale >= 0 => Column::Int64(v.clone()),
                other => {
                    let factor = 10f64.powi(scale as i32);
                    Column::Float64(
                        numeric_f64(other)?
                            .into_iter()
                            .map(|x| x.map(|x| (x * factor).round() / factor))
                            .collect(),
                    )
                }
            }
        }
        ScalarFunction::Floor | ScalarFunction::Ceil => match &**first {
            Column::Int64(v) => Column::Int64(v.clone()),
            other => Column::Int64(
                numeric_f64(other)?
                    .into_iter()
                    .map(|x| {
                        x.filter(|f| f.is_finite()).map(|f| {
                            if func == ScalarFunction::Floor {
                                f.floor() as i64
                            } else {
                                f.ceil() as i64
                            }
                        })
                    })
                    .collect(),
            ),
        },
        ScalarFunction::Pow => {
            let base = numeric_f64(first)?;
            let exp = numeric_f64(&args[1])?;
            Column::Float64(
                base.iter()
                    .zip(&exp)
                    .map(|(b, e)| Some((*b)?.powf((*e)?)))
                    .collect(),
            )
        }
        ScalarFunction::Upper | ScalarFunction::Lower => match first.cast(ColumnType::Str) {
            Column::Str(v) => Column::Str(
                v.into_iter()
                    .map(|s| {
                        s.map(|s| {
                            if func == ScalarFunction::Upper {
                                s.to_uppercase()
                            } else {
                                s.to_lowercase()
                            }
                        })
                    })
                    .collect(),
            ),
            _ => unreachable!("cast to string yields a string column"),
        },
        ScalarFunction::Length => match first.cast(ColumnType::Str) {
            Column::Str(v) => Column::Int64(
                v.iter()
                    .map(|s| s.as_ref().map(|s| s.chars().count() as i64))
                    .collect(),
            ),
            _ => unreachable!("cast to string yields a string column"),
        },
        ScalarFunction::Coalesce => {
            let values = (0..rows)
                .map(|i| {
                    args.iter()
                        .map(|c| c.get(i))
                        .find(|v| !v.is_null())
                        .unwrap_or(Value::Null)
                })
                .collect();
            Column::from_values(values)?
        }
    };
    Ok(out)
}

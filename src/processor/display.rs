//! Fixed-width table rendering for `show`

use crate::processor::dataframe::DataFrame;
use crate::processor::Value;

/// Cells longer than this are cut when truncation is on
pub const TRUNCATE_WIDTH: usize = 20;

/// Render a double the way the JVM prints it: `114.0`, `0.5`, `1.0E7`, `1.5E-4`
pub fn format_double(v: f64) -> String {
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    let abs = v.abs();
    if v == 0.0 || (1e-3..1e7).contains(&abs) {
        let s = format!("{}", v);
        if s.contains('.') { s } else { format!("{}.0", s) }
    } else {
        let s = format!("{:e}", v);
        match s.split_once('e') {
            Some((mantissa, exp)) if mantissa.contains('.') => format!("{}E{}", mantissa, exp),
            Some((mantissa, exp)) => format!("{}.0E{}", mantissa, exp),
            None => s,
        }
    }
}

fn cell(value: &Value, truncate: bool) -> String {
    let s = value.to_string();
    if truncate && s.chars().count() > TRUNCATE_WIDTH {
        let head: String = s.chars().take(TRUNCATE_WIDTH - 3).collect();
        format!("{}...", head)
    } else {
        s
    }
}

/// Render up to `n` rows as a bordered, right-aligned table
pub fn show_string(df: &DataFrame, n: usize, truncate: bool) -> String {
    let shown = n.min(df.count());
    let header: Vec<String> = df.schema().fields().iter().map(|f| f.name.clone()).collect();
    let rows: Vec<Vec<String>> = (0..shown)
        .map(|r| {
            df.columns()
                .iter()
                .map(|c| cell(&c.get(r), truncate))
                .collect()
        })
        .collect();

    let widths: Vec<usize> = header
        .iter()
        .enumerate()
        .map(|(i, h)| {
            rows.iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(h.chars().count()))
                .max()
                .unwrap_or(0)
                .max(3)
        })
        .collect();

    let border = {
        let mut b = String::from("+");
        for w in &widths {
            b.push_str(&"-".repeat(*w));
            b.push('+');
        }
        b.push('\n');
        b
    };

    let render_row = |cells: &[String]| {
        let mut line = String::from("|");
        for (c, w) in cells.iter().zip(&widths) {
            let pad = w - c.chars().count();
            if truncate {
                line.push_str(&" ".repeat(pad));
                line.push_str(c);
            } else {
                line.push_str(c);
                line.push_str(&" ".repeat(pad));
            }
            line.push('|');
        }
        line.push('\n');
        line
    };

    let mut out = String::new();
    out.push_str(&border);
    out.push_str(&render_row(&header));
    out.push_str(&border);
    for row in &rows {
        out.push_str(&render_row(row));
    }
    out.push_str(&border);
    if df.count() > shown {
        out.push_str(&format!("only showing top {} rows\n", shown));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::column::Column;

    #[test]
    fn test_format_double() {
        assert_eq!(format_double(114.0), "114.0");
        assert_eq!(format_double(0.5), "0.5");
        assert_eq!(format_double(-3.25), "-3.25");
        assert_eq!(format_double(1e7), "1.0E7");
        assert_eq!(format_double(1.5e-4), "1.5E-4");
        assert_eq!(format_double(0.0), "0.0");
        assert_eq!(format_double(f64::NAN), "NaN");
    }

    #[test]
    fn test_parity_table_layout() {
        let df = DataFrame::from_columns(vec![
            ("even", Column::Bool(vec![Some(true), Some(false)])),
            ("avg(z)", Column::Float64(vec![Some(114.0), Some(133.0)])),
        ])
        .unwrap();
        let expected = "\
+-----+------+
| even|avg(z)|
+-----+------+
| true| 114.0|
|false| 133.0|
+-----+------+
";
        assert_eq!(show_string(&df, 20, true), expected);
    }

    #[test]
    fn test_footer_and_truncation() {
        let long = "abcdefghijklmnopqrstuvwxyz".to_string();
        let df = DataFrame::from_columns(vec![(
            "s",
            Column::Str(vec![Some(long), None, Some("x".into())]),
        )])
        .unwrap();
        let out = show_string(&df, 2, true);
        assert!(out.contains("|abcdefghijklmnopq...|"));
        assert!(out.contains("|                null|"));
        assert!(out.ends_with("only showing top 2 rows\n"));
    }
}

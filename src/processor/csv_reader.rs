use memchr::{memchr, memchr_iter};
use memmap2::Mmap;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::processor::column::{Column, ColumnType};
use crate::processor::dataframe::DataFrame;
use crate::processor::schema::{Field, Schema};
use crate::processor::session::{ReadCache, ReadCacheKey};
use crate::processor::{ParseError, ParseSummary, ProcessorError, Result};

/// What to do with rows whose field count differs from the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseMode {
    /// Pad short rows with nulls and cut long ones
    Permissive,
    DropMalformed,
    FailFast,
}

impl ParseMode {
    fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_uppercase().as_str() {
            "PERMISSIVE" => Ok(ParseMode::Permissive),
            "DROPMALFORMED" => Ok(ParseMode::DropMalformed),
            "FAILFAST" => Ok(ParseMode::FailFast),
            _ => Err(ProcessorError::InvalidOption {
                key: "mode".into(),
                value: value.into(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
struct CsvOptions {
    header: bool,
    infer_schema: bool,
    delimiter: u8,
    null_value: Vec<u8>,
    mode: ParseMode,
}

impl CsvOptions {
    fn from_map(options: &BTreeMap<String, String>) -> Result<Self> {
        let mut parsed = CsvOptions {
            header: false,
            infer_schema: false,
            delimiter: b',',
            null_value: Vec::new(),
            mode: ParseMode::Permissive,
        };
        for (key, value) in options {
            match key.as_str() {
                "header" => parsed.header = parse_flag(key, value)?,
                "inferschema" => parsed.infer_schema = parse_flag(key, value)?,
                "sep" | "delimiter" => parsed.delimiter = parse_delimiter(key, value)?,
                "nullvalue" => parsed.null_value = value.as_bytes().to_vec(),
                "mode" => parsed.mode = ParseMode::parse(value)?,
                other => debug!(option = other, "ignoring unknown CSV option"),
            }
        }
        Ok(parsed)
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ProcessorError::InvalidOption {
            key: key.into(),
            value: value.into(),
        }),
    }
}

/// Single-byte separator from a `sep`/`delimiter` option; `\t` and a literal tab both mean tab
pub(crate) fn parse_delimiter(key: &str, value: &str) -> Result<u8> {
    match value {
        "\\t" | "\t" => Ok(b'\t'),
        v if v.len() == 1 && v.is_ascii() => Ok(v.as_bytes()[0]),
        _ => Err(ProcessorError::InvalidOption {
            key: key.into(),
            value: value.into(),
        }),
    }
}

/// Reads CSV sources into a [`DataFrame`]
///
/// # Example
///
/// ```rust,no_run
/// # use columnar_query::processor::csv_reader::DataFrameReader;
/// let batting = DataFrameReader::new()
///     .option("header", "true")
///     .option("inferSchema", "true")
///     .csv("data/baseball/Batting.csv")
///     .unwrap();
/// batting.print_schema();
/// ```
#[derive(Debug, Clone)]
pub struct DataFrameReader {
    format: String,
    options: BTreeMap<String, String>,
    schema: Option<Schema>,
    cache: Option<ReadCache>,
}

impl Default for DataFrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataFrameReader {
    pub fn new() -> Self {
        DataFrameReader {
            format: "csv".to_string(),
            options: BTreeMap::new(),
            schema: None,
            cache: None,
        }
    }

    pub(crate) fn with_cache(cache: Option<ReadCache>) -> Self {
        DataFrameReader {
            cache,
            ..Self::new()
        }
    }

    pub fn format(mut self, format: &str) -> Self {
        self.format = format.to_ascii_lowercase();
        self
    }

    /// Set a reader option. Keys are case-insensitive.
    pub fn option(mut self, key: &str, value: &str) -> Self {
        self.options
            .insert(key.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn options<'a, I>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (key, value) in options {
            self = self.option(key, value);
        }
        self
    }

    /// Use a fixed schema instead of naming and typing columns from the data
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn csv(self, path: impl AsRef<Path>) -> Result<DataFrame> {
        self.format("csv").load(path)
    }

    pub fn load(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        if self.format != "csv" {
            return Err(ProcessorError::UnsupportedFormat(self.format.clone()));
        }
        let files = list_files(path)?;

        let key = match (&self.cache, &self.schema) {
            (Some(_), None) => Some(ReadCacheKey::new(path, &self.options, &files)?),
            _ => None,
        };
        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            let mut cache = cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(df) = cache.get(key) {
                debug!(path = %path.display(), "read cache hit");
                return Ok(df.clone());
            }
        }

        let (df, _) = self.read_files(path, &files)?;

        if let (Some(cache), Some(key)) = (&self.cache, key) {
            cache
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .put(key, df.clone());
        }
        Ok(df)
    }

    /// Load without consulting the cache and report parse statistics
    pub fn load_with_summary(&self, path: impl AsRef<Path>) -> Result<(DataFrame, ParseSummary)> {
        let path = path.as_ref();
        if self.format != "csv" {
            return Err(ProcessorError::UnsupportedFormat(self.format.clone()));
        }
        let files = list_files(path)?;
        self.read_files(path, &files)
    }

    fn read_files(&self, path: &Path, files: &[PathBuf]) -> Result<(DataFrame, ParseSummary)> {
        let opts = CsvOptions::from_map(&self.options)?;
        let prepared = files
            .iter()
            .map(|f| prepare(f, opts.delimiter))
            .collect::<Result<Vec<_>>>()?;

        let num_chunks = (rayon::current_num_threads() * 4).max(1);
        let bodies: Vec<Body> = prepared
            .iter()
            .map(|p| split_body(p, &opts, num_chunks))
            .collect();

        let header = bodies.iter().find_map(|b| b.header.clone());
        let width = match (&self.schema, &header) {
            (Some(schema), _) => schema.len(),
            (None, Some(h)) => h.len(),
            (None, None) => bodies
                .iter()
                .flat_map(|b| &b.chunks)
                .find_map(|c| c.first_row_width(opts.delimiter))
                .unwrap_or(0),
        };
        let chunks: Vec<&Chunk> = bodies.iter().flat_map(|b| &b.chunks).collect();

        let infer = self.schema.is_none() && opts.infer_schema;
        let scans: Vec<ChunkScan> = chunks
            .par_iter()
            .map(|c| scan_chunk(c, width, &opts, infer))
            .collect();

        let mut offsets = Vec::with_capacity(scans.len());
        let mut seen = 0;
        for scan in &scans {
            if let (ParseMode::FailFast, Some((local, found))) = (opts.mode, scan.malformed) {
                return Err(ProcessorError::Malformed {
                    line: seen + local + 1,
                    expected: width,
                    found,
                });
            }
            offsets.push(seen);
            seen += scan.records;
        }

        let fields: Vec<Field> = match &self.schema {
            Some(schema) => schema.fields().to_vec(),
            None => {
                let mut types = vec![Inferred::Null; width];
                for scan in &scans {
                    for (t, s) in types.iter_mut().zip(&scan.types) {
                        *t = t.widen(*s);
                    }
                }
                (0..width)
                    .map(|i| {
                        let name = header
                            .as_ref()
                            .and_then(|h| h.get(i))
                            .filter(|n| !n.is_empty())
                            .cloned()
                            .unwrap_or_else(|| format!("_c{}", i));
                        let column_type = if infer {
                            types[i].column_type()
                        } else {
                            ColumnType::Str
                        };
                        Field::new(name, column_type)
                    })
                    .collect()
            }
        };
        let types: Vec<ColumnType> = fields.iter().map(|f| f.column_type).collect();
        let names: Vec<String> = fields.iter().map(|f| f.name.clone()).collect();

        let parsed: Vec<ChunkColumns> = chunks
            .par_iter()
            .zip(&scans)
            .zip(&offsets)
            .map(|((c, scan), &first)| parse_chunk(c, &types, &names, &opts, first, scan.records))
            .collect();

        let mut summary = ParseSummary::default();
        let mut per_column: Vec<Vec<Column>> = vec![Vec::with_capacity(parsed.len()); width];
        for chunk in parsed {
            summary.rows_processed += chunk.rows;
            summary.rows_dropped += chunk.dropped;
            summary.errors.extend(chunk.errors);
            for (dst, column) in per_column.iter_mut().zip(chunk.columns) {
                dst.push(column);
            }
        }
        let columns = per_column
            .into_iter()
            .zip(&types)
            .map(|(chunks, t)| Column::concat(*t, chunks).map(std::sync::Arc::new))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            path = %path.display(),
            files = files.len(),
            rows = summary.rows_processed,
            dropped = summary.rows_dropped,
            errors = summary.errors.len(),
            "loaded CSV"
        );
        if let Some(first) = summary.errors.first() {
            warn!(
                path = %path.display(),
                errors = summary.errors.len(),
                row = first.row,
                column = %first.column,
                value = %first.value,
                "CSV rows did not parse cleanly"
            );
        }

        let df = DataFrame::new(Schema::new(fields), columns)?;
        Ok((df, summary))
    }
}

/// Files behind a path: the file itself, or the `*.csv` parts of a directory
fn list_files(path: &Path) -> Result<Vec<PathBuf>> {
    if !fs::metadata(path)?.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(path)? {
        let p = entry?.path();
        let hidden = p
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('_') || n.starts_with('.'));
        let is_csv = p
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if !hidden && is_csv && p.is_file() {
            files.push(p);
        }
    }
    if files.is_empty() {
        return Err(ProcessorError::Parse(format!(
            "no CSV files under {}",
            path.display()
        )));
    }
    files.sort();
    Ok(files)
}

/// Raw bytes of one file. Quoted input is handed to the `csv` crate up front.
enum Prepared {
    Mapped(Mmap),
    Records(Vec<csv::ByteRecord>),
    Empty,
}

fn prepare(path: &Path, delimiter: u8) -> Result<Prepared> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(Prepared::Empty);
    }
    // read-only map, dropped before the load returns
    let mmap = unsafe { Mmap::map(&file)? };
    if memchr(b'"', &mmap).is_none() {
        return Ok(Prepared::Mapped(mmap));
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(&mmap[..]);
    let records = reader
        .byte_records()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Prepared::Records(records))
}

enum Chunk<'a> {
    Bytes(&'a [u8]),
    Records(&'a [csv::ByteRecord]),
}

impl<'a> Chunk<'a> {
    /// Call `f` with the fields of every non-blank row
    fn for_each_row(&self, delimiter: u8, mut f: impl FnMut(&[&'a [u8]])) {
        let mut fields: Vec<&'a [u8]> = Vec::new();
        match *self {
            Chunk::Bytes(data) => {
                let mut start = 0;
                while let Some((line, next)) = next_line(data, start) {
                    start = next;
                    if line.is_empty() {
                        continue;
                    }
                    split_fields(line, delimiter, &mut fields);
                    f(&fields);
                }
            }
            Chunk::Records(records) => {
                for record in records {
                    fields.clear();
                    fields.extend(record.iter());
                    f(&fields);
                }
            }
        }
    }

    fn first_row_width(&self, delimiter: u8) -> Option<usize> {
        match *self {
            Chunk::Bytes(data) => {
                let mut start = 0;
                while let Some((line, next)) = next_line(data, start) {
                    if !line.is_empty() {
                        return Some(memchr_iter(delimiter, line).count() + 1);
                    }
                    start = next;
                }
                None
            }
            Chunk::Records(records) => records.first().map(|r| r.len()),
        }
    }
}

/// Line starting at `start` without its `\n` or `\r\n`, and where the next one begins
fn next_line(data: &[u8], start: usize) -> Option<(&[u8], usize)> {
    if start >= data.len() {
        return None;
    }
    let end = memchr(b'\n', &data[start..]).map_or(data.len(), |i| start + i);
    let mut line = &data[start..end];
    if line.last() == Some(&b'\r') {
        line = &line[..line.len() - 1];
    }
    Some((line, end + 1))
}

fn split_fields<'a>(line: &'a [u8], delimiter: u8, fields: &mut Vec<&'a [u8]>) {
    fields.clear();
    let mut field_start = 0;
    for pos in memchr_iter(delimiter, line) {
        fields.push(&line[field_start..pos]);
        field_start = pos + 1;
    }
    fields.push(&line[field_start..]);
}

/// Header fields and body chunks of one file
struct Body<'a> {
    header: Option<Vec<String>>,
    chunks: Vec<Chunk<'a>>,
}

fn split_body<'a>(prepared: &'a Prepared, opts: &CsvOptions, num_chunks: usize) -> Body<'a> {
    match prepared {
        Prepared::Empty => Body {
            header: None,
            chunks: Vec::new(),
        },
        Prepared::Mapped(mmap) => {
            let mut data: &[u8] = &mmap[..];
            let mut header = None;
            if opts.header {
                let mut start = 0;
                while let Some((line, next)) = next_line(data, start) {
                    start = next;
                    if !line.is_empty() {
                        let mut fields = Vec::new();
                        split_fields(line, opts.delimiter, &mut fields);
                        header = Some(
                            fields
                                .iter()
                                .map(|f| String::from_utf8_lossy(f).into_owned())
                                .collect(),
                        );
                        break;
                    }
                }
                data = &data[start.min(data.len())..];
            }
            let chunks = find_chunk_boundaries(data, num_chunks)
                .into_iter()
                .map(|(s, e)| Chunk::Bytes(&data[s..e]))
                .collect();
            Body { header, chunks }
        }
        Prepared::Records(records) => {
            let (header, rows) = match records.split_first() {
                Some((first, rest)) if opts.header => (
                    Some(
                        first
                            .iter()
                            .map(|f| String::from_utf8_lossy(f).into_owned())
                            .collect(),
                    ),
                    rest,
                ),
                _ => (None, &records[..]),
            };
            let size = rows.len() / num_chunks + 1;
            Body {
                header,
                chunks: rows.chunks(size).map(Chunk::Records).collect(),
            }
        }
    }
}

/// Split `data` into roughly equal ranges that end on a newline
fn find_chunk_boundaries(data: &[u8], num_chunks: usize) -> Vec<(usize, usize)> {
    if data.is_empty() {
        return vec![];
    }

    let chunk_size = data.len() / num_chunks;
    let mut boundaries = Vec::with_capacity(num_chunks);
    let mut start = 0;

    for i in 0..num_chunks.saturating_sub(1) {
        let target = ((i + 1) * chunk_size).max(start);
        let end = match memchr(b'\n', &data[target.min(data.len())..]) {
            Some(off) => target + off + 1,
            None => data.len(),
        };
        if start < end {
            boundaries.push((start, end));
        }
        start = end;
        if start >= data.len() {
            break;
        }
    }

    if start < data.len() {
        boundaries.push((start, data.len()));
    }

    boundaries
}

/// Type lattice used by schema inference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Inferred {
    Null,
    Bool,
    Long,
    Double,
    Str,
}

impl Inferred {
    fn widen(self, other: Inferred) -> Inferred {
        match (self, other) {
            (Inferred::Null, x) | (x, Inferred::Null) => x,
            (a, b) if a == b => a,
            (Inferred::Long, Inferred::Double) | (Inferred::Double, Inferred::Long) => {
                Inferred::Double
            }
            _ => Inferred::Str,
        }
    }

    fn column_type(self) -> ColumnType {
        match self {
            Inferred::Bool => ColumnType::Bool,
            Inferred::Long => ColumnType::Int64,
            Inferred::Double => ColumnType::Float64,
            Inferred::Null | Inferred::Str => ColumnType::Str,
        }
    }

    fn of(field: &[u8], null_value: &[u8]) -> Inferred {
        if is_null(field, null_value) {
            Inferred::Null
        } else if atoi_simd::parse::<i64>(field).is_ok() {
            Inferred::Long
        } else if looks_numeric(field) && fast_float::parse::<f64, _>(field).is_ok() {
            Inferred::Double
        } else if parse_bool(field).is_some() {
            Inferred::Bool
        } else {
            Inferred::Str
        }
    }
}

fn is_null(field: &[u8], null_value: &[u8]) -> bool {
    field.is_empty() || field == null_value
}

/// Keeps `inf` and `nan` spellings out of the double type
fn looks_numeric(field: &[u8]) -> bool {
    field
        .iter()
        .find(|b| !matches!(b, b'+' | b'-'))
        .is_some_and(|b| b.is_ascii_digit() || *b == b'.')
}

fn parse_bool(field: &[u8]) -> Option<bool> {
    if field.eq_ignore_ascii_case(b"true") {
        Some(true)
    } else if field.eq_ignore_ascii_case(b"false") {
        Some(false)
    } else {
        None
    }
}

#[derive(Debug, Default)]
struct ChunkScan {
    records: usize,
    types: Vec<Inferred>,
    /// Chunk-local index and field count of the first malformed row
    malformed: Option<(usize, usize)>,
}

fn scan_chunk(chunk: &Chunk, width: usize, opts: &CsvOptions, infer: bool) -> ChunkScan {
    let mut scan = ChunkScan {
        types: vec![Inferred::Null; width],
        ..ChunkScan::default()
    };
    chunk.for_each_row(opts.delimiter, |fields| {
        let malformed = fields.len() != width;
        if malformed && scan.malformed.is_none() {
            scan.malformed = Some((scan.records, fields.len()));
        }
        scan.records += 1;
        if !infer || (malformed && opts.mode == ParseMode::DropMalformed) {
            return;
        }
        for (t, f) in scan.types.iter_mut().zip(fields) {
            *t = t.widen(Inferred::of(f, &opts.null_value));
        }
    });
    scan
}

struct ChunkColumns {
    columns: Vec<Column>,
    rows: usize,
    dropped: usize,
    errors: Vec<ParseError>,
}

fn push_null(column: &mut Column) {
    match column {
        Column::Int64(v) => v.push(None),
        Column::Float64(v) => v.push(None),
        Column::Bool(v) => v.push(None),
        Column::Str(v) => v.push(None),
    }
}

/// Append one field, storing null when it does not parse as the column type
fn push_field(column: &mut Column, field: &[u8], null_value: &[u8]) -> std::result::Result<(), String> {
    if is_null(field, null_value) {
        push_null(column);
        return Ok(());
    }
    match column {
        Column::Int64(v) => match atoi_simd::parse::<i64>(field) {
            Ok(x) => v.push(Some(x)),
            Err(e) => {
                v.push(None);
                return Err(e.to_string());
            }
        },
        Column::Float64(v) => match fast_float::parse::<f64, _>(field) {
            Ok(x) => v.push(Some(x)),
            Err(e) => {
                v.push(None);
                return Err(e.to_string());
            }
        },
        Column::Bool(v) => match parse_bool(field) {
            Some(b) => v.push(Some(b)),
            None => {
                v.push(None);
                return Err("not a boolean".to_string());
            }
        },
        Column::Str(v) => v.push(Some(String::from_utf8_lossy(field).into_owned())),
    }
    Ok(())
}

fn parse_chunk(
    chunk: &Chunk,
    types: &[ColumnType],
    names: &[String],
    opts: &CsvOptions,
    first_row: usize,
    estimated_rows: usize,
) -> ChunkColumns {
    let width = types.len();
    let mut out = ChunkColumns {
        columns: types.iter().map(|t| Column::new_empty(*t)).collect(),
        rows: 0,
        dropped: 0,
        errors: Vec::new(),
    };
    for c in out.columns.iter_mut() {
        reserve(c, estimated_rows);
    }

    let mut local = 0;
    chunk.for_each_row(opts.delimiter, |fields| {
        local += 1;
        let row = first_row + local;
        if fields.len() != width {
            if opts.mode == ParseMode::DropMalformed {
                out.dropped += 1;
                return;
            }
            out.errors.push(ParseError {
                row,
                column: String::new(),
                value: format!("expected {} fields, got {}", width, fields.len()),
                error: None,
            });
        }
        for (i, column) in out.columns.iter_mut().enumerate() {
            match fields.get(i) {
                Some(field) => {
                    if let Err(e) = push_field(column, field, &opts.null_value) {
                        out.errors.push(ParseError {
                            row,
                            column: names[i].clone(),
                            value: String::from_utf8_lossy(field).into_owned(),
                            error: Some(e),
                        });
                    }
                }
                None => push_null(column),
            }
        }
        out.rows += 1;
    });
    out
}

fn reserve(column: &mut Column, additional: usize) {
    match column {
        Column::Int64(v) => v.reserve(additional),
        Column::Float64(v) => v.reserve(additional),
        Column::Bool(v) => v.reserve(additional),
        Column::Str(v) => v.reserve(additional),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::Value;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn csv_file(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn reader() -> DataFrameReader {
        DataFrameReader::new()
            .option("header", "true")
            .option("inferSchema", "true")
    }

    #[test]
    fn test_infer_schema_widens_over_all_rows() {
        let file = csv_file("id,score,flag,name,empty\n1,2,true,a,\n2,2.5,false,b,\n3,,TRUE,7,\n");
        let df = reader().csv(file.path()).unwrap();
        let types: Vec<ColumnType> = df.schema().fields().iter().map(|f| f.column_type).collect();
        assert_eq!(
            types,
            vec![
                ColumnType::Int64,
                ColumnType::Float64,
                ColumnType::Bool,
                ColumnType::Str,
                ColumnType::Str
            ]
        );
        assert_eq!(
            df.column_values("score").unwrap(),
            vec![Value::Float(2.0), Value::Float(2.5), Value::Null]
        );
    }

    #[test]
    fn test_without_header_or_inference() {
        let file = csv_file("1,x\r\n\r\n2,y\r\n");
        let df = DataFrameReader::new().csv(file.path()).unwrap();
        assert_eq!(df.column_names(), vec!["_c0", "_c1"]);
        assert_eq!(
            df.column_values("_c0").unwrap(),
            vec![Value::Str("1".into()), Value::Str("2".into())]
        );
    }

    #[test]
    fn test_quoted_fields_go_through_csv_crate() {
        let file = csv_file("name,R\n\"Smith, John\",4\n\"O\"\"Neil\",5\n");
        let df = reader().csv(file.path()).unwrap();
        assert_eq!(
            df.column_values("name").unwrap(),
            vec![Value::Str("Smith, John".into()), Value::Str("O\"Neil".into())]
        );
        assert_eq!(df.column_values("R").unwrap()[1], Value::Int(5));
    }

    #[test]
    fn test_malformed_modes() {
        let file = csv_file("a,b\n1,2\n3\n4,5,6\n");

        let (df, summary) = reader().load_with_summary(file.path()).unwrap();
        assert_eq!(df.count(), 3);
        assert_eq!(df.column_values("b").unwrap()[1], Value::Null);
        assert_eq!(summary.errors.len(), 2);

        let df = reader().option("mode", "DROPMALFORMED").csv(file.path()).unwrap();
        assert_eq!(df.count(), 1);

        let err = reader().option("mode", "FAILFAST").csv(file.path()).unwrap_err();
        assert!(matches!(
            err,
            ProcessorError::Malformed { line: 2, expected: 2, found: 1 }
        ));
    }

    #[test]
    fn test_null_value_and_separator() {
        let file = csv_file("a;b\nNA;1\n2;NA\n");
        let df = reader()
            .option("sep", ";")
            .option("nullValue", "NA")
            .csv(file.path())
            .unwrap();
        assert_eq!(
            df.column_values("a").unwrap(),
            vec![Value::Null, Value::Int(2)]
        );
    }

    #[test]
    fn test_directory_of_parts_reads_in_name_order() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("part-00001.csv"), "x\n3\n").unwrap();
        fs::write(dir.path().join("part-00000.csv"), "x\n1\n2\n").unwrap();
        fs::write(dir.path().join("_SUCCESS"), "").unwrap();
        let df = reader().csv(dir.path()).unwrap();
        assert_eq!(
            df.column_values("x").unwrap(),
            vec![Value::Int(1), Value::Int(2), Value::Int(3)]
        );
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            reader().csv("/nonexistent/Batting.csv"),
            Err(ProcessorError::Io(_))
        ));
        let file = csv_file("a\n1\n");
        assert!(matches!(
            reader().format("parquet").load(file.path()),
            Err(ProcessorError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            reader().option("header", "maybe").csv(file.path()),
            Err(ProcessorError::InvalidOption { .. })
        ));
    }

    #[test]
    fn test_explicit_schema() {
        let file = csv_file("1,x\n2,y\n");
        let schema = Schema::new(vec![
            Field::new("id", ColumnType::Int64),
            Field::new("tag", ColumnType::Str),
        ]);
        let df = DataFrameReader::new().schema(schema).csv(file.path()).unwrap();
        assert_eq!(df.column_values("id").unwrap(), vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_chunk_boundaries_end_on_newlines() {
        let data = b"aa\nbbbb\nc\ndddddd\ne\n";
        let chunks = find_chunk_boundaries(data, 3);
        assert_eq!(chunks.first().map(|c| c.0), Some(0));
        assert_eq!(chunks.last().map(|c| c.1), Some(data.len()));
        for (_, end) in &chunks {
            assert_eq!(data[end - 1], b'\n');
        }
    }

    #[test]
    fn test_widening_lattice() {
        assert_eq!(Inferred::Long.widen(Inferred::Double), Inferred::Double);
        assert_eq!(Inferred::Null.widen(Inferred::Bool), Inferred::Bool);
        assert_eq!(Inferred::Bool.widen(Inferred::Long), Inferred::Str);
        assert_eq!(Inferred::of(b"inf", b""), Inferred::Str);
        assert_eq!(Inferred::of(b"-1.5e3", b""), Inferred::Double);
    }
}

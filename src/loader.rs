use crate::constants;
use crate::error::{EtlError, Result};
use crate::store::Store;
use crate::table::{Column, ColumnType, Table, Value};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// Outcome of loading one file.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FileOutcome {
    pub file: String,
    pub table: String,
    #[serde(flatten)]
    pub status: LoadStatus,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoadStatus {
    Loaded { rows: usize },
    Failed { error: String },
}

/// Result of a complete directory load
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub data_dir: String,
    pub files: Vec<FileOutcome>,
    pub elapsed_secs: f64,
}

impl LoadReport {
    pub fn loaded(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.status, LoadStatus::Loaded { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.files.len() - self.loaded()
    }

    pub fn errors(&self) -> Vec<String> {
        self.files
            .iter()
            .filter_map(|f| match &f.status {
                LoadStatus::Failed { error } => Some(format!("{}: {}", f.file, error)),
                LoadStatus::Loaded { .. } => None,
            })
            .collect()
    }
}

/// Lists the files in `dir` whose extension is one of `extensions`
/// (case-insensitive), sorted by file name. Subdirectories are not visited.
pub fn discover_files(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let wanted: HashSet<String> = extensions
        .iter()
        .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect();

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| wanted.contains(&e.to_ascii_lowercase()))
            .unwrap_or(false);
        if matches {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Table name for a data file: the file name with its extension stripped.
pub fn table_name_for(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parses a delimited file, choosing the delimiter from its extension.
pub fn parse_file(path: &Path) -> Result<Table> {
    let delimiter = path
        .extension()
        .and_then(|e| e.to_str())
        .map(constants::delimiter_for_extension)
        .unwrap_or(b',');
    parse_reader(File::open(path)?, delimiter)
}

/// Parses delimited text with a header row into a typed table.
///
/// Empty fields become nulls and each column's type is inferred from its
/// fields. Rows with a different field count than the header are errors.
pub fn parse_reader<R: Read>(reader: R, delimiter: u8) -> Result<Table> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    if headers.is_empty() {
        return Err(EtlError::EmptyInput("no header row".to_string()));
    }
    let names = unique_headers(headers.iter());

    let mut raw_columns: Vec<Vec<String>> = vec![Vec::new(); names.len()];
    for record in rdr.records() {
        let record = record?;
        for (column, field) in raw_columns.iter_mut().zip(record.iter()) {
            column.push(field.to_string());
        }
    }

    let row_count = raw_columns.first().map(Vec::len).unwrap_or(0);
    let mut columns = Vec::with_capacity(names.len());
    let mut typed_columns = Vec::with_capacity(names.len());
    for (name, fields) in names.into_iter().zip(raw_columns) {
        let (dtype, values) = type_fields(fields);
        columns.push(Column::new(name, dtype));
        typed_columns.push(values);
    }

    let mut rows: Vec<Vec<Value>> = (0..row_count)
        .map(|_| Vec::with_capacity(columns.len()))
        .collect();
    for values in typed_columns {
        for (row, value) in rows.iter_mut().zip(values) {
            row.push(value);
        }
    }
    Ok(Table::new(columns, rows))
}

/// Blank headers become `Unnamed: <index>`; repeats get `.1`, `.2`, ...
fn unique_headers<'a, I>(headers: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut names = Vec::new();

    for (idx, header) in headers.into_iter().enumerate() {
        let base = if header.trim().is_empty() {
            format!("Unnamed: {idx}")
        } else {
            header.to_string()
        };
        let mut candidate = base.clone();
        while seen.contains(&candidate) {
            let n = counts.entry(base.clone()).or_insert(0);
            *n += 1;
            candidate = format!("{base}.{n}");
        }
        seen.insert(candidate.clone());
        names.push(candidate);
    }
    names
}

fn parse_field(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Value::Null
    } else if let Ok(i) = trimmed.parse::<i64>() {
        Value::Integer(i)
    } else if let Ok(f) = trimmed.parse::<f64>() {
        Value::Real(f)
    } else {
        Value::Text(raw.to_string())
    }
}

/// Infers a column type from raw fields and converts them to it. Text
/// columns keep every non-empty field verbatim.
fn type_fields(fields: Vec<String>) -> (ColumnType, Vec<Value>) {
    let parsed: Vec<Value> = fields.iter().map(|f| parse_field(f)).collect();
    let dtype = ColumnType::infer(&parsed);
    let values = match dtype {
        ColumnType::Integer => parsed,
        ColumnType::Real => parsed
            .into_iter()
            .map(|v| match v {
                Value::Integer(i) => Value::Real(i as f64),
                other => other,
            })
            .collect(),
        ColumnType::Text => fields
            .into_iter()
            .zip(parsed)
            .map(|(raw, v)| match v {
                Value::Null => Value::Null,
                _ => Value::Text(raw),
            })
            .collect(),
    };
    (dtype, values)
}

/// Parses one file and replaces its table in the store. Returns the table
/// name and the number of rows written.
pub fn load_file<S: Store>(store: &mut S, path: &Path) -> Result<(String, usize)> {
    let table_name = table_name_for(path).ok_or_else(|| {
        EtlError::EmptyInput(format!("cannot derive a table name from {}", path.display()))
    })?;
    let table = parse_file(path)?;
    store.replace_table(&table_name, &table)?;
    Ok((table_name, table.row_count()))
}

/// Loads every recognized file in `dir`, one table per file.
///
/// A file that fails to parse or persist is logged and recorded in the
/// report; the remaining files are still loaded. Only an unreadable
/// directory fails the whole call.
#[instrument(skip_all, fields(data_dir = %dir.display()))]
pub fn load_directory<S: Store>(
    store: &mut S,
    dir: &Path,
    extensions: &[String],
) -> Result<LoadReport> {
    let start = Instant::now();
    let files = discover_files(dir, extensions)?;
    if files.is_empty() {
        warn!("No files matching {:?} found in {}", extensions, dir.display());
    }

    let mut outcomes = Vec::with_capacity(files.len());
    for path in files {
        let file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let table = table_name_for(&path).unwrap_or_default();
        info!("Ingesting {} into the store...", file);

        let status = match load_file(store, &path) {
            Ok((table_name, rows)) => {
                info!(table = %table_name, rows, "Successfully ingested {}", table_name);
                LoadStatus::Loaded { rows }
            }
            Err(e) => {
                error!("Error while ingesting {}: {}", file, e);
                LoadStatus::Failed {
                    error: e.to_string(),
                }
            }
        };
        outcomes.push(FileOutcome {
            file,
            table,
            status,
        });
    }

    let elapsed = start.elapsed().as_secs_f64();
    info!("-------------------Ingestion Complete-------------------");
    info!("Total Time Taken: {:.2} minutes", elapsed / 60.0);

    Ok(LoadReport {
        data_dir: dir.display().to_string(),
        files: outcomes,
        elapsed_secs: elapsed,
    })
}

use crate::error::{EtlError, Result};
use sha2::{Digest, Sha256};
use std::fmt;

/// A single cell, mirroring SQLite's storage classes minus blobs.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    /// Numeric view of the cell. Nulls and text have none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(f) => Some(*f),
            Value::Null | Value::Text(_) => None,
        }
    }

    /// Null, or a real that is NaN. Both count as missing when filling.
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Real(f) => f.is_nan(),
            _ => false,
        }
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, Value::Real(f) if f.is_infinite())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    /// Declared type used when the column is written to the store.
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }

    pub fn zero(&self) -> Value {
        match self {
            ColumnType::Integer => Value::Integer(0),
            ColumnType::Real => Value::Real(0.0),
            ColumnType::Text => Value::Text("0".to_string()),
        }
    }

    /// Infers a column type from its cells.
    ///
    /// Integers with at least one null widen to `Real`, any text makes the
    /// whole column `Text`, and a column made only of nulls is `Real`. An
    /// empty column (no cells at all) is `Text`.
    pub fn infer<'a, I>(values: I) -> ColumnType
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let mut seen_any = false;
        let (mut int, mut real, mut text, mut null) = (false, false, false, false);
        for value in values {
            seen_any = true;
            match value {
                Value::Null => null = true,
                Value::Integer(_) => int = true,
                Value::Real(_) => real = true,
                Value::Text(_) => text = true,
            }
        }

        if !seen_any || text {
            ColumnType::Text
        } else if real || null || !int {
            ColumnType::Real
        } else {
            ColumnType::Integer
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub dtype: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, dtype: ColumnType) -> Self {
        Self {
            name: name.into(),
            dtype,
        }
    }
}

/// Row-major, named and typed table: the unit exchanged between files, the
/// store and the summary transforms.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Self {
        debug_assert!(rows.iter().all(|r| r.len() == columns.len()));
        Self { columns, rows }
    }

    /// Builds a table from untyped rows, inferring each column's type and
    /// widening integers to reals in `Real` columns.
    pub fn from_rows(names: Vec<String>, mut rows: Vec<Vec<Value>>) -> Self {
        let columns: Vec<Column> = names
            .into_iter()
            .enumerate()
            .map(|(idx, name)| {
                let dtype = ColumnType::infer(rows.iter().map(|row| &row[idx]));
                Column::new(name, dtype)
            })
            .collect();

        for (idx, column) in columns.iter().enumerate() {
            if column.dtype == ColumnType::Real {
                for row in rows.iter_mut() {
                    if let Value::Integer(i) = row[idx] {
                        row[idx] = Value::Real(i as f64);
                    }
                }
            }
        }

        Self { columns, rows }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| EtlError::MissingColumn(name.to_string()))
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        let idx = self.column_index(name)?;
        Ok(&self.columns[idx])
    }

    pub fn get(&self, row: usize, name: &str) -> Option<&Value> {
        let idx = self.column_index(name).ok()?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// Numeric values of one column, with anything non-numeric read as NaN.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>> {
        let idx = self.column_index(name)?;
        Ok(self
            .rows
            .iter()
            .map(|row| row[idx].as_f64().unwrap_or(f64::NAN))
            .collect())
    }

    /// Converts every cell of a column to `target`, failing on the first
    /// cell that cannot be represented.
    pub fn cast_column(&mut self, name: &str, target: ColumnType) -> Result<()> {
        let idx = self.column_index(name)?;
        for row in self.rows.iter_mut() {
            let cell = std::mem::replace(&mut row[idx], Value::Null);
            row[idx] = cast_value(cell, target).map_err(|detail| EtlError::Coercion {
                column: name.to_string(),
                target: target.sql_type(),
                detail,
            })?;
        }
        self.columns[idx].dtype = target;
        Ok(())
    }

    /// Strips leading and trailing whitespace from the text cells of a column.
    pub fn trim_text(&mut self, name: &str) -> Result<()> {
        let idx = self.column_index(name)?;
        for row in self.rows.iter_mut() {
            if let Value::Text(s) = &mut row[idx] {
                let trimmed = s.trim();
                if trimmed.len() != s.len() {
                    *s = trimmed.to_string();
                }
            }
        }
        Ok(())
    }

    /// Replaces the named column, or appends it when it does not exist yet.
    pub fn set_real_column(&mut self, name: &str, values: Vec<f64>) {
        debug_assert_eq!(values.len(), self.rows.len());
        let idx = match self.column_index(name) {
            Ok(idx) => {
                self.columns[idx].dtype = ColumnType::Real;
                idx
            }
            Err(_) => {
                self.columns.push(Column::new(name, ColumnType::Real));
                for row in self.rows.iter_mut() {
                    row.push(Value::Null);
                }
                self.columns.len() - 1
            }
        };
        for (row, value) in self.rows.iter_mut().zip(values) {
            row[idx] = Value::Real(value);
        }
    }

    /// Replaces positive and negative infinity anywhere in the table with
    /// the zero of the owning column's type. Returns the number of cells
    /// rewritten.
    pub fn replace_infinite(&mut self) -> usize {
        self.sweep(Value::is_infinite)
    }

    /// Replaces nulls and NaNs anywhere in the table with zero.
    pub fn fill_missing(&mut self) -> usize {
        self.sweep(Value::is_missing)
    }

    fn sweep(&mut self, matches: fn(&Value) -> bool) -> usize {
        let mut replaced = 0;
        for row in self.rows.iter_mut() {
            for (cell, column) in row.iter_mut().zip(&self.columns) {
                if matches(cell) {
                    *cell = column.dtype.zero();
                    replaced += 1;
                }
            }
        }
        replaced
    }

    pub fn head(&self, n: usize) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// SHA-256 over names, types and every cell. Equal fingerprints mean the
    /// tables hold the same content in the same order.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for column in &self.columns {
            hasher.update(column.name.as_bytes());
            hasher.update([0x1f]);
            hasher.update(column.dtype.sql_type().as_bytes());
            hasher.update([0x1e]);
        }
        for row in &self.rows {
            for cell in row {
                match cell {
                    Value::Null => hasher.update([0u8]),
                    Value::Integer(i) => {
                        hasher.update([1u8]);
                        hasher.update(i.to_le_bytes());
                    }
                    Value::Real(f) => {
                        hasher.update([2u8]);
                        hasher.update(f.to_bits().to_le_bytes());
                    }
                    Value::Text(s) => {
                        hasher.update([3u8]);
                        hasher.update((s.len() as u64).to_le_bytes());
                        hasher.update(s.as_bytes());
                    }
                }
            }
            hasher.update([0x1d]);
        }
        hex::encode(hasher.finalize())
    }

    /// Rows as JSON objects keyed by column name.
    pub fn to_json_rows(&self) -> Vec<serde_json::Value> {
        self.rows
            .iter()
            .map(|row| {
                let object = self
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(column, cell)| {
                        let value = match cell {
                            Value::Null => serde_json::Value::Null,
                            Value::Integer(i) => serde_json::Value::from(*i),
                            Value::Real(f) => serde_json::Number::from_f64(*f)
                                .map(serde_json::Value::Number)
                                .unwrap_or(serde_json::Value::Null),
                            Value::Text(s) => serde_json::Value::String(s.clone()),
                        };
                        (column.name.clone(), value)
                    })
                    .collect::<serde_json::Map<_, _>>();
                serde_json::Value::Object(object)
            })
            .collect()
    }
}

fn cast_value(cell: Value, target: ColumnType) -> std::result::Result<Value, String> {
    match (target, cell) {
        (ColumnType::Real, Value::Integer(i)) => Ok(Value::Real(i as f64)),
        (ColumnType::Real, Value::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Value::Real)
            .map_err(|_| format!("could not parse '{s}' as a number")),
        (ColumnType::Integer, Value::Null) => Err("missing value".to_string()),
        (ColumnType::Integer, Value::Real(f)) => {
            if f.is_finite() {
                Ok(Value::Integer(f.trunc() as i64))
            } else {
                Err(format!("non-finite value {f}"))
            }
        }
        (ColumnType::Integer, Value::Text(s)) => s
            .trim()
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| format!("could not parse '{s}' as an integer")),
        (ColumnType::Text, Value::Integer(i)) => Ok(Value::Text(i.to_string())),
        (ColumnType::Text, Value::Real(f)) => Ok(Value::Text(f.to_string())),
        (_, cell) => Ok(cell),
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect();
        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                rendered
                    .iter()
                    .map(|row| row[idx].chars().count())
                    .chain(std::iter::once(column.name.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let header: Vec<String> = self
            .columns
            .iter()
            .zip(&widths)
            .map(|(column, w)| format!("{:<w$}", column.name, w = *w))
            .collect();
        writeln!(f, "{}", header.join("  ").trim_end())?;
        for row in &rendered {
            let line: Vec<String> = row
                .iter()
                .zip(&widths)
                .map(|(cell, w)| format!("{:<w$}", cell, w = *w))
                .collect();
            writeln!(f, "{}", line.join("  ").trim_end())?;
        }
        write!(f, "[{} rows x {} columns]", self.rows.len(), self.columns.len())
    }
}

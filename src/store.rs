use crate::error::{EtlError, Result};
use crate::table::{Table, Value};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Name of the lenient numeric cast available to every query.
pub const TRY_REAL_FN: &str = "try_real";

/// The relational store both jobs read from and write to.
pub trait Store {
    /// Runs a read query and returns the full result.
    fn query(&self, sql: &str) -> Result<Table>;

    /// Drops `name` if it exists and recreates it holding exactly `table`.
    fn replace_table(&mut self, name: &str, table: &Table) -> Result<()>;

    /// Runs one parameterized statement, returning the affected row count.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<usize>;

    fn execute_batch(&self, sql: &str) -> Result<()>;

    fn table_names(&self) -> Result<Vec<String>>;
}

/// SQLite-backed store. The connection lives as long as the handle and is
/// closed when it is dropped.
pub struct SqliteStore {
    conn: Connection,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("conn", &"<rusqlite::Connection>")
            .finish()
    }
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        debug!("Opening SQLite store at {}", path.display());
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.create_scalar_function(
            TRY_REAL_FN,
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| Ok(try_real(ctx.get_raw(0))),
        )?;
        Ok(Self { conn })
    }
}

impl Store for SqliteStore {
    fn query(&self, sql: &str) -> Result<Table> {
        let mut stmt = self.conn.prepare(sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = names.len();

        let mut rows = stmt.query([])?;
        let mut values = Vec::new();
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(width);
            for idx in 0..width {
                cells.push(Value::from(row.get_ref(idx)?));
            }
            values.push(cells);
        }
        Ok(Table::from_rows(names, values))
    }

    fn replace_table(&mut self, name: &str, table: &Table) -> Result<()> {
        if table.columns().is_empty() {
            return Err(EtlError::EmptyInput(format!("table '{name}' has no columns")));
        }
        let ident = quote_ident(name);
        let definitions = table
            .columns()
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.dtype.sql_type()))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=table.columns().len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");

        // One transaction so a failed write keeps the previous table.
        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {ident};\nCREATE TABLE {ident} ({definitions});"
        ))?;
        {
            let mut insert = tx.prepare(&format!("INSERT INTO {ident} VALUES ({placeholders})"))?;
            for row in table.rows() {
                insert.execute(params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;
        debug!(table = name, rows = table.row_count(), "Replaced table");
        Ok(())
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        Ok(self.conn.execute(sql, params_from_iter(params.iter()))?)
    }

    fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn table_names(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }
}

/// Parse-or-null numeric conversion used inside aggregation queries.
///
/// Integers and finite reals pass through. Text is trimmed and parsed; text
/// that does not parse, or parses to infinity or NaN, is null, as are nulls
/// and blobs. Nulls drop out of `SUM` and make comparisons false, so bad
/// cells vanish from sums and filters instead of failing the query.
pub fn try_real(value: ValueRef<'_>) -> Option<f64> {
    match value {
        ValueRef::Integer(i) => Some(i as f64),
        ValueRef::Real(f) => Some(f).filter(|f| f.is_finite()),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|f| f.is_finite()),
        ValueRef::Null | ValueRef::Blob(_) => None,
    }
}

/// Double-quotes an SQL identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                Value::Text(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Integer(i) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

//! SQLite outlet database.

use crate::error::{BaristaError, Result};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS outlets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    outlet_name TEXT,
    address TEXT,
    operating_hours TEXT,
    services TEXT
);
"#;

/// One outlet row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outlet {
    pub outlet_name: String,
    pub address: String,
    pub operating_hours: String,
    pub services: String,
}

/// A column value from a query result.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(usize),
}

impl std::fmt::Display for SqlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlValue::Null => write!(f, "None"),
            SqlValue::Integer(i) => write!(f, "{}", i),
            SqlValue::Real(r) => write!(f, "{}", r),
            SqlValue::Text(t) => f.write_str(&quote_text(t)),
            SqlValue::Blob(len) => write!(f, "<blob {} bytes>", len),
        }
    }
}

/// Quote text as a repr-style literal: single quotes unless the text
/// contains a single quote and no double quote.
fn quote_text(text: &str) -> String {
    let quote = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push(quote);
    for c in text.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c if c == quote => {
                quoted.push('\\');
                quoted.push(c);
            }
            c => quoted.push(c),
        }
    }
    quoted.push(quote);
    quoted
}

impl From<ValueRef<'_>> for SqlValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(i) => SqlValue::Integer(i),
            ValueRef::Real(r) => SqlValue::Real(r),
            ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => SqlValue::Blob(b.len()),
        }
    }
}

/// Render rows as a list of tuples, e.g. `[('Mid Valley', 1), ('KLCC', 2)]`.
pub fn format_rows(rows: &[Vec<SqlValue>]) -> String {
    let rendered = rows
        .iter()
        .map(|row| {
            let values = row.iter().map(|v| v.to_string()).collect::<Vec<_>>();
            if values.len() == 1 {
                format!("({},)", values[0])
            } else {
                format!("({})", values.join(", "))
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{}]", rendered)
}

/// Outlet database. Runs only read-only statements.
pub struct OutletStore {
    conn: Mutex<Connection>,
}

impl OutletStore {
    /// Open an existing database file read-only.
    #[instrument(skip_all)]
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(BaristaError::OutletStore(format!(
                "database not found at {}",
                path.display()
            )));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        info!("Opened outlet database at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database with the outlet schema (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create a database file with the outlet schema and rows.
    pub fn create_at(path: &Path, outlets: &[Outlet]) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        for outlet in outlets {
            insert_row(&conn, outlet)?;
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| BaristaError::OutletStore("connection lock poisoned".to_string()))
    }

    /// Insert an outlet, returning its id.
    pub fn insert(&self, outlet: &Outlet) -> Result<i64> {
        let conn = self.lock()?;
        insert_row(&conn, outlet)?;
        Ok(conn.last_insert_rowid())
    }

    /// CREATE statements of the user tables, for the SQL prompt.
    pub fn schema(&self) -> Result<String> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let statements = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(statements.join("\n\n"))
    }

    /// Run a single read-only statement and return its rows.
    #[instrument(skip(self))]
    pub fn query(&self, sql: &str) -> Result<Vec<Vec<SqlValue>>> {
        let conn = self.lock()?;
        // prepare() refuses trailing statements
        let mut stmt = conn.prepare(sql)?;
        if !stmt.readonly() {
            return Err(BaristaError::UnsafeSql(
                "statement would modify the database".to_string(),
            ));
        }

        let column_count = stmt.column_count();
        let mut rows = stmt.query([])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                values.push(SqlValue::from(row.get_ref(i)?));
            }
            results.push(values);
        }

        debug!("Query returned {} rows", results.len());
        Ok(results)
    }
}

fn insert_row(conn: &Connection, outlet: &Outlet) -> Result<()> {
    conn.execute(
        "INSERT INTO outlets (outlet_name, address, operating_hours, services) VALUES (?1, ?2, ?3, ?4)",
        params![
            outlet.outlet_name,
            outlet.address,
            outlet.operating_hours,
            outlet.services
        ],
    )?;
    Ok(())
}

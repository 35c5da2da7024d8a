use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, InterruptHandle, OpenFlags, Row};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::{parse_numeric, MetricSource, QueryRow};
use crate::error::QueryFailure;

/// SQLite-backed source, used for local runs and fixture databases.
///
/// Statements run on the blocking pool. Dropping a `fetch_row` future before
/// it resolves (a timeout, an aborted join) interrupts the statement so the
/// connection is free for the next invocation.
pub struct SqliteSource {
    conn: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
    name: String,
}

impl SqliteSource {
    /// Opens an existing database file read-only.
    pub fn open(path: impl AsRef<Path>) -> rusqlite::Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI,
        )?;
        Ok(Self::wrap(conn, format!("sqlite:{}", path.display())))
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::wrap(conn, "sqlite::memory:".to_string()))
    }

    fn wrap(conn: Connection, name: String) -> Self {
        Self {
            interrupt: Arc::new(conn.get_interrupt_handle()),
            conn: Arc::new(Mutex::new(conn)),
            name,
        }
    }

    /// Runs a batch of statements, e.g. to seed an in-memory fixture.
    pub fn execute_batch(&self, sql: &str) -> rusqlite::Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| rusqlite::Error::InvalidQuery)?;
        conn.execute_batch(sql)
    }
}

/// Cancels a blocking statement when its caller stops waiting. Tasks still
/// queued on the connection lock see the flag and never start.
struct CancelOnDrop {
    interrupt: Arc<InterruptHandle>,
    cancelled: Arc<AtomicBool>,
    armed: bool,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.cancelled.store(true, Ordering::SeqCst);
            self.interrupt.interrupt();
        }
    }
}

fn sql_error(e: rusqlite::Error) -> QueryFailure {
    QueryFailure::Sql(e.to_string())
}

fn text_column(row: &Row<'_>, index: usize, column: &'static str) -> Result<String, QueryFailure> {
    match row.get_ref(index).map_err(sql_error)? {
        ValueRef::Text(text) => Ok(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Null => Err(QueryFailure::Sql(format!("column `{}` is NULL", column))),
        other => Err(QueryFailure::Sql(format!(
            "column `{}` is not text ({:?})",
            column,
            other.data_type()
        ))),
    }
}

fn read_first_row(conn: &Connection, sql: &str) -> Result<Option<QueryRow>, QueryFailure> {
    let mut stmt = conn.prepare(sql).map_err(sql_error)?;

    let metric_idx = stmt
        .column_index("metric")
        .map_err(|_| QueryFailure::MissingColumn("metric"))?;
    let label_idx = stmt
        .column_index("label")
        .map_err(|_| QueryFailure::MissingColumn("label"))?;
    let unit_idx = stmt
        .column_index("unit")
        .map_err(|_| QueryFailure::MissingColumn("unit"))?;

    let mut rows = stmt.query([]).map_err(sql_error)?;
    let row = match rows.next().map_err(sql_error)? {
        Some(row) => row,
        None => return Ok(None),
    };

    let metric = match row.get_ref(metric_idx).map_err(sql_error)? {
        ValueRef::Null => None,
        ValueRef::Integer(v) => Some(v as f64),
        ValueRef::Real(v) => Some(v),
        ValueRef::Text(text) => Some(parse_numeric(&String::from_utf8_lossy(text))?),
        ValueRef::Blob(_) => return Err(QueryFailure::NonNumeric("<blob>".to_string())),
    };

    Ok(Some(QueryRow {
        metric,
        label: text_column(row, label_idx, "label")?,
        unit: text_column(row, unit_idx, "unit")?,
    }))
}

#[async_trait]
impl MetricSource for SqliteSource {
    async fn ping(&self) -> Result<(), String> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| "sqlite connection poisoned".to_string())?;
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn fetch_row(&self, sql: &str) -> Result<Option<QueryRow>, QueryFailure> {
        let conn = Arc::clone(&self.conn);
        let sql = sql.to_string();
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut guard = CancelOnDrop {
            interrupt: Arc::clone(&self.interrupt),
            cancelled: Arc::clone(&cancelled),
            armed: true,
        };

        let result = tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| QueryFailure::Sql("sqlite connection poisoned".to_string()))?;
            if cancelled.load(Ordering::SeqCst) {
                return Err(QueryFailure::Sql("cancelled before start".to_string()));
            }
            read_first_row(&conn, &sql)
        })
        .await;

        guard.armed = false;
        result.map_err(|e| QueryFailure::Sql(e.to_string()))?
    }

    fn name(&self) -> &str {
        &self.name
    }
}

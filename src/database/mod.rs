//! Read-only database access for metric queries.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::QueryFailure;

pub mod mysql;
pub mod sqlite;

pub use mysql::MySqlSource;
pub use sqlite::SqliteSource;

/// The single row a metric query must produce, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRow {
    pub metric: Option<f64>,
    pub label: String,
    pub unit: String,
}

#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Checks the connection is usable.
    async fn ping(&self) -> Result<(), String>;

    /// Runs `sql` and returns its first row, or `None` when it produced no rows.
    async fn fetch_row(&self, sql: &str) -> Result<Option<QueryRow>, QueryFailure>;

    fn name(&self) -> &str;
}

/// Opens a source for `url`: `mysql://…` goes over the wire, anything else is
/// treated as a SQLite location (`sqlite::memory:`, `sqlite:<path>` or a bare path).
pub async fn connect(url: &str, acquire_timeout: Duration) -> Result<Arc<dyn MetricSource>, String> {
    if url.starts_with("mysql://") {
        let source = MySqlSource::connect(url, acquire_timeout).await?;
        return Ok(Arc::new(source));
    }

    let source = if url == "sqlite::memory:" {
        SqliteSource::open_in_memory()
    } else {
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);
        SqliteSource::open(path)
    }
    .map_err(|e| e.to_string())?;
    Ok(Arc::new(source))
}

/// Parses a textual metric value (decimal columns, numeric strings).
pub(crate) fn parse_numeric(text: &str) -> Result<f64, QueryFailure> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| QueryFailure::NonNumeric(text.to_string()))
}

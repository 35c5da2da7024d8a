use async_trait::async_trait;
use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::timeout;

use super::query::{MetricQuery, QueryTable};
use super::types::{MetricBatch, MetricDatum, Unit};
use super::Collector;
use crate::config::Config;
use crate::database::{self, MetricSource, QueryRow};
use crate::error::{CollectError, ConfigError, QueryFailure};

type Connect =
    Box<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn MetricSource>, String>> + Send + Sync>;

/// Process-wide database connection, established on first use and reused
/// while warm. A failed connect leaves the slot empty so the next invocation
/// tries again. There is no teardown; the connection lives as long as the process.
pub struct ConnectionSlot {
    cell: OnceCell<Arc<dyn MetricSource>>,
    connect: Option<Connect>,
    connect_timeout: Duration,
}

impl ConnectionSlot {
    pub fn lazy<F>(connect: F, connect_timeout: Duration) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<Arc<dyn MetricSource>, String>> + Send + Sync + 'static,
    {
        Self {
            cell: OnceCell::new(),
            connect: Some(Box::new(connect)),
            connect_timeout,
        }
    }

    /// Wraps an already established source.
    pub fn ready(source: Arc<dyn MetricSource>, connect_timeout: Duration) -> Self {
        Self {
            cell: OnceCell::from(source),
            connect: None,
            connect_timeout,
        }
    }

    pub fn is_warm(&self) -> bool {
        self.cell.initialized()
    }

    /// Returns a source that just answered a health check.
    pub async fn acquire(&self) -> Result<Arc<dyn MetricSource>, CollectError> {
        let source = self
            .cell
            .get_or_try_init(|| async {
                let connect = match self.connect.as_ref() {
                    Some(connect) => connect,
                    None => {
                        return Err(CollectError::Connection(
                            "no connector configured".to_string(),
                        ))
                    }
                };
                tracing::info!("Connecting to database...");
                match timeout(self.connect_timeout, connect()).await {
                    Ok(Ok(source)) => Ok(source),
                    Ok(Err(e)) => Err(CollectError::Connection(e)),
                    Err(_) => Err(CollectError::Connection(format!(
                        "connect timed out after {:?}",
                        self.connect_timeout
                    ))),
                }
            })
            .await?;

        match timeout(self.connect_timeout, source.ping()).await {
            Ok(Ok(())) => Ok(Arc::clone(source)),
            Ok(Err(e)) => Err(CollectError::Connection(format!("{}: {}", source.name(), e))),
            Err(_) => Err(CollectError::Connection(format!(
                "{}: ping timed out after {:?}",
                source.name(),
                self.connect_timeout
            ))),
        }
    }
}

/// Runs every query in the table concurrently and assembles one batch.
///
/// Fails fast: the first query to fail aborts the join and no batch is
/// returned. Zero rows and NULL values are failures too; a query that wants
/// zero for "no data" has to `COALESCE` in SQL.
pub struct SqlCollector {
    slot: ConnectionSlot,
    table: QueryTable,
    namespace: String,
    query_timeout: Duration,
}

impl SqlCollector {
    pub fn new(
        slot: ConnectionSlot,
        table: QueryTable,
        namespace: impl Into<String>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            slot,
            table,
            namespace: namespace.into(),
            query_timeout,
        }
    }

    /// Collector over the configured database. The connection is opened on first use.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let url = config.database_url()?.to_string();
        let connect_timeout = config.timeouts.connect();
        let slot = ConnectionSlot::lazy(
            move || {
                let url = url.clone();
                async move { database::connect(&url, connect_timeout).await }.boxed()
            },
            connect_timeout,
        );
        Ok(Self::new(
            slot,
            config.query_table()?,
            config.namespace.clone(),
            config.timeouts.query(),
        ))
    }

    /// Establishes the connection ahead of the first invocation.
    pub async fn warm_up(&self) -> Result<(), CollectError> {
        self.slot.acquire().await.map(|_| ())
    }

    pub fn table(&self) -> &QueryTable {
        &self.table
    }

    async fn run_query(
        &self,
        source: &dyn MetricSource,
        index: usize,
        query: &MetricQuery,
    ) -> Result<MetricDatum, CollectError> {
        let row = match timeout(self.query_timeout, source.fetch_row(&query.query)).await {
            Ok(result) => result,
            Err(_) => Err(QueryFailure::TimedOut(self.query_timeout)),
        };

        let datum = row
            .and_then(|row| to_datum(query, row))
            .map_err(|failure| CollectError::query(index, &query.label, failure))?;

        tracing::debug!(metric = %datum.name, value = datum.value, unit = %datum.unit, "Got metric");
        Ok(datum)
    }
}

fn to_datum(query: &MetricQuery, row: Option<QueryRow>) -> Result<MetricDatum, QueryFailure> {
    let row = row.ok_or(QueryFailure::NoRows)?;

    if row.label != query.label {
        return Err(QueryFailure::LabelMismatch { found: row.label });
    }

    let unit: Unit = row.unit.parse()?;
    if unit != query.unit {
        return Err(QueryFailure::UnitMismatch {
            expected: query.unit.to_string(),
            found: row.unit,
        });
    }

    let value = row.metric.ok_or(QueryFailure::NullValue)?;
    if !value.is_finite() {
        return Err(QueryFailure::NonNumeric(value.to_string()));
    }

    Ok(MetricDatum::new(query.label.clone(), value, query.unit))
}

#[async_trait]
impl Collector for SqlCollector {
    async fn collect(&self) -> Result<MetricBatch, CollectError> {
        let source = self.slot.acquire().await?;

        let data = try_join_all(
            self.table
                .iter()
                .enumerate()
                .map(|(index, query)| self.run_query(source.as_ref(), index, query)),
        )
        .await?;

        let mut batch = MetricBatch::new(self.namespace.clone());
        batch.data = data;
        Ok(batch)
    }

    fn name(&self) -> &str {
        "sql"
    }
}

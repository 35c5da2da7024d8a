pub mod query;
pub mod sql;
pub mod types;

#[cfg(test)]
pub(crate) mod fixtures;

use async_trait::async_trait;

use crate::error::CollectError;

pub use query::{MetricQuery, QueryTable};
pub use sql::{ConnectionSlot, SqlCollector};
pub use types::*;

#[async_trait]
pub trait Collector: Send + Sync {
    /// Builds a fresh batch from the current state of the source.
    async fn collect(&self) -> Result<MetricBatch, CollectError>;

    fn name(&self) -> &str;
}

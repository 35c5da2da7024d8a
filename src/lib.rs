pub mod collectors;
pub mod config;
pub mod database;
pub mod error;
pub mod forwarder;
pub mod handler;
pub mod logging;

pub use collectors::{Collector, MetricBatch, MetricDatum, MetricQuery, QueryTable, Unit};
pub use config::Config;
pub use error::{CollectError, ConfigError, ForwardError, QueryFailure};
pub use forwarder::{ForwardReport, Forwarder};
pub use handler::{CollectorHandler, ForwarderHandler, InvocationContext};

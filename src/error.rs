//! Error types for the collector, the forwarder and configuration loading.

use std::time::Duration;

use thiserror::Error;

/// Why a single metric query did not yield a usable datum.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryFailure {
    #[error("SQL error: {0}")]
    Sql(String),

    #[error("query returned no rows")]
    NoRows,

    #[error("metric value is NULL")]
    NullValue,

    #[error("missing column `{0}`")]
    MissingColumn(&'static str),

    #[error("metric value is not numeric: {0}")]
    NonNumeric(String),

    #[error("row label `{found}` does not match declared label")]
    LabelMismatch { found: String },

    #[error("row unit `{found}` does not match declared unit `{expected}`")]
    UnitMismatch { expected: String, found: String },

    #[error("unknown unit `{0}`")]
    UnknownUnit(String),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

#[derive(Error, Debug)]
pub enum CollectError {
    #[error("database connection error: {0}")]
    Connection(String),

    #[error("query #{index} ({label}) failed: {source}")]
    Query {
        index: usize,
        label: String,
        #[source]
        source: QueryFailure,
    },
}

impl CollectError {
    pub fn query(index: usize, label: impl Into<String>, source: QueryFailure) -> Self {
        Self::Query {
            index,
            label: label.into(),
            source,
        }
    }
}

#[derive(Error, Debug)]
pub enum ForwardError {
    #[error("error while invoking collector `{function}`: {detail}")]
    Invocation { function: String, detail: String },

    #[error("collector `{function}` returned no payload")]
    EmptyPayload { function: String },

    #[error("collector `{function}` returned an undecodable payload: {source}")]
    MalformedPayload {
        function: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("error while pushing {attempted} metrics: {detail}")]
    Ingestion { attempted: usize, detail: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid query table: {0}")]
    QueryTable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_names_the_query() {
        let err = CollectError::query(2, "mail_queue_items", QueryFailure::NoRows);
        assert_eq!(
            err.to_string(),
            "query #2 (mail_queue_items) failed: query returned no rows"
        );
    }

    #[test]
    fn test_ingestion_error_reports_attempted_count() {
        let err = ForwardError::Ingestion {
            attempted: 5,
            detail: "throttled".to_string(),
        };
        assert_eq!(err.to_string(), "error while pushing 5 metrics: throttled");
    }

    #[test]
    fn test_empty_payload_is_distinct_from_invocation() {
        let empty = ForwardError::EmptyPayload {
            function: "collector".to_string(),
        };
        assert!(matches!(empty, ForwardError::EmptyPayload { .. }));
        assert_eq!(empty.to_string(), "collector `collector` returned no payload");
    }

    #[test]
    fn test_timeout_display() {
        let failure = QueryFailure::TimedOut(Duration::from_secs(3));
        assert_eq!(failure.to_string(), "timed out after 3s");
    }
}

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::types::Unit;
use crate::error::ConfigError;

/// A SQL statement that yields one row of `metric`, `label` and `unit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricQuery {
    pub query: String,
    pub label: String,
    pub unit: Unit,
}

impl MetricQuery {
    pub fn new(query: impl Into<String>, label: impl Into<String>, unit: Unit) -> Self {
        Self {
            query: query.into(),
            label: label.into(),
            unit,
        }
    }
}

/// Ordered, validated list of metric queries. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTable {
    queries: Vec<MetricQuery>,
}

impl QueryTable {
    pub fn new(queries: Vec<MetricQuery>) -> Result<Self, ConfigError> {
        if queries.is_empty() {
            return Err(ConfigError::QueryTable("no queries configured".to_string()));
        }

        let mut labels = HashSet::new();
        for (index, query) in queries.iter().enumerate() {
            if query.query.trim().is_empty() {
                return Err(ConfigError::QueryTable(format!("query #{} has empty SQL", index)));
            }
            if query.label.trim().is_empty() {
                return Err(ConfigError::QueryTable(format!("query #{} has empty label", index)));
            }
            if !labels.insert(query.label.as_str()) {
                return Err(ConfigError::QueryTable(format!(
                    "duplicate label `{}` at query #{}",
                    query.label, index
                )));
            }
        }

        Ok(Self { queries })
    }

    /// Default table for a MySQL schema with users, a task engine and a mail queue.
    pub fn builtin() -> Self {
        Self {
            queries: vec![
                MetricQuery::new(
                    "SELECT COUNT(*) AS metric, 'users_total' AS label, 'Count' AS unit FROM users",
                    "users_total",
                    Unit::Count,
                ),
                MetricQuery::new(
                    "SELECT UNIX_TIMESTAMP()-max(task_last_succeeded_at) AS metric, 'task_last_succeeded' AS label, 'Seconds' AS unit FROM task_engine",
                    "task_last_succeeded",
                    Unit::Seconds,
                ),
                MetricQuery::new(
                    "SELECT COALESCE(NOW()-max(creation_time), 0) AS metric, 'mail_queue_seconds_behind' AS label, 'Seconds' AS unit FROM mail_queue_table",
                    "mail_queue_seconds_behind",
                    Unit::Seconds,
                ),
                MetricQuery::new(
                    "SELECT COUNT(*) AS metric, 'mail_queue_items' AS label, 'Count' AS unit FROM mail_queue",
                    "mail_queue_items",
                    Unit::Count,
                ),
                MetricQuery::new(
                    "SELECT COUNT(*) AS metric, 'users_added' AS label, 'Count' AS unit FROM users where creation_date >= now() - INTERVAL 1 MINUTE",
                    "users_added",
                    Unit::Count,
                ),
            ],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricQuery> {
        self.queries.iter()
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

impl Default for QueryTable {
    fn default() -> Self {
        Self::builtin()
    }
}

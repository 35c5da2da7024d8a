//! Fixture database mirroring the built-in queries in SQLite dialect.

use super::query::{MetricQuery, QueryTable};
use super::types::Unit;
use crate::database::SqliteSource;

pub const NAMESPACE: &str = "CustomRDSMetrics";

/// users: 3 rows, one created just now; task last succeeded 10s ago;
/// both mail queues empty.
pub fn source() -> SqliteSource {
    let source = SqliteSource::open_in_memory().unwrap();
    source
        .execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, creation_date INTEGER NOT NULL);
             CREATE TABLE task_engine (task_last_succeeded_at INTEGER NOT NULL);
             CREATE TABLE mail_queue_table (creation_time INTEGER NOT NULL);
             CREATE TABLE mail_queue (id INTEGER PRIMARY KEY);
             INSERT INTO users (creation_date) VALUES
                 (CAST(strftime('%s', 'now') AS INTEGER) - 3600),
                 (CAST(strftime('%s', 'now') AS INTEGER) - 7200),
                 (CAST(strftime('%s', 'now') AS INTEGER));
             INSERT INTO task_engine VALUES (CAST(strftime('%s', 'now') AS INTEGER) - 10);",
        )
        .unwrap();
    source
}

pub fn table() -> QueryTable {
    QueryTable::new(vec![
        MetricQuery::new(
            "SELECT COUNT(*) AS metric, 'users_total' AS label, 'Count' AS unit FROM users",
            "users_total",
            Unit::Count,
        ),
        MetricQuery::new(
            "SELECT CAST(strftime('%s', 'now') AS INTEGER) - MAX(task_last_succeeded_at) AS metric, 'task_last_succeeded' AS label, 'Seconds' AS unit FROM task_engine",
            "task_last_succeeded",
            Unit::Seconds,
        ),
        MetricQuery::new(
            "SELECT COALESCE(CAST(strftime('%s', 'now') AS INTEGER) - MAX(creation_time), 0) AS metric, 'mail_queue_seconds_behind' AS label, 'Seconds' AS unit FROM mail_queue_table",
            "mail_queue_seconds_behind",
            Unit::Seconds,
        ),
        MetricQuery::new(
            "SELECT COUNT(*) AS metric, 'mail_queue_items' AS label, 'Count' AS unit FROM mail_queue",
            "mail_queue_items",
            Unit::Count,
        ),
        MetricQuery::new(
            "SELECT COUNT(*) AS metric, 'users_added' AS label, 'Count' AS unit FROM users WHERE creation_date >= CAST(strftime('%s', 'now') AS INTEGER) - 60",
            "users_added",
            Unit::Count,
        ),
    ])
    .unwrap()
}

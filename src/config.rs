use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::collectors::{MetricQuery, QueryTable};
use crate::error::ConfigError;

pub const ENV_CONFIG: &str = "SQLPULSE_CONFIG";
pub const ENV_DATABASE_URL: &str = "SQLPULSE_DATABASE_URL";
pub const ENV_NAMESPACE: &str = "SQLPULSE_NAMESPACE";
pub const ENV_COLLECTOR_FUNCTION: &str = "SQLPULSE_COLLECTOR_FUNCTION";
pub const ENV_AWS_REGION: &str = "SQLPULSE_AWS_REGION";
pub const ENV_CONNECT_TIMEOUT: &str = "SQLPULSE_CONNECT_TIMEOUT_SECS";
pub const ENV_QUERY_TIMEOUT: &str = "SQLPULSE_QUERY_TIMEOUT_SECS";
pub const ENV_INVOKE_TIMEOUT: &str = "SQLPULSE_INVOKE_TIMEOUT_SECS";
pub const ENV_INGEST_TIMEOUT: &str = "SQLPULSE_INGEST_TIMEOUT_SECS";

pub const DEFAULT_NAMESPACE: &str = "CustomRDSMetrics";
pub const DEFAULT_COLLECTOR_FUNCTION: &str = "sqlpulse-collector";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Timeouts {
    pub connect_secs: u64,
    pub query_secs: u64,
    pub invoke_secs: u64,
    pub ingest_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            query_secs: 10,
            invoke_secs: 30,
            ingest_secs: 10,
        }
    }
}

impl Timeouts {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn query(&self) -> Duration {
        Duration::from_secs(self.query_secs)
    }

    pub fn invoke(&self) -> Duration {
        Duration::from_secs(self.invoke_secs)
    }

    pub fn ingest(&self) -> Duration {
        Duration::from_secs(self.ingest_secs)
    }
}

/// Deployment-time settings: TOML file first, then `SQLPULSE_*` environment overrides.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub database_url: Option<String>,
    pub namespace: String,
    pub collector_function: String,
    pub aws_region: Option<String>,
    pub timeouts: Timeouts,
    /// Overrides the built-in query table when non-empty.
    pub queries: Vec<MetricQuery>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            collector_function: DEFAULT_COLLECTOR_FUNCTION.to_string(),
            aws_region: None,
            timeouts: Timeouts::default(),
            queries: Vec::new(),
        }
    }
}

impl Config {
    /// Loads from `path`, or from `$SQLPULSE_CONFIG` when no path is given,
    /// or from defaults when neither is set.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path: Option<PathBuf> = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(ENV_CONFIG).ok().map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_DATABASE_URL) {
            self.database_url = Some(url);
        }
        if let Some(namespace) = lookup(ENV_NAMESPACE) {
            self.namespace = namespace;
        }
        if let Some(function) = lookup(ENV_COLLECTOR_FUNCTION) {
            self.collector_function = function;
        }
        if let Some(region) = lookup(ENV_AWS_REGION) {
            self.aws_region = Some(region);
        }

        let seconds = |key: &'static str, target: &mut u64| -> Result<(), ConfigError> {
            if let Some(value) = lookup(key) {
                *target = value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue { key, value })?;
            }
            Ok(())
        };
        seconds(ENV_CONNECT_TIMEOUT, &mut self.timeouts.connect_secs)?;
        seconds(ENV_QUERY_TIMEOUT, &mut self.timeouts.query_secs)?;
        seconds(ENV_INVOKE_TIMEOUT, &mut self.timeouts.invoke_secs)?;
        seconds(ENV_INGEST_TIMEOUT, &mut self.timeouts.ingest_secs)?;

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "namespace",
                value: self.namespace.clone(),
            });
        }
        if self.collector_function.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "collector_function",
                value: self.collector_function.clone(),
            });
        }
        let timeouts = [
            ("timeouts.connect_secs", self.timeouts.connect_secs),
            ("timeouts.query_secs", self.timeouts.query_secs),
            ("timeouts.invoke_secs", self.timeouts.invoke_secs),
            ("timeouts.ingest_secs", self.timeouts.ingest_secs),
        ];
        for (key, secs) in timeouts {
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key,
                    value: secs.to_string(),
                });
            }
        }
        self.query_table()?;
        Ok(())
    }

    pub fn query_table(&self) -> Result<QueryTable, ConfigError> {
        if self.queries.is_empty() {
            Ok(QueryTable::builtin())
        } else {
            QueryTable::new(self.queries.clone())
        }
    }

    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::Missing(ENV_DATABASE_URL))
    }
}

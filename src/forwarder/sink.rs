use async_trait::async_trait;
use aws_sdk_cloudwatch::error::DisplayErrorContext;
use aws_sdk_cloudwatch::primitives::DateTime;
use aws_sdk_cloudwatch::types::{MetricDatum as CloudWatchDatum, StandardUnit};
use aws_sdk_cloudwatch::Client;

use crate::collectors::{MetricBatch, MetricDatum};

/// Destination for a metric batch. One call per batch.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn put(&self, batch: &MetricBatch) -> Result<(), String>;

    fn name(&self) -> &str;
}

/// CloudWatch `PutMetricData`.
#[derive(Debug, Clone)]
pub struct CloudWatchSink {
    client: Client,
}

impl CloudWatchSink {
    pub async fn new(region: Option<String>) -> Self {
        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            config_loader = config_loader.region(aws_sdk_cloudwatch::config::Region::new(region));
        }
        let config = config_loader.load().await;
        Self {
            client: Client::new(&config),
        }
    }
}

fn to_cloudwatch(datum: &MetricDatum) -> CloudWatchDatum {
    CloudWatchDatum::builder()
        .metric_name(&datum.name)
        .timestamp(DateTime::from_millis(datum.timestamp.timestamp_millis()))
        .unit(StandardUnit::from(datum.unit.as_str()))
        .value(datum.value)
        .build()
}

#[async_trait]
impl MetricsSink for CloudWatchSink {
    async fn put(&self, batch: &MetricBatch) -> Result<(), String> {
        let data: Vec<_> = batch.data.iter().map(to_cloudwatch).collect();

        self.client
            .put_metric_data()
            .namespace(&batch.namespace)
            .set_metric_data(Some(data))
            .send()
            .await
            .map(|_| ())
            .map_err(|e| DisplayErrorContext(&e).to_string())
    }

    fn name(&self) -> &str {
        "cloudwatch"
    }
}

/// Prints the batch in ingestion wire format instead of submitting it.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

#[async_trait]
impl MetricsSink for StdoutSink {
    async fn put(&self, batch: &MetricBatch) -> Result<(), String> {
        let json = serde_json::to_string_pretty(batch).map_err(|e| e.to_string())?;
        println!("{}", json);
        Ok(())
    }

    fn name(&self) -> &str {
        "stdout"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::Unit;

    #[test]
    fn test_datum_converts_to_cloudwatch() {
        let datum = MetricDatum::new("users_total".to_string(), 3.0, Unit::Count);
        let converted = to_cloudwatch(&datum);
        assert_eq!(converted.metric_name(), Some("users_total"));
        assert_eq!(converted.value(), Some(3.0));
        assert_eq!(converted.unit(), Some(&StandardUnit::Count));
        assert_eq!(
            converted.timestamp().map(|t| t.to_millis().unwrap()),
            Some(datum.timestamp.timestamp_millis())
        );
    }

    #[test]
    fn test_every_unit_is_known_to_cloudwatch() {
        for unit in Unit::ALL {
            assert!(
                StandardUnit::values().contains(&unit.as_str()),
                "{} is not a CloudWatch unit",
                unit
            );
        }
    }
}

//! Relays one batch from the collector to the metrics-ingestion API.

pub mod invoke;
pub mod sink;

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};

use crate::collectors::MetricBatch;
use crate::error::ForwardError;

pub use invoke::{Invoker, LambdaInvoker, LocalInvoker};
pub use sink::{CloudWatchSink, MetricsSink, StdoutSink};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForwardReport {
    pub namespace: String,
    pub submitted: usize,
}

impl fmt::Display for ForwardReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Successfully pushed {} metrics", self.submitted)
    }
}

/// Invokes the collector once and submits what it returns. No retries:
/// a failed run is re-triggered by whatever scheduled it.
pub struct Forwarder {
    invoker: Arc<dyn Invoker>,
    sink: Arc<dyn MetricsSink>,
    function: String,
    invoke_timeout: Duration,
    ingest_timeout: Duration,
}

impl Forwarder {
    pub fn new(
        invoker: Arc<dyn Invoker>,
        sink: Arc<dyn MetricsSink>,
        function: impl Into<String>,
        invoke_timeout: Duration,
        ingest_timeout: Duration,
    ) -> Self {
        Self {
            invoker,
            sink,
            function: function.into(),
            invoke_timeout,
            ingest_timeout,
        }
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub async fn forward(&self, event: &Value) -> Result<ForwardReport, ForwardError> {
        self.forward_within(event, None).await
    }

    /// Like [`Forwarder::forward`], but neither call may run past `remaining`
    /// from now, whatever the configured timeouts allow.
    pub async fn forward_within(
        &self,
        event: &Value,
        remaining: Option<Duration>,
    ) -> Result<ForwardReport, ForwardError> {
        let deadline = remaining.map(|r| Instant::now() + r);

        let batch = self.fetch_batch(event, budget(self.invoke_timeout, deadline)).await?;
        let attempted = batch.len();

        tracing::info!(
            namespace = %batch.namespace,
            metrics = attempted,
            sink = self.sink.name(),
            "Received statistic data, pushing to metrics API..."
        );

        let ingest_timeout = budget(self.ingest_timeout, deadline);
        match timeout(ingest_timeout, self.sink.put(&batch)).await {
            Ok(Ok(())) => {}
            Ok(Err(detail)) => return Err(ForwardError::Ingestion { attempted, detail }),
            Err(_) => {
                return Err(ForwardError::Ingestion {
                    attempted,
                    detail: format!("timed out after {:?}", ingest_timeout),
                })
            }
        }

        Ok(ForwardReport {
            namespace: batch.namespace,
            submitted: attempted,
        })
    }

    async fn fetch_batch(&self, event: &Value, invoke_timeout: Duration) -> Result<MetricBatch, ForwardError> {
        let payload = match timeout(invoke_timeout, self.invoker.invoke(&self.function, event)).await {
            Ok(Ok(payload)) => payload,
            Ok(Err(detail)) => {
                return Err(ForwardError::Invocation {
                    function: self.function.clone(),
                    detail,
                })
            }
            Err(_) => {
                return Err(ForwardError::Invocation {
                    function: self.function.clone(),
                    detail: format!("timed out after {:?}", invoke_timeout),
                })
            }
        };

        let payload = match payload {
            Some(bytes) if !is_blank(&bytes) => bytes,
            _ => {
                return Err(ForwardError::EmptyPayload {
                    function: self.function.clone(),
                })
            }
        };

        serde_json::from_slice(&payload).map_err(|source| ForwardError::MalformedPayload {
            function: self.function.clone(),
            source,
        })
    }
}

fn budget(limit: Duration, deadline: Option<Instant>) -> Duration {
    match deadline {
        Some(deadline) => limit.min(deadline.saturating_duration_since(Instant::now())),
        None => limit,
    }
}

/// Empty, whitespace-only and JSON `null` payloads carry no batch.
fn is_blank(payload: &[u8]) -> bool {
    let trimmed = String::from_utf8_lossy(payload);
    let trimmed = trimmed.trim();
    trimmed.is_empty() || trimmed == "null"
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::collectors::{MetricDatum, Unit};
    use async_trait::async_trait;
    use std::sync::Mutex;

    const TIMEOUT: Duration = Duration::from_secs(5);

    pub(crate) struct FakeInvoker {
        pub response: Result<Option<Vec<u8>>, String>,
        pub calls: Mutex<Vec<(String, Value)>>,
    }

    impl FakeInvoker {
        pub fn returning(response: Result<Option<Vec<u8>>, String>) -> Arc<Self> {
            Arc::new(Self {
                response,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Invoker for FakeInvoker {
        async fn invoke(&self, function: &str, payload: &Value) -> Result<Option<Vec<u8>>, String> {
            self.calls
                .lock()
                .unwrap()
                .push((function.to_string(), payload.clone()));
            self.response.clone()
        }
    }

    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub fail_with: Option<String>,
        pub batches: Mutex<Vec<MetricBatch>>,
    }

    #[async_trait]
    impl MetricsSink for RecordingSink {
        async fn put(&self, batch: &MetricBatch) -> Result<(), String> {
            self.batches.lock().unwrap().push(batch.clone());
            match &self.fail_with {
                Some(detail) => Err(detail.clone()),
                None => Ok(()),
            }
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    /// Never answers.
    pub(crate) struct HangingInvoker;

    #[async_trait]
    impl Invoker for HangingInvoker {
        async fn invoke(&self, _function: &str, _payload: &Value) -> Result<Option<Vec<u8>>, String> {
            futures::future::pending().await
        }
    }

    struct HangingSink;

    #[async_trait]
    impl MetricsSink for HangingSink {
        async fn put(&self, _batch: &MetricBatch) -> Result<(), String> {
            futures::future::pending().await
        }

        fn name(&self) -> &str {
            "hanging"
        }
    }

    fn sample_batch() -> MetricBatch {
        let mut batch = MetricBatch::new("CustomRDSMetrics");
        batch
            .data
            .push(MetricDatum::new("users_total".to_string(), 3.0, Unit::Count));
        batch
            .data
            .push(MetricDatum::new("mail_queue_items".to_string(), 0.0, Unit::Count));
        batch
    }

    fn forwarder(invoker: Arc<FakeInvoker>, sink: Arc<RecordingSink>) -> Forwarder {
        Forwarder::new(invoker, sink, "gather-stats", TIMEOUT, TIMEOUT)
    }

    #[tokio::test]
    async fn test_relays_batch_unchanged() {
        let batch = sample_batch();
        let invoker = FakeInvoker::returning(Ok(Some(serde_json::to_vec(&batch).unwrap())));
        let sink = Arc::new(RecordingSink::default());
        let event = serde_json::json!({"source": "aws.events", "detail": {}});

        let report = forwarder(invoker.clone(), sink.clone())
            .forward(&event)
            .await
            .unwrap();

        assert_eq!(report.submitted, 2);
        assert_eq!(report.to_string(), "Successfully pushed 2 metrics");

        let calls = invoker.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "gather-stats");
        assert_eq!(calls[0].1, event);

        let pushed = sink.batches.lock().unwrap();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0], batch);
    }

    #[tokio::test]
    async fn test_missing_payload_skips_ingestion() {
        for response in [None, Some(Vec::new()), Some(b"  ".to_vec()), Some(b"null".to_vec())] {
            let invoker = FakeInvoker::returning(Ok(response));
            let sink = Arc::new(RecordingSink::default());

            let err = forwarder(invoker, sink.clone())
                .forward(&Value::Null)
                .await
                .unwrap_err();

            assert!(matches!(err, ForwardError::EmptyPayload { .. }));
            assert!(sink.batches.lock().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_invocation_error_skips_ingestion() {
        let invoker = FakeInvoker::returning(Err("ResourceNotFoundException".to_string()));
        let sink = Arc::new(RecordingSink::default());

        let err = forwarder(invoker, sink.clone())
            .forward(&Value::Null)
            .await
            .unwrap_err();

        match err {
            ForwardError::Invocation { function, detail } => {
                assert_eq!(function, "gather-stats");
                assert_eq!(detail, "ResourceNotFoundException");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(sink.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload_skips_ingestion() {
        let invoker = FakeInvoker::returning(Ok(Some(b"{\"Namespace\": 1}".to_vec())));
        let sink = Arc::new(RecordingSink::default());

        let err = forwarder(invoker, sink.clone())
            .forward(&Value::Null)
            .await
            .unwrap_err();

        assert!(matches!(err, ForwardError::MalformedPayload { .. }));
        assert!(sink.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ingestion_failure_reports_attempted_count() {
        let batch = sample_batch();
        let invoker = FakeInvoker::returning(Ok(Some(serde_json::to_vec(&batch).unwrap())));
        let sink = Arc::new(RecordingSink {
            fail_with: Some("Throttling: Rate exceeded".to_string()),
            ..Default::default()
        });

        let err = forwarder(invoker, sink.clone())
            .forward(&Value::Null)
            .await
            .unwrap_err();

        match err {
            ForwardError::Ingestion { attempted, detail } => {
                assert_eq!(attempted, 2);
                assert_eq!(detail, "Throttling: Rate exceeded");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(sink.batches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invoke_timeout_is_an_invocation_error() {
        let sink = Arc::new(RecordingSink::default());
        let forwarder = Forwarder::new(
            Arc::new(HangingInvoker),
            sink.clone(),
            "gather-stats",
            Duration::from_millis(50),
            TIMEOUT,
        );

        let err = forwarder.forward(&Value::Null).await.unwrap_err();

        match err {
            ForwardError::Invocation { function, detail } => {
                assert_eq!(function, "gather-stats");
                assert_eq!(detail, "timed out after 50ms");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(sink.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_timeout_reports_attempted_count() {
        let batch = sample_batch();
        let invoker = FakeInvoker::returning(Ok(Some(serde_json::to_vec(&batch).unwrap())));
        let forwarder = Forwarder::new(
            invoker,
            Arc::new(HangingSink),
            "gather-stats",
            TIMEOUT,
            Duration::from_millis(50),
        );

        let err = forwarder.forward(&Value::Null).await.unwrap_err();

        match err {
            ForwardError::Ingestion { attempted, detail } => {
                assert_eq!(attempted, 2);
                assert_eq!(detail, "timed out after 50ms");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_remaining_time_caps_configured_timeouts() {
        let forwarder = Forwarder::new(
            Arc::new(HangingInvoker),
            Arc::new(RecordingSink::default()),
            "gather-stats",
            Duration::from_secs(30),
            TIMEOUT,
        );

        let started = Instant::now();
        let err = forwarder
            .forward_within(&Value::Null, Some(Duration::from_millis(50)))
            .await
            .unwrap_err();

        assert!(matches!(err, ForwardError::Invocation { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_budget() {
        let limit = Duration::from_secs(10);
        assert_eq!(budget(limit, None), limit);
        assert!(budget(limit, Some(Instant::now() + Duration::from_secs(1))) <= Duration::from_secs(1));
        assert_eq!(budget(limit, Some(Instant::now())), Duration::ZERO);
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank(b""));
        assert!(is_blank(b" \n"));
        assert!(is_blank(b"null"));
        assert!(!is_blank(b"{}"));
    }
}

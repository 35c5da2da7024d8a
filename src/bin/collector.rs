use anyhow::Context;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde_json::Value;
use sqlpulse::collectors::SqlCollector;
use sqlpulse::logging::init_logging;
use sqlpulse::{CollectorHandler, Config, InvocationContext};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    tracing::info!("MySQL custom metrics collector initiated");

    let config = Config::load(None).context("Failed to load configuration")?;
    let collector = SqlCollector::from_config(&config).context("Failed to build collector")?;

    // Connect at cold start; a failure here is retried by the first invocation.
    if let Err(e) = collector.warm_up().await {
        tracing::warn!(error = %e, "Database not reachable at startup");
    }

    tracing::info!(
        namespace = %config.namespace,
        queries = collector.table().len(),
        "Started up, waiting for invocations..."
    );

    let handler = Arc::new(CollectorHandler::new(Arc::new(collector)));
    run(service_fn(move |event: LambdaEvent<Value>| {
        let handler = Arc::clone(&handler);
        async move {
            let mut ctx = InvocationContext::from(&event.context);
            handler
                .handle(event.payload, &mut ctx)
                .await
                .map_err(Error::from)
        }
    }))
    .await
    .map_err(|e| anyhow::anyhow!(e))
}

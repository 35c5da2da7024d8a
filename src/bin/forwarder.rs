use anyhow::Context;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde_json::Value;
use sqlpulse::forwarder::{CloudWatchSink, LambdaInvoker};
use sqlpulse::logging::init_logging;
use sqlpulse::{Config, Forwarder, ForwarderHandler, InvocationContext};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = Config::load(None).context("Failed to load configuration")?;
    let invoker = LambdaInvoker::new(config.aws_region.clone()).await;
    let sink = CloudWatchSink::new(config.aws_region.clone()).await;

    let forwarder = Forwarder::new(
        Arc::new(invoker),
        Arc::new(sink),
        config.collector_function.clone(),
        config.timeouts.invoke(),
        config.timeouts.ingest(),
    );

    tracing::info!(
        function = %config.collector_function,
        "Started up, waiting for invocations..."
    );

    let handler = Arc::new(ForwarderHandler::new(forwarder));
    run(service_fn(move |event: LambdaEvent<Value>| {
        let handler = Arc::clone(&handler);
        async move {
            let mut ctx = InvocationContext::from(&event.context);
            handler
                .handle(event.payload, &mut ctx)
                .await
                .map(|report| report.to_string())
                .map_err(Error::from)
        }
    }))
    .await
    .map_err(|e| anyhow::anyhow!(e))
}

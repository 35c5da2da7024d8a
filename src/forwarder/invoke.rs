use async_trait::async_trait;
use aws_sdk_lambda::error::DisplayErrorContext;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;
use aws_sdk_lambda::Client;
use serde_json::Value;
use std::sync::Arc;

use crate::handler::{CollectorHandler, InvocationContext};

/// Calls a function by name with a JSON payload and hands back the raw response payload.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(&self, function: &str, payload: &Value) -> Result<Option<Vec<u8>>, String>;
}

/// Synchronous (RequestResponse) AWS Lambda invocation.
#[derive(Debug, Clone)]
pub struct LambdaInvoker {
    client: Client,
}

impl LambdaInvoker {
    pub async fn new(region: Option<String>) -> Self {
        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            config_loader = config_loader.region(aws_sdk_lambda::config::Region::new(region));
        }
        let config = config_loader.load().await;
        Self {
            client: Client::new(&config),
        }
    }
}

#[async_trait]
impl Invoker for LambdaInvoker {
    async fn invoke(&self, function: &str, payload: &Value) -> Result<Option<Vec<u8>>, String> {
        let body = serde_json::to_vec_pretty(payload).map_err(|e| e.to_string())?;

        let output = self
            .client
            .invoke()
            .function_name(function)
            .invocation_type(InvocationType::RequestResponse)
            .payload(Blob::new(body))
            .send()
            .await
            .map_err(|e| DisplayErrorContext(&e).to_string())?;

        // Handler failures come back as a successful call with FunctionError set.
        if let Some(function_error) = output.function_error() {
            let detail = output
                .payload()
                .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned())
                .unwrap_or_default();
            return Err(format!("{}: {}", function_error, detail));
        }

        Ok(output.payload.map(Blob::into_inner))
    }
}

/// Runs a collector in-process, serialising its batch the way the remote
/// runtime would. Used for local runs of the whole pipeline.
pub struct LocalInvoker {
    handler: Arc<CollectorHandler>,
}

impl LocalInvoker {
    pub fn new(handler: Arc<CollectorHandler>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl Invoker for LocalInvoker {
    async fn invoke(&self, function: &str, payload: &Value) -> Result<Option<Vec<u8>>, String> {
        tracing::debug!(function, "Invoking collector in-process");
        let mut ctx = InvocationContext::local();
        let batch = self
            .handler
            .handle(payload.clone(), &mut ctx)
            .await
            .map_err(|e| e.to_string())?;
        serde_json::to_vec(&batch).map(Some).map_err(|e| e.to_string())
    }
}

//! Invocation entry points shared by the Lambda binaries and the CLI.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

use crate::collectors::{Collector, MetricBatch};
use crate::error::{CollectError, ForwardError};
use crate::forwarder::{ForwardReport, Forwarder};

/// Per-invocation execution environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationContext {
    pub request_id: String,
    pub deadline: Option<DateTime<Utc>>,
    /// Whether the runtime should wait for outstanding background work before
    /// the invocation counts as complete. Handlers clear it; they leave nothing pending.
    pub wait_for_background_work: bool,
}

impl InvocationContext {
    pub fn new(request_id: impl Into<String>, deadline: Option<DateTime<Utc>>) -> Self {
        Self {
            request_id: request_id.into(),
            deadline,
            wait_for_background_work: true,
        }
    }

    /// Context for an invocation that did not come from a runtime.
    pub fn local() -> Self {
        Self::new(Uuid::new_v4().to_string(), None)
    }

    /// Time left before the runtime gives up on this invocation. Zero once
    /// the deadline has passed, `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }
}

impl From<&lambda_runtime::Context> for InvocationContext {
    fn from(ctx: &lambda_runtime::Context) -> Self {
        let deadline = i64::try_from(ctx.deadline)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis);
        Self::new(ctx.request_id.clone(), deadline)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Running,
    Succeeded,
    Failed,
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationState::Running => write!(f, "RUNNING"),
            InvocationState::Succeeded => write!(f, "SUCCEEDED"),
            InvocationState::Failed => write!(f, "FAILED"),
        }
    }
}

pub struct CollectorHandler {
    collector: Arc<dyn Collector>,
}

impl CollectorHandler {
    pub fn new(collector: Arc<dyn Collector>) -> Self {
        Self { collector }
    }

    /// The event is accepted for signature parity and otherwise ignored.
    pub async fn handle(
        &self,
        _event: Value,
        ctx: &mut InvocationContext,
    ) -> Result<MetricBatch, CollectError> {
        ctx.wait_for_background_work = false;
        let span = tracing::info_span!("collect", request_id = %ctx.request_id, collector = self.collector.name());

        async {
            tracing::info!(state = %InvocationState::Running, "Collector handler called");
            match self.collector.collect().await {
                Ok(batch) => {
                    tracing::info!(
                        state = %InvocationState::Succeeded,
                        metrics = batch.len(),
                        "Ran successfully, returning batch"
                    );
                    Ok(batch)
                }
                Err(e) => {
                    tracing::error!(state = %InvocationState::Failed, error = %e, "Collection failed");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }
}

pub struct ForwarderHandler {
    forwarder: Forwarder,
}

impl ForwarderHandler {
    pub fn new(forwarder: Forwarder) -> Self {
        Self { forwarder }
    }

    /// Passes `event` through to the collector unchanged.
    pub async fn handle(
        &self,
        event: Value,
        ctx: &mut InvocationContext,
    ) -> Result<ForwardReport, ForwardError> {
        ctx.wait_for_background_work = false;
        let remaining = ctx.remaining();
        let span = tracing::info_span!("forward", request_id = %ctx.request_id, function = self.forwarder.function());

        async {
            tracing::info!(state = %InvocationState::Running, ?remaining, "Forwarder handler called");
            match self.forwarder.forward_within(&event, remaining).await {
                Ok(report) => {
                    tracing::info!(
                        state = %InvocationState::Succeeded,
                        submitted = report.submitted,
                        namespace = %report.namespace,
                        "{}",
                        report
                    );
                    Ok(report)
                }
                Err(e) => {
                    tracing::error!(state = %InvocationState::Failed, error = %e, "Forwarding failed");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }
}

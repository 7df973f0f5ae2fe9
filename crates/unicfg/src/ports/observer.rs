//! Trace Observer Port
//!
//! The coordinator emits one structured event per step transition. Tests
//! assert on the event sequence; production forwards events to `tracing`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Operation, ServiceName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TracePhase {
    Started,
    Succeeded,
    Failed,
    /// Rejected by an open circuit without reaching the service
    ShortCircuited,
    /// Not executed because an earlier step failed
    Skipped,
    Compensated,
    CompensationFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub transaction_id: Uuid,
    pub service: ServiceName,
    pub operation: Operation,
    pub phase: TracePhase,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

impl TraceEvent {
    pub fn new(
        transaction_id: Uuid,
        service: ServiceName,
        operation: Operation,
        phase: TracePhase,
    ) -> Self {
        Self {
            transaction_id,
            service,
            operation,
            phase,
            detail: None,
            at: Utc::now(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Sink for coordinator trace events
pub trait TraceObserver: Send + Sync {
    fn record(&self, event: &TraceEvent);
}

//! TraceObserver implementations

use parking_lot::Mutex;

use unicfg::{ServiceName, TraceEvent, TraceObserver, TracePhase};

/// Forwards trace events to `tracing`
#[derive(Debug, Default)]
pub struct TracingObserver;

impl TraceObserver for TracingObserver {
    fn record(&self, event: &TraceEvent) {
        match event.phase {
            TracePhase::Failed | TracePhase::ShortCircuited | TracePhase::CompensationFailed => {
                tracing::warn!(
                    transaction_id = %event.transaction_id,
                    service = %event.service,
                    operation = %event.operation,
                    phase = ?event.phase,
                    detail = event.detail.as_deref().unwrap_or(""),
                    "Workflow step"
                );
            }
            _ => {
                tracing::debug!(
                    transaction_id = %event.transaction_id,
                    service = %event.service,
                    operation = %event.operation,
                    phase = ?event.phase,
                    "Workflow step"
                );
            }
        }
    }
}

/// Keeps every event in memory, in emission order
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<TraceEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().clone()
    }

    /// Services that reached `phase`, in order
    pub fn services_in_phase(&self, phase: TracePhase) -> Vec<ServiceName> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.phase == phase)
            .map(|e| e.service)
            .collect()
    }
}

impl TraceObserver for RecordingObserver {
    fn record(&self, event: &TraceEvent) {
        self.events.lock().push(event.clone());
    }
}

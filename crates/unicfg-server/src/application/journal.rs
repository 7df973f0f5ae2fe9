//! Workflow Journal - Bounded log of finished units of work

use std::collections::VecDeque;

use parking_lot::RwLock;
use uuid::Uuid;

use unicfg::{CoordinationError, WorkflowState, WorkflowStatus};

#[derive(Debug, Clone)]
pub struct JournalEntry {
    pub workflow: WorkflowState,
    /// Error returned to the caller, if the unit of work failed
    pub failure: Option<CoordinationError>,
}

pub struct WorkflowJournal {
    entries: RwLock<VecDeque<JournalEntry>>,
    capacity: usize,
}

impl WorkflowJournal {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    /// Record a workflow, replacing an earlier entry for the same transaction.
    ///
    /// At capacity the oldest settled entry is evicted; `failed` entries are
    /// only dropped once nothing else is left to evict.
    pub fn record(&self, entry: JournalEntry) {
        let mut entries = self.entries.write();
        let transaction_id = entry.workflow.transaction_id;
        entries.retain(|e| e.workflow.transaction_id != transaction_id);
        if entries.len() >= self.capacity {
            let evict = entries
                .iter()
                .position(|e| e.workflow.status != WorkflowStatus::Failed)
                .unwrap_or(0);
            if let Some(evicted) = entries.remove(evict) {
                if evicted.workflow.status == WorkflowStatus::Failed {
                    tracing::warn!(
                        transaction_id = %evicted.workflow.transaction_id,
                        "Journal full of failed workflows; evicting oldest"
                    );
                }
            }
        }
        entries.push_back(entry);
    }

    pub fn get(&self, transaction_id: Uuid) -> Option<JournalEntry> {
        self.entries
            .read()
            .iter()
            .find(|e| e.workflow.transaction_id == transaction_id)
            .cloned()
    }

    /// Most recent workflow still left in `failed`
    pub fn latest_failed(&self) -> Option<JournalEntry> {
        self.entries
            .read()
            .iter()
            .rev()
            .find(|e| e.workflow.status == WorkflowStatus::Failed)
            .cloned()
    }

    /// Failed workflow of `agent_id` still awaiting recovery
    pub fn pending_for(&self, agent_id: Uuid) -> Option<JournalEntry> {
        self.entries
            .read()
            .iter()
            .rev()
            .find(|e| {
                e.workflow.status == WorkflowStatus::Failed && e.workflow.agent_id == Some(agent_id)
            })
            .cloned()
    }

    /// Newest first
    pub fn recent(&self, limit: usize) -> Vec<JournalEntry> {
        self.entries.read().iter().rev().take(limit).cloned().collect()
    }
}

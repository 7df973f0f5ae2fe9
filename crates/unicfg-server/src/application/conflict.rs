//! Conflict Resolution Controller
//!
//! Serializes mutations per aggregate (and creates per agent name) and
//! resolves updates made against a stale `expected_version`.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use unicfg::{ConflictStrategy, CoordinationError, UnifiedConfigurationUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// Already applied to the aggregate
    Applied,
    /// The update being decided
    Incoming,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimestampedChange {
    /// Aggregate version produced by the change (incoming: the version it read)
    pub version: u64,
    pub timestamp: DateTime<Utc>,
    pub update: UnifiedConfigurationUpdate,
    pub origin: ChangeOrigin,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedChange {
    /// Apply this update on top of the current aggregate
    Apply(UnifiedConfigurationUpdate),
    /// The incoming change lost; the current aggregate stands
    Discard,
}

/// Pick the outcome of a conflicting change set
pub fn resolve(changes: Vec<TimestampedChange>, strategy: ConflictStrategy) -> ResolvedChange {
    let Some(incoming) = changes.iter().find(|c| c.origin == ChangeOrigin::Incoming) else {
        return ResolvedChange::Discard;
    };

    match strategy {
        ConflictStrategy::LastWriteWins => {
            // Ties go to the incoming change: it arrived last
            let newer_applied = changes
                .iter()
                .any(|c| c.origin == ChangeOrigin::Applied && c.timestamp > incoming.timestamp);
            if newer_applied {
                ResolvedChange::Discard
            } else {
                ResolvedChange::Apply(incoming.update.clone())
            }
        }
        ConflictStrategy::FirstWriteWins => {
            let older_applied = changes
                .iter()
                .any(|c| c.origin == ChangeOrigin::Applied && c.timestamp <= incoming.timestamp);
            if older_applied {
                ResolvedChange::Discard
            } else {
                ResolvedChange::Apply(incoming.update.clone())
            }
        }
        ConflictStrategy::Merge => {
            let mut ordered = changes;
            // Stable sort keeps the incoming change after applied ones on ties
            ordered.sort_by_key(|c| (c.timestamp, c.origin == ChangeOrigin::Incoming));
            let merged = ordered
                .into_iter()
                .map(|c| c.update)
                .reduce(UnifiedConfigurationUpdate::merge)
                .unwrap_or_default();
            ResolvedChange::Apply(merged)
        }
    }
}

type LockTable<K> = Arc<Mutex<HashMap<K, Arc<AsyncMutex<()>>>>>;

/// Async locks keyed by `K`; an entry lives only while it is held or awaited
pub struct KeyedLocks<K: Eq + Hash + Clone> {
    table: LockTable<K>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn lock(&self, key: K) -> KeyedGuard<K> {
        let lock = self
            .table
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        KeyedGuard {
            key,
            table: self.table.clone(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.table.lock().len()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct KeyedGuard<K: Eq + Hash> {
    key: K,
    table: LockTable<K>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash> Drop for KeyedGuard<K> {
    fn drop(&mut self) {
        let mut table = self.table.lock();
        drop(self.guard.take());
        // Waiters hold their own clone of the lock
        let idle = table
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            table.remove(&self.key);
        }
    }
}

pub struct ConflictResolver {
    strategy: ConflictStrategy,
    strict: bool,
    history_capacity: usize,
    aggregates: KeyedLocks<Uuid>,
    names: KeyedLocks<String>,
    history: Mutex<HashMap<Uuid, VecDeque<TimestampedChange>>>,
}

impl ConflictResolver {
    pub fn new(strategy: ConflictStrategy, strict: bool, history_capacity: usize) -> Self {
        Self {
            strategy,
            strict,
            history_capacity: history_capacity.max(1),
            aggregates: KeyedLocks::new(),
            names: KeyedLocks::new(),
            history: Mutex::new(HashMap::new()),
        }
    }

    /// Exclusive access to one aggregate; distinct aggregates do not contend
    pub async fn lock(&self, agent_id: Uuid) -> KeyedGuard<Uuid> {
        self.aggregates.lock(agent_id).await
    }

    /// Held from the name check until the agent is stored, so two writers
    /// cannot both claim `name`
    pub async fn lock_name(&self, name: &str) -> KeyedGuard<String> {
        self.names.lock(name.to_string()).await
    }

    /// Decide what an incoming update does to an aggregate at `current_version`
    pub fn reconcile(
        &self,
        agent_id: Uuid,
        current_version: u64,
        update: &UnifiedConfigurationUpdate,
        timestamp: DateTime<Utc>,
    ) -> Result<ResolvedChange, CoordinationError> {
        let expected = match update.expected_version {
            Some(expected) if expected != current_version => expected,
            _ => return Ok(ResolvedChange::Apply(update.clone())),
        };

        if self.strict || expected > current_version {
            return Err(CoordinationError::VersionConflict {
                agent_id,
                expected,
                observed: current_version,
            });
        }

        let mut changes: Vec<TimestampedChange> = self
            .history
            .lock()
            .get(&agent_id)
            .map(|h| h.iter().filter(|c| c.version > expected).cloned().collect())
            .unwrap_or_default();
        changes.push(TimestampedChange {
            version: expected,
            timestamp,
            update: update.clone(),
            origin: ChangeOrigin::Incoming,
        });

        let resolved = resolve(changes, self.strategy);
        tracing::info!(
            agent_id = %agent_id,
            expected,
            observed = current_version,
            strategy = %self.strategy,
            applied = matches!(resolved, ResolvedChange::Apply(_)),
            "Resolved version conflict"
        );
        Ok(resolved)
    }

    /// Remember a change applied to the aggregate
    pub fn record_applied(
        &self,
        agent_id: Uuid,
        version: u64,
        timestamp: DateTime<Utc>,
        update: UnifiedConfigurationUpdate,
    ) {
        let mut history = self.history.lock();
        let entries = history.entry(agent_id).or_default();
        if entries.len() >= self.history_capacity {
            entries.pop_front();
        }
        entries.push_back(TimestampedChange {
            version,
            timestamp,
            update,
            origin: ChangeOrigin::Applied,
        });
    }

    /// Drop the change history of a deleted aggregate
    pub fn forget(&self, agent_id: Uuid) {
        self.history.lock().remove(&agent_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use unicfg::{AgentPatch, PersonalityPatch};

    fn model_update(model: &str) -> UnifiedConfigurationUpdate {
        UnifiedConfigurationUpdate {
            agent: Some(AgentPatch {
                model: Some(model.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn change(
        update: UnifiedConfigurationUpdate,
        at: DateTime<Utc>,
        origin: ChangeOrigin,
    ) -> TimestampedChange {
        TimestampedChange {
            version: 2,
            timestamp: at,
            update,
            origin,
        }
    }

    #[test]
    fn test_last_write_wins_discards_older_incoming() {
        let now = Utc::now();
        let changes = vec![
            change(model_update("a"), now, ChangeOrigin::Applied),
            change(model_update("b"), now - Duration::seconds(1), ChangeOrigin::Incoming),
        ];
        assert_eq!(
            resolve(changes, ConflictStrategy::LastWriteWins),
            ResolvedChange::Discard
        );
    }

    #[test]
    fn test_last_write_wins_applies_newer_incoming() {
        let now = Utc::now();
        let changes = vec![
            change(model_update("a"), now - Duration::seconds(1), ChangeOrigin::Applied),
            change(model_update("b"), now, ChangeOrigin::Incoming),
        ];
        assert_eq!(
            resolve(changes, ConflictStrategy::LastWriteWins),
            ResolvedChange::Apply(model_update("b"))
        );
    }

    #[test]
    fn test_first_write_wins_keeps_earlier_applied() {
        let now = Utc::now();
        let changes = vec![
            change(model_update("a"), now - Duration::seconds(1), ChangeOrigin::Applied),
            change(model_update("b"), now, ChangeOrigin::Incoming),
        ];
        assert_eq!(
            resolve(changes, ConflictStrategy::FirstWriteWins),
            ResolvedChange::Discard
        );
    }

    #[test]
    fn test_merge_takes_latest_writer_per_field() {
        let now = Utc::now();
        let rename = UnifiedConfigurationUpdate {
            personality: Some(PersonalityPatch {
                name: Some("Bold".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let changes = vec![
            change(model_update("a"), now, ChangeOrigin::Applied),
            change(
                rename.merge(model_update("b")),
                now - Duration::seconds(1),
                ChangeOrigin::Incoming,
            ),
        ];

        let ResolvedChange::Apply(merged) = resolve(changes, ConflictStrategy::Merge) else {
            panic!("merge always applies");
        };
        assert_eq!(merged.agent.and_then(|a| a.model).as_deref(), Some("a"));
        assert_eq!(
            merged.personality.and_then(|p| p.name).as_deref(),
            Some("Bold")
        );
    }

    #[test]
    fn test_strict_mode_reports_version_conflict() {
        let resolver = ConflictResolver::new(ConflictStrategy::LastWriteWins, true, 8);
        let agent_id = Uuid::new_v4();
        let update = model_update("b").with_expected_version(1);

        let err = resolver.reconcile(agent_id, 3, &update, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            CoordinationError::VersionConflict {
                expected: 1,
                observed: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_matching_version_applies_directly() {
        let resolver = ConflictResolver::new(ConflictStrategy::FirstWriteWins, true, 8);
        let update = model_update("b").with_expected_version(3);
        assert_eq!(
            resolver
                .reconcile(Uuid::new_v4(), 3, &update, Utc::now())
                .unwrap(),
            ResolvedChange::Apply(update)
        );
    }

    #[test]
    fn test_reconcile_only_considers_changes_after_expected_version() {
        let resolver = ConflictResolver::new(ConflictStrategy::LastWriteWins, false, 8);
        let agent_id = Uuid::new_v4();
        let now = Utc::now();
        // Version 2 is newer than the incoming change but was already read by it
        resolver.record_applied(agent_id, 2, now + Duration::seconds(10), model_update("a"));
        resolver.record_applied(agent_id, 3, now - Duration::seconds(10), model_update("c"));

        let update = model_update("b").with_expected_version(2);
        assert_eq!(
            resolver.reconcile(agent_id, 3, &update, now).unwrap(),
            ResolvedChange::Apply(update)
        );
    }

    #[tokio::test]
    async fn test_lock_serializes_same_aggregate() {
        let resolver = Arc::new(ConflictResolver::new(ConflictStrategy::LastWriteWins, false, 8));
        let agent_id = Uuid::new_v4();
        let guard = resolver.lock(agent_id).await;

        let contender = {
            let resolver = resolver.clone();
            tokio::spawn(async move {
                let _guard = resolver.lock(agent_id).await;
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        // A different aggregate is not blocked
        let _other = resolver.lock(Uuid::new_v4()).await;

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_lock_entries_are_dropped_when_idle() {
        let resolver = ConflictResolver::new(ConflictStrategy::LastWriteWins, false, 8);
        let agent_id = Uuid::new_v4();

        let guard = resolver.lock(agent_id).await;
        assert_eq!(resolver.aggregates.tracked(), 1);
        drop(guard);
        assert_eq!(resolver.aggregates.tracked(), 0);

        drop(resolver.lock_name("atlas").await);
        assert_eq!(resolver.names.tracked(), 0);
    }

    #[tokio::test]
    async fn test_lock_entry_survives_while_awaited() {
        let resolver = Arc::new(ConflictResolver::new(ConflictStrategy::LastWriteWins, false, 8));
        let guard = resolver.lock_name("atlas").await;

        let contender = {
            let resolver = resolver.clone();
            tokio::spawn(async move {
                let _guard = resolver.lock_name("atlas").await;
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(resolver.names.tracked(), 1);
        drop(guard);
        // The waiting contender still holds the entry
        assert_eq!(resolver.names.tracked(), 1);
        contender.await.unwrap();
        assert_eq!(resolver.names.tracked(), 0);
    }

    #[test]
    fn test_evicted_history_no_longer_decides_conflicts() {
        let resolver = ConflictResolver::new(ConflictStrategy::LastWriteWins, false, 2);
        let agent_id = Uuid::new_v4();
        let now = Utc::now();
        resolver.record_applied(agent_id, 2, now + Duration::seconds(10), model_update("a"));
        let update = model_update("b").with_expected_version(1);
        assert_eq!(
            resolver.reconcile(agent_id, 2, &update, now).unwrap(),
            ResolvedChange::Discard
        );

        // Two older changes push version 2 out of the bounded history
        resolver.record_applied(agent_id, 3, now - Duration::seconds(10), model_update("c"));
        resolver.record_applied(agent_id, 4, now - Duration::seconds(5), model_update("d"));
        assert_eq!(
            resolver.reconcile(agent_id, 4, &update, now).unwrap(),
            ResolvedChange::Apply(update)
        );
    }
}

//! Status Store - process-wide map from request id to status record
//!
//! Features:
//! - Per-record locking: mutations of one record are serialized while other
//!   records and readers proceed
//! - Version notifications for long polling
//! - Bounded retention (TTL + max entries) for completed records

use crate::state::{Outcome, StatusRecord, StatusView};
use crate::task::RequestId;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use taskrelay_foundation::{Error, RelayConfig, Result};
use tokio::sync::watch;
use tracing::{debug, error};

/// Retention settings for the store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Completed records older than this are evicted
    pub retention_ttl: Duration,

    /// Upper bound on stored records (in-flight records are never evicted)
    pub max_entries: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            retention_ttl: Duration::from_secs(3600),
            max_entries: 1000,
        }
    }
}

impl From<&RelayConfig> for StoreConfig {
    fn from(config: &RelayConfig) -> Self {
        Self {
            retention_ttl: config.retention_ttl(),
            max_entries: config.max_entries,
        }
    }
}

/// Counts by state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
}

struct Entry {
    record: RwLock<StatusRecord>,
    changed: watch::Sender<u64>,
}

/// Shared status store
pub struct StatusStore {
    entries: RwLock<HashMap<RequestId, Arc<Entry>>>,
    config: StoreConfig,
}

impl StatusStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
        }
    }

    fn entry(&self, id: RequestId) -> Result<Arc<Entry>> {
        self.entries
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("request {}", id)))
    }

    /// Insert a fresh record for `id`
    pub fn create(&self, id: RequestId) -> Result<()> {
        let mut entries = self.entries.write();
        if entries.contains_key(&id) {
            error!("Request id {} allocated twice", id);
            return Err(Error::DuplicateId(id.to_string()));
        }

        let (changed, _) = watch::channel(0);
        entries.insert(
            id,
            Arc::new(Entry {
                record: RwLock::new(StatusRecord::new(id)),
                changed,
            }),
        );

        if entries.len() > self.config.max_entries {
            let removed = evict_oldest_completed(&mut entries, self.config.max_entries);
            if removed > 0 {
                debug!("Evicted {} records over capacity", removed);
            }
        }

        debug!("Created status record {}", id.short());
        Ok(())
    }

    /// Copy of the current record
    pub fn get(&self, id: RequestId) -> Result<StatusRecord> {
        let entry = self.entry(id)?;
        let record = entry.record.read().clone();
        Ok(record)
    }

    /// Poll projection of the current record
    pub fn view(&self, id: RequestId) -> Result<StatusView> {
        let entry = self.entry(id)?;
        let view = entry.record.read().view();
        Ok(view)
    }

    pub fn is_completed(&self, id: RequestId) -> Result<bool> {
        let entry = self.entry(id)?;
        let completed = entry.record.read().completed;
        Ok(completed)
    }

    /// Apply `mutator` atomically with respect to other updates and reads
    /// of the same record. Frozen records reject updates.
    pub fn update<F, T>(&self, id: RequestId, mutator: F) -> Result<T>
    where
        F: FnOnce(&mut StatusRecord) -> T,
    {
        let entry = self.entry(id)?;

        let (output, version, bumped) = {
            let mut record = entry.record.write();
            if record.completed {
                return Err(Error::AlreadyCompleted(id.to_string()));
            }
            let before = record.version;
            let output = mutator(&mut *record);
            (output, record.version, record.version != before)
        };

        if bumped {
            entry.changed.send_replace(version);
        }
        Ok(output)
    }

    /// Store a newer log snapshot. Returns whether the record changed;
    /// frozen records and regressing snapshots are ignored.
    pub fn publish_logs(&self, id: RequestId, snapshot: &str) -> Result<bool> {
        match self.update(id, |record| record.replace_logs(snapshot)) {
            Err(Error::AlreadyCompleted(_)) => Ok(false),
            other => other,
        }
    }

    /// Set final logs, outcome and `completed` in one atomic step.
    pub fn finalize(&self, id: RequestId, logs: String, outcome: Outcome) -> Result<()> {
        self.update(id, |record| record.finish(logs, outcome))
    }

    /// Wait until the record's version differs from `since_version` or it
    /// completes, bounded by `timeout`, then return the current view.
    pub async fn wait_for_change(
        &self,
        id: RequestId,
        since_version: u64,
        timeout: Duration,
    ) -> Result<StatusView> {
        let entry = self.entry(id)?;
        let mut rx = entry.changed.subscribe();

        {
            let record = entry.record.read();
            if record.completed || record.version != since_version {
                return Ok(record.view());
            }
        }

        let _ = tokio::time::timeout(timeout, async {
            while rx.changed().await.is_ok() {
                if *rx.borrow_and_update() != since_version {
                    break;
                }
            }
        })
        .await;

        let view = entry.record.read().view();
        Ok(view)
    }

    // ========== Retention ==========

    /// Drop completed records past the TTL, then the oldest completed ones
    /// while over capacity. Returns the number removed.
    pub fn evict_expired(&self) -> usize {
        let cutoff = chrono::Duration::from_std(self.config.retention_ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_sub_signed(ttl));

        let mut entries = self.entries.write();
        let before = entries.len();

        if let Some(cutoff) = cutoff {
            entries.retain(|_, entry| {
                let record = entry.record.read();
                !(record.completed && record.completed_at.map(|t| t < cutoff).unwrap_or(false))
            });
        }
        let expired = before - entries.len();
        let over = evict_oldest_completed(&mut entries, self.config.max_entries);

        let removed = expired + over;
        if removed > 0 {
            debug!("Evicted {} status records ({} expired)", removed, expired);
        }
        removed
    }

    /// Spawn a task that runs `evict_expired` every `interval`
    pub fn start_periodic_cleanup(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            loop {
                interval_timer.tick().await;
                self.evict_expired();
            }
        })
    }

    // ========== Introspection ==========

    pub fn stats(&self) -> StoreStats {
        let entries = self.entries.read();
        let mut stats = StoreStats {
            total: entries.len(),
            ..StoreStats::default()
        };

        for entry in entries.values() {
            let record = entry.record.read();
            match (record.completed, record.error.is_some()) {
                (false, _) => stats.running += 1,
                (true, false) => stats.succeeded += 1,
                (true, true) => stats.failed += 1,
            }
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.entries.read().contains_key(&id)
    }
}

impl Default for StatusStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

fn evict_oldest_completed(entries: &mut HashMap<RequestId, Arc<Entry>>, max_entries: usize) -> usize {
    if entries.len() <= max_entries {
        return 0;
    }

    let mut completed: Vec<(RequestId, chrono::DateTime<Utc>)> = entries
        .iter()
        .filter_map(|(id, entry)| {
            let record = entry.record.read();
            if record.completed {
                Some((*id, record.completed_at.unwrap_or(record.created_at)))
            } else {
                None
            }
        })
        .collect();
    completed.sort_by_key(|(_, t)| *t);

    let to_remove = entries.len() - max_entries;
    let mut removed = 0;
    for (id, _) in completed.into_iter().take(to_remove) {
        entries.remove(&id);
        removed += 1;
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn finished(store: &StatusStore) -> RequestId {
        let id = RequestId::new();
        store.create(id).unwrap();
        store
            .finalize(id, "done".into(), Outcome::Success("ok".into()))
            .unwrap();
        id
    }

    #[test]
    fn test_create_and_get() {
        let store = StatusStore::default();
        let id = RequestId::new();
        store.create(id).unwrap();

        let record = store.get(id).unwrap();
        assert_eq!(record.id, id);
        assert!(!record.completed);
        assert!(record.result.is_none() && record.error.is_none());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let store = StatusStore::default();
        let id = RequestId::new();
        store.create(id).unwrap();
        assert!(matches!(store.create(id), Err(Error::DuplicateId(_))));
    }

    #[test]
    fn test_unknown_id_not_found() {
        let store = StatusStore::default();
        store.create(RequestId::new()).unwrap();
        assert!(matches!(store.get(RequestId::new()), Err(Error::NotFound(_))));
        assert!(matches!(store.view(RequestId::new()), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_frozen_after_finalize() {
        let store = StatusStore::default();
        let id = finished(&store);

        assert!(matches!(
            store.finalize(id, "again".into(), Outcome::Failure("x".into())),
            Err(Error::AlreadyCompleted(_))
        ));
        assert_eq!(store.publish_logs(id, "done and more").unwrap(), false);

        let record = store.get(id).unwrap();
        assert_eq!(record.logs, "done");
        assert_eq!(record.result.as_deref(), Some("ok"));
        assert!(record.error.is_none());
    }

    #[test]
    fn test_publish_logs_monotonic() {
        let store = StatusStore::default();
        let id = RequestId::new();
        store.create(id).unwrap();

        assert!(store.publish_logs(id, "a").unwrap());
        assert!(store.publish_logs(id, "a\nb").unwrap());
        assert!(!store.publish_logs(id, "a").unwrap());
        assert_eq!(store.get(id).unwrap().logs, "a\nb");
    }

    #[test]
    fn test_ttl_eviction_skips_running() {
        let store = StatusStore::new(StoreConfig {
            retention_ttl: Duration::ZERO,
            max_entries: 100,
        });
        let running = RequestId::new();
        store.create(running).unwrap();
        let done = finished(&store);

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(store.evict_expired(), 1);
        assert!(store.contains(running));
        assert!(!store.contains(done));
    }

    #[test]
    fn test_capacity_eviction_removes_oldest_completed() {
        let store = StatusStore::new(StoreConfig {
            retention_ttl: Duration::from_secs(3600),
            max_entries: 2,
        });
        let oldest = finished(&store);
        std::thread::sleep(Duration::from_millis(2));
        let newer = finished(&store);
        let running = RequestId::new();
        store.create(running).unwrap();

        assert_eq!(store.len(), 2);
        assert!(!store.contains(oldest));
        assert!(store.contains(newer));
        assert!(store.contains(running));
    }

    #[test]
    fn test_capacity_never_evicts_running() {
        let store = StatusStore::new(StoreConfig {
            retention_ttl: Duration::from_secs(3600),
            max_entries: 1,
        });
        let a = RequestId::new();
        let b = RequestId::new();
        store.create(a).unwrap();
        store.create(b).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_stats() {
        let store = StatusStore::default();
        store.create(RequestId::new()).unwrap();
        finished(&store);
        let failed = RequestId::new();
        store.create(failed).unwrap();
        store
            .finalize(failed, String::new(), Outcome::Failure("boom".into()))
            .unwrap();

        assert_eq!(
            store.stats(),
            StoreStats {
                total: 3,
                running: 1,
                succeeded: 1,
                failed: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_wait_for_change_wakes_on_update() {
        let store = Arc::new(StatusStore::default());
        let id = RequestId::new();
        store.create(id).unwrap();

        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.wait_for_change(id, 0, Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.publish_logs(id, "first line").unwrap();

        let view = waiter.await.unwrap().unwrap();
        assert_eq!(view.logs, "first line");
        assert_eq!(view.version, 1);
    }

    #[tokio::test]
    async fn test_wait_for_change_times_out() {
        let store = StatusStore::default();
        let id = RequestId::new();
        store.create(id).unwrap();

        let view = store
            .wait_for_change(id, 0, Duration::from_millis(20))
            .await
            .unwrap();
        assert!(!view.completed);
        assert_eq!(view.version, 0);
    }
}

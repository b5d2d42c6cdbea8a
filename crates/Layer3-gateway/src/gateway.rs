//! Request Gateway - submit and poll API over the status store
//!
//! `submit` creates the record before the run is launched, so a poll with the
//! returned id always finds it.

use std::sync::Arc;
use std::time::Duration;

use taskrelay_foundation::{Error, RelayConfig, Result};
use taskrelay_task::{AgentFactory, RequestId, StatusStore, StatusView, StoreConfig, StoreStats, TaskRunner};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Default cap for long-poll waits
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct RequestGateway {
    store: Arc<StatusStore>,
    runner: TaskRunner,
    max_wait: Duration,
}

impl RequestGateway {
    pub fn new(runner: TaskRunner) -> Self {
        Self {
            store: runner.store(),
            runner,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }

    /// Build the store and runner from relay settings
    pub fn from_config(config: &RelayConfig, factory: Arc<dyn AgentFactory>) -> Self {
        let store = Arc::new(StatusStore::new(StoreConfig::from(config)));
        let runner = TaskRunner::new(store, factory).with_publish_interval(config.publish_interval());
        Self::new(runner).with_max_wait(config.max_wait())
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn store(&self) -> Arc<StatusStore> {
        Arc::clone(&self.store)
    }

    /// Accept an input and start its run in the background.
    ///
    /// Blank input is rejected and creates no record. Must be called from
    /// within a tokio runtime.
    pub fn submit(&self, input: &str) -> Result<RequestId> {
        if input.trim().is_empty() {
            return Err(Error::Validation("no input provided".to_string()));
        }

        let id = RequestId::new();
        self.store.create(id)?;
        self.runner.spawn(id, input.to_string());

        info!("Accepted request {}", id);
        Ok(id)
    }

    /// Current state of a request
    pub fn poll(&self, id: RequestId) -> Result<StatusView> {
        self.store.view(id)
    }

    /// Like `poll`, but waits up to `timeout` for the record to move past
    /// version `since`. Without `since`, waits for the next change.
    pub async fn poll_wait(
        &self,
        id: RequestId,
        since: Option<u64>,
        timeout: Duration,
    ) -> Result<StatusView> {
        let since = match since {
            Some(version) => version,
            None => self.store.view(id)?.version,
        };
        let timeout = timeout.min(self.max_wait);
        debug!("Long poll for {} since v{} ({:?})", id.short(), since, timeout);
        self.store.wait_for_change(id, since, timeout).await
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    /// Spawn the retention sweep for the backing store
    pub fn start_cleanup(&self, interval: Duration) -> JoinHandle<()> {
        self.store().start_periodic_cleanup(interval)
    }
}

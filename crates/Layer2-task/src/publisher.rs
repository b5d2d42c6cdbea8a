//! Status Publisher - copies a run's log snapshot into its status record
//!
//! Wakes on every collector change, with a fixed interval as the upper bound
//! on staleness, and stops once the record is completed.

use crate::log::LogCollector;
use crate::store::StatusStore;
use crate::task::RequestId;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Default publishing interval
pub const DEFAULT_PUBLISH_INTERVAL: Duration = Duration::from_millis(100);

pub struct StatusPublisher {
    request_id: RequestId,
    collector: LogCollector,
    store: Arc<StatusStore>,
    interval: Duration,
}

impl StatusPublisher {
    pub fn new(request_id: RequestId, collector: LogCollector, store: Arc<StatusStore>) -> Self {
        Self {
            request_id,
            collector,
            store,
            interval: DEFAULT_PUBLISH_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run the loop on its own task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        let id = self.request_id;
        let mut changes = self.collector.subscribe();
        debug!("Publisher started for {}", id.short());

        loop {
            match self.store.is_completed(id) {
                Ok(false) => {}
                Ok(true) => break,
                Err(e) => {
                    debug!("Publisher for {} stopping: {}", id.short(), e);
                    break;
                }
            }

            let snapshot = self.collector.snapshot();
            if let Err(e) = self.store.publish_logs(id, &snapshot) {
                debug!("Publisher for {} stopping: {}", id.short(), e);
                break;
            }

            tokio::select! {
                // the sender lives in the collector we hold, so this never errors
                _ = changes.changed() => {}
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        debug!("Publisher finished for {}", id.short());
    }
}

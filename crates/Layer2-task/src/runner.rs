//! Task Runner - executes one agent run and finalizes its status record
//!
//! Each run gets its own collector, publisher and agent instance. Failures
//! (errors and panics alike) end up in the record; nothing is propagated to
//! the caller.

use crate::agent::{AgentFactory, RunContext};
use crate::log::{LogCollector, LogEntry};
use crate::publisher::{StatusPublisher, DEFAULT_PUBLISH_INTERVAL};
use crate::state::{Outcome, ERROR_SENTINEL_LOGS};
use crate::store::StatusStore;
use crate::task::RequestId;
use futures::FutureExt;
use std::any::Any;
use std::panic::{AssertUnwindSafe, Location};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, Instrument, Level};

#[derive(Clone)]
pub struct TaskRunner {
    store: Arc<StatusStore>,
    factory: Arc<dyn AgentFactory>,
    publish_interval: Duration,
}

impl TaskRunner {
    pub fn new(store: Arc<StatusStore>, factory: Arc<dyn AgentFactory>) -> Self {
        Self {
            store,
            factory,
            publish_interval: DEFAULT_PUBLISH_INTERVAL,
        }
    }

    pub fn with_publish_interval(mut self, interval: Duration) -> Self {
        self.publish_interval = interval;
        self
    }

    pub fn store(&self) -> Arc<StatusStore> {
        Arc::clone(&self.store)
    }

    /// Launch `run` on its own task
    pub fn spawn(&self, id: RequestId, input: String) -> JoinHandle<()> {
        let runner = self.clone();
        tokio::spawn(async move { runner.run(id, input).await })
    }

    /// Execute the run for `id` to completion.
    ///
    /// The record's `completed` flag is set exactly once, as part of the
    /// same update that stores the final logs and outcome.
    pub async fn run(&self, id: RequestId, input: String) {
        let span = info_span!("task_run", request_id = %id.short());
        let mut collector: Option<LogCollector> = None;

        let result = AssertUnwindSafe(self.execute(id, &input, &mut collector))
            .catch_unwind()
            .instrument(span.clone())
            .await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = format!("agent panicked: {}", panic_message(panic.as_ref()));
                let _entered = span.enter();
                match &collector {
                    Some(collector) => record_failure(collector, message),
                    None => {
                        error!("Execution error: {}", message);
                        Outcome::Failure(message)
                    }
                }
            }
        };

        let logs = match &collector {
            Some(collector) => {
                // nothing is appended after detach, so this snapshot is complete
                collector.detach();
                collector.snapshot()
            }
            None => ERROR_SENTINEL_LOGS.to_string(),
        };

        let succeeded = outcome.is_success();
        match self.store.finalize(id, logs, outcome) {
            Ok(()) => info!(
                "Request {} finished ({})",
                id.short(),
                if succeeded { "success" } else { "failure" }
            ),
            Err(e) => error!("Failed to finalize request {}: {}", id.short(), e),
        }
    }

    /// Runner lines are written into the collector directly, so they are
    /// captured without any subscriber. The matching `tracing` events are
    /// emitted outside the collector's scope and only reach the console.
    async fn execute(
        &self,
        id: RequestId,
        input: &str,
        slot: &mut Option<LogCollector>,
    ) -> Outcome {
        let collector = LogCollector::attach(id.to_string());
        *slot = Some(collector.clone());

        record_line(&collector, Level::INFO, format!("Executing command: {}", input));
        info!("Executing command: {}", input);

        StatusPublisher::new(id, collector.clone(), Arc::clone(&self.store))
            .with_interval(self.publish_interval)
            .spawn();

        let agent = match self.factory.create() {
            Ok(agent) => agent,
            Err(e) => return record_failure(&collector, format!("{:#}", e)),
        };
        debug!("Created agent '{}'", agent.name());

        let ctx = RunContext::new(id, agent.name(), collector.clone());
        match collector.scope(agent.execute(input, &ctx)).await {
            Ok(result) => Outcome::Success(result),
            Err(e) => record_failure(&collector, format!("{:#}", e)),
        }
    }
}

/// Append a runner line attributed to the `task_run` span
#[track_caller]
fn record_line(collector: &LogCollector, level: Level, message: String) {
    let caller = Location::caller();
    collector.record(LogEntry::new(level, module_path!(), "task_run", caller.line(), message));
}

#[track_caller]
fn record_failure(collector: &LogCollector, message: String) -> Outcome {
    record_line(collector, Level::ERROR, format!("Execution error: {}", message));
    error!("Execution error: {}", message);
    Outcome::Failure(message)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

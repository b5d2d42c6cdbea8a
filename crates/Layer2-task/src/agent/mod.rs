//! Agent capability - the external collaborator that does the actual work
//!
//! The runner treats agents as opaque: they receive the submitted input and a
//! `RunContext`, may log through `tracing` or the context, and eventually
//! return a result string or fail.
//!
//! `tracing` events are captured only from the agent's own task. Work moved
//! onto other tasks must go through `RunContext::spawn` or
//! `RunContext::spawn_blocking` to stay in the run's logs.

mod echo;
mod shell;

pub use echo::EchoAgent;
pub use shell::ShellAgent;

use crate::log::{LogCollector, LogEntry};
use crate::task::RequestId;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use taskrelay_foundation::{Error, Result};
use tokio::task::JoinHandle;
use tracing::{Level, Span};

/// A unit of work executed once per request
#[async_trait]
pub trait Agent: Send + Sync {
    /// Agent name (used as the component of explicit log lines)
    fn name(&self) -> &str;

    /// Execute with the submitted input
    async fn execute(&self, input: &str, ctx: &RunContext) -> anyhow::Result<String>;
}

/// Produces a fresh agent for every request
pub trait AgentFactory: Send + Sync {
    fn create(&self) -> anyhow::Result<Box<dyn Agent>>;
}

impl<F> AgentFactory for F
where
    F: Fn() -> anyhow::Result<Box<dyn Agent>> + Send + Sync,
{
    fn create(&self) -> anyhow::Result<Box<dyn Agent>> {
        self()
    }
}

/// Factory for a built-in agent by name (`echo`, `shell`)
pub fn builtin_factory(name: &str) -> Result<Arc<dyn AgentFactory>> {
    match name {
        "echo" => Ok(Arc::new(|| -> anyhow::Result<Box<dyn Agent>> {
            Ok(Box::new(EchoAgent::new()))
        })),
        "shell" => Ok(Arc::new(|| -> anyhow::Result<Box<dyn Agent>> {
            Ok(Box::new(ShellAgent::new()))
        })),
        other => Err(Error::Config(format!(
            "Unknown agent '{}' (expected 'echo' or 'shell')",
            other
        ))),
    }
}

/// Per-run handle passed explicitly into the agent
///
/// Lines logged here go straight into this run's collector, independent of
/// how the process subscriber is configured.
#[derive(Debug, Clone)]
pub struct RunContext {
    request_id: RequestId,
    component: String,
    collector: LogCollector,
}

impl RunContext {
    pub fn new(request_id: RequestId, component: impl Into<String>, collector: LogCollector) -> Self {
        Self {
            request_id,
            component: component.into(),
            collector,
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Formatted lines captured so far for this run
    pub fn logs(&self) -> String {
        self.collector.snapshot()
    }

    /// Append a line directly. The function slot is the current span's
    /// name, or `-` outside any span.
    #[track_caller]
    pub fn log(&self, level: Level, message: impl Into<String>) {
        let caller = std::panic::Location::caller();
        let span = Span::current();
        let function = span.metadata().map(|meta| meta.name()).unwrap_or("-");
        self.collector.record(LogEntry::new(
            level,
            self.component.as_str(),
            function,
            caller.line(),
            message,
        ));
    }

    #[track_caller]
    pub fn info(&self, message: impl Into<String>) {
        self.log(Level::INFO, message);
    }

    #[track_caller]
    pub fn warn(&self, message: impl Into<String>) {
        self.log(Level::WARN, message);
    }

    #[track_caller]
    pub fn error(&self, message: impl Into<String>) {
        self.log(Level::ERROR, message);
    }

    /// `tokio::spawn` that keeps the task's `tracing` events in this run
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let collector = self.collector.clone();
        tokio::spawn(async move { collector.scope(future).await })
    }

    /// `spawn_blocking` counterpart of [`RunContext::spawn`]
    pub fn spawn_blocking<F, R>(&self, f: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let collector = self.collector.clone();
        tokio::task::spawn_blocking(move || collector.sync_scope(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::init_test_capture;

    #[test]
    fn test_builtin_factory() {
        assert_eq!(builtin_factory("echo").unwrap().create().unwrap().name(), "echo");
        assert_eq!(builtin_factory("shell").unwrap().create().unwrap().name(), "shell");
        assert!(matches!(builtin_factory("manus"), Err(Error::Config(_))));
    }

    #[test]
    fn test_run_context_logs_into_collector() {
        let collector = LogCollector::attach("ctx");
        let ctx = RunContext::new(RequestId::new(), "tester", collector.clone());

        ctx.info("step one");
        ctx.error("step two");

        let snapshot = ctx.logs();
        let lines: Vec<&str> = snapshot.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("| INFO     | tester:-:"));
        assert!(lines[1].contains("ERROR"));
        assert!(lines[1].ends_with(" - step two"));
    }

    #[tokio::test]
    async fn test_run_context_uses_span_name() {
        init_test_capture();
        let collector = LogCollector::attach("ctx");
        let ctx = RunContext::new(RequestId::new(), "tester", collector.clone());

        let span = tracing::info_span!("plan_step");
        span.in_scope(|| ctx.info("inside span"));

        assert!(collector.snapshot().contains("| tester:plan_step:"));
    }

    #[tokio::test]
    async fn test_spawned_work_stays_in_run_logs() {
        init_test_capture();
        let collector = LogCollector::attach("spawn");
        let ctx = RunContext::new(RequestId::new(), "tester", collector.clone());

        ctx.spawn(async { tracing::info!("from helper task") })
            .await
            .unwrap();
        ctx.spawn_blocking(|| tracing::info!("from blocking helper"))
            .await
            .unwrap();
        tokio::spawn(async { tracing::info!("from untracked task") })
            .await
            .unwrap();

        let logs = collector.snapshot();
        assert!(logs.contains("from helper task"));
        assert!(logs.contains("from blocking helper"));
        assert!(!logs.contains("from untracked task"));
    }
}

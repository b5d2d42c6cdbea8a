//! # taskrelay-task
//!
//! Asynchronous task execution and status tracking for taskrelay.
//! Runs an agent per request in the background while pollers read
//! incremental progress.
//!
//! ## Features
//!
//! - Per-run log capture routed through `tracing` (`CaptureLayer`)
//! - Status store with per-record locking and bounded retention
//! - Event-driven status publishing with bounded staleness
//! - Task runner that always finalizes the record, even on panic

pub mod agent;
pub mod log;
pub mod publisher;
pub mod runner;
pub mod state;
pub mod store;
pub mod task;

// Agent capability
pub use agent::{builtin_factory, Agent, AgentFactory, EchoAgent, RunContext, ShellAgent};

// Log system
pub use log::{CaptureLayer, LogCollector, LogEntry};

// Task system
pub use publisher::{StatusPublisher, DEFAULT_PUBLISH_INTERVAL};
pub use runner::TaskRunner;
pub use state::{Outcome, StatusRecord, StatusView, ERROR_SENTINEL_LOGS, EXECUTION_ERROR_PREFIX};
pub use store::{StatusStore, StoreConfig, StoreStats};
pub use task::RequestId;

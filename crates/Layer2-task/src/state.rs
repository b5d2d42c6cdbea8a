//! Status record state machine
//!
//! A record is mutable while its run is in flight and frozen once
//! `completed` flips to true.

use crate::task::RequestId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Logs stored when a run failed before any collector was attached
pub const ERROR_SENTINEL_LOGS: &str = "an error occurred while processing";

/// Prefix applied to failures surfaced through the result channel
pub const EXECUTION_ERROR_PREFIX: &str = "execution error: ";

/// Terminal outcome of an agent run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Agent returned a result
    Success(String),

    /// Agent failed; human readable description
    Failure(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

/// Mutable-then-frozen record describing one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Request identifier
    pub id: RequestId,

    /// Set exactly once, as the last mutation
    pub completed: bool,

    /// Latest formatted log snapshot
    pub logs: String,

    /// Success payload
    pub result: Option<String>,

    /// Failure description
    pub error: Option<String>,

    /// When the request was submitted
    pub created_at: DateTime<Utc>,

    /// When the run finished
    pub completed_at: Option<DateTime<Utc>>,

    /// Bumped on every accepted mutation
    pub version: u64,
}

impl StatusRecord {
    pub fn new(id: RequestId) -> Self {
        Self {
            id,
            completed: false,
            logs: String::new(),
            result: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
            version: 0,
        }
    }

    /// Replace the logs with a newer snapshot.
    ///
    /// Returns false (and leaves the record untouched) when the record is
    /// frozen, the snapshot is unchanged, or it would be shorter than what is
    /// already stored.
    pub fn replace_logs(&mut self, snapshot: &str) -> bool {
        if self.completed || snapshot.len() < self.logs.len() || snapshot == self.logs {
            return false;
        }
        self.logs = snapshot.to_string();
        self.version += 1;
        true
    }

    /// Apply the final logs and outcome, then mark the record completed.
    pub fn finish(&mut self, logs: String, outcome: Outcome) {
        debug_assert!(!self.completed, "record {} finished twice", self.id);
        self.logs = logs;
        match outcome {
            Outcome::Success(result) => self.result = Some(result),
            Outcome::Failure(error) => self.error = Some(error),
        }
        self.completed_at = Some(Utc::now());
        self.completed = true;
        self.version += 1;
    }

    pub fn is_running(&self) -> bool {
        !self.completed
    }

    pub fn is_failure(&self) -> bool {
        self.completed && self.error.is_some()
    }

    /// Project the record into what pollers see.
    pub fn view(&self) -> StatusView {
        let result = if !self.completed {
            None
        } else if let Some(error) = &self.error {
            Some(format!("{}{}", EXECUTION_ERROR_PREFIX, error))
        } else {
            self.result.clone()
        };

        StatusView {
            completed: self.completed,
            logs: self.logs.clone(),
            result,
            version: self.version,
        }
    }

    /// Get display name for the state
    pub fn display_name(&self) -> &'static str {
        match (self.completed, self.error.is_some()) {
            (false, _) => "Running",
            (true, false) => "Succeeded",
            (true, true) => "Failed",
        }
    }
}

impl std::fmt::Display for StatusRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.id.short(), self.display_name())
    }
}

/// Read-only projection returned by polls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusView {
    pub completed: bool,

    pub logs: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    /// Record version the view was taken at; pass back for long polls
    #[serde(default)]
    pub version: u64,
}

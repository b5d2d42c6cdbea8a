//! # taskrelay-foundation
//!
//! Foundation layer for taskrelay:
//! - Error: crate error type (Validation, NotFound, DuplicateId, ...)
//! - Config: relay settings (RelayConfig)

pub mod config;
pub mod error;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config
// ============================================================================
pub use config::{RelayConfig, RELAY_CONFIG_FILE};

//! Configuration management for termexec
//!
//! Tunables for the correlation state machine and session bookkeeping. All fields
//! carry defaults, so an empty file (or no file at all) yields a working
//! configuration.

pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use loader::{ConfigFormat, ConfigLoader, LoadOptions};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Execution tracking configuration
    pub tracking: TrackingConfig,

    /// Session bookkeeping configuration
    pub sessions: SessionConfig,
}

impl Config {
    /// Validate every section
    pub fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        self.tracking.validate()?;
        self.sessions.validate()
    }
}

/// Execution tracking configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Maximum number of requested executions waiting for a shell start.
    /// Older entries are evicted once the bound is exceeded.
    pub max_pending_executions: usize,

    /// Age after which a requested execution that never started is dropped
    pub pending_execution_ttl_ms: u64,

    /// Upper bound on how long an ended execution waits for its readers to
    /// drain before the end event fires anyway
    pub flush_timeout_ms: u64,
}

impl TrackingConfig {
    pub fn pending_execution_ttl(&self) -> Duration {
        Duration::from_millis(self.pending_execution_ttl_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        if self.max_pending_executions == 0 {
            return Err(ConfigValidationError::ZeroPendingBound);
        }
        if self.pending_execution_ttl_ms == 0 {
            return Err(ConfigValidationError::ZeroDuration(
                "tracking.pending_execution_ttl_ms",
            ));
        }
        if self.flush_timeout_ms == 0 {
            return Err(ConfigValidationError::ZeroDuration("tracking.flush_timeout_ms"));
        }
        Ok(())
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_pending_executions: 64,
            pending_execution_ttl_ms: 5 * 60 * 1000,
            flush_timeout_ms: 1000,
        }
    }
}

/// Session bookkeeping configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How many closed sessions are remembered so late notifications for
    /// them are dropped. The oldest is forgotten first.
    pub max_closed_sessions: usize,
}

impl SessionConfig {
    fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        if self.max_closed_sessions == 0 {
            return Err(ConfigValidationError::ZeroClosedSessionBound);
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_closed_sessions: 1024,
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("max_pending_executions must be greater than 0")]
    ZeroPendingBound,

    #[error("{0} must be greater than 0")]
    ZeroDuration(&'static str),

    #[error("max_closed_sessions must be greater than 0")]
    ZeroClosedSessionBound,
}

impl ConfigValidationError {
    /// Dotted path of the offending field
    pub fn field(&self) -> &'static str {
        match self {
            ConfigValidationError::ZeroPendingBound => "tracking.max_pending_executions",
            ConfigValidationError::ZeroDuration(field) => field,
            ConfigValidationError::ZeroClosedSessionBound => "sessions.max_closed_sessions",
        }
    }
}

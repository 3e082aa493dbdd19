//! Error types and Result aliases for termexec
//!
//! Most shell-integration misbehavior (unknown sessions, unmatched reports,
//! late stream writes) is absorbed by the tracker and only traced. The
//! variants here cover the surfaces that can genuinely fail: configuration,
//! the outbound execute request, and client calls against closed sessions.

use std::fmt;
use std::path::PathBuf;

/// Result type alias for termexec operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for termexec
#[derive(Debug)]
pub enum Error {
    // === Session errors ===
    /// Session has been closed and its tracker disposed
    SessionClosed {
        session_id: String,
    },

    /// Session not known to the registry
    SessionNotFound {
        session_id: String,
    },

    // === Execution errors ===
    /// Client requested an execution with an empty command line
    EmptyCommandLine,

    /// Outbound execute request could not be delivered to the transport
    ExecuteRequestFailed {
        session_id: String,
        command_line: String,
        reason: String,
    },

    // === Configuration errors ===
    /// Failed to load configuration file
    ConfigLoadFailed {
        path: PathBuf,
        reason: String,
    },

    /// Configuration file not found
    ConfigNotFound,

    /// Configuration validation failed
    ConfigValidationFailed {
        field: String,
        reason: String,
    },

    /// Failed to serialize configuration
    ConfigSerializationFailed {
        format: String,
        reason: String,
    },

    /// Failed to parse configuration
    ConfigParseFailed {
        format: String,
        reason: String,
    },

    // === I/O and serialization errors ===
    /// I/O errors
    Io(std::io::Error),

    /// Serialization errors
    Serde(serde_json::Error),

    /// TOML parsing errors
    Toml(toml::de::Error),

    // === Generic fallback (use sparingly) ===
    /// Generic errors (for cases not yet categorized)
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Session errors
            Error::SessionClosed { session_id } => {
                write!(f, "Session '{}' has been closed", session_id)
            }
            Error::SessionNotFound { session_id } => {
                write!(f, "Session '{}' not found", session_id)
            }

            // Execution errors
            Error::EmptyCommandLine => {
                write!(f, "Command line cannot be empty")
            }
            Error::ExecuteRequestFailed {
                session_id,
                command_line,
                reason,
            } => {
                write!(
                    f,
                    "Failed to request execution of '{}' in session '{}': {}",
                    command_line, session_id, reason
                )
            }

            // Configuration errors
            Error::ConfigLoadFailed { path, reason } => {
                write!(f, "Failed to load config from '{}': {}", path.display(), reason)
            }
            Error::ConfigNotFound => {
                write!(f, "Configuration file not found")
            }
            Error::ConfigValidationFailed { field, reason } => {
                write!(f, "Configuration validation failed for '{}': {}", field, reason)
            }
            Error::ConfigSerializationFailed { format, reason } => {
                write!(f, "Failed to serialize config as {}: {}", format, reason)
            }
            Error::ConfigParseFailed { format, reason } => {
                write!(f, "Failed to parse {} config: {}", format, reason)
            }

            // I/O and serialization errors
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Serde(err) => write!(f, "Serialization error: {}", err),
            Error::Toml(err) => write!(f, "TOML parsing error: {}", err),

            // Generic fallback
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Serde(err) => Some(err),
            Error::Toml(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Toml(err)
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

impl From<crate::config::ConfigValidationError> for Error {
    fn from(err: crate::config::ConfigValidationError) -> Self {
        Error::ConfigValidationFailed {
            field: err.field().to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Error::Other(err)
    }
}

impl From<&str> for Error {
    fn from(err: &str) -> Self {
        Error::Other(err.to_string())
    }
}

//! Transport Boundary
//!
//! The messages the shell-integration hook delivers for a session, and the
//! two seams this crate needs from its host: sending an execute request to
//! the terminal process, and resolving which terminal a session belongs to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;
use crate::models::{CommandLine, Confidence, SessionId, TerminalTag};

/// Notification delivered by the shell-integration hook for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ShellIntegrationNotification {
    /// Shell integration became available in the session
    ShellIntegrationChanged,
    /// The shell is about to run a command line
    ExecutionStart {
        value: String,
        confidence: Confidence,
        is_trusted: bool,
        #[serde(default)]
        cwd: Option<PathBuf>,
    },
    /// The shell finished running a command line
    ExecutionEnd {
        value: String,
        confidence: Confidence,
        is_trusted: bool,
        #[serde(default)]
        exit_code: Option<i32>,
    },
    /// Output produced by the running command
    ExecutionData { chunk: String },
    /// Full environment report
    EnvChanged {
        keys: Vec<String>,
        values: Vec<String>,
        is_trusted: bool,
    },
    /// Single variable set
    EnvVarSet {
        key: String,
        value: String,
        is_trusted: bool,
    },
    /// Single variable removed
    EnvVarDeleted { key: String },
    /// Working directory changed
    CwdChanged { cwd: PathBuf },
}

impl ShellIntegrationNotification {
    /// Command line carried by start/end notifications
    pub fn command_line(&self) -> Option<CommandLine> {
        match self {
            ShellIntegrationNotification::ExecutionStart {
                value,
                confidence,
                is_trusted,
                ..
            }
            | ShellIntegrationNotification::ExecutionEnd {
                value,
                confidence,
                is_trusted,
                ..
            } => Some(CommandLine::new(value.clone(), *confidence, *is_trusted)),
            _ => None,
        }
    }

    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            ShellIntegrationNotification::ShellIntegrationChanged => "shellIntegrationChanged",
            ShellIntegrationNotification::ExecutionStart { .. } => "executionStart",
            ShellIntegrationNotification::ExecutionEnd { .. } => "executionEnd",
            ShellIntegrationNotification::ExecutionData { .. } => "executionData",
            ShellIntegrationNotification::EnvChanged { .. } => "envChanged",
            ShellIntegrationNotification::EnvVarSet { .. } => "envVarSet",
            ShellIntegrationNotification::EnvVarDeleted { .. } => "envVarDeleted",
            ShellIntegrationNotification::CwdChanged { .. } => "cwdChanged",
        }
    }
}

/// Outbound half of the transport
#[async_trait]
pub trait ExecutionTransport: Send + Sync {
    /// Ask the terminal process of `session` to run `command_line`
    async fn request_execute(&self, session: &SessionId, command_line: &str) -> Result<()>;
}

/// Resolves sessions to the host's terminal objects
pub trait TerminalResolver: Send + Sync {
    /// Tag of the terminal backing `session`, or `None` if the host does not
    /// know it (closed or never created)
    fn resolve(&self, session: &SessionId) -> Option<TerminalTag>;
}

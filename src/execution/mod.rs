//! Execution Handles
//!
//! Client-visible record of one command execution in a terminal session.
//! An [`Execution`] is a cheap clonable handle: the mutable state lives in
//! an internal record, and readers only ever get copies through the
//! accessors or an [`ExecutionSnapshot`].
//!
//! The command line may be refined once, when the execution ends (the shell
//! often knows the final text better than the start report). After that it
//! is frozen.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use uuid::Uuid;

use crate::models::CommandLine;
use crate::stream::{DataSequence, DataStream, DEFAULT_FLUSH_TIMEOUT};

/// Lifecycle status of an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecutionStatus {
    /// Requested by the client, waiting for the shell to start it
    #[default]
    Pending,
    /// Started by the shell and receiving output
    Running,
    /// Ended; its stream is closed
    Ended,
}

/// Handle to one command execution
#[derive(Clone)]
pub struct Execution {
    inner: Arc<ExecutionInner>,
}

struct ExecutionInner {
    id: Uuid,
    created_at: DateTime<Utc>,
    /// Working directory snapshot taken at creation
    cwd: Option<PathBuf>,
    record: Mutex<ExecutionRecord>,
    stream: DataStream,
}

struct ExecutionRecord {
    command_line: CommandLine,
    status: ExecutionStatus,
    exit_code: Option<i32>,
    ended_at: Option<DateTime<Utc>>,
}

/// Point-in-time copy of an execution's state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    pub id: Uuid,
    pub command_line: CommandLine,
    pub cwd: Option<PathBuf>,
    pub status: ExecutionStatus,
    pub exit_code: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ExecutionSnapshot {
    pub fn is_ended(&self) -> bool {
        self.status == ExecutionStatus::Ended
    }

    /// Wall-clock time between creation and end, if ended
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.ended_at.map(|ended| ended - self.created_at)
    }
}

impl Execution {
    /// Create a pending execution with the default flush timeout
    pub fn new(command_line: CommandLine, cwd: Option<PathBuf>) -> Self {
        Self::with_flush_timeout(command_line, cwd, DEFAULT_FLUSH_TIMEOUT)
    }

    /// Create a pending execution whose stream flush is bounded by `flush_timeout`
    pub fn with_flush_timeout(
        command_line: CommandLine,
        cwd: Option<PathBuf>,
        flush_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(ExecutionInner {
                id: Uuid::new_v4(),
                created_at: Utc::now(),
                cwd,
                record: Mutex::new(ExecutionRecord {
                    command_line,
                    status: ExecutionStatus::Pending,
                    exit_code: None,
                    ended_at: None,
                }),
                stream: DataStream::with_flush_timeout(flush_timeout),
            }),
        }
    }

    fn record(&self) -> MutexGuard<'_, ExecutionRecord> {
        self.inner
            .record
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn command_line(&self) -> CommandLine {
        self.record().command_line.clone()
    }

    pub fn cwd(&self) -> Option<PathBuf> {
        self.inner.cwd.clone()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    pub fn status(&self) -> ExecutionStatus {
        self.record().status
    }

    pub fn is_ended(&self) -> bool {
        self.status() == ExecutionStatus::Ended
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.record().exit_code
    }

    pub fn snapshot(&self) -> ExecutionSnapshot {
        let record = self.record();
        ExecutionSnapshot {
            id: self.inner.id,
            command_line: record.command_line.clone(),
            cwd: self.inner.cwd.clone(),
            status: record.status,
            exit_code: record.exit_code,
            created_at: self.inner.created_at,
            ended_at: record.ended_at,
        }
    }

    /// Read this execution's output from now on.
    ///
    /// Returns an exhausted sequence if the execution already ended. The end
    /// event waits for the returned sequence to be read out or dropped, up to
    /// `tracking.flush_timeout_ms`; drop sequences you do not intend to read.
    pub fn produce_lazy_sequence(&self) -> DataSequence {
        self.inner.stream.produce_lazy_sequence()
    }

    /// End the execution, optionally replacing its command line with the
    /// final text reported by the shell.
    ///
    /// Returns `true` if this call ended it. Later calls change nothing.
    pub fn end_execution(&self, final_command_line: Option<CommandLine>) -> bool {
        {
            let mut record = self.record();
            if record.status == ExecutionStatus::Ended {
                return false;
            }
            if let Some(command_line) = final_command_line {
                record.command_line = command_line;
            }
            record.status = ExecutionStatus::Ended;
            record.ended_at = Some(Utc::now());
        }
        self.inner.stream.close();
        true
    }

    /// Whether two handles refer to the same execution
    pub fn same_as(&self, other: &Execution) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn mark_running(&self) {
        let mut record = self.record();
        if record.status == ExecutionStatus::Pending {
            record.status = ExecutionStatus::Running;
        }
    }

    pub(crate) fn set_exit_code(&self, exit_code: Option<i32>) {
        self.record().exit_code = exit_code;
    }

    pub(crate) fn emit(&self, chunk: &str) {
        self.inner.stream.emit(chunk);
    }

    pub(crate) async fn flush(&self) {
        self.inner.stream.flush().await;
    }

    /// End without refining the command line and cut readers off immediately
    pub(crate) fn abort(&self) {
        self.end_execution(None);
        self.inner.stream.abort();
    }

    #[cfg(test)]
    pub(crate) fn stream(&self) -> &DataStream {
        &self.inner.stream
    }
}

impl PartialEq for Execution {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Execution {}

impl std::fmt::Debug for Execution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let record = self.record();
        f.debug_struct("Execution")
            .field("id", &self.inner.id)
            .field("command_line", &record.command_line.value)
            .field("status", &record.status)
            .field("exit_code", &record.exit_code)
            .finish()
    }
}

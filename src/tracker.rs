//! Shell Integration Tracker
//!
//! Per-session correlation state machine. The shell-integration hook tells
//! us, best effort and with varying confidence, which command line started
//! and ended. The client tells us which command lines it asked to run. The
//! tracker pairs the two so that every command the shell runs surfaces as
//! exactly one [`Execution`], with its output routed to that execution's
//! stream.
//!
//! ## States
//!
//! - **Idle**: no current execution
//! - **Running**: the current execution receives output
//! - **Draining**: the last execution ended and its readers are being
//!   flushed before the end event fires
//!
//! Every handler takes the tracker lock for its whole duration, so handlers
//! for one session never interleave. Within a session an execution's end
//! event is always published before the next execution's start event.
//!
//! Handlers never fail: the hook is untrusted and races session teardown,
//! so anything that cannot be correlated is dropped or synthesized and
//! traced at debug level.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::TrackingConfig;
use crate::error::{Error, Result};
use crate::events::{EventBus, ShellIntegrationEvent};
use crate::execution::Execution;
use crate::matcher::{ContinuationMatch, MultiLineContinuation};
use crate::models::{CommandLine, EnvSnapshot, SessionId, ShellIntegrationSnapshot, TerminalTag};

/// Coarse state of a tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Idle,
    Running,
    Draining,
}

/// A requested execution the shell has not started yet
struct PendingExecution {
    execution: Execution,
    continuation: Option<MultiLineContinuation>,
    enqueued_at: Instant,
}

struct CurrentExecution {
    execution: Execution,
    /// Physical lines still expected from the shell
    continuation: Option<MultiLineContinuation>,
    /// Resolved as a multi-line execution; its aggregate command line wins
    /// over the last physical line reported at end
    multi_line: bool,
}

struct DrainingExecution {
    execution: Execution,
}

#[derive(Default)]
struct TrackerInner {
    pending: VecDeque<PendingExecution>,
    current: Option<CurrentExecution>,
    draining: Option<DrainingExecution>,
    snapshot: ShellIntegrationSnapshot,
    active: bool,
    disposed: bool,
}

impl TrackerInner {
    /// Drop requested executions that waited longer than `ttl`
    fn expire_pending(&mut self, now: Instant, ttl: std::time::Duration) {
        // Entries are appended in time order, so the oldest is always first
        while let Some(front) = self.pending.front() {
            if now.duration_since(front.enqueued_at) <= ttl {
                break;
            }
            if let Some(expired) = self.pending.pop_front() {
                warn!(
                    "Dropping requested execution '{}' that never started",
                    expired.execution.command_line().value
                );
                expired.execution.abort();
            }
        }
    }

    fn enforce_pending_bound(&mut self, max: usize) {
        while self.pending.len() > max {
            if let Some(evicted) = self.pending.pop_front() {
                warn!(
                    "Pending execution queue full ({}), evicting '{}'",
                    max,
                    evicted.execution.command_line().value
                );
                evicted.execution.abort();
            }
        }
    }

    /// Find the requested execution a shell-reported start belongs to
    fn resolve_pending(&mut self, reported: &CommandLine) -> Option<CurrentExecution> {
        // The client's own text: exact match wherever it sits in the queue
        if reported.is_high_confidence() {
            let position = self
                .pending
                .iter()
                .position(|entry| entry.execution.command_line().value == reported.value);
            if let Some(entry) = position.and_then(|index| self.pending.remove(index)) {
                debug!("Matched '{}' exactly", reported.value);
                let multi_line = entry.continuation.is_some();
                return Some(CurrentExecution {
                    execution: entry.execution,
                    continuation: None,
                    multi_line,
                });
            }
        }

        // First physical line(s) of a multi-line request
        for index in 0..self.pending.len() {
            let outcome = match self.pending[index].continuation.as_mut() {
                Some(continuation) => continuation.advance(&reported.value),
                None => continue,
            };
            if !outcome.is_match() {
                continue;
            }
            if let Some(entry) = self.pending.remove(index) {
                debug!(
                    "Matched '{}' as start of multi-line '{}'",
                    reported.value,
                    entry.execution.command_line().value
                );
                let continuation = match outcome {
                    ContinuationMatch::Partial { .. } => entry.continuation,
                    _ => None,
                };
                return Some(CurrentExecution {
                    execution: entry.execution,
                    continuation,
                    multi_line: true,
                });
            }
        }

        // Heuristic reports cannot be compared textually; trust the queue order
        if !reported.is_high_confidence() {
            if let Some(entry) = self.pending.pop_front() {
                debug!(
                    "Matched '{}' to queue head '{}'",
                    reported.value,
                    entry.execution.command_line().value
                );
                return Some(CurrentExecution {
                    execution: entry.execution,
                    continuation: None,
                    multi_line: false,
                });
            }
        }

        None
    }

    fn state(&self) -> TrackerState {
        if self.current.is_some() {
            TrackerState::Running
        } else if self.draining.is_some() {
            TrackerState::Draining
        } else {
            TrackerState::Idle
        }
    }
}

/// Identity and outlet shared by the tracker and its flush tasks
#[derive(Clone)]
struct EventContext {
    session_id: SessionId,
    terminal: Option<TerminalTag>,
    bus: EventBus,
}

impl EventContext {
    fn changed(&self, snapshot: &ShellIntegrationSnapshot) {
        self.bus
            .publish(ShellIntegrationEvent::ShellIntegrationChanged {
                session_id: self.session_id.clone(),
                terminal: self.terminal.clone(),
                shell_integration: snapshot.clone(),
            });
    }

    fn started(&self, snapshot: &ShellIntegrationSnapshot, execution: &Execution) {
        debug!(
            "[{}] Execution started: '{}'",
            self.session_id,
            execution.command_line().value
        );
        self.bus.publish(ShellIntegrationEvent::ExecutionStarted {
            session_id: self.session_id.clone(),
            terminal: self.terminal.clone(),
            shell_integration: snapshot.clone(),
            execution: execution.clone(),
        });
    }

    fn ended(
        &self,
        snapshot: &ShellIntegrationSnapshot,
        execution: &Execution,
        exit_code: Option<i32>,
    ) {
        debug!(
            "[{}] Execution ended: '{}' (exit code {:?})",
            self.session_id,
            execution.command_line().value,
            exit_code
        );
        self.bus.publish(ShellIntegrationEvent::ExecutionEnded {
            session_id: self.session_id.clone(),
            terminal: self.terminal.clone(),
            shell_integration: snapshot.clone(),
            execution: execution.clone(),
            exit_code,
        });
    }
}

/// Correlates shell-integration notifications for one terminal session
pub struct ShellIntegrationTracker {
    context: EventContext,
    config: TrackingConfig,
    inner: Arc<Mutex<TrackerInner>>,
}

impl ShellIntegrationTracker {
    pub fn new(
        session_id: SessionId,
        terminal: Option<TerminalTag>,
        config: TrackingConfig,
        bus: EventBus,
    ) -> Self {
        Self {
            context: EventContext {
                session_id,
                terminal,
                bus,
            },
            config,
            inner: Arc::new(Mutex::new(TrackerInner::default())),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.context.session_id
    }

    pub fn terminal(&self) -> Option<&TerminalTag> {
        self.context.terminal.as_ref()
    }

    pub async fn state(&self) -> TrackerState {
        self.inner.lock().await.state()
    }

    pub async fn snapshot(&self) -> ShellIntegrationSnapshot {
        self.inner.lock().await.snapshot.clone()
    }

    pub async fn current_execution(&self) -> Option<Execution> {
        self.inner
            .lock()
            .await
            .current
            .as_ref()
            .map(|current| current.execution.clone())
    }

    /// Requested executions still waiting for the shell, oldest first
    pub async fn pending_executions(&self) -> Vec<Execution> {
        self.inner
            .lock()
            .await
            .pending
            .iter()
            .map(|entry| entry.execution.clone())
            .collect()
    }

    pub async fn is_active(&self) -> bool {
        self.inner.lock().await.active
    }

    pub async fn is_disposed(&self) -> bool {
        self.inner.lock().await.disposed
    }

    /// Register a command line the client is about to send to the shell.
    ///
    /// The execution is queued until the shell reports its start; no event
    /// fires yet.
    pub async fn request_new_execution(
        &self,
        command_line: CommandLine,
        cwd: Option<PathBuf>,
    ) -> Result<Execution> {
        if command_line.is_blank() {
            return Err(Error::EmptyCommandLine);
        }

        let mut inner = self.inner.lock().await;
        if inner.disposed {
            return Err(Error::SessionClosed {
                session_id: self.context.session_id.to_string(),
            });
        }

        let continuation = MultiLineContinuation::from_command_line(&command_line.value);
        let execution =
            Execution::with_flush_timeout(command_line, cwd, self.config.flush_timeout());

        let now = Instant::now();
        inner.expire_pending(now, self.config.pending_execution_ttl());
        inner.pending.push_back(PendingExecution {
            execution: execution.clone(),
            continuation,
            enqueued_at: now,
        });
        inner.enforce_pending_bound(self.config.max_pending_executions);

        debug!(
            "[{}] Queued execution '{}' ({} pending)",
            self.context.session_id,
            execution.command_line().value,
            inner.pending.len()
        );
        Ok(execution)
    }

    /// Remove a requested execution that will never reach the shell (for
    /// example because the execute request failed). Returns whether it was
    /// still queued.
    pub async fn withdraw_pending(&self, execution: &Execution) -> bool {
        let mut inner = self.inner.lock().await;
        let position = inner
            .pending
            .iter()
            .position(|entry| entry.execution.same_as(execution));
        match position.and_then(|index| inner.pending.remove(index)) {
            Some(entry) => {
                entry.execution.abort();
                true
            }
            None => false,
        }
    }

    /// Shell integration became available in this session
    pub async fn on_shell_integration_activated(&self) {
        let mut inner = self.inner.lock().await;
        if inner.disposed || inner.active {
            return;
        }
        inner.active = true;
        self.context.changed(&inner.snapshot);
    }

    /// The shell reported that a command line is starting
    pub async fn on_shell_reported_start(&self, reported: CommandLine, cwd: Option<PathBuf>) {
        let mut inner = self.inner.lock().await;
        if inner.disposed {
            debug!("[{}] Start after dispose ignored", self.context.session_id);
            return;
        }
        inner.active = true;

        if let Some(cwd) = cwd {
            self.update_cwd(&mut inner, cwd);
        }

        // A new start proves the previous execution is over, flushed or not
        if let Some(draining) = inner.draining.take() {
            debug!(
                "[{}] Forcing end of draining execution '{}'",
                self.context.session_id,
                draining.execution.command_line().value
            );
            self.context.ended(&inner.snapshot, &draining.execution, None);
        }

        if let Some(mut current) = inner.current.take() {
            if let Some(continuation) = current.continuation.as_mut() {
                match continuation.advance(&reported.value) {
                    ContinuationMatch::Complete => {
                        debug!(
                            "[{}] '{}' completes multi-line execution",
                            self.context.session_id, reported.value
                        );
                        current.continuation = None;
                        inner.current = Some(current);
                        return;
                    }
                    ContinuationMatch::Partial { remaining } => {
                        debug!(
                            "[{}] '{}' continues multi-line execution, {} line(s) left",
                            self.context.session_id,
                            reported.value,
                            remaining.len()
                        );
                        inner.current = Some(current);
                        return;
                    }
                    ContinuationMatch::NoMatch => {
                        debug!(
                            "[{}] '{}' abandons multi-line execution",
                            self.context.session_id, reported.value
                        );
                    }
                }
            }

            // Superseded without an end report: exit code unknown
            current.execution.end_execution(None);
            self.context.ended(&inner.snapshot, &current.execution, None);
        }

        inner.expire_pending(Instant::now(), self.config.pending_execution_ttl());
        let resolved = match inner.resolve_pending(&reported) {
            Some(resolved) => resolved,
            None => {
                debug!(
                    "[{}] No pending match for '{}', synthesizing execution",
                    self.context.session_id, reported.value
                );
                let cwd = inner.snapshot.cwd.clone();
                CurrentExecution {
                    execution: Execution::with_flush_timeout(
                        reported,
                        cwd,
                        self.config.flush_timeout(),
                    ),
                    continuation: None,
                    multi_line: false,
                }
            }
        };

        resolved.execution.mark_running();
        self.context.started(&inner.snapshot, &resolved.execution);
        inner.current = Some(resolved);
    }

    /// Output from the running command. Dropped when nothing is running.
    pub async fn on_data(&self, chunk: &str) {
        let inner = self.inner.lock().await;
        match inner.current.as_ref() {
            Some(current) => current.execution.emit(chunk),
            None => trace!(
                "[{}] Dropping {} bytes with no current execution",
                self.context.session_id,
                chunk.len()
            ),
        }
    }

    /// The shell reported that a command line finished
    pub async fn on_shell_reported_end(&self, reported: CommandLine, exit_code: Option<i32>) {
        let mut inner = self.inner.lock().await;
        if inner.disposed {
            return;
        }

        let awaiting_lines = inner
            .current
            .as_ref()
            .and_then(|current| current.continuation.as_ref())
            .is_some_and(|continuation| !continuation.is_resolved());
        if awaiting_lines {
            debug!(
                "[{}] End of '{}' ignored, multi-line execution continues",
                self.context.session_id, reported.value
            );
            return;
        }

        let Some(current) = inner.current.take() else {
            debug!(
                "[{}] End of '{}' matches no execution",
                self.context.session_id, reported.value
            );
            return;
        };

        let final_command_line = if current.multi_line || reported.is_blank() {
            None
        } else {
            Some(reported)
        };
        let execution = current.execution;
        execution.end_execution(final_command_line);
        execution.set_exit_code(exit_code);

        if let Some(previous) = inner.draining.take() {
            self.context.ended(&inner.snapshot, &previous.execution, None);
        }
        inner.draining = Some(DrainingExecution {
            execution: execution.clone(),
        });
        drop(inner);

        // Readers get to drain before the end event so no output follows it
        let shared = Arc::clone(&self.inner);
        let context = self.context.clone();
        tokio::spawn(async move {
            execution.flush().await;
            let mut inner = shared.lock().await;
            let still_draining = inner
                .draining
                .as_ref()
                .is_some_and(|draining| draining.execution.same_as(&execution));
            if still_draining {
                inner.draining = None;
                context.ended(&inner.snapshot, &execution, exit_code);
            }
        });
    }

    /// The shell reported a new working directory
    pub async fn on_cwd_changed(&self, cwd: PathBuf) {
        let mut inner = self.inner.lock().await;
        if inner.disposed {
            return;
        }
        self.update_cwd(&mut inner, cwd);
    }

    /// The shell reported its full environment
    pub async fn on_env_changed(&self, keys: &[String], values: &[String], is_trusted: bool) {
        let mut inner = self.inner.lock().await;
        if inner.disposed {
            return;
        }
        if keys.len() != values.len() {
            debug!(
                "[{}] Environment report has {} keys but {} values",
                self.context.session_id,
                keys.len(),
                values.len()
            );
        }

        let env = EnvSnapshot::from_pairs(keys, values, is_trusted);
        if inner.snapshot.env.as_ref() == Some(&env) {
            return;
        }
        inner.snapshot.env = Some(env);
        self.context.changed(&inner.snapshot);
    }

    /// The shell reported a single variable being set
    pub async fn on_env_var_set(&self, key: &str, value: &str, is_trusted: bool) {
        let mut inner = self.inner.lock().await;
        if inner.disposed {
            return;
        }

        let env = inner.snapshot.env.get_or_insert_with(EnvSnapshot::default);
        let unchanged = env.get(key) == Some(value) && env.is_trusted == is_trusted;
        if unchanged {
            return;
        }
        env.vars.insert(key.to_string(), value.to_string());
        env.is_trusted = is_trusted;
        self.context.changed(&inner.snapshot);
    }

    /// The shell reported a single variable being removed
    pub async fn on_env_var_deleted(&self, key: &str) {
        let mut inner = self.inner.lock().await;
        if inner.disposed {
            return;
        }

        let removed = inner
            .snapshot
            .env
            .as_mut()
            .is_some_and(|env| env.vars.remove(key).is_some());
        if removed {
            self.context.changed(&inner.snapshot);
        }
    }

    /// Tear down the tracker. Open streams are cut off so readers see an
    /// abrupt end instead of hanging; queued executions are dropped. No
    /// further events fire.
    pub async fn dispose(&self) {
        let mut inner = self.inner.lock().await;
        if inner.disposed {
            return;
        }
        inner.disposed = true;

        if let Some(current) = inner.current.take() {
            current.execution.abort();
        }
        if let Some(draining) = inner.draining.take() {
            draining.execution.abort();
        }
        for entry in inner.pending.drain(..) {
            entry.execution.abort();
        }
        debug!("[{}] Tracker disposed", self.context.session_id);
    }

    fn update_cwd(&self, inner: &mut TrackerInner, cwd: PathBuf) {
        if inner.snapshot.cwd.as_ref() == Some(&cwd) {
            return;
        }
        inner.snapshot.cwd = Some(cwd);
        self.context.changed(&inner.snapshot);
    }
}

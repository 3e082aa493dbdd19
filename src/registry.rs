//! Shell Integration Registry
//!
//! Owns one [`ShellIntegrationTracker`] per terminal session, created lazily
//! when the first notification (or client request) for a session arrives and
//! disposed when the session closes. All trackers publish into one shared
//! [`EventBus`], which is what the aggregated subscriptions read from.
//!
//! ```ignore
//! let registry = ShellIntegrationRegistry::new(Config::default())
//!     .with_transport(transport);
//! let mut starts = registry.on_did_start_execution();
//!
//! registry
//!     .handle_notification(&session, ShellIntegrationNotification::ExecutionStart { .. })
//!     .await;
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{EventBus, EventKind, EventSubscription};
use crate::execution::Execution;
use crate::models::{build_command_line, CommandLine, SessionId};
use crate::tracker::ShellIntegrationTracker;
use crate::transport::{ExecutionTransport, ShellIntegrationNotification, TerminalResolver};

/// Recently closed sessions, oldest evicted first once `capacity` is reached
struct ClosedSessions {
    order: VecDeque<SessionId>,
    members: HashSet<SessionId>,
    capacity: usize,
}

impl ClosedSessions {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            members: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    fn insert(&mut self, session: SessionId) {
        if !self.members.insert(session.clone()) {
            return;
        }
        self.order.push_back(session);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                trace!("Forgetting closed session {}", evicted);
                self.members.remove(&evicted);
            }
        }
    }

    fn contains(&self, session: &SessionId) -> bool {
        self.members.contains(session)
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }
}

/// Trackers and closed sessions share one lock so a session can never be
/// re-created between a close and the tracker insert
struct SessionTable {
    trackers: HashMap<SessionId, Arc<ShellIntegrationTracker>>,
    closed: ClosedSessions,
    /// Set by `dispose`; no tracker is created afterwards
    disposed: bool,
}

impl SessionTable {
    fn is_closed(&self, session: &SessionId) -> bool {
        self.disposed || self.closed.contains(session)
    }
}

/// Maps sessions to their trackers
pub struct ShellIntegrationRegistry {
    config: Config,
    events: EventBus,
    sessions: RwLock<SessionTable>,
    resolver: Option<Arc<dyn TerminalResolver>>,
    transport: Option<Arc<dyn ExecutionTransport>>,
}

impl ShellIntegrationRegistry {
    /// Create a registry. Without a resolver every session is accepted and
    /// events carry no terminal tag; without a transport execute requests
    /// are only tracked, never sent.
    pub fn new(config: Config) -> Self {
        let closed = ClosedSessions::new(config.sessions.max_closed_sessions);
        Self {
            config,
            events: EventBus::new(),
            sessions: RwLock::new(SessionTable {
                trackers: HashMap::new(),
                closed,
                disposed: false,
            }),
            resolver: None,
            transport: None,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn TerminalResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn ExecutionTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Look up an existing tracker
    pub async fn tracker(&self, session: &SessionId) -> Option<Arc<ShellIntegrationTracker>> {
        self.sessions.read().await.trackers.get(session).cloned()
    }

    /// Sessions with a live tracker
    pub async fn sessions(&self) -> Vec<SessionId> {
        self.sessions.read().await.trackers.keys().cloned().collect()
    }

    /// Whether `session` was closed recently enough to still be remembered,
    /// or the registry was disposed
    pub async fn is_closed(&self, session: &SessionId) -> bool {
        self.sessions.read().await.is_closed(session)
    }

    /// Get the tracker for `session`, creating it on first use. `None` when
    /// the session was closed or the host does not know its terminal.
    async fn get_or_create(&self, session: &SessionId) -> Option<Arc<ShellIntegrationTracker>> {
        {
            let table = self.sessions.read().await;
            if let Some(tracker) = table.trackers.get(session) {
                return Some(Arc::clone(tracker));
            }
            if table.is_closed(session) {
                return None;
            }
        }

        let terminal = match &self.resolver {
            Some(resolver) => Some(resolver.resolve(session)?),
            None => None,
        };

        let mut table = self.sessions.write().await;
        // A close may have landed while the lock was released
        if table.is_closed(session) {
            return None;
        }
        let tracker = table.trackers.entry(session.clone()).or_insert_with(|| {
            debug!("Creating shell integration tracker for session {}", session);
            Arc::new(ShellIntegrationTracker::new(
                session.clone(),
                terminal,
                self.config.tracking.clone(),
                self.events.clone(),
            ))
        });
        Some(Arc::clone(tracker))
    }

    /// Dispatch a notification from the shell-integration hook
    pub async fn handle_notification(
        &self,
        session: &SessionId,
        notification: ShellIntegrationNotification,
    ) {
        let Some(tracker) = self.get_or_create(session).await else {
            debug!(
                "Dropping {} for unknown session {}",
                notification.name(),
                session
            );
            return;
        };

        match notification {
            ShellIntegrationNotification::ShellIntegrationChanged => {
                tracker.on_shell_integration_activated().await;
            }
            ShellIntegrationNotification::ExecutionStart {
                value,
                confidence,
                is_trusted,
                cwd,
            } => {
                let command_line = CommandLine::new(value, confidence, is_trusted);
                tracker.on_shell_reported_start(command_line, cwd).await;
            }
            ShellIntegrationNotification::ExecutionEnd {
                value,
                confidence,
                is_trusted,
                exit_code,
            } => {
                let command_line = CommandLine::new(value, confidence, is_trusted);
                tracker.on_shell_reported_end(command_line, exit_code).await;
            }
            ShellIntegrationNotification::ExecutionData { chunk } => {
                tracker.on_data(&chunk).await;
            }
            ShellIntegrationNotification::EnvChanged {
                keys,
                values,
                is_trusted,
            } => {
                tracker.on_env_changed(&keys, &values, is_trusted).await;
            }
            ShellIntegrationNotification::EnvVarSet {
                key,
                value,
                is_trusted,
            } => {
                tracker.on_env_var_set(&key, &value, is_trusted).await;
            }
            ShellIntegrationNotification::EnvVarDeleted { key } => {
                tracker.on_env_var_deleted(&key).await;
            }
            ShellIntegrationNotification::CwdChanged { cwd } => {
                tracker.on_cwd_changed(cwd).await;
            }
        }
    }

    /// Ask the terminal of `session` to run a command and track it.
    ///
    /// `args`, when given, are appended to `value` with quoting. The returned
    /// execution starts once the shell reports it.
    pub async fn request_new_execution(
        &self,
        session: &SessionId,
        value: &str,
        args: Option<&[String]>,
    ) -> Result<Execution> {
        let command_line = match args {
            Some(args) => build_command_line(value, args),
            None => value.to_string(),
        };
        if command_line.trim().is_empty() {
            return Err(Error::EmptyCommandLine);
        }

        let Some(tracker) = self.get_or_create(session).await else {
            return Err(if self.is_closed(session).await {
                Error::SessionClosed {
                    session_id: session.to_string(),
                }
            } else {
                Error::SessionNotFound {
                    session_id: session.to_string(),
                }
            });
        };

        let cwd = tracker.snapshot().await.cwd;
        let execution = tracker
            .request_new_execution(CommandLine::requested(command_line.clone()), cwd)
            .await?;

        if let Some(transport) = &self.transport {
            if let Err(e) = transport.request_execute(session, &command_line).await {
                warn!("Execute request for session {} failed: {}", session, e);
                tracker.withdraw_pending(&execution).await;
                return Err(Error::ExecuteRequestFailed {
                    session_id: session.to_string(),
                    command_line,
                    reason: e.to_string(),
                });
            }
        }

        Ok(execution)
    }

    /// Dispose the tracker of a closed session. Returns whether one existed.
    ///
    /// The session is remembered as closed, so late notifications do not
    /// bring it back, until `sessions.max_closed_sessions` newer closes
    /// evict it.
    pub async fn close_session(&self, session: &SessionId) -> bool {
        let removed = {
            let mut table = self.sessions.write().await;
            table.closed.insert(session.clone());
            trace!("{} closed session(s) remembered", table.closed.len());
            table.trackers.remove(session)
        };
        match removed {
            Some(tracker) => {
                tracker.dispose().await;
                info!("Closed shell integration session {}", session);
                true
            }
            None => false,
        }
    }

    /// Dispose every tracker. The registry accepts no session afterwards.
    pub async fn dispose(&self) {
        let trackers: Vec<_> = {
            let mut table = self.sessions.write().await;
            table.disposed = true;
            table.closed.clear();
            table.trackers.drain().collect()
        };
        for (_, tracker) in trackers {
            tracker.dispose().await;
        }
    }

    /// Every event from every session, in publication order
    pub fn subscribe(&self) -> EventSubscription {
        self.events.subscribe()
    }

    pub fn on_did_change_shell_integration(&self) -> EventSubscription {
        self.events.subscribe_kind(EventKind::ShellIntegrationChanged)
    }

    pub fn on_did_start_execution(&self) -> EventSubscription {
        self.events.subscribe_kind(EventKind::ExecutionStarted)
    }

    pub fn on_did_end_execution(&self) -> EventSubscription {
        self.events.subscribe_kind(EventKind::ExecutionEnded)
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }
}

impl Default for ShellIntegrationRegistry {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

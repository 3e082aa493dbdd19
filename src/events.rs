//! Shell Integration Event System
//!
//! Every tracker publishes through one bus, and each subscription gets its
//! own queue filled in publication order. A subscriber that watches both
//! starts and ends sees them in the order the tracker produced them, and a
//! subscriber that reads late still gets all of them. Filtered
//! subscriptions never see the other kinds.
//!
//! Subscriptions are explicit: call [`EventSubscription::unsubscribe`] (or
//! drop the subscription) to stop receiving.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use crate::execution::Execution;
use crate::models::{SessionId, ShellIntegrationSnapshot, TerminalTag};

/// Events published by shell integration trackers
#[derive(Debug, Clone)]
pub enum ShellIntegrationEvent {
    /// Shell integration activated, or its cwd/env changed
    ShellIntegrationChanged {
        session_id: SessionId,
        terminal: Option<TerminalTag>,
        shell_integration: ShellIntegrationSnapshot,
    },
    /// An execution was matched to a shell-reported start
    ExecutionStarted {
        session_id: SessionId,
        terminal: Option<TerminalTag>,
        shell_integration: ShellIntegrationSnapshot,
        execution: Execution,
    },
    /// An execution ended. `exit_code` is `None` when the shell never
    /// reported one (for example when a new start superseded it).
    ExecutionEnded {
        session_id: SessionId,
        terminal: Option<TerminalTag>,
        shell_integration: ShellIntegrationSnapshot,
        execution: Execution,
        exit_code: Option<i32>,
    },
}

/// Discriminant of [`ShellIntegrationEvent`], used for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ShellIntegrationChanged,
    ExecutionStarted,
    ExecutionEnded,
}

impl ShellIntegrationEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ShellIntegrationEvent::ShellIntegrationChanged { .. } => {
                EventKind::ShellIntegrationChanged
            }
            ShellIntegrationEvent::ExecutionStarted { .. } => EventKind::ExecutionStarted,
            ShellIntegrationEvent::ExecutionEnded { .. } => EventKind::ExecutionEnded,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        match self {
            ShellIntegrationEvent::ShellIntegrationChanged { session_id, .. }
            | ShellIntegrationEvent::ExecutionStarted { session_id, .. }
            | ShellIntegrationEvent::ExecutionEnded { session_id, .. } => session_id,
        }
    }

    /// The execution this event is about, if any
    pub fn execution(&self) -> Option<&Execution> {
        match self {
            ShellIntegrationEvent::ShellIntegrationChanged { .. } => None,
            ShellIntegrationEvent::ExecutionStarted { execution, .. }
            | ShellIntegrationEvent::ExecutionEnded { execution, .. } => Some(execution),
        }
    }
}

/// Subscription handle for receiving shell integration events
pub struct EventSubscription {
    receiver: mpsc::UnboundedReceiver<ShellIntegrationEvent>,
    active_subscribers: Arc<AtomicUsize>,
}

impl EventSubscription {
    /// Receive the next matching event, waiting if necessary.
    ///
    /// Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<ShellIntegrationEvent> {
        self.receiver.recv().await
    }

    /// Try to receive a matching event without blocking
    pub fn try_recv(&mut self) -> Option<ShellIntegrationEvent> {
        self.receiver.try_recv().ok()
    }

    /// Stop receiving events
    pub fn unsubscribe(self) {}
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.active_subscribers.fetch_sub(1, Ordering::AcqRel);
    }
}

struct Subscriber {
    sender: mpsc::UnboundedSender<ShellIntegrationEvent>,
    filter: Option<EventKind>,
}

impl Subscriber {
    fn accepts(&self, event: &ShellIntegrationEvent) -> bool {
        match self.filter {
            Some(kind) => event.kind() == kind,
            None => true,
        }
    }
}

/// Event bus shared by every tracker of a registry.
///
/// Each subscription owns an unbounded queue, so a subscriber that reads
/// late still receives every event in publication order.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    /// Active subscribers count (for monitoring)
    active_subscribers: Arc<AtomicUsize>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn subscription(&self, filter: Option<EventKind>) -> EventSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers().push(Subscriber { sender, filter });
        self.active_subscribers.fetch_add(1, Ordering::AcqRel);
        EventSubscription {
            receiver,
            active_subscribers: Arc::clone(&self.active_subscribers),
        }
    }

    /// Subscribe to every event
    pub fn subscribe(&self) -> EventSubscription {
        self.subscription(None)
    }

    /// Subscribe to one kind of event
    pub fn subscribe_kind(&self, kind: EventKind) -> EventSubscription {
        self.subscription(Some(kind))
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: ShellIntegrationEvent) {
        let mut subscribers = self.subscribers();
        // Dropped subscriptions are pruned here
        subscribers.retain(|subscriber| {
            if subscriber.sender.is_closed() {
                false
            } else if subscriber.accepts(&event) {
                subscriber.sender.send(event.clone()).is_ok()
            } else {
                true
            }
        });
        trace!(
            "Published {:?} to {} subscriber(s)",
            event.kind(),
            subscribers.len()
        );
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.active_subscribers.load(Ordering::Acquire)
    }
}

// Event Aggregator: fan-out dispatch of domain and error events to
// subscriber callbacks, resilient to a single handler's failure.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use notif_types::NotificationEvent;
use parking_lot::RwLock;
use tracing::error;

/// Identifies a registered subscriber for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Kind of an operation-failure event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Platform,
    Persistence,
    Queue,
    Handler,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Platform => "platform",
            Self::Persistence => "persistence",
            Self::Queue => "queue",
            Self::Handler => "handler",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// A failure surfaced on the error channel.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorEvent {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Where components deliver error events for asynchronous dispatch.
///
/// The service wires this to an enqueue on the main-thread queue so error
/// handlers never run while internal locks are held.
pub type ErrorSink = Arc<dyn Fn(ErrorEvent) + Send + Sync>;

type EventHandler = Arc<dyn Fn(&NotificationEvent) + Send + Sync>;
type ErrorHandler = Arc<dyn Fn(&ErrorEvent) + Send + Sync>;

struct Subscriber<H> {
    id: u64,
    handler: H,
}

/// Fan-out dispatcher for domain and error events.
///
/// Handlers run independently: a panicking handler is caught, logged with
/// its subscription id, and never prevents the remaining handlers from
/// running. Handlers are cloned out of the subscriber list before being
/// invoked, so a handler may subscribe or unsubscribe without deadlocking.
#[derive(Default)]
pub struct EventAggregator {
    subscribers: RwLock<Vec<Subscriber<EventHandler>>>,
    error_subscribers: RwLock<Vec<Subscriber<ErrorHandler>>>,
    next_id: AtomicU64,
}

impl EventAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&NotificationEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().push(Subscriber {
            id,
            handler: Arc::new(handler),
        });
        SubscriptionId(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id.0);
        subscribers.len() != before
    }

    pub fn subscribe_errors<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&ErrorEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.error_subscribers.write().push(Subscriber {
            id,
            handler: Arc::new(handler),
        });
        SubscriptionId(id)
    }

    pub fn unsubscribe_errors(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.error_subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id.0);
        subscribers.len() != before
    }

    /// Dispatch a domain event to every subscriber.
    ///
    /// Returns the number of handlers that panicked.
    pub fn publish(&self, event: &NotificationEvent) -> usize {
        let handlers: Vec<(u64, EventHandler)> = self
            .subscribers
            .read()
            .iter()
            .map(|s| (s.id, Arc::clone(&s.handler)))
            .collect();

        let mut failures = 0;
        for (id, handler) in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                failures += 1;
                error!(subscriber = id, kind = ?event.kind, "event handler panicked");
            }
        }
        failures
    }

    /// Dispatch an error event to every error subscriber.
    ///
    /// Callers route this through the main-thread queue so user code never
    /// runs while internal locks are held.
    pub fn dispatch_error(&self, event: &ErrorEvent) -> usize {
        let handlers: Vec<(u64, ErrorHandler)> = self
            .error_subscribers
            .read()
            .iter()
            .map(|s| (s.id, Arc::clone(&s.handler)))
            .collect();

        let mut failures = 0;
        for (id, handler) in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                failures += 1;
                error!(subscriber = id, kind = %event.kind, "error handler panicked");
            }
        }
        failures
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

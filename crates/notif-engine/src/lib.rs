//! # Notification Engine
//!
//! Host-agnostic local-notification scheduling and persistence engine:
//! a bounded identifier registry with strict FIFO eviction, a debounced
//! crash-safe store, a circuit breaker for error storms, and a bounded
//! main-thread action queue bridging background callers into the
//! single-threaded context that owns all native-notifier and file-system
//! calls.
//!
//! The native SDKs are reached only through the injectable
//! [`PlatformNotifier`] trait; construct a [`NotificationService`] with the
//! notifier for your platform and call [`NotificationService::tick`] from
//! your main loop. Background tasks use [`NotificationService::handle`] for
//! the async API.

pub mod breaker;
pub mod config;
pub mod error;
pub mod events;
pub mod group;
pub mod metrics;
pub mod persistence;
pub mod platform;
pub mod pool;
pub mod queue;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod service;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-exports for easier access
pub use breaker::CircuitBreaker;
pub use config::{
    CircuitBreakerConfig, EngineConfig, MainQueueConfig, OverflowPolicy, PersistenceConfig,
    PlatformLimits, PoolConfig, RegistryConfig,
};
pub use error::EngineError;
pub use events::{ErrorEvent, ErrorKind, ErrorSink, EventAggregator, SubscriptionId};
pub use group::GroupIndex;
pub use metrics::{MetricsSnapshot, ServiceMetrics};
pub use persistence::{
    LoadedStore, PersistenceController, ReturnConfig, STORE_VERSION, StorePayload, StoredEntry,
};
pub use platform::{NullNotifier, PermissionCallback, PlatformKind, PlatformNotifier};
pub use pool::{ObjectPool, PoolStats, Poolable};
pub use queue::{Action, DrainReport, MainThreadQueue};
pub use registry::IdentifierRegistry;
pub use scheduler::{NotificationScheduler, SchedulerDeps};
pub use service::{NotificationService, ServiceHandle};

// The shared domain types, re-exported so hosts depend on one crate.
pub use notif_types::{
    EventKind, MAX_DELAY_SECONDS, NotificationEvent, NotificationRequest, PlatformHandle,
    RepeatPolicy, RequestError,
};

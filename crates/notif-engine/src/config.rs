use std::path::PathBuf;
use std::time::Duration;

use crate::platform::PlatformKind;

// --- Component Configuration Types ---

/// Configuration for the identifier registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum tracked identifiers before FIFO eviction kicks in.
    pub capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

/// What to do when the main-thread queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Reject the new action and leave the queue untouched.
    Reject,
    /// Evict the oldest pending action, count the drop, and accept.
    #[default]
    DropOldest,
}

/// Configuration for the main-thread action queue.
#[derive(Debug, Clone)]
pub struct MainQueueConfig {
    /// Maximum pending actions.
    pub capacity: usize,
    pub overflow: OverflowPolicy,
    /// Maximum actions executed per drain call.
    pub max_actions_per_drain: usize,
    /// Time budget for a single drain call. The budget is checked between
    /// actions; a single action is never preempted.
    pub drain_budget: Duration,
}

impl Default for MainQueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            overflow: OverflowPolicy::DropOldest,
            max_actions_per_drain: 64,
            drain_budget: Duration::from_millis(5),
        }
    }
}

/// Configuration for the circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before a periodic tick closes it.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

/// Configuration for the persistence controller.
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Path of the primary store file. The atomic temp file is created in
    /// the same directory so the final rename stays on one filesystem.
    pub path: PathBuf,
    /// Debounce window: rapid `mark_dirty` calls within the window coalesce
    /// into a single flush.
    pub debounce: Duration,
    /// Bounded retries for a failed write before it counts as a breaker
    /// failure.
    pub write_retries: u32,
    /// Base delay between write retries.
    pub retry_base_delay: Duration,
    /// Cap on the backoff delay between write retries.
    pub retry_max_delay: Duration,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("notification_store.json"),
            debounce: Duration::from_millis(500),
            write_retries: 3,
            retry_base_delay: Duration::from_millis(50),
            retry_max_delay: Duration::from_millis(500),
        }
    }
}

/// Configuration for a bounded object pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Enable pooling. When disabled every acquire allocates fresh.
    pub enabled: bool,
    /// Maximum instances kept in the pool.
    pub pool_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pool_size: 16,
        }
    }
}

/// Per-platform limits on outstanding scheduled notifications.
///
/// These mirror the native SDK ceilings: iOS caps pending requests at 64,
/// Android at roughly 500 per app.
#[derive(Debug, Clone)]
pub struct PlatformLimits {
    pub android_max: usize,
    pub ios_max: usize,
}

impl PlatformLimits {
    pub fn for_kind(&self, kind: PlatformKind) -> usize {
        match kind {
            PlatformKind::Android => self.android_max,
            PlatformKind::Ios => self.ios_max,
        }
    }
}

impl Default for PlatformLimits {
    fn default() -> Self {
        Self {
            android_max: 500,
            ios_max: 64,
        }
    }
}

/// Aggregated engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub registry: RegistryConfig,
    pub queue: MainQueueConfig,
    pub breaker: CircuitBreakerConfig,
    pub persistence: PersistenceConfig,
    pub request_pool: PoolConfig,
    pub event_pool: PoolConfig,
    pub limits: PlatformLimits,
    /// Notification channel passed to the native notifier.
    pub default_channel: String,
    /// Timeout for async facade operations.
    pub async_timeout: Duration,
    /// How often live counters are folded into the aggregate snapshot.
    pub metrics_fold_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            queue: MainQueueConfig::default(),
            breaker: CircuitBreakerConfig::default(),
            persistence: PersistenceConfig::default(),
            request_pool: PoolConfig::default(),
            event_pool: PoolConfig::default(),
            limits: PlatformLimits::default(),
            default_channel: "default".to_string(),
            async_timeout: Duration::from_secs(5),
            metrics_fold_interval: Duration::from_secs(1),
        }
    }
}

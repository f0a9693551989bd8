// Object Pools: reusable request and event payloads to avoid allocation
// churn on the scheduling hot path.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use notif_types::{EventKind, NotificationEvent, NotificationRequest, RepeatPolicy};
use parking_lot::Mutex;

use crate::config::PoolConfig;
use crate::metrics::ServiceMetrics;

/// Types that can live in an [`ObjectPool`].
///
/// `reset` must return the instance to its default state without retaining
/// any reference to caller-owned data; keeping buffer capacity is fine and
/// is the point of pooling.
pub trait Poolable: Default + Send {
    fn reset(&mut self);
}

impl Poolable for NotificationRequest {
    fn reset(&mut self) {
        self.identifier.clear();
        self.title.clear();
        self.body.clear();
        self.delay_seconds = 0.0;
        self.repeat = RepeatPolicy::None;
        self.group = None;
        self.sound = None;
        self.icon = None;
        self.badge = None;
    }
}

impl Poolable for NotificationEvent {
    fn reset(&mut self) {
        self.kind = EventKind::Received;
        self.identifier.clear();
        self.detail.clear();
        self.granted = false;
    }
}

/// Pool statistics.
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    /// Acquires served from the pool
    pub hits: u64,
    /// Acquires that allocated fresh
    pub misses: u64,
    /// Instances currently held by the pool
    pub current_pool_size: usize,
}

/// Bounded stack-based pool.
///
/// `acquire` pops if available, else allocates; `release` resets the
/// instance and pushes it back only while under capacity, otherwise the
/// instance is dropped.
pub struct ObjectPool<T: Poolable> {
    config: PoolConfig,
    stack: Mutex<Vec<T>>,
    hits: AtomicU64,
    misses: AtomicU64,
    metrics: Option<Arc<ServiceMetrics>>,
}

impl<T: Poolable> ObjectPool<T> {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            stack: Mutex::new(Vec::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            metrics: None,
        }
    }

    pub fn with_metrics(config: PoolConfig, metrics: Arc<ServiceMetrics>) -> Self {
        Self {
            metrics: Some(metrics),
            ..Self::new(config)
        }
    }

    pub fn acquire(&self) -> T {
        if self.config.enabled {
            if let Some(instance) = self.stack.lock().pop() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                if let Some(ref metrics) = self.metrics {
                    metrics.record_pool_hit();
                }
                return instance;
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        if let Some(ref metrics) = self.metrics {
            metrics.record_pool_miss();
        }
        T::default()
    }

    pub fn release(&self, mut instance: T) {
        if !self.config.enabled {
            return;
        }
        instance.reset();

        let mut stack = self.stack.lock();
        if stack.len() < self.config.pool_size {
            stack.push(instance);
        }
        // Otherwise the instance is dropped.
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            current_pool_size: self.stack.lock().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pool_config(enabled: bool, pool_size: usize) -> PoolConfig {
        PoolConfig { enabled, pool_size }
    }

    #[test]
    fn acquire_release_reuses() {
        let pool: ObjectPool<NotificationRequest> = ObjectPool::new(pool_config(true, 4));
        let req = pool.acquire();
        pool.release(req);
        let _req2 = pool.acquire();

        let stats = pool.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.current_pool_size, 0);
    }

    #[test]
    fn release_resets_caller_data() {
        let pool: ObjectPool<NotificationRequest> = ObjectPool::new(pool_config(true, 4));
        let mut req = pool.acquire();
        req.identifier.push_str("id-1");
        req.title.push_str("secret title");
        req.body.push_str("secret body");
        req.group = Some("g".to_string());
        req.badge = Some(3);
        pool.release(req);

        let reused = pool.acquire();
        assert!(reused.identifier.is_empty());
        assert!(reused.title.is_empty());
        assert!(reused.body.is_empty());
        assert!(reused.group.is_none());
        assert!(reused.badge.is_none());
    }

    #[test]
    fn reset_keeps_string_capacity() {
        let pool: ObjectPool<NotificationRequest> = ObjectPool::new(pool_config(true, 4));
        let mut req = pool.acquire();
        req.title.push_str("a title long enough to allocate");
        let capacity = req.title.capacity();
        pool.release(req);

        let reused = pool.acquire();
        assert!(reused.title.capacity() >= capacity);
    }

    #[test]
    fn capacity_limit_drops_excess() {
        let pool: ObjectPool<NotificationEvent> = ObjectPool::new(pool_config(true, 2));
        let a = pool.acquire();
        let b = pool.acquire();
        let c = pool.acquire();
        pool.release(a);
        pool.release(b);
        pool.release(c);
        assert_eq!(pool.stats().current_pool_size, 2);
    }

    #[test]
    fn disabled_pool_always_allocates() {
        let pool: ObjectPool<NotificationEvent> = ObjectPool::new(pool_config(false, 4));
        let e = pool.acquire();
        pool.release(e);
        let _e2 = pool.acquire();
        let stats = pool.stats();
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.current_pool_size, 0);
    }

    #[test]
    fn hits_and_misses_feed_shared_metrics() {
        let metrics = Arc::new(ServiceMetrics::new());
        let pool: ObjectPool<NotificationEvent> =
            ObjectPool::with_metrics(pool_config(true, 4), Arc::clone(&metrics));
        let e = pool.acquire();
        pool.release(e);
        let _e2 = pool.acquire();
        assert_eq!(metrics.pool_misses.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.pool_hits.load(Ordering::Relaxed), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// For any acquire/release sequence, hits + misses equals the
        /// number of acquires and the pool never exceeds its capacity.
        #[test]
        fn prop_pool_accounting(
            operations in prop::collection::vec(any::<bool>(), 1..60),
            pool_size in 1usize..8,
        ) {
            let pool: ObjectPool<NotificationEvent> =
                ObjectPool::new(pool_config(true, pool_size));
            let mut held = Vec::new();
            let mut acquires = 0u64;

            for release_after in operations {
                let instance = pool.acquire();
                acquires += 1;
                if release_after {
                    pool.release(instance);
                } else {
                    held.push(instance);
                }
                prop_assert!(pool.stats().current_pool_size <= pool_size);
            }

            let stats = pool.stats();
            prop_assert_eq!(stats.hits + stats.misses, acquires);
        }
    }
}

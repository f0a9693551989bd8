// Main-Thread Queue: bounded FIFO of pending actions, drained with a
// per-tick budget. The sole bridge from background callers into the
// single-threaded context that owns platform and file-system calls.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::config::{MainQueueConfig, OverflowPolicy};
use crate::metrics::ServiceMetrics;

/// A queued action, executed with exclusive access to the engine context.
pub type Action<C> = Box<dyn FnOnce(&mut C) + Send + 'static>;

/// Outcome of a single drain call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Actions executed this drain, including failed ones.
    pub executed: usize,
    /// Actions that panicked; counted as system errors, never fatal.
    pub failed: usize,
    /// Actions still pending after the drain.
    pub remaining: usize,
}

/// Bounded FIFO action queue.
///
/// `enqueue` may be called from any thread; `drain` only from the owner of
/// the context. Batches are popped under the lock and executed outside it,
/// so enqueueing callers never wait on a running action.
pub struct MainThreadQueue<C> {
    config: MainQueueConfig,
    pending: Mutex<VecDeque<Action<C>>>,
    dropped: AtomicU64,
    closed: AtomicBool,
    metrics: Option<Arc<ServiceMetrics>>,
}

/// Popped-batch size per lock acquisition during a drain.
const DRAIN_BATCH: usize = 8;

impl<C> MainThreadQueue<C> {
    pub fn new(config: MainQueueConfig) -> Self {
        Self {
            config,
            pending: Mutex::new(VecDeque::new()),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            metrics: None,
        }
    }

    pub fn with_metrics(config: MainQueueConfig, metrics: Arc<ServiceMetrics>) -> Self {
        Self {
            metrics: Some(metrics),
            ..Self::new(config)
        }
    }

    /// Enqueue an action for the next drain.
    ///
    /// Returns false if the queue is closed, or full under the `Reject`
    /// policy. Under `DropOldest` the head action is discarded first and
    /// the drop counted.
    pub fn enqueue(&self, action: Action<C>) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }

        let mut pending = self.pending.lock();
        if pending.len() >= self.config.capacity {
            match self.config.overflow {
                OverflowPolicy::Reject => {
                    drop(pending);
                    warn!(
                        capacity = self.config.capacity,
                        "main-thread queue full, rejecting action"
                    );
                    return false;
                }
                OverflowPolicy::DropOldest => {
                    pending.pop_front();
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    if let Some(ref metrics) = self.metrics {
                        metrics.record_queue_drop();
                    }
                    debug!("main-thread queue full, dropped oldest action");
                }
            }
        }
        pending.push_back(action);
        true
    }

    /// Execute pending actions against the context.
    ///
    /// Stops after `max_actions`, or when the time budget is exhausted
    /// (checked between actions). A panicking action is caught, logged,
    /// and counted; it never aborts the drain of subsequent actions.
    pub fn drain(&self, ctx: &mut C, max_actions: usize, budget: Duration) -> DrainReport {
        let deadline = Instant::now() + budget;
        let mut report = DrainReport::default();

        'outer: while report.executed < max_actions {
            let mut batch: VecDeque<Action<C>> = {
                let mut pending = self.pending.lock();
                let take = DRAIN_BATCH
                    .min(max_actions - report.executed)
                    .min(pending.len());
                pending.drain(..take).collect()
            };
            if batch.is_empty() {
                break;
            }

            while let Some(action) = batch.pop_front() {
                if catch_unwind(AssertUnwindSafe(|| action(ctx))).is_err() {
                    report.failed += 1;
                    if let Some(ref metrics) = self.metrics {
                        metrics.record_error();
                    }
                    error!("queued action panicked; continuing drain");
                }
                report.executed += 1;

                if Instant::now() >= deadline {
                    // Budget exhausted mid-batch: put the already-popped
                    // remainder back at the front, preserving order.
                    if !batch.is_empty() {
                        let mut pending = self.pending.lock();
                        while let Some(unrun) = batch.pop_back() {
                            pending.push_front(unrun);
                        }
                    }
                    break 'outer;
                }
            }
        }

        report.remaining = self.pending.lock().len();
        report
    }

    /// Reject all future enqueues. Pending actions stay drainable.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Actions discarded by the drop-oldest overflow policy.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Ctx {
        log: Vec<u32>,
    }

    fn config(capacity: usize, overflow: OverflowPolicy) -> MainQueueConfig {
        MainQueueConfig {
            capacity,
            overflow,
            ..MainQueueConfig::default()
        }
    }

    fn push(queue: &MainThreadQueue<Ctx>, value: u32) -> bool {
        queue.enqueue(Box::new(move |ctx: &mut Ctx| ctx.log.push(value)))
    }

    #[test]
    fn drain_runs_in_fifo_order() {
        let queue = MainThreadQueue::new(config(16, OverflowPolicy::Reject));
        for i in 0..5 {
            assert!(push(&queue, i));
        }
        let mut ctx = Ctx::default();
        let report = queue.drain(&mut ctx, 64, Duration::from_secs(1));
        assert_eq!(report.executed, 5);
        assert_eq!(report.failed, 0);
        assert_eq!(report.remaining, 0);
        assert_eq!(ctx.log, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn drain_respects_max_actions() {
        let queue = MainThreadQueue::new(config(16, OverflowPolicy::Reject));
        for i in 0..10 {
            push(&queue, i);
        }
        let mut ctx = Ctx::default();
        let report = queue.drain(&mut ctx, 3, Duration::from_secs(1));
        assert_eq!(report.executed, 3);
        assert_eq!(report.remaining, 7);
        assert_eq!(ctx.log, vec![0, 1, 2]);

        let report = queue.drain(&mut ctx, 64, Duration::from_secs(1));
        assert_eq!(report.executed, 7);
        assert_eq!(ctx.log.len(), 10);
    }

    #[test]
    fn drain_stops_on_time_budget_and_requeues_rest() {
        let queue: MainThreadQueue<Ctx> = MainThreadQueue::new(config(16, OverflowPolicy::Reject));
        queue.enqueue(Box::new(|_| {
            std::thread::sleep(Duration::from_millis(20));
        }));
        for i in 0..4 {
            push(&queue, i);
        }
        let mut ctx = Ctx::default();
        let report = queue.drain(&mut ctx, 64, Duration::from_millis(1));
        assert_eq!(report.executed, 1);
        assert_eq!(report.remaining, 4);

        // Nothing was lost; a later drain finishes the rest in order.
        let report = queue.drain(&mut ctx, 64, Duration::from_secs(1));
        assert_eq!(report.executed, 4);
        assert_eq!(ctx.log, vec![0, 1, 2, 3]);
    }

    #[test]
    fn reject_policy_leaves_queue_untouched() {
        let queue = MainThreadQueue::new(config(2, OverflowPolicy::Reject));
        assert!(push(&queue, 0));
        assert!(push(&queue, 1));
        assert!(!push(&queue, 2));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped_count(), 0);

        let mut ctx = Ctx::default();
        queue.drain(&mut ctx, 64, Duration::from_secs(1));
        assert_eq!(ctx.log, vec![0, 1]);
    }

    #[test]
    fn drop_oldest_policy_evicts_head_and_counts() {
        let queue = MainThreadQueue::new(config(2, OverflowPolicy::DropOldest));
        assert!(push(&queue, 0));
        assert!(push(&queue, 1));
        assert!(push(&queue, 2));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped_count(), 1);

        let mut ctx = Ctx::default();
        queue.drain(&mut ctx, 64, Duration::from_secs(1));
        assert_eq!(ctx.log, vec![1, 2]);
    }

    #[test]
    fn panicking_action_does_not_abort_drain() {
        let queue: MainThreadQueue<Ctx> = MainThreadQueue::new(config(16, OverflowPolicy::Reject));
        push(&queue, 0);
        queue.enqueue(Box::new(|_| panic!("boom")));
        push(&queue, 1);

        let mut ctx = Ctx::default();
        let report = queue.drain(&mut ctx, 64, Duration::from_secs(1));
        assert_eq!(report.executed, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(ctx.log, vec![0, 1]);
    }

    #[test]
    fn drops_feed_shared_metrics() {
        let metrics = Arc::new(ServiceMetrics::new());
        let queue = MainThreadQueue::with_metrics(
            config(1, OverflowPolicy::DropOldest),
            Arc::clone(&metrics),
        );
        push(&queue, 0);
        push(&queue, 1);
        assert_eq!(metrics.queue_drops.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn closed_queue_rejects_enqueues() {
        let queue = MainThreadQueue::new(config(16, OverflowPolicy::Reject));
        push(&queue, 0);
        queue.close();
        assert!(!push(&queue, 1));

        // Pending actions are still drainable after close.
        let mut ctx = Ctx::default();
        let report = queue.drain(&mut ctx, 64, Duration::from_secs(1));
        assert_eq!(report.executed, 1);
        assert_eq!(ctx.log, vec![0]);
    }
}

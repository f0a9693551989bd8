// Notification Service: composition root owning every component, the
// per-frame tick that drives the main context, and the async facade used
// by background callers.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use notif_types::{EventKind, NotificationEvent, NotificationRequest, RepeatPolicy};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::breaker::CircuitBreaker;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::events::{ErrorEvent, ErrorSink, EventAggregator, SubscriptionId};
use crate::group::GroupIndex;
use crate::metrics::{MetricsSnapshot, ServiceMetrics};
use crate::persistence::{PersistenceController, ReturnConfig, StorePayload};
use crate::platform::PlatformNotifier;
use crate::pool::ObjectPool;
use crate::queue::MainThreadQueue;
use crate::registry::IdentifierRegistry;
use crate::scheduler::{NotificationScheduler, SchedulerDeps};

/// Identifier reserved for the focus-loss "come back" notification.
const RETURN_IDENTIFIER: &str = "engine.return-notification";

/// Rough per-entry footprint used for the memory estimate in snapshots.
const ENTRY_FOOTPRINT_BYTES: u64 = 128;
const ACTION_FOOTPRINT_BYTES: u64 = 64;

/// Everything the main context mutates; queued actions receive it
/// exclusively during a drain.
pub struct EngineCore {
    pub(crate) scheduler: NotificationScheduler,
    pub(crate) persistence: Arc<PersistenceController>,
    pub(crate) aggregator: Arc<EventAggregator>,
    pub(crate) event_pool: ObjectPool<NotificationEvent>,
    pub(crate) return_config: ReturnConfig,
    pub(crate) return_active: bool,
    pub(crate) last_foreground_ts: i64,
}

impl EngineCore {
    fn store_payload(&self) -> StorePayload {
        StorePayload {
            entries: self.scheduler.store_entries(),
            return_config: self.return_config.clone(),
            last_foreground_ts: self.last_foreground_ts,
        }
    }

    /// Publish a domain event through a pooled payload.
    pub(crate) fn publish_event(
        &mut self,
        kind: EventKind,
        identifier: &str,
        detail: &str,
        granted: bool,
    ) {
        let mut event = self.event_pool.acquire();
        event.kind = kind;
        event.identifier.push_str(identifier);
        event.detail.push_str(detail);
        event.granted = granted;
        self.aggregator.publish(&event);
        self.event_pool.release(event);
    }
}

/// The notification engine's composition root.
///
/// Explicitly constructed and owned by the host; there is no static
/// accessor. The owner must call [`NotificationService::tick`] regularly
/// from the thread that owns the service — that thread is the "main
/// context" where every platform-notifier call and store write happens.
pub struct NotificationService {
    core: EngineCore,
    queue: Arc<MainThreadQueue<EngineCore>>,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<ServiceMetrics>,
    registry: Arc<IdentifierRegistry>,
    config: EngineConfig,
    shutdown: Arc<AtomicBool>,
    last_fold: Instant,
}

impl NotificationService {
    pub fn new(config: EngineConfig, notifier: Box<dyn PlatformNotifier>) -> Self {
        let metrics = Arc::new(ServiceMetrics::new());
        let breaker = Arc::new(CircuitBreaker::new(config.breaker.clone()));
        let registry = Arc::new(IdentifierRegistry::new(config.registry.clone()));
        let groups = Arc::new(GroupIndex::new());
        let persistence = Arc::new(PersistenceController::new(
            config.persistence.clone(),
            Arc::clone(&breaker),
            Arc::clone(&metrics),
        ));
        let queue = Arc::new(MainThreadQueue::with_metrics(
            config.queue.clone(),
            Arc::clone(&metrics),
        ));
        let aggregator = Arc::new(EventAggregator::new());

        // Error events ride the queue so handlers never run while a
        // component lock is held.
        let error_sink: ErrorSink = {
            let queue = Arc::clone(&queue);
            Arc::new(move |event: ErrorEvent| {
                let accepted = queue.enqueue(Box::new(move |core: &mut EngineCore| {
                    core.aggregator.dispatch_error(&event);
                }));
                if !accepted {
                    debug!("error event dropped, queue closed or full");
                }
            })
        };

        let scheduler = NotificationScheduler::new(
            &config,
            SchedulerDeps {
                registry: Arc::clone(&registry),
                groups,
                breaker: Arc::clone(&breaker),
                metrics: Arc::clone(&metrics),
                persistence: Arc::clone(&persistence),
                notifier,
                error_sink,
            },
        );

        let event_pool =
            ObjectPool::with_metrics(config.event_pool.clone(), Arc::clone(&metrics));

        Self {
            core: EngineCore {
                scheduler,
                persistence,
                aggregator,
                event_pool,
                return_config: ReturnConfig::default(),
                return_active: false,
                last_foreground_ts: 0,
            },
            queue,
            breaker,
            metrics,
            registry,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            last_fold: Instant::now(),
        }
    }

    /// Load the persisted store and seed the registry.
    ///
    /// Restored entries are tracked for cancellation but never re-scheduled
    /// natively. A migrated legacy record is queued for rewrite in the new
    /// format.
    pub fn bootstrap(&mut self) {
        let loaded = self.core.persistence.load();
        let restored = loaded.payload.entries.len();
        self.core.scheduler.restore_entries(&loaded.payload.entries);
        self.core.return_config = loaded.payload.return_config;
        self.core.last_foreground_ts = loaded.payload.last_foreground_ts;
        if loaded.migrated {
            self.core.persistence.mark_dirty();
        }
        for entry in &loaded.payload.entries {
            self.core
                .publish_event(EventKind::Restored, &entry.identifier, "", false);
        }
        if restored > 0 {
            info!(restored, "notification store restored");
        }
    }

    /// Drive the main context: drain queued actions within budget, tick the
    /// breaker, flush due persistence, and periodically fold metrics.
    pub fn tick(&mut self) {
        let report = self.queue.drain(
            &mut self.core,
            self.config.queue.max_actions_per_drain,
            self.config.queue.drain_budget,
        );
        if report.failed > 0 {
            debug!(failed = report.failed, "queued actions failed during drain");
        }

        self.breaker.tick();

        if self.core.persistence.due(Instant::now()) {
            let payload = self.core.store_payload();
            // Flush logs its own failures; an open circuit just waits.
            let _ = self.core.persistence.flush(&payload);
        }

        if self.last_fold.elapsed() >= self.config.metrics_fold_interval {
            self.metrics.fold(self.approx_memory_bytes());
            self.last_fold = Instant::now();
        }
    }

    fn approx_memory_bytes(&self) -> u64 {
        self.registry.count() as u64 * ENTRY_FOOTPRINT_BYTES
            + self.queue.len() as u64 * ACTION_FOOTPRINT_BYTES
    }

    fn available(&self) -> bool {
        if self.shutdown.load(Ordering::Acquire) {
            debug!("operation rejected, service shut down");
            return false;
        }
        true
    }

    // --- Synchronous API (main context only) ---

    pub fn schedule(&mut self, title: &str, body: &str, delay_seconds: f64) -> bool {
        self.available() && self.core.scheduler.schedule(title, body, delay_seconds)
    }

    pub fn schedule_identified(
        &mut self,
        title: &str,
        body: &str,
        delay_seconds: f64,
        identifier: &str,
    ) -> bool {
        self.available()
            && self
                .core
                .scheduler
                .schedule_identified(title, body, delay_seconds, identifier)
    }

    pub fn schedule_repeating(
        &mut self,
        title: &str,
        body: &str,
        delay_seconds: f64,
        repeat: RepeatPolicy,
        identifier: Option<&str>,
    ) -> bool {
        self.available()
            && self
                .core
                .scheduler
                .schedule_repeating(title, body, delay_seconds, repeat, identifier)
    }

    pub fn schedule_request(&mut self, spec: &NotificationRequest) -> bool {
        self.available() && self.core.scheduler.schedule_request(spec)
    }

    pub fn schedule_many(&mut self, specs: &[NotificationRequest]) -> Vec<bool> {
        if !self.available() {
            return vec![false; specs.len()];
        }
        self.core.scheduler.schedule_many(specs)
    }

    pub fn cancel(&mut self, identifier: &str) {
        if self.available() {
            self.core.scheduler.cancel(identifier);
        }
    }

    pub fn cancel_many(&mut self, identifiers: &[String]) -> usize {
        if !self.available() {
            return 0;
        }
        self.core.scheduler.cancel_many(identifiers)
    }

    pub fn cancel_group(&mut self, group: &str) -> usize {
        if !self.available() {
            return 0;
        }
        self.core.scheduler.cancel_group(group)
    }

    pub fn cancel_all(&mut self) -> usize {
        if !self.available() {
            return 0;
        }
        self.core.scheduler.cancel_all()
    }

    pub fn cancel_all_displayed(&mut self) -> bool {
        self.available() && self.core.scheduler.cancel_all_displayed()
    }

    pub fn scheduled_count(&self) -> usize {
        self.core.scheduler.count()
    }

    pub fn is_scheduled(&self, identifier: &str) -> bool {
        self.core.scheduler.is_scheduled(identifier)
    }

    // --- Events ---

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&NotificationEvent) + Send + Sync + 'static,
    {
        self.core.aggregator.subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.core.aggregator.unsubscribe(id)
    }

    pub fn subscribe_errors<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&ErrorEvent) + Send + Sync + 'static,
    {
        self.core.aggregator.subscribe_errors(handler)
    }

    pub fn unsubscribe_errors(&self, id: SubscriptionId) -> bool {
        self.core.aggregator.unsubscribe_errors(id)
    }

    /// Platform glue reports a notification delivered in the foreground.
    pub fn notify_received(&mut self, identifier: &str) {
        self.core
            .publish_event(EventKind::Received, identifier, "", false);
    }

    /// Platform glue reports the user tapped a notification.
    pub fn notify_tapped(&mut self, identifier: &str, action: &str) {
        self.core
            .publish_event(EventKind::Tapped, identifier, action, false);
    }

    // --- Permission ---

    pub fn check_permission(&mut self) -> bool {
        self.available() && self.core.scheduler.check_permission()
    }

    /// Ask the OS for permission; the outcome arrives as a
    /// `PermissionChanged` event on the next tick after the platform
    /// answers.
    pub fn request_permission(&mut self) {
        if !self.available() {
            return;
        }
        let queue = Arc::clone(&self.queue);
        self.core
            .scheduler
            .request_permission(Box::new(move |granted| {
                let accepted = queue.enqueue(Box::new(move |core: &mut EngineCore| {
                    core.publish_event(EventKind::PermissionChanged, "", "", granted);
                }));
                if !accepted {
                    warn!("permission result dropped, queue closed");
                }
            }));
    }

    // --- Return notification & focus tracking ---

    pub fn set_return_notification(&mut self, config: ReturnConfig) {
        self.core.return_config = config;
        self.core.persistence.mark_dirty();
    }

    pub fn return_notification(&self) -> &ReturnConfig {
        &self.core.return_config
    }

    /// Host focus transitions: losing focus schedules the configured
    /// "come back" notification; regaining focus cancels it and stamps the
    /// last-foreground time.
    pub fn on_focus_changed(&mut self, focused: bool) {
        if !self.available() {
            return;
        }
        if focused {
            self.core.last_foreground_ts = chrono::Utc::now().timestamp();
            if self.core.return_active {
                self.core.return_active = false;
                self.core.scheduler.cancel(RETURN_IDENTIFIER);
            }
            self.core.persistence.mark_dirty();
        } else if self.core.return_config.enabled {
            let spec = NotificationRequest::new(
                self.core.return_config.title.clone(),
                self.core.return_config.body.clone(),
                self.core.return_config.delay_seconds,
            )
            .with_identifier(RETURN_IDENTIFIER);
            self.core.return_active = self.core.scheduler.schedule_request(&spec);
        }
    }

    // --- Metrics ---

    /// The aggregate snapshot as of the last fold.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.latest()
    }

    /// Read the live counters immediately, bypassing the fold interval.
    pub fn metrics_snapshot_now(&self) -> MetricsSnapshot {
        self.metrics.snapshot_now(self.approx_memory_bytes())
    }

    pub fn export_metrics(&self, path: &Path) -> Result<(), EngineError> {
        self.metrics.export_to_file(path)
    }

    // --- Lifecycle ---

    /// Stop accepting work, run remaining queued actions, and flush.
    ///
    /// Idempotent. After shutdown every operation is rejected and async
    /// callers receive a service-unavailable error.
    pub fn shutdown(&mut self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.queue.close();
        self.queue.drain(
            &mut self.core,
            self.config.queue.capacity,
            Duration::from_millis(100),
        );

        self.core.persistence.mark_dirty();
        let payload = self.core.store_payload();
        if let Err(e) = self.core.persistence.flush(&payload) {
            warn!(error = %e, "final flush failed during shutdown");
        }
        info!("notification service shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// A cloneable, `Send` handle for background callers.
    pub fn handle(&self) -> ServiceHandle {
        ServiceHandle {
            queue: Arc::clone(&self.queue),
            shutdown: Arc::clone(&self.shutdown),
            timeout: self.config.async_timeout,
        }
    }
}

/// Async facade over the service.
///
/// Every operation enqueues a closure on the main-thread queue and awaits
/// its completion through a oneshot future, bounded by the configured
/// timeout and the caller's cancellation token. On timeout or cancellation
/// the action, if it eventually runs, completes harmlessly against state
/// the caller no longer observes.
#[derive(Clone)]
pub struct ServiceHandle {
    queue: Arc<MainThreadQueue<EngineCore>>,
    shutdown: Arc<AtomicBool>,
    timeout: Duration,
}

impl ServiceHandle {
    async fn run<T, F>(&self, token: &CancellationToken, op: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(&mut EngineCore) -> T + Send + 'static,
    {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(EngineError::Unavailable);
        }
        let (tx, rx) = oneshot::channel();
        let accepted = self.queue.enqueue(Box::new(move |core: &mut EngineCore| {
            // The receiver may be gone after a timeout or cancellation;
            // completing is still harmless.
            let _ = tx.send(op(core));
        }));
        if !accepted {
            return if self.shutdown.load(Ordering::Acquire) {
                Err(EngineError::Unavailable)
            } else {
                Err(EngineError::QueueFull)
            };
        }

        tokio::select! {
            _ = token.cancelled() => Err(EngineError::Cancelled),
            outcome = tokio::time::timeout(self.timeout, rx) => match outcome {
                Err(_) => Err(EngineError::Timeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                }),
                Ok(Err(_)) => Err(EngineError::internal(
                    "completion channel closed before the action ran",
                )),
                Ok(Ok(value)) => Ok(value),
            },
        }
    }

    pub async fn schedule(
        &self,
        title: &str,
        body: &str,
        delay_seconds: f64,
        token: &CancellationToken,
    ) -> Result<bool, EngineError> {
        let title = title.to_string();
        let body = body.to_string();
        self.run(token, move |core| {
            core.scheduler.schedule(&title, &body, delay_seconds)
        })
        .await
    }

    pub async fn schedule_request(
        &self,
        spec: NotificationRequest,
        token: &CancellationToken,
    ) -> Result<bool, EngineError> {
        self.run(token, move |core| core.scheduler.schedule_request(&spec))
            .await
    }

    pub async fn schedule_many(
        &self,
        specs: Vec<NotificationRequest>,
        token: &CancellationToken,
    ) -> Result<Vec<bool>, EngineError> {
        self.run(token, move |core| core.scheduler.schedule_many(&specs))
            .await
    }

    pub async fn cancel(
        &self,
        identifier: &str,
        token: &CancellationToken,
    ) -> Result<bool, EngineError> {
        let identifier = identifier.to_string();
        self.run(token, move |core| core.scheduler.cancel(&identifier))
            .await
    }

    pub async fn cancel_many(
        &self,
        identifiers: Vec<String>,
        token: &CancellationToken,
    ) -> Result<usize, EngineError> {
        self.run(token, move |core| core.scheduler.cancel_many(&identifiers))
            .await
    }

    pub async fn cancel_all(&self, token: &CancellationToken) -> Result<usize, EngineError> {
        self.run(token, move |core| core.scheduler.cancel_all()).await
    }

    pub async fn scheduled_count(&self, token: &CancellationToken) -> Result<usize, EngineError> {
        self.run(token, move |core| core.scheduler.count()).await
    }

    pub async fn is_scheduled(
        &self,
        identifier: &str,
        token: &CancellationToken,
    ) -> Result<bool, EngineError> {
        let identifier = identifier.to_string();
        self.run(token, move |core| core.scheduler.is_scheduled(&identifier))
            .await
    }
}

// Notification Scheduler: validates requests, gates them on the circuit
// breaker and platform limits, drives the native notifier, and keeps the
// registry, group index, persistence dirty-flag, and metrics in step.

use std::sync::Arc;

use notif_types::{NotificationRequest, PlatformHandle, RepeatPolicy};
use tracing::{debug, warn};

use crate::breaker::CircuitBreaker;
use crate::config::{EngineConfig, PlatformLimits};
use crate::error::EngineError;
use crate::events::{ErrorEvent, ErrorKind, ErrorSink};
use crate::group::GroupIndex;
use crate::metrics::ServiceMetrics;
use crate::persistence::{PersistenceController, StoredEntry};
use crate::platform::{PermissionCallback, PlatformNotifier};
use crate::pool::ObjectPool;
use crate::registry::IdentifierRegistry;

/// Shared infrastructure handed to the scheduler by the composition root.
pub struct SchedulerDeps {
    pub registry: Arc<IdentifierRegistry>,
    pub groups: Arc<GroupIndex>,
    pub breaker: Arc<CircuitBreaker>,
    pub metrics: Arc<ServiceMetrics>,
    pub persistence: Arc<PersistenceController>,
    pub notifier: Box<dyn PlatformNotifier>,
    pub error_sink: ErrorSink,
}

/// Orchestrates scheduling and cancellation against the native notifier.
///
/// Runs exclusively on the main context. All failures are converted into
/// boolean outcomes; platform errors additionally feed the circuit breaker
/// and the error-event channel, and never propagate to the caller.
pub struct NotificationScheduler {
    limits: PlatformLimits,
    default_channel: String,
    registry: Arc<IdentifierRegistry>,
    groups: Arc<GroupIndex>,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<ServiceMetrics>,
    persistence: Arc<PersistenceController>,
    request_pool: ObjectPool<NotificationRequest>,
    notifier: Box<dyn PlatformNotifier>,
    error_sink: ErrorSink,
}

impl NotificationScheduler {
    pub fn new(config: &EngineConfig, deps: SchedulerDeps) -> Self {
        let request_pool =
            ObjectPool::with_metrics(config.request_pool.clone(), Arc::clone(&deps.metrics));
        Self {
            limits: config.limits.clone(),
            default_channel: config.default_channel.clone(),
            registry: deps.registry,
            groups: deps.groups,
            breaker: deps.breaker,
            metrics: deps.metrics,
            persistence: deps.persistence,
            request_pool,
            notifier: deps.notifier,
            error_sink: deps.error_sink,
        }
    }

    // --- Scheduling ---

    /// Schedule a one-shot notification with an auto-generated identifier.
    pub fn schedule(&mut self, title: &str, body: &str, delay_seconds: f64) -> bool {
        self.schedule_impl(title, body, delay_seconds, RepeatPolicy::None, None, None)
    }

    /// Schedule a one-shot notification under a caller-supplied identifier.
    pub fn schedule_identified(
        &mut self,
        title: &str,
        body: &str,
        delay_seconds: f64,
        identifier: &str,
    ) -> bool {
        self.schedule_impl(
            title,
            body,
            delay_seconds,
            RepeatPolicy::None,
            Some(identifier),
            None,
        )
    }

    pub fn schedule_repeating(
        &mut self,
        title: &str,
        body: &str,
        delay_seconds: f64,
        repeat: RepeatPolicy,
        identifier: Option<&str>,
    ) -> bool {
        self.schedule_impl(title, body, delay_seconds, repeat, identifier, None)
    }

    /// Schedule from a fully specified request.
    pub fn schedule_request(&mut self, spec: &NotificationRequest) -> bool {
        let mut buffer = self.request_pool.acquire();
        Self::copy_spec(&mut buffer, spec);
        let outcome = self.dispatch(&buffer);
        self.request_pool.release(buffer);
        outcome
    }

    /// Schedule a batch; each request succeeds or fails independently.
    pub fn schedule_many(&mut self, specs: &[NotificationRequest]) -> Vec<bool> {
        specs.iter().map(|spec| self.schedule_request(spec)).collect()
    }

    fn schedule_impl(
        &mut self,
        title: &str,
        body: &str,
        delay_seconds: f64,
        repeat: RepeatPolicy,
        identifier: Option<&str>,
        group: Option<&str>,
    ) -> bool {
        let mut buffer = self.request_pool.acquire();
        buffer.title.push_str(title);
        buffer.body.push_str(body);
        buffer.delay_seconds = delay_seconds;
        buffer.repeat = repeat;
        match identifier {
            Some(id) if !id.is_empty() => buffer.identifier.push_str(id),
            _ => buffer
                .identifier
                .push_str(&uuid::Uuid::new_v4().to_string()),
        }
        buffer.group = group.map(str::to_string);

        let outcome = self.dispatch(&buffer);
        self.request_pool.release(buffer);
        outcome
    }

    fn copy_spec(buffer: &mut NotificationRequest, spec: &NotificationRequest) {
        buffer.title.push_str(&spec.title);
        buffer.body.push_str(&spec.body);
        buffer.delay_seconds = spec.delay_seconds;
        buffer.repeat = spec.repeat;
        if spec.identifier.is_empty() {
            buffer
                .identifier
                .push_str(&uuid::Uuid::new_v4().to_string());
        } else {
            buffer.identifier.push_str(&spec.identifier);
        }
        buffer.group = spec.group.clone();
        buffer.sound = spec.sound.clone();
        buffer.icon = spec.icon.clone();
        buffer.badge = spec.badge;
    }

    fn dispatch(&mut self, buffer: &NotificationRequest) -> bool {
        match self.try_schedule(buffer) {
            Ok(()) => true,
            Err(e) => {
                self.note_failure(&e, "schedule");
                false
            }
        }
    }

    fn try_schedule(&mut self, buffer: &NotificationRequest) -> Result<(), EngineError> {
        buffer.validate()?;
        if self.breaker.is_open() {
            return Err(EngineError::CircuitOpen);
        }
        let limit = self.limits.for_kind(self.notifier.kind());
        if self.registry.count() >= limit {
            return Err(EngineError::LimitExceeded { limit });
        }

        let handle = self
            .notifier
            .schedule_native(buffer, &self.default_channel)?;
        self.breaker.record_success();

        if let Some((evicted_id, evicted_handle)) = self.registry.insert(&buffer.identifier, handle)
        {
            self.groups.remove_member(&evicted_id);
            debug!(evicted = %evicted_id, "registry at capacity, evicted oldest entry");
            // Best-effort: keep the OS queue in step with the registry.
            if let Err(e) = self.notifier.cancel_native(evicted_handle) {
                self.note_failure(&e, "cancel evicted");
            }
        }
        if let Some(group) = buffer.group.as_deref() {
            self.groups.add_member(group, &buffer.identifier);
        }

        self.persistence.mark_dirty();
        self.metrics.record_scheduled();
        debug!(identifier = %buffer.identifier, handle = %handle, "notification scheduled");
        Ok(())
    }

    // --- Cancellation ---

    /// Cancel one notification. Unknown identifiers are a no-op and leave
    /// the cancellation counter untouched.
    pub fn cancel(&mut self, identifier: &str) -> bool {
        let Some(handle) = self.registry.remove(identifier) else {
            debug!(identifier, "cancel: identifier not tracked");
            return false;
        };
        self.groups.remove_member(identifier);
        self.cancel_on_platform(identifier, handle);
        self.persistence.mark_dirty();
        self.metrics.record_cancelled(1);
        true
    }

    /// Cancel a batch under a single registry lock acquisition; native
    /// cancellations happen outside any lock.
    pub fn cancel_many(&mut self, identifiers: &[String]) -> usize {
        let removed = self.registry.remove_many(identifiers);
        if removed.is_empty() {
            return 0;
        }
        for (id, _) in &removed {
            self.groups.remove_member(id);
        }
        for (id, handle) in &removed {
            self.cancel_on_platform(id, *handle);
        }
        self.persistence.mark_dirty();
        self.metrics.record_cancelled(removed.len() as u64);
        removed.len()
    }

    /// Cancel every notification in a group.
    pub fn cancel_group(&mut self, group: &str) -> usize {
        let members = self.groups.remove_group(group);
        if members.is_empty() {
            return 0;
        }
        let removed = self.registry.remove_many(&members);
        for (id, handle) in &removed {
            self.cancel_on_platform(id, *handle);
        }
        if !removed.is_empty() {
            self.persistence.mark_dirty();
            self.metrics.record_cancelled(removed.len() as u64);
        }
        removed.len()
    }

    /// Cancel everything: one native call covers the whole pending queue.
    pub fn cancel_all(&mut self) -> usize {
        let drained = self.registry.drain_all();
        self.groups.clear();
        match self.notifier.cancel_all_scheduled() {
            Ok(()) => self.breaker.record_success(),
            Err(e) => self.note_failure(&e, "cancel all"),
        }
        if !drained.is_empty() {
            self.persistence.mark_dirty();
            self.metrics.record_cancelled(drained.len() as u64);
        }
        drained.len()
    }

    /// Clear delivered notifications from the tray.
    pub fn cancel_all_displayed(&mut self) -> bool {
        match self.notifier.cancel_all_displayed() {
            Ok(()) => {
                self.breaker.record_success();
                true
            }
            Err(e) => {
                self.note_failure(&e, "cancel displayed");
                false
            }
        }
    }

    fn cancel_on_platform(&mut self, identifier: &str, handle: PlatformHandle) {
        match self.notifier.cancel_native(handle) {
            Ok(()) => self.breaker.record_success(),
            Err(e) => {
                warn!(identifier, handle = %handle, error = %e, "native cancellation failed");
                self.note_failure(&e, "cancel");
            }
        }
    }

    // --- Queries & passthroughs ---

    pub fn count(&self) -> usize {
        self.registry.count()
    }

    pub fn is_scheduled(&self, identifier: &str) -> bool {
        self.registry.contains(identifier)
    }

    pub fn check_permission(&mut self) -> bool {
        self.notifier.check_permission()
    }

    pub fn request_permission(&mut self, callback: PermissionCallback) {
        self.notifier.request_permission(callback);
    }

    /// The tracked set as persistable entries, in insertion order.
    pub fn store_entries(&self) -> Vec<StoredEntry> {
        self.registry
            .snapshot()
            .into_iter()
            .map(|(identifier, handle)| StoredEntry { identifier, handle })
            .collect()
    }

    /// Seed the registry from a loaded store. Restored entries are tracked
    /// for cancellation, never re-scheduled natively.
    pub fn restore_entries(&mut self, entries: &[StoredEntry]) {
        for entry in entries {
            if let Some((dropped, _)) = self.registry.insert(&entry.identifier, entry.handle) {
                warn!(identifier = %dropped, "store larger than registry capacity, dropped entry");
            }
        }
    }

    fn note_failure(&mut self, error: &EngineError, operation: &'static str) {
        if error.is_breaker_failure() {
            self.breaker.record_failure();
            self.metrics.record_error();
            let kind = match error {
                EngineError::Persistence { .. } => ErrorKind::Persistence,
                _ => ErrorKind::Platform,
            };
            (self.error_sink)(ErrorEvent::new(kind, format!("{operation}: {error}")));
            warn!(operation, error = %error, "platform operation failed");
        } else {
            debug!(operation, error = %error, "operation rejected");
        }
    }
}

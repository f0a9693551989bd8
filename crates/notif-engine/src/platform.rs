// Platform Notifier: injectable seam over the native notification SDKs.
// The engine only ever talks to this trait; concrete Android/iOS bindings
// live with the host integration, and tests substitute fakes.

use notif_types::{NotificationRequest, PlatformHandle};

use crate::error::EngineError;

/// Which native platform family a notifier drives.
///
/// Selected at construction time; the engine uses it only to pick the
/// outstanding-notification limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformKind {
    Android,
    Ios,
}

/// Callback invoked with the outcome of a permission request.
pub type PermissionCallback = Box<dyn FnOnce(bool) + Send>;

/// The native notification backend.
///
/// All methods are called from the single-threaded main context only, so
/// implementations never need internal synchronization. Every error is
/// reported through the `Result`; implementations must not panic.
pub trait PlatformNotifier: Send {
    fn kind(&self) -> PlatformKind;

    /// Hand a populated request to the native SDK, returning its opaque
    /// handle for later cancellation.
    fn schedule_native(
        &mut self,
        request: &NotificationRequest,
        channel: &str,
    ) -> Result<PlatformHandle, EngineError>;

    fn cancel_native(&mut self, handle: PlatformHandle) -> Result<(), EngineError>;

    /// Cancel every scheduled-but-undelivered notification.
    fn cancel_all_scheduled(&mut self) -> Result<(), EngineError>;

    /// Clear every already-delivered notification from the tray.
    fn cancel_all_displayed(&mut self) -> Result<(), EngineError>;

    fn check_permission(&mut self) -> bool;

    /// Ask the OS for notification permission. The callback may fire
    /// immediately or later from platform glue; either way the engine
    /// routes the outcome back through its main-thread queue.
    fn request_permission(&mut self, callback: PermissionCallback);
}

/// A notifier that accepts everything and delivers nothing.
///
/// Used in tests and on platforms without a native backend; handles are
/// monotonically increasing.
pub struct NullNotifier {
    kind: PlatformKind,
    next_handle: i64,
}

impl NullNotifier {
    pub fn new(kind: PlatformKind) -> Self {
        Self {
            kind,
            next_handle: 0,
        }
    }
}

impl Default for NullNotifier {
    fn default() -> Self {
        Self::new(PlatformKind::Android)
    }
}

impl PlatformNotifier for NullNotifier {
    fn kind(&self) -> PlatformKind {
        self.kind
    }

    fn schedule_native(
        &mut self,
        _request: &NotificationRequest,
        _channel: &str,
    ) -> Result<PlatformHandle, EngineError> {
        self.next_handle += 1;
        Ok(PlatformHandle(self.next_handle))
    }

    fn cancel_native(&mut self, _handle: PlatformHandle) -> Result<(), EngineError> {
        Ok(())
    }

    fn cancel_all_scheduled(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn cancel_all_displayed(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn check_permission(&mut self) -> bool {
        true
    }

    fn request_permission(&mut self, callback: PermissionCallback) {
        callback(true);
    }
}

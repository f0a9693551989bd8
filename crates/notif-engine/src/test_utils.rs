use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use notif_types::{NotificationRequest, PlatformHandle};
use parking_lot::Mutex;

use crate::error::EngineError;
use crate::platform::{PermissionCallback, PlatformKind, PlatformNotifier};

/// Initialize tracing for tests with appropriate settings
#[inline]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Observable record of every call a [`FakeNotifier`] received.
#[derive(Default)]
pub struct FakeState {
    pub scheduled: Vec<(String, PlatformHandle)>,
    pub cancelled: Vec<PlatformHandle>,
    pub schedule_calls: u32,
    pub cancel_all_scheduled_calls: u32,
    pub cancel_all_displayed_calls: u32,
}

/// Test double for the native notifier.
///
/// Shares its call log through an `Arc` so tests keep visibility after the
/// notifier is boxed into the scheduler; flipping `failing` makes every
/// native call return a platform error.
pub struct FakeNotifier {
    pub kind: PlatformKind,
    pub permission: bool,
    state: Arc<Mutex<FakeState>>,
    failing: Arc<AtomicBool>,
    next_handle: i64,
}

impl FakeNotifier {
    pub fn new(kind: PlatformKind) -> (Self, Arc<Mutex<FakeState>>, Arc<AtomicBool>) {
        let state = Arc::new(Mutex::new(FakeState::default()));
        let failing = Arc::new(AtomicBool::new(false));
        let notifier = Self {
            kind,
            permission: true,
            state: Arc::clone(&state),
            failing: Arc::clone(&failing),
            next_handle: 0,
        };
        (notifier, state, failing)
    }
}

impl PlatformNotifier for FakeNotifier {
    fn kind(&self) -> PlatformKind {
        self.kind
    }

    fn schedule_native(
        &mut self,
        request: &NotificationRequest,
        _channel: &str,
    ) -> Result<PlatformHandle, EngineError> {
        let mut state = self.state.lock();
        state.schedule_calls += 1;
        if self.failing.load(Ordering::Relaxed) {
            return Err(EngineError::platform("simulated native schedule failure"));
        }
        self.next_handle += 1;
        let handle = PlatformHandle(self.next_handle);
        state.scheduled.push((request.identifier.clone(), handle));
        Ok(handle)
    }

    fn cancel_native(&mut self, handle: PlatformHandle) -> Result<(), EngineError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(EngineError::platform("simulated native cancel failure"));
        }
        self.state.lock().cancelled.push(handle);
        Ok(())
    }

    fn cancel_all_scheduled(&mut self) -> Result<(), EngineError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(EngineError::platform("simulated native cancel-all failure"));
        }
        self.state.lock().cancel_all_scheduled_calls += 1;
        Ok(())
    }

    fn cancel_all_displayed(&mut self) -> Result<(), EngineError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(EngineError::platform(
                "simulated native clear-displayed failure",
            ));
        }
        self.state.lock().cancel_all_displayed_calls += 1;
        Ok(())
    }

    fn check_permission(&mut self) -> bool {
        self.permission
    }

    fn request_permission(&mut self, callback: PermissionCallback) {
        callback(self.permission);
    }
}

//! Shared notification domain types.
//!
//! Data types exchanged between the scheduling engine, platform notifiers,
//! and host code: requests, repeat policies, platform handles, and the
//! domain events fanned out to subscribers.

use serde::{Deserialize, Serialize};

/// Maximum fire delay accepted for a request: one year, in seconds.
pub const MAX_DELAY_SECONDS: f64 = 365.0 * 24.0 * 60.0 * 60.0;

/// Opaque handle returned by a native notifier for a scheduled notification.
///
/// The engine never interprets the value; it is only stored, persisted, and
/// passed back for cancellation. Notifiers for string-keyed platforms are
/// expected to map their tokens to stable numeric ids internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlatformHandle(pub i64);

impl std::fmt::Display for PlatformHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a scheduled notification repeats after its first delivery.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatPolicy {
    /// Fire once and never again.
    #[default]
    None,
    /// Repeat every 24 hours.
    Daily,
    /// Repeat every 7 days.
    Weekly,
    /// Repeat with a custom interval, in seconds.
    Custom { interval_seconds: f64 },
}

/// Validation failures for a [`NotificationRequest`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RequestError {
    #[error("title must not be empty")]
    EmptyTitle,

    #[error("body must not be empty")]
    EmptyBody,

    #[error("delay must be a finite number, got {value}")]
    NonFiniteDelay { value: f64 },

    #[error("delay must be non-negative, got {value}")]
    NegativeDelay { value: f64 },

    #[error("delay of {value}s exceeds the maximum of {max}s")]
    DelayTooLong { value: f64, max: f64 },

    #[error("repeat interval must be positive, got {value}")]
    InvalidRepeatInterval { value: f64 },
}

/// A request to schedule a local notification.
///
/// `identifier` uniquely names the notification; when the caller does not
/// supply one, a UUID v4 is generated so every request is addressable for
/// cancellation and registry tracking.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub identifier: String,
    pub title: String,
    pub body: String,
    /// Seconds until the notification fires. Must be finite, non-negative,
    /// and at most [`MAX_DELAY_SECONDS`].
    pub delay_seconds: f64,
    pub repeat: RepeatPolicy,
    /// Optional group key for batch cancellation.
    pub group: Option<String>,
    pub sound: Option<String>,
    pub icon: Option<String>,
    pub badge: Option<u32>,
}

impl NotificationRequest {
    /// Create a one-shot request with an auto-generated identifier.
    pub fn new(
        title: impl Into<String>,
        body: impl Into<String>,
        delay_seconds: f64,
    ) -> Self {
        Self {
            identifier: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            body: body.into(),
            delay_seconds,
            ..Default::default()
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    pub fn with_repeat(mut self, repeat: RepeatPolicy) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_sound(mut self, sound: impl Into<String>) -> Self {
        self.sound = Some(sound.into());
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_badge(mut self, badge: u32) -> Self {
        self.badge = Some(badge);
        self
    }

    /// Check the request against the field invariants.
    ///
    /// Returns the first violated rule. A request with an empty identifier
    /// is still valid here; the scheduler assigns a UUID before use.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.title.trim().is_empty() {
            return Err(RequestError::EmptyTitle);
        }
        if self.body.trim().is_empty() {
            return Err(RequestError::EmptyBody);
        }
        if !self.delay_seconds.is_finite() {
            return Err(RequestError::NonFiniteDelay {
                value: self.delay_seconds,
            });
        }
        if self.delay_seconds < 0.0 {
            return Err(RequestError::NegativeDelay {
                value: self.delay_seconds,
            });
        }
        if self.delay_seconds > MAX_DELAY_SECONDS {
            return Err(RequestError::DelayTooLong {
                value: self.delay_seconds,
                max: MAX_DELAY_SECONDS,
            });
        }
        if let RepeatPolicy::Custom { interval_seconds } = self.repeat {
            if !(interval_seconds.is_finite() && interval_seconds > 0.0) {
                return Err(RequestError::InvalidRepeatInterval {
                    value: interval_seconds,
                });
            }
        }
        Ok(())
    }
}

/// Kind of a domain event delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventKind {
    /// A notification was delivered while the app was in the foreground.
    #[default]
    Received,
    /// The user tapped a delivered notification.
    Tapped,
    /// The notification permission state changed.
    PermissionChanged,
    /// A persisted notification was restored into the registry at startup.
    Restored,
}

/// A domain event payload.
///
/// Instances are loaned from the engine's event pool, so all fields must be
/// resettable without losing buffer capacity.
#[derive(Debug, Clone, Default)]
pub struct NotificationEvent {
    pub kind: EventKind,
    /// Identifier of the notification the event refers to, when any.
    pub identifier: String,
    /// Free-form detail, e.g. the tapped action id.
    pub detail: String,
    /// For [`EventKind::PermissionChanged`]: whether permission is granted.
    pub granted: bool,
}

use notif_types::RequestError;

/// Error taxonomy for engine operations.
///
/// The synchronous API maps every variant to a `false`/no-op outcome after
/// logging; the async facade surfaces the variant itself.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid request: {source}")]
    Validation {
        #[from]
        source: RequestError,
    },

    #[error("outstanding notification limit reached ({limit})")]
    LimitExceeded { limit: usize },

    #[error("circuit breaker is open")]
    CircuitOpen,

    #[error("platform notifier error: {reason}")]
    Platform { reason: String },

    #[error("persistence error: {reason}")]
    Persistence { reason: String },

    #[error("operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("operation cancelled")]
    Cancelled,

    #[error("service has been shut down")]
    Unavailable,

    #[error("main-thread queue is full")]
    QueueFull,

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl EngineError {
    pub fn platform(reason: impl Into<String>) -> Self {
        Self::Platform {
            reason: reason.into(),
        }
    }

    pub fn persistence(reason: impl Into<String>) -> Self {
        Self::Persistence {
            reason: reason.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Whether a later retry of the same operation can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Validation { .. } | Self::Cancelled | Self::Unavailable => false,
            Self::LimitExceeded { .. }
            | Self::CircuitOpen
            | Self::Platform { .. }
            | Self::Persistence { .. }
            | Self::Timeout { .. }
            | Self::QueueFull
            | Self::Internal { .. } => true,
        }
    }

    /// Whether the error counts as a circuit-breaker failure.
    ///
    /// Only failures surfaced by an external collaborator (platform or
    /// file system) feed the breaker; local rejections do not.
    pub fn is_breaker_failure(&self) -> bool {
        matches!(self, Self::Platform { .. } | Self::Persistence { .. })
    }
}

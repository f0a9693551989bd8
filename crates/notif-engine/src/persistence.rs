// Persistence Controller: debounced, checksummed, crash-safe store for the
// tracked notification set. The store file is the only durable state; a
// corrupted or missing file always degrades to an empty start, never a
// crash.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use notif_types::PlatformHandle;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::breaker::CircuitBreaker;
use crate::config::PersistenceConfig;
use crate::error::EngineError;
use crate::metrics::ServiceMetrics;
use crate::retry::{RetryAction, RetryPolicy, retry_with_backoff};

/// Current store schema version.
pub const STORE_VERSION: u32 = 2;

/// Configuration of the "come back" notification scheduled on focus loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnConfig {
    pub enabled: bool,
    pub title: String,
    pub body: String,
    pub delay_seconds: f64,
}

impl Default for ReturnConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            title: String::new(),
            body: String::new(),
            delay_seconds: 24.0 * 60.0 * 60.0,
        }
    }
}

/// One tracked notification in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub identifier: String,
    pub handle: PlatformHandle,
}

/// The serialized engine state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorePayload {
    /// Tracked (identifier, handle) pairs in insertion order.
    pub entries: Vec<StoredEntry>,
    pub return_config: ReturnConfig,
    /// Unix timestamp of the last foreground transition.
    pub last_foreground_ts: i64,
}

/// On-disk record: versioned payload plus integrity checksum.
///
/// The checksum covers the serialized payload only, so it can be verified
/// before anything in the payload is trusted.
#[derive(Debug, Serialize, Deserialize)]
struct StoreRecord {
    version: u32,
    payload: StorePayload,
    checksum: String,
}

/// Result of loading the store at startup.
#[derive(Debug, Default)]
pub struct LoadedStore {
    pub payload: StorePayload,
    /// True when a legacy record was migrated and should be rewritten.
    pub migrated: bool,
}

fn payload_checksum(payload: &StorePayload) -> Result<String, EngineError> {
    let bytes = serde_json::to_vec(payload)
        .map_err(|e| EngineError::persistence(format!("payload serialization: {e}")))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Write `bytes` to `path` via a temp file in the same directory followed
/// by an atomic rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = dir {
        std::fs::create_dir_all(dir)?;
    }
    let mut tmp = match dir {
        Some(dir) => tempfile::NamedTempFile::new_in(dir)?,
        None => tempfile::NamedTempFile::new_in(".")?,
    };
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

struct ControlState {
    dirty: bool,
    deadline: Option<Instant>,
}

/// Debounces dirty-state and owns the store file.
///
/// `mark_dirty` may be called from the scheduler on every mutation; rapid
/// calls within the debounce window coalesce into a single flush, driven
/// by the service tick on the main context.
pub struct PersistenceController {
    config: PersistenceConfig,
    retry: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<ServiceMetrics>,
    state: Mutex<ControlState>,
}

impl PersistenceController {
    pub fn new(
        config: PersistenceConfig,
        breaker: Arc<CircuitBreaker>,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        let retry = RetryPolicy {
            max_retries: config.write_retries,
            base_delay: config.retry_base_delay,
            max_delay: config.retry_max_delay,
            jitter: true,
        };
        Self {
            config,
            retry,
            breaker,
            metrics,
            state: Mutex::new(ControlState {
                dirty: false,
                deadline: None,
            }),
        }
    }

    /// Mark in-memory state as diverged from disk and (re)arm the debounce
    /// deadline.
    pub fn mark_dirty(&self) {
        let mut state = self.state.lock();
        state.dirty = true;
        state.deadline = Some(Instant::now() + self.config.debounce);
    }

    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    /// Whether the debounce window has elapsed and a flush is owed.
    pub fn due(&self, now: Instant) -> bool {
        let state = self.state.lock();
        state.dirty && state.deadline.is_some_and(|d| now >= d)
    }

    /// Serialize and write the store.
    ///
    /// No-op while clean. Skips (and stays dirty) while the circuit is
    /// open. Write failures are retried a bounded number of times before
    /// counting as a breaker failure; they are never fatal.
    pub fn flush(&self, payload: &StorePayload) -> Result<(), EngineError> {
        if !self.state.lock().dirty {
            return Ok(());
        }
        if self.breaker.is_open() {
            debug!("circuit open, skipping store flush");
            return Err(EngineError::CircuitOpen);
        }

        let started = Instant::now();
        let checksum = payload_checksum(payload)?;
        let record = StoreRecord {
            version: STORE_VERSION,
            payload: payload.clone(),
            checksum,
        };
        let bytes = serde_json::to_vec(&record)
            .map_err(|e| EngineError::persistence(format!("record serialization: {e}")))?;

        let result = retry_with_backoff(&self.retry, |_attempt| {
            match write_atomic(&self.config.path, &bytes) {
                Ok(()) => RetryAction::Success(()),
                Err(e) => RetryAction::Retry(EngineError::persistence(format!(
                    "store write to {}: {e}",
                    self.config.path.display()
                ))),
            }
        });

        match result {
            Ok(()) => {
                let mut state = self.state.lock();
                state.dirty = false;
                state.deadline = None;
                drop(state);
                self.breaker.record_success();
                let latency_ms = started.elapsed().as_millis() as u64;
                self.metrics.record_flush(latency_ms);
                debug!(
                    entries = payload.entries.len(),
                    latency_ms, "store flushed"
                );
                Ok(())
            }
            Err(e) => {
                self.breaker.record_failure();
                self.metrics.record_error();
                warn!(error = %e, "store flush failed after retries");
                Err(e)
            }
        }
    }

    /// Read the store at startup.
    ///
    /// Never fails: a missing file is a first run, and a corrupted or
    /// unreadable file is discarded in favor of an empty state.
    pub fn load(&self) -> LoadedStore {
        let raw = match std::fs::read(&self.config.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.config.path.display(), "no store file, starting empty");
                return LoadedStore::default();
            }
            Err(e) => {
                warn!(error = %e, "store unreadable, starting empty");
                return LoadedStore::default();
            }
        };

        if let Ok(record) = serde_json::from_slice::<StoreRecord>(&raw) {
            let expected = match payload_checksum(&record.payload) {
                Ok(expected) => expected,
                Err(e) => {
                    warn!(error = %e, "store checksum recompute failed, starting empty");
                    return LoadedStore::default();
                }
            };
            if record.checksum != expected {
                warn!(
                    path = %self.config.path.display(),
                    "store checksum mismatch, discarding corrupted store"
                );
                return LoadedStore::default();
            }
            if record.version > STORE_VERSION {
                warn!(
                    version = record.version,
                    supported = STORE_VERSION,
                    "store written by a newer version, starting empty"
                );
                return LoadedStore::default();
            }
            return LoadedStore {
                payload: record.payload,
                migrated: false,
            };
        }

        // Legacy format: a bare payload without version or checksum.
        if let Ok(payload) = serde_json::from_slice::<StorePayload>(&raw) {
            info!("migrating legacy store record");
            return LoadedStore {
                payload,
                migrated: true,
            };
        }

        warn!(path = %self.config.path.display(), "store unparseable, starting empty");
        LoadedStore::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CircuitBreakerConfig;
    use std::time::Duration;

    fn controller(path: std::path::PathBuf) -> PersistenceController {
        let config = PersistenceConfig {
            path,
            debounce: Duration::from_millis(20),
            write_retries: 2,
            retry_base_delay: Duration::from_millis(1),
            retry_max_delay: Duration::from_millis(5),
        };
        PersistenceController::new(
            config,
            Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default())),
            Arc::new(ServiceMetrics::new()),
        )
    }

    fn sample_payload() -> StorePayload {
        StorePayload {
            entries: vec![
                StoredEntry {
                    identifier: "alpha".to_string(),
                    handle: PlatformHandle(1),
                },
                StoredEntry {
                    identifier: "beta".to_string(),
                    handle: PlatformHandle(2),
                },
            ],
            return_config: ReturnConfig {
                enabled: true,
                title: "Come back".to_string(),
                body: "We miss you".to_string(),
                delay_seconds: 3600.0,
            },
            last_foreground_ts: 1_700_000_000,
        }
    }

    #[test]
    fn round_trip_reproduces_entries() {
        let dir = tempfile::tempdir().unwrap();
        let ctrl = controller(dir.path().join("store.json"));

        let payload = sample_payload();
        ctrl.mark_dirty();
        ctrl.flush(&payload).unwrap();

        let loaded = ctrl.load();
        assert!(!loaded.migrated);
        assert_eq!(loaded.payload, payload);
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ctrl = controller(dir.path().join("nope.json"));
        let loaded = ctrl.load();
        assert!(loaded.payload.entries.is_empty());
        assert!(!loaded.migrated);
    }

    #[test]
    fn corrupted_payload_self_heals_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let ctrl = controller(path.clone());

        ctrl.mark_dirty();
        ctrl.flush(&sample_payload()).unwrap();

        // Flip one byte inside the payload region.
        let text = std::fs::read_to_string(&path).unwrap();
        let tampered = text.replacen("alpha", "alphb", 1);
        assert_ne!(text, tampered);
        std::fs::write(&path, tampered).unwrap();

        let loaded = ctrl.load();
        assert!(loaded.payload.entries.is_empty());
    }

    #[test]
    fn unparseable_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, b"{not json").unwrap();
        let loaded = controller(path).load();
        assert!(loaded.payload.entries.is_empty());
    }

    #[test]
    fn legacy_payload_is_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let payload = sample_payload();
        std::fs::write(&path, serde_json::to_vec(&payload).unwrap()).unwrap();

        let loaded = controller(path).load();
        assert!(loaded.migrated);
        assert_eq!(loaded.payload, payload);
    }

    #[test]
    fn flush_is_a_noop_while_clean() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let ctrl = controller(path.clone());
        ctrl.flush(&sample_payload()).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn debounce_coalesces_rapid_marks() {
        let dir = tempfile::tempdir().unwrap();
        let ctrl = controller(dir.path().join("store.json"));

        ctrl.mark_dirty();
        ctrl.mark_dirty();
        ctrl.mark_dirty();
        assert!(!ctrl.due(Instant::now()));
        std::thread::sleep(Duration::from_millis(30));
        assert!(ctrl.due(Instant::now()));

        ctrl.flush(&sample_payload()).unwrap();
        assert!(!ctrl.is_dirty());
        assert!(!ctrl.due(Instant::now()));
    }

    #[test]
    fn open_circuit_skips_flush_and_stays_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            cooldown: Duration::from_secs(60),
        }));
        let ctrl = PersistenceController::new(
            PersistenceConfig {
                path: path.clone(),
                debounce: Duration::from_millis(1),
                write_retries: 0,
                retry_base_delay: Duration::from_millis(1),
                retry_max_delay: Duration::from_millis(1),
            },
            Arc::clone(&breaker),
            Arc::new(ServiceMetrics::new()),
        );

        breaker.record_failure();
        ctrl.mark_dirty();
        assert!(matches!(
            ctrl.flush(&sample_payload()),
            Err(EngineError::CircuitOpen)
        ));
        assert!(ctrl.is_dirty());
        assert!(!path.exists());
    }

    #[test]
    fn write_failure_counts_as_breaker_failure() {
        let dir = tempfile::tempdir().unwrap();
        // Make the parent "directory" a regular file so the write fails.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        let path = blocker.join("store.json");

        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }));
        let metrics = Arc::new(ServiceMetrics::new());
        let ctrl = PersistenceController::new(
            PersistenceConfig {
                path,
                debounce: Duration::from_millis(1),
                write_retries: 2,
                retry_base_delay: Duration::from_millis(1),
                retry_max_delay: Duration::from_millis(2),
            },
            Arc::clone(&breaker),
            Arc::clone(&metrics),
        );

        ctrl.mark_dirty();
        let result = ctrl.flush(&sample_payload());
        assert!(matches!(result, Err(EngineError::Persistence { .. })));
        assert_eq!(breaker.consecutive_failures(), 1);
        assert!(ctrl.is_dirty());
    }
}

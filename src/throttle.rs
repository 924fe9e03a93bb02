//! Suppression of repeated notifications.

use crate::internal_logs::notifier_debug;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{Mutex, PoisonError},
    time::Duration,
};

/// Source of the current time.
pub trait Clock: Send + Sync + Debug {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// ```
/// use error_notifier::{Clock, ManualClock};
///
/// let clock = ManualClock::default();
/// let start = clock.now();
/// clock.advance(std::time::Duration::from_secs(60));
/// assert_eq!(60, (clock.now() - start).num_seconds());
/// ```
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock showing `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        ManualClock {
            now: Mutex::new(now),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let by = ChronoDuration::from_std(by).unwrap_or(ChronoDuration::MAX);
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = now.checked_add_signed(by).unwrap_or(DateTime::<Utc>::MAX_UTC);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        ManualClock::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Identity of a notification for deduplication. Fields compare case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    host: String,
    user: String,
    method: String,
    subject: String,
}

impl DedupKey {
    /// Create a key.
    pub fn new(host: &str, user: &str, method: &str, subject: &str) -> Self {
        DedupKey {
            host: host.to_lowercase(),
            user: user.to_lowercase(),
            method: method.to_lowercase(),
            subject: subject.to_lowercase(),
        }
    }
}

/// Admits a notification at most once per key within a sliding window.
#[derive(Debug)]
pub struct DedupThrottle {
    window: ChronoDuration,
    admitted: Mutex<HashMap<DedupKey, DateTime<Utc>>>,
}

impl DedupThrottle {
    /// Create a throttle with the given window.
    pub fn new(window: Duration) -> Self {
        DedupThrottle {
            window: ChronoDuration::from_std(window).unwrap_or(ChronoDuration::MAX),
            admitted: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if no equal key was admitted within the window and records the key.
    ///
    /// Entries older than the window are dropped first.
    pub fn admit(&self, key: DedupKey, now: DateTime<Utc>) -> bool {
        let mut admitted = self.admitted.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cutoff) = now.checked_sub_signed(self.window) {
            admitted.retain(|_, admitted_at| *admitted_at > cutoff);
        }

        if admitted.contains_key(&key) {
            notifier_debug!(entries = admitted.len(), "notification suppressed as duplicate");
            return false;
        }
        admitted.insert(key, now);
        true
    }

    /// Number of remembered notifications.
    pub fn len(&self) -> usize {
        self.admitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is remembered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

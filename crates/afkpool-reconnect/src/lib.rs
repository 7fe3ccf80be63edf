//! Reconnect timer bookkeeping for afkpool.
//!
//! A [`ReconnectScheduler`] holds at most one pending reconnect timer per
//! key (per identity, in practice). Scheduling while a timer is pending
//! is a no-op; cancelling removes the timer and aborts it.
//!
//! # Delay tiers
//!
//! Delays are fixed per [`ReconnectTier`], not computed from history:
//!
//! - [`ReconnectTier::Short`]: the connection had been online and then
//!   dropped. Usually a network blip, so retry soon.
//! - [`ReconnectTier::Long`]: the attempt failed before login finished.
//!   Usually something slower to clear (rate limiting, bad proxy), so
//!   back off.
//!
//! # Integration
//!
//! The scheduler does not know how to reconnect anything. `schedule`
//! takes a callback that runs when the timer fires; the session layer
//! uses it to post a message into the owning session's command channel:
//!
//! ```ignore
//! let weak = self.weak.clone();
//! scheduler.schedule(&identity, tier, move |token| {
//!     if let Some(tx) = weak.upgrade() {
//!         tokio::spawn(async move {
//!             let _ = tx.send(SessionCommand::ReconnectDue { token }).await;
//!         });
//!     }
//! });
//! ```

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, trace};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Which delay class a reconnect belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconnectTier {
    /// Failure after the session had been online.
    Short,
    /// Failure before authentication completed.
    Long,
}

impl fmt::Display for ReconnectTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Short => write!(f, "short"),
            Self::Long => write!(f, "long"),
        }
    }
}

/// Delay per tier.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub short_delay: Duration,
    pub long_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            short_delay: Duration::from_secs(5),
            long_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectConfig {
    /// The delay for `tier`.
    pub fn delay(&self, tier: ReconnectTier) -> Duration {
        match tier {
            ReconnectTier::Short => self.short_delay,
            ReconnectTier::Long => self.long_delay,
        }
    }
}

// ---------------------------------------------------------------------------
// Timer tokens
// ---------------------------------------------------------------------------

/// Identifies one scheduled timer. Tokens are never reused, so a stale
/// token can always be told apart from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

impl fmt::Display for TimerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T-{}", self.0)
    }
}

/// Public view of a pending timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingReconnect {
    pub token: TimerToken,
    pub tier: ReconnectTier,
    /// When the timer fires (Tokio clock).
    pub due: Instant,
}

struct Entry {
    info: PendingReconnect,
    task: JoinHandle<()>,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

struct Inner<K> {
    config: ReconnectConfig,
    timers: Mutex<HashMap<K, Entry>>,
    next_token: AtomicU64,
}

impl<K> Drop for Inner<K> {
    fn drop(&mut self) {
        for entry in self.timers.get_mut().values() {
            entry.task.abort();
        }
    }
}

/// The reconnect timer table.
///
/// Cheap to clone: every clone shares the same table. All reads and
/// writes go through one lock, so schedule and cancel for the same key
/// never interleave.
pub struct ReconnectScheduler<K> {
    inner: Arc<Inner<K>>,
}

impl<K> Clone for ReconnectScheduler<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> ReconnectScheduler<K>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static,
{
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                timers: Mutex::new(HashMap::new()),
                next_token: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &ReconnectConfig {
        &self.inner.config
    }

    /// Schedules a reconnect for `key` after the `tier` delay.
    ///
    /// Returns `None` without touching anything if a timer is already
    /// pending for `key`. Otherwise records a new token and returns it.
    /// When the delay elapses the entry is removed and then `on_fire` is
    /// called with the token.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule<F>(&self, key: &K, tier: ReconnectTier, on_fire: F) -> Option<TimerToken>
    where
        F: FnOnce(TimerToken) + Send + 'static,
    {
        let mut timers = self.inner.timers.lock();
        if let Some(existing) = timers.get(key) {
            trace!(%key, token = %existing.info.token, "reconnect already pending");
            return None;
        }

        let token = TimerToken(self.inner.next_token.fetch_add(1, Ordering::Relaxed));
        let delay = self.inner.config.delay(tier);
        let due = Instant::now() + delay;

        let weak = Arc::downgrade(&self.inner);
        let fired_key = key.clone();
        let task = tokio::spawn(async move {
            time::sleep_until(due).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            // A cancel (or cancel + reschedule) may have won the race for the lock.
            let removed = {
                let mut timers = inner.timers.lock();
                let current = timers
                    .get(&fired_key)
                    .is_some_and(|entry| entry.info.token == token);
                if current {
                    timers.remove(&fired_key);
                }
                current
            };
            if removed {
                debug!(key = %fired_key, %token, "reconnect timer fired");
                on_fire(token);
            }
        });

        timers.insert(
            key.clone(),
            Entry {
                info: PendingReconnect { token, tier, due },
                task,
            },
        );
        debug!(%key, %token, %tier, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
        Some(token)
    }

    /// Cancels the pending timer for `key`, if any. Returns whether one
    /// was pending.
    pub fn cancel(&self, key: &K) -> bool {
        let removed = self.inner.timers.lock().remove(key);
        match removed {
            Some(entry) => {
                entry.task.abort();
                debug!(%key, token = %entry.info.token, "reconnect cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancels every pending timer. Returns how many there were.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<Entry> = self.inner.timers.lock().drain().map(|(_, e)| e).collect();
        for entry in &drained {
            entry.task.abort();
        }
        drained.len()
    }

    /// The pending timer for `key`, if any.
    pub fn pending(&self, key: &K) -> Option<PendingReconnect> {
        self.inner.timers.lock().get(key).map(|e| e.info)
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.inner.timers.lock().contains_key(key)
    }

    /// Number of pending timers across all keys.
    pub fn len(&self) -> usize {
        self.inner.timers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_tiers() {
        let cfg = ReconnectConfig::default();
        assert_eq!(cfg.delay(ReconnectTier::Short), Duration::from_secs(5));
        assert_eq!(cfg.delay(ReconnectTier::Long), Duration::from_secs(30));
    }

    #[test]
    fn test_token_display() {
        assert_eq!(TimerToken(7).to_string(), "T-7");
        assert_eq!(ReconnectTier::Long.to_string(), "long");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_without_timer_is_noop() {
        let s = ReconnectScheduler::<&'static str>::new(ReconnectConfig::default());
        assert!(!s.cancel(&"nobody"));
        assert!(s.is_empty());
    }
}

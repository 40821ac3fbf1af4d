//! Per-key work queue with deferred delivery and rate-limited retry.
//!
//! Keys, not payloads, are queued: a worker always fetches the latest
//! snapshot when it picks a key up, so several notifications for the same
//! node collapse into one reconciliation.
//!
//! Guarantees:
//! - a key waiting in the queue is never queued twice
//! - a key being processed is not handed to a second worker; if it is added
//!   again meanwhile, it is re-queued when [`WorkQueue::done`] is called

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::debug;

/// Default initial retry delay for a failing key.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(5);

/// Default ceiling for the retry delay of a failing key.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(1000);

/// Deferred-delivery facility consumed by handlers.
pub trait DeferredDelivery: Send + Sync {
    /// Deliver `key` again no sooner than `delay` from now.
    fn redeliver_after(&self, key: &str, delay: Duration);
}

/// Exponential per-key backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay after the first failure.
    pub base: Duration,
    /// Upper bound on any delay.
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE_DELAY,
            max: DEFAULT_MAX_DELAY,
        }
    }
}

impl Backoff {
    /// Delay for a key that has already failed `failures` times.
    pub fn delay_for(&self, failures: u32) -> Duration {
        2u32.checked_pow(failures)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<String>,
    dirty: HashSet<String>,
    processing: HashSet<String>,
    shutting_down: bool,
}

struct Inner {
    state: Mutex<QueueState>,
    failures: Mutex<HashMap<String, u32>>,
    notify: Notify,
    backoff: Backoff,
}

/// Work queue handle. Clones share the same queue.
#[derive(Clone)]
pub struct WorkQueue {
    inner: Arc<Inner>,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkQueue {
    /// Create a queue with the default backoff.
    pub fn new() -> Self {
        Self::with_backoff(Backoff::default())
    }

    /// Create a queue with a custom backoff.
    pub fn with_backoff(backoff: Backoff) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                failures: Mutex::new(HashMap::new()),
                notify: Notify::new(),
                backoff,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn failures_map(&self) -> MutexGuard<'_, HashMap<String, u32>> {
        self.inner
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a key for processing.
    pub fn add(&self, key: &str) {
        let mut state = self.state();
        if state.shutting_down || state.dirty.contains(key) {
            return;
        }
        state.dirty.insert(key.to_string());
        if state.processing.contains(key) {
            return;
        }
        state.queue.push_back(key.to_string());
        drop(state);

        self.inner.notify.notify_one();
    }

    /// Queue a key once `delay` has elapsed.
    pub fn add_after(&self, key: &str, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        if self.is_shutting_down() {
            return;
        }

        debug!(key, delay_ms = delay.as_millis(), "Scheduling delayed delivery");
        let queue = self.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(&key);
        });
    }

    /// Queue a key after its backoff delay and record one more failure.
    pub fn add_rate_limited(&self, key: &str) {
        let failures = {
            let mut map = self.failures_map();
            let entry = map.entry(key.to_string()).or_insert(0);
            let previous = *entry;
            *entry = previous.saturating_add(1);
            previous
        };
        let delay = self.inner.backoff.delay_for(failures);
        debug!(key, failures, delay_ms = delay.as_millis(), "Rate-limited requeue");
        self.add_after(key, delay);
    }

    /// Clear the failure history of a key.
    pub fn forget(&self, key: &str) {
        self.failures_map().remove(key);
    }

    /// Number of consecutive failures recorded for a key.
    pub fn failures(&self, key: &str) -> u32 {
        self.failures_map().get(key).copied().unwrap_or(0)
    }

    /// Wait for the next key. Returns `None` once the queue is shut down.
    pub async fn get(&self) -> Option<String> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Mark a key as processed, re-queueing it if it was added meanwhile.
    pub fn done(&self, key: &str) {
        let mut state = self.state();
        state.processing.remove(key);
        if state.dirty.contains(key) {
            state.queue.push_back(key.to_string());
            drop(state);
            self.inner.notify.notify_one();
        }
    }

    /// Stop handing out keys. Waiting workers receive `None`.
    pub fn shut_down(&self) {
        self.state().shutting_down = true;
        self.inner.notify.notify_waiters();
    }

    /// Whether [`WorkQueue::shut_down`] has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.state().shutting_down
    }

    /// Number of keys waiting to be picked up.
    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    /// Whether no keys are waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DeferredDelivery for WorkQueue {
    fn redeliver_after(&self, key: &str, delay: Duration) {
        self.add_after(key, delay);
    }
}

//! Duplicate-request suppression.
//!
//! # Design
//! The guard remembers, per request key (`METHOD url`), when the last call
//! went out and what it returned. A repeat inside `min_delay` is handled by
//! the configured `DedupePolicy`. Suppressed calls do not move the window;
//! only calls that reach the transport do. Keys whose window has passed are
//! evicted whenever another key is stamped, so cached bodies do not pile up.
//!
//! `DuplicateGuard` is a cheap handle: clones share the same table, so one
//! guard passed to several clients suppresses duplicates across all of them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::{DedupeConfig, DedupePolicy};
use crate::http::HttpResponse;

/// Time source for the guard.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Clock that only moves when told to. `sleep` advances it instantly.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += duration;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Verdict for a request about to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Proceed,
    Drop,
    /// Serve the previous response for this key, if one was recorded.
    Cached(Option<HttpResponse>),
}

#[derive(Debug)]
struct Entry {
    last_call: Instant,
    last_response: Option<HttpResponse>,
}

#[derive(Clone)]
pub struct DuplicateGuard {
    config: DedupeConfig,
    clock: Arc<dyn Clock>,
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl std::fmt::Debug for DuplicateGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplicateGuard")
            .field("config", &self.config)
            .field("keys", &self.entries().len())
            .finish()
    }
}

impl DuplicateGuard {
    pub fn new(config: DedupeConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: DedupeConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &DedupeConfig {
        &self.config
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decide whether a request for `key` may go out now.
    ///
    /// Under `Wait` this blocks until the window has passed. A `Proceed`
    /// verdict stamps the key with the current time.
    pub fn admit(&self, key: &str) -> Admission {
        if self.config.policy == DedupePolicy::Off {
            return Admission::Proceed;
        }

        let min_delay = self.config.min_delay();
        let now = self.clock.now();
        let mut entries = self.entries();
        let elapsed = entries
            .get(key)
            .map(|entry| now.saturating_duration_since(entry.last_call));

        let Some(elapsed) = elapsed.filter(|elapsed| *elapsed < min_delay) else {
            stamp(&mut entries, key, now, min_delay);
            return Admission::Proceed;
        };

        match self.config.policy {
            DedupePolicy::Off => Admission::Proceed,
            DedupePolicy::Drop => {
                warn!(key, ?elapsed, "dropping duplicate request");
                Admission::Drop
            }
            DedupePolicy::Cached => {
                debug!(key, ?elapsed, "serving cached response for duplicate request");
                Admission::Cached(entries.get(key).and_then(|entry| entry.last_response.clone()))
            }
            DedupePolicy::Wait => {
                let remaining = min_delay - elapsed;
                debug!(key, ?remaining, "delaying duplicate request");
                drop(entries);
                self.clock.sleep(remaining);
                let now = self.clock.now();
                stamp(&mut self.entries(), key, now, min_delay);
                Admission::Proceed
            }
        }
    }

    /// Remember the response of a call that went out.
    pub fn record(&self, key: &str, response: Option<&HttpResponse>) {
        if self.config.policy != DedupePolicy::Cached {
            return;
        }
        if let Some(entry) = self.entries().get_mut(key) {
            entry.last_response = response.cloned();
        }
    }

    /// Forget every key.
    pub fn clear(&self) {
        self.entries().clear();
    }
}

fn stamp(entries: &mut HashMap<String, Entry>, key: &str, now: Instant, min_delay: Duration) {
    entries.retain(|_, entry| now.saturating_duration_since(entry.last_call) < min_delay);
    entries
        .entry(key.to_string())
        .and_modify(|entry| entry.last_call = now)
        .or_insert(Entry {
            last_call: now,
            last_response: None,
        });
}

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

/// Per-target failure tracking and the progressive back-off clock.
///
/// The only shared-mutable object in the gateway. Targets are keyed by
/// `"{provider}/{upstream_model}"`. A target becomes unavailable once its
/// failure count reaches the configured threshold and is re-admitted on the
/// next successful call, or wholesale when a chain exhaustion advances the
/// progressive timeout.
#[derive(Debug)]
pub struct AvailabilityTracker {
    inner: RwLock<TrackerInner>,
}

#[derive(Debug)]
struct TrackerInner {
    failures: HashMap<String, u32>,
    unavailable: HashSet<String>,
    current_timeout_ms: u64,
    cycle: u64,
}

impl AvailabilityTracker {
    pub fn new(initial_timeout_ms: u64) -> Self {
        AvailabilityTracker {
            inner: RwLock::new(TrackerInner {
                failures: HashMap::new(),
                unavailable: HashSet::new(),
                current_timeout_ms: initial_timeout_ms,
                cycle: 0,
            }),
        }
    }

    /// Records a failure for a target, marking it unavailable once the
    /// threshold is reached.
    pub fn record_failure(&self, key: &str, threshold: u32) {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let count = inner.failures.entry(key.to_string()).or_insert(0);
        *count += 1;
        if *count >= threshold {
            inner.unavailable.insert(key.to_string());
        }
    }

    pub fn is_available(&self, key: &str, threshold: u32) -> bool {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        if inner.unavailable.contains(key) {
            return false;
        }
        inner.failures.get(key).copied().unwrap_or(0) < threshold
    }

    /// Clears a target's failure count and unavailability mark. Called on
    /// every successful dispatch to the target.
    pub fn reset(&self, key: &str) {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        inner.failures.remove(key);
        inner.unavailable.remove(key);
    }

    pub fn progressive_timeout_ms(&self) -> u64 {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .current_timeout_ms
    }

    /// Doubles the progressive timeout (capped at `max_ms`) and bumps the
    /// exhaustion cycle. All unavailability marks are cleared so the next
    /// request retries the whole chain from the top.
    pub fn advance_timeout(&self, max_ms: u64) {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        inner.current_timeout_ms = (inner.current_timeout_ms * 2).min(max_ms);
        inner.cycle += 1;
        inner.failures.clear();
        inner.unavailable.clear();
    }

    pub fn cycle(&self) -> u64 {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).cycle
    }

    #[cfg(test)]
    pub fn failure_count(&self, key: &str) -> u32 {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .failures
            .get(key)
            .copied()
            .unwrap_or(0)
    }
}

/// Canonical bookkeeping key for a `(provider, upstream_model)` target.
pub fn target_key(provider: &str, model: &str) -> String {
    format!("{provider}/{model}")
}

//! Progress state carried by futures, and update coalescing for watchers.
//!
//! A producer reports progress as an integer range plus a current value and a
//! free-text description. [`ProgressInfo`] is that snapshot.
//! [`ProgressThrottle`] sits between a fast producer and a slow consumer (a
//! UI): it drops intermediate updates that arrive faster than a configured
//! interval, but it never drops the most recent one.
//!
//! # Example
//!
//! ```
//! use amlm_core::progress::{ProgressInfo, ProgressThrottle};
//! use std::time::{Duration, Instant};
//!
//! let mut throttle = ProgressThrottle::new(Duration::from_millis(100));
//! let t0 = Instant::now();
//!
//! let mut p = ProgressInfo::with_range(0, 10);
//! p.value = 1;
//! assert!(throttle.offer(p.clone(), t0).is_some()); // first update passes
//!
//! p.value = 2;
//! assert!(throttle.offer(p.clone(), t0).is_none()); // too soon, held back
//!
//! // The held-back update is still delivered when flushed.
//! assert_eq!(throttle.flush().map(|p| p.value), Some(2));
//! ```

use std::time::{Duration, Instant};

/// A snapshot of a task's progress.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgressInfo {
    /// Lower bound of the range.
    pub minimum: i64,
    /// Upper bound of the range.
    pub maximum: i64,
    /// Current value, kept within `minimum..=maximum`.
    pub value: i64,
    /// Human readable description of the current step.
    pub text: String,
}

impl ProgressInfo {
    /// A progress snapshot with the given range and the value at `minimum`.
    pub fn with_range(minimum: i64, maximum: i64) -> Self {
        let mut info = Self::default();
        info.set_range(minimum, maximum);
        info
    }

    /// Set the range, clamping the current value into it.
    ///
    /// A `maximum` below `minimum` is raised to `minimum`. Returns `true` if
    /// anything changed.
    pub fn set_range(&mut self, minimum: i64, maximum: i64) -> bool {
        let maximum = maximum.max(minimum);
        let value = self.value.clamp(minimum, maximum);
        let changed = self.minimum != minimum || self.maximum != maximum || self.value != value;
        self.minimum = minimum;
        self.maximum = maximum;
        self.value = value;
        changed
    }

    /// Set the value, clamped into the range. Returns `true` if it changed.
    pub fn set_value(&mut self, value: i64) -> bool {
        let value = value.clamp(self.minimum, self.maximum);
        if value == self.value {
            return false;
        }
        self.value = value;
        true
    }

    /// Set the description. Returns `true` if it changed.
    pub fn set_text(&mut self, text: impl Into<String>) -> bool {
        let text = text.into();
        if text == self.text {
            return false;
        }
        self.text = text;
        true
    }

    /// Completed fraction in `0.0..=1.0`. An empty range counts as done.
    pub fn fraction(&self) -> f32 {
        let span = i128::from(self.maximum) - i128::from(self.minimum);
        if span <= 0 {
            return 1.0;
        }
        let done = i128::from(self.value) - i128::from(self.minimum);
        (done as f64 / span as f64) as f32
    }
}

/// Coalesces progress updates to at most one emission per interval.
///
/// The throttle is driven by explicit timestamps so callers control the
/// clock. Invariant: after [`flush`](Self::flush) the consumer has seen the
/// last offered update, unless it was identical to the last delivered one.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    interval: Duration,
    last_emit: Option<Instant>,
    pending: Option<ProgressInfo>,
    delivered: Option<ProgressInfo>,
}

impl ProgressThrottle {
    /// Create a throttle with a minimum gap between emissions.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
            pending: None,
            delivered: None,
        }
    }

    /// The configured interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Offer an update observed at `now`.
    ///
    /// Returns the update to emit right away, or `None` if it was held back
    /// (or is a duplicate of what the consumer already has).
    pub fn offer(&mut self, info: ProgressInfo, now: Instant) -> Option<ProgressInfo> {
        if self.delivered.as_ref() == Some(&info) {
            self.pending = None;
            return None;
        }
        let due = match self.last_emit {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if due {
            self.pending = None;
            self.mark_delivered(info.clone(), now);
            Some(info)
        } else {
            self.pending = Some(info);
            None
        }
    }

    /// Take the held-back update, if any.
    pub fn flush(&mut self) -> Option<ProgressInfo> {
        let info = self.pending.take()?;
        self.mark_delivered(info.clone(), Instant::now());
        Some(info)
    }

    /// Whether an update is being held back.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn mark_delivered(&mut self, info: ProgressInfo, now: Instant) {
        self.last_emit = Some(now);
        self.delivered = Some(info);
    }
}

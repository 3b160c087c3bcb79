//! Tuning knobs

use std::time::Duration;

/// Tuning for a [TeleVm](crate::TeleVm)
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TeleConfig {
    lock_timeout: Duration,
    refresh_warning_threshold: Duration,
    copy_trace_interval: usize,
}

impl TeleConfig {
    /// Creates a new configuration
    pub fn new(
        lock_timeout: Duration,
        refresh_warning_threshold: Duration,
        copy_trace_interval: usize,
    ) -> Self {
        Self {
            lock_timeout,
            refresh_warning_threshold,
            copy_trace_interval,
        }
    }

    /// How long deep copies and code reloads wait for the VM lock before giving up
    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Aggregate refresh time per mirror type above which a refresh is flagged as slow
    pub fn refresh_warning_threshold(&self) -> Duration {
        self.refresh_warning_threshold
    }

    /// A deep copy traces its progress every this many objects
    pub fn copy_trace_interval(&self) -> usize {
        self.copy_trace_interval
    }

    /// Sets the lock timeout
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Sets the refresh warning threshold
    pub fn with_refresh_warning_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_warning_threshold = threshold;
        self
    }

    /// Sets the deep copy trace interval
    pub fn with_copy_trace_interval(mut self, interval: usize) -> Self {
        self.copy_trace_interval = interval.max(1);
        self
    }
}

impl Default for TeleConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(100),
            refresh_warning_threshold: Duration::from_millis(100),
            copy_trace_interval: 100,
        }
    }
}

//! Dwell countdown for an open commit window
//!
//! Times are milliseconds on a monotonic scale supplied by the caller.
//! A `now` that runs behind the origin is treated as no time elapsed.

/// Countdown started when a window opens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitTimer {
    origin_ms: u64,
    duration_ms: u64,
}

impl CommitTimer {
    /// Start a countdown of `duration_ms` from `now_ms`
    pub fn start(now_ms: u64, duration_ms: u64) -> Self {
        Self {
            origin_ms: now_ms,
            duration_ms,
        }
    }

    /// Overwrite origin and duration
    pub fn restart(&mut self, now_ms: u64, duration_ms: u64) {
        *self = Self::start(now_ms, duration_ms);
    }

    #[cfg(test)]
    pub fn origin_ms(&self) -> u64 {
        self.origin_ms
    }

    #[cfg(test)]
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Time since the origin, zero if the clock went backwards
    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.origin_ms)
    }

    /// Time left for display, within `[0, duration]`
    pub fn remaining(&self, now_ms: u64) -> u64 {
        self.duration_ms.saturating_sub(self.elapsed_ms(now_ms))
    }

    /// Whether the full dwell duration has passed
    pub fn elapsed(&self, now_ms: u64) -> bool {
        self.elapsed_ms(now_ms) >= self.duration_ms
    }
}

use std::time::{Duration, Instant};

/// Lets the first `first` events through, then every `every`-th one.
///
/// `every == 0` means nothing after the first `first` events.
#[derive(Debug, Clone)]
pub struct LogThrottle {
    first: u64,
    every: u64,
    count: u64,
}

impl LogThrottle {
    pub fn new(first: u64, every: u64) -> Self {
        Self {
            first,
            every,
            count: 0,
        }
    }

    /// Record an event; returns whether it should be logged.
    pub fn hit(&mut self) -> bool {
        self.count += 1;
        self.count <= self.first || (self.every != 0 && self.count % self.every == 0)
    }

    /// Number of events recorded so far.
    pub fn count(&self) -> u64 {
        self.count
    }
}

/// Measures frames per second over fixed reporting windows.
#[derive(Debug, Clone)]
pub struct FpsMeter {
    interval: Duration,
    window_start: Instant,
    frames: u64,
}

impl FpsMeter {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            window_start: now,
            frames: 0,
        }
    }

    /// Count one frame. Once a window of at least `interval` has elapsed,
    /// returns the rate over it and starts a new window.
    pub fn record(&mut self, now: Instant) -> Option<f64> {
        self.frames += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.interval || elapsed.is_zero() {
            return None;
        }
        let fps = self.frames as f64 / elapsed.as_secs_f64();
        self.frames = 0;
        self.window_start = now;
        Some(fps)
    }
}

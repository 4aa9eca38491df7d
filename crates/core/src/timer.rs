//! High-resolution timer for frame timing.

use std::time::{Duration, Instant};

/// High-resolution timer for measuring elapsed time.
///
/// `mark` is the frame-delta primitive: it returns the seconds since the
/// previous mark and moves the mark to now.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_mark: Instant,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_mark: now,
        }
    }

    /// Get the total elapsed time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get the elapsed time in seconds since the timer was created.
    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed().as_secs_f32()
    }

    /// Seconds since the last mark; resets the mark.
    pub fn mark(&mut self) -> f32 {
        let now = Instant::now();
        let delta = now - self.last_mark;
        self.last_mark = now;
        delta.as_secs_f32()
    }

    /// Seconds since the last mark, without resetting it.
    pub fn peek(&self) -> f32 {
        self.last_mark.elapsed().as_secs_f32()
    }

    /// Reset the timer to the current time.
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.start = now;
        self.last_mark = now;
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

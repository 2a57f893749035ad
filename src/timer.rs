use std::time::{Duration, Instant};

/// Measures the wall-clock time of a packing operation.
pub struct Timer {
    start: Instant,

    /// Time between starting and the first call to `end`.
    elapsed: Option<Duration>,
}

impl Timer {
    /// Create a timer which starts immediately.
    pub fn start_new() -> Timer {
        Timer {
            start: Instant::now(),
            elapsed: None,
        }
    }

    /// Stop the timer. Later calls have no effect.
    pub fn end(&mut self) {
        self.elapsed.get_or_insert_with(|| self.start.elapsed());
    }

    /// Return the time in milliseconds until the timer was stopped, or until
    /// now if it is still running.
    pub fn elapsed_ms(&self) -> f32 {
        let elapsed = self.elapsed.unwrap_or_else(|| self.start.elapsed());
        elapsed.as_secs_f32() * 1000.0
    }
}

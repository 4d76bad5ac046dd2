use std::time::{Duration, Instant};

use log::trace;

/// Measures the time between consecutive ticks, in milliseconds.
pub struct TickTimer {
    last: Instant,
}

impl Default for TickTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl TickTimer {
    pub fn new() -> Self {
        Self {
            last: Instant::now(),
        }
    }

    pub fn tick(&mut self) -> f64 {
        let now = Instant::now();
        let diff = now.duration_since(self.last).as_secs_f64() * 1e3;
        self.last = now;
        diff
    }

    /// Ticks and logs the elapsed time at trace level.
    pub fn tick_trace(&mut self, msg: &str) -> f64 {
        let diff = self.tick();
        trace!("{}: {:.3} ms", msg, diff);
        diff
    }
}

/// Converts seconds into a [`Duration`]. Negative and NaN inputs map to zero, values too large
/// for a `Duration` saturate to [`Duration::MAX`].
pub fn secs(seconds: f64) -> Duration {
    if seconds.is_nan() || seconds <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn secs_saturates_invalid_input() {
        assert_eq!(secs(0.25), Duration::from_millis(250));
        assert_eq!(secs(-1.0), Duration::ZERO);
        assert_eq!(secs(f64::NAN), Duration::ZERO);
        assert_eq!(secs(f64::NEG_INFINITY), Duration::ZERO);
        assert_eq!(secs(1e20), Duration::MAX);
        assert_eq!(secs(f64::INFINITY), Duration::MAX);
    }

    #[test]
    fn tick_measures_elapsed_time() {
        let mut timer = TickTimer::new();
        std::thread::sleep(Duration::from_millis(5));
        assert!(timer.tick_trace("sleep") >= 5.0);
    }
}

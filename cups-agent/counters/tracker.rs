// Counter Tracker
//
// Turns successive raw samples of a wrapping hardware counter into a
// per-second rate.

use std::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Sample {
    value: u64,
    at: Instant,
}

/// Rate tracker for a counter that wraps at `2^BITS - 1`
#[derive(Debug, Clone, Default)]
pub struct CounterTracker<const BITS: u32> {
    previous: Option<Sample>,
}

impl<const BITS: u32> CounterTracker<BITS> {
    pub const OVERFLOWS_AT: u64 = if BITS >= 64 {
        u64::MAX
    } else {
        (1u64 << BITS) - 1
    };

    pub fn new() -> Self {
        Self { previous: None }
    }

    pub fn sample(&mut self, tag: &str, value: u64) -> Option<f64> {
        self.sample_at(tag, value, Instant::now())
    }

    /// Record `value` taken at `at` and return the rate since the previous sample
    ///
    /// The sample is stored even when no rate can be produced.
    pub fn sample_at(&mut self, tag: &str, value: u64, at: Instant) -> Option<f64> {
        let previous = self.previous.replace(Sample { value, at })?;

        let delta = Self::delta(previous.value, value);
        let elapsed = at.saturating_duration_since(previous.at).as_secs_f64();
        if elapsed <= 0.0 {
            tracing::debug!("[{}] zero elapsed time between samples", tag);
            return None;
        }

        let rate = delta as f64 / elapsed;
        tracing::debug!(
            "[{}] delta(v) = {}, delta(t) = {:.3}s, delta(1s) = {:.1}",
            tag,
            delta,
            elapsed,
            rate
        );
        Some(rate)
    }

    pub fn delta(previous: u64, current: u64) -> u64 {
        if current >= previous {
            current - previous
        } else {
            (Self::OVERFLOWS_AT - previous) + current
        }
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

pub fn convert_to_percent(value: f64, max: f64) -> f64 {
    if max == 0.0 {
        return f64::NAN;
    }
    value * 100.0 / max
}

pub fn mhz_to_hz(mhz: u32) -> u64 {
    mhz as u64 * 1_000_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_first_sample_has_no_rate() {
        for value in [0, 1, 1000, u64::MAX] {
            let mut tracker = CounterTracker::<64>::new();
            assert_eq!(tracker.sample("test", value), None);
        }
    }

    #[test]
    fn test_overflow_8_bits() {
        let start = Instant::now();
        let mut tracker = CounterTracker::<8>::new();

        assert_eq!(tracker.sample_at("test", 1, start), None);
        let rate = tracker
            .sample_at("test", 0, start + Duration::from_secs(1))
            .unwrap();
        assert!((rate - 254.0).abs() < 1e-9);
    }

    #[test]
    fn test_overflow_ceilings() {
        assert_eq!(CounterTracker::<8>::OVERFLOWS_AT, 255);
        assert_eq!(CounterTracker::<32>::OVERFLOWS_AT, u32::MAX as u64);
        assert_eq!(CounterTracker::<36>::OVERFLOWS_AT, (1 << 36) - 1);
        assert_eq!(CounterTracker::<64>::OVERFLOWS_AT, u64::MAX);

        assert_eq!(CounterTracker::<64>::delta(u64::MAX - 1, 1), 2);
        assert_eq!(CounterTracker::<32>::delta(10, 30), 20);
    }

    #[test]
    fn test_rate_normalized_to_one_second() {
        let start = Instant::now();
        let mut tracker = CounterTracker::<32>::new();

        tracker.sample_at("test", 100, start);
        let rate = tracker
            .sample_at("test", 600, start + Duration::from_millis(500))
            .unwrap();
        assert!((rate - 1000.0).abs() < 1e-6);

        let rate = tracker
            .sample_at("test", 800, start + Duration::from_millis(2500))
            .unwrap();
        assert!((rate - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_elapsed_stores_sample() {
        let start = Instant::now();
        let mut tracker = CounterTracker::<32>::new();

        tracker.sample_at("test", 100, start);
        assert_eq!(tracker.sample_at("test", 200, start), None);

        // Delta is taken from the sample stored above
        let rate = tracker
            .sample_at("test", 300, start + Duration::from_secs(1))
            .unwrap();
        assert!((rate - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset() {
        let mut tracker = CounterTracker::<32>::new();
        tracker.sample("test", 1);
        tracker.reset();
        assert_eq!(tracker.sample("test", 2), None);
    }

    #[test]
    fn test_convert_to_percent() {
        assert!(convert_to_percent(50.0, 0.0).is_nan());
        assert!(convert_to_percent(0.0, 0.0).is_nan());
        assert_eq!(convert_to_percent(50.0, 200.0), 25.0);
    }

    #[test]
    fn test_mhz_to_hz() {
        assert_eq!(mhz_to_hz(2400), 2_400_000_000);
    }
}

//! Rolling tick-rate measurement.

use std::time::{Duration, Instant};

const BUCKETS: usize = 8;
const BUCKET_SPAN: Duration = Duration::from_millis(125);

/// Counts ticks in eight 125 ms buckets covering the last second.
#[derive(Debug)]
pub(crate) struct TickrateMonitor {
    buckets: [u64; BUCKETS],
    cursor: usize,
    pending: u64,
    bucket_start: Instant,
}

impl TickrateMonitor {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            buckets: [0; BUCKETS],
            cursor: 0,
            pending: 0,
            bucket_start: now,
        }
    }

    pub(crate) fn record_tick(&mut self, now: Instant) {
        self.advance(now);
        self.pending += 1;
    }

    /// Ticks counted over the last completed second.
    pub(crate) fn ticks_per_second(&mut self, now: Instant) -> u64 {
        self.advance(now);
        self.buckets.iter().sum()
    }

    pub(crate) fn clear(&mut self, now: Instant) {
        *self = Self::new(now);
    }

    fn advance(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.bucket_start);
        let steps = (elapsed.as_nanos() / BUCKET_SPAN.as_nanos()) as usize;
        if steps == 0 {
            return;
        }

        self.buckets[self.cursor] = self.pending;
        self.pending = 0;
        self.cursor = (self.cursor + 1) % BUCKETS;
        for _ in 1..steps.min(BUCKETS + 1) {
            self.buckets[self.cursor] = 0;
            self.cursor = (self.cursor + 1) % BUCKETS;
        }

        if steps > BUCKETS {
            self.bucket_start = now;
        } else {
            self.bucket_start += BUCKET_SPAN * steps as u32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_empty_monitor_reports_zero() {
        let start = Instant::now();
        let mut monitor = TickrateMonitor::new(start);
        assert_eq!(monitor.ticks_per_second(start + ms(2000)), 0);
    }

    #[test]
    fn test_steady_rate() {
        let start = Instant::now();
        let mut monitor = TickrateMonitor::new(start);
        for i in 0..40 {
            monitor.record_tick(start + ms(i * 25));
        }
        assert_eq!(monitor.ticks_per_second(start + ms(1000)), 40);
    }

    #[test]
    fn test_old_ticks_roll_off() {
        let start = Instant::now();
        let mut monitor = TickrateMonitor::new(start);
        for i in 0..40 {
            monitor.record_tick(start + ms(i * 25));
        }
        // Half a second later only the second half of the ticks remain.
        assert_eq!(monitor.ticks_per_second(start + ms(1500)), 20);
        assert_eq!(monitor.ticks_per_second(start + ms(5000)), 0);
    }

    #[test]
    fn test_clear() {
        let start = Instant::now();
        let mut monitor = TickrateMonitor::new(start);
        monitor.record_tick(start);
        monitor.clear(start + ms(10));
        assert_eq!(monitor.ticks_per_second(start + ms(1500)), 0);
    }
}

use std::time::{Duration, Instant};

/// Received/lost accounting for one stream, reported and reset per interval.
///
/// "Received" and "lost" are in the stream's own unit: whole frames for video,
/// datagrams for audio. Totals since creation survive the interval resets.
#[derive(Debug, Clone)]
pub struct LossCounter {
    received: u64,
    lost: u64,
    total_received: u64,
    total_lost: u64,
    last_report: Instant,
}

/// Counters for one finished report interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossReport {
    pub received: u64,
    pub lost: u64,
    pub elapsed: Duration,
}

impl LossReport {
    pub fn loss_rate(&self) -> f32 {
        let total = self.received + self.lost;
        if total == 0 {
            0.0
        } else {
            self.lost as f32 / total as f32
        }
    }
}

impl LossCounter {
    pub fn new(now: Instant) -> Self {
        Self {
            received: 0,
            lost: 0,
            total_received: 0,
            total_lost: 0,
            last_report: now,
        }
    }

    pub fn record_received(&mut self) {
        self.received += 1;
        self.total_received += 1;
    }

    pub fn record_lost(&mut self, count: u64) {
        self.lost += count;
        self.total_lost += count;
    }

    pub fn total_received(&self) -> u64 {
        self.total_received
    }

    pub fn total_lost(&self) -> u64 {
        self.total_lost
    }

    /// Close the current interval if `interval` has passed since the last report.
    pub fn take_report(&mut self, now: Instant, interval: Duration) -> Option<LossReport> {
        let elapsed = now.saturating_duration_since(self.last_report);
        if elapsed < interval {
            return None;
        }
        let report = LossReport {
            received: self.received,
            lost: self.lost,
            elapsed,
        };
        self.received = 0;
        self.lost = 0;
        self.last_report = now;
        Some(report)
    }

    /// Drop interval and total counters, restarting the interval at `now`.
    pub fn reset(&mut self, now: Instant) {
        *self = Self::new(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_waits_for_interval() {
        let start = Instant::now();
        let mut counter = LossCounter::new(start);
        counter.record_received();
        assert!(counter
            .take_report(start + Duration::from_secs(1), Duration::from_secs(5))
            .is_none());
    }

    #[test]
    fn report_resets_interval_counters_only() {
        let start = Instant::now();
        let mut counter = LossCounter::new(start);
        counter.record_received();
        counter.record_received();
        counter.record_received();
        counter.record_lost(1);

        let report = counter
            .take_report(start + Duration::from_secs(5), Duration::from_secs(5))
            .unwrap();
        assert_eq!(report.received, 3);
        assert_eq!(report.lost, 1);
        assert!((report.loss_rate() - 0.25).abs() < 1e-6);

        let next = counter
            .take_report(start + Duration::from_secs(10), Duration::from_secs(5))
            .unwrap();
        assert_eq!(next.received, 0);
        assert_eq!(next.lost, 0);
        assert_eq!(counter.total_received(), 3);
        assert_eq!(counter.total_lost(), 1);
    }

    #[test]
    fn empty_report_has_zero_loss() {
        let report = LossReport {
            received: 0,
            lost: 0,
            elapsed: Duration::ZERO,
        };
        assert_eq!(report.loss_rate(), 0.0);
    }
}

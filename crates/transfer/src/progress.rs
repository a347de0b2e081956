use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Channel on which progress snapshots are published.
///
/// Senders use `try_send`: a slow consumer loses intermediate snapshots
/// instead of stalling the transfer loop.
pub type ProgressSender = mpsc::Sender<ProgressSnapshot>;

/// Point-in-time view of a running transfer. Never sent over the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub current_size: u64,
    pub total_size: u64,
    /// 0..=100.
    pub percentage: f64,
    /// Seconds since the tracker was created.
    pub elapsed_time: f64,
    pub speed_mbps: f64,
    pub eta_seconds: f64,
}

/// Rate-limited progress computation for one transfer.
///
/// Callers gate on [`should_update`](Self::should_update) before calling
/// [`update`](Self::update); the tracker itself never throttles.
pub struct ProgressTracker {
    total_size: u64,
    update_interval: Duration,
    started_at: Instant,
    last_update: Option<Instant>,
    last_percentage: f64,
}

impl ProgressTracker {
    pub fn new(total_size: u64, update_interval: Duration) -> Self {
        Self {
            total_size,
            update_interval,
            started_at: Instant::now(),
            last_update: None,
            last_percentage: 0.0,
        }
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Returns `true` if at least `update_interval` passed since the last
    /// accepted update. A fresh tracker is always due.
    pub fn should_update(&self) -> bool {
        match self.last_update {
            Some(at) => at.elapsed() >= self.update_interval,
            None => true,
        }
    }

    /// Computes a snapshot for `current_size` and records the update time.
    pub fn update(&mut self, current_size: u64) -> ProgressSnapshot {
        let now = Instant::now();
        let elapsed = now.duration_since(self.started_at).as_secs_f64();

        let percentage = if self.total_size == 0 {
            0.0
        } else {
            (current_size as f64 / self.total_size as f64 * 100.0).min(100.0)
        };
        // Percentages never go backwards within one transfer.
        let percentage = percentage.max(self.last_percentage);
        self.last_percentage = percentage;

        let mut speed_mbps = 0.0;
        let mut eta_seconds = 0.0;
        if elapsed > 0.0 {
            let bytes_per_sec = current_size as f64 / elapsed;
            speed_mbps = bytes_per_sec * 8.0 / (1024.0 * 1024.0);
            if current_size > 0 {
                let remaining = self.total_size.saturating_sub(current_size) as f64;
                eta_seconds = remaining / bytes_per_sec;
            }
        }

        self.last_update = Some(now);
        ProgressSnapshot {
            current_size,
            total_size: self.total_size,
            percentage,
            elapsed_time: elapsed,
            speed_mbps,
            eta_seconds,
        }
    }

    /// Final snapshot: always reports exactly 100%.
    pub fn finish(&mut self) -> ProgressSnapshot {
        let mut snapshot = self.update(self.total_size);
        snapshot.percentage = 100.0;
        snapshot.eta_seconds = 0.0;
        self.last_percentage = 100.0;
        snapshot
    }
}

/// Average throughput in Mbps, rounded to two decimals (0 if no time elapsed).
pub fn average_speed_mbps(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    let mbps = bytes as f64 * 8.0 / (secs * 1024.0 * 1024.0);
    (mbps * 100.0).round() / 100.0
}

/// Elapsed time in whole milliseconds, rounded to nearest.
pub fn transfer_time_ms(elapsed: Duration) -> u64 {
    (elapsed.as_secs_f64() * 1000.0).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fresh_tracker_is_due() {
        let tracker = ProgressTracker::new(100, Duration::from_secs(1));
        assert!(tracker.should_update());
    }

    #[tokio::test(start_paused = true)]
    async fn should_update_throttles_to_interval() {
        let mut tracker = ProgressTracker::new(100, Duration::from_secs(1));
        tracker.update(10);
        assert!(!tracker.should_update());

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(!tracker.should_update());

        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(tracker.should_update());
    }

    #[tokio::test(start_paused = true)]
    async fn update_computes_speed_and_eta() {
        let mut tracker = ProgressTracker::new(4 * 1024 * 1024, Duration::from_secs(1));
        tokio::time::advance(Duration::from_secs(2)).await;

        let snap = tracker.update(1024 * 1024);
        assert_eq!(snap.current_size, 1024 * 1024);
        assert!((snap.percentage - 25.0).abs() < 1e-9);
        assert!((snap.elapsed_time - 2.0).abs() < 1e-6);
        // 512 KiB/s = 4 Mbps.
        assert!((snap.speed_mbps - 4.0).abs() < 1e-6);
        // 3 MiB remaining at 512 KiB/s.
        assert!((snap.eta_seconds - 6.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_elapsed_reports_zero_speed() {
        let mut tracker = ProgressTracker::new(100, Duration::from_secs(1));
        let snap = tracker.update(50);
        assert_eq!(snap.speed_mbps, 0.0);
        assert_eq!(snap.eta_seconds, 0.0);
        assert!((snap.percentage - 50.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_total_is_zero_percent() {
        let mut tracker = ProgressTracker::new(0, Duration::from_secs(1));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(tracker.update(0).percentage, 0.0);
        assert_eq!(tracker.finish().percentage, 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn percentage_is_monotonic_and_finishes_at_100() {
        let mut tracker = ProgressTracker::new(1000, Duration::ZERO);
        let mut last = 0.0;
        for current in [100, 400, 300, 900] {
            tokio::time::advance(Duration::from_millis(10)).await;
            let snap = tracker.update(current);
            assert!(snap.percentage >= last);
            last = snap.percentage;
        }
        assert_eq!(tracker.finish().percentage, 100.0);
    }

    #[test]
    fn average_speed_rounds_to_two_decimals() {
        // 1 MiB in 1 s = 8 Mbps.
        assert_eq!(average_speed_mbps(1024 * 1024, Duration::from_secs(1)), 8.0);
        // 1 MiB in 3 s = 2.666.. Mbps.
        assert_eq!(average_speed_mbps(1024 * 1024, Duration::from_secs(3)), 2.67);
        assert_eq!(average_speed_mbps(1024, Duration::ZERO), 0.0);
    }

    #[test]
    fn transfer_time_rounds_to_nearest_ms() {
        assert_eq!(transfer_time_ms(Duration::from_micros(1_499)), 1);
        assert_eq!(transfer_time_ms(Duration::from_micros(1_500)), 2);
        assert_eq!(transfer_time_ms(Duration::ZERO), 0);
    }
}

//! Progress tracking for long indexing runs.
//!
//! Workers bump atomic counters; a sampling reporter prints one line at a
//! fixed cadence with throughput and an ETA. Reporting never blocks the
//! workers.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

const REPORT_INTERVAL: Duration = Duration::from_secs(3);

/// Shared progress counters for one indexing run.
#[derive(Debug)]
pub struct Progress {
    total: usize,
    processed: AtomicUsize,
    elapsed_nanos: AtomicU64,
    started: Instant,
}

impl Progress {
    pub fn new(total: usize) -> Arc<Self> {
        Arc::new(Self {
            total,
            processed: AtomicUsize::new(0),
            elapsed_nanos: AtomicU64::new(0),
            started: Instant::now(),
        })
    }

    /// Record a completed file and its processing time.
    pub fn record(&self, duration: Duration) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.elapsed_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let processed = self.processed.load(Ordering::Relaxed);
        let avg = if processed > 0 {
            Duration::from_nanos(self.elapsed_nanos.load(Ordering::Relaxed) / processed as u64)
        } else {
            Duration::ZERO
        };
        let remaining = self.total.saturating_sub(processed);

        ProgressSnapshot {
            processed,
            total: self.total,
            elapsed: self.started.elapsed(),
            avg_file_duration: avg,
            eta: avg * remaining as u32,
        }
    }
}

/// A point-in-time view of the counters.
#[derive(Debug, Clone, Copy)]
pub struct ProgressSnapshot {
    pub processed: usize,
    pub total: usize,
    pub elapsed: Duration,
    pub avg_file_duration: Duration,
    pub eta: Duration,
}

/// Spawn the sampling reporter. It exits on its own once every file is
/// processed; abort the handle to stop it early.
pub fn spawn_reporter(progress: Arc<Progress>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(REPORT_INTERVAL);
        // The first tick fires immediately; skip it.
        interval.tick().await;

        loop {
            interval.tick().await;
            let snap = progress.snapshot();
            if snap.processed >= snap.total {
                return;
            }

            let percent = if snap.total > 0 {
                snap.processed as f64 / snap.total as f64 * 100.0
            } else {
                100.0
            };

            tracing::info!(
                "indexing progress: {}/{} files ({:.1}%) | elapsed: {:.0?} | avg: {:.0?}/file | eta: {:.0?}",
                snap.processed,
                snap.total,
                percent,
                snap.elapsed,
                snap.avg_file_duration,
                snap.eta,
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_computes_average_and_eta() {
        let progress = Progress::new(10);
        progress.record(Duration::from_millis(100));
        progress.record(Duration::from_millis(300));

        let snap = progress.snapshot();
        assert_eq!(snap.processed, 2);
        assert_eq!(snap.total, 10);
        assert_eq!(snap.avg_file_duration, Duration::from_millis(200));
        assert_eq!(snap.eta, Duration::from_millis(1600));
    }

    #[test]
    fn snapshot_before_any_work() {
        let progress = Progress::new(5);
        let snap = progress.snapshot();
        assert_eq!(snap.processed, 0);
        assert_eq!(snap.avg_file_duration, Duration::ZERO);
        assert_eq!(snap.eta, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn reporter_exits_when_done() {
        let progress = Progress::new(1);
        let handle = spawn_reporter(progress.clone());
        progress.record(Duration::from_millis(1));

        // Paused time auto-advances, so the reporter's next tick fires
        // immediately and observes completion.
        handle.await.unwrap();
    }
}

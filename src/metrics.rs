// Scan metrics module
//
// Lightweight counters for what a scanning session saw and decided

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Per-session scan metrics
///
/// Uses atomic operations so the camera worker, the event pump and the UI
/// thread can record without sharing a lock. Logged once when the scanner
/// shuts down.
#[derive(Debug)]
pub struct ScanMetrics {
    /// Frame batches received from the analyzer
    pub frames_analyzed: AtomicU64,

    /// Batches with no barcode
    pub empty_batches: AtomicU64,

    /// Batches with exactly one barcode (fast path)
    pub single_matches: AtomicU64,

    /// Batches with several barcodes (sheet opened or extended)
    pub ambiguous_batches: AtomicU64,

    /// Batches dropped because the sheet was open or the session ended
    pub batches_ignored: AtomicU64,

    pub results_success: AtomicU64,
    pub results_failed: AtomicU64,
    pub results_canceled: AtomicU64,

    /// Sheets closed without a pick
    pub sheet_dismissals: AtomicU64,

    /// Preview frames dropped because the event channel was full
    pub preview_frames_dropped: AtomicU64,

    /// UI updates queued through the event loop bridge
    pub ui_updates: AtomicU64,

    start_time: Instant,
}

impl ScanMetrics {
    pub fn new() -> Self {
        Self {
            frames_analyzed: AtomicU64::new(0),
            empty_batches: AtomicU64::new(0),
            single_matches: AtomicU64::new(0),
            ambiguous_batches: AtomicU64::new(0),
            batches_ignored: AtomicU64::new(0),
            results_success: AtomicU64::new(0),
            results_failed: AtomicU64::new(0),
            results_canceled: AtomicU64::new(0),
            sheet_dismissals: AtomicU64::new(0),
            preview_frames_dropped: AtomicU64::new(0),
            ui_updates: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record an analyzed batch by size
    pub fn record_batch(&self, size: usize) {
        self.frames_analyzed.fetch_add(1, Ordering::Relaxed);
        let counter = match size {
            0 => &self.empty_batches,
            1 => &self.single_matches,
            _ => &self.ambiguous_batches,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_ignored(&self) {
        self.frames_analyzed.fetch_add(1, Ordering::Relaxed);
        self.batches_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_result(&self, kind: crate::models::ResultKind) {
        use crate::models::ResultKind;

        let counter = match kind {
            ResultKind::Success => &self.results_success,
            ResultKind::Failed => &self.results_failed,
            ResultKind::Canceled => &self.results_canceled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sheet_dismissed(&self) {
        self.sheet_dismissals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_preview_dropped(&self) {
        self.preview_frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ui_update(&self) {
        self.ui_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Share of analyzed frames that contained at least one barcode
    pub fn hit_rate(&self) -> f64 {
        let total = self.frames_analyzed.load(Ordering::Relaxed);
        let hits = self.single_matches.load(Ordering::Relaxed)
            + self.ambiguous_batches.load(Ordering::Relaxed);
        if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Scan Metrics Summary ===");
        tracing::info!("Session length: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Frames: {} analyzed, {} empty, {} single, {} ambiguous, {} ignored (hit rate {:.1}%)",
            self.frames_analyzed.load(Ordering::Relaxed),
            self.empty_batches.load(Ordering::Relaxed),
            self.single_matches.load(Ordering::Relaxed),
            self.ambiguous_batches.load(Ordering::Relaxed),
            self.batches_ignored.load(Ordering::Relaxed),
            self.hit_rate() * 100.0
        );
        tracing::info!(
            "Results: {} success, {} failed, {} canceled, {} sheet dismissals",
            self.results_success.load(Ordering::Relaxed),
            self.results_failed.load(Ordering::Relaxed),
            self.results_canceled.load(Ordering::Relaxed),
            self.sheet_dismissals.load(Ordering::Relaxed)
        );
        tracing::info!(
            "UI updates: {}, preview frames dropped: {}",
            self.ui_updates.load(Ordering::Relaxed),
            self.preview_frames_dropped.load(Ordering::Relaxed)
        );
    }
}

impl Default for ScanMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResultKind;
    use std::thread;

    #[test]
    fn test_metrics_creation() {
        let metrics = ScanMetrics::new();
        assert_eq!(metrics.frames_analyzed.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.results_success.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_batches_by_size() {
        let metrics = ScanMetrics::new();

        metrics.record_batch(0);
        metrics.record_batch(1);
        metrics.record_batch(1);
        metrics.record_batch(3);
        metrics.record_batch_ignored();

        assert_eq!(metrics.frames_analyzed.load(Ordering::Relaxed), 5);
        assert_eq!(metrics.empty_batches.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.single_matches.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.ambiguous_batches.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.batches_ignored.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_hit_rate() {
        let metrics = ScanMetrics::new();
        assert_eq!(metrics.hit_rate(), 0.0);

        metrics.record_batch(0);
        metrics.record_batch(1);
        metrics.record_batch(0);
        metrics.record_batch(2);

        assert_eq!(metrics.hit_rate(), 0.5);
    }

    #[test]
    fn test_record_results() {
        let metrics = ScanMetrics::new();

        metrics.record_result(ResultKind::Success);
        metrics.record_result(ResultKind::Success);
        metrics.record_result(ResultKind::Canceled);
        metrics.record_sheet_dismissed();

        assert_eq!(metrics.results_success.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.results_failed.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.results_canceled.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.sheet_dismissals.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_uptime() {
        let metrics = ScanMetrics::new();
        thread::sleep(Duration::from_millis(10));
        assert!(metrics.uptime().as_millis() >= 10);
    }
}

//! Thread-safe metrics collection system
//!
//! Provides atomic counters and a mutex-protected timing window for tracking
//! job submissions, job outcomes and row throughput.

use crate::processing::PipelineStats;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Number of most recent job durations kept for percentile calculation
const PROCESSING_TIME_WINDOW: usize = 1000;

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Thread-safe metrics collector using atomics and mutexes
pub struct MetricsCollector {
    // Job lifecycle counters
    jobs_submitted: AtomicU64,
    jobs_rejected: AtomicU64,
    jobs_in_progress: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    runtime_faults: AtomicU64,
    jobs_reaped: AtomicU64,
    max_in_progress_reached: AtomicU64,

    // Row throughput
    rows_processed: AtomicU64,
    rows_skipped: AtomicU64,
    rows_flagged: AtomicU64,

    // Processing times (mutex protected for complex operations)
    processing_times: Mutex<Vec<u64>>, // in milliseconds

    uptime_start: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            jobs_submitted: AtomicU64::new(0),
            jobs_rejected: AtomicU64::new(0),
            jobs_in_progress: AtomicU64::new(0),
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            runtime_faults: AtomicU64::new(0),
            jobs_reaped: AtomicU64::new(0),
            max_in_progress_reached: AtomicU64::new(0),
            rows_processed: AtomicU64::new(0),
            rows_skipped: AtomicU64::new(0),
            rows_flagged: AtomicU64::new(0),
            processing_times: Mutex::new(Vec::new()),
            uptime_start: AtomicU64::new(current_timestamp()),
        }
    }

    // Job lifecycle metrics
    pub fn job_submitted(&self) {
        self.jobs_submitted.fetch_add(1, Ordering::Relaxed);
        let in_progress = self.jobs_in_progress.fetch_add(1, Ordering::Relaxed) + 1;
        self.max_in_progress_reached
            .fetch_max(in_progress, Ordering::Relaxed);
    }

    pub fn job_rejected(&self) {
        self.jobs_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_completed(&self, duration: Duration, stats: &PipelineStats) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
        self.finish_in_progress();

        self.rows_processed
            .fetch_add(stats.rows_processed, Ordering::Relaxed);
        self.rows_skipped
            .fetch_add(stats.rows_skipped, Ordering::Relaxed);
        self.rows_flagged
            .fetch_add(stats.rows_flagged, Ordering::Relaxed);

        self.record_processing_time(duration);
    }

    pub fn job_failed(&self, duration: Duration, runtime_fault: bool) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        if runtime_fault {
            self.runtime_faults.fetch_add(1, Ordering::Relaxed);
        }
        self.finish_in_progress();

        // Record processing time even for failed jobs
        self.record_processing_time(duration);
    }

    pub fn jobs_reaped(&self, count: u64) {
        self.jobs_reaped.fetch_add(count, Ordering::Relaxed);
    }

    fn finish_in_progress(&self) {
        let _ = self
            .jobs_in_progress
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(1))
            });
    }

    fn record_processing_time(&self, duration: Duration) {
        if let Ok(mut times) = self.processing_times.lock() {
            times.push(duration.as_millis() as u64);

            if times.len() > PROCESSING_TIME_WINDOW {
                times.remove(0);
            }
        }
    }

    // Reset all metrics (useful for testing)
    pub fn reset(&self) {
        for counter in [
            &self.jobs_submitted,
            &self.jobs_rejected,
            &self.jobs_in_progress,
            &self.jobs_completed,
            &self.jobs_failed,
            &self.runtime_faults,
            &self.jobs_reaped,
            &self.max_in_progress_reached,
            &self.rows_processed,
            &self.rows_skipped,
            &self.rows_flagged,
        ] {
            counter.store(0, Ordering::Relaxed);
        }

        if let Ok(mut times) = self.processing_times.lock() {
            times.clear();
        }
        self.uptime_start
            .store(current_timestamp(), Ordering::Relaxed);
    }

    /// Calculate processing time statistics: (avg, p50, p95, p99)
    fn calculate_processing_time_statistics(&self) -> (f64, f64, f64, f64) {
        let Ok(times) = self.processing_times.lock() else {
            return (0.0, 0.0, 0.0, 0.0);
        };
        if times.is_empty() {
            return (0.0, 0.0, 0.0, 0.0);
        }

        let mut sorted_times = times.clone();
        drop(times);
        sorted_times.sort_unstable();

        let avg = sorted_times.iter().sum::<u64>() as f64 / sorted_times.len() as f64;
        (
            avg,
            percentile(&sorted_times, 50.0),
            percentile(&sorted_times, 95.0),
            percentile(&sorted_times, 99.0),
        )
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let (avg_processing_time_ms, p50, p95, p99) = self.calculate_processing_time_statistics();

        MetricsSnapshot {
            jobs: JobMetrics {
                submitted: self.jobs_submitted.load(Ordering::Relaxed),
                rejected: self.jobs_rejected.load(Ordering::Relaxed),
                in_progress: self.jobs_in_progress.load(Ordering::Relaxed),
                completed: self.jobs_completed.load(Ordering::Relaxed),
                failed: self.jobs_failed.load(Ordering::Relaxed),
                runtime_faults: self.runtime_faults.load(Ordering::Relaxed),
                reaped: self.jobs_reaped.load(Ordering::Relaxed),
                max_in_progress_reached: self.max_in_progress_reached.load(Ordering::Relaxed),
                avg_processing_time_ms,
                processing_time_p50_ms: p50,
                processing_time_p95_ms: p95,
                processing_time_p99_ms: p99,
            },
            rows: RowMetrics {
                processed: self.rows_processed.load(Ordering::Relaxed),
                skipped: self.rows_skipped.load(Ordering::Relaxed),
                flagged: self.rows_flagged.load(Ordering::Relaxed),
            },
            lifecycle: LifecycleMetrics {
                uptime_seconds: now.saturating_sub(self.uptime_start.load(Ordering::Relaxed)),
            },
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

// Public metrics structures
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub jobs: JobMetrics,
    pub rows: RowMetrics,
    pub lifecycle: LifecycleMetrics,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct JobMetrics {
    pub submitted: u64,
    pub rejected: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub failed: u64,
    pub runtime_faults: u64,
    pub reaped: u64,
    pub max_in_progress_reached: u64,
    pub avg_processing_time_ms: f64,
    pub processing_time_p50_ms: f64,
    pub processing_time_p95_ms: f64,
    pub processing_time_p99_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct RowMetrics {
    pub processed: u64,
    pub skipped: u64,
    pub flagged: u64,
}

#[derive(Debug, Serialize)]
pub struct LifecycleMetrics {
    pub uptime_seconds: u64,
}

// Helper functions
fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let len = sorted_data.len();
    let index = (percentile / 100.0) * (len - 1) as f64;

    if index.fract() == 0.0 {
        sorted_data[index as usize] as f64
    } else {
        let lower = sorted_data[index.floor() as usize] as f64;
        let upper = sorted_data[index.ceil() as usize] as f64;
        lower + (upper - lower) * index.fract()
    }
}

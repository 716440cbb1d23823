//! Performance monitor: bounded latency ring, monotonic counters, and a
//! point-in-time system snapshot.
//!
//! Counter style follows `data_loader::main`'s `Arc<AtomicU64>` updated via
//! `fetch_add(.., Ordering::Relaxed)`; the percentile-from-sorted-samples
//! helper is the same shape as
//! `backtest_engine::extended_metrics::percentile_sorted`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

const DEFAULT_RING_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LatencyReport {
    pub mean_ms: f64,
    pub median_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

/// `goroutine_or_task_count`/`gc_cycles`/`last_gc_pause` have no portable
/// single-process Rust analogue: a Tokio runtime's live task count is only
/// exposed behind the unstable `tokio_unstable` cfg, and Rust has no
/// tracing GC to sample. Reported honestly as `0`/`None` rather than
/// fabricated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub goroutine_or_task_count: u64,
    pub allocated_bytes: u64,
    pub sys_bytes: u64,
    pub gc_cycles: u64,
    pub last_gc_pause: Option<Duration>,
    pub concurrent_calculations: usize,
    pub cpu_usage_estimate: f64,
    pub throughput_qps: f64,
    pub cache_hit_ratio: f64,
}

pub struct PerformanceMonitor {
    latencies: Mutex<VecDeque<Duration>>,
    ring_capacity: usize,
    calculation_count: AtomicU64,
    error_count: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    started_at: Instant,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RING_CAPACITY)
    }

    pub fn with_capacity(ring_capacity: usize) -> Self {
        PerformanceMonitor {
            latencies: Mutex::new(VecDeque::with_capacity(ring_capacity)),
            ring_capacity: ring_capacity.max(1),
            calculation_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn record_calculation(&self, duration: Duration, success: bool) {
        self.calculation_count.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
        let mut ring = self.latencies.lock().expect("perf monitor mutex poisoned");
        if ring.len() >= self.ring_capacity {
            ring.pop_front();
        }
        ring.push_back(duration);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn calculation_count(&self) -> u64 {
        self.calculation_count.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn latency_report(&self) -> LatencyReport {
        let ring = self.latencies.lock().expect("perf monitor mutex poisoned");
        if ring.is_empty() {
            return LatencyReport::default();
        }
        let mut sorted: Vec<f64> = ring.iter().map(|d| d.as_secs_f64() * 1000.0).collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let n = sorted.len();
        let mean_ms = sorted.iter().sum::<f64>() / n as f64;

        LatencyReport {
            mean_ms,
            median_ms: percentile_sorted(&sorted, 50.0),
            p95_ms: percentile_sorted(&sorted, 95.0),
            p99_ms: percentile_sorted(&sorted, 99.0),
            min_ms: sorted[0],
            max_ms: sorted[n - 1],
        }
    }

    pub fn throughput_qps(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            0.0
        } else {
            self.calculation_count() as f64 / elapsed
        }
    }

    pub fn cache_hit_ratio(&self) -> f64 {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub fn system_snapshot(&self, concurrent_calculations: usize) -> SystemSnapshot {
        SystemSnapshot {
            goroutine_or_task_count: 0,
            allocated_bytes: 0,
            sys_bytes: 0,
            gc_cycles: 0,
            last_gc_pause: None,
            concurrent_calculations,
            cpu_usage_estimate: 0.0,
            throughput_qps: self.throughput_qps(),
            cache_hit_ratio: self.cache_hit_ratio(),
        }
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

fn percentile_sorted(sorted: &[f64], pct: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    let idx = ((pct / 100.0) * (n as f64 - 1.0)).round() as usize;
    sorted[idx.min(n - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_stays_bounded() {
        let monitor = PerformanceMonitor::with_capacity(5);
        for i in 0..20 {
            monitor.record_calculation(Duration::from_millis(i), true);
        }
        assert_eq!(monitor.latencies.lock().unwrap().len(), 5);
        assert_eq!(monitor.calculation_count(), 20);
    }

    #[test]
    fn latency_report_reflects_samples() {
        let monitor = PerformanceMonitor::new();
        for ms in [1, 2, 3, 4, 5] {
            monitor.record_calculation(Duration::from_millis(ms), true);
        }
        let report = monitor.latency_report();
        assert_eq!(report.min_ms, 1.0);
        assert_eq!(report.max_ms, 5.0);
        assert_eq!(report.median_ms, 3.0);
    }

    #[test]
    fn empty_ring_reports_zeroed_default() {
        let monitor = PerformanceMonitor::new();
        let report = monitor.latency_report();
        assert_eq!(report.mean_ms, 0.0);
        assert_eq!(report.p99_ms, 0.0);
    }

    #[test]
    fn error_count_tracks_failures_only() {
        let monitor = PerformanceMonitor::new();
        monitor.record_calculation(Duration::from_millis(1), true);
        monitor.record_calculation(Duration::from_millis(1), false);
        assert_eq!(monitor.calculation_count(), 2);
        assert_eq!(monitor.error_count(), 1);
    }

    #[test]
    fn cache_hit_ratio_computed_from_counters() {
        let monitor = PerformanceMonitor::new();
        monitor.record_cache_hit();
        monitor.record_cache_hit();
        monitor.record_cache_miss();
        assert!((monitor.cache_hit_ratio() - (2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn system_snapshot_carries_concurrency_and_ratios() {
        let monitor = PerformanceMonitor::new();
        monitor.record_cache_hit();
        let snapshot = monitor.system_snapshot(7);
        assert_eq!(snapshot.concurrent_calculations, 7);
        assert_eq!(snapshot.gc_cycles, 0);
        assert!(snapshot.last_gc_pause.is_none());
    }
}

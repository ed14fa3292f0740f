//! Running audit counters
//!
//! Process-lifetime counters shared by the scheduler and the pipeline. A JSON
//! snapshot is logged at the end of every cycle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

/// Counters for cycles, milestone verdicts and flag submissions
pub struct AuditMetrics {
    cycles_started: AtomicU64,
    cycles_completed: AtomicU64,
    cycles_failed: AtomicU64,
    cycles_skipped: AtomicU64,
    milestones_audited: AtomicU64,
    milestones_passed: AtomicU64,
    milestones_flagged: AtomicU64,
    milestones_errored: AtomicU64,
    flags_submitted: AtomicU64,
    flags_failed: AtomicU64,
    start_time: Instant,
}

/// Point-in-time copy of [`AuditMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub cycles_started: u64,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub cycles_skipped: u64,
    pub milestones_audited: u64,
    pub milestones_passed: u64,
    pub milestones_flagged: u64,
    pub milestones_errored: u64,
    pub flags_submitted: u64,
    pub flags_failed: u64,
    pub uptime_seconds: u64,
}

impl AuditMetrics {
    pub fn new() -> Self {
        Self {
            cycles_started: AtomicU64::new(0),
            cycles_completed: AtomicU64::new(0),
            cycles_failed: AtomicU64::new(0),
            cycles_skipped: AtomicU64::new(0),
            milestones_audited: AtomicU64::new(0),
            milestones_passed: AtomicU64::new(0),
            milestones_flagged: AtomicU64::new(0),
            milestones_errored: AtomicU64::new(0),
            flags_submitted: AtomicU64::new(0),
            flags_failed: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_cycle_started(&self) {
        self.cycles_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cycle_completed(&self) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cycle_failed(&self) {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cycle_skipped(&self) {
        self.cycles_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// A milestone reached validation and passed
    pub fn record_passed(&self) {
        self.milestones_audited.fetch_add(1, Ordering::Relaxed);
        self.milestones_passed.fetch_add(1, Ordering::Relaxed);
    }

    /// A milestone reached validation and failed
    pub fn record_flagged(&self) {
        self.milestones_audited.fetch_add(1, Ordering::Relaxed);
        self.milestones_flagged.fetch_add(1, Ordering::Relaxed);
    }

    /// A milestone audit attempt failed before a decision
    pub fn record_errored(&self) {
        self.milestones_errored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flag_submitted(&self) {
        self.flags_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flag_failed(&self) {
        self.flags_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cycles_started: self.cycles_started.load(Ordering::Relaxed),
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
            cycles_skipped: self.cycles_skipped.load(Ordering::Relaxed),
            milestones_audited: self.milestones_audited.load(Ordering::Relaxed),
            milestones_passed: self.milestones_passed.load(Ordering::Relaxed),
            milestones_flagged: self.milestones_flagged.load(Ordering::Relaxed),
            milestones_errored: self.milestones_errored.load(Ordering::Relaxed),
            flags_submitted: self.flags_submitted.load(Ordering::Relaxed),
            flags_failed: self.flags_failed.load(Ordering::Relaxed),
            uptime_seconds: self.uptime_seconds(),
        }
    }

    /// Get all counters as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or(serde_json::Value::Null)
    }
}

impl Default for AuditMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = AuditMetrics::new();
        metrics.record_cycle_started();
        metrics.record_cycle_started();
        metrics.record_cycle_completed();
        metrics.record_cycle_skipped();
        metrics.record_passed();
        metrics.record_flagged();
        metrics.record_flagged();
        metrics.record_errored();
        metrics.record_flag_submitted();
        metrics.record_flag_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cycles_started, 2);
        assert_eq!(snapshot.cycles_completed, 1);
        assert_eq!(snapshot.cycles_failed, 0);
        assert_eq!(snapshot.cycles_skipped, 1);
        assert_eq!(snapshot.milestones_audited, 3);
        assert_eq!(snapshot.milestones_passed, 1);
        assert_eq!(snapshot.milestones_flagged, 2);
        assert_eq!(snapshot.milestones_errored, 1);
        assert_eq!(snapshot.flags_submitted, 1);
        assert_eq!(snapshot.flags_failed, 1);
    }

    #[test]
    fn test_to_json() {
        let metrics = AuditMetrics::new();
        metrics.record_flagged();

        let json = metrics.to_json();
        assert_eq!(json["milestones_flagged"], 1);
        assert_eq!(json["cycles_started"], 0);
        assert!(json.get("uptime_seconds").is_some());
    }
}

use crate::stage::PushOutcome;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Per-stage counters, updated lock-free from any thread
pub struct StageMetrics {
    stage: String,
    pushed: AtomicU64,
    dropped_oldest: AtomicU64,
    dropped_newest: AtomicU64,
    rejected: AtomicU64,
    dispatches: AtomicU64,
    errors: AtomicU64,
    emitted: AtomicU64,
    total_latency_us: AtomicU64,
    latency_samples: AtomicU64,
}

impl StageMetrics {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            pushed: AtomicU64::new(0),
            dropped_oldest: AtomicU64::new(0),
            dropped_newest: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            dispatches: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            emitted: AtomicU64::new(0),
            total_latency_us: AtomicU64::new(0),
            latency_samples: AtomicU64::new(0),
        }
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn record_push(&self, outcome: PushOutcome) {
        match outcome {
            PushOutcome::Queued => {
                self.pushed.fetch_add(1, Ordering::Relaxed);
            }
            PushOutcome::DroppedOldest => {
                self.pushed.fetch_add(1, Ordering::Relaxed);
                self.dropped_oldest.fetch_add(1, Ordering::Relaxed);
            }
            PushOutcome::DroppedNewest => {
                self.dropped_newest.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch(&self) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_emit(&self) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn start_processing(&self) -> Instant {
        Instant::now()
    }

    pub fn finish_processing(&self, start: Instant) {
        let latency_us = start.elapsed().as_micros() as u64;
        self.total_latency_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    /// Buffers accepted into an input queue
    pub fn pushed(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }

    pub fn dropped_oldest(&self) -> u64 {
        self.dropped_oldest.load(Ordering::Relaxed)
    }

    pub fn dropped_newest(&self) -> u64 {
        self.dropped_newest.load(Ordering::Relaxed)
    }

    /// Pushes refused because the stage stopped
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Successful transform calls
    pub fn dispatches(&self) -> u64 {
        self.dispatches.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    pub fn avg_latency_us(&self) -> u64 {
        let samples = self.latency_samples.load(Ordering::Relaxed);
        if samples == 0 {
            return 0;
        }
        self.total_latency_us.load(Ordering::Relaxed) / samples
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            stage: self.stage.clone(),
            pushed: self.pushed(),
            dropped_oldest: self.dropped_oldest(),
            dropped_newest: self.dropped_newest(),
            rejected: self.rejected(),
            dispatches: self.dispatches(),
            errors: self.errors(),
            emitted: self.emitted(),
            avg_latency_us: self.avg_latency_us(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub stage: String,
    pub pushed: u64,
    pub dropped_oldest: u64,
    pub dropped_newest: u64,
    pub rejected: u64,
    pub dispatches: u64,
    pub errors: u64,
    pub emitted: u64,
    pub avg_latency_us: u64,
}

impl MetricsSnapshot {
    pub fn dropped(&self) -> u64 {
        self.dropped_oldest + self.dropped_newest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_outcomes_counted() {
        let metrics = StageMetrics::new("encoder");
        metrics.record_push(PushOutcome::Queued);
        metrics.record_push(PushOutcome::DroppedOldest);
        metrics.record_push(PushOutcome::DroppedNewest);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.pushed, 2);
        assert_eq!(snapshot.dropped(), 2);
        assert_eq!(snapshot.stage, "encoder");
    }

    #[test]
    fn test_latency_average_without_samples() {
        let metrics = StageMetrics::new("idle");
        assert_eq!(metrics.avg_latency_us(), 0);
        let start = metrics.start_processing();
        metrics.finish_processing(start);
        assert_eq!(metrics.snapshot().dispatches, 0);
    }
}

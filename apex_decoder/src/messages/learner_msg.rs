//! Statistics reported by the learner thread.

use crate::buffers::ReplayStats;

/// Statistics reported by the learner.
#[derive(Debug, Clone, Default)]
pub struct LearnerStats {
    /// Gradient steps applied.
    pub train_steps: usize,

    /// Mean loss since the previous report.
    pub avg_loss: f32,

    /// Training steps per second since the previous report.
    pub steps_per_second: f32,

    /// Latest broadcast policy version.
    pub policy_version: u64,

    /// Batches skipped for non-finite data or loss.
    pub skipped_batches: usize,

    pub target_syncs: usize,

    /// Ids whose priority update was ignored because they were evicted.
    pub stale_priority_updates: usize,

    pub replay: ReplayStats,

    loss_sum: f64,
    loss_count: usize,
}

impl LearnerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an applied gradient step.
    pub fn record_step(&mut self, loss: f32) {
        self.train_steps += 1;
        if loss.is_finite() {
            self.loss_sum += loss as f64;
            self.loss_count += 1;
        }
    }

    pub fn record_skip(&mut self) {
        self.skipped_batches += 1;
    }

    /// Close the current reporting window and return a snapshot of it.
    pub fn take_report(&mut self, steps_per_second: f32, replay: ReplayStats) -> LearnerStats {
        self.avg_loss = if self.loss_count > 0 {
            (self.loss_sum / self.loss_count as f64) as f32
        } else {
            0.0
        };
        self.steps_per_second = steps_per_second;
        self.replay = replay;
        let report = self.clone();
        self.loss_sum = 0.0;
        self.loss_count = 0;
        report
    }
}

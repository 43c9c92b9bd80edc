//! Shared training counters readable while a run is in progress.

use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Fixed-point scale for the reward accumulator.
const REWARD_SCALE: f64 = 1000.0;

/// Thread-safe training metrics.
///
/// Actors, router and learner update these with relaxed atomics; readers
/// get a consistent-enough view for progress reporting.
#[derive(Debug)]
pub struct TrainingMetrics {
    /// Total environment steps across actors
    env_steps: AtomicU64,
    /// Transitions emitted by actors
    transitions_generated: AtomicU64,
    /// Transitions that reached the replay buffer
    transitions_inserted: AtomicU64,
    train_steps: AtomicUsize,
    episodes: AtomicUsize,
    /// Accumulated episode rewards (fixed-point: reward * 1000)
    reward_sum_fixed: AtomicI64,
    actor_restarts: AtomicUsize,
    policy_version: AtomicU64,
    /// Last evaluation success rate, f32 bits
    eval_success_rate: AtomicU32,
}

impl TrainingMetrics {
    pub fn new() -> Self {
        Self {
            env_steps: AtomicU64::new(0),
            transitions_generated: AtomicU64::new(0),
            transitions_inserted: AtomicU64::new(0),
            train_steps: AtomicUsize::new(0),
            episodes: AtomicUsize::new(0),
            reward_sum_fixed: AtomicI64::new(0),
            actor_restarts: AtomicUsize::new(0),
            policy_version: AtomicU64::new(0),
            eval_success_rate: AtomicU32::new(0f32.to_bits()),
        }
    }

    pub fn add_env_steps(&self, steps: u64) {
        self.env_steps.fetch_add(steps, Ordering::Relaxed);
    }

    pub fn add_generated(&self, n: u64) {
        self.transitions_generated.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_inserted(&self, n: u64) {
        self.transitions_inserted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn increment_train_steps(&self) {
        self.train_steps.fetch_add(1, Ordering::Relaxed);
    }

    /// Record episode completion. Non-finite rewards count as episodes only.
    pub fn record_episode(&self, reward: f32) {
        self.episodes.fetch_add(1, Ordering::Relaxed);
        if reward.is_finite() {
            let fixed = (reward as f64 * REWARD_SCALE).round() as i64;
            self.reward_sum_fixed.fetch_add(fixed, Ordering::Relaxed);
        }
    }

    pub fn record_restart(&self) {
        self.actor_restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_policy_version(&self, version: u64) {
        self.policy_version.fetch_max(version, Ordering::Relaxed);
    }

    pub fn set_eval_success_rate(&self, rate: f32) {
        self.eval_success_rate.store(rate.to_bits(), Ordering::Relaxed);
    }

    pub fn env_steps(&self) -> u64 {
        self.env_steps.load(Ordering::Relaxed)
    }

    pub fn transitions_generated(&self) -> u64 {
        self.transitions_generated.load(Ordering::Relaxed)
    }

    pub fn transitions_inserted(&self) -> u64 {
        self.transitions_inserted.load(Ordering::Relaxed)
    }

    pub fn train_steps(&self) -> usize {
        self.train_steps.load(Ordering::Relaxed)
    }

    pub fn episodes(&self) -> usize {
        self.episodes.load(Ordering::Relaxed)
    }

    pub fn actor_restarts(&self) -> usize {
        self.actor_restarts.load(Ordering::Relaxed)
    }

    pub fn policy_version(&self) -> u64 {
        self.policy_version.load(Ordering::Relaxed)
    }

    pub fn eval_success_rate(&self) -> f32 {
        f32::from_bits(self.eval_success_rate.load(Ordering::Relaxed))
    }

    /// Average episode reward.
    pub fn avg_reward(&self) -> f32 {
        let episodes = self.episodes();
        if episodes == 0 {
            return 0.0;
        }
        let sum = self.reward_sum_fixed.load(Ordering::Relaxed) as f64 / REWARD_SCALE;
        (sum / episodes as f64) as f32
    }
}

impl Default for TrainingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared training metrics.
pub type SharedTrainingMetrics = Arc<TrainingMetrics>;

/// Create new shared training metrics.
pub fn training_metrics() -> SharedTrainingMetrics {
    Arc::new(TrainingMetrics::new())
}

//! Evaluation results.
//!
//! `EvalResult::from_episodes()` filters non-finite rewards so evaluation
//! statistics stay meaningful.

/// Aggregated statistics from greedy evaluation episodes.
#[derive(Debug, Clone, Default)]
pub struct EvalResult {
    /// Learner step when evaluation ran.
    pub step: usize,

    /// Average reward (finite values only).
    pub avg_reward: f32,

    /// Standard deviation of rewards (finite values only).
    pub std_reward: f32,

    pub min_reward: f32,
    pub max_reward: f32,

    /// Episodes evaluated, including filtered ones.
    pub n_episodes: usize,

    /// Episodes with non-finite rewards that were filtered.
    pub n_filtered_episodes: usize,

    pub avg_length: f32,

    /// Fraction of episodes that ended in a successful decode.
    pub success_rate: f32,
}

impl EvalResult {
    /// Aggregate per-episode rewards, lengths and success flags.
    ///
    /// The three slices are truncated to the shortest one.
    pub fn from_episodes(step: usize, rewards: &[f32], lengths: &[usize], successes: &[bool]) -> Self {
        let n = rewards.len().min(lengths.len()).min(successes.len());
        if n == 0 {
            return Self {
                step,
                ..Default::default()
            };
        }
        let rewards = &rewards[..n];

        let mut mean = 0.0f32;
        let mut m2 = 0.0f32;
        let mut min_r = f32::MAX;
        let mut max_r = f32::MIN;
        let mut n_valid = 0usize;

        for &r in rewards.iter().filter(|r| r.is_finite()) {
            n_valid += 1;
            let delta = r - mean;
            mean += delta / n_valid as f32;
            m2 += delta * (r - mean);
            min_r = min_r.min(r);
            max_r = max_r.max(r);
        }

        let (avg_reward, std_reward, min_reward, max_reward) = if n_valid == 0 {
            (0.0, 0.0, 0.0, 0.0)
        } else {
            let variance = if n_valid > 1 { m2 / n_valid as f32 } else { 0.0 };
            (mean, variance.sqrt(), min_r, max_r)
        };

        let total_length: usize = lengths[..n].iter().sum();
        let solved = successes[..n].iter().filter(|&&s| s).count();

        Self {
            step,
            avg_reward,
            std_reward,
            min_reward,
            max_reward,
            n_episodes: n,
            n_filtered_episodes: n - n_valid,
            avg_length: total_length as f32 / n as f32,
            success_rate: solved as f32 / n as f32,
        }
    }
}

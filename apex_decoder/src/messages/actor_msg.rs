//! Statistics reported by actor threads.
//!
//! # Data Integrity
//!
//! Episode rewards that are non-finite are counted but kept out of the
//! running average, so one corrupted episode cannot poison aggregated
//! metrics.

/// Lifecycle phase of an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActorState {
    /// Environment allocated, no snapshot requested yet
    #[default]
    Init,
    /// Waiting for (or swapping in) a policy snapshot
    SyncingPolicy,
    /// Stepping the environment
    Interacting,
    Terminated,
}

/// Statistics reported by an actor.
#[derive(Debug, Clone, Default)]
pub struct ActorStats {
    pub actor_id: usize,

    /// Restart generation this actor runs under
    pub generation: u64,

    pub state: ActorState,

    /// Total environment steps taken.
    pub steps: u64,

    /// Total episodes completed, including truncated and aborted ones.
    pub episodes: usize,

    /// Episodes with finite rewards, used in the average.
    pub valid_episodes: usize,

    /// Episodes with non-finite rewards that were filtered.
    pub filtered_episodes: usize,

    /// Average episode reward over valid episodes.
    pub avg_episode_reward: f32,

    /// Most recent episode reward (may be non-finite for diagnostics).
    pub recent_episode_reward: f32,

    /// Current exploration rate.
    pub epsilon: f32,

    /// Noise levels set at the latest episode start (0 without a curriculum)
    pub p_error: f32,
    pub p_msmt: f32,

    /// Policy snapshot version currently in use (0 = none yet).
    pub policy_version: u64,

    /// Episodes aborted by an environment error
    pub env_errors: usize,

    /// Failed inferences or snapshot loads
    pub policy_errors: usize,

    pub snapshot_swaps: usize,

    /// Transitions handed to the router
    pub transitions_sent: u64,
}

impl ActorStats {
    pub fn new(actor_id: usize, generation: u64) -> Self {
        Self {
            actor_id,
            generation,
            ..Default::default()
        }
    }

    /// Update stats after episode completion.
    ///
    /// Uses Welford's incremental mean: `avg += (x - avg) / n`.
    pub fn record_episode(&mut self, reward: f32) {
        self.episodes += 1;
        self.recent_episode_reward = reward;

        if !reward.is_finite() {
            self.filtered_episodes += 1;
            return;
        }

        self.valid_episodes += 1;
        let delta = reward - self.avg_episode_reward;
        self.avg_episode_reward += delta / self.valid_episodes as f32;
    }

    pub fn add_steps(&mut self, n: u64) {
        self.steps = self.steps.saturating_add(n);
    }

    /// Fraction of episodes filtered for non-finite rewards.
    pub fn filtered_fraction(&self) -> f32 {
        if self.episodes == 0 {
            0.0
        } else {
            self.filtered_episodes as f32 / self.episodes as f32
        }
    }
}

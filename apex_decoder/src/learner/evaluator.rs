//! Greedy evaluation on a held-out environment.
//!
//! Evaluation never explores and never trains: every action is the argmax
//! of the learner's online network, and nothing is written to replay.

use crate::environment::Environment;
use crate::messages::EvalResult;
use crate::policy::{argmax, TrainablePolicy};

/// Runs evaluation episodes on a dedicated environment instance.
pub struct Evaluator<E> {
    env: E,
    episodes: usize,
    max_episode_steps: usize,
}

impl<E: Environment> Evaluator<E> {
    pub fn new(env: E, episodes: usize, max_episode_steps: usize) -> Self {
        Self {
            env,
            episodes,
            max_episode_steps: max_episode_steps.max(1),
        }
    }

    pub fn episodes(&self) -> usize {
        self.episodes
    }

    /// Play `episodes` greedy episodes with `policy`.
    ///
    /// An episode aborted by an environment or policy error counts as
    /// unsuccessful and its reward is reported as NaN, which keeps it out
    /// of the reward average but visible in `n_filtered_episodes`.
    pub fn run<P: TrainablePolicy + ?Sized>(&mut self, policy: &P, step: usize) -> EvalResult {
        let mut rewards = Vec::with_capacity(self.episodes);
        let mut lengths = Vec::with_capacity(self.episodes);
        let mut successes = Vec::with_capacity(self.episodes);

        for episode in 0..self.episodes {
            match self.play(policy) {
                Ok((reward, length, success)) => {
                    rewards.push(reward);
                    lengths.push(length);
                    successes.push(success);
                }
                Err(reason) => {
                    log::warn!("evaluation episode {} at step {} aborted: {}", episode, step, reason);
                    rewards.push(f32::NAN);
                    lengths.push(0);
                    successes.push(false);
                }
            }
        }

        EvalResult::from_episodes(step, &rewards, &lengths, &successes)
    }

    fn play<P: TrainablePolicy + ?Sized>(&mut self, policy: &P) -> Result<(f32, usize, bool), String> {
        let mut state = self.env.reset().map_err(|e| e.to_string())?;
        let mut total = 0.0f32;

        for length in 1..=self.max_episode_steps {
            let values = policy.action_values(&state).map_err(|e| e.to_string())?;
            let action = argmax(&values).ok_or("policy returned no finite action values")?;
            let step = self.env.step(action as u32).map_err(|e| e.to_string())?;
            total += step.reward;
            if step.terminal {
                return Ok((total, length, step.info.success));
            }
            state = step.next_state;
        }

        Ok((total, self.max_episode_steps, false))
    }
}

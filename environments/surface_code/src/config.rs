//! Surface code environment configuration.

use crate::error::SurfaceCodeError;
use serde::{Deserialize, Serialize};

/// Environment parameters with builder pattern.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurfaceCodeConfig {
    /// Code distance `d` (qubit grid is `d x d`)
    pub distance: usize,
    /// Number of stacked syndrome measurements per observation
    pub stack_depth: usize,
    /// Per-qubit, per-slice depolarizing error probability
    pub p_error: f32,
    /// Per-stabilizer measurement flip probability (all slices but the last)
    pub p_msmt: f32,
    /// Reward for clearing the final syndrome
    pub solved_reward: f32,
    /// Reward for declaring done while defects remain
    pub premature_done_reward: f32,
    /// Reward added to every correction step
    pub step_reward: f32,
}

impl Default for SurfaceCodeConfig {
    fn default() -> Self {
        Self {
            distance: 5,
            stack_depth: 4,
            p_error: 0.01,
            p_msmt: 0.0,
            solved_reward: 100.0,
            premature_done_reward: -100.0,
            step_reward: -1.0,
        }
    }
}

impl SurfaceCodeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_distance(mut self, distance: usize) -> Self {
        self.distance = distance;
        self
    }

    pub fn with_stack_depth(mut self, stack_depth: usize) -> Self {
        self.stack_depth = stack_depth;
        self
    }

    pub fn with_p_error(mut self, p_error: f32) -> Self {
        self.p_error = p_error;
        self
    }

    pub fn with_p_msmt(mut self, p_msmt: f32) -> Self {
        self.p_msmt = p_msmt;
        self
    }

    pub fn with_rewards(mut self, solved: f32, premature_done: f32, step: f32) -> Self {
        self.solved_reward = solved;
        self.premature_done_reward = premature_done;
        self.step_reward = step;
        self
    }

    /// Side length of the stabilizer grid.
    pub fn syndrome_size(&self) -> usize {
        self.distance + 1
    }

    /// Values per syndrome slice.
    pub fn frame_len(&self) -> usize {
        self.syndrome_size() * self.syndrome_size()
    }

    /// `3 * d^2` Pauli corrections plus one "done" action.
    pub fn num_actions(&self) -> usize {
        3 * self.distance * self.distance + 1
    }

    pub fn validate(&self) -> Result<(), SurfaceCodeError> {
        if self.distance < 2 {
            return Err(SurfaceCodeError::InvalidConfig(format!(
                "distance must be >= 2, got {}",
                self.distance
            )));
        }
        if self.stack_depth == 0 {
            return Err(SurfaceCodeError::InvalidConfig("stack_depth must be > 0".into()));
        }
        for (name, p) in [("p_error", self.p_error), ("p_msmt", self.p_msmt)] {
            if !(0.0..=1.0).contains(&p) {
                return Err(SurfaceCodeError::InvalidConfig(format!(
                    "{} must be in [0, 1], got {}",
                    name, p
                )));
            }
        }
        if ![self.solved_reward, self.premature_done_reward, self.step_reward]
            .iter()
            .all(|r| r.is_finite())
        {
            return Err(SurfaceCodeError::InvalidConfig("rewards must be finite".into()));
        }
        Ok(())
    }
}

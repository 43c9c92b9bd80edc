//! Environment abstraction for actors and evaluation.
//!
//! Actors own one environment each and drive it through the
//! [`Environment`] capability trait. [`SurfaceCodeEnvironment`] adapts the
//! `surface_code_env` crate to it.

use crate::core::transition::{Action, StateHistory};
use crate::error::EnvError;
use surface_code_env::{SurfaceCode, SurfaceCodeConfig, SurfaceCodeError};

/// Extra per-step information. Actors ignore it; the evaluator reads `success`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepInfo {
    /// Episode ended in a successful decode
    pub success: bool,
}

/// Result of a single environment step.
#[derive(Debug, Clone)]
pub struct EnvStep {
    pub next_state: StateHistory,
    pub reward: f32,
    /// Episode ended on an environment signal (not a step limit)
    pub terminal: bool,
    pub info: StepInfo,
}

/// Single-instance environment driven by one actor.
pub trait Environment: Send {
    /// Start a new episode and return its first observation.
    fn reset(&mut self) -> Result<StateHistory, EnvError>;

    /// Apply `action` to the current episode.
    fn step(&mut self, action: Action) -> Result<EnvStep, EnvError>;

    /// Size of the discrete action space.
    fn n_actions(&self) -> usize;

    /// Set the physical and measurement error rates for following episodes.
    ///
    /// Environments without a noise model ignore it.
    fn set_noise(&mut self, _p_error: f32, _p_msmt: f32) -> Result<(), EnvError> {
        Ok(())
    }
}

impl<E: Environment + ?Sized> Environment for Box<E> {
    fn reset(&mut self) -> Result<StateHistory, EnvError> {
        (**self).reset()
    }

    fn step(&mut self, action: Action) -> Result<EnvStep, EnvError> {
        (**self).step(action)
    }

    fn n_actions(&self) -> usize {
        (**self).n_actions()
    }

    fn set_noise(&mut self, p_error: f32, p_msmt: f32) -> Result<(), EnvError> {
        (**self).set_noise(p_error, p_msmt)
    }
}

// ============================================================================
// Surface Code Adapter
// ============================================================================

/// Adapter exposing [`SurfaceCode`] as an [`Environment`].
pub struct SurfaceCodeEnvironment {
    env: SurfaceCode,
    stack_depth: usize,
    frame_len: usize,
}

impl SurfaceCodeEnvironment {
    pub fn new(config: SurfaceCodeConfig, seed: u64) -> Result<Self, EnvError> {
        let env = SurfaceCode::new(config, seed).map_err(|e| EnvError::Reset(e.to_string()))?;
        let stack_depth = env.stack_depth();
        let frame_len = env.frame_len();
        Ok(Self {
            env,
            stack_depth,
            frame_len,
        })
    }

    pub fn stack_depth(&self) -> usize {
        self.stack_depth
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Get a reference to the underlying environment.
    pub fn inner(&self) -> &SurfaceCode {
        &self.env
    }

    fn history(&self, state: &[u8]) -> Result<StateHistory, EnvError> {
        let data = state.iter().map(|&b| b as f32).collect();
        StateHistory::new(data, self.stack_depth, self.frame_len)
    }
}

impl Environment for SurfaceCodeEnvironment {
    fn reset(&mut self) -> Result<StateHistory, EnvError> {
        let state = self.env.reset().to_vec();
        self.history(&state)
    }

    fn step(&mut self, action: Action) -> Result<EnvStep, EnvError> {
        let outcome = self.env.step(action as usize).map_err(|e| match e {
            SurfaceCodeError::InvalidAction { action, num_actions } => EnvError::InvalidAction {
                action: action as u32,
                n_actions: num_actions,
            },
            other => EnvError::Step(other.to_string()),
        })?;
        let next_state = self.history(self.env.state())?;
        Ok(EnvStep {
            next_state,
            reward: outcome.reward,
            terminal: outcome.terminal,
            info: StepInfo {
                success: outcome.solved,
            },
        })
    }

    fn n_actions(&self) -> usize {
        self.env.num_actions()
    }

    fn set_noise(&mut self, p_error: f32, p_msmt: f32) -> Result<(), EnvError> {
        self.env
            .set_noise(p_error, p_msmt)
            .map_err(|e| EnvError::Reset(e.to_string()))
    }
}

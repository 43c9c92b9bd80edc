//! Surface code episode simulation.

use crate::code::{decode_action, syndrome, Pauli, QubitAction};
use crate::config::SurfaceCodeConfig;
use crate::error::SurfaceCodeError;

/// Result of a single `step`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepOutcome {
    pub reward: f32,
    /// Episode ended (solved or "done" declared)
    pub terminal: bool,
    /// Final syndrome is clear
    pub solved: bool,
}

/// Syndrome decoding environment.
///
/// Observation layout is `[stack_depth][d+1][d+1]` flattened, oldest slice
/// first, values in `{0, 1}`.
pub struct SurfaceCode {
    config: SurfaceCodeConfig,
    /// Accumulated error per slice: `[stack_depth][d*d]`
    errors: Vec<Pauli>,
    /// Measurement flips XORed onto every slice but the last
    msmt_flips: Vec<u8>,
    /// Current observation
    state: Vec<u8>,
    finished: bool,
    rng: fastrand::Rng,
}

impl SurfaceCode {
    pub fn new(config: SurfaceCodeConfig, seed: u64) -> Result<Self, SurfaceCodeError> {
        config.validate()?;
        let qubits = config.distance * config.distance;
        let frames = config.stack_depth * config.frame_len();
        Ok(Self {
            errors: vec![Pauli::I; config.stack_depth * qubits],
            msmt_flips: vec![0; frames],
            state: vec![0; frames],
            finished: true,
            rng: fastrand::Rng::with_seed(seed),
            config,
        })
    }

    /// Sample a fresh error history with a non-trivial final syndrome.
    pub fn reset(&mut self) -> &[u8] {
        let d = self.config.distance;
        let qubits = d * d;
        let depth = self.config.stack_depth;
        let frame_len = self.config.frame_len();

        for t in 0..depth {
            for q in 0..qubits {
                let previous = if t == 0 { Pauli::I } else { self.errors[(t - 1) * qubits + q] };
                let fresh = if self.rng.f32() < self.config.p_error {
                    Pauli::random_error(&mut self.rng)
                } else {
                    Pauli::I
                };
                self.errors[t * qubits + q] = previous.compose(fresh);
            }
        }

        for (k, flip) in self.msmt_flips.iter_mut().enumerate() {
            let last_slice = k / frame_len == depth - 1;
            *flip = (!last_slice && self.rng.f32() < self.config.p_msmt) as u8;
        }

        self.refresh_state();

        if self.final_defects() == 0 {
            // Guarantee there is something to decode
            let q = self.rng.usize(0..qubits);
            let error = Pauli::random_error(&mut self.rng);
            for t in 0..depth {
                let slot = &mut self.errors[t * qubits + q];
                *slot = slot.compose(error);
            }
            self.refresh_state();
        }

        self.finished = false;
        &self.state
    }

    /// Apply one action.
    pub fn step(&mut self, action: usize) -> Result<StepOutcome, SurfaceCodeError> {
        if self.finished {
            return Err(SurfaceCodeError::EpisodeFinished);
        }
        let num_actions = self.config.num_actions();
        let decoded = decode_action(action, self.config.distance)
            .ok_or(SurfaceCodeError::InvalidAction { action, num_actions })?;

        let outcome = match decoded {
            QubitAction::Done => {
                let solved = self.final_defects() == 0;
                let reward = if solved {
                    self.config.solved_reward
                } else {
                    self.config.premature_done_reward
                };
                StepOutcome { reward, terminal: true, solved }
            }
            QubitAction::Correct { row, col, pauli } => {
                let before = self.final_defects();
                self.apply_correction(row, col, pauli);
                let after = self.final_defects();

                let mut reward = before as f32 - after as f32 + self.config.step_reward;
                let solved = after == 0;
                if solved {
                    reward += self.config.solved_reward;
                }
                StepOutcome { reward, terminal: solved, solved }
            }
        };

        self.finished = outcome.terminal;
        Ok(outcome)
    }

    fn apply_correction(&mut self, row: usize, col: usize, pauli: Pauli) {
        let d = self.config.distance;
        let qubits = d * d;
        let q = row * d + col;
        for t in 0..self.config.stack_depth {
            let slot = &mut self.errors[t * qubits + q];
            *slot = slot.compose(pauli);
        }
        self.refresh_state();
    }

    fn refresh_state(&mut self) {
        let d = self.config.distance;
        let qubits = d * d;
        let frame_len = self.config.frame_len();
        for t in 0..self.config.stack_depth {
            let frame = &mut self.state[t * frame_len..(t + 1) * frame_len];
            syndrome(&self.errors[t * qubits..(t + 1) * qubits], d, frame);
            for (bit, flip) in frame
                .iter_mut()
                .zip(&self.msmt_flips[t * frame_len..(t + 1) * frame_len])
            {
                *bit ^= flip;
            }
        }
    }

    /// Lit stabilizers in the last (noise-free) slice.
    pub fn final_defects(&self) -> usize {
        let frame_len = self.config.frame_len();
        let start = (self.config.stack_depth - 1) * frame_len;
        self.state[start..].iter().filter(|&&b| b != 0).count()
    }

    pub fn state(&self) -> &[u8] {
        &self.state
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn num_actions(&self) -> usize {
        self.config.num_actions()
    }

    pub fn stack_depth(&self) -> usize {
        self.config.stack_depth
    }

    pub fn frame_len(&self) -> usize {
        self.config.frame_len()
    }

    pub fn config(&self) -> &SurfaceCodeConfig {
        &self.config
    }

    /// Change the noise levels used by the next `reset`.
    pub fn set_noise(&mut self, p_error: f32, p_msmt: f32) -> Result<(), SurfaceCodeError> {
        let updated = SurfaceCodeConfig {
            p_error,
            p_msmt,
            ..self.config.clone()
        };
        updated.validate()?;
        self.config = updated;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::encode_action;

    fn small_env(seed: u64) -> SurfaceCode {
        let config = SurfaceCodeConfig::new()
            .with_distance(3)
            .with_stack_depth(2)
            .with_p_error(0.1);
        SurfaceCode::new(config, seed).unwrap()
    }

    #[test]
    fn test_reset_shape_and_nontrivial_syndrome() {
        let mut env = small_env(7);
        for _ in 0..50 {
            let state = env.reset().to_vec();
            assert_eq!(state.len(), 2 * 16);
            assert!(state.iter().all(|&b| b <= 1));
            assert!(env.final_defects() > 0);
            assert!(!env.is_finished());
        }
    }

    #[test]
    fn test_step_before_reset_fails() {
        let mut env = small_env(0);
        assert_eq!(env.step(0), Err(SurfaceCodeError::EpisodeFinished));
    }

    #[test]
    fn test_invalid_action() {
        let mut env = small_env(0);
        env.reset();
        assert_eq!(
            env.step(99),
            Err(SurfaceCodeError::InvalidAction { action: 99, num_actions: 28 })
        );
    }

    #[test]
    fn test_premature_done_is_penalized() {
        let mut env = small_env(3);
        env.reset();
        let done = encode_action(QubitAction::Done, 3).unwrap();
        let outcome = env.step(done).unwrap();
        assert!(outcome.terminal);
        assert!(!outcome.solved);
        assert_eq!(outcome.reward, -100.0);
        assert!(env.is_finished());
    }

    #[test]
    fn test_undoing_error_solves_episode() {
        let config = SurfaceCodeConfig::new()
            .with_distance(3)
            .with_stack_depth(2)
            .with_p_error(0.0);
        let mut env = SurfaceCode::new(config, 11).unwrap();
        env.reset();

        // With p_error = 0 exactly one forced error exists; find and undo it
        let d = 3;
        let (q, pauli) = env.errors[d * d..]
            .iter()
            .enumerate()
            .find(|(_, p)| **p != Pauli::I)
            .map(|(q, p)| (q, *p))
            .unwrap();
        let action = encode_action(QubitAction::Correct { row: q / d, col: q % d, pauli }, d).unwrap();
        let before = env.final_defects() as f32;

        let outcome = env.step(action).unwrap();
        assert!(outcome.solved);
        assert!(outcome.terminal);
        assert_eq!(outcome.reward, before - 1.0 + 100.0);
        assert!(env.state().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_same_seed_same_episode() {
        let mut a = small_env(5);
        let mut b = small_env(5);
        assert_eq!(a.reset().to_vec(), b.reset().to_vec());
    }

    #[test]
    fn test_set_noise_applies_to_next_reset() {
        let mut env = small_env(3);
        assert!(env.set_noise(1.5, 0.0).is_err());
        assert_eq!(env.config().p_error, 0.1);

        env.set_noise(0.0, 0.0).unwrap();
        assert_eq!(env.config().p_error, 0.0);
        assert_eq!(env.config().p_msmt, 0.0);
        env.reset();
        assert!(env.final_defects() > 0);
    }
}

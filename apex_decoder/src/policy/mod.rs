//! Policy capability interfaces.
//!
//! The pipeline treats the network as an opaque differentiable function:
//!
//! - [`PolicyReplica`]: read-only actor copy, loaded from a snapshot
//! - [`TrainablePolicy`]: the learner's authoritative copy plus its frozen
//!   target network
//!
//! Both sides agree on a `Params` type, which is what travels inside a
//! [`PolicySnapshot`](crate::core::model_version::PolicySnapshot).

pub mod q_network;

pub use q_network::{
    clipped_adam, BurnLearnerPolicy, BurnReplica, QNetwork, QNetworkConfig, SnapshotBytes,
    DEFAULT_GRAD_CLIP, TD_TARGET_CLAMP,
};

use crate::core::transition::{Action, SharedTransition, StateHistory};
use crate::error::PolicyError;

/// Read-only policy copy held by an actor.
pub trait PolicyReplica: Send {
    type Params: Send + Sync + 'static;

    /// Replace the current parameters with `params`.
    ///
    /// Called by the owning actor between environment steps only, so an
    /// in-flight `action_values` never observes a partial load.
    fn load(&mut self, params: &Self::Params) -> Result<(), PolicyError>;

    /// Action values for one state history.
    fn action_values(&self, state: &StateHistory) -> Result<Vec<f32>, PolicyError>;
}

/// Learner-side policy with a periodically synced target network.
pub trait TrainablePolicy: Send {
    type Params: Send + Sync + 'static;

    /// One gradient step on an importance-weighted batch.
    fn train_step(&mut self, batch: &TrainingBatch) -> Result<TrainOutput, PolicyError>;

    /// Copy online parameters into the target network.
    fn sync_target(&mut self);

    /// Serialize the online parameters for broadcast.
    fn export(&self) -> Result<Self::Params, PolicyError>;

    /// Greedy action values from the online network (used by evaluation).
    fn action_values(&self, state: &StateHistory) -> Result<Vec<f32>, PolicyError>;
}

/// Output of [`TrainablePolicy::train_step`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrainOutput {
    /// Importance-weighted mean loss
    pub loss: f32,
    /// Per-sample TD error, batch order
    pub td_errors: Vec<f32>,
}

/// Flattened, tensor-ready training batch.
#[derive(Debug, Clone)]
pub struct TrainingBatch {
    /// `[batch, state_len]`
    pub states: Vec<f32>,
    pub actions: Vec<Action>,
    pub rewards: Vec<f32>,
    /// `[batch, state_len]`
    pub next_states: Vec<f32>,
    pub terminals: Vec<bool>,
    /// Importance-sampling weights, all `<= 1`
    pub weights: Vec<f32>,
    pub state_len: usize,
    pub gamma: f32,
}

impl TrainingBatch {
    /// Copy sampled transitions into contiguous buffers.
    ///
    /// Fails if the transitions disagree on state size or `weights` has the
    /// wrong length.
    pub fn from_transitions(
        transitions: &[SharedTransition],
        weights: &[f32],
        gamma: f32,
    ) -> Result<Self, PolicyError> {
        if weights.len() != transitions.len() {
            return Err(PolicyError::ShapeMismatch {
                expected: transitions.len(),
                actual: weights.len(),
            });
        }
        let state_len = transitions.first().map_or(0, |t| t.state_history.len());
        let n = transitions.len();

        let mut batch = Self {
            states: Vec::with_capacity(n * state_len),
            actions: Vec::with_capacity(n),
            rewards: Vec::with_capacity(n),
            next_states: Vec::with_capacity(n * state_len),
            terminals: Vec::with_capacity(n),
            weights: weights.to_vec(),
            state_len,
            gamma,
        };

        for t in transitions {
            for len in [t.state_history.len(), t.next_state_history.len()] {
                if len != state_len {
                    return Err(PolicyError::ShapeMismatch {
                        expected: state_len,
                        actual: len,
                    });
                }
            }
            batch.states.extend_from_slice(t.state_history.as_slice());
            batch.next_states.extend_from_slice(t.next_state_history.as_slice());
            batch.actions.push(t.action);
            batch.rewards.push(t.reward);
            batch.terminals.push(t.terminal);
        }

        Ok(batch)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// True if every reward, weight and state value is finite.
    pub fn is_finite(&self) -> bool {
        self.rewards.iter().all(|v| v.is_finite())
            && self.weights.iter().all(|v| v.is_finite())
            && self.states.iter().all(|v| v.is_finite())
            && self.next_states.iter().all(|v| v.is_finite())
    }
}

/// Index of the largest value. Ties go to the lowest index; NaN never wins.
pub fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transition::Transition;

    fn transition(values: &[f32], reward: f32) -> SharedTransition {
        let h = StateHistory::new(values.to_vec(), 1, values.len()).unwrap();
        Transition::new(h.clone(), 1, reward, h, false, 1.0, 0, 0).into_shared()
    }

    #[test]
    fn test_batch_flattens_in_order() {
        let ts = vec![transition(&[1.0, 2.0], 0.5), transition(&[3.0, 4.0], -1.0)];
        let batch = TrainingBatch::from_transitions(&ts, &[1.0, 0.5], 0.9).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.state_len, 2);
        assert_eq!(batch.states, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(batch.rewards, vec![0.5, -1.0]);
        assert!(batch.is_finite());
    }

    #[test]
    fn test_batch_rejects_mixed_sizes() {
        let ts = vec![transition(&[1.0, 2.0], 0.0), transition(&[3.0], 0.0)];
        assert!(TrainingBatch::from_transitions(&ts, &[1.0, 1.0], 0.9).is_err());
        assert!(TrainingBatch::from_transitions(&ts[..1], &[1.0, 1.0], 0.9).is_err());
    }

    #[test]
    fn test_batch_detects_nan_reward() {
        let ts = vec![transition(&[1.0], f32::NAN)];
        let batch = TrainingBatch::from_transitions(&ts, &[1.0], 0.9).unwrap();
        assert!(!batch.is_finite());
    }

    #[test]
    fn test_argmax() {
        assert_eq!(argmax(&[0.1, 0.7, 0.7, -1.0]), Some(1));
        assert_eq!(argmax(&[f32::NAN, 0.0]), Some(1));
        assert_eq!(argmax(&[]), None);
    }
}

//! Transition types produced by actors and stored in the replay buffer.
//!
//! - `StateHistory`: a stack of `stack_depth` syndrome snapshots, oldest first
//! - `Transition`: one immutable interaction record
//! - `SharedTransition`: the `Arc` handle that moves through router and replay
//!
//! Transitions are never mutated after creation. The replay buffer and any
//! sampled batches share the same allocation through `Arc`.

use crate::error::EnvError;
use std::sync::Arc;

/// Discrete action index into the policy's action-value vector.
pub type Action = u32;

/// Ordered stack of syndrome measurement snapshots.
///
/// Stored as one contiguous buffer of `stack_depth * frame_len` values so it
/// can be copied straight into a batch tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct StateHistory {
    data: Vec<f32>,
    stack_depth: usize,
    frame_len: usize,
}

impl StateHistory {
    /// Build a history from flattened frames.
    ///
    /// Fails if `data.len() != stack_depth * frame_len` or either dimension is zero.
    pub fn new(data: Vec<f32>, stack_depth: usize, frame_len: usize) -> Result<Self, EnvError> {
        let expected = stack_depth * frame_len;
        if expected == 0 || data.len() != expected {
            return Err(EnvError::ObservationShape {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            stack_depth,
            frame_len,
        })
    }

    /// All-zero history, used as a placeholder before the first reset.
    pub fn zeros(stack_depth: usize, frame_len: usize) -> Self {
        Self {
            data: vec![0.0; stack_depth * frame_len],
            stack_depth,
            frame_len,
        }
    }

    /// Number of stacked snapshots.
    pub fn stack_depth(&self) -> usize {
        self.stack_depth
    }

    /// Values per snapshot.
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Total number of values.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Flattened view, oldest frame first.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Snapshot at `index` (0 = oldest).
    pub fn frame(&self, index: usize) -> Option<&[f32]> {
        if index >= self.stack_depth {
            return None;
        }
        let start = index * self.frame_len;
        Some(&self.data[start..start + self.frame_len])
    }

    /// Iterate snapshots, oldest first.
    pub fn frames(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.frame_len)
    }

    /// Most recent snapshot.
    pub fn latest(&self) -> &[f32] {
        &self.data[(self.stack_depth - 1) * self.frame_len..]
    }

    /// True if every value is finite.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

/// One interaction record emitted by an actor.
#[derive(Debug, Clone)]
pub struct Transition {
    /// Observation the action was chosen from
    pub state_history: StateHistory,
    /// Action taken
    pub action: Action,
    /// Reward received
    pub reward: f32,
    /// Observation after the action
    pub next_state_history: StateHistory,
    /// Episode ended on an environment terminal signal
    pub terminal: bool,
    /// Priority suggested by the actor at emission time
    pub initial_priority: f32,
    /// Emitting actor
    pub actor_id: usize,
    /// Actor-local step counter, strictly increasing per actor
    pub actor_step: u64,
    /// Policy snapshot version that selected the action (0 = before first sync)
    pub policy_version: u64,
}

impl Transition {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state_history: StateHistory,
        action: Action,
        reward: f32,
        next_state_history: StateHistory,
        terminal: bool,
        initial_priority: f32,
        actor_id: usize,
        actor_step: u64,
    ) -> Self {
        Self {
            state_history,
            action,
            reward,
            next_state_history,
            terminal,
            initial_priority,
            actor_id,
            actor_step,
            policy_version: 0,
        }
    }

    /// Tag with the snapshot version that chose the action.
    pub fn with_policy_version(mut self, version: u64) -> Self {
        self.policy_version = version;
        self
    }

    /// True if reward and both histories are finite.
    pub fn is_finite(&self) -> bool {
        self.reward.is_finite()
            && self.state_history.is_finite()
            && self.next_state_history.is_finite()
    }

    /// Wrap for sharing between router, replay buffer and batches.
    pub fn into_shared(self) -> SharedTransition {
        Arc::new(self)
    }
}

/// Immutable, read-shared transition handle.
pub type SharedTransition = Arc<Transition>;

#[cfg(test)]
mod tests {
    use super::*;

    fn history(values: &[f32], depth: usize) -> StateHistory {
        StateHistory::new(values.to_vec(), depth, values.len() / depth).unwrap()
    }

    #[test]
    fn test_state_history_rejects_bad_shape() {
        let err = StateHistory::new(vec![0.0; 5], 2, 3).unwrap_err();
        assert_eq!(err, EnvError::ObservationShape { expected: 6, actual: 5 });
        assert!(StateHistory::new(vec![], 0, 3).is_err());
    }

    #[test]
    fn test_state_history_frames_oldest_first() {
        let h = history(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3);
        assert_eq!(h.stack_depth(), 3);
        assert_eq!(h.frame_len(), 2);
        assert_eq!(h.frame(0), Some(&[1.0, 2.0][..]));
        assert_eq!(h.latest(), &[5.0, 6.0]);
        assert_eq!(h.frame(3), None);
        assert_eq!(h.frames().count(), 3);
    }

    #[test]
    fn test_transition_finite_check() {
        let ok = Transition::new(history(&[0.0, 1.0], 1), 0, 1.0, history(&[1.0, 0.0], 1), false, 1.0, 0, 0);
        assert!(ok.is_finite());

        let mut bad = ok.clone();
        bad.reward = f32::NAN;
        assert!(!bad.is_finite());

        let bad_state = Transition::new(history(&[f32::INFINITY, 1.0], 1), 0, 1.0, history(&[1.0, 0.0], 1), false, 1.0, 0, 0);
        assert!(!bad_state.is_finite());
    }

    #[test]
    fn test_policy_version_tag() {
        let t = Transition::new(history(&[0.0], 1), 2, 0.0, history(&[0.0], 1), true, 1.0, 3, 7)
            .with_policy_version(5);
        assert_eq!(t.policy_version, 5);
        assert_eq!(t.actor_id, 3);
        assert_eq!(t.actor_step, 7);
    }
}

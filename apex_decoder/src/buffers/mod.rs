//! Replay storage for off-policy learning.
//!
//! - `SumTree`: O(log n) priority index
//! - `PrioritizedReplayBuffer`: FIFO-evicting store with proportional sampling

pub mod prioritized_replay;
pub mod sum_tree;

pub use prioritized_replay::{
    prioritized_replay, EntryId, InsertOutcome, PrioritizedReplayBuffer, ReplayConfig,
    ReplayStats, SampledBatch, SharedReplayBuffer,
};
pub use sum_tree::SumTree;

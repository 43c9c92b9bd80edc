//! Core data types shared across the pipeline.

pub mod model_version;
pub mod shutdown;
pub mod snapshot_slot;
pub mod transition;

pub use model_version::{version_counter, PolicySnapshot, SharedVersionCounter, VersionCounter};
pub use shutdown::{join_until, JoinOutcome};
pub use snapshot_slot::{snapshot_slot, SharedSnapshotSlot, SnapshotSlot};
pub use transition::{Action, SharedTransition, StateHistory, Transition};

//! Actor system.
//!
//! - `Actor`: spawns one experience-collecting thread per environment
//! - `ActorHandle`: stop flag and join handle the orchestrator supervises
//!
//! Actors never share a replica. Each swaps in broadcast snapshots between
//! its own environment steps.

pub mod actor;

pub use actor::{Actor, ActorConfig, ActorHandle, Curriculum, InitialPriority};

pub use crate::messages::{ActorState, ActorStats};

//! Routing layer between actors, replay buffer and learner.
//!
//! - [`IoRouter`]: bounded ingress, batching into replay, actor liveness
//! - [`Egress`]: best-effort policy snapshot broadcast
//! - [`ActorLink`]: the actor's end of both directions

pub mod egress;
pub mod router;

pub use egress::Egress;
pub use router::{
    ActorLink, ActorQueueStats, Heartbeat, IoRouter, OverflowPolicy, RouterConfig, RouterStats,
};

#[cfg(test)]
mod tests;

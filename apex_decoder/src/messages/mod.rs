//! Messages exchanged between workers and the orchestrator.
//!
//! ```text
//!    +----------+   +----------+   +-----------+
//!    | Actor i  |   | Learner  |   | IO Router |
//!    +----+-----+   +----+-----+   +-----+-----+
//!         |              |               |
//!         +--------------+---------------+
//!                        | CoordinatorMsg
//!                        v
//!                +---------------+
//!                |  Orchestrator |
//!                +---------------+
//! ```

mod actor_msg;
mod coordinator_msg;
mod eval_result;
mod learner_msg;

#[cfg(test)]
mod tests;

pub use actor_msg::{ActorState, ActorStats};
pub use coordinator_msg::{CoordinatorMsg, FinishReason};
pub use eval_result::EvalResult;
pub use learner_msg::LearnerStats;

//! Messages sent to the Orchestrator.

use super::{ActorStats, EvalResult, LearnerStats};
use crate::error::FatalError;
use std::time::Duration;

/// Messages sent to the orchestrator from workers and the router.
#[derive(Debug, Clone)]
pub enum CoordinatorMsg {
    /// Actor reports statistics.
    ActorStats(ActorStats),

    /// Learner reports statistics.
    LearnerStats(LearnerStats),

    /// Evaluation result.
    EvalResult(EvalResult),

    /// Router saw no heartbeat from this actor generation within the timeout.
    ActorUnresponsive {
        actor_id: usize,
        generation: u64,
        silent_for: Duration,
    },

    /// Actor thread finished (either stopped or panicked).
    ActorFinished {
        actor_id: usize,
        generation: u64,
        reason: FinishReason,
    },

    /// Learner thread finished.
    LearnerFinished { reason: FinishReason },

    /// Learner hit an unrecoverable condition.
    LearnerFatal(FatalError),
}

/// Reason why a thread finished.
#[derive(Debug, Clone, PartialEq)]
pub enum FinishReason {
    /// Normal shutdown after the stop signal.
    Stopped,

    /// Thread panicked.
    Panicked(String),

    /// Reached its configured budget.
    Completed,
}

impl FinishReason {
    /// Extract a readable message from a thread panic payload.
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        FinishReason::Panicked(msg)
    }
}

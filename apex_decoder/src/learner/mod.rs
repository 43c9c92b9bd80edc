//! Learner system.
//!
//! - `Learner`: spawns the training thread (sample, train, reprioritize, broadcast)
//! - `Evaluator`: greedy episodes on a held-out environment

pub mod evaluator;
pub mod learner;


pub use evaluator::Evaluator;
pub use learner::{Learner, LearnerConfig, LearnerContext, LearnerHandle};

pub use crate::messages::{EvalResult, LearnerStats};

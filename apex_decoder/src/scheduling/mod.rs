//! Annealing schedules.
//!
//! ```rust,ignore
//! use apex_decoder::scheduling::{LinearSchedule, Schedule};
//!
//! // Importance-sampling beta from 0.4 to 1.0 over 100k learner steps
//! let beta = LinearSchedule::new(0.4, 1.0, 100_000);
//! replay.set_beta(beta.value(step));
//! ```

pub mod anneal;


pub use anneal::{actor_epsilon, ConstantSchedule, ExponentialDecay, LinearSchedule, Schedule};

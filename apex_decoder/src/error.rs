//! Error types for the training pipeline.
//!
//! Component-local failures (`EnvError`, `PolicyError`, `ReplayError`) are
//! absorbed where they occur. Only `FatalError` ends a run; the orchestrator
//! wraps it in `RunError` together with configuration and spawn failures.

use std::fmt;
use std::io;

/// Configuration validation error.
///
/// Returned by every `validate()` when parameters are invalid or inconsistent.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A count parameter must be positive.
    InvalidCount { field: &'static str, value: usize },
    /// A parameter is outside its valid range.
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    /// Two parameters contradict each other.
    Inconsistent(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidCount { field, value } => {
                write!(f, "{} must be > 0, got {}", field, value)
            }
            ConfigError::OutOfRange { field, value, min, max } => {
                write!(f, "{} must be in [{}, {}], got {}", field, min, max, value)
            }
            ConfigError::Inconsistent(reason) => write!(f, "{}", reason),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Replay buffer errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayError {
    /// Fewer than `required` entries are live. The caller should wait and retry.
    EmptyBuffer { len: usize, required: usize },
    /// `sample` was asked for zero entries or more than can ever be live.
    InvalidBatchSize { requested: usize, capacity: usize },
    /// `update_priorities` got mismatched id and priority slices.
    LengthMismatch { ids: usize, priorities: usize },
}

impl fmt::Display for ReplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplayError::EmptyBuffer { len, required } => {
                write!(f, "replay buffer holds {} entries, {} required to sample", len, required)
            }
            ReplayError::InvalidBatchSize { requested, capacity } => {
                write!(f, "batch size {} invalid for capacity {}", requested, capacity)
            }
            ReplayError::LengthMismatch { ids, priorities } => {
                write!(f, "{} entry ids but {} priorities", ids, priorities)
            }
        }
    }
}

impl std::error::Error for ReplayError {}

/// Environment collaborator errors.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvError {
    /// `reset` failed.
    Reset(String),
    /// `step` failed.
    Step(String),
    /// Action index outside the action space.
    InvalidAction { action: u32, n_actions: usize },
    /// Observation had the wrong number of values.
    ObservationShape { expected: usize, actual: usize },
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvError::Reset(msg) => write!(f, "environment reset failed: {}", msg),
            EnvError::Step(msg) => write!(f, "environment step failed: {}", msg),
            EnvError::InvalidAction { action, n_actions } => {
                write!(f, "action {} out of range for {} actions", action, n_actions)
            }
            EnvError::ObservationShape { expected, actual } => {
                write!(f, "observation has {} values, expected {}", actual, expected)
            }
        }
    }
}

impl std::error::Error for EnvError {}

/// Policy collaborator errors.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyError {
    /// Snapshot parameters could not be loaded into a replica.
    Load(String),
    /// Forward pass failed.
    Inference(String),
    /// Gradient step failed.
    Training(String),
    /// Output size differs from the action space.
    ShapeMismatch { expected: usize, actual: usize },
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyError::Load(msg) => write!(f, "failed to load policy snapshot: {}", msg),
            PolicyError::Inference(msg) => write!(f, "policy inference failed: {}", msg),
            PolicyError::Training(msg) => write!(f, "policy train step failed: {}", msg),
            PolicyError::ShapeMismatch { expected, actual } => {
                write!(f, "policy produced {} values, expected {}", actual, expected)
            }
        }
    }
}

impl std::error::Error for PolicyError {}

/// Conditions that halt a run.
#[derive(Debug, Clone, PartialEq)]
pub enum FatalError {
    /// Loss stayed non-finite for `consecutive` learner steps.
    NumericDivergence { consecutive: usize, train_step: usize },
    /// The learner thread panicked or returned an unrecoverable error.
    LearnerCrash(String),
    /// Every actor exhausted its restart budget.
    AllActorsLost { num_actors: usize },
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalError::NumericDivergence { consecutive, train_step } => write!(
                f,
                "numeric divergence: {} consecutive non-finite losses at train step {}",
                consecutive, train_step
            ),
            FatalError::LearnerCrash(msg) => write!(f, "learner crashed: {}", msg),
            FatalError::AllActorsLost { num_actors } => {
                write!(f, "all {} actors exhausted their restart budget", num_actors)
            }
        }
    }
}

impl std::error::Error for FatalError {}

/// Single fatal summary returned by `Orchestrator::run`.
#[derive(Debug)]
pub enum RunError {
    Config(ConfigError),
    Fatal(FatalError),
    Spawn(io::Error),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Config(e) => write!(f, "invalid configuration: {}", e),
            RunError::Fatal(e) => write!(f, "run halted: {}", e),
            RunError::Spawn(e) => write!(f, "failed to spawn worker thread: {}", e),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::Config(e) => Some(e),
            RunError::Fatal(e) => Some(e),
            RunError::Spawn(e) => Some(e),
        }
    }
}

impl From<ConfigError> for RunError {
    fn from(e: ConfigError) -> Self {
        RunError::Config(e)
    }
}

impl From<FatalError> for RunError {
    fn from(e: FatalError) -> Self {
        RunError::Fatal(e)
    }
}

impl From<io::Error> for RunError {
    fn from(e: io::Error) -> Self {
        RunError::Spawn(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_summary_names_condition() {
        let err: RunError = FatalError::NumericDivergence { consecutive: 10, train_step: 42 }.into();
        let msg = err.to_string();
        assert!(msg.contains("numeric divergence"));
        assert!(msg.contains("42"));

        let err: RunError = FatalError::LearnerCrash("boom".into()).into();
        assert!(err.to_string().contains("learner crashed: boom"));
    }

    #[test]
    fn test_empty_buffer_display() {
        let e = ReplayError::EmptyBuffer { len: 3, required: 10 };
        assert_eq!(e.to_string(), "replay buffer holds 3 entries, 10 required to sample");
    }
}

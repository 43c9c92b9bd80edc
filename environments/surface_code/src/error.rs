//! Environment error types.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCodeError {
    /// Invalid configuration
    InvalidConfig(String),
    /// Action index outside `[0, 3 * d^2]`
    InvalidAction { action: usize, num_actions: usize },
    /// `step` called on a finished episode
    EpisodeFinished,
}

impl fmt::Display for SurfaceCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceCodeError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            SurfaceCodeError::InvalidAction { action, num_actions } => {
                write!(f, "Invalid action {} (num_actions = {})", action, num_actions)
            }
            SurfaceCodeError::EpisodeFinished => write!(f, "Episode finished, call reset()"),
        }
    }
}

impl std::error::Error for SurfaceCodeError {}

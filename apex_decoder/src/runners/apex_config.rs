//! Run-level configuration.
//!
//! [`ApexConfig`] bundles the per-component configs and checks the
//! constraints that span more than one of them.

use crate::actors::ActorConfig;
use crate::buffers::ReplayConfig;
use crate::error::ConfigError;
use crate::io::RouterConfig;
use crate::learner::LearnerConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Supervision and budget settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub num_actors: usize,

    /// Restarts allowed per actor slot before it is left down
    pub max_restarts: usize,

    /// Stop after this many learner steps (0 = unlimited)
    pub max_learner_steps: usize,

    /// Stop after this much wall-clock time
    pub max_duration: Option<Duration>,

    /// Polling period of the monitor loop
    pub monitor_interval: Duration,

    /// Period of the progress callback and log line
    pub log_interval: Duration,

    /// How long shutdown waits for each worker before abandoning it
    pub grace_period: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            num_actors: 4,
            max_restarts: 3,
            max_learner_steps: 0,
            max_duration: None,
            monitor_interval: Duration::from_millis(50),
            log_interval: Duration::from_secs(10),
            grace_period: Duration::from_secs(5),
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_num_actors(mut self, n: usize) -> Self {
        self.num_actors = n;
        self
    }

    pub fn with_max_restarts(mut self, n: usize) -> Self {
        self.max_restarts = n;
        self
    }

    pub fn with_max_learner_steps(mut self, steps: usize) -> Self {
        self.max_learner_steps = steps;
        self
    }

    pub fn with_max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = Some(duration);
        self
    }

    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    pub fn with_log_interval(mut self, interval: Duration) -> Self {
        self.log_interval = interval;
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_actors == 0 {
            return Err(ConfigError::InvalidCount { field: "num_actors", value: 0 });
        }
        if self.monitor_interval.is_zero() {
            return Err(ConfigError::Inconsistent("monitor_interval must be non-zero".into()));
        }
        if self.max_duration.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::Inconsistent("max_duration must be non-zero when set".into()));
        }
        Ok(())
    }
}

/// Complete configuration of one training run.
///
/// # Example
///
/// ```ignore
/// let config = ApexConfig::default()
///     .with_orchestrator(OrchestratorConfig::new().with_num_actors(8).with_max_learner_steps(50_000))
///     .with_replay(ReplayConfig::new().with_capacity(200_000).with_min_size(5_000));
/// config.validate()?;
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApexConfig {
    pub replay: ReplayConfig,
    pub router: RouterConfig,
    pub actor: ActorConfig,
    pub learner: LearnerConfig,
    pub orchestrator: OrchestratorConfig,
}

impl ApexConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replay(mut self, replay: ReplayConfig) -> Self {
        self.replay = replay;
        self
    }

    pub fn with_router(mut self, router: RouterConfig) -> Self {
        self.router = router;
        self
    }

    pub fn with_actor(mut self, actor: ActorConfig) -> Self {
        self.actor = actor;
        self
    }

    pub fn with_learner(mut self, learner: LearnerConfig) -> Self {
        self.learner = learner;
        self
    }

    pub fn with_orchestrator(mut self, orchestrator: OrchestratorConfig) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    /// Validate every section, then the cross-section constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.replay.validate()?;
        self.router.validate()?;
        self.actor.validate()?;
        self.learner.validate()?;
        self.orchestrator.validate()?;

        if self.replay.min_size < self.learner.batch_size {
            return Err(ConfigError::Inconsistent(format!(
                "replay min_size ({}) must be >= learner batch_size ({})",
                self.replay.min_size, self.learner.batch_size
            )));
        }
        if self.learner.batch_size > self.replay.capacity {
            return Err(ConfigError::Inconsistent(format!(
                "learner batch_size ({}) exceeds replay capacity ({})",
                self.learner.batch_size, self.replay.capacity
            )));
        }
        if self.router.heartbeat_timeout <= self.actor.snapshot_poll {
            return Err(ConfigError::Inconsistent(format!(
                "router heartbeat_timeout ({:?}) must exceed actor snapshot_poll ({:?})",
                self.router.heartbeat_timeout, self.actor.snapshot_poll
            )));
        }
        Ok(())
    }

    /// Learner step budget in force: the orchestrator's when set, else the learner's own.
    pub fn effective_max_learner_steps(&self) -> usize {
        if self.orchestrator.max_learner_steps > 0 {
            self.orchestrator.max_learner_steps
        } else {
            self.learner.max_train_steps
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(ApexConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_actors_rejected() {
        let config = ApexConfig::new().with_orchestrator(OrchestratorConfig::new().with_num_actors(0));
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidCount { field: "num_actors", value: 0 })
        );
    }

    #[test]
    fn test_min_size_below_batch_rejected() {
        let config = ApexConfig::new()
            .with_replay(ReplayConfig::new().with_capacity(1000).with_min_size(16))
            .with_learner(LearnerConfig::new().with_batch_size(32));
        assert!(matches!(config.validate(), Err(ConfigError::Inconsistent(_))));
    }

    #[test]
    fn test_section_errors_surface() {
        let config = ApexConfig::new().with_replay(ReplayConfig::new().with_capacity(0));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCount { field: "capacity", .. })
        ));
    }

    #[test]
    fn test_zero_duration_rejected() {
        let config = ApexConfig::new()
            .with_orchestrator(OrchestratorConfig::new().with_max_duration(Duration::ZERO));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_step_budget_precedence() {
        let config = ApexConfig::new().with_learner(LearnerConfig::new().with_max_train_steps(10));
        assert_eq!(config.effective_max_learner_steps(), 10);

        let config = config.with_orchestrator(OrchestratorConfig::new().with_max_learner_steps(99));
        assert_eq!(config.effective_max_learner_steps(), 99);
    }
}

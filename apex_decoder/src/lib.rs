//! # Apex Decoder: Distributed Prioritized Replay for Syndrome Decoding
//!
//! Many exploring actors feed one learner through a shared prioritized
//! replay buffer. The learner trains a Q-network that reads stacked
//! surface-code syndromes and proposes single-qubit Pauli corrections.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                          Orchestrator                               │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  Thread 1          Thread 2          Thread N                       │
//! │  ┌────────┐        ┌────────┐        ┌────────┐                     │
//! │  │Actor 0 │        │Actor 1 │        │Actor N │  ε_i = ε^(1+iα/(N-1))│
//! │  │ env    │        │ env    │        │ env    │                     │
//! │  │ replica│        │ replica│        │ replica│                     │
//! │  └───┬────┘        └───┬────┘        └───┬────┘                     │
//! │      │ bounded queues  │                 │  ▲ latest snapshot       │
//! │      └─────────────────┼─────────────────┘  │                       │
//! │                        ▼                    │                       │
//! │              ┌─────────────────┐      ┌─────┴────────┐              │
//! │              │    IoRouter     │─────►│ Prioritized  │              │
//! │              │ (batch, liveness│      │ Replay       │              │
//! │              │  broadcast)     │      │ (sum tree)   │              │
//! │              └────────▲────────┘      └──────┬───────┘              │
//! │                       │ snapshots            │ sample / priorities  │
//! │              ┌────────┴────────┐             │                      │
//! │              │ Learner Thread  │◄────────────┘                      │
//! │              │ online + target │                                    │
//! │              └─────────────────┘                                    │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use apex_decoder::{ApexConfig, Orchestrator, SurfaceCodeEnvironment};
//!
//! let orchestrator = Orchestrator::new(ApexConfig::default());
//! let summary = orchestrator.run(
//!     |_, seed| SurfaceCodeEnvironment::new(env_config.clone(), seed),
//!     |_| Ok(BurnReplica::<NdArray>::new(net_config.clone(), device)),
//!     learner_policy,
//!     |progress| println!("{:?}", progress),
//! )?;
//! ```

pub mod core;
pub mod messages;
pub mod actors;
pub mod buffers;
pub mod io;
pub mod learner;
pub mod policy;
pub mod runners;
pub mod metrics;
pub mod environment;
pub mod scheduling;
pub mod error;

// Re-export commonly used types
pub use core::transition::{Action, SharedTransition, StateHistory, Transition};
pub use core::model_version::{version_counter, PolicySnapshot, SharedVersionCounter, VersionCounter};

pub use messages::{ActorStats, CoordinatorMsg, EvalResult, FinishReason, LearnerStats};

pub use buffers::{prioritized_replay, PrioritizedReplayBuffer, ReplayConfig, ReplayStats, SampledBatch, SharedReplayBuffer};

pub use io::{ActorLink, Egress, IoRouter, OverflowPolicy, RouterConfig, RouterStats};

pub use actors::{Actor, ActorConfig, ActorHandle, Curriculum, InitialPriority};

pub use learner::{Evaluator, Learner, LearnerConfig, LearnerContext, LearnerHandle};

pub use policy::{
    BurnLearnerPolicy, BurnReplica, PolicyReplica, QNetwork, QNetworkConfig, TrainOutput, TrainablePolicy,
    TrainingBatch,
};

pub use runners::{ApexConfig, Orchestrator, OrchestratorConfig, RunProgress, RunSummary, StopHandle, Termination};

pub use metrics::{training_metrics, LogSink, MetricEvent, MetricsSink, SharedSink, SharedTrainingMetrics, TrainingMetrics, Verbosity};

pub use environment::{EnvStep, Environment, StepInfo, SurfaceCodeEnvironment};

pub use scheduling::{ExponentialDecay, LinearSchedule, Schedule};

pub use error::{ConfigError, EnvError, FatalError, PolicyError, ReplayError, RunError};

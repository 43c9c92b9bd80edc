//! Run orchestration.
//!
//! - [`ApexConfig`]: every component's configuration plus cross-checks
//! - [`Orchestrator`]: builds the pipeline, supervises actors, enforces
//!   budgets and shuts everything down
//!
//! # Lifecycle
//!
//! ```text
//! validate ─► replay + router ─► broadcast v1 ─► learner ─► actors
//!                                                              │
//!            summary ◄─ shutdown ◄─ budget / stop / fatal ◄─ monitor
//! ```

pub mod apex_config;
pub mod orchestrator;

#[cfg(test)]
mod tests;

pub use apex_config::{ApexConfig, OrchestratorConfig};
pub use orchestrator::{Orchestrator, RunProgress, RunSummary, StopHandle, Termination};

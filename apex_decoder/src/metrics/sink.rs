//! Scalar metric events and sinks.
//!
//! The pipeline emits [`MetricEvent`]s tagged with a [`Verbosity`] tier.
//! A [`MetricsSink`] decides what to do with them; nothing here formats
//! files or persists data.

use parking_lot::Mutex;
use std::sync::Arc;

/// Verbosity tier of an event. Sinks drop events above their level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// Run-level progress: loss, eval success
    #[default]
    Essential,
    /// Per-component throughput and queue depths
    Detailed,
    /// Priority distributions and other internals
    Debug,
}

/// One scalar observation.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricEvent {
    Loss { step: usize, value: f32 },
    PriorityStats { step: usize, min: f32, mean: f32, max: f32 },
    QueueDepth { queue: &'static str, depth: usize },
    ActorThroughput { actor_id: usize, steps_per_second: f32 },
    EvalSuccessRate { step: usize, value: f32 },
    EvalReward { step: usize, value: f32 },
    ReplaySize { len: usize },
}

impl MetricEvent {
    pub fn verbosity(&self) -> Verbosity {
        match self {
            MetricEvent::Loss { .. } | MetricEvent::EvalSuccessRate { .. } | MetricEvent::EvalReward { .. } => {
                Verbosity::Essential
            }
            MetricEvent::QueueDepth { .. } | MetricEvent::ActorThroughput { .. } | MetricEvent::ReplaySize { .. } => {
                Verbosity::Detailed
            }
            MetricEvent::PriorityStats { .. } => Verbosity::Debug,
        }
    }
}

/// Receiver of metric events.
pub trait MetricsSink: Send + Sync {
    fn emit(&self, event: MetricEvent);
}

/// Shared sink handle.
pub type SharedSink = Arc<dyn MetricsSink>;

/// Forwards events to the `log` facade.
#[derive(Debug, Clone)]
pub struct LogSink {
    level: Verbosity,
}

impl LogSink {
    pub fn new(level: Verbosity) -> Self {
        Self { level }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new(Verbosity::Essential)
    }
}

impl MetricsSink for LogSink {
    fn emit(&self, event: MetricEvent) {
        let tier = event.verbosity();
        if tier > self.level {
            return;
        }
        match tier {
            Verbosity::Essential => log::info!(target: "apex_decoder::metrics", "{:?}", event),
            Verbosity::Detailed => log::debug!(target: "apex_decoder::metrics", "{:?}", event),
            Verbosity::Debug => log::trace!(target: "apex_decoder::metrics", "{:?}", event),
        }
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl MetricsSink for NullSink {
    fn emit(&self, _event: MetricEvent) {}
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<MetricEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MetricEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl MetricsSink for MemorySink {
    fn emit(&self, event: MetricEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiers_are_ordered() {
        assert!(Verbosity::Essential < Verbosity::Detailed);
        assert!(Verbosity::Detailed < Verbosity::Debug);
        assert_eq!(MetricEvent::Loss { step: 0, value: 1.0 }.verbosity(), Verbosity::Essential);
        assert_eq!(
            MetricEvent::PriorityStats { step: 0, min: 0.0, mean: 0.0, max: 0.0 }.verbosity(),
            Verbosity::Debug
        );
    }

    #[test]
    fn test_memory_sink_collects() {
        let sink: Arc<MemorySink> = Arc::new(MemorySink::new());
        let shared: SharedSink = sink.clone();
        shared.emit(MetricEvent::ReplaySize { len: 10 });
        shared.emit(MetricEvent::QueueDepth { queue: "aggregate", depth: 3 });
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.events()[0], MetricEvent::ReplaySize { len: 10 });
    }
}

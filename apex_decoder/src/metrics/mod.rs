//! Training metrics.
//!
//! - [`TrainingMetrics`]: shared atomic counters readable during a run
//! - [`MetricsSink`]: receiver for tiered scalar [`MetricEvent`]s

pub mod sink;
pub mod training_metrics;

pub use sink::{LogSink, MemorySink, MetricEvent, MetricsSink, NullSink, SharedSink, Verbosity};
pub use training_metrics::{training_metrics, SharedTrainingMetrics, TrainingMetrics};

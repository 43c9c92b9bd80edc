//! Step-indexed schedules for exploration and importance sampling.
//!
//! - `ConstantSchedule`: fixed value
//! - `LinearSchedule`: linear interpolation, held at `end` afterwards (beta)
//! - `ExponentialDecay`: exponential decay toward a floor (actor epsilon)
//!
//! # Data Integrity
//!
//! Invalid parameters trigger debug assertions and are sanitized in release
//! builds. Every schedule returns a finite value for any step.

/// Value as a function of a step counter.
pub trait Schedule: Send + Sync {
    fn value(&self, step: usize) -> f64;
}

/// Fixed value for every step.
#[derive(Debug, Clone, Copy)]
pub struct ConstantSchedule {
    value: f64,
}

impl ConstantSchedule {
    pub fn new(value: f64) -> Self {
        debug_assert!(value.is_finite(), "ConstantSchedule: value must be finite, got {}", value);
        Self {
            value: if value.is_finite() { value } else { 0.0 },
        }
    }
}

impl Schedule for ConstantSchedule {
    fn value(&self, _step: usize) -> f64 {
        self.value
    }
}

/// Linear interpolation from `start` to `end` over `steps`.
///
/// `steps = 0` jumps straight to `end`.
#[derive(Debug, Clone, Copy)]
pub struct LinearSchedule {
    start: f64,
    end: f64,
    steps: usize,
}

impl LinearSchedule {
    pub fn new(start: f64, end: f64, steps: usize) -> Self {
        debug_assert!(
            start.is_finite() && end.is_finite(),
            "LinearSchedule: bounds must be finite, got {} -> {}",
            start,
            end
        );
        let start = if start.is_finite() { start } else { 0.0 };
        let end = if end.is_finite() { end } else { start };
        Self { start, end, steps }
    }

    /// Fraction of the schedule completed at `step`, in [0, 1].
    pub fn progress(&self, step: usize) -> f64 {
        if self.steps == 0 {
            1.0
        } else {
            (step as f64 / self.steps as f64).min(1.0)
        }
    }
}

impl Schedule for LinearSchedule {
    fn value(&self, step: usize) -> f64 {
        self.start + (self.end - self.start) * self.progress(step)
    }
}

/// `max(floor, base * exp(-step / decay_steps))`.
///
/// `decay_steps = 0` disables decay.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialDecay {
    base: f64,
    decay_steps: f64,
    floor: f64,
}

impl ExponentialDecay {
    pub fn new(base: f64, decay_steps: f64, floor: f64) -> Self {
        debug_assert!(base.is_finite() && base >= 0.0, "ExponentialDecay: invalid base {}", base);
        debug_assert!(decay_steps >= 0.0, "ExponentialDecay: negative decay_steps {}", decay_steps);
        let base = if base.is_finite() { base.max(0.0) } else { 0.0 };
        let floor = if floor.is_finite() { floor.clamp(0.0, base) } else { 0.0 };
        let decay_steps = if decay_steps.is_finite() { decay_steps.max(0.0) } else { 0.0 };
        Self {
            base,
            decay_steps,
            floor,
        }
    }
}

impl Schedule for ExponentialDecay {
    fn value(&self, step: usize) -> f64 {
        if self.decay_steps == 0.0 {
            return self.base;
        }
        (self.base * (-(step as f64) / self.decay_steps).exp()).max(self.floor)
    }
}

/// Ape-X per-actor exploration rate: `base^(1 + alpha * i / (n - 1))`.
///
/// Actor 0 explores most; the last actor is the greediest. A single actor
/// gets `base`.
pub fn actor_epsilon(base: f64, alpha: f64, actor_id: usize, num_actors: usize) -> f64 {
    if num_actors <= 1 {
        return base;
    }
    let exponent = 1.0 + alpha * actor_id as f64 / (num_actors - 1) as f64;
    base.powf(exponent)
}

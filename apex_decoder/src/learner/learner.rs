//! Learner: prioritized sampling, gradient steps and policy broadcast.
//!
//! The learner owns the authoritative policy and runs on its own thread:
//!
//! 1. Anneal beta and sample an importance-weighted batch
//! 2. Validate the batch and take one gradient step
//! 3. Write `|td| + epsilon_min` back as the new priorities
//! 4. Periodically sync the target network, broadcast a versioned
//!    snapshot, evaluate, and report stats
//!
//! # Failure handling
//!
//! A malformed or non-finite batch is skipped and logged. Only
//! `max_consecutive_nan` non-finite steps in a row (or as many consecutive
//! policy errors) end the run, reported as `CoordinatorMsg::LearnerFatal`.
//! The stop flag is checked between steps, so an in-flight gradient step
//! always completes.

use crate::buffers::{SampledBatch, SharedReplayBuffer};
use crate::core::model_version::{PolicySnapshot, SharedVersionCounter};
use crate::environment::Environment;
use crate::error::{ConfigError, FatalError, ReplayError};
use crate::io::Egress;
use crate::learner::evaluator::Evaluator;
use crate::messages::{CoordinatorMsg, FinishReason, LearnerStats};
use crate::metrics::{MetricEvent, SharedSink, SharedTrainingMetrics};
use crate::policy::{TrainOutput, TrainablePolicy, TrainingBatch};
use crate::scheduling::{LinearSchedule, Schedule};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Learner configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerConfig {
    pub batch_size: usize,
    /// Discount factor for the TD target
    pub gamma: f32,
    /// Optimizer step size, handed to the policy at construction
    pub learning_rate: f64,
    /// Train steps between target network syncs
    pub target_sync_interval: usize,
    /// Train steps between policy snapshot broadcasts
    pub policy_broadcast_interval: usize,
    /// Train steps between evaluations (0 disables evaluation)
    pub eval_frequency: usize,
    pub eval_episodes: usize,
    /// Step cap for one evaluation episode
    pub eval_max_episode_steps: usize,
    /// Consecutive non-finite steps tolerated before the run halts
    pub max_consecutive_nan: usize,
    /// Train steps between `LearnerStats` reports
    pub stats_freq: usize,
    /// Sleep while the replay buffer is below `min_size`
    pub empty_buffer_backoff: Duration,
    /// Stop after this many train steps (0 = unlimited)
    pub max_train_steps: usize,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            gamma: 0.95,
            learning_rate: 1e-4,
            target_sync_interval: 1_000,
            policy_broadcast_interval: 50,
            eval_frequency: 5_000,
            eval_episodes: 20,
            eval_max_episode_steps: 100,
            max_consecutive_nan: 10,
            stats_freq: 100,
            empty_buffer_backoff: Duration::from_millis(10),
            max_train_steps: 0,
        }
    }
}

impl LearnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_gamma(mut self, gamma: f32) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Set target sync and policy broadcast intervals.
    pub fn with_intervals(mut self, target_sync: usize, broadcast: usize) -> Self {
        self.target_sync_interval = target_sync;
        self.policy_broadcast_interval = broadcast;
        self
    }

    /// Set evaluation cadence; `frequency = 0` disables evaluation.
    pub fn with_eval(mut self, frequency: usize, episodes: usize) -> Self {
        self.eval_frequency = frequency;
        self.eval_episodes = episodes;
        self
    }

    pub fn with_max_consecutive_nan(mut self, n: usize) -> Self {
        self.max_consecutive_nan = n;
        self
    }

    pub fn with_stats_freq(mut self, freq: usize) -> Self {
        self.stats_freq = freq;
        self
    }

    pub fn with_empty_buffer_backoff(mut self, backoff: Duration) -> Self {
        self.empty_buffer_backoff = backoff;
        self
    }

    pub fn with_max_train_steps(mut self, steps: usize) -> Self {
        self.max_train_steps = steps;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("batch_size", self.batch_size),
            ("target_sync_interval", self.target_sync_interval),
            ("policy_broadcast_interval", self.policy_broadcast_interval),
            ("max_consecutive_nan", self.max_consecutive_nan),
            ("stats_freq", self.stats_freq),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidCount { field, value });
            }
        }
        if self.eval_frequency > 0 && self.eval_episodes == 0 {
            return Err(ConfigError::InvalidCount {
                field: "eval_episodes",
                value: 0,
            });
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(ConfigError::OutOfRange {
                field: "gamma",
                value: self.gamma as f64,
                min: 0.0,
                max: 1.0,
            });
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ConfigError::OutOfRange {
                field: "learning_rate",
                value: self.learning_rate,
                min: f64::MIN_POSITIVE,
                max: f64::INFINITY,
            });
        }
        Ok(())
    }
}

/// Handle for the spawned learner thread.
pub struct LearnerHandle {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl LearnerHandle {
    /// Ask the learner to exit after its in-flight step.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    pub fn into_thread(self) -> JoinHandle<()> {
        self.thread
    }
}

/// Collaborators the learner thread needs besides its policy.
pub struct LearnerContext<P> {
    pub replay: SharedReplayBuffer,
    pub egress: Egress<P>,
    pub versions: SharedVersionCounter,
    pub coordinator: Sender<CoordinatorMsg>,
    pub metrics: SharedTrainingMetrics,
    pub sink: SharedSink,
}

/// Learner factory.
pub struct Learner {
    config: LearnerConfig,
}

impl Learner {
    pub fn new(config: LearnerConfig) -> Self {
        Self { config }
    }

    /// Spawn the learner thread.
    ///
    /// `evaluator` is optional; without it evaluation is skipped even when
    /// `eval_frequency > 0`.
    pub fn spawn<L, E>(
        self,
        policy: L,
        evaluator: Option<Evaluator<E>>,
        ctx: LearnerContext<L::Params>,
    ) -> io::Result<LearnerHandle>
    where
        L: TrainablePolicy + 'static,
        E: Environment + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let beta = {
            let replay = ctx.replay.config();
            LinearSchedule::new(replay.beta, replay.beta_final, replay.beta_anneal_steps)
        };
        let worker = LearnerWorker {
            config: self.config,
            policy,
            evaluator,
            beta,
            ctx,
            stop: Arc::clone(&stop),
            stats: LearnerStats::new(),
            consecutive_bad: 0,
            started: Instant::now(),
            window: (Instant::now(), 0),
        };

        let thread = std::thread::Builder::new()
            .name("learner".into())
            .spawn(move || worker.run())?;

        Ok(LearnerHandle { stop, thread })
    }
}

// ============================================================================
// Worker loop
// ============================================================================

/// Result of one pass through the training loop.
enum StepOutcome {
    Trained,
    /// Replay buffer not ready yet
    Waiting,
    /// Batch skipped; counts toward the consecutive failure limit
    Skipped,
    Fatal(FatalError),
}

struct LearnerWorker<L: TrainablePolicy, E> {
    config: LearnerConfig,
    policy: L,
    evaluator: Option<Evaluator<E>>,
    beta: LinearSchedule,
    ctx: LearnerContext<L::Params>,
    stop: Arc<AtomicBool>,
    stats: LearnerStats,
    consecutive_bad: usize,
    started: Instant,
    /// Start of the current stats window and the step count at that time
    window: (Instant, usize),
}

impl<L: TrainablePolicy, E: Environment> LearnerWorker<L, E> {
    fn run(mut self) {
        log::info!(
            "learner started: batch {}, gamma {}, target sync every {}, broadcast every {}",
            self.config.batch_size,
            self.config.gamma,
            self.config.target_sync_interval,
            self.config.policy_broadcast_interval
        );

        let reason = loop {
            if self.stop.load(Ordering::Acquire) {
                break FinishReason::Stopped;
            }
            if self.config.max_train_steps > 0 && self.stats.train_steps >= self.config.max_train_steps {
                break FinishReason::Completed;
            }

            match self.step() {
                StepOutcome::Trained => self.after_step(),
                StepOutcome::Waiting => std::thread::sleep(self.config.empty_buffer_backoff),
                StepOutcome::Skipped => {}
                StepOutcome::Fatal(error) => {
                    log::error!("learner halting: {}", error);
                    let _ = self.ctx.coordinator.send(CoordinatorMsg::LearnerFatal(error));
                    return;
                }
            }
        };

        self.report();
        log::info!(
            "learner finished after {} train steps in {:.1}s ({:?})",
            self.stats.train_steps,
            self.started.elapsed().as_secs_f32(),
            reason
        );
        let _ = self.ctx.coordinator.send(CoordinatorMsg::LearnerFinished { reason });
    }

    fn step(&mut self) -> StepOutcome {
        let replay = &self.ctx.replay;
        replay.set_beta(self.beta.value(self.stats.train_steps));

        let batch = match replay.sample(self.config.batch_size) {
            Ok(batch) => batch,
            Err(ReplayError::EmptyBuffer { .. }) => return StepOutcome::Waiting,
            Err(e) => return StepOutcome::Fatal(FatalError::LearnerCrash(e.to_string())),
        };

        let training = match TrainingBatch::from_transitions(&batch.transitions, &batch.weights, self.config.gamma) {
            Ok(training) => training,
            Err(e) => {
                log::warn!("skipping malformed batch: {}", e);
                self.stats.record_skip();
                return StepOutcome::Skipped;
            }
        };

        if !training.is_finite() {
            self.demote_non_finite(&batch);
            return self.numeric_failure("non-finite values in sampled batch");
        }

        match self.policy.train_step(&training) {
            Ok(output) if output_is_finite(&output, training.len()) => {
                self.consecutive_bad = 0;
                self.write_priorities(&batch, &output);
                self.stats.record_step(output.loss);
                self.ctx.metrics.increment_train_steps();
                self.ctx.sink.emit(MetricEvent::Loss {
                    step: self.stats.train_steps,
                    value: output.loss,
                });
                StepOutcome::Trained
            }
            Ok(output) => {
                let msg = format!("non-finite training output (loss {})", output.loss);
                self.numeric_failure(&msg)
            }
            Err(e) => {
                self.stats.record_skip();
                self.consecutive_bad += 1;
                log::warn!(
                    "train step failed ({} in a row): {}",
                    self.consecutive_bad,
                    e
                );
                if self.consecutive_bad >= self.config.max_consecutive_nan {
                    StepOutcome::Fatal(FatalError::LearnerCrash(e.to_string()))
                } else {
                    StepOutcome::Skipped
                }
            }
        }
    }

    fn numeric_failure(&mut self, what: &str) -> StepOutcome {
        self.stats.record_skip();
        self.consecutive_bad += 1;
        log::warn!(
            "skipping batch at train step {}: {} ({} consecutive)",
            self.stats.train_steps,
            what,
            self.consecutive_bad
        );
        if self.consecutive_bad >= self.config.max_consecutive_nan {
            StepOutcome::Fatal(FatalError::NumericDivergence {
                consecutive: self.consecutive_bad,
                train_step: self.stats.train_steps,
            })
        } else {
            StepOutcome::Skipped
        }
    }

    /// Push corrupt entries to the priority floor so they are rarely drawn again.
    fn demote_non_finite(&self, batch: &SampledBatch) {
        let floor = self.ctx.replay.config().epsilon_min;
        let (ids, priorities): (Vec<_>, Vec<_>) = batch
            .transitions
            .iter()
            .zip(&batch.ids)
            .filter(|(t, _)| !t.is_finite())
            .map(|(_, &id)| (id, floor))
            .unzip();
        if let Err(e) = self.ctx.replay.update_priorities(&ids, &priorities) {
            log::warn!("failed to demote corrupt entries: {}", e);
        }
    }

    fn write_priorities(&mut self, batch: &SampledBatch, output: &TrainOutput) {
        let floor = self.ctx.replay.config().epsilon_min;
        let priorities: Vec<f32> = output.td_errors.iter().map(|td| td.abs() + floor).collect();
        match self.ctx.replay.update_priorities(&batch.ids, &priorities) {
            Ok(stale) => self.stats.stale_priority_updates += stale,
            Err(e) => log::warn!("priority update rejected: {}", e),
        }
    }

    fn after_step(&mut self) {
        let step = self.stats.train_steps;

        if step % self.config.target_sync_interval == 0 {
            self.policy.sync_target();
            self.stats.target_syncs += 1;
            log::debug!("target network synced at step {}", step);
        }
        if step % self.config.policy_broadcast_interval == 0 {
            self.broadcast();
        }
        if self.config.eval_frequency > 0 && step % self.config.eval_frequency == 0 {
            self.evaluate(step);
        }
        if step % self.config.stats_freq == 0 {
            self.report();
        }
    }

    fn broadcast(&mut self) {
        match self.policy.export() {
            Ok(params) => {
                let version = self.ctx.versions.increment();
                let delivered = self.ctx.egress.broadcast(PolicySnapshot::new(version, params));
                self.stats.policy_version = version;
                self.ctx.metrics.set_policy_version(version);
                log::debug!("broadcast policy v{} to {} actors", version, delivered);
            }
            Err(e) => log::warn!("policy export failed, actors keep v{}: {}", self.stats.policy_version, e),
        }
    }

    fn evaluate(&mut self, step: usize) {
        let Some(evaluator) = self.evaluator.as_mut() else {
            return;
        };
        let result = evaluator.run(&self.policy, step);
        log::info!(
            "eval at step {}: success {:.1}%, reward {:.3} ± {:.3} over {} episodes",
            step,
            result.success_rate * 100.0,
            result.avg_reward,
            result.std_reward,
            result.n_episodes
        );
        self.ctx.metrics.set_eval_success_rate(result.success_rate);
        self.ctx.sink.emit(MetricEvent::EvalSuccessRate {
            step,
            value: result.success_rate,
        });
        self.ctx.sink.emit(MetricEvent::EvalReward {
            step,
            value: result.avg_reward,
        });
        let _ = self.ctx.coordinator.try_send(CoordinatorMsg::EvalResult(result));
    }

    fn report(&mut self) {
        let (since, steps_then) = self.window;
        let elapsed = since.elapsed().as_secs_f32();
        let sps = if elapsed > 1e-6 {
            (self.stats.train_steps - steps_then) as f32 / elapsed
        } else {
            0.0
        };
        self.window = (Instant::now(), self.stats.train_steps);

        let replay = self.ctx.replay.stats();
        let step = self.stats.train_steps;
        self.ctx.sink.emit(MetricEvent::PriorityStats {
            step,
            min: replay.priority_min,
            mean: replay.priority_mean,
            max: replay.priority_max,
        });
        self.ctx.sink.emit(MetricEvent::ReplaySize { len: replay.len });

        let report = self.stats.take_report(sps, replay);
        log::debug!(
            "learner step {}: loss {:.5}, {:.1} steps/s, skipped {}",
            report.train_steps,
            report.avg_loss,
            report.steps_per_second,
            report.skipped_batches
        );
        let _ = self.ctx.coordinator.try_send(CoordinatorMsg::LearnerStats(report));
    }
}

fn output_is_finite(output: &TrainOutput, batch_len: usize) -> bool {
    output.loss.is_finite()
        && output.td_errors.len() == batch_len
        && output.td_errors.iter().all(|td| td.is_finite())
}

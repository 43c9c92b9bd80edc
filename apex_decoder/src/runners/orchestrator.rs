//! Run supervisor.
//!
//! The orchestrator wires the replay buffer, router, learner and actors
//! together, then watches them from the calling thread:
//!
//! ```text
//!   ┌──────────┐  transitions  ┌──────────┐  batches   ┌─────────────────┐
//!   │ Actor 0  │──────────────►│          │───────────►│                 │
//!   │ Actor 1  │──────────────►│ IoRouter │            │ PrioritizedReplay│
//!   │   ...    │◄──snapshots───│          │            │                 │
//!   └──────────┘               └──────────┘            └─────────────────┘
//!        │                          ▲  broadcast               │ sample / priorities
//!        │ stats, finish            │                          ▼
//!        ▼                     ┌─────────┐                ┌─────────┐
//!   ┌──────────────┐◄──────────│ Learner │◄───────────────│         │
//!   │ Orchestrator │  stats,   └─────────┘                └─────────┘
//!   └──────────────┘  eval, fatal
//! ```
//!
//! Hung or crashed actors are replaced under a fresh generation until their
//! slot runs out of restarts; the run keeps going as long as one actor is
//! alive. Learner failures end the run.

use super::apex_config::ApexConfig;
use crate::actors::{Actor, ActorHandle, ActorStats};
use crate::buffers::{prioritized_replay, SharedReplayBuffer};
use crate::core::model_version::{version_counter, PolicySnapshot};
use crate::core::shutdown::{join_until, JoinOutcome};
use crate::environment::Environment;
use crate::error::{EnvError, FatalError, PolicyError, RunError};
use crate::io::IoRouter;
use crate::learner::{Evaluator, Learner, LearnerContext, LearnerHandle};
use crate::messages::{CoordinatorMsg, EvalResult, FinishReason, LearnerStats};
use crate::metrics::{training_metrics, LogSink, MetricEvent, SharedSink, SharedTrainingMetrics};
use crate::policy::{PolicyReplica, TrainablePolicy};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Seed offset of the evaluation environment, keeping it apart from actor seeds.
const EVAL_SEED_OFFSET: u64 = 1 << 32;

/// Shortest slice handed to the router for its final flush.
const MIN_ROUTER_GRACE: Duration = Duration::from_millis(100);

/// Why a run ended without a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Learner reached its step budget
    StepBudget,
    /// Wall-clock budget elapsed
    TimeBudget,
    /// Stop requested through a [`StopHandle`] or by the learner
    Stopped,
}

/// Cloneable handle that asks a running orchestrator to shut down.
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Periodic progress passed to the run callback.
#[derive(Debug, Clone)]
pub struct RunProgress {
    pub elapsed: Duration,
    pub learner_steps: usize,
    pub env_steps: u64,
    pub transitions_inserted: u64,
    pub replay_len: usize,
    pub policy_version: u64,
    pub active_actors: usize,
    pub avg_reward: f32,
    pub eval_success_rate: f32,
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub termination: Termination,
    pub elapsed: Duration,
    pub learner_steps: usize,
    pub env_steps: u64,
    pub transitions_generated: u64,
    pub transitions_inserted: u64,
    pub policy_version: u64,
    /// Restarts consumed per actor slot
    pub actor_restarts: Vec<usize>,
    /// Slots that exhausted their restarts
    pub degraded_actors: Vec<usize>,
    pub last_eval: Option<EvalResult>,
    pub last_learner_stats: Option<LearnerStats>,
    /// False if any worker had to be abandoned at shutdown
    pub clean_shutdown: bool,
}

/// Builds and supervises one training run.
pub struct Orchestrator {
    config: ApexConfig,
    stop: Arc<AtomicBool>,
    metrics: SharedTrainingMetrics,
    sink: SharedSink,
}

impl Orchestrator {
    pub fn new(config: ApexConfig) -> Self {
        Self {
            config,
            stop: Arc::new(AtomicBool::new(false)),
            metrics: training_metrics(),
            sink: Arc::new(LogSink::default()),
        }
    }

    /// Route metric events to `sink` instead of the log.
    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &ApexConfig {
        &self.config
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.stop))
    }

    /// Counters shared with every component of the run.
    pub fn metrics(&self) -> SharedTrainingMetrics {
        Arc::clone(&self.metrics)
    }

    /// Run until a budget is reached, a stop is requested, or a fatal
    /// condition occurs.
    ///
    /// - `env_factory(slot, seed)` builds actor environments; slot
    ///   `num_actors` is the evaluation environment.
    /// - `replica_factory(actor_id)` builds each actor's inference replica.
    /// - `policy` is the learner's trainable network.
    /// - `callback` receives a [`RunProgress`] every `log_interval`.
    ///
    /// Blocks the calling thread. Workers are always shut down before
    /// returning, including on error.
    pub fn run<E, EF, R, RF, L, F>(
        &self,
        env_factory: EF,
        replica_factory: RF,
        policy: L,
        mut callback: F,
    ) -> Result<RunSummary, RunError>
    where
        E: Environment + 'static,
        EF: Fn(usize, u64) -> Result<E, EnvError>,
        R: PolicyReplica + 'static,
        RF: Fn(usize) -> Result<R, PolicyError>,
        L: TrainablePolicy<Params = R::Params> + 'static,
        F: FnMut(&RunProgress),
    {
        let config = &self.config;
        config.validate()?;
        let num_actors = config.orchestrator.num_actors;

        log::info!(
            "starting run: {} actors, replay capacity {}, batch size {}",
            num_actors,
            config.replay.capacity,
            config.learner.batch_size
        );

        let replay = prioritized_replay(config.replay.clone())?;
        let (coordinator_tx, coordinator_rx) = unbounded();
        let router = IoRouter::spawn(
            config.router.clone(),
            Arc::clone(&replay),
            coordinator_tx.clone(),
            Arc::clone(&self.metrics),
        )?;

        // Actors block until their first snapshot, so version 1 goes out
        // before any of them exists.
        let versions = version_counter();
        let egress = router.egress();
        let initial = policy
            .export()
            .map_err(|e| FatalError::LearnerCrash(format!("initial policy export failed: {}", e)))?;
        let version = versions.increment();
        egress.broadcast(PolicySnapshot::new(version, initial));
        self.metrics.set_policy_version(version);

        let evaluator = if config.learner.eval_frequency > 0 {
            let seed = config.actor.seed.wrapping_add(EVAL_SEED_OFFSET);
            match env_factory(num_actors, seed) {
                Ok(env) => Some(Evaluator::new(
                    env,
                    config.learner.eval_episodes,
                    config.learner.eval_max_episode_steps,
                )),
                Err(e) => {
                    log::warn!("evaluation environment unavailable, running without evaluation: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let learner_config = config
            .learner
            .clone()
            .with_max_train_steps(config.effective_max_learner_steps());
        let learner = Learner::new(learner_config).spawn(
            policy,
            evaluator,
            LearnerContext {
                replay: Arc::clone(&replay),
                egress,
                versions,
                coordinator: coordinator_tx.clone(),
                metrics: Arc::clone(&self.metrics),
                sink: Arc::clone(&self.sink),
            },
        )?;

        let mut supervisor = ActorSupervisor {
            config,
            router: &router,
            env_factory: &env_factory,
            replica_factory: &replica_factory,
            coordinator: coordinator_tx,
            metrics: Arc::clone(&self.metrics),
            slots: (0..num_actors).map(|_| ActorSlot::default()).collect(),
            retired: Vec::new(),
        };
        for actor_id in 0..num_actors {
            supervisor.launch(actor_id);
        }

        let mut monitor = Monitor {
            started: Instant::now(),
            learner: Some(learner),
            coordinator: coordinator_rx,
            sink: Arc::clone(&self.sink),
            last_eval: None,
            last_learner_stats: None,
        };
        let outcome = self.monitor(&mut monitor, &mut supervisor, &replay, &mut callback);

        // Shutdown: every worker gets the same deadline.
        let grace = config.orchestrator.grace_period;
        let deadline = Instant::now() + grace;
        let mut clean = true;
        if let Some(learner) = monitor.learner.take() {
            learner.stop();
            supervisor.stop_all();
            clean &= join_worker("learner", learner.into_thread(), deadline);
        } else {
            supervisor.stop_all();
        }
        clean &= supervisor.join_all(deadline);
        monitor.drain_reports();
        let actor_restarts = supervisor.restarts();
        let degraded_actors = supervisor.degraded();
        drop(supervisor);

        let router_grace = deadline.saturating_duration_since(Instant::now()).max(MIN_ROUTER_GRACE);
        clean &= router.shutdown(router_grace);

        let elapsed = monitor.started.elapsed();
        match outcome {
            Ok(termination) => {
                let summary = RunSummary {
                    termination,
                    elapsed,
                    learner_steps: self.metrics.train_steps(),
                    env_steps: self.metrics.env_steps(),
                    transitions_generated: self.metrics.transitions_generated(),
                    transitions_inserted: self.metrics.transitions_inserted(),
                    policy_version: self.metrics.policy_version(),
                    actor_restarts,
                    degraded_actors,
                    last_eval: monitor.last_eval,
                    last_learner_stats: monitor.last_learner_stats,
                    clean_shutdown: clean,
                };
                log::info!(
                    "run finished ({:?}) after {:.1}s: {} learner steps, {} transitions inserted",
                    summary.termination,
                    elapsed.as_secs_f64(),
                    summary.learner_steps,
                    summary.transitions_inserted
                );
                Ok(summary)
            }
            Err(fatal) => {
                log::error!("run halted after {:.1}s: {}", elapsed.as_secs_f64(), fatal);
                Err(RunError::Fatal(fatal))
            }
        }
    }

    fn monitor<E, EF, R, RF, F>(
        &self,
        monitor: &mut Monitor,
        supervisor: &mut ActorSupervisor<'_, R::Params, EF, RF>,
        replay: &SharedReplayBuffer,
        callback: &mut F,
    ) -> Result<Termination, FatalError>
    where
        E: Environment + 'static,
        EF: Fn(usize, u64) -> Result<E, EnvError>,
        R: PolicyReplica + 'static,
        RF: Fn(usize) -> Result<R, PolicyError>,
        F: FnMut(&RunProgress),
    {
        let settings = &self.config.orchestrator;
        let mut next_progress = monitor.started + settings.log_interval;

        loop {
            if let Some(end) = monitor.pump(settings.monitor_interval, supervisor) {
                return end;
            }
            if let Some(end) = monitor.check_learner() {
                return end;
            }

            supervisor.check_finished();
            supervisor.reap_retired();
            if supervisor.active() == 0 {
                return Err(FatalError::AllActorsLost {
                    num_actors: settings.num_actors,
                });
            }

            if self.stop.load(Ordering::Acquire) {
                log::info!("stop requested");
                return Ok(Termination::Stopped);
            }
            if settings
                .max_duration
                .is_some_and(|limit| monitor.started.elapsed() >= limit)
            {
                log::info!("time budget of {:?} reached", settings.max_duration);
                return Ok(Termination::TimeBudget);
            }

            let now = Instant::now();
            if now >= next_progress {
                next_progress = now + settings.log_interval;
                let router_stats = supervisor.router.stats();
                self.sink.emit(MetricEvent::QueueDepth {
                    queue: "aggregate",
                    depth: router_stats.aggregate_depth,
                });
                self.sink.emit(MetricEvent::QueueDepth {
                    queue: "actors",
                    depth: router_stats.actors.iter().map(|a| a.queue_depth).sum(),
                });

                let progress = RunProgress {
                    elapsed: monitor.started.elapsed(),
                    learner_steps: self.metrics.train_steps(),
                    env_steps: self.metrics.env_steps(),
                    transitions_inserted: self.metrics.transitions_inserted(),
                    replay_len: replay.len(),
                    policy_version: self.metrics.policy_version(),
                    active_actors: supervisor.active(),
                    avg_reward: self.metrics.avg_reward(),
                    eval_success_rate: self.metrics.eval_success_rate(),
                };
                log::info!(
                    "[{:.0}s] steps {} | env steps {} | replay {} | policy v{} | actors {}/{} | reward {:.3}",
                    progress.elapsed.as_secs_f64(),
                    progress.learner_steps,
                    progress.env_steps,
                    progress.replay_len,
                    progress.policy_version,
                    progress.active_actors,
                    settings.num_actors,
                    progress.avg_reward
                );
                callback(&progress);
            }
        }
    }
}

/// Join one worker thread before `deadline`, logging the outcome.
fn join_worker(name: &str, thread: std::thread::JoinHandle<()>, deadline: Instant) -> bool {
    match join_until(thread, deadline) {
        JoinOutcome::Finished(Ok(())) => true,
        JoinOutcome::Finished(Err(payload)) => {
            if let FinishReason::Panicked(msg) = FinishReason::from_panic(payload.as_ref()) {
                log::error!("{} panicked during shutdown: {}", name, msg);
            }
            false
        }
        JoinOutcome::Abandoned => {
            log::warn!("{} did not stop before the shutdown deadline; abandoning it", name);
            false
        }
    }
}

// ============================================================================
// Monitor state
// ============================================================================

struct Monitor {
    started: Instant,
    learner: Option<LearnerHandle>,
    coordinator: Receiver<CoordinatorMsg>,
    sink: SharedSink,
    last_eval: Option<EvalResult>,
    last_learner_stats: Option<LearnerStats>,
}

impl Monitor {
    /// Wait up to `timeout` for messages and handle everything queued.
    fn pump<S: Supervise>(&mut self, timeout: Duration, supervisor: &mut S) -> Option<Result<Termination, FatalError>> {
        let first = match self.coordinator.recv_timeout(timeout) {
            Ok(msg) => msg,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return None,
        };
        let pending: Vec<CoordinatorMsg> = std::iter::once(first).chain(self.coordinator.try_iter()).collect();
        for msg in pending {
            if let Some(end) = self.handle(msg, supervisor) {
                return Some(end);
            }
        }
        None
    }

    fn handle<S: Supervise>(&mut self, msg: CoordinatorMsg, supervisor: &mut S) -> Option<Result<Termination, FatalError>> {
        match msg {
            CoordinatorMsg::ActorStats(stats) => {
                if let Some(steps_per_second) = supervisor.record_stats(stats.clone()) {
                    self.sink.emit(MetricEvent::ActorThroughput {
                        actor_id: stats.actor_id,
                        steps_per_second,
                    });
                }
            }
            CoordinatorMsg::LearnerStats(stats) => {
                log::debug!(
                    "learner: {} steps, loss {:.4}, {:.1} steps/s, policy v{}",
                    stats.train_steps,
                    stats.avg_loss,
                    stats.steps_per_second,
                    stats.policy_version
                );
                self.last_learner_stats = Some(stats);
            }
            CoordinatorMsg::EvalResult(result) => {
                log::info!(
                    "eval at step {}: success {:.3}, reward {:.3}, length {:.1}",
                    result.step,
                    result.success_rate,
                    result.avg_reward,
                    result.avg_length
                );
                self.last_eval = Some(result);
            }
            CoordinatorMsg::ActorUnresponsive {
                actor_id,
                generation,
                silent_for,
            } => {
                if supervisor.current_generation(actor_id) == Some(generation) {
                    supervisor.replace(actor_id, &format!("no heartbeat for {:?}", silent_for));
                }
            }
            CoordinatorMsg::ActorFinished {
                actor_id,
                generation,
                reason,
            } => {
                log::debug!("actor {} generation {} finished: {:?}", actor_id, generation, reason);
            }
            CoordinatorMsg::LearnerFinished { reason } => {
                return Some(match reason {
                    FinishReason::Completed => {
                        log::info!("learner reached its step budget");
                        Ok(Termination::StepBudget)
                    }
                    FinishReason::Stopped => Ok(Termination::Stopped),
                    FinishReason::Panicked(msg) => Err(FatalError::LearnerCrash(msg)),
                });
            }
            CoordinatorMsg::LearnerFatal(fatal) => return Some(Err(fatal)),
        }
        None
    }

    /// Detect a learner thread that exited without reporting.
    fn check_learner(&mut self) -> Option<Result<Termination, FatalError>> {
        if !self.learner.as_ref().is_some_and(|l| l.is_finished()) {
            return None;
        }
        // A clean exit always reports before the thread ends.
        let reported: Vec<CoordinatorMsg> = self.coordinator.try_iter().collect();
        for msg in reported {
            match msg {
                CoordinatorMsg::LearnerFinished { reason: FinishReason::Completed } => {
                    return Some(Ok(Termination::StepBudget))
                }
                CoordinatorMsg::LearnerFinished { reason: FinishReason::Stopped } => {
                    return Some(Ok(Termination::Stopped))
                }
                CoordinatorMsg::LearnerFinished { reason: FinishReason::Panicked(msg) } => {
                    return Some(Err(FatalError::LearnerCrash(msg)))
                }
                CoordinatorMsg::LearnerFatal(fatal) => return Some(Err(fatal)),
                CoordinatorMsg::LearnerStats(stats) => self.last_learner_stats = Some(stats),
                CoordinatorMsg::EvalResult(result) => self.last_eval = Some(result),
                _ => {}
            }
        }

        let learner = self.learner.take()?;
        let reason = match learner.into_thread().join() {
            Ok(()) => "learner exited without reporting".to_string(),
            Err(payload) => match FinishReason::from_panic(payload.as_ref()) {
                FinishReason::Panicked(msg) => msg,
                other => format!("{:?}", other),
            },
        };
        Some(Err(FatalError::LearnerCrash(reason)))
    }

    /// Keep the final reports sent during shutdown.
    fn drain_reports(&mut self) {
        for msg in self.coordinator.try_iter() {
            match msg {
                CoordinatorMsg::LearnerStats(stats) => self.last_learner_stats = Some(stats),
                CoordinatorMsg::EvalResult(result) => self.last_eval = Some(result),
                _ => {}
            }
        }
    }
}

// ============================================================================
// Actor supervision
// ============================================================================

#[derive(Default)]
struct ActorSlot {
    handle: Option<ActorHandle>,
    restarts: usize,
    degraded: bool,
    /// Time and step count of the last stats report from the current generation
    last_report: Option<(Instant, u64)>,
}

/// Actor bookkeeping the monitor drives.
trait Supervise {
    fn current_generation(&self, actor_id: usize) -> Option<u64>;

    /// Store a stats report; returns steps per second since the previous one.
    fn record_stats(&mut self, stats: ActorStats) -> Option<f32>;

    /// Retire the running generation of `actor_id` and start a new one.
    fn replace(&mut self, actor_id: usize, cause: &str);
}

struct ActorSupervisor<'a, P, EF, RF> {
    config: &'a ApexConfig,
    router: &'a IoRouter<P>,
    env_factory: &'a EF,
    replica_factory: &'a RF,
    coordinator: Sender<CoordinatorMsg>,
    metrics: SharedTrainingMetrics,
    slots: Vec<ActorSlot>,
    /// Stopped generations not yet joined; hung ones may never finish
    retired: Vec<ActorHandle>,
}

impl<P, EF, RF, E, R> ActorSupervisor<'_, P, EF, RF>
where
    P: Send + Sync + 'static,
    EF: Fn(usize, u64) -> Result<E, EnvError>,
    RF: Fn(usize) -> Result<R, PolicyError>,
    E: Environment + 'static,
    R: PolicyReplica<Params = P> + 'static,
{
    /// Start `actor_id`, consuming restarts while construction fails.
    fn launch(&mut self, actor_id: usize) {
        loop {
            match self.spawn_actor(actor_id) {
                Ok(handle) => {
                    log::debug!("actor {} running as generation {}", actor_id, handle.generation());
                    self.slots[actor_id].handle = Some(handle);
                    self.slots[actor_id].last_report = None;
                    return;
                }
                Err(e) => {
                    log::error!("actor {} failed to start: {}", actor_id, e);
                    if !self.consume_restart(actor_id) {
                        return;
                    }
                }
            }
        }
    }

    fn spawn_actor(&self, actor_id: usize) -> Result<ActorHandle, String> {
        let num_actors = self.slots.len();
        let restarts = self.slots[actor_id].restarts as u64;
        // Each generation gets fresh randomness.
        let seed = self
            .config
            .actor
            .seed
            .wrapping_add(restarts.wrapping_mul(num_actors as u64));

        let env = (self.env_factory)(actor_id, seed.wrapping_add(actor_id as u64))
            .map_err(|e| format!("environment: {}", e))?;
        let replica = (self.replica_factory)(actor_id).map_err(|e| format!("policy replica: {}", e))?;

        let link = self.router.register_actor(actor_id);
        let generation = link.generation();
        let actor = Actor::new(self.config.actor.clone().with_seed(seed), actor_id, num_actors);
        actor
            .spawn(env, replica, link, self.coordinator.clone(), Arc::clone(&self.metrics))
            .map_err(|e| {
                self.router.deregister(actor_id, generation);
                format!("thread spawn: {}", e)
            })
    }

    /// Count one restart; marks the slot degraded and returns false when
    /// none are left.
    fn consume_restart(&mut self, actor_id: usize) -> bool {
        let max_restarts = self.config.orchestrator.max_restarts;
        let slot = &mut self.slots[actor_id];
        if slot.restarts >= max_restarts {
            slot.degraded = true;
            log::error!(
                "actor {} exhausted {} restarts; continuing with {} actors",
                actor_id,
                max_restarts,
                self.slots.iter().filter(|s| !s.degraded).count()
            );
            return false;
        }
        slot.restarts += 1;
        self.metrics.record_restart();
        true
    }

    /// Join finished actor threads and replace them.
    fn check_finished(&mut self) {
        for actor_id in 0..self.slots.len() {
            let finished = self.slots[actor_id]
                .handle
                .as_ref()
                .is_some_and(|h| h.is_finished());
            if !finished {
                continue;
            }
            let Some(handle) = self.slots[actor_id].handle.take() else {
                continue;
            };
            let generation = handle.generation();
            let cause = match handle.into_thread().join() {
                Ok(()) => "exited unexpectedly".to_string(),
                Err(payload) => match FinishReason::from_panic(payload.as_ref()) {
                    FinishReason::Panicked(msg) => format!("panicked: {}", msg),
                    other => format!("{:?}", other),
                },
            };
            log::warn!("actor {} generation {} {}", actor_id, generation, cause);
            self.replace(actor_id, &cause);
        }
    }

    fn reap_retired(&mut self) {
        let (finished, running): (Vec<_>, Vec<_>) =
            self.retired.drain(..).partition(|h| h.is_finished());
        self.retired = running;
        for handle in finished {
            let _ = handle.into_thread().join();
        }
    }

    fn active(&self) -> usize {
        self.slots.iter().filter(|s| s.handle.is_some()).count()
    }

    fn restarts(&self) -> Vec<usize> {
        self.slots.iter().map(|s| s.restarts).collect()
    }

    fn degraded(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.degraded)
            .map(|(id, _)| id)
            .collect()
    }

    fn stop_all(&self) {
        for handle in self.slots.iter().filter_map(|s| s.handle.as_ref()) {
            handle.stop();
        }
    }

    /// Join running and retired actors before `deadline`.
    fn join_all(&mut self, deadline: Instant) -> bool {
        let mut clean = true;
        let handles: Vec<ActorHandle> = self
            .slots
            .iter_mut()
            .filter_map(|s| s.handle.take())
            .collect();
        for handle in handles {
            let name = format!("actor {}", handle.actor_id());
            clean &= join_worker(&name, handle.into_thread(), deadline);
        }
        // Retired generations were already written off; don't count them.
        for handle in self.retired.drain(..) {
            if let JoinOutcome::Abandoned = join_until(handle.into_thread(), deadline) {
                log::debug!("retired actor thread still running at shutdown");
            }
        }
        clean
    }
}

impl<P, EF, RF, E, R> Supervise for ActorSupervisor<'_, P, EF, RF>
where
    P: Send + Sync + 'static,
    EF: Fn(usize, u64) -> Result<E, EnvError>,
    RF: Fn(usize) -> Result<R, PolicyError>,
    E: Environment + 'static,
    R: PolicyReplica<Params = P> + 'static,
{
    fn current_generation(&self, actor_id: usize) -> Option<u64> {
        self.slots
            .get(actor_id)
            .and_then(|s| s.handle.as_ref())
            .map(|h| h.generation())
    }

    fn record_stats(&mut self, stats: ActorStats) -> Option<f32> {
        if self.current_generation(stats.actor_id) != Some(stats.generation) {
            return None;
        }
        let now = Instant::now();
        let slot = &mut self.slots[stats.actor_id];
        let rate = slot.last_report.and_then(|(at, steps)| {
            let dt = now.duration_since(at).as_secs_f32();
            (dt > 0.0).then(|| stats.steps.saturating_sub(steps) as f32 / dt)
        });
        slot.last_report = Some((now, stats.steps));
        rate
    }

    fn replace(&mut self, actor_id: usize, cause: &str) {
        if let Some(handle) = self.slots[actor_id].handle.take() {
            handle.stop();
            self.retired.push(handle);
        }
        if !self.consume_restart(actor_id) {
            return;
        }
        log::warn!(
            "restarting actor {} ({}), restart {}/{}",
            actor_id,
            cause,
            self.slots[actor_id].restarts,
            self.config.orchestrator.max_restarts
        );
        self.launch(actor_id);
    }
}

//! Experience-collecting actor.
//!
//! Each actor owns one environment and one policy replica and runs on its
//! own thread:
//!
//! ```text
//! Init ──► SyncingPolicy ──► Interacting ──► Terminated
//!                 ▲               │
//!                 └── snapshot ───┘ (swap between steps, never mid-inference)
//! ```
//!
//! Transitions are buffered locally and emitted in chunks through the
//! actor's [`ActorLink`], preserving step order.

use crate::core::transition::{Action, SharedTransition, StateHistory, Transition};
use crate::environment::{EnvStep, Environment};
use crate::error::{ConfigError, PolicyError};
use crate::io::ActorLink;
use crate::messages::{ActorState, ActorStats, CoordinatorMsg, FinishReason};
use crate::metrics::SharedTrainingMetrics;
use crate::policy::{argmax, PolicyReplica};
use crate::scheduling::{actor_epsilon, ExponentialDecay, LinearSchedule, Schedule};
use crossbeam_channel::{SendTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// How an actor assigns the priority of a freshly emitted transition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum InitialPriority {
    /// Same priority for every transition.
    Constant(f32),
    /// `|r + gamma * max_a Q(s', a) * (1 - terminal) - Q(s, a)|` from the
    /// actor's own replica. Uses `fallback` when either forward pass fails.
    LocalTdError { gamma: f32, fallback: f32 },
}

impl Default for InitialPriority {
    fn default() -> Self {
        InitialPriority::LocalTdError {
            gamma: 0.95,
            fallback: 1.0,
        }
    }
}

/// Noise and discount annealed over an actor's own steps.
///
/// Rates move linearly from their `*_start` value to the target over
/// `anneal_steps` and are pushed into the environment before every reset.
/// `gamma_start`, when set, anneals the `LocalTdError` discount the same way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curriculum {
    pub p_error_start: f32,
    pub p_error: f32,
    pub p_msmt_start: f32,
    pub p_msmt: f32,
    pub gamma_start: Option<f32>,
    pub anneal_steps: usize,
}

impl Curriculum {
    /// Ramp from noiseless episodes to `(p_error, p_msmt)`.
    pub fn new(p_error: f32, p_msmt: f32, anneal_steps: usize) -> Self {
        Self {
            p_error_start: 0.0,
            p_error,
            p_msmt_start: 0.0,
            p_msmt,
            gamma_start: None,
            anneal_steps,
        }
    }

    pub fn with_start(mut self, p_error_start: f32, p_msmt_start: f32) -> Self {
        self.p_error_start = p_error_start;
        self.p_msmt_start = p_msmt_start;
        self
    }

    pub fn with_gamma_start(mut self, gamma_start: f32) -> Self {
        self.gamma_start = Some(gamma_start);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let rates = [
            ("curriculum.p_error_start", self.p_error_start),
            ("curriculum.p_error", self.p_error),
            ("curriculum.p_msmt_start", self.p_msmt_start),
            ("curriculum.p_msmt", self.p_msmt),
        ];
        let gamma = self.gamma_start.map(|g| ("curriculum.gamma_start", g));
        for (field, value) in rates.into_iter().chain(gamma) {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfRange {
                    field,
                    value: value as f64,
                    min: 0.0,
                    max: 1.0,
                });
            }
        }
        Ok(())
    }

    /// `(p_error, p_msmt)` after `step` actor steps.
    pub fn noise_at(&self, step: u64) -> (f32, f32) {
        let step = step as usize;
        let p_error = LinearSchedule::new(self.p_error_start as f64, self.p_error as f64, self.anneal_steps);
        let p_msmt = LinearSchedule::new(self.p_msmt_start as f64, self.p_msmt as f64, self.anneal_steps);
        (p_error.value(step) as f32, p_msmt.value(step) as f32)
    }

    /// Discount after `step` actor steps, ending at `gamma`.
    pub fn gamma_at(&self, gamma: f32, step: u64) -> f32 {
        match self.gamma_start {
            Some(start) => LinearSchedule::new(start as f64, gamma as f64, self.anneal_steps).value(step as usize) as f32,
            None => gamma,
        }
    }
}

/// Actor configuration, shared by every actor of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorConfig {
    /// Base exploration rate before the per-actor spread
    pub epsilon: f64,
    /// Spread exponent: actor `i` of `n` uses `epsilon^(1 + alpha * i / (n - 1))`
    pub epsilon_alpha: f64,
    /// Steps per e-fold of epsilon decay (0 disables decay)
    pub epsilon_decay_steps: f64,
    /// Floor for the decayed epsilon
    pub epsilon_min: f64,
    /// Episode truncation length
    pub max_episode_steps: usize,
    /// Transitions buffered before a chunk is sent to the router
    pub local_buffer_size: usize,
    pub initial_priority: InitialPriority,
    /// Noise curriculum (None keeps the environment's own rates)
    pub curriculum: Option<Curriculum>,
    /// Base seed. Actor `i` seeds its RNG with `seed + i`.
    pub seed: u64,
    /// Steps between `ActorStats` reports
    pub stats_interval: u64,
    /// Steps between progress log lines (0 disables)
    pub heartbeat_log_interval: u64,
    /// Poll period while waiting for the first snapshot
    pub snapshot_poll: Duration,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.4,
            epsilon_alpha: 7.0,
            epsilon_decay_steps: 0.0,
            epsilon_min: 0.0,
            max_episode_steps: 100,
            local_buffer_size: 16,
            initial_priority: InitialPriority::default(),
            curriculum: None,
            seed: 42,
            stats_interval: 1_000,
            heartbeat_log_interval: 10_000,
            snapshot_poll: Duration::from_millis(5),
        }
    }
}

impl ActorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set base epsilon and per-actor spread.
    pub fn with_epsilon(mut self, epsilon: f64, alpha: f64) -> Self {
        self.epsilon = epsilon;
        self.epsilon_alpha = alpha;
        self
    }

    /// Enable exponential epsilon decay toward `floor`.
    pub fn with_epsilon_decay(mut self, decay_steps: f64, floor: f64) -> Self {
        self.epsilon_decay_steps = decay_steps;
        self.epsilon_min = floor;
        self
    }

    pub fn with_max_episode_steps(mut self, steps: usize) -> Self {
        self.max_episode_steps = steps;
        self
    }

    pub fn with_local_buffer_size(mut self, size: usize) -> Self {
        self.local_buffer_size = size;
        self
    }

    pub fn with_initial_priority(mut self, strategy: InitialPriority) -> Self {
        self.initial_priority = strategy;
        self
    }

    pub fn with_curriculum(mut self, curriculum: Curriculum) -> Self {
        self.curriculum = Some(curriculum);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set stats report and progress log cadence, in actor steps.
    pub fn with_reporting(mut self, stats_interval: u64, heartbeat_log_interval: u64) -> Self {
        self.stats_interval = stats_interval;
        self.heartbeat_log_interval = heartbeat_log_interval;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("max_episode_steps", self.max_episode_steps),
            ("local_buffer_size", self.local_buffer_size),
            ("stats_interval", self.stats_interval as usize),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidCount { field, value });
            }
        }
        for (field, value) in [("epsilon", self.epsilon), ("epsilon_min", self.epsilon_min)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfRange {
                    field,
                    value,
                    min: 0.0,
                    max: 1.0,
                });
            }
        }
        if !(self.epsilon_alpha.is_finite() && self.epsilon_alpha >= 0.0) {
            return Err(ConfigError::OutOfRange {
                field: "epsilon_alpha",
                value: self.epsilon_alpha,
                min: 0.0,
                max: f64::INFINITY,
            });
        }
        if !(self.epsilon_decay_steps.is_finite() && self.epsilon_decay_steps >= 0.0) {
            return Err(ConfigError::OutOfRange {
                field: "epsilon_decay_steps",
                value: self.epsilon_decay_steps,
                min: 0.0,
                max: f64::INFINITY,
            });
        }
        if let Some(curriculum) = &self.curriculum {
            curriculum.validate()?;
        }
        match self.initial_priority {
            InitialPriority::Constant(p) if !(p.is_finite() && p > 0.0) => {
                Err(ConfigError::OutOfRange {
                    field: "initial_priority",
                    value: p as f64,
                    min: f64::MIN_POSITIVE,
                    max: f64::INFINITY,
                })
            }
            InitialPriority::LocalTdError { gamma, fallback } => {
                if !(0.0..=1.0).contains(&gamma) {
                    return Err(ConfigError::OutOfRange {
                        field: "initial_priority.gamma",
                        value: gamma as f64,
                        min: 0.0,
                        max: 1.0,
                    });
                }
                if !(fallback.is_finite() && fallback > 0.0) {
                    return Err(ConfigError::OutOfRange {
                        field: "initial_priority.fallback",
                        value: fallback as f64,
                        min: f64::MIN_POSITIVE,
                        max: f64::INFINITY,
                    });
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Handle for a spawned actor thread.
pub struct ActorHandle {
    actor_id: usize,
    generation: u64,
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl ActorHandle {
    pub fn actor_id(&self) -> usize {
        self.actor_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Ask the actor to exit after its in-flight step.
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

/// Actor factory: configuration plus its slot in the run.
pub struct Actor {
    config: ActorConfig,
    actor_id: usize,
    num_actors: usize,
}

impl Actor {
    pub fn new(config: ActorConfig, actor_id: usize, num_actors: usize) -> Self {
        Self {
            config,
            actor_id,
            num_actors,
        }
    }

    /// Base exploration rate for this actor before decay.
    pub fn base_epsilon(&self) -> f64 {
        actor_epsilon(
            self.config.epsilon,
            self.config.epsilon_alpha,
            self.actor_id,
            self.num_actors,
        )
    }

    /// Spawn the actor thread.
    ///
    /// The actor runs until `stop` is set or the router disconnects its
    /// link. Environment and policy failures are absorbed inside the loop.
    pub fn spawn<E, R>(
        self,
        env: E,
        replica: R,
        link: ActorLink<R::Params>,
        coordinator: Sender<CoordinatorMsg>,
        metrics: SharedTrainingMetrics,
    ) -> io::Result<ActorHandle>
    where
        E: Environment + 'static,
        R: PolicyReplica + 'static,
    {
        let actor_id = self.actor_id;
        let generation = link.generation();
        let stop = Arc::new(AtomicBool::new(false));

        let epsilon = ExponentialDecay::new(
            self.base_epsilon(),
            self.config.epsilon_decay_steps,
            self.config.epsilon_min,
        );
        let worker = ActorWorker {
            rng: fastrand::Rng::with_seed(self.config.seed.wrapping_add(actor_id as u64)),
            local: Vec::with_capacity(self.config.local_buffer_size),
            stats: ActorStats::new(actor_id, generation),
            config: self.config,
            epsilon,
            env,
            replica,
            link,
            coordinator,
            metrics,
            stop: Arc::clone(&stop),
        };

        let thread = std::thread::Builder::new()
            .name(format!("actor-{}-g{}", actor_id, generation))
            .spawn(move || worker.run())?;

        Ok(ActorHandle {
            actor_id,
            generation,
            stop,
            thread,
        })
    }
}

// ============================================================================
// Worker loop
// ============================================================================

/// Outcome of emitting the local buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Emit {
    Delivered,
    Stopped,
    Disconnected,
}

struct Episode {
    state: StateHistory,
    reward: f32,
    steps: usize,
}

struct ActorWorker<E, R: PolicyReplica> {
    config: ActorConfig,
    epsilon: ExponentialDecay,
    env: E,
    replica: R,
    link: ActorLink<R::Params>,
    coordinator: Sender<CoordinatorMsg>,
    metrics: SharedTrainingMetrics,
    stop: Arc<AtomicBool>,
    rng: fastrand::Rng,
    local: Vec<SharedTransition>,
    stats: ActorStats,
}

impl<E: Environment, R: PolicyReplica> ActorWorker<E, R> {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn run(mut self) {
        let actor_id = self.stats.actor_id;
        log::debug!(
            "actor {} (generation {}) starting, base epsilon {:.4}",
            actor_id,
            self.stats.generation,
            self.epsilon.value(0)
        );
        self.link.heartbeat();

        self.stats.state = ActorState::SyncingPolicy;
        if self.wait_for_first_snapshot() {
            self.stats.state = ActorState::Interacting;
            self.interact();
        }

        self.stats.state = ActorState::Terminated;
        self.report();
        let _ = self.coordinator.try_send(CoordinatorMsg::ActorFinished {
            actor_id,
            generation: self.stats.generation,
            reason: FinishReason::Stopped,
        });
        log::debug!(
            "actor {} exiting after {} steps, {} episodes",
            actor_id,
            self.stats.steps,
            self.stats.episodes
        );
    }

    /// Block (while heartbeating) until a snapshot has been loaded.
    fn wait_for_first_snapshot(&mut self) -> bool {
        while !self.stopped() {
            self.link.heartbeat();
            if self.swap_snapshot() {
                return true;
            }
            std::thread::sleep(self.config.snapshot_poll);
        }
        false
    }

    /// Swap in the pending snapshot, if any. Returns `true` on a successful load.
    fn swap_snapshot(&mut self) -> bool {
        let Some(snapshot) = self.link.take_snapshot() else {
            return false;
        };
        match self.replica.load(snapshot.params()) {
            Ok(()) => {
                self.stats.policy_version = snapshot.version();
                self.stats.snapshot_swaps += 1;
                self.link.acknowledge(snapshot.version());
                true
            }
            Err(e) => {
                self.stats.policy_errors += 1;
                log::warn!(
                    "actor {}: keeping policy v{} after failed load of v{}: {}",
                    self.stats.actor_id,
                    self.stats.policy_version,
                    snapshot.version(),
                    e
                );
                false
            }
        }
    }

    fn interact(&mut self) {
        let Some(mut episode) = self.start_episode() else {
            return;
        };

        while !self.stopped() {
            self.link.heartbeat();
            self.swap_snapshot();

            let epsilon = self.epsilon.value(self.stats.steps as usize);
            self.stats.epsilon = epsilon as f32;
            let values = self.action_values(&episode.state);
            let action = self.select_action(values.as_deref(), epsilon);

            let step = match self.env.step(action) {
                Ok(step) => step,
                Err(e) => {
                    self.stats.env_errors += 1;
                    log::warn!(
                        "actor {}: aborting episode after {} steps: {}",
                        self.stats.actor_id,
                        episode.steps,
                        e
                    );
                    if !self.end_episode(episode.reward) {
                        return;
                    }
                    match self.start_episode() {
                        Some(next) => {
                            episode = next;
                            continue;
                        }
                        None => return,
                    }
                }
            };

            self.stats.add_steps(1);
            self.metrics.add_env_steps(1);
            episode.reward += step.reward;
            episode.steps += 1;

            let priority = self.initial_priority(values.as_deref(), action, &step);
            let EnvStep {
                next_state,
                reward,
                terminal,
                ..
            } = step;
            let transition = Transition::new(
                episode.state.clone(),
                action,
                reward,
                next_state.clone(),
                terminal,
                priority,
                self.stats.actor_id,
                self.stats.steps,
            )
            .with_policy_version(self.stats.policy_version);
            self.local.push(transition.into_shared());

            if self.local.len() >= self.config.local_buffer_size && self.emit() != Emit::Delivered {
                return;
            }

            self.maybe_report();

            if terminal || episode.steps >= self.config.max_episode_steps {
                if !self.end_episode(episode.reward) {
                    return;
                }
                match self.start_episode() {
                    Some(next) => episode = next,
                    None => return,
                }
            } else {
                episode.state = next_state;
            }
        }
    }

    /// Reset the environment, retrying through errors until it succeeds or
    /// the actor is stopped.
    fn start_episode(&mut self) -> Option<Episode> {
        self.apply_curriculum();
        while !self.stopped() {
            self.link.heartbeat();
            match self.env.reset() {
                Ok(state) => {
                    return Some(Episode {
                        state,
                        reward: 0.0,
                        steps: 0,
                    })
                }
                Err(e) => {
                    self.stats.env_errors += 1;
                    log::warn!("actor {}: environment reset failed: {}", self.stats.actor_id, e);
                    std::thread::sleep(self.config.snapshot_poll);
                }
            }
        }
        None
    }

    /// Push the curriculum's current noise levels into the environment.
    fn apply_curriculum(&mut self) {
        let Some(curriculum) = &self.config.curriculum else {
            return;
        };
        let (p_error, p_msmt) = curriculum.noise_at(self.stats.steps);
        match self.env.set_noise(p_error, p_msmt) {
            Ok(()) => {
                self.stats.p_error = p_error;
                self.stats.p_msmt = p_msmt;
            }
            Err(e) => {
                self.stats.env_errors += 1;
                log::warn!(
                    "actor {}: keeping previous noise levels, update to ({:.4}, {:.4}) failed: {}",
                    self.stats.actor_id,
                    p_error,
                    p_msmt,
                    e
                );
            }
        }
    }

    /// Record a finished episode and emit what is buffered.
    /// Returns `false` if the actor should exit.
    fn end_episode(&mut self, reward: f32) -> bool {
        self.stats.record_episode(reward);
        self.metrics.record_episode(reward);
        self.emit() == Emit::Delivered
    }

    fn action_values(&mut self, state: &StateHistory) -> Option<Vec<f32>> {
        let n_actions = self.env.n_actions();
        let result = self.replica.action_values(state).and_then(|values| {
            if values.len() == n_actions {
                Ok(values)
            } else {
                Err(PolicyError::ShapeMismatch {
                    expected: n_actions,
                    actual: values.len(),
                })
            }
        });
        match result {
            Ok(values) => Some(values),
            Err(e) => {
                self.stats.policy_errors += 1;
                log::debug!("actor {}: inference failed, acting randomly: {}", self.stats.actor_id, e);
                None
            }
        }
    }

    /// Epsilon-greedy over `values`; uniform when values are unavailable.
    fn select_action(&mut self, values: Option<&[f32]>, epsilon: f64) -> Action {
        let n_actions = self.env.n_actions().max(1) as u32;
        let greedy = values.and_then(argmax);
        match greedy {
            Some(best) if self.rng.f64() >= epsilon => best as Action,
            _ => self.rng.u32(0..n_actions),
        }
    }

    fn initial_priority(&mut self, values: Option<&[f32]>, action: Action, step: &EnvStep) -> f32 {
        match self.config.initial_priority {
            InitialPriority::Constant(p) => p,
            InitialPriority::LocalTdError { gamma, fallback } => {
                let gamma = match &self.config.curriculum {
                    Some(curriculum) => curriculum.gamma_at(gamma, self.stats.steps),
                    None => gamma,
                };
                let Some(q_sa) = values.and_then(|v| v.get(action as usize).copied()) else {
                    return fallback;
                };
                let bootstrap = if step.terminal {
                    0.0
                } else {
                    match self.replica.action_values(&step.next_state) {
                        Ok(next) => next.iter().copied().fold(f32::NEG_INFINITY, f32::max),
                        Err(_) => return fallback,
                    }
                };
                let td = (step.reward + gamma * bootstrap - q_sa).abs();
                if td.is_finite() {
                    td
                } else {
                    fallback
                }
            }
        }
    }

    /// Send the local buffer in order, retrying on timeout until stopped.
    fn emit(&mut self) -> Emit {
        let mut sent = 0u64;
        let mut outcome = Emit::Delivered;
        for transition in self.local.drain(..) {
            let mut pending = transition;
            loop {
                match self.link.send(pending) {
                    Ok(()) => {
                        sent += 1;
                        break;
                    }
                    Err(SendTimeoutError::Timeout(t)) => {
                        if self.stop.load(Ordering::Acquire) {
                            outcome = Emit::Stopped;
                            break;
                        }
                        pending = t;
                    }
                    Err(SendTimeoutError::Disconnected(_)) => {
                        outcome = Emit::Disconnected;
                        break;
                    }
                }
            }
            if outcome != Emit::Delivered {
                break;
            }
        }

        self.stats.transitions_sent += sent;
        self.metrics.add_generated(sent);
        if outcome == Emit::Disconnected {
            log::warn!(
                "actor {} (generation {}): router link closed, exiting",
                self.stats.actor_id,
                self.stats.generation
            );
        }
        outcome
    }

    fn maybe_report(&mut self) {
        let steps = self.stats.steps;
        if steps % self.config.stats_interval == 0 {
            self.report();
        }
        let interval = self.config.heartbeat_log_interval;
        if interval > 0 && steps % interval == 0 {
            log::info!(
                "actor {}: {} steps, {} episodes, avg reward {:.3}, epsilon {:.4}, policy v{}",
                self.stats.actor_id,
                steps,
                self.stats.episodes,
                self.stats.avg_episode_reward,
                self.stats.epsilon,
                self.stats.policy_version
            );
        }
    }

    fn report(&self) {
        let _ = self
            .coordinator
            .try_send(CoordinatorMsg::ActorStats(self.stats.clone()));
    }
}

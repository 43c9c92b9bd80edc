//! End-to-end runs of the orchestrator with real threads and mock
//! environments and policies.
//!
//! # Test Categories
//!
//! 1. **Budgets**: step budget, time budget, external stop
//! 2. **Supervision**: hung actors, crashing actors, failed construction
//! 3. **Fatal conditions**: numeric divergence, learner panic, all actors lost
//!
//! Runs are short; every test has a wall-clock budget so a deadlock
//! surfaces as a failure rather than a hang.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::actors::ActorConfig;
use crate::buffers::ReplayConfig;
use crate::core::transition::{Action, StateHistory};
use crate::environment::{EnvStep, Environment, StepInfo};
use crate::error::{EnvError, FatalError, PolicyError, RunError};
use crate::io::RouterConfig;
use crate::learner::LearnerConfig;
use crate::metrics::{NullSink, SharedSink};
use crate::policy::{PolicyReplica, TrainOutput, TrainablePolicy, TrainingBatch};
use crate::runners::{ApexConfig, Orchestrator, OrchestratorConfig, RunSummary, Termination};

// =============================================================================
// MOCK COLLABORATORS
// =============================================================================

/// Two-action environment; action 1 solves the episode after five steps.
///
/// Optionally hangs inside `step` until `release` is set, or panics.
struct LoopEnv {
    t: usize,
    steps: Arc<AtomicUsize>,
    hang_at: Option<usize>,
    release: Arc<AtomicBool>,
    panic_on_step: bool,
}

impl LoopEnv {
    fn new(steps: Arc<AtomicUsize>) -> Self {
        Self {
            t: 0,
            steps,
            hang_at: None,
            release: Arc::new(AtomicBool::new(true)),
            panic_on_step: false,
        }
    }

    fn hanging_at(mut self, step: usize, release: Arc<AtomicBool>) -> Self {
        self.hang_at = Some(step);
        self.release = release;
        self
    }

    fn panicking(mut self) -> Self {
        self.panic_on_step = true;
        self
    }
}

impl Environment for LoopEnv {
    fn reset(&mut self) -> Result<StateHistory, EnvError> {
        self.t = 0;
        Ok(StateHistory::zeros(1, 2))
    }

    fn step(&mut self, action: Action) -> Result<EnvStep, EnvError> {
        if self.panic_on_step {
            panic!("environment crashed");
        }
        let total = self.steps.fetch_add(1, Ordering::SeqCst) + 1;
        if self.hang_at == Some(total) {
            while !self.release.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(5));
            }
        }
        self.t += 1;
        let solved = action == 1 && self.t >= 5;
        Ok(EnvStep {
            next_state: StateHistory::new(vec![self.t as f32, 0.0], 1, 2).unwrap(),
            reward: if solved { 1.0 } else { -0.1 },
            terminal: solved,
            info: StepInfo { success: solved },
        })
    }

    fn n_actions(&self) -> usize {
        2
    }
}

/// Inference replica returning the loaded parameters as action values.
#[derive(Default)]
struct EchoReplica {
    values: Vec<f32>,
}

impl PolicyReplica for EchoReplica {
    type Params = Vec<f32>;

    fn load(&mut self, params: &Vec<f32>) -> Result<(), PolicyError> {
        self.values = params.clone();
        Ok(())
    }

    fn action_values(&self, _state: &StateHistory) -> Result<Vec<f32>, PolicyError> {
        Ok(self.values.clone())
    }
}

/// Learner policy with a constant loss, optionally NaN or panicking.
struct ConstPolicy {
    loss: f32,
    panic_at: Option<usize>,
    calls: usize,
}

impl ConstPolicy {
    fn new() -> Self {
        Self {
            loss: 0.25,
            panic_at: None,
            calls: 0,
        }
    }

    fn with_loss(mut self, loss: f32) -> Self {
        self.loss = loss;
        self
    }

    fn panicking_at(mut self, call: usize) -> Self {
        self.panic_at = Some(call);
        self
    }
}

impl TrainablePolicy for ConstPolicy {
    type Params = Vec<f32>;

    fn train_step(&mut self, batch: &TrainingBatch) -> Result<TrainOutput, PolicyError> {
        self.calls += 1;
        if self.panic_at == Some(self.calls) {
            panic!("boom at call {}", self.calls);
        }
        Ok(TrainOutput {
            loss: self.loss,
            td_errors: vec![0.5; batch.len()],
        })
    }

    fn sync_target(&mut self) {}

    fn export(&self) -> Result<Vec<f32>, PolicyError> {
        Ok(vec![0.0, 1.0])
    }

    fn action_values(&self, _state: &StateHistory) -> Result<Vec<f32>, PolicyError> {
        Ok(vec![0.0, 1.0])
    }
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

fn fast_config(num_actors: usize) -> ApexConfig {
    ApexConfig::new()
        .with_replay(ReplayConfig::new().with_capacity(10_000).with_min_size(8).with_seed(5))
        .with_router(
            RouterConfig::new()
                .with_flush(4, Duration::from_millis(5))
                .with_heartbeat_timeout(Duration::from_millis(200))
                .with_send_timeout(Duration::from_millis(5)),
        )
        .with_actor(
            ActorConfig::new()
                .with_epsilon(0.2, 0.0)
                .with_local_buffer_size(4)
                .with_max_episode_steps(20)
                .with_reporting(50, 0),
        )
        .with_learner(
            LearnerConfig::new()
                .with_batch_size(4)
                .with_intervals(20, 5)
                .with_eval(0, 0)
                .with_stats_freq(10)
                .with_empty_buffer_backoff(Duration::from_millis(1)),
        )
        .with_orchestrator(
            OrchestratorConfig::new()
                .with_num_actors(num_actors)
                .with_max_restarts(3)
                .with_monitor_interval(Duration::from_millis(10))
                .with_log_interval(Duration::from_millis(50))
                .with_grace_period(Duration::from_secs(2)),
        )
}

fn quiet(config: ApexConfig) -> Orchestrator {
    let sink: SharedSink = Arc::new(NullSink);
    Orchestrator::new(config).with_sink(sink)
}

/// Run with plain environments and a healthy policy.
fn run_plain(orchestrator: &Orchestrator, policy: ConstPolicy) -> Result<RunSummary, RunError> {
    let steps = Arc::new(AtomicUsize::new(0));
    orchestrator.run(
        move |_, _| Ok(LoopEnv::new(Arc::clone(&steps))),
        |_| Ok(EchoReplica::default()),
        policy,
        |_| {},
    )
}

fn expect_fatal(result: Result<RunSummary, RunError>) -> FatalError {
    match result {
        Err(RunError::Fatal(e)) => e,
        other => panic!("expected a fatal error, got {:?}", other.map(|s| s.termination)),
    }
}

// =============================================================================
// BUDGETS
// =============================================================================

#[test]
fn test_step_budget_ends_run_cleanly() {
    let config = fast_config(2)
        .with_orchestrator(fast_config(2).orchestrator.with_max_learner_steps(60).with_max_duration(Duration::from_secs(30)));
    let orchestrator = quiet(config);

    let summary = run_plain(&orchestrator, ConstPolicy::new()).unwrap();

    assert_eq!(summary.termination, Termination::StepBudget);
    assert_eq!(summary.learner_steps, 60);
    assert!(summary.transitions_inserted >= 8, "replay must have reached min_size");
    assert!(summary.transitions_generated >= summary.transitions_inserted);
    // Initial broadcast plus one every 5 steps.
    assert!(summary.policy_version >= 12, "version {}", summary.policy_version);
    assert_eq!(summary.actor_restarts, vec![0, 0]);
    assert!(summary.degraded_actors.is_empty());
    assert!(summary.clean_shutdown);
    assert!(summary.last_learner_stats.is_some());
}

#[test]
fn test_time_budget_ends_run() {
    let config = fast_config(1)
        .with_orchestrator(fast_config(1).orchestrator.with_max_duration(Duration::from_millis(300)));
    let orchestrator = quiet(config);

    let summary = run_plain(&orchestrator, ConstPolicy::new()).unwrap();

    assert_eq!(summary.termination, Termination::TimeBudget);
    assert!(summary.elapsed >= Duration::from_millis(300));
    assert!(summary.env_steps > 0);
}

#[test]
fn test_stop_handle_ends_run() {
    let config = fast_config(2)
        .with_orchestrator(fast_config(2).orchestrator.with_max_duration(Duration::from_secs(30)));
    let orchestrator = quiet(config);
    let stop = orchestrator.stop_handle();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        stop.stop();
    });

    let summary = run_plain(&orchestrator, ConstPolicy::new()).unwrap();
    stopper.join().unwrap();

    assert_eq!(summary.termination, Termination::Stopped);
    assert!(summary.elapsed < Duration::from_secs(10));
    assert!(summary.clean_shutdown);
}

#[test]
fn test_progress_callback_and_evaluation() {
    let config = fast_config(2)
        .with_learner(fast_config(2).learner.with_eval(20, 2))
        .with_orchestrator(
            fast_config(2)
                .orchestrator
                .with_max_learner_steps(100)
                .with_max_duration(Duration::from_secs(30)),
        );
    let orchestrator = quiet(config);
    let steps = Arc::new(AtomicUsize::new(0));
    let eval_slots = Arc::new(AtomicUsize::new(0));
    let progress = Arc::new(AtomicUsize::new(0));

    let eval_slots_in = Arc::clone(&eval_slots);
    let progress_in = Arc::clone(&progress);
    let summary = orchestrator
        .run(
            move |slot, _| {
                if slot == 2 {
                    eval_slots_in.fetch_add(1, Ordering::SeqCst);
                }
                Ok(LoopEnv::new(Arc::clone(&steps)))
            },
            |_| Ok(EchoReplica::default()),
            ConstPolicy::new(),
            move |p| {
                assert!(p.active_actors <= 2);
                progress_in.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();

    assert_eq!(summary.termination, Termination::StepBudget);
    assert_eq!(eval_slots.load(Ordering::SeqCst), 1, "one dedicated evaluation env");
    let eval = summary.last_eval.expect("evaluation ran");
    assert_eq!(eval.step % 20, 0);
    assert_eq!(eval.n_episodes, 2);
    // Greedy play picks action 1 and solves in five steps.
    assert_eq!(eval.success_rate, 1.0);
    assert!(progress.load(Ordering::SeqCst) >= 1 || summary.elapsed < Duration::from_millis(50));
}

// =============================================================================
// SUPERVISION
// =============================================================================

#[test]
fn test_hung_actor_is_replaced() {
    let config = fast_config(2)
        .with_orchestrator(fast_config(2).orchestrator.with_max_duration(Duration::from_millis(1500)));
    let orchestrator = quiet(config);
    let metrics = orchestrator.metrics();

    let release = Arc::new(AtomicBool::new(false));
    let actor0_envs = Arc::new(AtomicUsize::new(0));
    let replacement_steps = Arc::new(AtomicUsize::new(0));
    let inserted_at_restart = Arc::new(AtomicUsize::new(usize::MAX));

    let release_env = Arc::clone(&release);
    let envs = Arc::clone(&actor0_envs);
    let replacement = Arc::clone(&replacement_steps);
    let release_cb = Arc::clone(&release);
    let marker = Arc::clone(&inserted_at_restart);
    let metrics_cb = Arc::clone(&metrics);

    let summary = orchestrator
        .run(
            move |slot, _| {
                if slot != 0 {
                    return Ok(LoopEnv::new(Arc::new(AtomicUsize::new(0))));
                }
                match envs.fetch_add(1, Ordering::SeqCst) {
                    0 => Ok(LoopEnv::new(Arc::new(AtomicUsize::new(0))).hanging_at(30, Arc::clone(&release_env))),
                    _ => Ok(LoopEnv::new(Arc::clone(&replacement))),
                }
            },
            |_| Ok(EchoReplica::default()),
            ConstPolicy::new(),
            move |p| {
                if metrics_cb.actor_restarts() >= 1 && !release_cb.swap(true, Ordering::SeqCst) {
                    marker.store(p.transitions_inserted as usize, Ordering::SeqCst);
                }
            },
        )
        .unwrap();
    release.store(true, Ordering::SeqCst);

    assert_eq!(summary.termination, Termination::TimeBudget);
    assert_eq!(summary.actor_restarts, vec![1, 0]);
    assert!(summary.degraded_actors.is_empty());
    assert_eq!(actor0_envs.load(Ordering::SeqCst), 2);
    assert!(replacement_steps.load(Ordering::SeqCst) > 0, "replacement actor must run");

    let at_restart = inserted_at_restart.load(Ordering::SeqCst);
    assert_ne!(at_restart, usize::MAX, "restart observed from the progress callback");
    assert!(summary.transitions_inserted as usize > at_restart);
}

#[test]
fn test_crashing_actor_degrades_after_restarts() {
    let config = fast_config(2).with_orchestrator(
        fast_config(2)
            .orchestrator
            .with_max_restarts(2)
            .with_max_duration(Duration::from_millis(800)),
    );
    let orchestrator = quiet(config);
    let created = Arc::new(AtomicUsize::new(0));
    let created_in = Arc::clone(&created);

    let summary = orchestrator
        .run(
            move |slot, _| {
                let env = LoopEnv::new(Arc::new(AtomicUsize::new(0)));
                if slot == 0 {
                    created_in.fetch_add(1, Ordering::SeqCst);
                    Ok(env.panicking())
                } else {
                    Ok(env)
                }
            },
            |_| Ok(EchoReplica::default()),
            ConstPolicy::new(),
            |_| {},
        )
        .unwrap();

    assert_eq!(summary.termination, Termination::TimeBudget);
    assert_eq!(summary.actor_restarts, vec![2, 0]);
    assert_eq!(summary.degraded_actors, vec![0]);
    // First launch plus two restarts.
    assert_eq!(created.load(Ordering::SeqCst), 3);
    assert!(summary.env_steps > 0, "surviving actor keeps collecting");
}

#[test]
fn test_env_construction_failure_uses_restart_budget() {
    let config = fast_config(2).with_orchestrator(
        fast_config(2)
            .orchestrator
            .with_max_restarts(2)
            .with_max_duration(Duration::from_millis(300)),
    );
    let orchestrator = quiet(config);
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_in = Arc::clone(&attempts);

    let summary = orchestrator
        .run(
            move |slot, _| {
                if slot == 1 {
                    attempts_in.fetch_add(1, Ordering::SeqCst);
                    return Err(EnvError::Reset("no device".into()));
                }
                Ok(LoopEnv::new(Arc::new(AtomicUsize::new(0))))
            },
            |_| Ok(EchoReplica::default()),
            ConstPolicy::new(),
            |_| {},
        )
        .unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(summary.actor_restarts, vec![0, 2]);
    assert_eq!(summary.degraded_actors, vec![1]);
}

#[test]
fn test_distinct_seeds_per_actor_and_generation() {
    let config = fast_config(2).with_orchestrator(
        fast_config(2)
            .orchestrator
            .with_max_restarts(1)
            .with_max_duration(Duration::from_millis(400)),
    );
    let orchestrator = quiet(config);
    let seeds = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let seeds_in = Arc::clone(&seeds);

    orchestrator
        .run(
            move |slot, seed| {
                seeds_in.lock().push((slot, seed));
                let env = LoopEnv::new(Arc::new(AtomicUsize::new(0)));
                // Slot 0 crashes once so it is relaunched under a new generation.
                if slot == 0 && seeds_in.lock().iter().filter(|(s, _)| *s == 0).count() == 1 {
                    Ok(env.panicking())
                } else {
                    Ok(env)
                }
            },
            |_| Ok(EchoReplica::default()),
            ConstPolicy::new(),
            |_| {},
        )
        .unwrap();

    let seeds = seeds.lock().clone();
    assert_eq!(seeds.len(), 3);
    let mut unique: Vec<u64> = seeds.iter().map(|(_, s)| *s).collect();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), 3, "seeds {:?}", seeds);
}

// =============================================================================
// FATAL CONDITIONS
// =============================================================================

#[test]
fn test_all_actors_lost_is_fatal() {
    let config = fast_config(1).with_orchestrator(
        fast_config(1)
            .orchestrator
            .with_max_restarts(1)
            .with_max_duration(Duration::from_secs(30)),
    );
    let orchestrator = quiet(config);

    let result = orchestrator.run(
        |_, _| Ok(LoopEnv::new(Arc::new(AtomicUsize::new(0))).panicking()),
        |_| Ok(EchoReplica::default()),
        ConstPolicy::new(),
        |_| {},
    );

    assert_eq!(expect_fatal(result), FatalError::AllActorsLost { num_actors: 1 });
}

#[test]
fn test_numeric_divergence_halts_run() {
    let config = fast_config(2)
        .with_learner(fast_config(2).learner.with_max_consecutive_nan(3))
        .with_orchestrator(fast_config(2).orchestrator.with_max_duration(Duration::from_secs(30)));
    let orchestrator = quiet(config);

    let fatal = expect_fatal(run_plain(&orchestrator, ConstPolicy::new().with_loss(f32::NAN)));

    match fatal {
        FatalError::NumericDivergence { consecutive, .. } => assert_eq!(consecutive, 3),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_learner_panic_halts_run() {
    let config = fast_config(1)
        .with_orchestrator(fast_config(1).orchestrator.with_max_duration(Duration::from_secs(30)));
    let orchestrator = quiet(config);

    let fatal = expect_fatal(run_plain(&orchestrator, ConstPolicy::new().panicking_at(3)));

    match fatal {
        FatalError::LearnerCrash(msg) => assert!(msg.contains("boom at call 3"), "{}", msg),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_invalid_config_rejected_before_start() {
    let config = fast_config(1).with_replay(ReplayConfig::new().with_capacity(100).with_min_size(2));
    let orchestrator = quiet(config);
    let built = Arc::new(AtomicUsize::new(0));
    let built_in = Arc::clone(&built);

    let result = orchestrator.run(
        move |_, _| {
            built_in.fetch_add(1, Ordering::SeqCst);
            Ok(LoopEnv::new(Arc::new(AtomicUsize::new(0))))
        },
        |_| Ok(EchoReplica::default()),
        ConstPolicy::new(),
        |_| {},
    );

    assert!(matches!(result, Err(RunError::Config(_))));
    assert_eq!(built.load(Ordering::SeqCst), 0);
}

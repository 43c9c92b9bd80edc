//! Surface-code decoder training.
//!
//! Runs the full actor–learner pipeline on CPU with the NdArray backend:
//! - N actor threads, each with its own surface-code environment
//! - 1 learner thread training a Q-network from prioritized replay
//! - snapshot broadcast as `BinBytesRecorder` bytes
//!
//! ```bash
//! # Distance-5 code, default budget
//! RUST_LOG=info cargo run --release --bin train_decoder
//!
//! # Short smoke run on a distance-3 code
//! RUST_LOG=info cargo run --release --bin train_decoder -- smoke
//! ```

use std::time::Duration;

use apex_decoder::actors::{ActorConfig, Curriculum};
use apex_decoder::buffers::ReplayConfig;
use apex_decoder::io::RouterConfig;
use apex_decoder::learner::LearnerConfig;
use apex_decoder::policy::{clipped_adam, BurnLearnerPolicy, BurnReplica, QNetworkConfig, DEFAULT_GRAD_CLIP};
use apex_decoder::runners::{ApexConfig, Orchestrator, OrchestratorConfig};
use apex_decoder::{Environment, RunError, SurfaceCodeEnvironment};
use burn::backend::ndarray::{NdArray, NdArrayDevice};
use burn::backend::Autodiff;
use surface_code_env::SurfaceCodeConfig;

type Inner = NdArray;
type B = Autodiff<Inner>;

/// Budget and sizes for one named preset.
struct Preset {
    distance: usize,
    num_actors: usize,
    learner_steps: usize,
    max_duration: Duration,
    replay_capacity: usize,
    min_size: usize,
    /// Actor steps over which noise ramps up to the target rates
    curriculum_steps: usize,
}

impl Preset {
    fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            Some("smoke") => Self {
                distance: 3,
                num_actors: 2,
                learner_steps: 500,
                max_duration: Duration::from_secs(120),
                replay_capacity: 10_000,
                min_size: 256,
                curriculum_steps: 2_000,
            },
            _ => Self {
                distance: 5,
                num_actors: 8,
                learner_steps: 200_000,
                max_duration: Duration::from_secs(6 * 3600),
                replay_capacity: 200_000,
                min_size: 5_000,
                curriculum_steps: 500_000,
            },
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let preset = Preset::from_arg(args.get(1).map(String::as_str));

    if let Err(e) = run(preset) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(preset: Preset) -> Result<(), RunError> {
    let env_config = SurfaceCodeConfig::new()
        .with_distance(preset.distance)
        .with_stack_depth(4)
        .with_p_error(0.01)
        .with_p_msmt(0.01);

    // Build one environment for the network shape.
    let sizing_env = SurfaceCodeEnvironment::new(env_config.clone(), 0).map_err(|e| {
        RunError::Fatal(apex_decoder::FatalError::LearnerCrash(format!("environment setup: {}", e)))
    })?;
    let net_config = QNetworkConfig::new(sizing_env.stack_depth() * sizing_env.frame_len(), sizing_env.n_actions())
        .with_hidden_size(256);

    let learner_config = LearnerConfig::new()
        .with_batch_size(64)
        .with_gamma(0.95)
        .with_learning_rate(1e-4)
        .with_intervals(1_000, 50)
        .with_eval(5_000, 20);

    let config = ApexConfig::new()
        .with_replay(
            ReplayConfig::new()
                .with_capacity(preset.replay_capacity)
                .with_min_size(preset.min_size)
                .with_alpha(0.6)
                .with_beta(0.4),
        )
        .with_router(RouterConfig::new())
        .with_actor(
            ActorConfig::new()
                .with_epsilon(0.4, 7.0)
                .with_max_episode_steps(4 * preset.distance * preset.distance)
                .with_curriculum(
                    Curriculum::new(env_config.p_error, env_config.p_msmt, preset.curriculum_steps)
                        .with_start(0.001, 0.001)
                        .with_gamma_start(0.75),
                ),
        )
        .with_learner(learner_config.clone())
        .with_orchestrator(
            OrchestratorConfig::new()
                .with_num_actors(preset.num_actors)
                .with_max_learner_steps(preset.learner_steps)
                .with_max_duration(preset.max_duration),
        );

    log::info!(
        "distance {} | {} actors | state {} | actions {} | replay {}",
        preset.distance,
        preset.num_actors,
        net_config.state_len,
        net_config.n_actions,
        preset.replay_capacity
    );

    let device = NdArrayDevice::default();
    let learner_policy = BurnLearnerPolicy::<B, _>::new(
        net_config.clone(),
        clipped_adam::<B>(DEFAULT_GRAD_CLIP),
        learner_config.learning_rate,
        device,
    );

    let orchestrator = Orchestrator::new(config);
    let summary = orchestrator.run(
        |_slot, seed| SurfaceCodeEnvironment::new(env_config.clone(), seed),
        |_actor_id| Ok(BurnReplica::<Inner>::new(net_config.clone(), device)),
        learner_policy,
        |progress| {
            log::info!(
                "Steps: {:>7} | Env steps: {:>9} | Replay: {:>7} | Version: {:>5} | Actors: {} | Reward: {:>7.2} | Eval: {:.3}",
                progress.learner_steps,
                progress.env_steps,
                progress.replay_len,
                progress.policy_version,
                progress.active_actors,
                progress.avg_reward,
                progress.eval_success_rate
            );
        },
    )?;

    log::info!(
        "finished ({:?}) in {:.0}s: {} learner steps, {} transitions, restarts {:?}",
        summary.termination,
        summary.elapsed.as_secs_f64(),
        summary.learner_steps,
        summary.transitions_inserted,
        summary.actor_restarts
    );
    if let Some(eval) = summary.last_eval {
        log::info!(
            "last evaluation at step {}: success rate {:.3}, mean reward {:.2}",
            eval.step,
            eval.success_rate,
            eval.avg_reward
        );
    }
    Ok(())
}

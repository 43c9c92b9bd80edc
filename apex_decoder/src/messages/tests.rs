//! Tests for message and statistics types.

use super::*;
use crate::buffers::ReplayStats;

// ============================================================================
// ActorStats
// ============================================================================

#[test]
fn test_actor_stats_welford_mean() {
    let mut stats = ActorStats::new(2, 1);
    stats.record_episode(100.0);
    stats.record_episode(200.0);
    assert_eq!(stats.episodes, 2);
    assert_eq!(stats.avg_episode_reward, 150.0);
    assert_eq!(stats.recent_episode_reward, 200.0);
    assert_eq!(stats.generation, 1);
}

#[test]
fn test_actor_stats_non_finite_filtered() {
    let mut stats = ActorStats::new(0, 0);
    stats.record_episode(100.0);
    stats.record_episode(f32::NAN);
    stats.record_episode(f32::INFINITY);
    stats.record_episode(200.0);

    assert_eq!(stats.valid_episodes, 2);
    assert_eq!(stats.filtered_episodes, 2);
    assert_eq!(stats.avg_episode_reward, 150.0);
    assert_eq!(stats.filtered_fraction(), 0.5);
}

#[test]
fn test_actor_stats_steps_saturate() {
    let mut stats = ActorStats::new(0, 0);
    stats.steps = u64::MAX - 1;
    stats.add_steps(10);
    assert_eq!(stats.steps, u64::MAX);
}

// ============================================================================
// LearnerStats
// ============================================================================

#[test]
fn test_learner_report_averages_window() {
    let mut stats = LearnerStats::new();
    stats.record_step(1.0);
    stats.record_step(3.0);
    stats.record_skip();

    let report = stats.take_report(12.5, ReplayStats::default());
    assert_eq!(report.train_steps, 2);
    assert_eq!(report.avg_loss, 2.0);
    assert_eq!(report.skipped_batches, 1);
    assert_eq!(report.steps_per_second, 12.5);

    // Next window starts empty but totals carry over
    stats.record_step(10.0);
    let report = stats.take_report(1.0, ReplayStats::default());
    assert_eq!(report.avg_loss, 10.0);
    assert_eq!(report.train_steps, 3);
}

#[test]
fn test_learner_report_ignores_nan_loss() {
    let mut stats = LearnerStats::new();
    stats.record_step(f32::NAN);
    stats.record_step(4.0);
    assert_eq!(stats.take_report(0.0, ReplayStats::default()).avg_loss, 4.0);
}

// ============================================================================
// EvalResult
// ============================================================================

#[test]
fn test_eval_result_aggregates() {
    let result = EvalResult::from_episodes(
        1000,
        &[10.0, 20.0, 30.0],
        &[1, 2, 3],
        &[true, false, true],
    );
    assert_eq!(result.step, 1000);
    assert!((result.avg_reward - 20.0).abs() < 1e-6);
    assert!((result.std_reward - 8.165).abs() < 0.01);
    assert_eq!(result.min_reward, 10.0);
    assert_eq!(result.max_reward, 30.0);
    assert_eq!(result.avg_length, 2.0);
    assert!((result.success_rate - 2.0 / 3.0).abs() < 1e-6);
}

#[test]
fn test_eval_result_empty_and_filtered() {
    let empty = EvalResult::from_episodes(5, &[], &[], &[]);
    assert_eq!(empty.n_episodes, 0);
    assert_eq!(empty.success_rate, 0.0);

    let result = EvalResult::from_episodes(0, &[f32::NAN, 100.0], &[4, 6], &[false, false]);
    assert_eq!(result.n_filtered_episodes, 1);
    assert_eq!(result.avg_reward, 100.0);
    assert_eq!(result.avg_length, 5.0);
}

// ============================================================================
// FinishReason
// ============================================================================

#[test]
fn test_finish_reason_from_panic_payload() {
    let payload = std::panic::catch_unwind(|| panic!("env exploded")).unwrap_err();
    assert_eq!(
        FinishReason::from_panic(payload.as_ref()),
        FinishReason::Panicked("env exploded".to_string())
    );

    let payload = std::panic::catch_unwind(|| panic!("step {}", 3)).unwrap_err();
    assert_eq!(
        FinishReason::from_panic(payload.as_ref()),
        FinishReason::Panicked("step 3".to_string())
    );
}

//! Test suite for the IO router.
//!
//! Test categories:
//! 1. Configuration
//! 2. Overflow policies on the aggregate queue
//! 3. Forwarding order and batching into replay
//! 4. Liveness detection and generations
//! 5. Egress broadcast and acknowledgements

use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, SendTimeoutError};

use super::router::{push_aggregate, PushOutcome};
use super::*;
use crate::buffers::{prioritized_replay, ReplayConfig, SharedReplayBuffer};
use crate::core::model_version::PolicySnapshot;
use crate::core::transition::{SharedTransition, StateHistory, Transition};
use crate::error::ConfigError;
use crate::messages::CoordinatorMsg;
use crate::metrics::training_metrics;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

fn make_transition(actor_id: usize, step: u64) -> SharedTransition {
    let state = StateHistory::new(vec![step as f32, actor_id as f32], 1, 2).unwrap();
    Transition::new(state.clone(), 0, 0.0, state, false, 1.0, actor_id, step).into_shared()
}

fn replay(capacity: usize) -> SharedReplayBuffer {
    prioritized_replay(ReplayConfig::new().with_capacity(capacity).with_min_size(1).with_seed(1)).unwrap()
}

fn fast_config() -> RouterConfig {
    RouterConfig::new()
        .with_flush(8, Duration::from_millis(10))
        .with_send_timeout(Duration::from_millis(10))
        .with_heartbeat_timeout(Duration::from_secs(5))
}

fn spawn_router(
    config: RouterConfig,
    replay: SharedReplayBuffer,
) -> (IoRouter<Vec<f32>>, Receiver<CoordinatorMsg>) {
    let (tx, rx) = unbounded();
    let router = IoRouter::spawn(config, replay, tx, training_metrics()).unwrap();
    (router, rx)
}

fn send_blocking(link: &ActorLink<Vec<f32>>, mut transition: SharedTransition) {
    loop {
        match link.send(transition) {
            Ok(()) => return,
            Err(SendTimeoutError::Timeout(back)) => transition = back,
            Err(SendTimeoutError::Disconnected(_)) => panic!("router gone"),
        }
    }
}

fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

// =============================================================================
// 1. CONFIGURATION
// =============================================================================

#[test]
fn test_default_config_is_valid() {
    assert!(RouterConfig::default().validate().is_ok());
}

#[test]
fn test_config_rejects_zero_queue() {
    let err = RouterConfig::new().with_queue_capacities(0, 10).validate().unwrap_err();
    assert_eq!(err, ConfigError::InvalidCount { field: "actor_queue_capacity", value: 0 });
}

#[test]
fn test_config_rejects_send_timeout_above_heartbeat() {
    let config = RouterConfig::new()
        .with_send_timeout(Duration::from_secs(2))
        .with_heartbeat_timeout(Duration::from_secs(1));
    assert!(matches!(config.validate(), Err(ConfigError::Inconsistent(_))));
}

// =============================================================================
// 2. OVERFLOW POLICIES
// =============================================================================

#[test]
fn test_drop_oldest_makes_room() {
    let (tx, rx) = bounded(2);
    for step in 0..2 {
        let mut pending = Some(make_transition(0, step));
        let outcome = push_aggregate(&tx, &rx, &mut pending, OverflowPolicy::DropOldest, Duration::ZERO);
        assert_eq!(outcome, PushOutcome::Queued);
    }

    let mut pending = Some(make_transition(0, 2));
    let outcome = push_aggregate(&tx, &rx, &mut pending, OverflowPolicy::DropOldest, Duration::ZERO);
    assert_eq!(outcome, PushOutcome::QueuedDroppingOldest(1));

    let steps: Vec<u64> = rx.try_iter().map(|t| t.actor_step).collect();
    assert_eq!(steps, vec![1, 2]);
}

#[test]
fn test_block_hands_transition_back_on_timeout() {
    let (tx, rx) = bounded(1);
    let mut pending = Some(make_transition(0, 0));
    push_aggregate(&tx, &rx, &mut pending, OverflowPolicy::Block, Duration::from_millis(1));

    let mut pending = Some(make_transition(0, 1));
    let outcome = push_aggregate(&tx, &rx, &mut pending, OverflowPolicy::Block, Duration::from_millis(5));
    assert_eq!(outcome, PushOutcome::Blocked);
    assert_eq!(pending.as_ref().map(|t| t.actor_step), Some(1));
    assert_eq!(rx.len(), 1);
}

// =============================================================================
// 3. FORWARDING
// =============================================================================

#[test]
fn test_four_actors_forwarded_without_reordering() {
    let replay = replay(1000);
    let (router, _coord) = spawn_router(fast_config(), replay.clone());

    let links: Vec<_> = (0..4).map(|id| router.register_actor(id)).collect();
    let producers: Vec<_> = links
        .into_iter()
        .map(|link| {
            thread::spawn(move || {
                for step in 0..10 {
                    send_blocking(&link, make_transition(link.actor_id(), step));
                }
                link
            })
        })
        .collect();
    let _links: Vec<_> = producers.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(wait_for(Duration::from_secs(5), || replay.len() == 40));

    let mut entries = replay.live_entries();
    entries.sort_by_key(|(id, _)| *id);
    for actor_id in 0..4 {
        let steps: Vec<u64> = entries
            .iter()
            .filter(|(_, t)| t.actor_id == actor_id)
            .map(|(_, t)| t.actor_step)
            .collect();
        assert_eq!(steps, (0..10).collect::<Vec<_>>(), "actor {} reordered", actor_id);
    }

    let stats = router.stats();
    assert_eq!(stats.forwarded, 40);
    assert_eq!(stats.inserted, 40);
    assert!(stats.flushed_batches >= 5);
    assert!(router.shutdown(Duration::from_secs(2)));
}

#[test]
fn test_interval_flush_below_size_threshold() {
    let replay = replay(100);
    let config = fast_config().with_flush(1000, Duration::from_millis(20));
    let (router, _coord) = spawn_router(config, replay.clone());

    let link = router.register_actor(0);
    for step in 0..3 {
        send_blocking(&link, make_transition(0, step));
    }
    assert!(wait_for(Duration::from_secs(2), || replay.len() == 3));
    router.shutdown(Duration::from_secs(2));
}

#[test]
fn test_retired_actor_queue_still_forwarded() {
    let replay = replay(100);
    let (router, _coord) = spawn_router(fast_config(), replay.clone());

    let link = router.register_actor(3);
    for step in 0..5 {
        send_blocking(&link, make_transition(3, step));
    }
    router.deregister(3, link.generation());
    drop(link);

    assert!(wait_for(Duration::from_secs(2), || replay.len() == 5));
    assert!(wait_for(Duration::from_secs(2), || router.stats().actors.is_empty()));
    router.shutdown(Duration::from_secs(2));
}

// =============================================================================
// 4. LIVENESS
// =============================================================================

#[test]
fn test_silent_actor_reported_once_and_queue_discarded() {
    let replay = replay(100);
    let config = fast_config()
        .with_heartbeat_timeout(Duration::from_millis(40))
        .with_send_timeout(Duration::from_millis(5));
    let (router, coord) = spawn_router(config, replay.clone());

    let link = router.register_actor(1);
    let msg = coord.recv_timeout(Duration::from_secs(2)).unwrap();
    match msg {
        CoordinatorMsg::ActorUnresponsive { actor_id, generation, silent_for } => {
            assert_eq!(actor_id, 1);
            assert_eq!(generation, link.generation());
            assert!(silent_for >= Duration::from_millis(40));
        }
        other => panic!("unexpected {:?}", other),
    }

    // Late sends from the hung generation never reach replay
    for step in 0..4 {
        send_blocking(&link, make_transition(1, step));
    }
    assert!(wait_for(Duration::from_secs(2), || router.stats().discarded == 4));
    assert_eq!(replay.len(), 0);

    // Reported only once per generation
    assert!(coord.recv_timeout(Duration::from_millis(150)).is_err());
    router.shutdown(Duration::from_secs(2));
}

#[test]
fn test_heartbeating_actor_not_reported() {
    let replay = replay(100);
    let config = fast_config()
        .with_heartbeat_timeout(Duration::from_millis(60))
        .with_send_timeout(Duration::from_millis(5));
    let (router, coord) = spawn_router(config, replay);

    let link = router.register_actor(0);
    let deadline = Instant::now() + Duration::from_millis(300);
    while Instant::now() < deadline {
        link.heartbeat();
        thread::sleep(Duration::from_millis(5));
    }
    assert!(coord.try_recv().is_err());
    router.shutdown(Duration::from_secs(2));
}

#[test]
fn test_reregistration_replaces_generation() {
    let replay = replay(100);
    let (router, _coord) = spawn_router(fast_config(), replay.clone());

    let old = router.register_actor(2);
    let new = router.register_actor(2);
    assert!(new.generation() > old.generation());

    // The old generation's queue is gone once the forwarder drops its cache
    assert!(wait_for(Duration::from_secs(2), || matches!(
        old.send(make_transition(2, 0)),
        Err(SendTimeoutError::Disconnected(_))
    )));

    send_blocking(&new, make_transition(2, 7));
    assert!(wait_for(Duration::from_secs(2), || replay.len() >= 1));
    let stats = router.stats();
    assert_eq!(stats.actors.len(), 1);
    assert_eq!(stats.actors[0].generation, new.generation());
    router.shutdown(Duration::from_secs(2));
}

// =============================================================================
// 5. EGRESS
// =============================================================================

#[test]
fn test_broadcast_reaches_all_and_late_registrants() {
    let (router, _coord) = spawn_router(fast_config(), replay(10));
    let egress = router.egress();

    let a = router.register_actor(0);
    let b = router.register_actor(1);
    assert_eq!(egress.broadcast(PolicySnapshot::new(1, vec![1.0])), 2);
    assert_eq!(egress.broadcast(PolicySnapshot::new(2, vec![2.0])), 2);

    // Latest wins in each inbox
    assert_eq!(a.take_snapshot().map(|s| s.version()), Some(2));
    assert_eq!(b.take_snapshot().map(|s| s.version()), Some(2));
    assert!(a.take_snapshot().is_none());

    let late = router.register_actor(2);
    let snap = late.take_snapshot().unwrap();
    assert_eq!(snap.version(), 2);
    assert_eq!(snap.params(), &vec![2.0]);
    assert_eq!(egress.latest_version(), 2);

    router.shutdown(Duration::from_secs(2));
}

#[test]
fn test_registration_racing_broadcast_gets_latest_snapshot() {
    let (router, _coord) = spawn_router(fast_config(), replay(10));
    let egress = router.egress();

    for version in 1..=300u64 {
        let actor_id = (version % 8) as usize;
        let link = thread::scope(|scope| {
            let egress = egress.clone();
            scope.spawn(move || egress.broadcast(PolicySnapshot::new(version, vec![version as f32])));
            router.register_actor(actor_id)
        });
        // Whichever side ran first, the new inbox holds this round's version
        assert_eq!(link.take_snapshot().map(|s| s.version()), Some(version), "round {}", version);
    }
    router.shutdown(Duration::from_secs(2));
}

#[test]
fn test_broadcast_ignores_older_versions() {
    let (router, _coord) = spawn_router(fast_config(), replay(10));
    let egress = router.egress();
    let link = router.register_actor(0);

    egress.broadcast(PolicySnapshot::new(5, vec![5.0]));
    assert_eq!(egress.broadcast(PolicySnapshot::new(3, vec![3.0])), 0);
    assert_eq!(link.take_snapshot().map(|s| s.version()), Some(5));
    router.shutdown(Duration::from_secs(2));
}

#[test]
fn test_acknowledgements_track_swapped_versions() {
    let (router, _coord) = spawn_router(fast_config(), replay(10));
    let egress = router.egress();
    let a = router.register_actor(0);
    let b = router.register_actor(1);

    egress.broadcast(PolicySnapshot::new(4, vec![]));
    a.acknowledge(4);
    b.acknowledge(3);

    let mut acks = egress.acknowledgements();
    acks.sort();
    assert_eq!(acks, vec![(0, a.generation(), 4), (1, b.generation(), 3)]);
    assert_eq!(egress.min_acknowledged(), Some(3));
    router.shutdown(Duration::from_secs(2));
}

//! IO router between actors and the replay buffer.
//!
//! ```text
//!  Actor 0 ──► [ingress 0] ─┐
//!  Actor 1 ──► [ingress 1] ─┼─► forwarder ─► [aggregate] ─► flusher ─► replay.insert_batch
//!  Actor N ──► [ingress N] ─┘      │
//!                                  └─ liveness: stale heartbeat ─► CoordinatorMsg::ActorUnresponsive
//! ```
//!
//! Every queue is bounded. When the aggregate queue is full the forwarder
//! either blocks (ingress queues then fill and actors block in `send`) or
//! drops the oldest queued transition, depending on [`OverflowPolicy`].
//!
//! A single forwarder reads each ingress queue in FIFO order, so one
//! actor's transitions reach the replay buffer in the order it sent them.

use crate::buffers::SharedReplayBuffer;
use crate::core::model_version::PolicySnapshot;
use crate::core::shutdown::{join_until, JoinOutcome};
use crate::core::snapshot_slot::{snapshot_slot, SharedSnapshotSlot};
use crate::core::transition::SharedTransition;
use crate::error::{ConfigError, RunError};
use crate::io::egress::Egress;
use crate::messages::CoordinatorMsg;
use crate::metrics::SharedTrainingMetrics;
use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Transitions moved from one ingress queue per round-robin turn.
const FORWARD_BURST: usize = 32;
const IDLE_BACKOFF: Duration = Duration::from_millis(1);

/// What the forwarder does when the aggregate queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Wait for space; backpressure propagates to actors.
    #[default]
    Block,
    /// Discard the oldest queued transition to make room.
    DropOldest,
}

/// Router configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    pub actor_queue_capacity: usize,
    pub aggregate_queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    /// Flush to replay once this many transitions are pending
    pub flush_size: usize,
    /// Flush whatever is pending after this long
    pub flush_interval: Duration,
    /// Actor silence after which it is reported unresponsive
    pub heartbeat_timeout: Duration,
    /// Slice an actor blocks for in one `send` attempt
    pub send_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            actor_queue_capacity: 256,
            aggregate_queue_capacity: 4096,
            overflow_policy: OverflowPolicy::Block,
            flush_size: 64,
            flush_interval: Duration::from_millis(50),
            heartbeat_timeout: Duration::from_secs(5),
            send_timeout: Duration::from_millis(50),
        }
    }
}

impl RouterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_queue_capacities(mut self, per_actor: usize, aggregate: usize) -> Self {
        self.actor_queue_capacity = per_actor;
        self.aggregate_queue_capacity = aggregate;
        self
    }

    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    pub fn with_flush(mut self, size: usize, interval: Duration) -> Self {
        self.flush_size = size;
        self.flush_interval = interval;
        self
    }

    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("actor_queue_capacity", self.actor_queue_capacity),
            ("aggregate_queue_capacity", self.aggregate_queue_capacity),
            ("flush_size", self.flush_size),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidCount { field, value });
            }
        }
        for (field, value) in [
            ("flush_interval", self.flush_interval),
            ("heartbeat_timeout", self.heartbeat_timeout),
            ("send_timeout", self.send_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::OutOfRange {
                    field,
                    value: 0.0,
                    min: f64::MIN_POSITIVE,
                    max: f64::INFINITY,
                });
            }
        }
        if self.send_timeout >= self.heartbeat_timeout {
            return Err(ConfigError::Inconsistent(format!(
                "send_timeout ({:?}) must be shorter than heartbeat_timeout ({:?})",
                self.send_timeout, self.heartbeat_timeout
            )));
        }
        Ok(())
    }

    fn liveness_interval(&self) -> Duration {
        (self.heartbeat_timeout / 4).max(Duration::from_millis(1))
    }
}

// ============================================================================
// Heartbeat and actor endpoints
// ============================================================================

/// Last-seen timestamp of one actor, in milliseconds since `epoch`.
#[derive(Debug)]
pub struct Heartbeat {
    epoch: Instant,
    last_ms: AtomicU64,
}

impl Heartbeat {
    fn new(epoch: Instant) -> Self {
        let hb = Self {
            epoch,
            last_ms: AtomicU64::new(0),
        };
        hb.beat();
        hb
    }

    pub fn beat(&self) {
        let ms = self.epoch.elapsed().as_millis() as u64;
        self.last_ms.fetch_max(ms, Ordering::Relaxed);
    }

    pub fn silent_for(&self) -> Duration {
        let now = self.epoch.elapsed().as_millis() as u64;
        Duration::from_millis(now.saturating_sub(self.last_ms.load(Ordering::Relaxed)))
    }
}

/// Router-side view of one registered actor generation.
pub(crate) struct Endpoint<P> {
    pub(crate) actor_id: usize,
    pub(crate) generation: u64,
    receiver: Receiver<SharedTransition>,
    heartbeat: Arc<Heartbeat>,
    pub(crate) inbox: SharedSnapshotSlot<P>,
    /// Sticky: set once when the heartbeat times out
    unresponsive: AtomicBool,
    /// Actor exited; forward what is left, then drop the endpoint
    retired: AtomicBool,
    forwarded: AtomicU64,
    discarded: AtomicU64,
}

impl<P> Endpoint<P> {
    /// Drop everything queued by this generation.
    fn discard_queue(&self) -> u64 {
        let n = self.receiver.try_iter().count() as u64;
        self.discarded.fetch_add(n, Ordering::Relaxed);
        n
    }
}

/// Registered endpoints plus the last broadcast snapshot.
pub(crate) struct Registry<P> {
    pub(crate) endpoints: Mutex<Vec<Arc<Endpoint<P>>>>,
    /// Bumped on every (de)registration so the forwarder can refresh its cache
    revision: AtomicU64,
    next_generation: AtomicU64,
    pub(crate) last_snapshot: Mutex<Option<PolicySnapshot<P>>>,
}

impl<P> Registry<P> {
    fn new() -> Self {
        Self {
            endpoints: Mutex::new(Vec::new()),
            revision: AtomicU64::new(0),
            next_generation: AtomicU64::new(0),
            last_snapshot: Mutex::new(None),
        }
    }
}

/// Actor-side handle: ingress sender, heartbeat and snapshot inbox.
pub struct ActorLink<P> {
    actor_id: usize,
    generation: u64,
    sender: Sender<SharedTransition>,
    heartbeat: Arc<Heartbeat>,
    inbox: SharedSnapshotSlot<P>,
    send_timeout: Duration,
}

impl<P> ActorLink<P> {
    pub fn actor_id(&self) -> usize {
        self.actor_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Mark the actor alive.
    pub fn heartbeat(&self) {
        self.heartbeat.beat();
    }

    /// One bounded attempt to enqueue. Callers loop on `Timeout` so they can
    /// check their stop flag between attempts.
    pub fn send(&self, transition: SharedTransition) -> Result<(), SendTimeoutError<SharedTransition>> {
        self.heartbeat.beat();
        self.sender.send_timeout(transition, self.send_timeout)
    }

    /// Latest undelivered snapshot, if any.
    pub fn take_snapshot(&self) -> Option<PolicySnapshot<P>> {
        self.inbox.take()
    }

    /// Report the version now in use.
    pub fn acknowledge(&self, version: u64) {
        self.inbox.acknowledge(version);
    }
}

// ============================================================================
// Statistics
// ============================================================================

#[derive(Debug, Default)]
pub(crate) struct RouterCounters {
    forwarded: AtomicU64,
    dropped_oldest: AtomicU64,
    discarded: AtomicU64,
    flushed_batches: AtomicU64,
    inserted: AtomicU64,
    evicted: AtomicU64,
    pub(crate) broadcasts: AtomicU64,
}

/// Per-actor queue state.
#[derive(Debug, Clone, PartialEq)]
pub struct ActorQueueStats {
    pub actor_id: usize,
    pub generation: u64,
    pub queue_depth: usize,
    pub forwarded: u64,
    pub discarded: u64,
    pub acked_version: u64,
    pub unresponsive: bool,
}

/// Router-wide counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouterStats {
    pub actors: Vec<ActorQueueStats>,
    pub aggregate_depth: usize,
    pub forwarded: u64,
    /// Removed from the aggregate queue under `DropOldest`
    pub dropped_oldest: u64,
    /// Discarded from unresponsive or replaced actors
    pub discarded: u64,
    pub flushed_batches: u64,
    pub inserted: u64,
    /// Replay entries evicted by router inserts
    pub evicted: u64,
    pub broadcasts: u64,
}

// ============================================================================
// Router
// ============================================================================

/// Handle to the running router threads.
pub struct IoRouter<P> {
    config: RouterConfig,
    registry: Arc<Registry<P>>,
    counters: Arc<RouterCounters>,
    aggregate_rx: Receiver<SharedTransition>,
    epoch: Instant,
    stop: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl<P: Send + Sync + 'static> IoRouter<P> {
    /// Validate `config` and start the forwarder and flusher threads.
    pub fn spawn(
        config: RouterConfig,
        replay: SharedReplayBuffer,
        coordinator: Sender<CoordinatorMsg>,
        metrics: SharedTrainingMetrics,
    ) -> Result<Self, RunError> {
        config.validate()?;

        let registry = Arc::new(Registry::new());
        let counters = Arc::new(RouterCounters::default());
        let stop = Arc::new(AtomicBool::new(false));
        let (aggregate_tx, aggregate_rx) = bounded(config.aggregate_queue_capacity);

        let forwarder = Forwarder {
            config: config.clone(),
            registry: Arc::clone(&registry),
            counters: Arc::clone(&counters),
            aggregate_tx,
            aggregate_rx: aggregate_rx.clone(),
            coordinator,
            stop: Arc::clone(&stop),
            cache: Vec::new(),
            cache_revision: u64::MAX,
            next_liveness_check: Instant::now(),
        };
        let flusher = Flusher {
            flush_size: config.flush_size,
            flush_interval: config.flush_interval,
            aggregate_rx: aggregate_rx.clone(),
            replay,
            counters: Arc::clone(&counters),
            metrics,
            stop: Arc::clone(&stop),
        };

        let mut threads = Vec::with_capacity(2);
        threads.push(
            std::thread::Builder::new()
                .name("router-forward".into())
                .spawn(move || forwarder.run())?,
        );
        let flush_thread = std::thread::Builder::new()
            .name("router-flush".into())
            .spawn(move || flusher.run());
        match flush_thread {
            Ok(handle) => threads.push(handle),
            Err(e) => {
                stop.store(true, Ordering::Release);
                return Err(e.into());
            }
        }

        log::debug!(
            "IO router started: ingress {} per actor, aggregate {}, policy {:?}",
            config.actor_queue_capacity,
            config.aggregate_queue_capacity,
            config.overflow_policy
        );

        Ok(Self {
            config,
            registry,
            counters,
            aggregate_rx,
            epoch: Instant::now(),
            stop,
            threads,
        })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Register a new generation for `actor_id`.
    ///
    /// Any previous generation of the same actor is replaced and its queued
    /// transitions are discarded. The last broadcast snapshot, if any, is
    /// placed in the new inbox immediately.
    pub fn register_actor(&self, actor_id: usize) -> ActorLink<P> {
        let generation = self.registry.next_generation.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = bounded(self.config.actor_queue_capacity);
        let heartbeat = Arc::new(Heartbeat::new(self.epoch));
        let inbox = snapshot_slot();

        let endpoint = Arc::new(Endpoint {
            actor_id,
            generation,
            receiver,
            heartbeat: Arc::clone(&heartbeat),
            inbox: Arc::clone(&inbox),
            unresponsive: AtomicBool::new(false),
            retired: AtomicBool::new(false),
            forwarded: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        });

        {
            let mut endpoints = self.registry.endpoints.lock();
            if let Some(pos) = endpoints.iter().position(|e| e.actor_id == actor_id) {
                let old = endpoints.swap_remove(pos);
                let n = old.discard_queue();
                self.counters.discarded.fetch_add(n, Ordering::Relaxed);
            }
            endpoints.push(endpoint);
            // Seed the inbox under the endpoints lock: a concurrent broadcast
            // either set `last_snapshot` already or reaches the new endpoint.
            if let Some(snapshot) = self.registry.last_snapshot.lock().clone() {
                inbox.publish(snapshot);
            }
        }
        self.registry.revision.fetch_add(1, Ordering::Release);

        log::debug!("registered actor {} generation {}", actor_id, generation);

        ActorLink {
            actor_id,
            generation,
            sender,
            heartbeat,
            inbox,
            send_timeout: self.config.send_timeout,
        }
    }

    /// Retire `actor_id` if it is still registered under `generation`.
    ///
    /// Transitions it queued before exiting are still forwarded; the
    /// endpoint is dropped once its queue is empty.
    pub fn deregister(&self, actor_id: usize, generation: u64) {
        let endpoints = self.registry.endpoints.lock();
        if let Some(endpoint) = endpoints
            .iter()
            .find(|e| e.actor_id == actor_id && e.generation == generation)
        {
            endpoint.retired.store(true, Ordering::Release);
            log::debug!(
                "actor {} generation {} retired with {} queued transitions",
                actor_id,
                generation,
                endpoint.receiver.len()
            );
        }
    }

    /// Broadcast side of the router.
    pub fn egress(&self) -> Egress<P> {
        Egress::new(Arc::clone(&self.registry), Arc::clone(&self.counters))
    }

    pub fn stats(&self) -> RouterStats {
        let actors = self
            .registry
            .endpoints
            .lock()
            .iter()
            .map(|e| ActorQueueStats {
                actor_id: e.actor_id,
                generation: e.generation,
                queue_depth: e.receiver.len(),
                forwarded: e.forwarded.load(Ordering::Relaxed),
                discarded: e.discarded.load(Ordering::Relaxed),
                acked_version: e.inbox.acked_version(),
                unresponsive: e.unresponsive.load(Ordering::Relaxed),
            })
            .collect();

        let c = &self.counters;
        RouterStats {
            actors,
            aggregate_depth: self.aggregate_rx.len(),
            forwarded: c.forwarded.load(Ordering::Relaxed),
            dropped_oldest: c.dropped_oldest.load(Ordering::Relaxed),
            discarded: c.discarded.load(Ordering::Relaxed),
            flushed_batches: c.flushed_batches.load(Ordering::Relaxed),
            inserted: c.inserted.load(Ordering::Relaxed),
            evicted: c.evicted.load(Ordering::Relaxed),
            broadcasts: c.broadcasts.load(Ordering::Relaxed),
        }
    }

    /// Stop both threads, waiting at most `grace`.
    ///
    /// Pending transitions already in the aggregate queue are flushed.
    /// Returns `false` if a thread had to be abandoned.
    pub fn shutdown(mut self, grace: Duration) -> bool {
        self.stop.store(true, Ordering::Release);
        let deadline = Instant::now() + grace;
        let mut clean = true;
        for handle in self.threads.drain(..) {
            let name = handle.thread().name().unwrap_or("router").to_string();
            match join_until(handle, deadline) {
                JoinOutcome::Finished(Ok(())) => {}
                JoinOutcome::Finished(Err(_)) => {
                    log::error!("{} thread panicked", name);
                    clean = false;
                }
                JoinOutcome::Abandoned => {
                    log::warn!("{} thread did not stop within {:?}", name, grace);
                    clean = false;
                }
            }
        }
        clean
    }
}

impl<P> Drop for IoRouter<P> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

// ============================================================================
// Forwarder thread
// ============================================================================

/// Outcome of pushing one transition into the aggregate queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushOutcome {
    Queued,
    /// Queued after discarding this many older transitions
    QueuedDroppingOldest(u64),
    /// Timed out under `Block`; the transition is handed back
    Blocked,
    Disconnected,
}

/// Push into the aggregate queue according to `policy`.
///
/// Under `Block` this waits at most `wait`; on timeout the transition is
/// returned through `pending` so the caller can retry.
pub(crate) fn push_aggregate(
    tx: &Sender<SharedTransition>,
    rx: &Receiver<SharedTransition>,
    pending: &mut Option<SharedTransition>,
    policy: OverflowPolicy,
    wait: Duration,
) -> PushOutcome {
    let Some(mut transition) = pending.take() else {
        return PushOutcome::Queued;
    };
    match policy {
        OverflowPolicy::Block => match tx.send_timeout(transition, wait) {
            Ok(()) => PushOutcome::Queued,
            Err(SendTimeoutError::Timeout(back)) => {
                *pending = Some(back);
                PushOutcome::Blocked
            }
            Err(SendTimeoutError::Disconnected(_)) => PushOutcome::Disconnected,
        },
        OverflowPolicy::DropOldest => {
            let mut dropped = 0;
            loop {
                match tx.try_send(transition) {
                    Ok(()) if dropped == 0 => return PushOutcome::Queued,
                    Ok(()) => return PushOutcome::QueuedDroppingOldest(dropped),
                    Err(TrySendError::Full(back)) => {
                        if rx.try_recv().is_ok() {
                            dropped += 1;
                        }
                        transition = back;
                    }
                    Err(TrySendError::Disconnected(_)) => return PushOutcome::Disconnected,
                }
            }
        }
    }
}

struct Forwarder<P> {
    config: RouterConfig,
    registry: Arc<Registry<P>>,
    counters: Arc<RouterCounters>,
    aggregate_tx: Sender<SharedTransition>,
    aggregate_rx: Receiver<SharedTransition>,
    coordinator: Sender<CoordinatorMsg>,
    stop: Arc<AtomicBool>,
    cache: Vec<Arc<Endpoint<P>>>,
    cache_revision: u64,
    next_liveness_check: Instant,
}

impl<P> Forwarder<P> {
    fn run(mut self) {
        while !self.stop.load(Ordering::Acquire) {
            self.refresh_cache();
            self.maybe_check_liveness();

            let mut moved = 0;
            for i in 0..self.cache.len() {
                let endpoint = Arc::clone(&self.cache[i]);
                if endpoint.unresponsive.load(Ordering::Relaxed) {
                    let n = endpoint.discard_queue();
                    self.counters.discarded.fetch_add(n, Ordering::Relaxed);
                    continue;
                }
                for transition in endpoint.receiver.try_iter().take(FORWARD_BURST) {
                    if !self.forward(transition) {
                        return;
                    }
                    endpoint.forwarded.fetch_add(1, Ordering::Relaxed);
                    moved += 1;
                }
            }

            self.drop_drained_endpoints();

            if moved == 0 {
                std::thread::sleep(IDLE_BACKOFF);
            }
        }
        log::debug!("router forwarder stopped");
    }

    /// Returns `false` when the router is shutting down.
    fn forward(&mut self, transition: SharedTransition) -> bool {
        let mut pending = Some(transition);
        loop {
            match push_aggregate(
                &self.aggregate_tx,
                &self.aggregate_rx,
                &mut pending,
                self.config.overflow_policy,
                self.config.liveness_interval(),
            ) {
                PushOutcome::Queued => break,
                PushOutcome::QueuedDroppingOldest(n) => {
                    self.counters.dropped_oldest.fetch_add(n, Ordering::Relaxed);
                    break;
                }
                PushOutcome::Blocked => {
                    if self.stop.load(Ordering::Acquire) {
                        return false;
                    }
                    self.maybe_check_liveness();
                }
                PushOutcome::Disconnected => return false,
            }
        }
        self.counters.forwarded.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn drop_drained_endpoints(&mut self) {
        let drained = |e: &Arc<Endpoint<P>>| e.retired.load(Ordering::Acquire) && e.receiver.is_empty();
        if !self.cache.iter().any(drained) {
            return;
        }
        self.registry.endpoints.lock().retain(|e| !drained(e));
        self.registry.revision.fetch_add(1, Ordering::Release);
    }

    fn refresh_cache(&mut self) {
        let revision = self.registry.revision.load(Ordering::Acquire);
        if revision != self.cache_revision {
            self.cache = self.registry.endpoints.lock().clone();
            self.cache_revision = revision;
        }
    }

    fn maybe_check_liveness(&mut self) {
        let now = Instant::now();
        if now < self.next_liveness_check {
            return;
        }
        self.next_liveness_check = now + self.config.liveness_interval();

        for endpoint in &self.cache {
            if endpoint.retired.load(Ordering::Relaxed) {
                continue;
            }
            let silent_for = endpoint.heartbeat.silent_for();
            if silent_for < self.config.heartbeat_timeout {
                continue;
            }
            if endpoint.unresponsive.swap(true, Ordering::AcqRel) {
                continue;
            }
            let discarded = endpoint.discard_queue();
            self.counters.discarded.fetch_add(discarded, Ordering::Relaxed);
            log::warn!(
                "actor {} (generation {}) silent for {:?}, discarded {} queued transitions",
                endpoint.actor_id,
                endpoint.generation,
                silent_for,
                discarded
            );
            let _ = self.coordinator.send(CoordinatorMsg::ActorUnresponsive {
                actor_id: endpoint.actor_id,
                generation: endpoint.generation,
                silent_for,
            });
        }
    }
}

// ============================================================================
// Flusher thread
// ============================================================================

struct Flusher {
    flush_size: usize,
    flush_interval: Duration,
    aggregate_rx: Receiver<SharedTransition>,
    replay: SharedReplayBuffer,
    counters: Arc<RouterCounters>,
    metrics: SharedTrainingMetrics,
    stop: Arc<AtomicBool>,
}

impl Flusher {
    fn run(self) {
        let mut pending: Vec<SharedTransition> = Vec::with_capacity(self.flush_size);
        let mut deadline = Instant::now() + self.flush_interval;

        loop {
            let timeout = deadline.saturating_duration_since(Instant::now());
            match self.aggregate_rx.recv_timeout(timeout) {
                Ok(transition) => {
                    pending.push(transition);
                    if pending.len() >= self.flush_size {
                        self.flush(&mut pending);
                        deadline = Instant::now() + self.flush_interval;
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                    self.flush(&mut pending);
                    deadline = Instant::now() + self.flush_interval;
                    if self.stop.load(Ordering::Acquire) {
                        break;
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
        }

        // Drain what is already queued
        pending.extend(self.aggregate_rx.try_iter());
        self.flush(&mut pending);
        log::debug!("router flusher stopped");
    }

    fn flush(&self, pending: &mut Vec<SharedTransition>) {
        if pending.is_empty() {
            return;
        }
        let n = pending.len() as u64;
        let outcomes = self.replay.insert_batch(pending.drain(..).map(|t| {
            let priority = t.initial_priority;
            (t, priority)
        }));
        let evicted = outcomes.iter().filter(|o| o.evicted.is_some()).count() as u64;

        self.counters.flushed_batches.fetch_add(1, Ordering::Relaxed);
        self.counters.inserted.fetch_add(n, Ordering::Relaxed);
        self.counters.evicted.fetch_add(evicted, Ordering::Relaxed);
        self.metrics.add_inserted(n);
        log::trace!("flushed {} transitions ({} evicted)", n, evicted);
    }
}

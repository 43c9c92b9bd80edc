//! Prioritized experience replay.
//!
//! Fixed-capacity ring of transitions with a sum-tree priority index.
//!
//! - **Retention** is FIFO: once full, each insert evicts the oldest entry
//!   regardless of its priority.
//! - **Sampling** is proportional to `priority^alpha`, without replacement
//!   inside one batch and with replacement across batches.
//! - **Importance weights** are `(N * P(i))^-beta`, normalized by the batch
//!   maximum so every weight is `<= 1`.
//!
//! # Concurrency
//!
//! The router inserts while the learner samples and updates priorities. All
//! three operations take one short lock over the index (sum tree, slot table,
//! counters). Random draws happen before the lock is taken and weight math
//! after it is released; transitions are `Arc`s, so copying them into a batch
//! is a refcount bump.
//!
//! ```text
//!   slot = insertion_index % capacity
//!   live(id) <=> slots[slot].id == id
//! ```

use crate::buffers::sum_tree::SumTree;
use crate::core::transition::SharedTransition;
use crate::error::{ConfigError, ReplayError};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Replay buffer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Maximum live entries
    pub capacity: usize,
    /// Priority exponent (0 = uniform sampling)
    pub alpha: f64,
    /// Initial importance-sampling exponent
    pub beta: f64,
    /// Importance-sampling exponent reached at the end of annealing
    pub beta_final: f64,
    /// Learner steps over which beta anneals to `beta_final`
    pub beta_anneal_steps: usize,
    /// Lower priority clamp
    pub epsilon_min: f32,
    /// Upper priority clamp
    pub priority_max: f32,
    /// Entries required before `sample` succeeds
    pub min_size: usize,
    /// Seed for the sampling RNG (None = from entropy)
    pub seed: Option<u64>,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            capacity: 100_000,
            alpha: 0.6,
            beta: 0.4,
            beta_final: 1.0,
            beta_anneal_steps: 100_000,
            epsilon_min: 1e-6,
            priority_max: 1e3,
            min_size: 1_000,
            seed: None,
        }
    }
}

impl ReplayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_beta(mut self, beta: f64) -> Self {
        self.beta = beta;
        self
    }

    pub fn with_beta_final(mut self, beta_final: f64) -> Self {
        self.beta_final = beta_final;
        self
    }

    pub fn with_beta_anneal_steps(mut self, steps: usize) -> Self {
        self.beta_anneal_steps = steps;
        self
    }

    pub fn with_priority_bounds(mut self, epsilon_min: f32, priority_max: f32) -> Self {
        self.epsilon_min = epsilon_min;
        self.priority_max = priority_max;
        self
    }

    pub fn with_min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate ranges and cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::InvalidCount { field: "capacity", value: 0 });
        }
        if self.min_size == 0 {
            return Err(ConfigError::InvalidCount { field: "min_size", value: 0 });
        }
        if self.min_size > self.capacity {
            return Err(ConfigError::Inconsistent(format!(
                "min_size ({}) exceeds capacity ({})",
                self.min_size, self.capacity
            )));
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(ConfigError::OutOfRange { field: "alpha", value: self.alpha, min: 0.0, max: 1.0 });
        }
        if !(0.0..=1.0).contains(&self.beta) {
            return Err(ConfigError::OutOfRange { field: "beta", value: self.beta, min: 0.0, max: 1.0 });
        }
        if !(self.beta..=1.0).contains(&self.beta_final) {
            return Err(ConfigError::OutOfRange {
                field: "beta_final",
                value: self.beta_final,
                min: self.beta,
                max: 1.0,
            });
        }
        if !(self.epsilon_min > 0.0 && self.epsilon_min.is_finite()) {
            return Err(ConfigError::OutOfRange {
                field: "epsilon_min",
                value: self.epsilon_min as f64,
                min: f64::MIN_POSITIVE,
                max: self.priority_max as f64,
            });
        }
        if !(self.priority_max.is_finite() && self.priority_max > self.epsilon_min) {
            return Err(ConfigError::Inconsistent(format!(
                "priority_max ({}) must be finite and > epsilon_min ({})",
                self.priority_max, self.epsilon_min
            )));
        }
        Ok(())
    }
}

/// Stable handle to one replay entry.
///
/// Wraps the entry's global insertion index. Ids of evicted entries stay
/// valid values but no longer match any slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u64);

impl EntryId {
    /// Global insertion index (0 = first transition ever inserted).
    pub fn insertion_index(&self) -> u64 {
        self.0
    }
}

/// Result of an insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOutcome {
    pub id: EntryId,
    /// Entry evicted to make room, if the buffer was full
    pub evicted: Option<EntryId>,
}

/// A prioritized sample.
#[derive(Debug, Clone)]
pub struct SampledBatch {
    pub transitions: Vec<SharedTransition>,
    /// Normalized importance weights, all in (0, 1]
    pub weights: Vec<f32>,
    pub ids: Vec<EntryId>,
}

impl SampledBatch {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Point-in-time replay statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayStats {
    pub len: usize,
    pub capacity: usize,
    pub total_inserted: u64,
    pub total_evicted: u64,
    pub total_sampled: u64,
    pub priority_min: f32,
    pub priority_max: f32,
    pub priority_mean: f32,
    pub beta: f64,
}

#[derive(Debug)]
struct ReplayEntry {
    id: EntryId,
    transition: SharedTransition,
    priority: f32,
    sample_count: u32,
}

/// Everything guarded by the index lock.
#[derive(Debug)]
struct PriorityIndex {
    tree: SumTree,
    slots: Vec<Option<ReplayEntry>>,
    next_index: u64,
    len: usize,
    total_evicted: u64,
    total_sampled: u64,
}

/// Thread-safe prioritized replay buffer.
#[derive(Debug)]
pub struct PrioritizedReplayBuffer {
    config: ReplayConfig,
    index: Mutex<PriorityIndex>,
    rng: Mutex<StdRng>,
    /// Current beta as f64 bits
    beta_bits: AtomicU64,
}

impl PrioritizedReplayBuffer {
    /// Create an empty buffer.
    pub fn new(config: ReplayConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut slots = Vec::with_capacity(config.capacity);
        slots.resize_with(config.capacity, || None);

        Ok(Self {
            index: Mutex::new(PriorityIndex {
                tree: SumTree::new(config.capacity),
                slots,
                next_index: 0,
                len: 0,
                total_evicted: 0,
                total_sampled: 0,
            }),
            rng: Mutex::new(rng),
            beta_bits: AtomicU64::new(config.beta.to_bits()),
            config,
        })
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.index.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once `min_size` entries are live.
    pub fn is_ready(&self) -> bool {
        self.len() >= self.config.min_size
    }

    pub fn beta(&self) -> f64 {
        f64::from_bits(self.beta_bits.load(Ordering::Relaxed))
    }

    /// Set the importance-sampling exponent, clamped to [0, 1].
    pub fn set_beta(&self, beta: f64) {
        let beta = if beta.is_finite() { beta.clamp(0.0, 1.0) } else { 1.0 };
        self.beta_bits.store(beta.to_bits(), Ordering::Relaxed);
    }

    /// Clamp a raw priority into `[epsilon_min, priority_max]`.
    ///
    /// NaN maps to `priority_max` so an entry with unknown priority is
    /// sampled soon rather than never.
    pub fn clamp_priority(&self, priority: f32) -> f32 {
        if priority.is_nan() {
            return self.config.priority_max;
        }
        priority.clamp(self.config.epsilon_min, self.config.priority_max)
    }

    #[inline]
    fn leaf_value(&self, priority: f32) -> f64 {
        (priority as f64).powf(self.config.alpha)
    }

    /// Insert one transition, evicting the oldest entry if full.
    pub fn insert(&self, transition: SharedTransition, priority: f32) -> InsertOutcome {
        let priority = self.clamp_priority(priority);
        let leaf = self.leaf_value(priority);
        let mut index = self.index.lock();
        Self::insert_locked(&mut index, self.config.capacity, transition, priority, leaf)
    }

    /// Insert many transitions under a single lock acquisition.
    ///
    /// Entries are inserted in iteration order, so per-producer order is kept.
    pub fn insert_batch<I>(&self, items: I) -> Vec<InsertOutcome>
    where
        I: IntoIterator<Item = (SharedTransition, f32)>,
    {
        let prepared: Vec<(SharedTransition, f32, f64)> = items
            .into_iter()
            .map(|(t, p)| {
                let p = self.clamp_priority(p);
                (t, p, self.leaf_value(p))
            })
            .collect();

        let mut index = self.index.lock();
        prepared
            .into_iter()
            .map(|(t, p, leaf)| Self::insert_locked(&mut index, self.config.capacity, t, p, leaf))
            .collect()
    }

    fn insert_locked(
        index: &mut PriorityIndex,
        capacity: usize,
        transition: SharedTransition,
        priority: f32,
        leaf: f64,
    ) -> InsertOutcome {
        let id = EntryId(index.next_index);
        index.next_index += 1;
        let slot = (id.0 % capacity as u64) as usize;

        let evicted = index.slots[slot].take().map(|old| old.id);
        if evicted.is_some() {
            index.total_evicted += 1;
        } else {
            index.len += 1;
        }

        index.slots[slot] = Some(ReplayEntry {
            id,
            transition,
            priority,
            sample_count: 0,
        });
        index.tree.set(slot, leaf);

        InsertOutcome { id, evicted }
    }

    /// Draw `batch_size` distinct entries proportionally to `priority^alpha`.
    ///
    /// Fails with `EmptyBuffer` while fewer than `max(min_size, batch_size)`
    /// entries are live.
    pub fn sample(&self, batch_size: usize) -> Result<SampledBatch, ReplayError> {
        if batch_size == 0 || batch_size > self.config.capacity {
            return Err(ReplayError::InvalidBatchSize {
                requested: batch_size,
                capacity: self.config.capacity,
            });
        }

        // One offset per stratum, plus refill draws for strata that land on
        // an already drawn leaf.
        let (offsets, refills): (Vec<f64>, Vec<f64>) = {
            let mut rng = self.rng.lock();
            (0..batch_size).map(|_| (rng.gen::<f64>(), rng.gen::<f64>())).unzip()
        };

        let mut transitions = Vec::with_capacity(batch_size);
        let mut ids = Vec::with_capacity(batch_size);
        let mut probabilities = Vec::with_capacity(batch_size);
        let live;
        {
            let mut index = self.index.lock();
            let required = self.config.min_size.max(batch_size);
            if index.len < required {
                return Err(ReplayError::EmptyBuffer { len: index.len, required });
            }
            live = index.len;

            let total = index.tree.total();
            let segment = total / batch_size as f64;
            let mut drawn: Vec<(usize, f64)> = Vec::with_capacity(batch_size);
            // Masses increase with k, so repeated leaves are adjacent.
            for (k, u) in offsets.iter().enumerate() {
                let (slot, value) = index.tree.find((k as f64 + u) * segment);
                if drawn.last().map_or(true, |&(last, _)| last != slot) {
                    drawn.push((slot, value));
                }
            }
            // Zero drawn leaves so refills come from the rest of the mass
            for &(slot, _) in &drawn {
                index.tree.set(slot, 0.0);
            }
            for u in refills.into_iter().take(batch_size - drawn.len()) {
                let remaining = index.tree.total();
                if remaining <= 0.0 {
                    break;
                }
                let (slot, value) = index.tree.find(u * remaining);
                index.tree.set(slot, 0.0);
                drawn.push((slot, value));
            }
            for &(slot, value) in &drawn {
                index.tree.set(slot, value);
            }
            debug_assert_eq!(drawn.len(), batch_size, "live leaves must all be positive");

            for (slot, value) in drawn {
                if let Some(entry) = index.slots[slot].as_mut() {
                    entry.sample_count = entry.sample_count.saturating_add(1);
                    transitions.push(Arc::clone(&entry.transition));
                    ids.push(entry.id);
                    probabilities.push(value / total);
                }
            }
            index.total_sampled += ids.len() as u64;
        }

        let beta = self.beta();
        let n = live as f64;
        let raw: Vec<f64> = probabilities.iter().map(|&p| (n * p).powf(-beta)).collect();
        let max_w = raw.iter().copied().fold(0.0f64, f64::max);
        let weights = raw
            .iter()
            .map(|&w| if max_w > 0.0 { (w / max_w) as f32 } else { 1.0 })
            .collect();

        Ok(SampledBatch {
            transitions,
            weights,
            ids,
        })
    }

    /// Overwrite priorities for live entries.
    ///
    /// Ids whose entry has been evicted, and non-finite priorities, are
    /// skipped silently. Returns how many updates were skipped.
    pub fn update_priorities(&self, ids: &[EntryId], priorities: &[f32]) -> Result<usize, ReplayError> {
        if ids.len() != priorities.len() {
            return Err(ReplayError::LengthMismatch {
                ids: ids.len(),
                priorities: priorities.len(),
            });
        }

        let prepared: Vec<Option<(f32, f64)>> = priorities
            .iter()
            .map(|&p| {
                if p.is_finite() {
                    let p = self.clamp_priority(p);
                    Some((p, self.leaf_value(p)))
                } else {
                    None
                }
            })
            .collect();

        let capacity = self.config.capacity as u64;
        let mut ignored = 0;
        let mut guard = self.index.lock();
        let index = &mut *guard;
        for (id, update) in ids.iter().zip(prepared) {
            let slot = (id.0 % capacity) as usize;
            match (index.slots[slot].as_mut(), update) {
                (Some(entry), Some((priority, leaf))) if entry.id == *id => {
                    entry.priority = priority;
                    index.tree.set(slot, leaf);
                }
                _ => ignored += 1,
            }
        }
        Ok(ignored)
    }

    /// Current priority of a live entry.
    pub fn priority(&self, id: EntryId) -> Option<f32> {
        let index = self.index.lock();
        let slot = (id.0 % self.config.capacity as u64) as usize;
        index.slots[slot]
            .as_ref()
            .filter(|e| e.id == id)
            .map(|e| e.priority)
    }

    /// How many times a live entry has been sampled.
    pub fn sample_count(&self, id: EntryId) -> Option<u32> {
        let index = self.index.lock();
        let slot = (id.0 % self.config.capacity as u64) as usize;
        index.slots[slot]
            .as_ref()
            .filter(|e| e.id == id)
            .map(|e| e.sample_count)
    }

    /// All live entries ordered by insertion index.
    pub fn live_entries(&self) -> Vec<(EntryId, SharedTransition)> {
        let index = self.index.lock();
        let mut entries: Vec<_> = index
            .slots
            .iter()
            .flatten()
            .map(|e| (e.id, Arc::clone(&e.transition)))
            .collect();
        drop(index);
        entries.sort_by_key(|(id, _)| *id);
        entries
    }

    pub fn stats(&self) -> ReplayStats {
        let index = self.index.lock();
        let mut min = f32::INFINITY;
        let mut max = 0.0f32;
        let mut sum = 0.0f64;
        for entry in index.slots.iter().flatten() {
            min = min.min(entry.priority);
            max = max.max(entry.priority);
            sum += entry.priority as f64;
        }
        let len = index.len;
        ReplayStats {
            len,
            capacity: self.config.capacity,
            total_inserted: index.next_index,
            total_evicted: index.total_evicted,
            total_sampled: index.total_sampled,
            priority_min: if len > 0 { min } else { 0.0 },
            priority_max: max,
            priority_mean: if len > 0 { (sum / len as f64) as f32 } else { 0.0 },
            beta: self.beta(),
        }
    }
}

/// Shared replay buffer.
pub type SharedReplayBuffer = Arc<PrioritizedReplayBuffer>;

/// Create a shared replay buffer.
pub fn prioritized_replay(config: ReplayConfig) -> Result<SharedReplayBuffer, ConfigError> {
    PrioritizedReplayBuffer::new(config).map(Arc::new)
}

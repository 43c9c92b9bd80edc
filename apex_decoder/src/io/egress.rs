//! Policy broadcast from the learner to actors.
//!
//! Broadcast writes into each actor's single-slot inbox and never waits on
//! an actor: a slow or dead actor simply has its untaken snapshot
//! overwritten by the next one.

use crate::core::model_version::PolicySnapshot;
use crate::io::router::{Registry, RouterCounters};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Cloneable broadcast handle.
pub struct Egress<P> {
    registry: Arc<Registry<P>>,
    counters: Arc<RouterCounters>,
}

impl<P> Clone for Egress<P> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            counters: Arc::clone(&self.counters),
        }
    }
}

impl<P> Egress<P> {
    pub(crate) fn new(registry: Arc<Registry<P>>, counters: Arc<RouterCounters>) -> Self {
        Self { registry, counters }
    }

    /// Publish `snapshot` to every registered actor.
    ///
    /// Also retained so actors registered later start from it. Returns the
    /// number of inboxes that accepted it.
    pub fn broadcast(&self, snapshot: PolicySnapshot<P>) -> usize {
        {
            let mut last = self.registry.last_snapshot.lock();
            if let Some(current) = last.as_ref() {
                if current.version() > snapshot.version() {
                    return 0;
                }
            }
            *last = Some(snapshot.clone());
        }

        let delivered = self
            .registry
            .endpoints
            .lock()
            .iter()
            .filter(|e| e.inbox.publish(snapshot.clone()))
            .count();

        self.counters.broadcasts.fetch_add(1, Ordering::Relaxed);
        log::trace!("broadcast policy v{} to {} actors", snapshot.version(), delivered);
        delivered
    }

    /// Version of the last broadcast snapshot (0 = none yet).
    pub fn latest_version(&self) -> u64 {
        self.registry
            .last_snapshot
            .lock()
            .as_ref()
            .map_or(0, |s| s.version())
    }

    /// `(actor_id, generation, acknowledged version)` for each registered actor.
    pub fn acknowledgements(&self) -> Vec<(usize, u64, u64)> {
        self.registry
            .endpoints
            .lock()
            .iter()
            .map(|e| (e.actor_id, e.generation, e.inbox.acked_version()))
            .collect()
    }

    /// Lowest acknowledged version across registered actors.
    pub fn min_acknowledged(&self) -> Option<u64> {
        self.acknowledgements().into_iter().map(|(_, _, v)| v).min()
    }
}

//! Single-slot policy snapshot inbox.
//!
//! Each actor owns one `SnapshotSlot`. The router publishes into it without
//! blocking; the actor takes from it between environment steps. A newer
//! snapshot overwrites an untaken one, so a slow actor never accumulates a
//! backlog of stale parameters.
//!
//! ```text
//! Memory invariant: slot.pending <= 1 snapshot at all times
//! ```

use crate::core::model_version::PolicySnapshot;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Latest-wins mailbox for policy snapshots.
pub struct SnapshotSlot<P> {
    pending: Mutex<Option<PolicySnapshot<P>>>,
    /// Highest version ever published into this slot
    latest_version: AtomicU64,
    /// Version the owning actor reports it swapped in
    acked_version: AtomicU64,
    published_count: AtomicUsize,
    /// Snapshots overwritten before being taken
    dropped_count: AtomicUsize,
    taken_count: AtomicUsize,
}

impl<P> SnapshotSlot<P> {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(None),
            latest_version: AtomicU64::new(0),
            acked_version: AtomicU64::new(0),
            published_count: AtomicUsize::new(0),
            dropped_count: AtomicUsize::new(0),
            taken_count: AtomicUsize::new(0),
        }
    }

    /// Publish a snapshot, overwriting any untaken one.
    ///
    /// Snapshots older than the latest published version are ignored.
    /// Returns `true` if the snapshot was accepted.
    pub fn publish(&self, snapshot: PolicySnapshot<P>) -> bool {
        let mut guard = self.pending.lock();
        let version = snapshot.version();
        if version < self.latest_version.load(Ordering::Acquire) {
            return false;
        }
        if guard.is_some() {
            self.dropped_count.fetch_add(1, Ordering::Relaxed);
        }
        *guard = Some(snapshot);
        self.latest_version.store(version, Ordering::Release);
        self.published_count.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Take the pending snapshot, leaving the slot empty.
    pub fn take(&self) -> Option<PolicySnapshot<P>> {
        let taken = self.pending.lock().take();
        if taken.is_some() {
            self.taken_count.fetch_add(1, Ordering::Relaxed);
        }
        taken
    }

    pub fn has_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Record that the owner swapped in `version`.
    pub fn acknowledge(&self, version: u64) {
        self.acked_version.fetch_max(version, Ordering::AcqRel);
    }

    pub fn acked_version(&self) -> u64 {
        self.acked_version.load(Ordering::Acquire)
    }

    pub fn latest_version(&self) -> u64 {
        self.latest_version.load(Ordering::Acquire)
    }

    /// Debug counters: (published, dropped, taken)
    pub fn stats(&self) -> (usize, usize, usize) {
        (
            self.published_count.load(Ordering::Relaxed),
            self.dropped_count.load(Ordering::Relaxed),
            self.taken_count.load(Ordering::Relaxed),
        )
    }
}

impl<P> Default for SnapshotSlot<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared snapshot slot.
pub type SharedSnapshotSlot<P> = Arc<SnapshotSlot<P>>;

/// Create a new shared snapshot slot.
pub fn snapshot_slot<P>() -> SharedSnapshotSlot<P> {
    Arc::new(SnapshotSlot::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(version: u64) -> PolicySnapshot<Vec<f32>> {
        PolicySnapshot::new(version, vec![version as f32; 4])
    }

    #[test]
    fn test_publish_and_take() {
        let slot = SnapshotSlot::new();
        assert!(slot.take().is_none());
        assert!(!slot.has_pending());

        assert!(slot.publish(snap(1)));
        assert!(slot.has_pending());
        assert_eq!(slot.latest_version(), 1);

        let taken = slot.take().unwrap();
        assert_eq!(taken.version(), 1);
        assert!(slot.take().is_none());
    }

    #[test]
    fn test_overwrite_keeps_latest_only() {
        let slot = SnapshotSlot::new();
        slot.publish(snap(1));
        slot.publish(snap(2));
        slot.publish(snap(3));

        assert_eq!(slot.take().unwrap().version(), 3);
        assert!(slot.take().is_none());

        let (published, dropped, taken) = slot.stats();
        assert_eq!(published, 3);
        assert_eq!(dropped, 2);
        assert_eq!(taken, 1);
    }

    #[test]
    fn test_older_snapshot_rejected() {
        let slot = SnapshotSlot::new();
        slot.publish(snap(5));
        assert!(!slot.publish(snap(4)));
        assert_eq!(slot.take().unwrap().version(), 5);
    }

    #[test]
    fn test_acknowledge_is_monotonic() {
        let slot: SnapshotSlot<Vec<f32>> = SnapshotSlot::new();
        slot.acknowledge(4);
        slot.acknowledge(2);
        assert_eq!(slot.acked_version(), 4);
    }

    #[test]
    fn test_concurrent_publish_take_sees_whole_snapshots() {
        let slot = snapshot_slot::<Vec<f32>>();
        let publisher = {
            let slot = Arc::clone(&slot);
            std::thread::spawn(move || {
                for v in 1..=500u64 {
                    slot.publish(snap(v));
                }
            })
        };

        let mut last = 0u64;
        while last < 500 {
            if let Some(s) = slot.take() {
                // Every parameter carries the snapshot's own version
                assert!(s.params().iter().all(|&p| p == s.version() as f32));
                assert!(s.version() > last);
                last = s.version();
            }
        }
        publisher.join().unwrap();
    }
}

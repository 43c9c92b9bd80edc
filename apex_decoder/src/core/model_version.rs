//! Versioned policy snapshots.
//!
//! The learner owns the only mutable copy of the policy. Every broadcast
//! produces a `PolicySnapshot`: an immutable parameter set behind an `Arc`
//! tagged with a monotonically increasing version. Actors replace their
//! snapshot wholesale on receipt, so no reader ever observes a partially
//! updated parameter set.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Atomic version counter for policy snapshots.
#[derive(Debug)]
pub struct VersionCounter {
    version: AtomicU64,
}

impl VersionCounter {
    /// Create a new version counter starting at 0.
    pub fn new() -> Self {
        Self {
            version: AtomicU64::new(0),
        }
    }

    /// Increment and return the new version.
    pub fn increment(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Current version without incrementing.
    pub fn current(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }
}

impl Default for VersionCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable, versioned policy parameters.
///
/// Cloning is cheap: only the `Arc` is cloned, never the parameters.
#[derive(Debug)]
pub struct PolicySnapshot<P> {
    version: u64,
    params: Arc<P>,
}

impl<P> Clone for PolicySnapshot<P> {
    fn clone(&self) -> Self {
        Self {
            version: self.version,
            params: Arc::clone(&self.params),
        }
    }
}

impl<P> PolicySnapshot<P> {
    pub fn new(version: u64, params: P) -> Self {
        Self {
            version,
            params: Arc::new(params),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn params(&self) -> &P {
        &self.params
    }
}

/// Shared version counter.
pub type SharedVersionCounter = Arc<VersionCounter>;

/// Create a new shared version counter.
pub fn version_counter() -> SharedVersionCounter {
    Arc::new(VersionCounter::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_counter_increment() {
        let counter = VersionCounter::new();
        assert_eq!(counter.current(), 0);
        assert_eq!(counter.increment(), 1);
        assert_eq!(counter.increment(), 2);
        assert_eq!(counter.current(), 2);
    }

    #[test]
    fn test_version_counter_concurrent() {
        let counter = version_counter();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let c = Arc::clone(&counter);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        c.increment();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.current(), 400);
    }

    #[test]
    fn test_snapshot_clone_shares_params() {
        let snap = PolicySnapshot::new(3, vec![1.0f32, 2.0]);
        let other = snap.clone();
        assert!(std::ptr::eq(snap.params(), other.params()));
        assert_eq!(other.version(), 3);
    }
}

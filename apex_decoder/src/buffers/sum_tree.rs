//! Sum tree for proportional prioritized sampling.
//!
//! A complete binary tree stored in one array: the first `capacity - 1`
//! nodes are internal sums, the last `capacity` nodes are leaves holding
//! `priority^alpha` for each replay slot.
//!
//! Parents are recomputed from their children on every update instead of
//! accumulating deltas, so the root stays equal to the sum of leaves without
//! floating-point drift.

/// Binary sum tree over a fixed number of leaves.
#[derive(Debug, Clone)]
pub struct SumTree {
    /// Tree nodes: first `capacity - 1` are internal, the rest are leaves.
    nodes: Vec<f64>,
    capacity: usize,
}

impl SumTree {
    /// Create a tree with `capacity` zero leaves.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "SumTree capacity must be > 0");
        Self {
            nodes: vec![0.0; 2 * capacity - 1],
            capacity,
        }
    }

    #[inline]
    fn leaf_node(&self, leaf: usize) -> usize {
        self.capacity - 1 + leaf
    }

    /// Set the value of a leaf and refresh its ancestors.
    pub fn set(&mut self, leaf: usize, value: f64) {
        debug_assert!(leaf < self.capacity, "leaf {} out of range", leaf);
        debug_assert!(value >= 0.0 && value.is_finite(), "invalid leaf value {}", value);

        let mut node = self.leaf_node(leaf);
        self.nodes[node] = value;
        while node > 0 {
            node = (node - 1) / 2;
            self.nodes[node] = self.nodes[2 * node + 1] + self.nodes[2 * node + 2];
        }
    }

    /// Value stored at a leaf.
    pub fn get(&self, leaf: usize) -> f64 {
        self.nodes[self.leaf_node(leaf)]
    }

    /// Sum of all leaves.
    pub fn total(&self) -> f64 {
        self.nodes[0]
    }

    /// Find the leaf whose cumulative mass interval contains `mass`.
    ///
    /// Zero-valued subtrees are never descended into while the total is
    /// positive, so the returned leaf always has a non-zero value unless
    /// the whole tree is empty. `mass` values at or beyond the total land on
    /// the right-most non-zero leaf.
    pub fn find(&self, mass: f64) -> (usize, f64) {
        let mut mass = mass.max(0.0);
        let mut node = 0;

        while node < self.capacity - 1 {
            let left = 2 * node + 1;
            let right = left + 1;
            if mass < self.nodes[left] || self.nodes[right] <= 0.0 {
                node = left;
            } else {
                mass -= self.nodes[left];
                node = right;
            }
        }

        (node - (self.capacity - 1), self.nodes[node])
    }

    /// Smallest non-zero leaf value, if any.
    pub fn min_nonzero(&self) -> Option<f64> {
        self.nodes[self.capacity - 1..]
            .iter()
            .copied()
            .filter(|&v| v > 0.0)
            .fold(None, |acc, v| Some(acc.map_or(v, |m: f64| m.min(v))))
    }

    /// Largest leaf value.
    pub fn max_leaf(&self) -> f64 {
        self.nodes[self.capacity - 1..]
            .iter()
            .copied()
            .fold(0.0, f64::max)
    }

    /// Number of leaves.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_tracks_leaves() {
        let mut tree = SumTree::new(4);
        tree.set(0, 1.0);
        tree.set(1, 2.0);
        tree.set(2, 3.0);
        tree.set(3, 4.0);
        assert!((tree.total() - 10.0).abs() < 1e-12);

        tree.set(1, 0.5);
        assert!((tree.total() - 8.5).abs() < 1e-12);
        assert_eq!(tree.get(1), 0.5);
    }

    #[test]
    fn test_find_boundaries() {
        let mut tree = SumTree::new(4);
        for (i, p) in [1.0, 2.0, 3.0, 4.0].iter().enumerate() {
            tree.set(i, *p);
        }
        assert_eq!(tree.find(0.5).0, 0);
        assert_eq!(tree.find(2.5).0, 1);
        assert_eq!(tree.find(5.5).0, 2);
        assert_eq!(tree.find(9.5).0, 3);
        // Past the end clamps to the last non-zero leaf
        assert_eq!(tree.find(42.0).0, 3);
    }

    #[test]
    fn test_find_skips_zero_leaves() {
        let mut tree = SumTree::new(5);
        tree.set(1, 1.0);
        tree.set(3, 1.0);
        for i in 0..100 {
            let mass = tree.total() * i as f64 / 100.0;
            let (leaf, value) = tree.find(mass);
            assert!(leaf == 1 || leaf == 3, "picked zero leaf {}", leaf);
            assert!(value > 0.0);
        }
        assert_eq!(tree.find(tree.total()).1, 1.0);
    }

    #[test]
    fn test_non_power_of_two_capacity() {
        let mut tree = SumTree::new(7);
        for i in 0..7 {
            tree.set(i, (i + 1) as f64);
        }
        assert!((tree.total() - 28.0).abs() < 1e-12);

        let mut seen = [0usize; 7];
        for k in 0..28 {
            let (leaf, _) = tree.find(k as f64 + 0.5);
            seen[leaf] += 1;
        }
        // Each leaf owns a mass interval equal to its value
        for (i, count) in seen.iter().enumerate() {
            assert_eq!(*count, i + 1);
        }
    }

    #[test]
    fn test_min_and_max() {
        let mut tree = SumTree::new(3);
        assert_eq!(tree.min_nonzero(), None);
        tree.set(0, 2.0);
        tree.set(2, 0.25);
        assert_eq!(tree.min_nonzero(), Some(0.25));
        assert_eq!(tree.max_leaf(), 2.0);
    }

    #[test]
    fn test_single_leaf() {
        let mut tree = SumTree::new(1);
        tree.set(0, 3.0);
        assert_eq!(tree.total(), 3.0);
        assert_eq!(tree.find(1.0), (0, 3.0));
    }
}

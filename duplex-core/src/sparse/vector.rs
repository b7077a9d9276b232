//! Hybrid dense/indexed vector for FTRAN and BTRAN results.
//!
//! A `SparseVector` always carries a full dense array; when `index_valid` is
//! true the `index` list enumerates every nonzero and all entries outside it
//! are exactly 0.0. Kernels that would have to maintain the list at
//! quadratic cost instead call [`SparseVector::invalidate_index`] and switch
//! to dense scans.

/// Density above which callers should prefer a dense scan of `array` over
/// traversal of the index list.
pub const DENSE_SCAN_DENSITY: f64 = 0.1;

/// Vector of dimension `dim` with an optional list of nonzero positions.
#[derive(Clone, Debug)]
pub struct SparseVector {
    dim: usize,
    /// Number of valid entries in `index`. Meaningless when `index_valid`
    /// is false.
    pub count: usize,
    /// Positions of the nonzeros, in no particular order.
    pub index: Vec<usize>,
    /// Dense values, always length `dim`.
    pub array: Vec<f64>,
    /// True while `index[..count]` enumerates every nonzero of `array`.
    pub index_valid: bool,
    /// Number of packed entries.
    pub pack_count: usize,
    /// Packed copy of the index list, surviving reuse of `array`.
    pub pack_index: Vec<usize>,
    /// Packed copy of the nonzero values.
    pub pack_value: Vec<f64>,
}

impl SparseVector {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            count: 0,
            index: vec![0; dim],
            array: vec![0.0; dim],
            index_valid: true,
            pack_count: 0,
            pack_index: vec![0; dim],
            pack_value: vec![0.0; dim],
        }
    }

    /// Re-dimension, clearing all contents.
    pub fn setup(&mut self, dim: usize) {
        self.dim = dim;
        self.count = 0;
        self.index = vec![0; dim];
        self.array = vec![0.0; dim];
        self.index_valid = true;
        self.pack_count = 0;
        self.pack_index = vec![0; dim];
        self.pack_value = vec![0.0; dim];
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Fraction of entries recorded in the index list.
    pub fn density(&self) -> f64 {
        if self.dim == 0 {
            0.0
        } else {
            self.count as f64 / self.dim as f64
        }
    }

    /// Zero the vector. Sparse-aware: when the index list is valid and
    /// short, only the indexed entries are cleared.
    pub fn clear(&mut self) {
        if self.index_valid && 10 * self.count < self.dim {
            for k in 0..self.count {
                self.array[self.index[k]] = 0.0;
            }
        } else {
            self.array.fill(0.0);
        }
        self.count = 0;
        self.index_valid = true;
        self.pack_count = 0;
    }

    /// Mark the index list as stale; readers must scan the dense array.
    pub fn invalidate_index(&mut self) {
        self.index_valid = false;
    }

    /// Rebuild the index list from a dense scan.
    pub fn reindex(&mut self) {
        self.count = 0;
        for i in 0..self.dim {
            if self.array[i] != 0.0 {
                self.index[self.count] = i;
                self.count += 1;
            }
        }
        self.index_valid = true;
    }

    /// Set a single entry, maintaining the index list. The position must
    /// currently be zero.
    pub fn scatter(&mut self, i: usize, value: f64) {
        debug_assert_eq!(self.array[i], 0.0);
        if value != 0.0 {
            self.array[i] = value;
            if self.index_valid {
                self.index[self.count] = i;
                self.count += 1;
            }
        }
    }

    /// Drop entries whose stored value has become exactly zero from the
    /// index list.
    pub fn tight(&mut self) {
        if !self.index_valid {
            return;
        }
        let mut total = 0;
        for k in 0..self.count {
            let i = self.index[k];
            if self.array[i] != 0.0 {
                self.index[total] = i;
                total += 1;
            }
        }
        self.count = total;
    }

    /// Euclidean norm of the dense array.
    pub fn norm2(&self) -> f64 {
        let sum: f64 = if self.index_valid {
            (0..self.count)
                .map(|k| {
                    let v = self.array[self.index[k]];
                    v * v
                })
                .sum()
        } else {
            self.array.iter().map(|v| v * v).sum()
        };
        sum.sqrt()
    }

    /// Copy the nonzeros into the pack arrays so `array` can be reused
    /// while the packed form is still needed.
    pub fn pack(&mut self) {
        debug_assert!(self.index_valid);
        self.pack_count = 0;
        for k in 0..self.count {
            let i = self.index[k];
            self.pack_index[self.pack_count] = i;
            self.pack_value[self.pack_count] = self.array[i];
            self.pack_count += 1;
        }
    }

    /// Iterate over the packed (index, value) pairs.
    pub fn packed(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        (0..self.pack_count).map(|k| (self.pack_index[k], self.pack_value[k]))
    }

    /// self += multiplier * pivot, maintaining this vector's index list.
    pub fn saxpy(&mut self, multiplier: f64, pivot: &SparseVector) {
        debug_assert!(pivot.index_valid);
        debug_assert_eq!(self.dim, pivot.dim);
        for k in 0..pivot.count {
            let i = pivot.index[k];
            let x0 = self.array[i];
            let x1 = x0 + multiplier * pivot.array[i];
            if x0 == 0.0 && self.index_valid {
                self.index[self.count] = i;
                self.count += 1;
            }
            self.array[i] = if x1.abs() < ZERO_DROP { 1e-50 } else { x1 };
        }
    }

    /// Copy contents from another vector of the same dimension.
    pub fn copy_from(&mut self, from: &SparseVector) {
        self.clear();
        debug_assert_eq!(self.dim, from.dim);
        if from.index_valid {
            self.count = from.count;
            for k in 0..from.count {
                let i = from.index[k];
                self.index[k] = i;
                self.array[i] = from.array[i];
            }
            self.index_valid = true;
        } else {
            self.array.copy_from_slice(&from.array);
            self.index_valid = false;
        }
    }
}

/// Cancellation guard: values this small after an axpy are replaced by a
/// tiny nonzero so the index list stays exact without repeated membership
/// tests.
const ZERO_DROP: f64 = 1e-14;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scatter_and_norm() {
        let mut v = SparseVector::new(5);
        v.scatter(1, 3.0);
        v.scatter(4, 4.0);
        assert_eq!(v.count, 2);
        assert!((v.norm2() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_clear_sparse_path() {
        let mut v = SparseVector::new(100);
        v.scatter(7, 1.0);
        v.scatter(93, -2.0);
        v.clear();
        assert_eq!(v.count, 0);
        assert!(v.array.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_pack_survives_reuse() {
        let mut v = SparseVector::new(4);
        v.scatter(2, 5.0);
        v.pack();
        v.clear();
        v.scatter(0, 1.0);
        let packed: Vec<_> = v.packed().collect();
        assert_eq!(packed, vec![(2, 5.0)]);
    }

    #[test]
    fn test_saxpy_tracks_new_indices() {
        let mut a = SparseVector::new(4);
        a.scatter(0, 1.0);
        let mut b = SparseVector::new(4);
        b.scatter(0, 2.0);
        b.scatter(3, 1.0);
        a.saxpy(2.0, &b);
        a.tight();
        assert_eq!(a.array[0], 5.0);
        assert_eq!(a.array[3], 2.0);
        assert_eq!(a.count, 2);
    }

    #[test]
    fn test_reindex_after_dense_write() {
        let mut v = SparseVector::new(6);
        v.invalidate_index();
        v.array[3] = 2.5;
        v.array[5] = -1.0;
        v.reindex();
        assert!(v.index_valid);
        assert_eq!(v.count, 2);
    }
}

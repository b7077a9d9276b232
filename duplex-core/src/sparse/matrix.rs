//! Column-wise and row-wise views of the constraint matrix.
//!
//! The column copy is the LP's CSC arrays. The row copy partitions each
//! row's entries nonbasic-first so that row-wise PRICE touches only the
//! nonbasic part; the partition boundary per row is maintained across basis
//! changes by [`ConstraintMatrix::update`].
//!
//! Logical (slack) columns are not stored: column `num_col + i` of the
//! augmented matrix `[A | -I]` is `-e_i` and is handled directly by the
//! kernels.

use crate::model::NONBASIC_FLAG_TRUE;
use crate::sparse::vector::SparseVector;

/// Entries at or below this magnitude are dropped from PRICE results.
const PRICE_TINY: f64 = 1e-14;

/// Density of the PRICE result at which row-wise PRICE switches to
/// completing the operation column-wise.
pub const DENSITY_COL_PRICE_SWITCH: f64 = 0.75;

/// Constraint matrix A stored twice: CSC and basis-partitioned CSR.
#[derive(Debug, Clone, Default)]
pub struct ConstraintMatrix {
    num_col: usize,
    num_row: usize,

    a_start: Vec<usize>,
    a_index: Vec<usize>,
    a_value: Vec<f64>,

    ar_start: Vec<usize>,
    /// Per row, one past the last nonbasic entry: the partition boundary.
    ar_nend: Vec<usize>,
    ar_index: Vec<usize>,
    ar_value: Vec<f64>,

    /// Snapshot of the structural part of `nonbasic_flag`, kept in step
    /// with the partition by `update`.
    nonbasic_flag: Vec<i8>,
}

impl ConstraintMatrix {
    /// Build both copies from CSC arrays and the structural nonbasic flags.
    /// `nonbasic_flag` may be the full combined-space array; only the first
    /// `num_col` entries are read.
    pub fn setup(
        num_col: usize,
        num_row: usize,
        a_start: &[usize],
        a_index: &[usize],
        a_value: &[f64],
        nonbasic_flag: &[i8],
    ) -> Self {
        let nnz = a_start[num_col];
        let flag: Vec<i8> = nonbasic_flag[..num_col].to_vec();

        let mut total = vec![0usize; num_row];
        let mut nonbasic = vec![0usize; num_row];
        for j in 0..num_col {
            for k in a_start[j]..a_start[j + 1] {
                let i = a_index[k];
                total[i] += 1;
                if flag[j] == NONBASIC_FLAG_TRUE {
                    nonbasic[i] += 1;
                }
            }
        }

        let mut ar_start = vec![0usize; num_row + 1];
        for i in 0..num_row {
            ar_start[i + 1] = ar_start[i] + total[i];
        }
        let ar_nend: Vec<usize> = (0..num_row).map(|i| ar_start[i] + nonbasic[i]).collect();

        let mut fill_nonbasic: Vec<usize> = (0..num_row).map(|i| ar_start[i]).collect();
        let mut fill_basic = ar_nend.clone();
        let mut ar_index = vec![0usize; nnz];
        let mut ar_value = vec![0.0; nnz];
        for j in 0..num_col {
            for k in a_start[j]..a_start[j + 1] {
                let i = a_index[k];
                let p = if flag[j] == NONBASIC_FLAG_TRUE {
                    let p = fill_nonbasic[i];
                    fill_nonbasic[i] += 1;
                    p
                } else {
                    let p = fill_basic[i];
                    fill_basic[i] += 1;
                    p
                };
                ar_index[p] = j;
                ar_value[p] = a_value[k];
            }
        }

        ConstraintMatrix {
            num_col,
            num_row,
            a_start: a_start.to_vec(),
            a_index: a_index.to_vec(),
            a_value: a_value.to_vec(),
            ar_start,
            ar_nend,
            ar_index,
            ar_value,
            nonbasic_flag: flag,
        }
    }

    pub fn num_col(&self) -> usize {
        self.num_col
    }

    pub fn num_row(&self) -> usize {
        self.num_row
    }

    /// The (indices, values) pair of structural column `j`.
    pub fn col(&self, j: usize) -> (&[usize], &[f64]) {
        let lo = self.a_start[j];
        let hi = self.a_start[j + 1];
        (&self.a_index[lo..hi], &self.a_value[lo..hi])
    }

    /// Move the entering variable's entries into the basic sections and the
    /// leaving variable's entries into the nonbasic sections. Logical
    /// variables have no stored entries and are skipped.
    pub fn update(&mut self, var_in: usize, var_out: usize) {
        if var_in < self.num_col {
            for k in self.a_start[var_in]..self.a_start[var_in + 1] {
                let i = self.a_index[k];
                let section = self.ar_start[i]..self.ar_nend[i];
                let mut at = usize::MAX;
                for p in section {
                    if self.ar_index[p] == var_in {
                        at = p;
                        break;
                    }
                }
                debug_assert_ne!(at, usize::MAX);
                let last = self.ar_nend[i] - 1;
                self.ar_index.swap(at, last);
                self.ar_value.swap(at, last);
                self.ar_nend[i] = last;
            }
            self.nonbasic_flag[var_in] = 0;
        }
        if var_out < self.num_col {
            for k in self.a_start[var_out]..self.a_start[var_out + 1] {
                let i = self.a_index[k];
                let section = self.ar_nend[i]..self.ar_start[i + 1];
                let mut at = usize::MAX;
                for p in section {
                    if self.ar_index[p] == var_out {
                        at = p;
                        break;
                    }
                }
                debug_assert_ne!(at, usize::MAX);
                let first = self.ar_nend[i];
                self.ar_index.swap(at, first);
                self.ar_value.swap(at, first);
                self.ar_nend[i] = first + 1;
            }
            self.nonbasic_flag[var_out] = NONBASIC_FLAG_TRUE;
        }
    }

    /// vector += multiplier * (column j of [A | -I]).
    pub fn collect_aj(&self, vector: &mut SparseVector, j: usize, multiplier: f64) {
        if j < self.num_col {
            for k in self.a_start[j]..self.a_start[j + 1] {
                let i = self.a_index[k];
                let x0 = vector.array[i];
                let x1 = x0 + multiplier * self.a_value[k];
                if x0 == 0.0 {
                    vector.index[vector.count] = i;
                    vector.count += 1;
                }
                vector.array[i] = if x1.abs() < PRICE_TINY { 1e-50 } else { x1 };
            }
        } else {
            let i = j - self.num_col;
            let x0 = vector.array[i];
            let x1 = x0 - multiplier;
            if x0 == 0.0 {
                vector.index[vector.count] = i;
                vector.count += 1;
            }
            vector.array[i] = if x1.abs() < PRICE_TINY { 1e-50 } else { x1 };
        }
    }

    /// row_ap = row_ep' A over nonbasic structural columns, column-wise.
    pub fn price_by_column(&self, row_ap: &mut SparseVector, row_ep: &SparseVector) {
        row_ap.clear();
        for j in 0..self.num_col {
            if self.nonbasic_flag[j] != NONBASIC_FLAG_TRUE {
                continue;
            }
            let mut value = 0.0;
            for k in self.a_start[j]..self.a_start[j + 1] {
                value += row_ep.array[self.a_index[k]] * self.a_value[k];
            }
            if value.abs() > PRICE_TINY {
                row_ap.scatter(j, value);
            }
        }
    }

    /// row_ap = row_ep' A using the row-wise nonbasic partition.
    pub fn price_by_row(&self, row_ap: &mut SparseVector, row_ep: &SparseVector) {
        row_ap.clear();
        self.price_by_row_from(row_ap, row_ep, 0);
        drop_small_values(row_ap);
    }

    /// Row-wise PRICE that completes column-wise once the accumulated
    /// result density exceeds `switch_density`.
    pub fn price_by_row_with_switch(
        &self,
        row_ap: &mut SparseVector,
        row_ep: &SparseVector,
        switch_density: f64,
    ) {
        row_ap.clear();
        let mut next_k = 0;
        while next_k < row_ep.count {
            let density = row_ap.count as f64 / self.num_col.max(1) as f64;
            if density > switch_density {
                break;
            }
            self.price_row_entry(row_ap, row_ep, next_k);
            next_k += 1;
        }
        if next_k < row_ep.count {
            // Complete the remaining rows by column PRICE.
            let mut remaining = vec![0.0; self.num_row];
            for k in next_k..row_ep.count {
                let i = row_ep.index[k];
                remaining[i] = row_ep.array[i];
            }
            for j in 0..self.num_col {
                if self.nonbasic_flag[j] != NONBASIC_FLAG_TRUE {
                    continue;
                }
                let mut value = 0.0;
                for k in self.a_start[j]..self.a_start[j + 1] {
                    value += remaining[self.a_index[k]] * self.a_value[k];
                }
                if value != 0.0 {
                    let x0 = row_ap.array[j];
                    if x0 == 0.0 {
                        row_ap.index[row_ap.count] = j;
                        row_ap.count += 1;
                    }
                    let x1 = x0 + value;
                    row_ap.array[j] = if x1.abs() < PRICE_TINY { 1e-50 } else { x1 };
                }
            }
        }
        drop_small_values(row_ap);
    }

    /// Row-wise PRICE keeping the result in indexed form throughout.
    pub fn price_by_row_sparse_result(&self, row_ap: &mut SparseVector, row_ep: &SparseVector) {
        row_ap.clear();
        self.price_by_row_from(row_ap, row_ep, 0);
        drop_small_values(row_ap);
        debug_assert!(row_ap.index_valid);
    }

    fn price_by_row_from(&self, row_ap: &mut SparseVector, row_ep: &SparseVector, from_k: usize) {
        for k in from_k..row_ep.count {
            self.price_row_entry(row_ap, row_ep, k);
        }
    }

    fn price_row_entry(&self, row_ap: &mut SparseVector, row_ep: &SparseVector, k: usize) {
        let i = row_ep.index[k];
        let multiplier = row_ep.array[i];
        for p in self.ar_start[i]..self.ar_nend[i] {
            let j = self.ar_index[p];
            let x0 = row_ap.array[j];
            let x1 = x0 + multiplier * self.ar_value[p];
            if x0 == 0.0 {
                row_ap.index[row_ap.count] = j;
                row_ap.count += 1;
            }
            row_ap.array[j] = if x1.abs() < PRICE_TINY { 1e-50 } else { x1 };
        }
    }

    /// Dot product of column j of [A | -I] with a dense vector.
    pub fn compute_dot(&self, vector: &[f64], j: usize) -> f64 {
        if j < self.num_col {
            let mut value = 0.0;
            for k in self.a_start[j]..self.a_start[j + 1] {
                value += vector[self.a_index[k]] * self.a_value[k];
            }
            value
        } else {
            -vector[j - self.num_col]
        }
    }
}

/// Compact the index list, dropping entries at or below the PRICE
/// cancellation tolerance.
fn drop_small_values(row_ap: &mut SparseVector) {
    debug_assert!(row_ap.index_valid);
    let mut total = 0;
    for k in 0..row_ap.count {
        let j = row_ap.index[k];
        let value = row_ap.array[j];
        if value.abs() > PRICE_TINY {
            row_ap.index[total] = j;
            total += 1;
        } else {
            row_ap.array[j] = 0.0;
        }
    }
    row_ap.count = total;
}

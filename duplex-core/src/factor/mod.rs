//! Invertible representation of the simplex basis matrix.
//!
//! [`BasisFactor`] holds a sparse LU factorisation of B, the matrix formed
//! from the columns of `[A | -I]` listed in `basic_index`, and supports the
//! three operations the dual simplex engine needs:
//!
//! - `ftran`: solve B y = x,
//! - `btran`: solve B' y = x,
//! - `update`: a rank-1 replacement of one basis column.
//!
//! # Factorisation
//!
//! `build` runs a left-looking sparse elimination. Basis columns are
//! processed in increasing nonzero-count order, so singleton columns pivot
//! first; within a column the pivot row is chosen among the rows passing
//! the relative stability threshold (`pivot_threshold`, default 0.1 of the
//! column max) by smallest static row count, Markowitz style. A column with
//! no admissible pivot marks the basis rank deficient; deficient positions
//! are replaced by the logicals of unpivoted rows in `basic_index` and the
//! factorisation is retried.
//!
//! # Update
//!
//! The rank-1 update is held in product form: replacing the column in basis
//! position p by the entering column a_q appends an eta built from
//! alpha = B^-1 a_q. FTRAN applies the etas after the factor solve in
//! creation order; BTRAN applies their transposes in reverse order before
//! the factor solve. The update is rejected, leaving the caller to
//! refactorise, when the new pivot alpha_p is tiny or the eta growth
//! exceeds `growth_limit`.
//!
//! Index spaces: FTRAN maps the constraint-row space to the basis-position
//! space, BTRAN the reverse. Both solves are sparse-aware, skipping
//! elimination steps whose pivot entry is zero.

use thiserror::Error;

use crate::sparse::matrix::ConstraintMatrix;
use crate::sparse::vector::SparseVector;

const NO_STEP: usize = usize::MAX;
/// Values this small after elimination are kept as a tiny nonzero so index
/// lists stay exact.
const FACTOR_TINY: f64 = 1e-14;
/// Repair-and-retry attempts for rank-deficient bases.
const MAX_BUILD_ATTEMPTS: usize = 3;

/// Factorisation failures. Recoverable ones surface as invert hints at the
/// engine level.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorError {
    /// Basis singular even after replacing deficient columns by logicals.
    #[error("basis matrix is singular")]
    Singular,

    /// Update pivot below the minimum magnitude.
    #[error("update pivot too small")]
    SmallPivot,

    /// Eta growth above the configured limit.
    #[error("update growth factor exceeds limit")]
    ExcessiveGrowth,
}

/// LU factorisation of the basis matrix with product-form updates.
#[derive(Debug, Clone)]
pub struct BasisFactor {
    num_row: usize,

    // Pivot sequence: step k eliminated basis position basis_pos[k] with
    // pivot row pivot_row[k].
    pivot_row: Vec<usize>,
    basis_pos: Vec<usize>,
    row_step: Vec<usize>,
    u_pivot: Vec<f64>,

    // L multipliers per step, indexed by original row.
    l_start: Vec<usize>,
    l_index: Vec<usize>,
    l_value: Vec<f64>,

    // U off-diagonal entries per step, indexed by earlier step.
    u_start: Vec<usize>,
    u_index: Vec<usize>,
    u_value: Vec<f64>,

    // Product-form etas, indexed by basis position.
    eta_pos: Vec<usize>,
    eta_pivot: Vec<f64>,
    eta_start: Vec<usize>,
    eta_index: Vec<usize>,
    eta_value: Vec<f64>,

    update_count: usize,
    fresh: bool,

    /// Step-space scratch reused by every solve and update.
    scratch: Vec<f64>,

    /// Relative stability threshold for build pivots.
    pub pivot_threshold: f64,
    /// Absolute magnitude below which a candidate pivot marks the column
    /// dependent.
    pub singular_tolerance: f64,
    /// Eta growth factor above which an update is rejected.
    pub growth_limit: f64,
    /// Minimum magnitude for an update pivot.
    pub min_update_pivot: f64,

    /// Work measure of the last build, for the synthetic clock.
    pub build_synthetic_tick: f64,
}

impl BasisFactor {
    pub fn new(num_row: usize) -> Self {
        BasisFactor {
            num_row,
            pivot_row: Vec::new(),
            basis_pos: Vec::new(),
            row_step: vec![NO_STEP; num_row],
            u_pivot: Vec::new(),
            l_start: vec![0],
            l_index: Vec::new(),
            l_value: Vec::new(),
            u_start: vec![0],
            u_index: Vec::new(),
            u_value: Vec::new(),
            eta_pos: Vec::new(),
            eta_pivot: Vec::new(),
            eta_start: vec![0],
            eta_index: Vec::new(),
            eta_value: Vec::new(),
            update_count: 0,
            fresh: false,
            scratch: vec![0.0; num_row],
            pivot_threshold: 0.1,
            singular_tolerance: 1e-11,
            growth_limit: 1e14,
            min_update_pivot: 1e-9,
            build_synthetic_tick: 0.0,
        }
    }

    /// True immediately after a full refactor, until the first update.
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    /// Rank-1 updates applied since the last build.
    pub fn update_count(&self) -> usize {
        self.update_count
    }

    /// Complete refactorisation of the basis listed in `basic_index`.
    ///
    /// Rank-deficient positions are replaced in `basic_index` by the
    /// logicals of unpivoted rows and the factorisation retried. Returns
    /// the number of replacements made.
    pub fn build(
        &mut self,
        basic_index: &mut [usize],
        matrix: &ConstraintMatrix,
    ) -> Result<usize, FactorError> {
        debug_assert_eq!(basic_index.len(), self.num_row);
        let mut total_deficiency = 0;
        for _ in 0..MAX_BUILD_ATTEMPTS {
            let deficient = self.try_build(basic_index, matrix);
            if deficient.is_empty() {
                self.fresh = true;
                self.update_count = 0;
                self.eta_pos.clear();
                self.eta_pivot.clear();
                self.eta_start.clear();
                self.eta_start.push(0);
                self.eta_index.clear();
                self.eta_value.clear();
                return Ok(total_deficiency);
            }
            // Replace each deficient position by the logical of an
            // unpivoted row, then retry.
            let mut unpivoted: Vec<usize> = (0..self.num_row)
                .filter(|&i| self.row_step[i] == NO_STEP)
                .collect();
            debug_assert!(unpivoted.len() >= deficient.len());
            for &pos in &deficient {
                let row = match unpivoted.pop() {
                    Some(row) => row,
                    None => return Err(FactorError::Singular),
                };
                basic_index[pos] = matrix.num_col() + row;
                total_deficiency += 1;
            }
        }
        Err(FactorError::Singular)
    }

    /// One factorisation pass. Returns the basis positions for which no
    /// admissible pivot was found; on success the factor arrays are
    /// complete.
    fn try_build(&mut self, basic_index: &[usize], matrix: &ConstraintMatrix) -> Vec<usize> {
        let m = self.num_row;
        self.pivot_row.clear();
        self.basis_pos.clear();
        self.u_pivot.clear();
        self.row_step.fill(NO_STEP);
        self.l_start.clear();
        self.l_start.push(0);
        self.l_index.clear();
        self.l_value.clear();
        self.u_start.clear();
        self.u_start.push(0);
        self.u_index.clear();
        self.u_value.clear();
        self.build_synthetic_tick = 0.0;

        // Static row counts over the basis matrix, for the Markowitz bias.
        let mut row_count = vec![0usize; m];
        let mut col_count = vec![0usize; m];
        for (pos, &var) in basic_index.iter().enumerate() {
            if var < matrix.num_col() {
                let (index, _) = matrix.col(var);
                col_count[pos] = index.len();
                for &i in index {
                    row_count[i] += 1;
                }
            } else {
                col_count[pos] = 1;
                row_count[var - matrix.num_col()] += 1;
            }
        }

        // Process basis columns in increasing count order: singletons first.
        let mut order: Vec<usize> = (0..m).collect();
        order.sort_by_key(|&pos| (col_count[pos], pos));

        let mut work = SparseVector::new(m);
        let mut deficient = Vec::new();

        for &pos in &order {
            // Load the basis column.
            work.clear();
            let var = basic_index[pos];
            if var < matrix.num_col() {
                let (index, value) = matrix.col(var);
                for (&i, &v) in index.iter().zip(value) {
                    work.scatter(i, v);
                }
            } else {
                work.scatter(var - matrix.num_col(), -1.0);
            }

            // Eliminate with the steps built so far.
            self.lsolve(&mut work);
            self.build_synthetic_tick += work.count as f64 + 1.0;

            // Pivot choice: stability threshold, then smallest row count,
            // then largest magnitude.
            let mut col_max = 0.0f64;
            for k in 0..work.count {
                let i = work.index[k];
                if self.row_step[i] == NO_STEP {
                    col_max = col_max.max(work.array[i].abs());
                }
            }
            if col_max <= self.singular_tolerance {
                deficient.push(pos);
                continue;
            }
            let admissible = self.pivot_threshold * col_max;
            let mut pivot_at = NO_STEP;
            let mut best_count = usize::MAX;
            let mut best_abs = 0.0f64;
            for k in 0..work.count {
                let i = work.index[k];
                if self.row_step[i] != NO_STEP {
                    continue;
                }
                let a = work.array[i].abs();
                if a < admissible || a <= self.singular_tolerance {
                    continue;
                }
                if row_count[i] < best_count || (row_count[i] == best_count && a > best_abs) {
                    pivot_at = i;
                    best_count = row_count[i];
                    best_abs = a;
                }
            }
            debug_assert_ne!(pivot_at, NO_STEP);
            let pivot_value = work.array[pivot_at];

            // Store U entries (already-pivotal rows) and L multipliers.
            let step = self.pivot_row.len();
            for k in 0..work.count {
                let i = work.index[k];
                let value = work.array[i];
                if value.abs() <= FACTOR_TINY {
                    continue;
                }
                if i == pivot_at {
                    continue;
                }
                let t = self.row_step[i];
                if t != NO_STEP {
                    self.u_index.push(t);
                    self.u_value.push(value);
                } else {
                    self.l_index.push(i);
                    self.l_value.push(value / pivot_value);
                }
            }
            self.u_start.push(self.u_index.len());
            self.l_start.push(self.l_index.len());
            self.u_pivot.push(pivot_value);
            self.pivot_row.push(pivot_at);
            self.basis_pos.push(pos);
            self.row_step[pivot_at] = step;
        }

        deficient
    }

    /// Apply the stored eliminations in step order: rhs <- L^-1 rhs.
    fn lsolve(&self, rhs: &mut SparseVector) {
        for step in 0..self.pivot_row.len() {
            let pivot_entry = rhs.array[self.pivot_row[step]];
            if pivot_entry == 0.0 {
                continue;
            }
            for p in self.l_start[step]..self.l_start[step + 1] {
                let i = self.l_index[p];
                let x0 = rhs.array[i];
                let x1 = x0 - self.l_value[p] * pivot_entry;
                if x0 == 0.0 {
                    rhs.index[rhs.count] = i;
                    rhs.count += 1;
                }
                rhs.array[i] = if x1.abs() < FACTOR_TINY { 1e-50 } else { x1 };
            }
        }
    }

    /// Solve B y = rhs in place. On entry rhs is in the constraint-row
    /// space; on return it holds y in the basis-position space.
    pub fn ftran(&mut self, rhs: &mut SparseVector) {
        debug_assert!(rhs.index_valid);
        let m = self.num_row;
        self.lsolve(rhs);

        // Gather into step space and clear the row-space array.
        for step in 0..m {
            self.scratch[step] = rhs.array[self.pivot_row[step]];
        }
        for k in 0..rhs.count {
            rhs.array[rhs.index[k]] = 0.0;
        }
        rhs.count = 0;

        // Back substitution on U, skipping zero steps.
        for step in (0..m).rev() {
            let z = self.scratch[step];
            if z == 0.0 {
                continue;
            }
            let w = z / self.u_pivot[step];
            self.scratch[step] = w;
            for p in self.u_start[step]..self.u_start[step + 1] {
                self.scratch[self.u_index[p]] -= self.u_value[p] * w;
            }
        }

        // Scatter into basis-position space.
        for step in 0..m {
            let w = self.scratch[step];
            self.scratch[step] = 0.0;
            if w != 0.0 && w.abs() > FACTOR_TINY {
                rhs.scatter(self.basis_pos[step], w);
            }
        }

        // Apply the update etas in creation order.
        for e in 0..self.eta_pos.len() {
            let p = self.eta_pos[e];
            let y_p = rhs.array[p];
            if y_p == 0.0 {
                continue;
            }
            let w_p = y_p / self.eta_pivot[e];
            rhs.array[p] = w_p;
            for q in self.eta_start[e]..self.eta_start[e + 1] {
                let i = self.eta_index[q];
                let x0 = rhs.array[i];
                let x1 = x0 - self.eta_value[q] * w_p;
                if x0 == 0.0 {
                    rhs.index[rhs.count] = i;
                    rhs.count += 1;
                }
                rhs.array[i] = if x1.abs() < FACTOR_TINY { 1e-50 } else { x1 };
            }
        }
        rhs.tight();
    }

    /// Solve B' y = rhs in place. On entry rhs is in the basis-position
    /// space; on return it holds y in the constraint-row space.
    pub fn btran(&mut self, rhs: &mut SparseVector) {
        debug_assert!(rhs.index_valid);
        let m = self.num_row;

        // Transposed etas in reverse creation order.
        for e in (0..self.eta_pos.len()).rev() {
            let p = self.eta_pos[e];
            let mut acc = rhs.array[p];
            let had_entry = acc != 0.0;
            for q in self.eta_start[e]..self.eta_start[e + 1] {
                acc -= self.eta_value[q] * rhs.array[self.eta_index[q]];
            }
            let w_p = acc / self.eta_pivot[e];
            if w_p != 0.0 && !had_entry {
                rhs.index[rhs.count] = p;
                rhs.count += 1;
            }
            rhs.array[p] = if w_p.abs() < FACTOR_TINY && w_p != 0.0 {
                1e-50
            } else {
                w_p
            };
        }

        // Gather c'_k = rhs[basis_pos[k]] and clear.
        for step in 0..m {
            self.scratch[step] = rhs.array[self.basis_pos[step]];
        }
        for k in 0..rhs.count {
            rhs.array[rhs.index[k]] = 0.0;
        }
        rhs.count = 0;

        // Forward solve on U', in place in step space.
        for step in 0..m {
            let mut acc = self.scratch[step];
            for p in self.u_start[step]..self.u_start[step + 1] {
                acc -= self.u_value[p] * self.scratch[self.u_index[p]];
            }
            self.scratch[step] = acc / self.u_pivot[step];
        }

        // Scatter v into the row space.
        for step in 0..m {
            let v = self.scratch[step];
            self.scratch[step] = 0.0;
            if v != 0.0 {
                rhs.scatter(self.pivot_row[step], v);
            }
        }

        // Transposed eliminations in reverse step order. Multiplier rows of
        // step k are pivotal only at later steps, so their values are final
        // when step k is processed.
        for step in (0..self.pivot_row.len()).rev() {
            if self.l_start[step] == self.l_start[step + 1] {
                continue;
            }
            let r = self.pivot_row[step];
            let x0 = rhs.array[r];
            let mut acc = x0;
            for p in self.l_start[step]..self.l_start[step + 1] {
                acc -= self.l_value[p] * rhs.array[self.l_index[p]];
            }
            if acc != x0 {
                if x0 == 0.0 {
                    rhs.index[rhs.count] = r;
                    rhs.count += 1;
                }
                rhs.array[r] = if acc.abs() < FACTOR_TINY && acc != 0.0 {
                    1e-50
                } else {
                    acc
                };
            }
        }
        rhs.tight();
    }

    /// Rank-1 update: the basis column in position `pivot_position` has
    /// been replaced by the entering column, whose FTRAN result is
    /// `column`. Rejects with an error, leaving the representation stale,
    /// when the pivot is tiny or the eta growth is excessive; the caller
    /// must then refactorise.
    pub fn update(
        &mut self,
        column: &SparseVector,
        pivot_position: usize,
    ) -> Result<(), FactorError> {
        let pivot = column.array[pivot_position];
        if pivot.abs() < self.min_update_pivot {
            return Err(FactorError::SmallPivot);
        }
        let mut max_entry = 0.0f64;
        for k in 0..column.count {
            max_entry = max_entry.max(column.array[column.index[k]].abs());
        }
        if max_entry / pivot.abs() > self.growth_limit {
            return Err(FactorError::ExcessiveGrowth);
        }

        self.eta_pos.push(pivot_position);
        self.eta_pivot.push(pivot);
        for k in 0..column.count {
            let i = column.index[k];
            if i == pivot_position {
                continue;
            }
            let v = column.array[i];
            if v.abs() > FACTOR_TINY {
                self.eta_index.push(i);
                self.eta_value.push(v);
            }
        }
        self.eta_start.push(self.eta_index.len());
        self.update_count += 1;
        self.fresh = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix_2x3() -> ConstraintMatrix {
        // [1  2  0]
        // [0  3  4]
        ConstraintMatrix::setup(
            3,
            2,
            &[0, 1, 3, 4],
            &[0, 0, 1, 1],
            &[1.0, 2.0, 3.0, 4.0],
            &[1, 1, 1],
        )
    }

    fn rhs(values: &[f64]) -> SparseVector {
        let mut v = SparseVector::new(values.len());
        for (i, &x) in values.iter().enumerate() {
            if x != 0.0 {
                v.scatter(i, x);
            }
        }
        v
    }

    #[test]
    fn test_logical_basis_identity() {
        let matrix = matrix_2x3();
        let mut factor = BasisFactor::new(2);
        let mut basic_index = vec![3, 4]; // logicals: B = -I
        factor.build(&mut basic_index, &matrix).unwrap();
        assert!(factor.is_fresh());

        let mut b = rhs(&[5.0, -2.0]);
        factor.ftran(&mut b);
        assert!((b.array[0] + 5.0).abs() < 1e-12);
        assert!((b.array[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_ftran_btran_structural_basis() {
        let matrix = matrix_2x3();
        let mut factor = BasisFactor::new(2);
        // B = [a1 a2] = [[1, 2], [0, 3]]
        let mut basic_index = vec![0, 1];
        factor.build(&mut basic_index, &matrix).unwrap();

        // B y = [4, 3] -> y = [2, 1] in basis positions.
        let mut b = rhs(&[4.0, 3.0]);
        factor.ftran(&mut b);
        assert!((b.array[0] - 2.0).abs() < 1e-12);
        assert!((b.array[1] - 1.0).abs() < 1e-12);

        // B' y = e_1 -> [[1, 0], [2, 3]] y = [0, 1] -> y = [0, 1/3].
        let mut e1 = rhs(&[0.0, 1.0]);
        factor.btran(&mut e1);
        assert!(e1.array[0].abs() < 1e-12);
        assert!((e1.array[1] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_update_then_solve() {
        let matrix = matrix_2x3();
        let mut factor = BasisFactor::new(2);
        let mut basic_index = vec![3, 4];
        factor.build(&mut basic_index, &matrix).unwrap();

        // Column 1 of A replaces position 0: new B = [[-2, 0], [-3, -1]]
        // (column is [2,3], logical of row 0 leaves; B columns: a2, -e2).
        let mut alpha = rhs(&[2.0, 3.0]);
        factor.ftran(&mut alpha); // B^-1 a2 = [-2, -3]
        assert!((alpha.array[0] + 2.0).abs() < 1e-12);
        factor.update(&alpha, 0).unwrap();
        assert_eq!(factor.update_count(), 1);
        assert!(!factor.is_fresh());

        // Solve with the updated basis: B_new y = [2, 0]
        // B_new = [a2, -e2] = [[2, 0], [3, -1]]; y = [1, 3].
        let mut b = rhs(&[2.0, 0.0]);
        factor.ftran(&mut b);
        assert!((b.array[0] - 1.0).abs() < 1e-12);
        assert!((b.array[1] - 3.0).abs() < 1e-12);

        // BTRAN against the same basis: solve [[2, 3], [0, -1]] y = [1, 0]
        // -> y = [0.5, 0].
        let mut c = rhs(&[1.0, 0.0]);
        factor.btran(&mut c);
        assert!((c.array[0] - 0.5).abs() < 1e-12);
        assert!(c.array[1].abs() < 1e-12);
    }

    #[test]
    fn test_update_rejects_small_pivot() {
        let matrix = matrix_2x3();
        let mut factor = BasisFactor::new(2);
        let mut basic_index = vec![3, 4];
        factor.build(&mut basic_index, &matrix).unwrap();

        let mut alpha = SparseVector::new(2);
        alpha.scatter(0, 1e-12);
        alpha.scatter(1, 1.0);
        assert_eq!(factor.update(&alpha, 0), Err(FactorError::SmallPivot));
    }

    #[test]
    fn test_singular_basis_repaired() {
        // Basis [a1, a1] is singular; build must swap in a logical.
        let matrix = matrix_2x3();
        let mut factor = BasisFactor::new(2);
        let mut basic_index = vec![0, 0];
        let deficiency = factor.build(&mut basic_index, &matrix).unwrap();
        assert_eq!(deficiency, 1);
        assert!(basic_index.contains(&0));
        assert!(basic_index.iter().any(|&v| v >= 3));

        // The repaired basis must be solvable.
        let mut b = rhs(&[1.0, 1.0]);
        factor.ftran(&mut b);
        let y: Vec<f64> = b.array.clone();
        assert!(y.iter().all(|v| v.is_finite()));
    }
}

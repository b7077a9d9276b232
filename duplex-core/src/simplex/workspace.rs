//! Simplex workspace: the solver-side copy of the LP and all state derived
//! from it.
//!
//! The workspace owns the (possibly scaled and permuted) simplex LP, the
//! perturbed cost and bound copies, the basis, the constraint matrix views
//! and the basis factorisation. The engine borrows the caller's LP
//! immutably; everything here is derived state that can be rebuilt from it.
//!
//! Variables live in the combined space `[0, num_tot)`: structural columns
//! first, then one logical per row with column `-e_i` and the row's bounds.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::factor::{BasisFactor, FactorError};
use crate::model::{
    Lp, LpAction, ObjSense, Scale, SimplexBasis, SimplexLpStatus, NONBASIC_FLAG_FALSE,
    NONBASIC_FLAG_TRUE, NONBASIC_MOVE_DOWN, NONBASIC_MOVE_UP, NONBASIC_MOVE_ZERO,
};
use crate::options::SolverOptions;
use crate::simplex::InvertHint;
use crate::sparse::matrix::ConstraintMatrix;
use crate::sparse::vector::SparseVector;

/// Artificial bound pairs used by phase 1, per variable class.
const PHASE1_FREE_BOUND: f64 = 1000.0;

/// Equilibration passes stop when a pass improves the extreme value ratio
/// by less than this factor.
const SCALE_IMPROVEMENT_STOP: f64 = 0.9;
const SCALE_MAX_PASSES: usize = 10;

/// Solver-side copy of the LP plus every array derived from it.
#[derive(Debug)]
pub struct SimplexWorkspace {
    pub num_col: usize,
    pub num_row: usize,
    pub num_tot: usize,

    /// Scaled, sense-normalised (always minimising), possibly permuted LP.
    pub lp: Lp,
    /// Original objective sense; costs in `lp` are already negated for
    /// maximisation.
    pub sense: ObjSense,
    pub scale: Scale,
    /// Simplex column j corresponds to original column `col_permutation[j]`.
    pub col_permutation: Vec<usize>,

    pub work_cost: Vec<f64>,
    pub work_dual: Vec<f64>,
    pub work_shift: Vec<f64>,
    pub work_lower: Vec<f64>,
    pub work_upper: Vec<f64>,
    pub work_range: Vec<f64>,
    pub work_value: Vec<f64>,

    pub base_lower: Vec<f64>,
    pub base_upper: Vec<f64>,
    pub base_value: Vec<f64>,

    pub basis: SimplexBasis,
    pub matrix: ConstraintMatrix,
    pub factor: BasisFactor,
    pub status: SimplexLpStatus,

    pub costs_perturbed: bool,
    pub num_basic_logicals: usize,
    pub dual_objective_value: f64,
    pub iteration_count: usize,

    pub primal_feasibility_tolerance: f64,
    pub dual_feasibility_tolerance: f64,

    rng: StdRng,
    /// Scratch for compute_primal / compute_dual right-hand sides.
    buffer: SparseVector,
}

impl SimplexWorkspace {
    /// Build the workspace from a validated LP. Applies sense
    /// normalisation, then optional scaling and column permutation, and
    /// installs the logical basis.
    pub fn new(lp: &Lp, options: &SolverOptions) -> Self {
        let num_col = lp.num_col;
        let num_row = lp.num_row;
        let num_tot = num_col + num_row;

        let mut simplex_lp = lp.clone();
        if simplex_lp.sense == ObjSense::Maximise {
            for c in simplex_lp.col_cost.iter_mut() {
                *c = -*c;
            }
        }

        let mut ws = SimplexWorkspace {
            num_col,
            num_row,
            num_tot,
            lp: simplex_lp,
            sense: lp.sense,
            scale: Scale::identity(num_col, num_row),
            col_permutation: (0..num_col).collect(),
            work_cost: vec![0.0; num_tot],
            work_dual: vec![0.0; num_tot],
            work_shift: vec![0.0; num_tot],
            work_lower: vec![0.0; num_tot],
            work_upper: vec![0.0; num_tot],
            work_range: vec![0.0; num_tot],
            work_value: vec![0.0; num_tot],
            base_lower: vec![0.0; num_row],
            base_upper: vec![0.0; num_row],
            base_value: vec![0.0; num_row],
            basis: SimplexBasis::logical(num_col, num_row),
            matrix: ConstraintMatrix::default(),
            factor: BasisFactor::new(num_row),
            status: SimplexLpStatus::default(),
            costs_perturbed: false,
            num_basic_logicals: num_row,
            dual_objective_value: 0.0,
            iteration_count: 0,
            primal_feasibility_tolerance: options.primal_feasibility_tolerance,
            dual_feasibility_tolerance: options.dual_feasibility_tolerance,
            rng: StdRng::seed_from_u64(options.random_seed),
            buffer: SparseVector::new(num_row),
        };

        if options.scale_simplex_lp {
            ws.scale();
        }
        if options.permute_simplex_lp {
            ws.permute();
        }
        ws.status.has_basis = true;
        ws
    }

    /// Rebuild the row-wise matrix partition from the current basis.
    pub fn setup_matrix(&mut self) {
        self.matrix = ConstraintMatrix::setup(
            self.num_col,
            self.num_row,
            &self.lp.a_start,
            &self.lp.a_index,
            &self.lp.a_value,
            &self.basis.nonbasic_flag,
        );
        self.status.has_matrix_col_wise = true;
        self.status.has_matrix_row_wise = true;
    }

    /// Install a caller-supplied basis, recomputing the logical count.
    pub fn replace_with_new_basis(&mut self, basis: SimplexBasis) {
        debug_assert!(basis.consistent(self.num_col, self.num_row));
        self.num_basic_logicals = basis
            .basic_index
            .iter()
            .filter(|&&v| v >= self.num_col)
            .count();
        self.basis = basis;
        self.status.update(LpAction::NewBasis);
        self.status.has_basis = true;
    }

    // ----- scaling and permutation -------------------------------------

    /// Geometric-mean equilibration of the simplex LP, with cost scaling.
    /// Factors are rounded to powers of two and recorded for reversal.
    pub fn scale(&mut self) {
        let (num_col, num_row) = (self.num_col, self.num_row);
        if self.lp.num_nz() == 0 {
            self.status.update(LpAction::Scale);
            return;
        }

        let initial_extreme = self.equilibration_extreme();
        let initial_mean = self.equilibration_mean();
        let mut previous_extreme = initial_extreme;

        for _ in 0..SCALE_MAX_PASSES {
            // Row pass: geometric mean of each row's extreme magnitudes.
            let mut row_min = vec![f64::INFINITY; num_row];
            let mut row_max = vec![0.0f64; num_row];
            for j in 0..num_col {
                for k in self.lp.a_start[j]..self.lp.a_start[j + 1] {
                    let i = self.lp.a_index[k];
                    let a = self.lp.a_value[k].abs();
                    row_min[i] = row_min[i].min(a);
                    row_max[i] = row_max[i].max(a);
                }
            }
            let row_adjust: Vec<f64> = (0..num_row)
                .map(|i| {
                    if row_max[i] > 0.0 {
                        pow2_round(1.0 / (row_min[i] * row_max[i]).sqrt())
                    } else {
                        1.0
                    }
                })
                .collect();
            for j in 0..num_col {
                for k in self.lp.a_start[j]..self.lp.a_start[j + 1] {
                    self.lp.a_value[k] *= row_adjust[self.lp.a_index[k]];
                }
            }
            for i in 0..num_row {
                self.scale.row[i] *= row_adjust[i];
            }

            // Column pass.
            let mut col_adjust = vec![1.0f64; num_col];
            for (j, adjust) in col_adjust.iter_mut().enumerate() {
                let mut col_min = f64::INFINITY;
                let mut col_max = 0.0f64;
                for k in self.lp.a_start[j]..self.lp.a_start[j + 1] {
                    let a = self.lp.a_value[k].abs();
                    col_min = col_min.min(a);
                    col_max = col_max.max(a);
                }
                if col_max > 0.0 {
                    *adjust = pow2_round(1.0 / (col_min * col_max).sqrt());
                }
            }
            for j in 0..num_col {
                for k in self.lp.a_start[j]..self.lp.a_start[j + 1] {
                    self.lp.a_value[k] *= col_adjust[j];
                }
                self.scale.col[j] *= col_adjust[j];
            }

            let extreme = self.equilibration_extreme();
            if extreme > SCALE_IMPROVEMENT_STOP * previous_extreme {
                break;
            }
            previous_extreme = extreme;
        }

        // Apply the accumulated factors to costs and bounds.
        for j in 0..num_col {
            let c = self.scale.col[j];
            self.lp.col_cost[j] *= c;
            self.lp.col_lower[j] /= c;
            self.lp.col_upper[j] /= c;
        }
        for i in 0..num_row {
            let r = self.scale.row[i];
            self.lp.row_lower[i] *= r;
            self.lp.row_upper[i] *= r;
        }

        self.scale_costs();

        self.scale.is_scaled = true;
        self.scale.extreme_equilibration_improvement =
            initial_extreme / self.equilibration_extreme().max(1.0);
        self.scale.mean_equilibration_improvement =
            initial_mean / self.equilibration_mean().max(1.0);
        self.status.update(LpAction::Scale);
    }

    /// Divide costs by a power of two when their magnitudes are extreme.
    fn scale_costs(&mut self) {
        let max_cost = self
            .lp
            .col_cost
            .iter()
            .fold(0.0f64, |acc, c| acc.max(c.abs()));
        if max_cost < 2048.0 {
            self.scale.cost = 1.0;
            return;
        }
        let cost_scale = pow2_round(max_cost / 16.0);
        for c in self.lp.col_cost.iter_mut() {
            *c /= cost_scale;
        }
        self.scale.cost = cost_scale;
    }

    /// Max over rows and columns of the ratio of extreme magnitudes; 1.0
    /// for a perfectly equilibrated matrix.
    fn equilibration_extreme(&self) -> f64 {
        let mut worst = 1.0f64;
        for j in 0..self.num_col {
            let (mut lo, mut hi) = (f64::INFINITY, 0.0f64);
            for k in self.lp.a_start[j]..self.lp.a_start[j + 1] {
                let a = self.lp.a_value[k].abs();
                lo = lo.min(a);
                hi = hi.max(a);
            }
            if hi > 0.0 {
                worst = worst.max(hi / lo);
            }
        }
        worst
    }

    fn equilibration_mean(&self) -> f64 {
        let mut log_sum = 0.0;
        let mut n = 0usize;
        for j in 0..self.num_col {
            let (mut lo, mut hi) = (f64::INFINITY, 0.0f64);
            for k in self.lp.a_start[j]..self.lp.a_start[j + 1] {
                let a = self.lp.a_value[k].abs();
                lo = lo.min(a);
                hi = hi.max(a);
            }
            if hi > 0.0 {
                log_sum += (hi / lo).ln();
                n += 1;
            }
        }
        if n == 0 {
            1.0
        } else {
            (log_sum / n as f64).exp()
        }
    }

    /// Randomly permute the structural columns to break CHUZR ties.
    pub fn permute(&mut self) {
        let num_col = self.num_col;
        if num_col < 2 {
            return;
        }
        let mut perm: Vec<usize> = (0..num_col).collect();
        for j in (1..num_col).rev() {
            let k = self.rng.gen_range(0..=j);
            perm.swap(j, k);
        }

        let mut lp = self.lp.clone();
        lp.a_start = vec![0; num_col + 1];
        lp.a_index.clear();
        lp.a_value.clear();
        for (new_j, &old_j) in perm.iter().enumerate() {
            let (index, value) = self.lp.col(old_j);
            lp.a_index.extend_from_slice(index);
            lp.a_value.extend_from_slice(value);
            lp.a_start[new_j + 1] = lp.a_index.len();
            lp.col_cost[new_j] = self.lp.col_cost[old_j];
            lp.col_lower[new_j] = self.lp.col_lower[old_j];
            lp.col_upper[new_j] = self.lp.col_upper[old_j];
            if !lp.col_names.is_empty() {
                lp.col_names[new_j] = self.lp.col_names[old_j].clone();
            }
            if !lp.integrality.is_empty() {
                lp.integrality[new_j] = self.lp.integrality[old_j];
            }
        }
        let composed: Vec<usize> = perm.iter().map(|&p| self.col_permutation[p]).collect();
        self.col_permutation = composed;
        // Scale factors travel with their columns.
        let scale_col: Vec<f64> = perm.iter().map(|&p| self.scale.col[p]).collect();
        self.scale.col = scale_col;
        self.lp = lp;
        self.status.update(LpAction::Permute);
    }

    // ----- work array initialisation -----------------------------------

    /// Load costs into `work_cost`, optionally perturbed. Logicals carry
    /// zero cost. Perturbation magnitudes stay below a hundredth of the
    /// primal feasibility tolerance, scaled by |c| + 1.
    pub fn initialise_cost(&mut self, perturb: bool) {
        self.costs_perturbed = false;
        for j in 0..self.num_col {
            self.work_cost[j] = self.lp.col_cost[j];
        }
        for j in self.num_col..self.num_tot {
            self.work_cost[j] = 0.0;
        }
        self.work_shift.fill(0.0);
        if perturb {
            self.costs_perturbed = true;
            let base = self.primal_feasibility_tolerance / 1e2;
            for j in 0..self.num_col {
                let r: f64 = self.rng.gen_range(0.5..1.0);
                self.work_cost[j] += r * base * (self.work_cost[j].abs() + 1.0);
            }
        }
    }

    /// Load bounds into the work arrays. Phase 1 installs the artificial
    /// dual-feasible pairs; phase 2 restores the (scaled) model bounds.
    pub fn initialise_bound(&mut self, phase: usize) {
        if phase == 2 {
            for j in 0..self.num_col {
                self.work_lower[j] = self.lp.col_lower[j];
                self.work_upper[j] = self.lp.col_upper[j];
            }
            for i in 0..self.num_row {
                self.work_lower[self.num_col + i] = self.lp.row_lower[i];
                self.work_upper[self.num_col + i] = self.lp.row_upper[i];
            }
        } else {
            for j in 0..self.num_tot {
                let (lower, upper) = self.model_bounds(j);
                let pair = match (lower.is_finite(), upper.is_finite()) {
                    (true, true) => (0.0, 0.0),
                    (true, false) => (0.0, 1.0),
                    (false, true) => (-1.0, 0.0),
                    (false, false) => (-PHASE1_FREE_BOUND, PHASE1_FREE_BOUND),
                };
                self.work_lower[j] = pair.0;
                self.work_upper[j] = pair.1;
            }
        }
        for j in 0..self.num_tot {
            self.work_range[j] = self.work_upper[j] - self.work_lower[j];
        }
    }

    fn model_bounds(&self, j: usize) -> (f64, f64) {
        if j < self.num_col {
            (self.lp.col_lower[j], self.lp.col_upper[j])
        } else {
            (
                self.lp.row_lower[j - self.num_col],
                self.lp.row_upper[j - self.num_col],
            )
        }
    }

    /// Default move for a nonbasic variable with the current work bounds:
    /// fixed at equal bounds, at the finite bound when only one exists, at
    /// the bound of smaller magnitude when boxed, free otherwise.
    pub fn default_nonbasic_move(&self, j: usize) -> i8 {
        let lower = self.work_lower[j];
        let upper = self.work_upper[j];
        if lower == upper {
            NONBASIC_MOVE_ZERO
        } else if lower.is_finite() && upper.is_finite() {
            if lower.abs() <= upper.abs() {
                NONBASIC_MOVE_UP
            } else {
                NONBASIC_MOVE_DOWN
            }
        } else if lower.is_finite() {
            NONBASIC_MOVE_UP
        } else if upper.is_finite() {
            NONBASIC_MOVE_DOWN
        } else {
            NONBASIC_MOVE_ZERO
        }
    }

    /// Set `work_value` and `nonbasic_move` for every nonbasic variable in
    /// `[first, last)` from the work bounds.
    pub fn initialise_value_from_nonbasic(&mut self, first: usize, last: usize) {
        for j in first..last {
            if self.basis.nonbasic_flag[j] != NONBASIC_FLAG_TRUE {
                self.basis.nonbasic_move[j] = NONBASIC_MOVE_ZERO;
                continue;
            }
            let m = self.default_nonbasic_move(j);
            self.basis.nonbasic_move[j] = m;
            self.work_value[j] = match m {
                NONBASIC_MOVE_UP => self.work_lower[j],
                NONBASIC_MOVE_DOWN => self.work_upper[j],
                _ => {
                    if self.work_lower[j] == self.work_upper[j] {
                        self.work_lower[j]
                    } else {
                        0.0
                    }
                }
            };
        }
    }

    pub fn initialise_value(&mut self) {
        self.initialise_value_from_nonbasic(0, self.num_tot);
    }

    /// Cost, bound and value initialisation for a phase.
    pub fn populate_work_arrays(&mut self, phase: usize, perturb: bool) {
        self.initialise_cost(perturb && phase == 2);
        self.initialise_bound(phase);
        self.initialise_value();
    }

    // ----- factorisation and recomputation -----------------------------

    /// Refactorise the basis. Rank-deficient positions are repaired with
    /// logicals; unrecoverable singularity surfaces as a hint.
    pub fn compute_factor(&mut self) -> Result<usize, InvertHint> {
        match self.factor.build(&mut self.basis.basic_index, &self.matrix) {
            Ok(deficiency) => {
                if deficiency > 0 {
                    // Repairs changed the set of basic variables.
                    for j in 0..self.num_tot {
                        self.basis.nonbasic_flag[j] = NONBASIC_FLAG_TRUE;
                    }
                    for &var in &self.basis.basic_index {
                        self.basis.nonbasic_flag[var] = NONBASIC_FLAG_FALSE;
                    }
                    self.num_basic_logicals = self
                        .basis
                        .basic_index
                        .iter()
                        .filter(|&&v| v >= self.num_col)
                        .count();
                    self.setup_matrix();
                }
                self.status.has_invert = true;
                self.status.has_fresh_invert = true;
                Ok(deficiency)
            }
            Err(FactorError::Singular) => Err(InvertHint::Singular),
            Err(_) => Err(InvertHint::Trouble),
        }
    }

    /// base_value = B^-1 (-N x_N); also loads the basic bound arrays.
    pub fn compute_primal(&mut self) {
        self.buffer.clear();
        for j in 0..self.num_tot {
            if self.basis.nonbasic_flag[j] == NONBASIC_FLAG_TRUE && self.work_value[j] != 0.0 {
                self.matrix.collect_aj(&mut self.buffer, j, self.work_value[j]);
            }
        }
        for k in 0..self.buffer.count {
            let i = self.buffer.index[k];
            self.buffer.array[i] = -self.buffer.array[i];
        }
        self.factor.ftran(&mut self.buffer);
        for i in 0..self.num_row {
            self.base_value[i] = self.buffer.array[i];
            let var = self.basis.basic_index[i];
            self.base_lower[i] = self.work_lower[var];
            self.base_upper[i] = self.work_upper[var];
        }
        self.buffer.clear();
        self.status.has_basic_primal_values = true;
    }

    /// Reduced costs of the nonbasic variables from a fresh BTRAN of the
    /// basic costs. Basic duals are set to zero.
    pub fn compute_dual(&mut self) {
        let mut pi = SparseVector::new(self.num_row);
        for i in 0..self.num_row {
            let c = self.work_cost[self.basis.basic_index[i]];
            if c != 0.0 {
                pi.scatter(i, c);
            }
        }
        self.factor.btran(&mut pi);

        let mut row_ap = SparseVector::new(self.num_col);
        self.matrix.price_by_column(&mut row_ap, &pi);
        for j in 0..self.num_col {
            self.work_dual[j] = if self.basis.nonbasic_flag[j] == NONBASIC_FLAG_TRUE {
                self.work_cost[j] - row_ap.array[j]
            } else {
                0.0
            };
        }
        for i in 0..self.num_row {
            let j = self.num_col + i;
            self.work_dual[j] = if self.basis.nonbasic_flag[j] == NONBASIC_FLAG_TRUE {
                self.work_cost[j] + pi.array[i]
            } else {
                0.0
            };
        }
        self.status.has_nonbasic_dual_values = true;
    }

    /// Number of nonbasic variables whose dual violates its move
    /// direction by more than the dual feasibility tolerance.
    pub fn compute_dual_infeasibilities(&self) -> usize {
        let tol = self.dual_feasibility_tolerance;
        let mut count = 0;
        for j in 0..self.num_tot {
            if self.basis.nonbasic_flag[j] != NONBASIC_FLAG_TRUE {
                continue;
            }
            match self.basis.nonbasic_move[j] {
                NONBASIC_MOVE_UP => {
                    if self.work_dual[j] < -tol {
                        count += 1;
                    }
                }
                NONBASIC_MOVE_DOWN => {
                    if self.work_dual[j] > tol {
                        count += 1;
                    }
                }
                _ => {
                    // Fixed variables are never dual infeasible.
                    if self.work_lower[j] != self.work_upper[j] && self.work_dual[j].abs() > tol {
                        count += 1;
                    }
                }
            }
        }
        count
    }

    /// Restore dual feasibility for non-free nonbasic variables by bound
    /// flips where possible and cost shifts otherwise. Returns the number
    /// of free variables left dual infeasible.
    pub fn correct_dual(&mut self) -> usize {
        let tol = self.dual_feasibility_tolerance;
        let mut free_infeasibility_count = 0;
        for j in 0..self.num_tot {
            if self.basis.nonbasic_flag[j] != NONBASIC_FLAG_TRUE {
                continue;
            }
            let mv = self.basis.nonbasic_move[j];
            let infeasible = (mv == NONBASIC_MOVE_UP && self.work_dual[j] < -tol)
                || (mv == NONBASIC_MOVE_DOWN && self.work_dual[j] > tol);
            if !infeasible {
                if mv == NONBASIC_MOVE_ZERO
                    && self.work_lower[j] != self.work_upper[j]
                    && self.work_dual[j].abs() > tol
                {
                    free_infeasibility_count += 1;
                }
                continue;
            }
            if self.work_range[j].is_finite() {
                self.flip_bound(j);
            } else {
                // Shift the cost just past feasibility.
                let target = tol * self.rng.gen_range(1.0..2.0);
                let shift = if mv == NONBASIC_MOVE_UP {
                    target - self.work_dual[j]
                } else {
                    -target - self.work_dual[j]
                };
                self.shift_cost(j, shift);
                self.work_dual[j] += shift;
            }
        }
        free_infeasibility_count
    }

    /// Move a boxed nonbasic variable to its opposite bound.
    pub fn flip_bound(&mut self, j: usize) {
        let mv = -self.basis.nonbasic_move[j];
        self.basis.nonbasic_move[j] = mv;
        self.work_value[j] = if mv == NONBASIC_MOVE_UP {
            self.work_lower[j]
        } else {
            self.work_upper[j]
        };
    }

    /// Shift the working cost of a column, recording the shift so it can
    /// be undone.
    pub fn shift_cost(&mut self, j: usize, amount: f64) {
        self.work_cost[j] += amount;
        self.work_shift[j] += amount;
    }

    /// Undo the recorded cost shift for a column.
    pub fn shift_back(&mut self, j: usize) {
        self.work_cost[j] -= self.work_shift[j];
        self.work_dual[j] -= self.work_shift[j];
        self.work_shift[j] = 0.0;
    }

    /// Dual objective value from the work arrays: nonbasic value-dual
    /// products, plus the scaled offset in phase 2.
    pub fn compute_dual_objective_value(&mut self, phase: usize) {
        let mut objective = 0.0;
        for j in 0..self.num_tot {
            if self.basis.nonbasic_flag[j] == NONBASIC_FLAG_TRUE {
                objective += self.work_value[j] * self.work_dual[j];
            }
        }
        if phase != 1 {
            objective *= self.scale.cost;
            objective += self.lp.offset;
        }
        self.dual_objective_value = objective;
        self.status.has_dual_objective_value = true;
    }

    /// Primal objective value over structural variables, unscaled.
    pub fn compute_primal_objective_value(&self) -> f64 {
        let mut objective = 0.0;
        for i in 0..self.num_row {
            let var = self.basis.basic_index[i];
            if var < self.num_col {
                objective += self.base_value[i] * self.lp.col_cost[var];
            }
        }
        for j in 0..self.num_col {
            if self.basis.nonbasic_flag[j] == NONBASIC_FLAG_TRUE {
                objective += self.work_value[j] * self.lp.col_cost[j];
            }
        }
        objective * self.scale.cost * self.sense.sign() + self.lp.offset
    }

    // ----- pivoting ----------------------------------------------------

    /// Record a basis change: `var_in` becomes basic in row `row_out`,
    /// the leaving variable moves to the bound selected by `move_out`
    /// (+1 lower, -1 upper).
    pub fn update_pivots(&mut self, var_in: usize, row_out: usize, move_out: i8) {
        let var_out = self.basis.basic_index[row_out];
        self.basis.basic_index[row_out] = var_in;
        self.basis.nonbasic_flag[var_in] = NONBASIC_FLAG_FALSE;
        self.basis.nonbasic_move[var_in] = NONBASIC_MOVE_ZERO;
        self.basis.nonbasic_flag[var_out] = NONBASIC_FLAG_TRUE;
        if self.work_lower[var_out] == self.work_upper[var_out] {
            self.basis.nonbasic_move[var_out] = NONBASIC_MOVE_ZERO;
            self.work_value[var_out] = self.work_lower[var_out];
        } else if move_out == NONBASIC_MOVE_UP {
            self.basis.nonbasic_move[var_out] = NONBASIC_MOVE_UP;
            self.work_value[var_out] = self.work_lower[var_out];
        } else {
            self.basis.nonbasic_move[var_out] = NONBASIC_MOVE_DOWN;
            self.work_value[var_out] = self.work_upper[var_out];
        }
        self.base_lower[row_out] = self.work_lower[var_in];
        self.base_upper[row_out] = self.work_upper[var_in];

        if var_in >= self.num_col {
            self.num_basic_logicals += 1;
        }
        if var_out >= self.num_col {
            self.num_basic_logicals -= 1;
        }
        self.iteration_count += 1;
        self.status.has_fresh_invert = false;
        self.status.has_fresh_rebuild = false;
    }

    /// Move the entering/leaving pair across the row-wise partition.
    pub fn update_matrix(&mut self, var_in: usize, var_out: usize) {
        self.matrix.update(var_in, var_out);
    }

    /// Apply the rank-1 factor update; failures invalidate the
    /// factorisation and become a Trouble hint.
    pub fn update_factor(
        &mut self,
        column: &SparseVector,
        _row_ep: &SparseVector,
        row_out: usize,
    ) -> Option<InvertHint> {
        match self.factor.update(column, row_out) {
            Ok(()) => None,
            Err(_) => {
                // The basis has already changed; the stale representation
                // must not serve another solve.
                self.status.has_invert = false;
                Some(InvertHint::Trouble)
            }
        }
    }

    // ----- consistency predicates --------------------------------------

    /// Work bound/value invariant for one nonbasic variable.
    pub fn one_nonbasic_move_vs_work_arrays_ok(&self, j: usize) -> bool {
        if self.basis.nonbasic_flag[j] != NONBASIC_FLAG_TRUE {
            return true;
        }
        match self.basis.nonbasic_move[j] {
            NONBASIC_MOVE_UP => self.work_value[j] == self.work_lower[j],
            NONBASIC_MOVE_DOWN => self.work_value[j] == self.work_upper[j],
            _ => {
                if self.work_lower[j] == self.work_upper[j] {
                    self.work_value[j] == self.work_lower[j]
                } else {
                    self.work_value[j] == 0.0
                }
            }
        }
    }

    pub fn all_nonbasic_move_vs_work_arrays_ok(&self) -> bool {
        (0..self.num_tot).all(|j| self.one_nonbasic_move_vs_work_arrays_ok(j))
    }

    /// Bound and range consistency of the work arrays for a phase.
    pub fn work_arrays_ok(&self, phase: usize) -> bool {
        if phase == 1 {
            // Phase 1 bounds are all finite by construction.
            for j in 0..self.num_tot {
                if !self.work_lower[j].is_finite() || !self.work_upper[j].is_finite() {
                    return false;
                }
            }
        }
        for j in 0..self.num_tot {
            if self.work_lower[j] > self.work_upper[j] {
                return false;
            }
            if self.work_range[j] != self.work_upper[j] - self.work_lower[j] {
                return false;
            }
        }
        true
    }

    /// Full pre-solve consistency check: basis counting invariant, work
    /// arrays, and (at level > 0) the nonbasic value invariant.
    pub fn ok_to_solve(&self, level: usize, phase: usize) -> bool {
        if !self.basis.consistent(self.num_col, self.num_row) {
            return false;
        }
        if !self.work_arrays_ok(phase) {
            return false;
        }
        if level > 0 && !self.all_nonbasic_move_vs_work_arrays_ok() {
            return false;
        }
        true
    }
}

/// Round to the nearest power of two, as equilibration factors are kept
/// exactly representable.
fn pow2_round(x: f64) -> f64 {
    if x <= 0.0 || !x.is_finite() {
        return 1.0;
    }
    (2.0f64).powi(x.log2().round() as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounded_lp() -> Lp {
        // min -x - y  s.t.  x + y <= 4, 0 <= x <= 3, 0 <= y <= 3
        let mut lp = Lp::with_dims(2, 1);
        lp.a_start = vec![0, 1, 2];
        lp.a_index = vec![0, 0];
        lp.a_value = vec![1.0, 1.0];
        lp.col_cost = vec![-1.0, -1.0];
        lp.col_upper = vec![3.0, 3.0];
        lp.row_upper = vec![4.0];
        lp
    }

    fn quiet_options() -> SolverOptions {
        SolverOptions {
            scale_simplex_lp: false,
            ..SolverOptions::default()
        }
    }

    #[test]
    fn test_phase2_work_arrays() {
        let lp = bounded_lp();
        let mut ws = SimplexWorkspace::new(&lp, &quiet_options());
        ws.setup_matrix();
        ws.populate_work_arrays(2, false);
        assert!(ws.ok_to_solve(1, 2));
        // Nonbasic structurals start at lower bound 0.
        assert_eq!(ws.work_value[0], 0.0);
        assert_eq!(ws.basis.nonbasic_move[0], NONBASIC_MOVE_UP);
        // Logical bound pair mirrors the row.
        assert_eq!(ws.work_lower[2], f64::NEG_INFINITY);
        assert_eq!(ws.work_upper[2], 4.0);
    }

    #[test]
    fn test_phase1_bounds_finite() {
        let lp = bounded_lp();
        let mut ws = SimplexWorkspace::new(&lp, &quiet_options());
        ws.setup_matrix();
        ws.populate_work_arrays(1, false);
        assert!(ws.work_arrays_ok(1));
        // Boxed structural becomes fixed at zero.
        assert_eq!((ws.work_lower[0], ws.work_upper[0]), (0.0, 0.0));
        // Upper-bounded logical gets [-1, 0].
        assert_eq!((ws.work_lower[2], ws.work_upper[2]), (-1.0, 0.0));
    }

    #[test]
    fn test_compute_primal_dual_logical_basis() {
        let lp = bounded_lp();
        let mut ws = SimplexWorkspace::new(&lp, &quiet_options());
        ws.setup_matrix();
        ws.populate_work_arrays(2, false);
        ws.compute_factor().unwrap();
        ws.compute_primal();
        ws.compute_dual();
        // x = y = 0 -> slack value 0.
        assert_eq!(ws.base_value[0], 0.0);
        // Reduced costs of nonbasic structurals are the raw costs.
        assert_eq!(ws.work_dual[0], -1.0);
        assert_eq!(ws.work_dual[1], -1.0);
        assert_eq!(ws.compute_dual_infeasibilities(), 2);
    }

    #[test]
    fn test_scaling_reversible_and_recorded() {
        let mut lp = bounded_lp();
        lp.a_value = vec![1000.0, 0.001];
        let mut ws = SimplexWorkspace::new(
            &lp,
            &SolverOptions {
                scale_simplex_lp: true,
                ..SolverOptions::default()
            },
        );
        assert!(ws.scale.is_scaled);
        assert!(ws.scale.extreme_equilibration_improvement >= 1.0);
        // Scaled entry times inverse factors recovers the original.
        for j in 0..2 {
            let (index, value) = ws.lp.col(j);
            for (&i, &v) in index.iter().zip(value) {
                let original = v / (ws.scale.row[i] * ws.scale.col[j]);
                let expected = if j == 0 { 1000.0 } else { 0.001 };
                assert!((original - expected).abs() < 1e-9);
            }
        }
        ws.setup_matrix();
        ws.populate_work_arrays(2, false);
        assert!(ws.ok_to_solve(1, 2));
    }

    #[test]
    fn test_update_pivots_counts() {
        let lp = bounded_lp();
        let mut ws = SimplexWorkspace::new(&lp, &quiet_options());
        ws.setup_matrix();
        ws.populate_work_arrays(2, false);
        ws.compute_factor().unwrap();
        assert_eq!(ws.num_basic_logicals, 1);
        // Column 0 enters, logical leaves at its upper bound.
        ws.update_pivots(0, 0, NONBASIC_MOVE_DOWN);
        assert_eq!(ws.num_basic_logicals, 0);
        assert_eq!(ws.basis.basic_index[0], 0);
        assert_eq!(ws.basis.nonbasic_move[2], NONBASIC_MOVE_DOWN);
        assert_eq!(ws.work_value[2], 4.0);
        assert!(ws.basis.consistent(2, 1));
    }

    #[test]
    fn test_correct_dual_flips_boxed() {
        let lp = bounded_lp();
        let mut ws = SimplexWorkspace::new(&lp, &quiet_options());
        ws.setup_matrix();
        ws.populate_work_arrays(2, false);
        ws.compute_factor().unwrap();
        ws.compute_primal();
        ws.compute_dual();
        // Both structurals are dual infeasible at their lower bound and
        // boxed, so they flip to the upper bound.
        ws.correct_dual();
        assert_eq!(ws.basis.nonbasic_move[0], NONBASIC_MOVE_DOWN);
        assert_eq!(ws.work_value[0], 3.0);
        assert_eq!(ws.compute_dual_infeasibilities(), 0);
    }
}
